// Copyright (c) 2022-2023 The MobileCoin Foundation

//! JSON emulator scripts
//!
//! ```json
//! {
//!   "initial": [],
//!   "steps": [
//!     { "expect": "INITIALIZE", "replies": [ { "type": "FEATURES", "payload": "0a0468776c6b" } ] },
//!     { "expect": "GET_ADDRESS", "replies": [ { "type": "BUTTON_REQUEST", "delay_ms": 10 } ] },
//!     { "expect": "BUTTON_ACK", "replies": [ { "disconnect": true, "delay_ms": 100 } ] }
//!   ]
//! }
//! ```
//!
//! Reply payloads are hex encoded message payloads, `raw` replies are sent
//! as-is.

use std::{str::FromStr, time::Duration};

use serde::Deserialize;

use hwlink::transport::emulator::{Reply, Script, Step};
use hwlink_proto::{Message, MessageType};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScriptFile {
    #[serde(default)]
    pub initial: Vec<ReplySpec>,
    pub steps: Vec<StepSpec>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StepSpec {
    pub expect: String,
    #[serde(default)]
    pub replies: Vec<ReplySpec>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplySpec {
    Message {
        #[serde(rename = "type")]
        msg_type: String,
        #[serde(default, with = "hex")]
        payload: Vec<u8>,
        #[serde(default)]
        delay_ms: u64,
    },
    Raw {
        #[serde(with = "hex")]
        raw: Vec<u8>,
        #[serde(default)]
        delay_ms: u64,
    },
    Disconnect {
        disconnect: bool,
        #[serde(default)]
        delay_ms: u64,
    },
}

fn message_type(s: &str) -> anyhow::Result<MessageType> {
    MessageType::from_str(s).map_err(|_| anyhow::anyhow!("unknown message type: '{}'", s))
}

impl ReplySpec {
    fn reply(&self) -> anyhow::Result<Option<Reply>> {
        let r = match self {
            ReplySpec::Message {
                msg_type,
                payload,
                delay_ms,
            } => Reply::Message {
                delay: Duration::from_millis(*delay_ms),
                message: Message::decode_payload(message_type(msg_type)?, payload)?,
            },
            ReplySpec::Raw { raw, delay_ms } => Reply::Raw {
                delay: Duration::from_millis(*delay_ms),
                data: raw.clone(),
            },
            ReplySpec::Disconnect {
                disconnect: true,
                delay_ms,
            } => Reply::Disconnect {
                delay: Duration::from_millis(*delay_ms),
            },
            ReplySpec::Disconnect {
                disconnect: false, ..
            } => return Ok(None),
        };

        Ok(Some(r))
    }
}

impl ScriptFile {
    /// Build an emulator [Script]
    pub fn script(&self) -> anyhow::Result<Script> {
        let mut s = Script::new();

        // Initial replies are those added prior to the first step
        for r in &self.initial {
            s = match r.reply()? {
                Some(Reply::Message { delay, message }) => s.reply_after(delay, message),
                Some(Reply::Raw { delay, data }) => s.reply_raw(delay, data),
                Some(Reply::Disconnect { delay }) => s.disconnect_after(delay),
                None => s,
            };
        }

        for step in &self.steps {
            let mut replies = vec![];
            for r in &step.replies {
                replies.extend(r.reply()?);
            }

            s = s.step(Step {
                expect: message_type(&step.expect)?,
                replies,
            });
        }

        Ok(s)
    }
}
