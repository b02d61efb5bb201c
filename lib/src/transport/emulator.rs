// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Scripted in-process device emulator
//!
//! The emulator decodes messages written by the host and answers each with
//! the replies scripted for it, optionally delayed, for deterministic tests
//! of the session state machine without hardware.
//!
//! ```
//! use std::time::Duration;
//! use hwlink::transport::Script;
//! use hwlink::proto::{messages::*, MessageType};
//!
//! let script = Script::new()
//!     .expect(MessageType::GetAddress)
//!     .reply(ButtonRequest::default())
//!     .expect(MessageType::ButtonAck)
//!     .reply_after(Duration::from_millis(50), Address {
//!         address: "1MJ2tj2ThBE62zXbBYA5ZaN3fdve5CPAz1".to_string(),
//!     });
//! ```
//!
//! Messages that do not match the next scripted step are answered with
//! [Failure] ([FailureType::UnexpectedMessage]) and the step is retained.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::time::{sleep_until, Instant};

use hwlink_proto::{
    envelope::Decoder,
    frame::{encode_frames, encode_reports, frame_content},
    messages::{Failure, FailureType},
    Error as ProtoError, Message, MessageType,
};

use super::{Framing, Transport};
use crate::Error;

/// Scripted device reply
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Encoded message
    Message { delay: Duration, message: Message },
    /// Raw bytes, framed according to the emulator framing
    Raw { delay: Duration, data: Vec<u8> },
    /// Drop the connection and disappear from enumeration
    Disconnect { delay: Duration },
}

impl Reply {
    fn delay(&self) -> Duration {
        match self {
            Reply::Message { delay, .. } => *delay,
            Reply::Raw { delay, .. } => *delay,
            Reply::Disconnect { delay } => *delay,
        }
    }
}

/// Expected host message and the replies issued in response
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub expect: MessageType,
    pub replies: Vec<Reply>,
}

/// Emulator script builder.
///
/// Reply delays are relative to the previous reply in the same step, replies
/// added before the first [Script::expect] are issued when the emulator
/// is opened.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Script {
    initial: Vec<Reply>,
    steps: VecDeque<Step>,
}

impl Script {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step expecting the provided message type
    pub fn expect(mut self, t: MessageType) -> Self {
        self.steps.push_back(Step {
            expect: t,
            replies: vec![],
        });
        self
    }

    /// Add an immediate reply to the current step
    pub fn reply(self, m: impl Into<Message>) -> Self {
        self.reply_after(Duration::ZERO, m)
    }

    /// Add a delayed reply to the current step
    pub fn reply_after(self, delay: Duration, m: impl Into<Message>) -> Self {
        self.push(Reply::Message {
            delay,
            message: m.into(),
        })
    }

    /// Add raw reply bytes to the current step
    pub fn reply_raw(self, delay: Duration, data: Vec<u8>) -> Self {
        self.push(Reply::Raw { delay, data })
    }

    /// Disconnect after the provided delay
    pub fn disconnect_after(self, delay: Duration) -> Self {
        self.push(Reply::Disconnect { delay })
    }

    /// Append a prebuilt step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    /// Number of steps remaining
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn push(mut self, r: Reply) -> Self {
        match self.steps.back_mut() {
            Some(s) => s.replies.push(r),
            None => self.initial.push(r),
        }
        self
    }
}

/// Shared handle for inspecting and controlling an [Emulator]
#[derive(Clone, Debug)]
pub struct EmulatorControl {
    received: Arc<Mutex<Vec<Message>>>,
    present: Arc<AtomicBool>,
}

impl Default for EmulatorControl {
    fn default() -> Self {
        Self {
            received: Arc::new(Mutex::new(vec![])),
            present: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl EmulatorControl {
    /// Fetch messages received by the emulator
    pub fn received(&self) -> Vec<Message> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Fetch types of messages received by the emulator
    pub fn received_types(&self) -> Vec<MessageType> {
        self.received()
            .iter()
            .map(|m| m.message_type())
            .collect()
    }

    /// Plug / unplug the emulated device
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn record(&self, m: &Message) {
        if let Ok(mut r) = self.received.lock() {
            r.push(m.clone());
        }
    }
}

/// Pending output to the host
#[derive(Debug)]
enum Pending {
    Data { at: Instant, data: Vec<u8> },
    Disconnect { at: Instant },
}

impl Pending {
    fn at(&self) -> Instant {
        match self {
            Pending::Data { at, .. } => *at,
            Pending::Disconnect { at } => *at,
        }
    }
}

/// Scripted device emulator implementing [Transport]
pub struct Emulator {
    framing: Framing,
    script: Script,
    rx: Decoder,
    tx: VecDeque<Pending>,
    ctl: EmulatorControl,
    open: bool,
}

impl Emulator {
    /// Create an emulator running the provided script over a byte stream
    pub fn new(script: Script) -> Self {
        Self {
            framing: Framing::Stream,
            script,
            rx: Decoder::new(),
            tx: VecDeque::new(),
            ctl: EmulatorControl::default(),
            open: false,
        }
    }

    /// Override link framing
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self.rx = Self::decoder(framing);
        self
    }

    /// Fetch a control handle for the emulator
    pub fn control(&self) -> EmulatorControl {
        self.ctl.clone()
    }

    /// Number of script steps remaining
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn decoder(framing: Framing) -> Decoder {
        match framing {
            Framing::Synced(s) => Decoder::with_sync(s),
            _ => Decoder::new(),
        }
    }

    /// Queue replies relative to the current time
    fn schedule(&mut self, replies: Vec<Reply>) {
        let mut at = Instant::now();

        for r in replies {
            at += r.delay();

            match r {
                Reply::Message { message, .. } => {
                    trace!("emulator reply: {}", message.message_type());
                    match message.encode() {
                        Ok(b) => self.queue(at, b),
                        Err(e) => warn!("emulator failed to encode reply: {}", e),
                    }
                }
                Reply::Raw { data, .. } => self.queue(at, data),
                Reply::Disconnect { .. } => self.tx.push_back(Pending::Disconnect { at }),
            }
        }
    }

    /// Frame and queue outgoing bytes
    fn queue(&mut self, at: Instant, data: Vec<u8>) {
        let frames = match self.framing {
            Framing::Stream => {
                self.tx.push_back(Pending::Data { at, data });
                return;
            }
            Framing::Chunked => encode_frames(&data),
            Framing::Synced(s) => encode_reports(&data, s),
        };

        for f in frames {
            self.tx.push_back(Pending::Data {
                at,
                data: f.to_vec(),
            });
        }
    }

    fn failure(&mut self, code: FailureType, message: &str) {
        let f = Failure {
            code: Some(code as i32),
            message: Some(message.to_string()),
        };

        self.schedule(vec![Reply::Message {
            delay: Duration::ZERO,
            message: f.into(),
        }]);
    }

    /// Handle a complete message from the host
    fn handle(&mut self, m: Message) {
        let t = m.message_type();
        self.ctl.record(&m);

        match self.script.steps.front().map(|s| s.expect) {
            Some(expected) if expected == t => {
                let replies = self
                    .script
                    .steps
                    .pop_front()
                    .map(|s| s.replies)
                    .unwrap_or_default();

                debug!("emulator received {} ({} replies)", t, replies.len());

                self.schedule(replies);
            }
            Some(expected) => {
                warn!("emulator received {} (expected {})", t, expected);
                self.failure(FailureType::UnexpectedMessage, "Unexpected message");
            }
            None => {
                warn!("emulator received {} (script complete)", t);
                self.failure(FailureType::UnexpectedMessage, "Unexpected message");
            }
        }
    }
}

#[async_trait]
impl Transport for Emulator {
    fn framing(&self) -> Framing {
        self.framing
    }

    async fn open(&mut self) -> Result<(), Error> {
        if !self.ctl.is_present() {
            return Err(Error::NoDevice);
        }
        if self.open {
            return Ok(());
        }

        self.open = true;
        self.rx = Self::decoder(self.framing);

        let initial = std::mem::take(&mut self.script.initial);
        self.schedule(initial);

        Ok(())
    }

    async fn read(&mut self, buff: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error> {
        if !self.open {
            return Err(Error::Disconnected);
        }

        let deadline = timeout.map(|t| Instant::now() + t);

        let at = match (self.tx.front().map(|p| p.at()), deadline) {
            (Some(at), Some(d)) if at > d => {
                sleep_until(d).await;
                return Ok(0);
            }
            (Some(at), _) => at,
            (None, Some(d)) => {
                sleep_until(d).await;
                return Ok(0);
            }
            (None, None) => {
                // Silent device, wait for cancellation
                futures::future::pending::<()>().await;
                return Ok(0);
            }
        };

        sleep_until(at).await;

        match self.tx.pop_front() {
            Some(Pending::Data { at, mut data }) => {
                let n = data.len().min(buff.len());
                buff[..n].copy_from_slice(&data[..n]);

                if n < data.len() {
                    let rest = data.split_off(n);
                    self.tx.push_front(Pending::Data { at, data: rest });
                }

                Ok(n)
            }
            Some(Pending::Disconnect { .. }) => {
                debug!("emulator disconnect");

                self.open = false;
                self.tx.clear();
                self.ctl.set_present(false);

                Err(Error::Disconnected)
            }
            None => Ok(0),
        }
    }

    async fn write(&mut self, buff: &[u8]) -> Result<usize, Error> {
        if !self.open {
            return Err(Error::Disconnected);
        }

        match self.framing {
            Framing::Chunked => self.rx.push(frame_content(buff)?)?,
            _ => self.rx.push(buff)?,
        }

        loop {
            let e = match self.rx.next() {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(ProtoError::UnknownTypeCode(c)) => {
                    warn!("emulator received unknown type code: {}", c);
                    self.failure(FailureType::UnexpectedMessage, "Unknown message");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match Message::from_envelope(&e) {
                Ok(m) => self.handle(m),
                Err(e) => {
                    warn!("emulator failed to decode message: {}", e);
                    self.failure(FailureType::SyntaxError, "Invalid payload");
                }
            }
        }

        Ok(buff.len())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.open = false;
        self.tx.clear();
        self.rx = Self::decoder(self.framing);
        Ok(())
    }

    async fn is_present(&mut self) -> bool {
        self.ctl.is_present()
    }
}
