// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Challenge coordination
//!
//! Device challenges (PIN, passphrase, button, seed word, OTP) suspend the
//! session until answered. The [ChallengeCoordinator] tracks the single
//! outstanding challenge and builds the matching acknowledgement, erasing
//! the provided secret whether or not an acknowledgement could be built.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::time::Instant;
use zeroize::Zeroize;

use hwlink_proto::{messages::*, Message};

use crate::Error;

/// Challenge kinds issued by the device
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum ChallengeKind {
    Pin,
    Passphrase,
    Button,
    Word,
    Otp,
}

impl ChallengeKind {
    /// Check whether answers to this challenge carry a secret
    pub fn is_secret(&self) -> bool {
        !matches!(self, ChallengeKind::Button)
    }
}

/// Outstanding device challenge
#[derive(Clone, Debug, PartialEq)]
pub struct Challenge {
    pub kind: ChallengeKind,
    /// Request subtype (PIN matrix or button request type) where provided
    pub subtype: Option<i32>,
    /// Deadline for the user to answer
    pub deadline: Instant,
}

impl Challenge {
    /// Build a challenge from a device request, returning `None` for
    /// messages that are not challenges
    pub fn from_message(m: &Message, timeout: Duration) -> Option<Self> {
        let (kind, subtype) = match m {
            Message::PinMatrixRequest(r) => (ChallengeKind::Pin, r.r#type),
            Message::PassphraseRequest(_) => (ChallengeKind::Passphrase, None),
            Message::ButtonRequest(r) => (ChallengeKind::Button, r.code),
            Message::WordRequest(_) => (ChallengeKind::Word, None),
            Message::OtpRequest(_) => (ChallengeKind::Otp, None),
            _ => return None,
        };

        Some(Self {
            kind,
            subtype,
            deadline: Instant::now() + timeout,
        })
    }
}

/// Tracks the (at most one) outstanding challenge for a session
#[derive(Debug, Default)]
pub struct ChallengeCoordinator {
    pending: Option<Challenge>,
}

impl ChallengeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a challenge issued by the device
    pub fn on_challenge_request(&mut self, c: Challenge) -> Result<(), Error> {
        if let Some(p) = &self.pending {
            debug!("{} challenge received with {} pending", c.kind, p.kind);
            return Err(Error::ChallengeAlreadyPending);
        }

        debug!("{} challenge pending", c.kind);
        self.pending = Some(c);

        Ok(())
    }

    /// Fetch the outstanding challenge
    pub fn pending(&self) -> Option<&Challenge> {
        self.pending.as_ref()
    }

    /// Build the acknowledgement answering the outstanding challenge,
    /// clearing it.
    ///
    /// `secret` is zeroed before returning in all cases. Secret
    /// acknowledgements should be zeroized by the caller once sent.
    pub fn provide_answer(&mut self, secret: &mut [u8]) -> Result<Message, Error> {
        let r = self.build_ack(secret);
        secret.zeroize();
        r
    }

    fn build_ack(&mut self, secret: &[u8]) -> Result<Message, Error> {
        let c = self.pending.take().ok_or(Error::NoPendingChallenge)?;

        if c.kind == ChallengeKind::Button {
            return Ok(ButtonAck {}.into());
        }

        let s = match std::str::from_utf8(secret) {
            Ok(s) => s.to_string(),
            Err(_) => {
                // Nothing was sent, the challenge remains answerable
                self.pending = Some(c);
                return Err(Error::InvalidSecret);
            }
        };

        debug!("Answering {} challenge", c.kind);

        let m = match c.kind {
            ChallengeKind::Pin => PinMatrixAck { pin: s }.into(),
            ChallengeKind::Passphrase => PassphraseAck { passphrase: s }.into(),
            ChallengeKind::Word => WordAck { word: s }.into(),
            ChallengeKind::Otp => OtpAck { otp: s }.into(),
            ChallengeKind::Button => ButtonAck {}.into(),
        };

        Ok(m)
    }

    /// Discard any outstanding challenge
    pub fn clear(&mut self) {
        if let Some(c) = self.pending.take() {
            debug!("Discarding {} challenge", c.kind);
        }
    }
}

/// Source of answers for device challenges (console prompt, UI, test fixture)
#[async_trait]
pub trait ChallengeResponder: Send + Sync {
    /// Answer a challenge, returning `None` to decline.
    ///
    /// Returned buffers are zeroized once the acknowledgement is sent.
    async fn answer(&self, challenge: &Challenge) -> Option<Vec<u8>>;
}
