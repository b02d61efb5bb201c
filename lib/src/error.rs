// Copyright (c) 2022-2023 The MobileCoin Foundation

use hwlink_proto::{messages::FailureType, MessageType};
use tokio::time::error::Elapsed;

use crate::{challenge::ChallengeKind, session::SessionState};

/// Hardware wallet API Error Type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Framing or protocol error
    #[error("Protocol error: {0}")]
    Proto(#[from] hwlink_proto::Error),

    /// Transport did not accept a complete frame
    #[error("Transport write failed (expected {expected} bytes, wrote {actual})")]
    TransportWrite { expected: usize, actual: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HID error
    #[cfg(feature = "transport_hid")]
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// HID Init Error
    #[error("could not create HidApi instance")]
    HidInit,

    /// No matching device present
    #[error("No device found")]
    NoDevice,

    /// Transport closed or device removed
    #[error("Device disconnected")]
    Disconnected,

    /// Session not attached to a device
    #[error("Device not attached")]
    NotAttached,

    /// Session not connected
    #[error("Device not connected")]
    NotConnected,

    /// Session was hard detached and can not be reused
    #[error("Device hard detached")]
    HardDetached,

    /// Request timeout
    #[error("Timeout waiting for device response")]
    ResponseTimeout,

    /// Timeout waiting for user
    #[error("Timeout waiting for user interaction")]
    UserTimeout,

    /// Session is not ready to send
    #[error("Session busy (state: {0})")]
    Busy(SessionState),

    /// Device issued a challenge while another is outstanding
    #[error("Challenge already pending")]
    ChallengeAlreadyPending,

    /// Challenge answer provided with no outstanding challenge
    #[error("No pending challenge")]
    NoPendingChallenge,

    /// Challenge answer could not be encoded
    #[error("Invalid challenge answer (expected UTF-8)")]
    InvalidSecret,

    /// Challenge received with no way to answer it
    #[error("Unanswered {0} challenge")]
    ChallengeUnanswered(ChallengeKind),

    /// Transaction signing aborted by the host
    #[error("Signing aborted: {0}")]
    SigningAborted(String),

    /// Transport failed while signing
    #[error("Device disconnected during signing")]
    DisconnectedDuringSigning,

    /// Failure reported by the device
    #[error("Device failure ({code:?}): {message}")]
    Failure { code: FailureType, message: String },

    /// Unexpected response message
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(MessageType),
}

impl Error {
    /// Framing errors are fatal to the current message only
    pub fn is_framing(&self) -> bool {
        matches!(self, Error::Proto(e) if e.is_framing())
    }

    /// Transport errors always terminate the session
    pub fn is_transport(&self) -> bool {
        #[cfg(feature = "transport_hid")]
        if matches!(self, Error::Hid(_)) {
            return true;
        }

        matches!(
            self,
            Error::Io(_) | Error::TransportWrite { .. } | Error::Disconnected
        )
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::ResponseTimeout
    }
}

impl From<hwlink_proto::messages::Failure> for Error {
    fn from(f: hwlink_proto::messages::Failure) -> Self {
        Error::Failure {
            code: f.code(),
            message: f.message().to_string(),
        }
    }
}
