// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::{envelope::MAX_ENVELOPE_LEN, frame::MAX_CHUNK, MessageType};

/// Protocol error type
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error {
    /// Frame length byte exceeds the frame capacity
    #[error("Invalid frame length {0} (max: {MAX_CHUNK})")]
    FrameLength(usize),

    /// Stream ended before the declared envelope length was received
    #[error("Short read (expected {expected} bytes, received {actual})")]
    ShortRead { expected: usize, actual: usize },

    /// Envelope length exceeds [MAX_ENVELOPE_LEN]
    #[error("Envelope too large ({0} bytes, max: {MAX_ENVELOPE_LEN})")]
    EnvelopeTooLarge(usize),

    /// Continuation report missing the transport sync marker
    #[error("Unsynced frame (expected marker 0x{expected:02x}, received 0x{actual:02x})")]
    UnsyncedFrame { expected: u8, actual: u8 },

    /// Type code not present in the message registry
    #[error("Unknown message type code: {0}")]
    UnknownTypeCode(u16),

    /// Payload failed to decode for the declared type
    #[error("Invalid {0} payload: {1}")]
    InvalidPayload(MessageType, String),

    /// Buffer too short for encode / decode
    #[error("Invalid length")]
    InvalidLength,

    /// Identity URI could not be parsed
    #[error("Invalid identity URI: {0}")]
    InvalidUri(String),
}

impl Error {
    /// Check whether an error is a framing error, these are fatal to the
    /// current message but allow resynchronisation on the next envelope
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::FrameLength(_)
                | Error::ShortRead { .. }
                | Error::UnsyncedFrame { .. }
                | Error::EnvelopeTooLarge(_)
        )
    }
}

impl From<encdec::Error> for Error {
    fn from(_: encdec::Error) -> Self {
        Error::InvalidLength
    }
}
