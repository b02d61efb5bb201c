// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wire envelope codec
//!
//! Each message is wrapped in an envelope containing a magic marker,
//! the registry type code, and the payload length.
//!
//! ## Encoding:
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      '#'      |      '#'      |        TYPE_CODE (BE)         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         LENGTH (BE)                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! /                            PAYLOAD                            /
//! /                       (LENGTH bytes)                          /
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Frame-level padding is not applied here, see [frame][crate::frame].

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};
use log::trace;

use crate::{lookup_by_code, Error, MessageType};

/// Envelope magic marker
pub const MAGIC: [u8; 2] = *b"##";

/// Envelope header length (magic, type code, length)
pub const HEADER_LEN: usize = 8;

/// Maximum envelope payload length, larger declared lengths are rejected
/// rather than buffered
pub const MAX_ENVELOPE_LEN: usize = 1 << 20;

/// Envelope header
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Header {
    /// Message type code
    pub msg_type: u16,
    /// Payload length
    pub length: u32,
}

impl Encode for Header {
    type Error = Error;

    fn encode_len(&self) -> Result<usize, Error> {
        Ok(HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < HEADER_LEN {
            return Err(Error::InvalidLength);
        }

        buff[..2].copy_from_slice(&MAGIC);
        BigEndian::write_u16(&mut buff[2..], self.msg_type);
        BigEndian::write_u32(&mut buff[4..], self.length);

        Ok(HEADER_LEN)
    }
}

impl DecodeOwned for Header {
    type Output = Self;

    type Error = Error;

    /// Decode a header, this expects the magic marker at the start of the buffer
    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Error> {
        if buff.len() < HEADER_LEN || buff[..2] != MAGIC {
            return Err(Error::InvalidLength);
        }

        let msg_type = BigEndian::read_u16(&buff[2..]);
        let length = BigEndian::read_u32(&buff[4..]);

        Ok((Self { msg_type, length }, HEADER_LEN))
    }
}

/// Typed message envelope
#[derive(Clone, PartialEq, Debug)]
pub struct Envelope {
    /// Registered message type
    pub msg_type: MessageType,
    /// Encoded message payload
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Encode envelope to bytes
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        encode(self.msg_type, &self.payload)
    }
}

/// Encode a payload for the provided message type
pub fn encode(msg_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, Error> {
    encode_raw(msg_type.code(), payload)
}

/// Encode a payload with an arbitrary type code, payloads over
/// [MAX_ENVELOPE_LEN] return [Error::EnvelopeTooLarge]
pub fn encode_raw(code: u16, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let length = match u32::try_from(payload.len()) {
        Ok(n) if payload.len() <= MAX_ENVELOPE_LEN => n,
        _ => return Err(Error::EnvelopeTooLarge(payload.len())),
    };

    let h = Header {
        msg_type: code,
        length,
    };

    let mut b = vec![0u8; HEADER_LEN + payload.len()];

    let n = h.encode(&mut b)?;
    b[n..].copy_from_slice(payload);

    Ok(b)
}

/// Decode a single envelope from a contiguous buffer, returning the
/// envelope and the number of bytes consumed (including any bytes
/// skipped prior to the magic marker).
pub fn decode(buff: &[u8]) -> Result<(Envelope, usize), Error> {
    let mut d = Decoder::new();
    d.push(buff)?;

    match d.next()? {
        Some(e) => Ok((e, buff.len() - d.buffered())),
        None => Err(d.short_read()),
    }
}

/// Incremental envelope decoder.
///
/// Bytes are pushed as they are received and complete envelopes retrieved
/// via [Decoder::next]. Bytes preceding a magic marker are discarded, so a
/// decoder that has failed mid-envelope resynchronises on the next marker.
#[derive(Clone, Debug, Default)]
pub struct Decoder {
    /// Buffered bytes not yet consumed
    buff: Vec<u8>,
    /// Header for the envelope currently being received
    header: Option<Header>,
    /// Optional transport sync marker prefixing each pushed chunk
    sync: Option<u8>,
}

impl Decoder {
    /// Create a decoder for flat byte streams
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder for chunks prefixed with a transport sync marker
    pub fn with_sync(sync: u8) -> Self {
        Self {
            sync: Some(sync),
            ..Default::default()
        }
    }

    /// Push a received chunk into the decoder.
    ///
    /// Where a sync marker is configured, a leading marker is discarded
    /// from chunks starting an envelope and _required_ on continuation
    /// chunks, returning [Error::UnsyncedFrame] otherwise.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), Error> {
        let sync = match self.sync {
            Some(s) => s,
            None => {
                self.buff.extend_from_slice(chunk);
                return Ok(());
            }
        };

        let first = match chunk.first() {
            Some(b) => *b,
            None => return Ok(()),
        };

        if first == sync {
            self.buff.extend_from_slice(&chunk[1..]);
            return Ok(());
        }

        if self.is_partial() {
            self.resync();
            return Err(Error::UnsyncedFrame {
                expected: sync,
                actual: first,
            });
        }

        self.buff.extend_from_slice(chunk);
        Ok(())
    }

    /// Fetch the next complete envelope if available.
    ///
    /// Returns [Error::UnknownTypeCode] once an envelope with an unregistered
    /// type code has been fully received, consuming that envelope.
    pub fn next(&mut self) -> Result<Option<Envelope>, Error> {
        let h = match self.header {
            Some(h) => h,
            None => match self.parse_header()? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let n = h.length as usize;
        if self.buff.len() < n {
            return Ok(None);
        }

        let payload: Vec<u8> = self.buff.drain(..n).collect();
        self.header = None;

        let msg_type = lookup_by_code(h.msg_type)?;

        trace!("decoded envelope: {} ({} bytes)", msg_type, n);

        Ok(Some(Envelope { msg_type, payload }))
    }

    /// Locate and parse the next header in the buffer
    fn parse_header(&mut self) -> Result<Option<Header>, Error> {
        match self.buff.windows(2).position(|w| w == MAGIC) {
            Some(i) => {
                self.buff.drain(..i);
            }
            None => {
                // Retain a trailing partial marker
                let keep = matches!(self.buff.last(), Some(b) if *b == MAGIC[0]);
                let n = self.buff.len() - keep as usize;
                self.buff.drain(..n);
                return Ok(None);
            }
        }

        if self.buff.len() < HEADER_LEN {
            return Ok(None);
        }

        let (h, n) = Header::decode_owned(&self.buff)?;
        self.buff.drain(..n);

        // Drop the header, scanning resumes at the next marker
        if h.length as usize > MAX_ENVELOPE_LEN {
            return Err(Error::EnvelopeTooLarge(h.length as usize));
        }

        self.header = Some(h);

        Ok(Some(h))
    }

    /// Check whether a partially received envelope is pending
    pub fn is_partial(&self) -> bool {
        self.header.is_some() || self.buff.windows(2).any(|w| w == MAGIC)
    }

    /// Number of buffered bytes not yet consumed
    pub fn buffered(&self) -> usize {
        self.buff.len()
    }

    /// Signal end of stream, returning [Error::ShortRead] if an envelope
    /// was partially received
    pub fn finish(&mut self) -> Result<(), Error> {
        if !self.is_partial() {
            self.buff.clear();
            return Ok(());
        }

        let e = self.short_read();
        self.resync();
        Err(e)
    }

    /// Discard any partially received envelope, decoding resumes at the
    /// next magic marker
    pub fn resync(&mut self) {
        if self.header.take().is_some() {
            self.buff.clear();
            return;
        }

        // Skip the marker at the head of the buffer if present
        match self.buff.windows(2).position(|w| w == MAGIC) {
            Some(i) => {
                self.buff.drain(..i + 2);
            }
            None => self.buff.clear(),
        }
    }

    /// Build a [Error::ShortRead] for the current partial envelope
    fn short_read(&self) -> Error {
        match self.header {
            Some(h) => Error::ShortRead {
                expected: h.length as usize,
                actual: self.buff.len(),
            },
            None => Error::ShortRead {
                expected: HEADER_LEN,
                actual: self.buff.len(),
            },
        }
    }
}
