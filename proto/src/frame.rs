// Copyright (c) 2022-2023 The MobileCoin Foundation

//! HID frame codec
//!
//! Messages are carried over HID as a sequence of fixed 64-byte frames,
//! each containing a length byte followed by up to 63 bytes of content.
//!
//! ## Encoding:
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    LENGTH     |                                               |
//! +-+-+-+-+-+-+-+-+                                               +
//! /                            CONTENT                            /
//! /                  (LENGTH bytes, zero padded)                  /
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Frames do not describe message boundaries, when reading raw frames
//! the end of a message is detected by the link going quiet (see
//! `hwlink::link`). Where the envelope length is available frames may
//! instead be written as sync-marked reports via [encode_reports] and
//! decoded by length with [Decoder][crate::envelope::Decoder].

use crate::Error;

/// Fixed HID frame / report length
pub const FRAME_LEN: usize = 64;

/// Maximum content per frame
pub const MAX_CHUNK: usize = FRAME_LEN - 1;

/// Sync marker for HID reports (`?`), also the length byte of a full frame
pub const HID_SYNC: u8 = b'?';

/// Fixed-size link frame
pub type Frame = [u8; FRAME_LEN];

/// Split a payload into length-prefixed frames.
///
/// An empty payload produces a single frame with a zero length byte,
/// otherwise every emitted frame carries content.
pub fn encode_frames(payload: &[u8]) -> Vec<Frame> {
    if payload.is_empty() {
        return vec![[0u8; FRAME_LEN]];
    }

    payload
        .chunks(MAX_CHUNK)
        .map(|c| {
            let mut f = [0u8; FRAME_LEN];
            f[0] = c.len() as u8;
            f[1..][..c.len()].copy_from_slice(c);
            f
        })
        .collect()
}

/// Split a payload into reports prefixed with a fixed sync marker,
/// with the final report zero padded
pub fn encode_reports(payload: &[u8], sync: u8) -> Vec<Frame> {
    let mut frames: Vec<Frame> = payload
        .chunks(MAX_CHUNK)
        .map(|c| {
            let mut f = [0u8; FRAME_LEN];
            f[0] = sync;
            f[1..][..c.len()].copy_from_slice(c);
            f
        })
        .collect();

    if frames.is_empty() {
        let mut f = [0u8; FRAME_LEN];
        f[0] = sync;
        frames.push(f);
    }

    frames
}

/// Fetch the content of a received length-prefixed frame
pub fn frame_content(frame: &[u8]) -> Result<&[u8], Error> {
    let n = match frame.first() {
        Some(n) => *n as usize,
        None => return Ok(&[]),
    };

    if n > MAX_CHUNK || n > frame.len() - 1 {
        return Err(Error::FrameLength(n));
    }

    Ok(&frame[1..][..n])
}

/// Accumulates frame content into a message buffer
#[derive(Clone, Debug, Default)]
pub struct Reassembler {
    buff: Vec<u8>,
    frames: usize,
}

impl Reassembler {
    /// Create a new (empty) reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received frame, returning the content length
    pub fn push(&mut self, frame: &[u8]) -> Result<usize, Error> {
        let c = frame_content(frame)?;
        self.buff.extend_from_slice(c);
        self.frames += 1;
        Ok(c.len())
    }

    /// Number of frames received
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Fetch reassembled message bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.buff
    }
}

#[cfg(test)]
mod test {
    use rand::random;

    use super::*;

    fn reassemble(frames: &[Frame]) -> Vec<u8> {
        let mut r = Reassembler::new();
        for f in frames {
            r.push(f).expect("push frame failed");
        }
        r.into_inner()
    }

    #[test]
    fn single_frame_boundary() {
        let p = [0xa5u8; 63];
        let frames = encode_frames(&p);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], 63);
        assert_eq!(&frames[0][1..], &p[..]);
    }

    #[test]
    fn two_frame_boundary() {
        let p = [0x5au8; 64];
        let frames = encode_frames(&p);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], 63);
        assert_eq!(frames[1][0], 1);
        assert_eq!(frames[1][1], 0x5a);
        assert!(frames[1][2..].iter().all(|b| *b == 0), "padding not zeroed");
    }

    #[test]
    fn empty_payload_single_frame() {
        let frames = encode_frames(&[]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], 0);

        assert!(reassemble(&frames).is_empty());
    }

    #[test]
    fn frame_reassembly() {
        for n in [1, 62, 63, 64, 125, 126, 127, 1000, 4096, 10000] {
            let p: Vec<u8> = (0..n).map(|_| random()).collect();

            let frames = encode_frames(&p);
            assert_eq!(frames.len(), (n + MAX_CHUNK - 1) / MAX_CHUNK);

            assert_eq!(reassemble(&frames), p, "reassembly mismatch for {n} bytes");
        }
    }

    #[test]
    fn invalid_frame_length() {
        let mut f = [0u8; FRAME_LEN];
        f[0] = 64;

        assert_eq!(frame_content(&f), Err(Error::FrameLength(64)));

        // Length exceeding received bytes is also invalid
        assert_eq!(frame_content(&f[..10][..]), Err(Error::FrameLength(64)));
        f[0] = 20;
        assert_eq!(frame_content(&f[..10]), Err(Error::FrameLength(20)));
    }

    #[test]
    fn sync_reports() {
        let p = [0x11u8; 100];
        let frames = encode_reports(&p, HID_SYNC);

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f[0] == HID_SYNC));
        assert_eq!(&frames[1][1..38], &p[63..]);
        assert!(frames[1][38..].iter().all(|b| *b == 0));
    }
}
