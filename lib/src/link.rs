// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Link layer, message framing over a [Transport]
//!
//! - [Framing::Stream] transports carry envelopes as a flat byte stream
//! - [Framing::Chunked] transports carry length-prefixed 64-byte frames,
//!   a message is complete once the link goes quiet for the frame timeout
//! - [Framing::Synced] transports carry sync-marked 64-byte reports,
//!   messages are delimited by the envelope length

use std::time::Duration;

use log::trace;
use zeroize::Zeroize;

use hwlink_proto::{
    envelope::{Decoder, Envelope},
    frame::{encode_frames, encode_reports, Frame, Reassembler, FRAME_LEN},
};

use crate::{
    transport::{Framing, Transport},
    Error,
};

/// Read buffer size for stream transports
const STREAM_CHUNK: usize = 1024;

/// Write a message to the transport using the transport's framing.
///
/// Each frame must be fully accepted by the transport, otherwise this fails
/// with [Error::TransportWrite]. Frame buffers are zeroed once written.
pub async fn write_message<T: Transport + ?Sized>(t: &mut T, data: &[u8]) -> Result<(), Error> {
    let mut frames: Vec<Frame> = match t.framing() {
        Framing::Stream => {
            let n = t.write(data).await?;
            if n != data.len() {
                return Err(Error::TransportWrite {
                    expected: data.len(),
                    actual: n,
                });
            }
            return Ok(());
        }
        Framing::Chunked => encode_frames(data),
        Framing::Synced(s) => encode_reports(data, s),
    };

    trace!("write {} bytes ({} frames)", data.len(), frames.len());

    let mut r = Ok(());
    for f in frames.iter() {
        match t.write(f).await {
            Ok(n) if n == FRAME_LEN => (),
            Ok(n) => {
                r = Err(Error::TransportWrite {
                    expected: FRAME_LEN,
                    actual: n,
                });
                break;
            }
            Err(e) => {
                r = Err(e);
                break;
            }
        }
    }

    frames.iter_mut().for_each(|f| f.zeroize());

    r
}

/// Read a message of length-prefixed frames.
///
/// The first read blocks until data arrives, following frames are read with
/// `frame_timeout` until a read returns no data.
pub async fn read_message<T: Transport + ?Sized>(
    t: &mut T,
    frame_timeout: Duration,
) -> Result<Vec<u8>, Error> {
    let mut r = Reassembler::new();
    let mut f = [0u8; FRAME_LEN];

    // Blocking read for the first frame
    let n = t.read(&mut f, None).await?;
    r.push(&f[..n])?;

    // Timeout reads for following frames
    loop {
        let n = t.read(&mut f, Some(frame_timeout)).await?;
        if n == 0 {
            break;
        }

        r.push(&f[..n])?;
    }

    trace!("read {} frames", r.frames());

    Ok(r.into_inner())
}

/// Read the next complete envelope, buffering any following data in the
/// provided decoder
pub async fn read_envelope<T: Transport + ?Sized>(
    t: &mut T,
    decoder: &mut Decoder,
    frame_timeout: Duration,
) -> Result<Envelope, Error> {
    loop {
        if let Some(e) = decoder.next()? {
            return Ok(e);
        }

        match t.framing() {
            Framing::Chunked => {
                let m = read_message(t, frame_timeout).await?;
                decoder.push(&m)?;

                // Link silence ends the message, a partial envelope is a short read
                if let Some(e) = decoder.next()? {
                    return Ok(e);
                }
                decoder.finish()?;
            }
            Framing::Synced(_) => {
                let mut f = [0u8; FRAME_LEN];
                let n = t.read(&mut f, None).await?;
                decoder.push(&f[..n])?;
            }
            Framing::Stream => {
                let mut b = [0u8; STREAM_CHUNK];
                let n = t.read(&mut b, None).await?;
                decoder.push(&b[..n])?;
            }
        }
    }
}
