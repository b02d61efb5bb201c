// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wire protocol definitions for hardware wallet communication
//!
//! This crate provides the byte-level protocol used between a host and a
//! hardware wallet, with no I/O of its own:
//!
//! - [frame] splits messages into fixed 64-byte HID frames and reassembles them
//! - [envelope] wraps typed payloads in a `"##" || type || length` envelope
//! - [messages] defines the message schemas and the bijective
//!   [MessageType] registry mapping schemas to type codes
//! - [ident] derives SLIP-0013 identity paths
//!
//! Payloads use the device's protobuf encoding (via `prost`), envelope headers
//! are big-endian and fixed-width regardless of host byte order.
//!
//! Messages that may carry private key material on the device side are
//! declared here without those fields, so they are dropped during decoding
//! and never reach host memory.

pub mod envelope;
pub mod frame;
pub mod ident;
pub mod messages;
pub mod prelude;

mod error;
pub use error::Error;

pub use envelope::{Envelope, Header};
pub use messages::{lookup_by_code, Message, MessageType};

/// Hardened derivation flag for BIP-0032 path components
pub const HARDENED: u32 = 1 << 31;
