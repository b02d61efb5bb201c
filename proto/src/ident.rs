// Copyright (c) 2022-2023 The MobileCoin Foundation

//! SLIP-0013 identity path derivation
//!
//! <https://github.com/satoshilabs/slips/blob/master/slip-0013.md>

use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha256};

use crate::HARDENED;

/// SLIP-0013 purpose index
pub const SLIP13_PURPOSE: u32 = 13;

/// Compute the derivation path for an identity URI and index.
///
/// The first 128 bits of `SHA256(le32(index) || uri)` are split into four
/// little-endian words, each hardened and prefixed by the hardened purpose.
pub fn build_address_n(uri: &str, index: u32) -> [u32; 5] {
    let mut hasher = Sha256::new();

    hasher.update(index.to_le_bytes());
    hasher.update(uri.as_bytes());

    let r = hasher.finalize();
    let b = r.as_slice();

    let mut p = [0u32; 5];
    p[0] = SLIP13_PURPOSE | HARDENED;
    for i in 0..4 {
        p[i + 1] = LittleEndian::read_u32(&b[i * 4..]) | HARDENED;
    }

    p
}
