// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Common imports for protocol users

pub use crate::{
    envelope::{Decoder, Envelope},
    frame::{Frame, FRAME_LEN, HID_SYNC, MAX_CHUNK},
    ident::build_address_n,
    lookup_by_code,
    messages::*,
    Error as ProtoError, HARDENED,
};
