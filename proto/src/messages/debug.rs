// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Debug link messages, supported by emulator and development firmware only

use super::HdNodeType;

/// Simulate a button press (`yes_no` true to confirm)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugLinkDecision {
    #[prost(bool, required, tag = "1")]
    pub yes_no: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugLinkGetState {}

/// Device debug state.
///
/// As with [HdNodeType], private key material in `node` is not decoded.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugLinkState {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub layout: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub pin: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub matrix: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub mnemonic: Option<String>,
    #[prost(message, optional, tag = "5")]
    pub node: Option<HdNodeType>,
    #[prost(bool, optional, tag = "6")]
    pub passphrase_protection: Option<bool>,
    #[prost(string, optional, tag = "7")]
    pub reset_word: Option<String>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub reset_entropy: Option<Vec<u8>>,
    #[prost(string, optional, tag = "9")]
    pub recovery_fake_word: Option<String>,
    #[prost(uint32, optional, tag = "10")]
    pub recovery_word_pos: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugLinkStop {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugLinkLog {
    #[prost(uint32, optional, tag = "1")]
    pub level: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub bucket: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub text: Option<String>,
}
