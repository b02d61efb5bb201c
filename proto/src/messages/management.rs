// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device setup and entropy messages

use zeroize::Zeroize;

/// Change (or remove) the device PIN
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChangePin {
    #[prost(bool, optional, tag = "1")]
    pub remove: Option<bool>,
}

/// Erase device seed and settings
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WipeDevice {}

/// Load a seed onto the device (debug / test setups only).
///
/// The device protocol also allows loading an HD node directly, this is
/// omitted so host code never constructs private key material.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoadDevice {
    #[prost(string, optional, tag = "1")]
    pub mnemonic: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub pin: Option<String>,
    #[prost(bool, optional, tag = "4")]
    pub passphrase_protection: Option<bool>,
    #[prost(string, optional, tag = "5")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "7")]
    pub skip_checksum: Option<bool>,
}

impl Zeroize for LoadDevice {
    fn zeroize(&mut self) {
        self.mnemonic.zeroize();
        self.pin.zeroize();
    }
}

/// Generate a new seed on the device, mixing in host entropy
/// via [EntropyRequest] / [EntropyAck]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResetDevice {
    #[prost(bool, optional, tag = "1")]
    pub display_random: Option<bool>,
    #[prost(uint32, optional, tag = "2")]
    pub strength: Option<u32>,
    #[prost(bool, optional, tag = "3")]
    pub passphrase_protection: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub pin_protection: Option<bool>,
    #[prost(string, optional, tag = "5")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub label: Option<String>,
}

/// Recover a seed by entering words in response to [WordRequest][super::WordRequest]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecoveryDevice {
    #[prost(uint32, optional, tag = "1")]
    pub word_count: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub passphrase_protection: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub pin_protection: Option<bool>,
    #[prost(string, optional, tag = "4")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "6")]
    pub enforce_wordlist: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplySettings {
    #[prost(string, optional, tag = "1")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub use_passphrase: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub homescreen: Option<Vec<u8>>,
}

/// Request random bytes from the device RNG
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetEntropy {
    #[prost(uint32, required, tag = "1")]
    pub size: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entropy {
    #[prost(bytes = "vec", required, tag = "1")]
    pub entropy: Vec<u8>,
}

/// Device requests host entropy during [ResetDevice]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntropyRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntropyAck {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub entropy: Option<Vec<u8>>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{messages::Message, test::encode_decode_message};

    #[test]
    fn encode_decode_setup() {
        let tests: &[Message] = &[
            ChangePin { remove: Some(true) }.into(),
            ResetDevice {
                strength: Some(256),
                pin_protection: Some(true),
                label: Some("satoshi".to_string()),
                ..Default::default()
            }
            .into(),
            GetEntropy { size: 32 }.into(),
            EntropyAck {
                entropy: Some(vec![0x5a; 32]),
            }
            .into(),
            ApplySettings {
                label: Some("wallet".to_string()),
                use_passphrase: Some(false),
                ..Default::default()
            }
            .into(),
        ];

        for m in tests {
            encode_decode_message(m);
        }
    }

    #[test]
    fn load_device_omits_node() {
        // Tag 2 (HD node) from a device encoded LoadDevice is dropped
        let b = [
            0x12, 0x02, 0x08, 0x01, // node { depth: 1 }
            0x2a, 0x02, b'e', b'n', // language
        ];

        let m = <LoadDevice as prost::Message>::decode(&b[..]).unwrap();
        assert_eq!(
            m,
            LoadDevice {
                language: Some("en".to_string()),
                ..Default::default()
            }
        );
    }
}
