// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key, address, message signing, identity and encryption messages

use crate::{ident::build_address_n, Error};

/// BIP-0032 HD node.
///
/// The device schema also carries `private_key` (tag 5), this is
/// intentionally not declared so the field is skipped on decode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HdNodeType {
    #[prost(uint32, required, tag = "1")]
    pub depth: u32,
    #[prost(uint32, required, tag = "2")]
    pub fingerprint: u32,
    #[prost(uint32, required, tag = "3")]
    pub child_num: u32,
    #[prost(bytes = "vec", required, tag = "4")]
    pub chain_code: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub public_key: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPublicKey {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(string, optional, tag = "2")]
    pub ecdsa_curve_name: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub show_display: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicKey {
    #[prost(message, optional, tag = "1")]
    pub node: Option<HdNodeType>,
    #[prost(string, optional, tag = "2")]
    pub xpub: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAddress {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(string, optional, tag = "2")]
    pub coin_name: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub show_display: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
    #[prost(string, required, tag = "1")]
    pub address: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignMessage {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub message: Vec<u8>,
    #[prost(string, optional, tag = "3")]
    pub coin_name: Option<String>,
}

/// Request signature verification on the device, responds with
/// [Success][super::Success] or [Failure][super::Failure]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyMessage {
    #[prost(string, optional, tag = "1")]
    pub address: Option<String>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub signature: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub message: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageSignature {
    #[prost(string, optional, tag = "1")]
    pub address: Option<String>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub signature: Option<Vec<u8>>,
}

/// Symmetric encrypt / decrypt of a value with a key derived on the device
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CipherKeyValue {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(string, optional, tag = "2")]
    pub key: Option<String>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub value: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "4")]
    pub encrypt: Option<bool>,
    #[prost(bool, optional, tag = "5")]
    pub ask_on_encrypt: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub ask_on_decrypt: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub iv: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CipheredKeyValue {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub pubkey: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub display_only: Option<bool>,
    #[prost(uint32, repeated, packed = "false", tag = "4")]
    pub address_n: Vec<u32>,
    #[prost(string, optional, tag = "5")]
    pub coin_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptedMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub nonce: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub hmac: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptMessage {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub nonce: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub message: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub hmac: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptedMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub message: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub address: Option<String>,
}

/// SLIP-0013 identity, see [crate::ident]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentityType {
    #[prost(string, optional, tag = "1")]
    pub proto: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub user: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub port: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub path: Option<String>,
    #[prost(uint32, optional, tag = "6")]
    pub index: Option<u32>,
}

impl IdentityType {
    /// Parse an identity from a URI of the form `proto://user@host:port/path`
    pub fn from_uri(uri: &str, index: u32) -> Result<Self, Error> {
        let u = url::Url::parse(uri).map_err(|e| Error::InvalidUri(e.to_string()))?;

        let non_empty = |s: &str| match s.is_empty() {
            true => None,
            false => Some(s.to_string()),
        };

        let path = match u.path() {
            "/" => None,
            p => non_empty(p),
        };

        Ok(Self {
            proto: non_empty(u.scheme()),
            user: non_empty(u.username()),
            host: u.host_str().and_then(non_empty),
            port: u.port().map(|p| p.to_string()),
            path,
            index: Some(index),
        })
    }

    /// Rebuild the canonical identity URI, `proto://user@host:port/path`
    pub fn uri(&self) -> String {
        let mut s = String::new();

        if let Some(p) = &self.proto {
            s.push_str(p);
            s.push_str("://");
        }
        if let Some(u) = &self.user {
            s.push_str(u);
            s.push('@');
        }
        if let Some(h) = &self.host {
            s.push_str(h);
        }
        if let Some(p) = &self.port {
            s.push(':');
            s.push_str(p);
        }
        if let Some(p) = &self.path {
            s.push_str(p);
        }

        s
    }

    /// Compute the SLIP-0013 derivation path for this identity
    pub fn address_n(&self) -> [u32; 5] {
        build_address_n(&self.uri(), self.index())
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignIdentity {
    #[prost(message, optional, tag = "1")]
    pub identity: Option<IdentityType>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub challenge_hidden: Option<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub challenge_visual: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub ecdsa_curve_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedIdentity {
    #[prost(string, optional, tag = "1")]
    pub address: Option<String>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub public_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub signature: Option<Vec<u8>>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{messages::Message, test::encode_decode_message, HARDENED};

    #[test]
    fn private_key_dropped() {
        // HDNode with depth 2, fingerprint 1, child 0, chain code, private key (tag 5)
        // and public key (tag 6)
        let mut b = vec![0x08, 0x02, 0x10, 0x01, 0x18, 0x00, 0x22, 0x02, 0xcc, 0xdd];
        b.extend_from_slice(&[0x2a, 0x04, 0xde, 0xad, 0xbe, 0xef]);
        b.extend_from_slice(&[0x32, 0x02, 0x02, 0x03]);

        let n = <HdNodeType as prost::Message>::decode(&b[..]).unwrap();

        assert_eq!(
            n,
            HdNodeType {
                depth: 2,
                fingerprint: 1,
                child_num: 0,
                chain_code: vec![0xcc, 0xdd],
                public_key: Some(vec![0x02, 0x03]),
            }
        );

        // Re-encoding never emits the private key
        let e = prost::Message::encode_to_vec(&n);
        assert!(!e.windows(4).any(|w| w == [0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn identity_from_uri() {
        let i = IdentityType::from_uri("https://satoshi@bitcoin.org/login", 0).unwrap();

        assert_eq!(i.proto(), "https");
        assert_eq!(i.user(), "satoshi");
        assert_eq!(i.host(), "bitcoin.org");
        assert_eq!(i.port, None);
        assert_eq!(i.path(), "/login");
        assert_eq!(i.uri(), "https://satoshi@bitcoin.org/login");

        assert_eq!(
            i.address_n(),
            [
                13 | HARDENED,
                490267344 | HARDENED,
                697598796 | HARDENED,
                1613620211 | HARDENED,
                1858012177 | HARDENED,
            ]
        );

        let i = IdentityType::from_uri("ssh://one", 0).unwrap();
        assert_eq!(i.uri(), "ssh://one");

        let i = IdentityType::from_uri("gpg://alice@example.com:2222", 3).unwrap();
        assert_eq!(i.port(), "2222");
        assert_eq!(i.index(), 3);
    }

    #[test]
    fn identity_invalid_uri() {
        assert!(matches!(
            IdentityType::from_uri("not a uri", 0),
            Err(Error::InvalidUri(_))
        ));
    }

    #[test]
    fn encode_decode_signing() {
        let tests: &[Message] = &[
            SignMessage {
                address_n: vec![HARDENED, 1],
                message: b"This is an example of a signed message.".to_vec(),
                coin_name: Some("Bitcoin".to_string()),
            }
            .into(),
            MessageSignature {
                address: Some("14LmW5k4ssUrtbAB4255zdqv3b4w1TuX9e".to_string()),
                signature: Some(vec![0x1f; 65]),
            }
            .into(),
            SignIdentity {
                identity: IdentityType::from_uri("ssh://one", 0).ok(),
                challenge_hidden: Some(vec![1; 32]),
                challenge_visual: Some("2015-03-23 17:39:22".to_string()),
                ecdsa_curve_name: None,
            }
            .into(),
            CipherKeyValue {
                address_n: vec![HARDENED, 2],
                key: Some("test".to_string()),
                value: Some(vec![0u8; 16]),
                encrypt: Some(true),
                ..Default::default()
            }
            .into(),
        ];

        for m in tests {
            encode_decode_message(m);
        }
    }
}
