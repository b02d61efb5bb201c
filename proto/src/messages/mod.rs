// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Message schemas and the message type registry
//!
//! [MessageType] provides a static bijective mapping between message schemas
//! and wire type codes, [Message] carries decoded payloads for each type.
//! Unknown type codes are always rejected ([Error::UnknownTypeCode]) rather
//! than skipped, dropping a device request would desynchronise the
//! half-duplex protocol.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString};
use zeroize::Zeroize;

use crate::{envelope::Envelope, Error};

mod common;
pub use common::*;

mod management;
pub use management::*;

mod crypto;
pub use crypto::*;

mod tx;
pub use tx::*;

mod debug;
pub use debug::*;

/// Generate the [MessageType] registry and [Message] container
macro_rules! messages {
    ($($(#[$meta:meta])* $name:ident = $code:literal,)*) => {
        /// Message type registry, maps message schemas to wire type codes
        ///
        /// Displays as the event name for the message (eg. `PIN_MATRIX_REQUEST`)
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, Debug,
            Display, EnumIter, EnumString, TryFromPrimitive, IntoPrimitive,
        )]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
        #[repr(u16)]
        pub enum MessageType {
            $(
                $(#[$meta])*
                $name = $code,
            )*
        }

        /// Decoded protocol message
        #[derive(Clone, PartialEq, Debug)]
        pub enum Message {
            $(
                $(#[$meta])*
                $name($name),
            )*
        }

        impl Message {
            /// Fetch the registry type for a message
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(Message::$name(_) => MessageType::$name,)*
                }
            }

            /// Encode message payload (without envelope)
            pub fn encode_payload(&self) -> Vec<u8> {
                match self {
                    $(Message::$name(m) => prost::Message::encode_to_vec(m),)*
                }
            }

            /// Decode a message payload for the provided type
            pub fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<Self, Error> {
                let r = match msg_type {
                    $(MessageType::$name => {
                        <$name as prost::Message>::decode(payload).map(Message::$name)
                    })*
                };

                r.map_err(|e| Error::InvalidPayload(msg_type, e.to_string()))
            }
        }

        $(
            impl From<$name> for Message {
                fn from(m: $name) -> Self {
                    Message::$name(m)
                }
            }

            /// Unwrap a specific message, returning the original on mismatch
            impl TryFrom<Message> for $name {
                type Error = Message;

                fn try_from(m: Message) -> Result<Self, Message> {
                    match m {
                        Message::$name(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

messages!(
    // Handshake
    Initialize = 0,
    Ping = 1,
    Features = 17,
    GetFeatures = 55,

    // Generic responses / control
    Success = 2,
    Failure = 3,
    Cancel = 20,
    ClearSession = 24,

    // Device setup
    ChangePin = 4,
    WipeDevice = 5,
    LoadDevice = 13,
    ResetDevice = 14,
    ApplySettings = 25,
    RecoveryDevice = 45,

    // Entropy
    GetEntropy = 9,
    Entropy = 10,
    EntropyRequest = 35,
    EntropyAck = 36,

    // Keys
    GetPublicKey = 11,
    PublicKey = 12,
    GetAddress = 29,
    Address = 30,

    // Transaction signing
    SignTx = 15,
    SimpleSignTx = 16,
    TxRequest = 21,
    TxAck = 22,
    EstimateTxSize = 43,
    TxSize = 44,

    // Message / identity signing
    SignMessage = 38,
    VerifyMessage = 39,
    MessageSignature = 40,
    SignIdentity = 53,
    SignedIdentity = 54,

    // Challenges
    PinMatrixRequest = 18,
    PinMatrixAck = 19,
    ButtonRequest = 26,
    ButtonAck = 27,
    PassphraseRequest = 41,
    PassphraseAck = 42,
    WordRequest = 46,
    WordAck = 47,
    OtpRequest = 56,
    OtpAck = 57,

    // Encryption
    CipherKeyValue = 23,
    CipheredKeyValue = 48,
    EncryptMessage = 49,
    EncryptedMessage = 50,
    DecryptMessage = 51,
    DecryptedMessage = 52,

    // Debug link
    DebugLinkDecision = 100,
    DebugLinkGetState = 101,
    DebugLinkState = 102,
    DebugLinkStop = 103,
    DebugLinkLog = 104,
);

/// Resolve a wire type code to a [MessageType]
pub fn lookup_by_code(code: u16) -> Result<MessageType, Error> {
    MessageType::try_from(code).map_err(|e| Error::UnknownTypeCode(e.number))
}

impl MessageType {
    /// Fetch the wire type code for a message type
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check whether a message type is a device challenge requiring
    /// host-supplied data or acknowledgement
    pub fn is_challenge(&self) -> bool {
        matches!(
            self,
            MessageType::PinMatrixRequest
                | MessageType::PassphraseRequest
                | MessageType::ButtonRequest
                | MessageType::WordRequest
                | MessageType::OtpRequest
        )
    }
}

impl Message {
    /// Wrap a message in an [Envelope]
    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.message_type(), self.encode_payload())
    }

    /// Decode a message from an [Envelope]
    pub fn from_envelope(e: &Envelope) -> Result<Self, Error> {
        Self::decode_payload(e.msg_type, &e.payload)
    }

    /// Encode message with envelope
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        self.to_envelope().encode()
    }

    /// Check whether a message carries host secrets (challenge answers, seeds)
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Message::PinMatrixAck(_)
                | Message::PassphraseAck(_)
                | Message::WordAck(_)
                | Message::OtpAck(_)
                | Message::LoadDevice(_)
        )
    }
}

/// Erase secret fields, no-op for messages without secrets
impl Zeroize for Message {
    fn zeroize(&mut self) {
        match self {
            Message::PinMatrixAck(m) => m.zeroize(),
            Message::PassphraseAck(m) => m.zeroize(),
            Message::WordAck(m) => m.zeroize(),
            Message::OtpAck(m) => m.zeroize(),
            Message::LoadDevice(m) => m.zeroize(),
            _ => (),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::test::encode_decode_message;

    #[test]
    fn registry_bijection() {
        let mut codes = HashSet::new();

        for t in MessageType::iter() {
            // Codes are unique
            assert!(codes.insert(t.code()), "duplicate code for {t:?}");

            // Code lookup returns the same schema
            assert_eq!(lookup_by_code(t.code()), Ok(t));

            // Default message for the type maps back to the type
            let m = Message::decode_payload(t, &[]).expect("decode empty payload");
            assert_eq!(m.message_type(), t);
        }
    }

    #[test]
    fn unknown_codes_rejected() {
        for c in [8u16, 28, 37, 58, 99, 105, 0xffff] {
            assert_eq!(lookup_by_code(c), Err(Error::UnknownTypeCode(c)));
        }
    }

    #[test]
    fn event_names() {
        assert_eq!(MessageType::PinMatrixRequest.to_string(), "PIN_MATRIX_REQUEST");
        assert_eq!(MessageType::TxRequest.to_string(), "TX_REQUEST");
        assert_eq!(MessageType::Features.to_string(), "FEATURES");
        assert_eq!(
            "BUTTON_REQUEST".parse::<MessageType>(),
            Ok(MessageType::ButtonRequest)
        );
    }

    #[test]
    fn challenge_types() {
        let challenges: Vec<_> = MessageType::iter().filter(|t| t.is_challenge()).collect();

        assert_eq!(
            challenges,
            vec![
                MessageType::PinMatrixRequest,
                MessageType::ButtonRequest,
                MessageType::PassphraseRequest,
                MessageType::WordRequest,
                MessageType::OtpRequest,
            ]
        );
    }

    #[test]
    fn encode_decode_messages() {
        let messages: Vec<Message> = vec![
            Ping {
                message: Some("hello".to_string()),
                button_protection: Some(true),
                ..Default::default()
            }
            .into(),
            Failure {
                code: Some(FailureType::PinInvalid as i32),
                message: Some("PIN invalid".to_string()),
            }
            .into(),
            GetAddress {
                address_n: vec![44 | crate::HARDENED, crate::HARDENED, 0, 0],
                coin_name: Some("Bitcoin".to_string()),
                show_display: Some(false),
            }
            .into(),
            TxRequest {
                request_type: Some(RequestType::TxInput as i32),
                details: Some(TxRequestDetailsType {
                    request_index: Some(3),
                    tx_hash: Some(vec![0xab; 32]),
                }),
                serialized: Some(TxRequestSerializedType {
                    serialized_tx: Some(vec![1, 2, 3]),
                    ..Default::default()
                }),
            }
            .into(),
            Features {
                vendor: Some("bitcointrezor.com".to_string()),
                major_version: Some(1),
                minor_version: Some(3),
                patch_version: Some(0),
                coins: vec![CoinType {
                    coin_name: Some("Bitcoin".to_string()),
                    coin_shortcut: Some("BTC".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }
            .into(),
        ];

        for m in &messages {
            encode_decode_message(m);
        }
    }

    #[test]
    fn unwrap_and_zeroize() {
        let m: Message = Address {
            address: "1MJ2tj2ThBE62zXbBYA5ZaN3fdve5CPAz1".to_string(),
        }
        .into();

        assert!(Address::try_from(m.clone()).is_ok());
        assert_eq!(Success::try_from(m.clone()), Err(m));

        let mut ack: Message = PinMatrixAck {
            pin: "4711".to_string(),
        }
        .into();
        assert!(ack.is_secret());

        ack.zeroize();
        assert_eq!(
            ack,
            Message::PinMatrixAck(PinMatrixAck {
                pin: String::new()
            })
        );
    }

    #[test]
    fn invalid_payload() {
        // Truncated length-delimited field
        let r = Message::decode_payload(MessageType::Address, &[0x0a, 0x10, 0x31]);
        assert!(matches!(
            r,
            Err(Error::InvalidPayload(MessageType::Address, _))
        ));
    }
}
