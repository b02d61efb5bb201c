// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handshake, generic response and challenge messages

use zeroize::Zeroize;

/// Reset device state and request [Features]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Initialize {}

/// Request [Features] without resetting device state
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFeatures {}

/// Connectivity test, device responds with [Success] echoing `message`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub button_protection: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub passphrase_protection: Option<bool>,
}

/// Generic success response
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Success {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
}

/// Failure codes reported by [Failure] responses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FailureType {
    UnexpectedMessage = 1,
    ButtonExpected = 2,
    SyntaxError = 3,
    ActionCancelled = 4,
    PinExpected = 5,
    PinCancelled = 6,
    PinInvalid = 7,
    InvalidSignature = 8,
    Other = 9,
    NotEnoughFunds = 10,
    NotInitialized = 11,
    FirmwareError = 99,
}

/// Generic failure response
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(enumeration = "FailureType", optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
}

/// Abort the current operation
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cancel {}

/// Clear cached session values (PIN, passphrase)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClearSession {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CoinType {
    #[prost(string, optional, tag = "1")]
    pub coin_name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub coin_shortcut: Option<String>,
    #[prost(uint32, optional, tag = "3")]
    pub address_type: Option<u32>,
    #[prost(uint64, optional, tag = "4")]
    pub maxfee_kb: Option<u64>,
    #[prost(uint32, optional, tag = "5")]
    pub address_type_p2sh: Option<u32>,
}

/// Device information, response to [Initialize] and [GetFeatures]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Features {
    #[prost(string, optional, tag = "1")]
    pub vendor: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub major_version: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub minor_version: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub patch_version: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub bootloader_mode: Option<bool>,
    #[prost(string, optional, tag = "6")]
    pub device_id: Option<String>,
    #[prost(bool, optional, tag = "7")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub passphrase_protection: Option<bool>,
    #[prost(string, optional, tag = "9")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub label: Option<String>,
    #[prost(message, repeated, tag = "11")]
    pub coins: Vec<CoinType>,
    #[prost(bool, optional, tag = "12")]
    pub initialized: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "13")]
    pub revision: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "14")]
    pub bootloader_hash: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "15")]
    pub imported: Option<bool>,
}

impl Features {
    /// Firmware version as `major.minor.patch`
    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.major_version(),
            self.minor_version(),
            self.patch_version()
        )
    }
}

/// PIN matrix request kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PinMatrixRequestType {
    Current = 1,
    NewFirst = 2,
    NewSecond = 3,
}

/// Device requests a PIN entered via the scrambled matrix on its display
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinMatrixRequest {
    #[prost(enumeration = "PinMatrixRequestType", optional, tag = "1")]
    pub r#type: Option<i32>,
}

/// Matrix positions of the PIN digits
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinMatrixAck {
    #[prost(string, required, tag = "1")]
    pub pin: String,
}

/// Button request reasons
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ButtonRequestType {
    Other = 1,
    FeeOverThreshold = 2,
    ConfirmOutput = 3,
    ResetDevice = 4,
    ConfirmWord = 5,
    WipeDevice = 6,
    ProtectCall = 7,
    SignTx = 8,
    FirmwareCheck = 9,
    Address = 10,
}

/// Device is waiting for physical confirmation
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ButtonRequest {
    #[prost(enumeration = "ButtonRequestType", optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub data: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ButtonAck {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PassphraseRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PassphraseAck {
    #[prost(string, required, tag = "1")]
    pub passphrase: String,
}

/// Device requests a recovery seed word
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WordRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WordAck {
    #[prost(string, required, tag = "1")]
    pub word: String,
}

/// Device requests a one-time password
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OtpRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OtpAck {
    #[prost(string, required, tag = "1")]
    pub otp: String,
}

impl Zeroize for PinMatrixAck {
    fn zeroize(&mut self) {
        self.pin.zeroize();
    }
}

impl Zeroize for PassphraseAck {
    fn zeroize(&mut self) {
        self.passphrase.zeroize();
    }
}

impl Zeroize for WordAck {
    fn zeroize(&mut self) {
        self.word.zeroize();
    }
}

impl Zeroize for OtpAck {
    fn zeroize(&mut self) {
        self.otp.zeroize();
    }
}
