// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction signing messages
//!
//! Signing is device driven: after [SignTx] the device issues a series of
//! [TxRequest]s for inputs, outputs and previous transaction data, each
//! answered with a [TxAck], until a [RequestType::TxFinished] request.
//! Serialized transaction fragments and input signatures are returned
//! incrementally in [TxRequest::serialized].

/// Signing request kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RequestType {
    TxInput = 0,
    TxOutput = 1,
    TxMeta = 2,
    TxFinished = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InputScriptType {
    SpendAddress = 0,
    SpendMultisig = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OutputScriptType {
    PayToAddress = 0,
    PayToScriptHash = 1,
    PayToMultisig = 2,
    PayToOpReturn = 3,
}

/// Begin device driven transaction signing
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTx {
    #[prost(uint32, required, tag = "1")]
    pub outputs_count: u32,
    #[prost(uint32, required, tag = "2")]
    pub inputs_count: u32,
    #[prost(string, optional, tag = "3")]
    pub coin_name: Option<String>,
}

/// Sign a transaction supplied in full, the device still responds with
/// [TxRequest]s carrying the serialized result
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SimpleSignTx {
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<TxInputType>,
    #[prost(message, repeated, tag = "2")]
    pub outputs: Vec<TxOutputType>,
    #[prost(message, repeated, tag = "3")]
    pub transactions: Vec<TransactionType>,
    #[prost(string, optional, tag = "4")]
    pub coin_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxRequestDetailsType {
    /// Index of the requested input / output
    #[prost(uint32, optional, tag = "1")]
    pub request_index: Option<u32>,
    /// Hash of the previous transaction, absent when requesting from the
    /// transaction being signed
    #[prost(bytes = "vec", optional, tag = "2")]
    pub tx_hash: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxRequestSerializedType {
    #[prost(uint32, optional, tag = "1")]
    pub signature_index: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub signature: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub serialized_tx: Option<Vec<u8>>,
}

/// Device request for transaction data
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxRequest {
    #[prost(enumeration = "RequestType", optional, tag = "1")]
    pub request_type: Option<i32>,
    #[prost(message, optional, tag = "2")]
    pub details: Option<TxRequestDetailsType>,
    #[prost(message, optional, tag = "3")]
    pub serialized: Option<TxRequestSerializedType>,
}

impl TxRequest {
    /// Requested index, zero where not provided
    pub fn index(&self) -> u32 {
        self.details
            .as_ref()
            .and_then(|d| d.request_index)
            .unwrap_or(0)
    }

    /// Previous transaction hash, where the request refers to one
    pub fn prev_hash(&self) -> Option<&[u8]> {
        self.details
            .as_ref()
            .and_then(|d| d.tx_hash.as_deref())
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxInputType {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub prev_hash: Vec<u8>,
    #[prost(uint32, required, tag = "3")]
    pub prev_index: u32,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub script_sig: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "5")]
    pub sequence: Option<u32>,
    #[prost(enumeration = "InputScriptType", optional, tag = "6")]
    pub script_type: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxOutputType {
    #[prost(string, optional, tag = "1")]
    pub address: Option<String>,
    #[prost(uint32, repeated, packed = "false", tag = "2")]
    pub address_n: Vec<u32>,
    #[prost(uint64, required, tag = "3")]
    pub amount: u64,
    #[prost(enumeration = "OutputScriptType", required, tag = "4")]
    pub script_type: i32,
}

/// Previous transaction output in serialized script form
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxOutputBinType {
    #[prost(uint64, required, tag = "1")]
    pub amount: u64,
    #[prost(bytes = "vec", required, tag = "2")]
    pub script_pubkey: Vec<u8>,
}

/// Transaction data container used in [TxAck].
///
/// Populated with a single input, output or binary output, or with
/// metadata only (`version`, `lock_time`, counts) for
/// [RequestType::TxMeta] requests.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionType {
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
    #[prost(message, repeated, tag = "2")]
    pub inputs: Vec<TxInputType>,
    #[prost(message, repeated, tag = "3")]
    pub bin_outputs: Vec<TxOutputBinType>,
    #[prost(uint32, optional, tag = "4")]
    pub lock_time: Option<u32>,
    #[prost(message, repeated, tag = "5")]
    pub outputs: Vec<TxOutputType>,
    #[prost(uint32, optional, tag = "6")]
    pub inputs_cnt: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub outputs_cnt: Option<u32>,
}

/// Host response to a [TxRequest]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxAck {
    #[prost(message, optional, tag = "1")]
    pub tx: Option<TransactionType>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EstimateTxSize {
    #[prost(uint32, required, tag = "1")]
    pub outputs_count: u32,
    #[prost(uint32, required, tag = "2")]
    pub inputs_count: u32,
    #[prost(string, optional, tag = "3")]
    pub coin_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxSize {
    #[prost(uint32, optional, tag = "1")]
    pub tx_size: Option<u32>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{messages::Message, test::encode_decode_message, HARDENED};

    #[test]
    fn encode_decode_tx() {
        let input = TxInputType {
            address_n: vec![44 | HARDENED, HARDENED, HARDENED, 0, 5],
            prev_hash: vec![0x2f; 32],
            prev_index: 1,
            sequence: Some(0xffff_ffff),
            ..Default::default()
        };
        let output = TxOutputType {
            address: Some("1MJ2tj2ThBE62zXbBYA5ZaN3fdve5CPAz1".to_string()),
            amount: 380_000,
            script_type: OutputScriptType::PayToAddress as i32,
            ..Default::default()
        };

        let tests: &[Message] = &[
            SignTx {
                outputs_count: 1,
                inputs_count: 1,
                coin_name: Some("Bitcoin".to_string()),
            }
            .into(),
            TxAck {
                tx: Some(TransactionType {
                    inputs: vec![input.clone()],
                    ..Default::default()
                }),
            }
            .into(),
            TxAck {
                tx: Some(TransactionType {
                    version: Some(1),
                    lock_time: Some(0),
                    inputs_cnt: Some(1),
                    outputs_cnt: Some(2),
                    ..Default::default()
                }),
            }
            .into(),
            SimpleSignTx {
                inputs: vec![input],
                outputs: vec![output],
                ..Default::default()
            }
            .into(),
            EstimateTxSize {
                outputs_count: 2,
                inputs_count: 3,
                coin_name: None,
            }
            .into(),
        ];

        for m in tests {
            encode_decode_message(m);
        }
    }

    #[test]
    fn request_accessors() {
        let r = TxRequest {
            request_type: Some(RequestType::TxOutput as i32),
            details: Some(TxRequestDetailsType {
                request_index: Some(4),
                tx_hash: Some(vec![0xaa; 32]),
            }),
            serialized: None,
        };

        assert_eq!(r.request_type(), RequestType::TxOutput);
        assert_eq!(r.index(), 4);
        assert_eq!(r.prev_hash(), Some(&[0xaa; 32][..]));

        let r = TxRequest {
            request_type: Some(RequestType::TxFinished as i32),
            ..Default::default()
        };
        assert_eq!(r.index(), 0);
        assert_eq!(r.prev_hash(), None);
    }
}
