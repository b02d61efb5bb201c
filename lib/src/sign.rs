// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction signing
//!
//! Signing is driven by the device: following [SignTx] (or [SimpleSignTx])
//! the device issues [TxRequest]s for each component it needs, each answered
//! with a [TxAck] carrying exactly the requested component, until a
//! [RequestType::TxFinished] request. Serialized transaction fragments and
//! input signatures returned along the way are accumulated in a
//! [SigningContext], which is dropped on completion or failure.
//!
//! See [DeviceHandle::sign_tx][crate::DeviceHandle::sign_tx] to sign with a
//! connected device.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use hwlink_proto::{messages::*, Message};

use crate::{handle::Exchange, Error};

/// Source of transaction data requested during signing (wallet, UTXO index)
#[async_trait]
pub trait TxDataProvider: Send + Sync {
    /// Fetch input `index` of the transaction being signed (`prev_hash` is
    /// `None`) or of a previous transaction
    async fn input(&self, prev_hash: Option<&[u8]>, index: u32) -> Option<TxInputType>;

    /// Fetch output `index` of the transaction being signed
    async fn output(&self, index: u32) -> Option<TxOutputType>;

    /// Fetch binary output `index` of a previous transaction
    async fn bin_output(&self, prev_hash: &[u8], index: u32) -> Option<TxOutputBinType>;

    /// Fetch metadata (version, lock time, counts) for a previous transaction
    async fn meta(&self, prev_hash: &[u8]) -> Option<TransactionType>;
}

/// Signing request, full (device driven) or simple (all components up front)
#[derive(Clone, Debug, PartialEq)]
pub enum SignRequest {
    Full(SignTx),
    Simple(SimpleSignTx),
}

impl From<SignTx> for SignRequest {
    fn from(r: SignTx) -> Self {
        Self::Full(r)
    }
}

impl From<SimpleSignTx> for SignRequest {
    fn from(r: SimpleSignTx) -> Self {
        Self::Simple(r)
    }
}

impl From<SignRequest> for Message {
    fn from(r: SignRequest) -> Self {
        match r {
            SignRequest::Full(r) => r.into(),
            SignRequest::Simple(r) => r.into(),
        }
    }
}

/// Signed transaction
#[derive(Clone, Debug, PartialEq)]
pub struct SignedTx {
    /// Concatenated serialized transaction fragments
    pub serialized_tx: Vec<u8>,
    /// Input signatures by input index
    pub signatures: BTreeMap<u32, Vec<u8>>,
}

/// State accumulated over a signing exchange
#[derive(Debug)]
pub struct SigningContext {
    source: SignRequest,
    /// Inputs supplied to the device by index
    built_inputs: BTreeMap<u32, TxInputType>,
    /// Outputs supplied to the device by index
    built_outputs: BTreeMap<u32, TxOutputType>,
    signatures: BTreeMap<u32, Vec<u8>>,
    serialized: Vec<u8>,
    acks: usize,
}

impl SigningContext {
    fn new(source: SignRequest) -> Self {
        Self {
            source,
            built_inputs: BTreeMap::new(),
            built_outputs: BTreeMap::new(),
            signatures: BTreeMap::new(),
            serialized: vec![],
            acks: 0,
        }
    }

    /// Collect serialized data and signatures from a device request
    fn collect(&mut self, r: &TxRequest) {
        let s = match &r.serialized {
            Some(s) => s,
            None => return,
        };

        if let Some(b) = &s.serialized_tx {
            self.serialized.extend_from_slice(b);
        }

        if let (Some(i), Some(sig)) = (s.signature_index, &s.signature) {
            self.signatures.insert(i, sig.clone());
        }
    }

    fn finish(self) -> SignedTx {
        debug!(
            "Signing complete ({} inputs, {} outputs, {} acks)",
            self.built_inputs.len(),
            self.built_outputs.len(),
            self.acks
        );

        SignedTx {
            serialized_tx: self.serialized,
            signatures: self.signatures,
        }
    }
}

/// Drives the [TxRequest] / [TxAck] exchange for a single transaction
pub struct TxSigner<'a, E: Exchange> {
    e: &'a E,
    ctx: SigningContext,
}

impl<'a, E: Exchange> TxSigner<'a, E> {
    /// Create a signer for the provided request
    pub fn new(e: &'a E, req: impl Into<SignRequest>) -> Self {
        Self {
            e,
            ctx: SigningContext::new(req.into()),
        }
    }

    /// Execute signing, answering device requests from the provider.
    ///
    /// The signer (and signing context) are consumed whether signing
    /// succeeds or fails.
    pub async fn sign(mut self, provider: &dyn TxDataProvider) -> Result<SignedTx, Error> {
        let start: Message = self.ctx.source.clone().into();

        debug!("Starting signing ({})", start.message_type());

        let mut resp = self.exchange(start).await?;

        loop {
            let req = match resp {
                Message::TxRequest(r) => r,
                m => {
                    warn!("Unexpected signing response: {}", m.message_type());
                    return Err(Error::SigningAborted(format!(
                        "unexpected response: {}",
                        m.message_type()
                    )));
                }
            };

            self.ctx.collect(&req);

            let tx = match self.build_ack(&req, provider).await? {
                Some(tx) => tx,
                None => break,
            };

            resp = self.exchange(TxAck { tx: Some(tx) }.into()).await?;
            self.ctx.acks += 1;
        }

        Ok(self.ctx.finish())
    }

    /// Build the acknowledgement for a device request, `None` once signing
    /// is complete
    async fn build_ack(
        &mut self,
        req: &TxRequest,
        provider: &dyn TxDataProvider,
    ) -> Result<Option<TransactionType>, Error> {
        let index = req.index();
        let hash = req.prev_hash();

        debug!(
            "Device requested {:?} {} (prev: {})",
            req.request_type(),
            index,
            hash.map(hex::encode).unwrap_or_else(|| "none".to_string()),
        );

        let tx = match (req.request_type(), hash) {
            (RequestType::TxFinished, _) => return Ok(None),
            (RequestType::TxInput, _) => {
                let i = provider
                    .input(hash, index)
                    .await
                    .ok_or_else(|| missing("input", index, hash))?;

                if hash.is_none() {
                    self.ctx.built_inputs.insert(index, i.clone());
                }

                TransactionType {
                    inputs: vec![i],
                    ..Default::default()
                }
            }
            (RequestType::TxOutput, None) => {
                let o = provider
                    .output(index)
                    .await
                    .ok_or_else(|| missing("output", index, hash))?;

                self.ctx.built_outputs.insert(index, o.clone());

                TransactionType {
                    outputs: vec![o],
                    ..Default::default()
                }
            }
            (RequestType::TxOutput, Some(h)) => {
                let o = provider
                    .bin_output(h, index)
                    .await
                    .ok_or_else(|| missing("binary output", index, hash))?;

                TransactionType {
                    bin_outputs: vec![o],
                    ..Default::default()
                }
            }
            (RequestType::TxMeta, Some(h)) => {
                let m = provider
                    .meta(h)
                    .await
                    .ok_or_else(|| missing("metadata", index, hash))?;

                // Metadata only
                TransactionType {
                    version: m.version,
                    lock_time: m.lock_time,
                    inputs_cnt: m.inputs_cnt,
                    outputs_cnt: m.outputs_cnt,
                    ..Default::default()
                }
            }
            (RequestType::TxMeta, None) => {
                return Err(Error::SigningAborted(
                    "metadata requested without transaction hash".to_string(),
                ))
            }
        };

        Ok(Some(tx))
    }

    async fn exchange(&self, m: Message) -> Result<Message, Error> {
        match self.e.exchange(m).await {
            Ok(r) => Ok(r),
            Err(e) if e.is_transport() => {
                warn!("Transport failed during signing: {}", e);
                Err(Error::DisconnectedDuringSigning)
            }
            Err(e) => Err(e),
        }
    }
}

fn missing(kind: &str, index: u32, hash: Option<&[u8]>) -> Error {
    let m = match hash {
        Some(h) => format!("no {kind} {index} for transaction {}", hex::encode(h)),
        None => format!("no {kind} {index}"),
    };

    warn!("Aborting signing: {}", m);

    Error::SigningAborted(m)
}

/// Transaction input (serializable)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    #[serde(default)]
    pub address_n: Vec<u32>,
    #[serde(with = "hex")]
    pub prev_hash: Vec<u8>,
    pub prev_index: u32,
    #[serde(default)]
    pub sequence: Option<u32>,
}

impl From<&InputInfo> for TxInputType {
    fn from(i: &InputInfo) -> Self {
        Self {
            address_n: i.address_n.clone(),
            prev_hash: i.prev_hash.clone(),
            prev_index: i.prev_index,
            sequence: i.sequence,
            ..Default::default()
        }
    }
}

/// Output script kinds (serializable)
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputScript {
    #[default]
    Address,
    ScriptHash,
    Multisig,
    OpReturn,
}

impl From<OutputScript> for OutputScriptType {
    fn from(s: OutputScript) -> Self {
        match s {
            OutputScript::Address => OutputScriptType::PayToAddress,
            OutputScript::ScriptHash => OutputScriptType::PayToScriptHash,
            OutputScript::Multisig => OutputScriptType::PayToMultisig,
            OutputScript::OpReturn => OutputScriptType::PayToOpReturn,
        }
    }
}

/// Transaction output (serializable)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub address_n: Vec<u32>,
    pub amount: u64,
    #[serde(default)]
    pub script_type: OutputScript,
}

impl From<&OutputInfo> for TxOutputType {
    fn from(o: &OutputInfo) -> Self {
        Self {
            address: o.address.clone(),
            address_n: o.address_n.clone(),
            amount: o.amount,
            script_type: OutputScriptType::from(o.script_type) as i32,
        }
    }
}

/// Previous transaction output (serializable)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinOutputInfo {
    pub amount: u64,
    #[serde(with = "hex")]
    pub script_pubkey: Vec<u8>,
}

/// Previous transaction referenced by an input (serializable)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrevTx {
    #[serde(with = "hex")]
    pub hash: Vec<u8>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub lock_time: u32,
    #[serde(default)]
    pub inputs: Vec<InputInfo>,
    #[serde(default)]
    pub bin_outputs: Vec<BinOutputInfo>,
}

fn default_version() -> u32 {
    1
}

/// In-memory [TxDataProvider], loadable from JSON
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTxProvider {
    #[serde(default)]
    pub coin_name: Option<String>,
    pub inputs: Vec<InputInfo>,
    pub outputs: Vec<OutputInfo>,
    #[serde(default)]
    pub prev_txs: Vec<PrevTx>,
}

impl MemoryTxProvider {
    /// Build the [SignTx] request for this transaction
    pub fn sign_tx(&self) -> SignTx {
        SignTx {
            outputs_count: self.outputs.len() as u32,
            inputs_count: self.inputs.len() as u32,
            coin_name: self.coin_name.clone(),
        }
    }

    /// Build a [SimpleSignTx] request carrying all components
    pub fn simple_sign_tx(&self) -> SimpleSignTx {
        SimpleSignTx {
            inputs: self.inputs.iter().map(TxInputType::from).collect(),
            outputs: self.outputs.iter().map(TxOutputType::from).collect(),
            transactions: self
                .prev_txs
                .iter()
                .map(|p| TransactionType {
                    version: Some(p.version),
                    lock_time: Some(p.lock_time),
                    inputs: p.inputs.iter().map(TxInputType::from).collect(),
                    bin_outputs: p.bin_outputs.iter().map(bin_output).collect(),
                    ..Default::default()
                })
                .collect(),
            coin_name: self.coin_name.clone(),
        }
    }

    fn prev_tx(&self, hash: &[u8]) -> Option<&PrevTx> {
        self.prev_txs.iter().find(|p| p.hash == hash)
    }
}

fn bin_output(o: &BinOutputInfo) -> TxOutputBinType {
    TxOutputBinType {
        amount: o.amount,
        script_pubkey: o.script_pubkey.clone(),
    }
}

#[async_trait]
impl TxDataProvider for MemoryTxProvider {
    async fn input(&self, prev_hash: Option<&[u8]>, index: u32) -> Option<TxInputType> {
        let inputs = match prev_hash {
            Some(h) => &self.prev_tx(h)?.inputs,
            None => &self.inputs,
        };

        inputs.get(index as usize).map(TxInputType::from)
    }

    async fn output(&self, index: u32) -> Option<TxOutputType> {
        self.outputs.get(index as usize).map(TxOutputType::from)
    }

    async fn bin_output(&self, prev_hash: &[u8], index: u32) -> Option<TxOutputBinType> {
        self.prev_tx(prev_hash)?
            .bin_outputs
            .get(index as usize)
            .map(bin_output)
    }

    async fn meta(&self, prev_hash: &[u8]) -> Option<TransactionType> {
        let p = self.prev_tx(prev_hash)?;

        Some(TransactionType {
            version: Some(p.version),
            lock_time: Some(p.lock_time),
            inputs_cnt: Some(p.inputs.len() as u32),
            outputs_cnt: Some(p.bin_outputs.len() as u32),
            ..Default::default()
        })
    }
}
