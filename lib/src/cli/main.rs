// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for interacting with hardware wallets

use std::{collections::BTreeMap, path::Path};

use clap::Parser;
use log::{debug, error, info, LevelFilter};
use serde::{de::DeserializeOwned, Serialize};

use hwlink::{
    proto::messages::IdentityType,
    transport::{GenericTransport, TcpOptions, Transport},
    Connect, DeviceHandle, DeviceInfo, DeviceProvider, Filter, MemoryTxProvider, SessionConfig,
};

mod helpers;
use helpers::*;

/// Hardware wallet command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Supported transports for device discovery
    #[clap(long, value_enum, default_value = "any")]
    target: Filter,

    /// Device index (where more than one device is available)
    #[clap(long, default_value = "0")]
    device_index: usize,

    /// TCP options (with `--target tcp`)
    #[clap(flatten)]
    tcp: TcpOptions,

    /// Session timeouts and behaviour
    #[clap(flatten)]
    session: SessionConfig,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available devices
    List,

    /// Fetch device features
    Features,

    /// Ping the device
    Ping {
        /// Message to be echoed
        #[clap(default_value = "ping")]
        message: String,

        /// Require on-device confirmation
        #[clap(long)]
        button: bool,
    },

    /// Fetch the address for a derivation path
    Address {
        /// BIP-0032 derivation path
        #[clap(long, default_value = "m/44'/0'/0'/0/0")]
        path: DerivationPath,

        /// Coin name
        #[clap(long, default_value = "Bitcoin")]
        coin: String,

        /// Show the address on the device
        #[clap(long)]
        show: bool,
    },

    /// Fetch the public key for a derivation path
    PublicKey {
        /// BIP-0032 derivation path
        #[clap(long, default_value = "m/44'/0'/0'")]
        path: DerivationPath,

        /// ECDSA curve name
        #[clap(long)]
        curve: Option<String>,
    },

    /// Fetch random data from the device
    Entropy {
        /// Number of bytes
        #[clap(long, default_value = "32")]
        size: u32,
    },

    /// Sign a message
    SignMessage {
        /// BIP-0032 derivation path
        #[clap(long, default_value = "m/44'/0'/0'/0/0")]
        path: DerivationPath,

        /// Coin name
        #[clap(long, default_value = "Bitcoin")]
        coin: String,

        /// Message to be signed
        message: String,
    },

    /// Sign a SLIP-0013 identity challenge
    Ident {
        /// URI for derived identity
        #[clap(long)]
        uri: String,

        /// index for derived identity
        #[clap(long, default_value = "0")]
        index: u32,

        /// hex-encoded challenge to be signed
        #[clap(long)]
        challenge: Option<HexData<32>>,

        /// Challenge text displayed on the device
        #[clap(long, default_value = "")]
        visual: String,
    },

    /// Estimate the serialized size of a transaction
    EstimateTxSize {
        /// Number of inputs
        #[clap(long)]
        inputs: u32,

        /// Number of outputs
        #[clap(long)]
        outputs: u32,

        /// Coin name
        #[clap(long, default_value = "Bitcoin")]
        coin: String,
    },

    /// Sign a transaction described in a JSON file
    SignTx {
        /// Transaction input file (`.json`)
        #[clap(long)]
        input: String,

        /// Signed transaction output file (`.json`)
        #[clap(long)]
        output: Option<String>,
    },
}

/// Signed transaction output
#[derive(Clone, Debug, Serialize)]
struct SignTxOutput {
    #[serde(with = "hex")]
    serialized_tx: Vec<u8>,
    signatures: BTreeMap<u32, String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())?;

    // Setup device provider
    let p = DeviceProvider::with_config(args.session.clone())?;

    debug!("Using transport: {:?}", args.target);

    // List available devices, TCP targets use the provided options
    let devices = match args.target {
        Filter::Tcp => vec![DeviceInfo::Tcp(args.tcp.clone())],
        _ => p.list_devices(args.target).await,
    };
    if devices.is_empty() {
        return Err(anyhow::anyhow!("No devices found"));
    }

    // Handle list command
    if args.cmd == Actions::List {
        info!("Devices:");
        for (i, d) in devices.iter().enumerate() {
            info!("  {}: {}", i, d);
        }

        return Ok(());
    }

    // Select device by index
    if args.device_index >= devices.len() {
        return Err(anyhow::anyhow!(
            "Invalid device index: {} (max: {})",
            args.device_index,
            devices.len() - 1
        ));
    }

    debug!(
        "Using device {}: {}",
        args.device_index, devices[args.device_index]
    );

    // Connect to device
    let t = match Connect::<GenericTransport>::connect(&p, &devices[args.device_index]).await {
        Ok(v) => v,
        Err(e) => {
            error!(
                "Failed to connect to device: {}",
                devices[args.device_index]
            );
            return Err(e.into());
        }
    };

    // Execute command
    let t = t.with_responder(ConsoleResponder);
    let r = execute(&t, args.cmd).await;

    if let Err(e) = t.close().await {
        debug!("Close failed: {}", e);
    }

    r
}

/// Execute a command with the provided device handle
async fn execute<T: Transport>(t: &DeviceHandle<T>, cmd: Actions) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Features => {
            let f = t.initialize().await?;

            info!("vendor: {}", f.vendor());
            info!("version: {}", f.version());
            info!("label: {}", f.label());
            info!("device id: {}", f.device_id());
            info!("initialized: {}", f.initialized());
            info!("pin protection: {}", f.pin_protection());
            info!("passphrase protection: {}", f.passphrase_protection());
        }
        Actions::Ping { message, button } => {
            let r = t.ping(&message, button).await?;

            info!("response: {}", r);
        }
        Actions::Address { path, coin, show } => {
            info!("requesting address for path: {:?}", path.as_ref());

            let a = t.get_address(Some(&coin), path.as_ref(), show).await?;

            info!("address: {}", a);
        }
        Actions::PublicKey { path, curve } => {
            let k = t.get_public_key(path.as_ref(), curve.as_deref()).await?;

            if let Some(n) = &k.node {
                info!("public key: {}", hex::encode(n.public_key()));
                info!("chain code: {}", hex::encode(&n.chain_code));
            }
            info!("xpub: {}", k.xpub());
        }
        Actions::Entropy { size } => {
            info!("requesting {} bytes of entropy", size);

            let v = t.get_entropy(size).await?;

            info!("value: {}", hex::encode(v));
        }
        Actions::SignMessage {
            path,
            coin,
            message,
        } => {
            let s = t
                .sign_message(Some(&coin), path.as_ref(), message.as_bytes())
                .await?;

            info!("address: {}", s.address());
            info!("signature: {}", hex::encode(s.signature()));
        }
        Actions::Ident {
            uri,
            index,
            challenge,
            visual,
        } => {
            info!("Requesting identity for uri: '{}' (index: {})", uri, index);

            let identity = IdentityType::from_uri(&uri, index)?;

            // Setup challenge
            let mut c: [u8; 32] = rand::random();
            if let Some(v) = challenge {
                c.copy_from_slice(v.as_ref());
            }

            info!("Using challenge: {}", hex::encode(c));

            // Execute identity request
            let r = t.sign_identity(identity, &c, &visual, None).await?;

            // Display response
            info!("address: {}", r.address());
            info!("public key: {}", hex::encode(r.public_key()));
            info!("signature: {}", hex::encode(r.signature()));
        }
        Actions::EstimateTxSize {
            inputs,
            outputs,
            coin,
        } => {
            let n = t.estimate_tx_size(Some(&coin), inputs, outputs).await?;

            info!("estimated size: {} bytes", n);
        }
        Actions::SignTx { input, output } => {
            // Read in transaction file
            let provider: MemoryTxProvider = read_input(&input).await?;

            info!(
                "Signing transaction ({} inputs, {} outputs)",
                provider.inputs.len(),
                provider.outputs.len()
            );

            let signed = t.sign_tx(provider.sign_tx(), &provider).await?;

            info!("signed tx: {}", hex::encode(&signed.serialized_tx));

            let resp = SignTxOutput {
                serialized_tx: signed.serialized_tx,
                signatures: signed
                    .signatures
                    .iter()
                    .map(|(i, s)| (*i, hex::encode(s)))
                    .collect(),
            };

            // Write output file
            if let Some(o) = output {
                write_output(&o, &resp).await?;
            }
        }
        Actions::List => unreachable!(),
    }

    Ok(())
}

/// Helper to read input files where required
async fn read_input<T: DeserializeOwned>(file_name: &str) -> anyhow::Result<T> {
    debug!("Reading input from '{}'", file_name);

    let s = tokio::fs::read_to_string(file_name).await?;

    // Determine format from file name
    let p = Path::new(file_name);

    // Decode based on input extension
    let v = match p.extension().and_then(|e| e.to_str()) {
        // Decode JSON for `.json` files
        Some("json") => serde_json::from_str(&s)?,
        _ => return Err(anyhow::anyhow!("unsupported input file format")),
    };

    Ok(v)
}

/// Helper to write output files if `--output` argument is provided
async fn write_output(file_name: &str, value: &impl Serialize) -> anyhow::Result<()> {
    debug!("Writing output to '{}'", file_name);

    // Determine format from file name
    let p = Path::new(file_name);
    match p.extension().and_then(|e| e.to_str()) {
        // Encode to JSON for `.json` files
        Some("json") => {
            let s = serde_json::to_string(value)?;
            tokio::fs::write(p, s).await?;
        }
        _ => return Err(anyhow::anyhow!("unsupported output file format")),
    }

    Ok(())
}
