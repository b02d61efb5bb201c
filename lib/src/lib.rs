// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hardware wallet host library (and CLI)
//!
//! Provides device discovery ([DeviceProvider]), transports
//! ([transport]), a per-device session state machine ([session]),
//! challenge handling ([challenge]), transaction signing ([sign]) and
//! high-level device operations ([DeviceHandle]).
//!
//! ```no_run
//! use hwlink::{transport::GenericTransport, Connect, DeviceProvider, Filter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let p = DeviceProvider::new()?;
//!
//! let devices = p.list_devices(Filter::Any).await;
//! let d = Connect::<GenericTransport>::connect(&p, &devices[0]).await?;
//!
//! let features = d.initialize().await?;
//! println!("Connected to {} ({})", features.label(), features.version());
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;

use async_trait::async_trait;

#[cfg(feature = "transport_hid")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "transport_hid")]
use hidapi::HidApi;

/// Re-export transports for consumer use
pub mod transport;
use transport::*;

/// Re-export `hwlink-proto` for consumers
pub use hwlink_proto::{self as proto};

pub mod challenge;
pub mod event;
pub mod link;
pub mod session;
pub mod sign;

mod handle;
pub use handle::{DeviceHandle, Exchange};

mod error;
pub use error::Error;

pub use challenge::{Challenge, ChallengeKind, ChallengeResponder};
pub use event::{DeviceEvent, EventKind};
pub use session::{DeviceSession, SessionConfig, SessionState};
pub use sign::{MemoryTxProvider, SignedTx, TxDataProvider};

/// Supported USB devices (vendor id, product id, name)
pub const USB_IDS: &[(u16, u16, &str)] = &[
    (0x534c, 0x0001, "Trezor One"),
    (0x2b24, 0x0001, "KeepKey"),
];

/// Device provider manages device discovery and connections
pub struct DeviceProvider {
    #[cfg(feature = "transport_hid")]
    hid_api: Arc<Mutex<HidApi>>,
    cfg: SessionConfig,
}

/// Device discovery filter
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, strum::Display)]
#[non_exhaustive]
pub enum Filter {
    /// List all devices available using supported transport
    Any,
    /// List only HID devices
    Hid,
    /// List only TCP devices
    Tcp,
}

/// Device information for listing, used by connect
#[derive(Debug)]
pub enum DeviceInfo {
    #[cfg(feature = "transport_hid")]
    Hid(hidapi::DeviceInfo),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpOptions),
    Emulator(Script),
}

impl DeviceProvider {
    /// Create a new device provider
    /// NOTE: only one provider may exist at a time (workaround for global HID context errors on macos/m1)
    pub fn new() -> Result<Self, Error> {
        Self::with_config(SessionConfig::default())
    }

    /// Create a new device provider using the provided session configuration
    pub fn with_config(cfg: SessionConfig) -> Result<Self, Error> {
        #[cfg(feature = "transport_hid")]
        return Ok(Self {
            hid_api: Arc::new(Mutex::new(HidApi::new()?)),
            cfg,
        });

        #[cfg(not(feature = "transport_hid"))]
        return Ok(Self { cfg });
    }

    /// List available devices
    pub async fn list_devices(&self, filter: Filter) -> Vec<DeviceInfo> {
        let mut devices = vec![];

        #[cfg(feature = "transport_hid")]
        if filter == Filter::Any || filter == Filter::Hid {
            match self.hid_api.lock() {
                Ok(mut api) => {
                    if let Err(e) = api.refresh_devices() {
                        log::warn!("HID enumeration failed: {}", e);
                    }

                    api.device_list()
                        .filter(|d| is_supported(d))
                        .cloned()
                        .for_each(|d| devices.push(DeviceInfo::Hid(d)));
                }
                Err(_) => log::error!("HID context unavailable"),
            }
        }

        #[cfg(feature = "transport_tcp")]
        if filter == Filter::Any || filter == Filter::Tcp {
            // Try connecting to default emulator port
            let o = TcpOptions::default();
            if let Ok(_t) = tokio::net::TcpStream::connect(o.socket_addr()).await {
                // Return default port if connection succeeded
                devices.push(DeviceInfo::Tcp(o));
            };
        }

        log::debug!("Found {} devices: {:?}", devices.len(), devices);

        devices
    }
}

/// Check a HID device matches supported ids and the wallet interface
#[cfg(feature = "transport_hid")]
fn is_supported(d: &hidapi::DeviceInfo) -> bool {
    USB_IDS
        .iter()
        .any(|(vid, pid, _)| d.vendor_id() == *vid && d.product_id() == *pid)
        && (d.interface_number() == 0 || d.interface_number() == -1)
}

/// Generic device handle (abstract over transport types)
pub type GenericHandle = DeviceHandle<GenericTransport>;

impl GenericHandle {
    /// Create a new generic device handle
    pub fn generic(d: impl Into<GenericTransport>, cfg: SessionConfig) -> Self {
        Self::new(d.into(), cfg)
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "transport_hid")]
            DeviceInfo::Hid(hid_info) => {
                write!(
                    f,
                    "{:16} (USB, {:04x}:{:04x}, {})",
                    hid_info.product_string().unwrap_or("UNKNOWN"),
                    hid_info.vendor_id(),
                    hid_info.product_id(),
                    hid_info.serial_number().unwrap_or("UNKNOWN"),
                )
            }
            #[cfg(feature = "transport_tcp")]
            DeviceInfo::Tcp(tcp_info) => {
                write!(
                    f,
                    "{:16} (TCP, {}:{})",
                    "Emulator", tcp_info.addr, tcp_info.port
                )
            }
            DeviceInfo::Emulator(s) => {
                write!(f, "{:16} (scripted, {} steps)", "Emulator", s.len())
            }
        }
    }
}

/// Connect trait for supported transports
#[async_trait]
pub trait Connect<T: Transport> {
    type Options: Debug;

    /// Connect to the specified device
    async fn connect(&self, opts: &Self::Options) -> Result<DeviceHandle<T>, Error>;
}

/// Generic connect implementation
#[async_trait]
impl Connect<GenericTransport> for DeviceProvider {
    type Options = DeviceInfo;

    async fn connect(&self, opts: &Self::Options) -> Result<DeviceHandle<GenericTransport>, Error> {
        let t = match opts {
            #[cfg(feature = "transport_hid")]
            DeviceInfo::Hid(hid_info) => {
                GenericTransport::Hid(HidTransport::new(self.hid_api.clone(), hid_info.clone()))
            }
            #[cfg(feature = "transport_tcp")]
            DeviceInfo::Tcp(tcp_info) => GenericTransport::Tcp(TcpTransport::new(tcp_info.clone())),
            DeviceInfo::Emulator(s) => GenericTransport::Emulator(Emulator::new(s.clone())),
        };

        // Create handle and open device
        let d = DeviceHandle::new(t, self.cfg.clone());
        d.open().await?;

        Ok(d)
    }
}

/// Connect implementation for HID devices
#[cfg(feature = "transport_hid")]
#[async_trait]
impl Connect<HidTransport> for DeviceProvider {
    type Options = hidapi::DeviceInfo;

    async fn connect(&self, opts: &Self::Options) -> Result<DeviceHandle<HidTransport>, Error> {
        let t = HidTransport::new(self.hid_api.clone(), opts.clone());

        let d = DeviceHandle::new(t, self.cfg.clone());
        d.open().await?;

        Ok(d)
    }
}

/// Connect implementation for TCP devices
#[cfg(feature = "transport_tcp")]
#[async_trait]
impl Connect<TcpTransport> for DeviceProvider {
    type Options = TcpOptions;

    async fn connect(&self, opts: &Self::Options) -> Result<DeviceHandle<TcpTransport>, Error> {
        let t = TcpTransport::new(opts.clone());

        let d = DeviceHandle::new(t, self.cfg.clone());
        d.open().await?;

        Ok(d)
    }
}
