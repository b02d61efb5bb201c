// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport capability and supported transports
//!
//! Transports move raw bytes to and from a device, framing is applied by
//! [crate::link] according to [Transport::framing].

use std::time::Duration;

use async_trait::async_trait;
use strum::Display;

use crate::Error;

#[cfg(feature = "transport_hid")]
mod hid;
#[cfg(feature = "transport_hid")]
pub use hid::HidTransport;

#[cfg(feature = "transport_tcp")]
mod tcp;
#[cfg(feature = "transport_tcp")]
pub use tcp::{TcpOptions, TcpTransport, DEFAULT_TCP_PORT};

pub mod emulator;
pub use emulator::{Emulator, EmulatorControl, Script};

/// Link framing used by a transport
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Flat byte stream, message boundaries from the envelope length
    Stream,
    /// Length-prefixed 64-byte frames, message boundaries by link silence
    Chunked,
    /// 64-byte reports prefixed with a fixed sync marker, message boundaries
    /// from the envelope length
    Synced(u8),
}

/// Byte channel to a device
#[async_trait]
pub trait Transport: Send + 'static {
    /// Framing applied to messages over this transport
    fn framing(&self) -> Framing;

    /// Open the underlying device or connection
    async fn open(&mut self) -> Result<(), Error>;

    /// Read available bytes, waiting for up to `timeout` or indefinitely
    /// where no timeout is provided.
    ///
    /// Returns `Ok(0)` where the timeout elapsed with no data.
    async fn read(&mut self, buff: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error>;

    /// Write bytes, returning the number of bytes accepted
    async fn write(&mut self, buff: &[u8]) -> Result<usize, Error>;

    /// Close the underlying device or connection
    async fn close(&mut self) -> Result<(), Error>;

    /// Check whether the device is present (enumerable / reachable)
    async fn is_present(&mut self) -> bool;
}

/// Generic transport (abstract over transport types)
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_hid")]
    Hid(HidTransport),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpTransport),
    Emulator(Emulator),
}

/// Convert a HID transport into a generic transport
#[cfg(feature = "transport_hid")]
impl From<HidTransport> for GenericTransport {
    fn from(t: HidTransport) -> Self {
        Self::Hid(t)
    }
}

/// Convert a TCP transport into a generic transport
#[cfg(feature = "transport_tcp")]
impl From<TcpTransport> for GenericTransport {
    fn from(t: TcpTransport) -> Self {
        Self::Tcp(t)
    }
}

impl From<Emulator> for GenericTransport {
    fn from(t: Emulator) -> Self {
        Self::Emulator(t)
    }
}

/// Implementation of [Transport] for [GenericTransport], dispatching
/// to the selected variant
#[async_trait]
impl Transport for GenericTransport {
    fn framing(&self) -> Framing {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.framing(),
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.framing(),
            Self::Emulator(t) => t.framing(),
        }
    }

    async fn open(&mut self) -> Result<(), Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.open().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.open().await,
            Self::Emulator(t) => t.open().await,
        }
    }

    async fn read(&mut self, buff: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.read(buff, timeout).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.read(buff, timeout).await,
            Self::Emulator(t) => t.read(buff, timeout).await,
        }
    }

    async fn write(&mut self, buff: &[u8]) -> Result<usize, Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.write(buff).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.write(buff).await,
            Self::Emulator(t) => t.write(buff).await,
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.close().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.close().await,
            Self::Emulator(t) => t.close().await,
        }
    }

    async fn is_present(&mut self) -> bool {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.is_present().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.is_present().await,
            Self::Emulator(t) => t.is_present().await,
        }
    }
}
