// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TCP transport for emulators and network bridges
//!
//! TCP connections carry envelopes as a flat byte stream, framing is provided
//! by the envelope length alone.

use std::{
    io::{self, ErrorKind},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use super::{Framing, Transport};
use crate::Error;

/// Default emulator port
pub const DEFAULT_TCP_PORT: u16 = 21324;

/// TCP transport options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, clap::Args)]
pub struct TcpOptions {
    /// Device / emulator address
    #[clap(long = "tcp-addr", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub addr: IpAddr,

    /// Device / emulator port
    #[clap(long = "tcp-port", default_value_t = DEFAULT_TCP_PORT)]
    pub port: u16,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_TCP_PORT,
        }
    }
}

impl TcpOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// TCP transport using tokio sockets
pub struct TcpTransport {
    opts: TcpOptions,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create a new (unconnected) TCP transport
    pub fn new(opts: TcpOptions) -> Self {
        Self { opts, stream: None }
    }

    pub fn options(&self) -> &TcpOptions {
        &self.opts
    }

    fn stream(&mut self) -> Result<&mut TcpStream, Error> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }

    /// Map IO errors, dropping the stream where the connection was lost
    fn io_error(&mut self, e: io::Error) -> Error {
        match e.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => {
                debug!("TCP connection lost: {}", e);
                self.stream = None;
                Error::Disconnected
            }
            _ => Error::Io(e),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn framing(&self) -> Framing {
        Framing::Stream
    }

    async fn open(&mut self) -> Result<(), Error> {
        if self.stream.is_some() {
            return Ok(());
        }

        debug!("Connecting to {}", self.opts.socket_addr());

        let s = TcpStream::connect(self.opts.socket_addr()).await?;
        s.set_nodelay(true)?;

        self.stream = Some(s);

        Ok(())
    }

    async fn read(&mut self, buff: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error> {
        let s = self.stream()?;

        let r = match timeout {
            Some(t) => match tokio::time::timeout(t, s.read(buff)).await {
                Ok(r) => r,
                Err(_) => return Ok(0),
            },
            None => s.read(buff).await,
        };
        let n = r.map_err(|e| self.io_error(e))?;

        // Zero length reads without a timeout indicate the peer has closed
        if n == 0 {
            debug!("TCP connection closed by peer");
            self.stream = None;
            return Err(Error::Disconnected);
        }

        trace!("TCP read {} bytes", n);

        Ok(n)
    }

    async fn write(&mut self, buff: &[u8]) -> Result<usize, Error> {
        let s = self.stream()?;
        let r = s.write_all(buff).await;
        r.map_err(|e| self.io_error(e))?;
        Ok(buff.len())
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Some(mut s) = self.stream.take() {
            let _ = s.shutdown().await;
        }
        Ok(())
    }

    async fn is_present(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }

        TcpStream::connect(self.opts.socket_addr()).await.is_ok()
    }
}

#[cfg(test)]
mod test {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn tcp_read_write() -> anyhow::Result<()> {
        let l = TcpListener::bind("127.0.0.1:0").await?;
        let addr = l.local_addr()?;

        let mut t = TcpTransport::new(TcpOptions {
            addr: addr.ip(),
            port: addr.port(),
        });

        assert!(t.is_present().await);
        t.open().await?;

        let (mut peer, _) = l.accept().await?;

        // Host to peer
        assert_eq!(t.write(&[1, 2, 3]).await?, 3);
        let mut b = [0u8; 16];
        let n = peer.read(&mut b).await?;
        assert_eq!(&b[..n], &[1, 2, 3]);

        // Timeout with no data
        let n = t.read(&mut b, Some(Duration::from_millis(20))).await?;
        assert_eq!(n, 0);

        // Peer to host
        peer.write_all(&[4, 5]).await?;
        let n = t.read(&mut b, None).await?;
        assert_eq!(&b[..n], &[4, 5]);

        // Peer close is a disconnect
        drop(peer);
        assert!(matches!(t.read(&mut b, None).await, Err(Error::Disconnected)));

        Ok(())
    }
}
