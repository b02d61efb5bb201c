// Copyright (c) 2022-2023 The MobileCoin Foundation

//! USB HID transport

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hidapi::{DeviceInfo, HidApi, HidDevice};
use log::{debug, trace};
use tokio::time::Instant;
use zeroize::Zeroize;

use hwlink_proto::frame::FRAME_LEN;

use super::{Framing, Transport};
use crate::Error;

/// Poll interval for HID reads, reads are cancellable between polls
const HID_POLL_MS: i32 = 100;

/// Report ID prepended to output reports
const HID_REPORT_ID: u8 = 0x00;

/// USB HID transport using `hidapi`
pub struct HidTransport {
    api: Arc<Mutex<HidApi>>,
    info: DeviceInfo,
    device: Option<Arc<Mutex<HidDevice>>>,
    framing: Framing,
}

impl HidTransport {
    /// Create a HID transport for the provided device, using length-prefixed
    /// frames
    pub fn new(api: Arc<Mutex<HidApi>>, info: DeviceInfo) -> Self {
        Self {
            api,
            info,
            device: None,
            framing: Framing::Chunked,
        }
    }

    /// Override link framing (eg. [Framing::Synced] for `?`-prefixed reports)
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Fetch device information
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn device(&self) -> Result<Arc<Mutex<HidDevice>>, Error> {
        self.device.clone().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for HidTransport {
    fn framing(&self) -> Framing {
        self.framing
    }

    async fn open(&mut self) -> Result<(), Error> {
        if self.device.is_some() {
            return Ok(());
        }

        debug!(
            "Opening HID device {:04x}:{:04x} ({:?})",
            self.info.vendor_id(),
            self.info.product_id(),
            self.info.path()
        );

        let d = {
            let api = self.api.lock().map_err(|_| Error::HidInit)?;
            api.open_path(self.info.path())?
        };

        self.device = Some(Arc::new(Mutex::new(d)));

        Ok(())
    }

    async fn read(&mut self, buff: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error> {
        let d = self.device()?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let d = d.clone();

            let (frame, n) = tokio::task::spawn_blocking(move || {
                let mut f = [0u8; FRAME_LEN];
                let d = d.lock().map_err(|_| Error::Disconnected)?;
                let n = d.read_timeout(&mut f, HID_POLL_MS)?;
                Ok::<_, Error>((f, n))
            })
            .await
            .map_err(|_| Error::Disconnected)??;

            if n > 0 {
                trace!("HID read {} bytes", n);

                let n = n.min(buff.len());
                buff[..n].copy_from_slice(&frame[..n]);
                return Ok(n);
            }

            if matches!(deadline, Some(d) if Instant::now() >= d) {
                return Ok(0);
            }
        }
    }

    async fn write(&mut self, buff: &[u8]) -> Result<usize, Error> {
        let d = self.device()?;

        let mut report = Vec::with_capacity(buff.len() + 1);
        report.push(HID_REPORT_ID);
        report.extend_from_slice(buff);

        let n = tokio::task::spawn_blocking(move || {
            let r = match d.lock() {
                Ok(d) => d.write(&report).map_err(Error::from),
                Err(_) => Err(Error::Disconnected),
            };
            report.zeroize();
            r
        })
        .await
        .map_err(|_| Error::Disconnected)??;

        // Report ID is not counted as written data
        Ok(n.saturating_sub(1))
    }

    async fn close(&mut self) -> Result<(), Error> {
        if self.device.take().is_some() {
            debug!("Closed HID device ({:?})", self.info.path());
        }
        Ok(())
    }

    async fn is_present(&mut self) -> bool {
        let mut api = match self.api.lock() {
            Ok(a) => a,
            Err(_) => return false,
        };

        if let Err(e) = api.refresh_devices() {
            debug!("HID enumeration failed: {:?}", e);
            return false;
        }

        let path = self.info.path();
        let present = api.device_list().any(|d| d.path() == path);
        present
    }
}
