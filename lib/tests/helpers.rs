// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(dead_code)]

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use log::LevelFilter;
use simplelog::SimpleLogger;
use tokio::sync::mpsc::Receiver;

use hwlink::{
    transport::{Emulator, EmulatorControl, Script},
    Challenge, ChallengeKind, ChallengeResponder, DeviceEvent, DeviceHandle, SessionConfig,
};

/// Setup logging, level from `LOG_LEVEL` (defaults to debug)
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Setup an emulated device running the provided script, subscribing to
/// events prior to opening the handle
pub async fn setup(
    script: Script,
    cfg: SessionConfig,
) -> (
    DeviceHandle<Emulator>,
    EmulatorControl,
    Receiver<DeviceEvent>,
) {
    setup_logging();

    let e = Emulator::new(script);
    let ctl = e.control();

    let h = DeviceHandle::new(e, cfg);
    let events = h.session().subscribe().await;

    h.open().await.expect("Failed to open emulator");

    (h, ctl, events)
}

/// Drain queued events, returning event names
pub fn event_names(rx: &mut Receiver<DeviceEvent>) -> Vec<String> {
    let mut names = vec![];
    while let Ok(e) = rx.try_recv() {
        names.push(e.name());
    }
    names
}

/// Responder returning a fixed answer, recording the challenges seen
#[derive(Clone, Default)]
pub struct FixedResponder {
    answer: Option<Vec<u8>>,
    seen: Arc<Mutex<Vec<ChallengeKind>>>,
}

impl FixedResponder {
    /// Answer all challenges with `answer`
    pub fn new(answer: &str) -> Self {
        Self {
            answer: Some(answer.as_bytes().to_vec()),
            ..Default::default()
        }
    }

    /// Decline all challenges
    pub fn decline() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<ChallengeKind> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChallengeResponder for FixedResponder {
    async fn answer(&self, c: &Challenge) -> Option<Vec<u8>> {
        self.seen.lock().unwrap().push(c.kind);
        self.answer.clone()
    }
}
