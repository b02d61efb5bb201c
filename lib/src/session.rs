// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device session state machine
//!
//! A [DeviceSession] owns a [Transport] and a single reader task which is
//! the only task reading from the transport. Sends are permitted only from
//! [SessionState::Idle], each send triggers the reader to receive exactly one
//! envelope which is published to subscribers then delivered to the caller.
//!
//! ```text
//! Detached -> Attached -> Connected -> Idle <-> AwaitingResponse <-> AwaitingChallengeAnswer
//!                                         \-> Disconnected
//! ```

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex, MutexGuard,
    },
    task::JoinHandle,
};
use zeroize::Zeroize;

use hwlink_proto::{envelope::Decoder, messages::Cancel, Message};

use crate::{
    challenge::{Challenge, ChallengeCoordinator},
    event::{DeviceEvent, EventKind},
    link,
    transport::{Framing, Transport},
    Error,
};

/// Session states
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    /// No device enumerated
    Detached,
    /// Device enumerated, transport not opened
    Attached,
    /// Transport opened, reader starting
    Connected,
    /// Ready to send
    Idle,
    /// Request sent, waiting for the device response
    AwaitingResponse,
    /// Device issued a challenge, waiting for an answer
    AwaitingChallengeAnswer,
    /// Transport closed or failed
    Disconnected,
}

/// Session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct SessionConfig {
    /// Inter-frame timeout ending a chunked message
    #[clap(long, default_value_t = 500)]
    pub frame_timeout_ms: u64,

    /// Timeout for device responses
    #[clap(long, default_value_t = 2)]
    pub request_timeout_s: u64,

    /// Timeout for user interaction (challenges and on-device confirmation)
    #[clap(long, default_value_t = 60)]
    pub user_timeout_s: u64,

    /// Per-subscriber event queue capacity
    #[clap(skip = 64usize)]
    pub event_capacity: usize,

    /// Automatically acknowledge button requests
    #[clap(long)]
    pub auto_button_ack: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: 500,
            request_timeout_s: 2,
            user_timeout_s: 60,
            event_capacity: 64,
            auto_button_ack: false,
        }
    }
}

impl SessionConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_secs(self.user_timeout_s)
    }
}

type Response = Result<Message, Error>;

/// State shared between session handles and the reader task
struct Shared<T: Transport> {
    // Lock order: state -> transport / challenges -> subscribers
    state: Mutex<SessionState>,
    transport: Mutex<T>,
    challenges: Mutex<ChallengeCoordinator>,
    subscribers: Mutex<Vec<mpsc::Sender<DeviceEvent>>>,
    cfg: SessionConfig,
    hard: AtomicBool,
}

impl<T: Transport> Shared<T> {
    /// Publish an event to subscribers, dropping closed subscriptions
    async fn emit(&self, e: DeviceEvent) {
        debug!("Event: {}", e.kind);

        let mut subs = self.subscribers.lock().await;
        subs.retain(|s| match s.try_send(e.clone()) {
            Ok(_) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber queue full, dropping {} event", e.kind);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// Transition state, emitting the associated event where provided
    async fn transition(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        next: SessionState,
        event: Option<DeviceEvent>,
    ) {
        if **state != next {
            debug!("Session state {} -> {}", **state, next);
            **state = next;
        }

        if let Some(e) = event {
            self.emit(e).await;
        }
    }

    /// Handle a transport failure, closing the transport and moving to
    /// [SessionState::Disconnected]
    async fn fail(&self, state: &mut MutexGuard<'_, SessionState>, e: &Error) {
        let present = {
            let mut t = self.transport.lock().await;

            // Lost connections are not re-checked, a TCP presence check reconnects
            let present = match e {
                Error::Disconnected => false,
                _ => t.is_present().await,
            };

            if let Err(e) = t.close().await {
                debug!("Transport close failed: {}", e);
            }
            present
        };

        self.challenges.lock().await.clear();

        // Orderly close or unplug is a disconnect, anything else a failure
        let kind = match e {
            _ if !present => EventKind::Disconnected,
            _ => {
                error!("Transport failed: {}", e);
                EventKind::Failed(e.to_string())
            }
        };

        self.transition(state, SessionState::Disconnected, Some(DeviceEvent::new(kind)))
            .await;
    }
}

/// Handle to a running reader task
struct ReaderHandle {
    trigger: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reader task, receives one envelope per trigger
async fn reader<T: Transport>(
    shared: Arc<Shared<T>>,
    mut trigger: mpsc::Receiver<()>,
    responses: mpsc::Sender<Response>,
) {
    let framing = shared.transport.lock().await.framing();
    let mut decoder = match framing {
        Framing::Synced(s) => Decoder::with_sync(s),
        _ => Decoder::new(),
    };

    while trigger.recv().await.is_some() {
        // Read envelope, releasing the transport before updating state
        let r = {
            let mut t = shared.transport.lock().await;
            link::read_envelope(&mut *t, &mut decoder, shared.cfg.frame_timeout()).await
        };
        let r = r.and_then(|e| Message::from_envelope(&e).map_err(Error::from));

        let mut state = shared.state.lock().await;

        let r = match r {
            Ok(m) => {
                trace!("Received {}", m.message_type());

                let next = match Challenge::from_message(&m, shared.cfg.user_timeout()) {
                    Some(c) => shared
                        .challenges
                        .lock()
                        .await
                        .on_challenge_request(c)
                        .map(|_| SessionState::AwaitingChallengeAnswer),
                    None => Ok(SessionState::Idle),
                };

                match next {
                    Ok(next) => {
                        shared
                            .transition(&mut state, next, Some(DeviceEvent::message(m.clone())))
                            .await;
                        Ok(m)
                    }
                    Err(e) => {
                        shared.transition(&mut state, SessionState::Idle, None).await;
                        Err(e)
                    }
                }
            }
            Err(e) if e.is_transport() => {
                shared.fail(&mut state, &e).await;
                enqueue(&responses, Err(Error::Disconnected));
                break;
            }
            Err(e) => {
                // The decoder discards the failed envelope, decoding resumes
                // at the next marker
                if e.is_framing() {
                    warn!("Framing error, resynchronising: {}", e);
                } else {
                    warn!("Protocol error: {}", e);
                }

                shared.transition(&mut state, SessionState::Idle, None).await;
                Err(e)
            }
        };

        // Queued before the state lock is released so a following send
        // discards it as stale rather than receiving it as its response
        enqueue(&responses, r);
        drop(state);
    }

    debug!("Reader exiting");
}

/// Queue a response for [DeviceSession::recv]
fn enqueue(responses: &mpsc::Sender<Response>, r: Response) {
    match responses.try_send(r) {
        Ok(_) => (),
        Err(TrySendError::Full(r)) => {
            warn!("Response queue full, dropping {:?}", r.map(|m| m.message_type()));
        }
        Err(TrySendError::Closed(_)) => debug!("Response receiver closed"),
    }
}

/// Session with a single device
pub struct DeviceSession<T: Transport> {
    shared: Arc<Shared<T>>,
    reader: Arc<Mutex<Option<ReaderHandle>>>,
    responses: Arc<Mutex<Option<mpsc::Receiver<Response>>>>,
}

impl<T: Transport> Clone for DeviceSession<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            reader: self.reader.clone(),
            responses: self.responses.clone(),
        }
    }
}

/// Create a [DeviceSession] with the default configuration
impl<T: Transport> From<T> for DeviceSession<T> {
    fn from(t: T) -> Self {
        Self::new(t, SessionConfig::default())
    }
}

impl<T: Transport> DeviceSession<T> {
    /// Create a new (detached) session over the provided transport
    pub fn new(t: T, cfg: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Detached),
                transport: Mutex::new(t),
                challenges: Mutex::new(ChallengeCoordinator::new()),
                subscribers: Mutex::new(vec![]),
                cfg,
                hard: AtomicBool::new(false),
            }),
            reader: Arc::new(Mutex::new(None)),
            responses: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetch session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.shared.cfg
    }

    /// Fetch the current session state
    pub async fn state(&self) -> SessionState {
        *self.shared.state.lock().await
    }

    /// Fetch the outstanding challenge
    pub async fn challenge(&self) -> Option<Challenge> {
        self.shared.challenges.lock().await.pending().cloned()
    }

    /// Subscribe to session events
    pub async fn subscribe(&self) -> mpsc::Receiver<DeviceEvent> {
        let (tx, rx) = mpsc::channel(self.shared.cfg.event_capacity.max(1));
        self.shared.subscribers.lock().await.push(tx);
        rx
    }

    /// Check for the device, moving to [SessionState::Attached] if present.
    ///
    /// Returns `Ok(false)` while the device is absent, this may be polled.
    pub async fn attach(&self) -> Result<bool, Error> {
        if self.shared.hard.load(Ordering::SeqCst) {
            return Err(Error::HardDetached);
        }

        let mut state = self.shared.state.lock().await;
        if !matches!(*state, SessionState::Detached | SessionState::Disconnected) {
            return Ok(true);
        }

        if !self.shared.transport.lock().await.is_present().await {
            trace!("Device not present");
            return Ok(false);
        }

        self.shared
            .transition(
                &mut state,
                SessionState::Attached,
                Some(DeviceEvent::new(EventKind::Attached)),
            )
            .await;

        Ok(true)
    }

    /// Open the transport and start the reader task
    pub async fn connect(&self) -> Result<(), Error> {
        if self.shared.hard.load(Ordering::SeqCst) {
            return Err(Error::HardDetached);
        }

        let mut state = self.shared.state.lock().await;
        match *state {
            SessionState::Attached => (),
            SessionState::Detached | SessionState::Disconnected => return Err(Error::NotAttached),
            _ => return Ok(()),
        }

        self.shared.transport.lock().await.open().await?;

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (resp_tx, resp_rx) = mpsc::channel(1);

        let task = tokio::spawn(reader(self.shared.clone(), trigger_rx, resp_tx));

        *self.responses.lock().await = Some(resp_rx);
        if let Some(r) = self.reader.lock().await.replace(ReaderHandle {
            trigger: trigger_tx,
            task,
        }) {
            r.stop().await;
        }

        self.shared
            .transition(
                &mut state,
                SessionState::Connected,
                Some(DeviceEvent::new(EventKind::Connected)),
            )
            .await;
        self.shared
            .transition(&mut state, SessionState::Idle, None)
            .await;

        Ok(())
    }

    /// Send a message to the device, the response is fetched with
    /// [DeviceSession::recv]
    pub async fn send(&self, m: impl Into<Message>) -> Result<(), Error> {
        let mut m = m.into();

        let mut state = self.shared.state.lock().await;
        if let Err(e) = Self::check_idle(*state) {
            m.zeroize();
            return Err(e);
        }

        debug!("Sending {}", m.message_type());

        let r = self.write_and_trigger(&mut state, &m).await;
        m.zeroize();
        r
    }

    /// Await the response to the last send
    pub async fn recv(&self, timeout: Duration) -> Result<Message, Error> {
        let mut responses = self.responses.lock().await;
        let rx = responses.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(r)) => r,
            Ok(None) => Err(Error::Disconnected),
            Err(_) => {
                warn!("Timeout awaiting response");
                self.shared.emit(DeviceEvent::new(EventKind::Eof)).await;
                Err(Error::ResponseTimeout)
            }
        }
    }

    /// Send a message and await the response
    pub async fn request(
        &self,
        m: impl Into<Message>,
        timeout: Duration,
    ) -> Result<Message, Error> {
        self.send(m).await?;
        self.recv(timeout).await
    }

    /// Answer the outstanding challenge, the device response is fetched
    /// with [DeviceSession::recv].
    ///
    /// `secret` is zeroed before returning in all cases.
    pub async fn answer_challenge(&self, secret: &mut [u8]) -> Result<(), Error> {
        let mut state = self.shared.state.lock().await;
        if *state != SessionState::AwaitingChallengeAnswer {
            secret.zeroize();
            return Err(Error::NoPendingChallenge);
        }

        let mut ack = self.shared.challenges.lock().await.provide_answer(secret)?;

        let r = self.write_and_trigger(&mut state, &ack).await;
        ack.zeroize();
        r
    }

    /// Decline the outstanding challenge, sending [Cancel] to the device
    pub async fn cancel_challenge(&self) -> Result<(), Error> {
        let mut state = self.shared.state.lock().await;
        if *state != SessionState::AwaitingChallengeAnswer {
            return Err(Error::NoPendingChallenge);
        }

        self.shared.challenges.lock().await.clear();

        self.write_and_trigger(&mut state, &Cancel {}.into()).await
    }

    /// Close the transport, moving to [SessionState::Disconnected].
    ///
    /// Callers waiting on [DeviceSession::recv] receive [Error::Disconnected].
    pub async fn disconnect(&self) -> Result<(), Error> {
        let mut state = self.shutdown().await;

        self.shared
            .transition(
                &mut state,
                SessionState::Disconnected,
                Some(DeviceEvent::new(EventKind::Disconnected)),
            )
            .await;

        Ok(())
    }

    /// Release the device, a later [DeviceSession::attach] may succeed
    pub async fn soft_detach(&self) -> Result<(), Error> {
        let mut state = self.shutdown().await;

        self.shared
            .transition(
                &mut state,
                SessionState::Detached,
                Some(DeviceEvent::new(EventKind::Detached)),
            )
            .await;

        Ok(())
    }

    /// Tear down the session, no further attach or connect is possible
    pub async fn hard_detach(&self) -> Result<(), Error> {
        self.shared.hard.store(true, Ordering::SeqCst);

        let mut state = self.shutdown().await;

        self.shared
            .transition(
                &mut state,
                SessionState::Detached,
                Some(DeviceEvent::new(EventKind::DetachedHard)),
            )
            .await;

        Ok(())
    }

    fn check_idle(state: SessionState) -> Result<(), Error> {
        match state {
            SessionState::Idle => Ok(()),
            SessionState::Detached => Err(Error::NotAttached),
            SessionState::Attached => Err(Error::NotConnected),
            SessionState::Disconnected => Err(Error::Disconnected),
            s => Err(Error::Busy(s)),
        }
    }

    /// Write a message, moving to [SessionState::AwaitingResponse] and
    /// triggering the reader
    async fn write_and_trigger(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        m: &Message,
    ) -> Result<(), Error> {
        // Discard responses to abandoned requests, the reader queues each
        // response before releasing the state lock held here
        if let Some(rx) = self.responses.lock().await.as_mut() {
            while let Ok(r) = rx.try_recv() {
                debug!("Discarding stale response: {:?}", r.map(|m| m.message_type()));
            }
        }

        let mut b = m.encode()?;

        self.shared
            .transition(state, SessionState::AwaitingResponse, None)
            .await;

        let r = {
            let mut t = self.shared.transport.lock().await;
            link::write_message(&mut *t, &b).await
        };
        b.zeroize();

        if let Err(e) = r {
            if e.is_transport() {
                if let Some(r) = self.reader.lock().await.take() {
                    r.stop().await;
                }
                self.shared.fail(state, &e).await;
            } else {
                self.shared.transition(state, SessionState::Idle, None).await;
            }
            return Err(e);
        }

        let trigger = self
            .reader
            .lock()
            .await
            .as_ref()
            .map(|r| r.trigger.clone())
            .ok_or(Error::NotConnected)?;

        if trigger.send(()).await.is_err() {
            self.shared.fail(state, &Error::Disconnected).await;
            return Err(Error::Disconnected);
        }

        Ok(())
    }

    /// Stop the reader, close the transport and clear any pending
    /// challenge, returning the held state lock
    async fn shutdown(&self) -> MutexGuard<'_, SessionState> {
        // Stop the reader before taking the state lock, the reader may hold it
        if let Some(r) = self.reader.lock().await.take() {
            r.stop().await;
        }

        let state = self.shared.state.lock().await;

        self.shared.challenges.lock().await.clear();

        if let Err(e) = self.shared.transport.lock().await.close().await {
            debug!("Transport close failed: {}", e);
        }

        state
    }
}

#[cfg(test)]
mod test {
    use hwlink_proto::{messages::*, MessageType};

    use super::*;
    use crate::transport::{Emulator, Script};

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn config_defaults() {
        let c: SessionConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(c, SessionConfig::default());
        assert_eq!(c.frame_timeout(), Duration::from_millis(500));
        assert_eq!(c.request_timeout(), Duration::from_secs(2));
        assert_eq!(c.user_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn config_args() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cmd {
            #[clap(flatten)]
            cfg: SessionConfig,
        }

        let c = Cmd::parse_from(["hwlink"]).cfg;
        assert_eq!(c, SessionConfig::default());

        let c = Cmd::parse_from(["hwlink", "--request-timeout-s", "5", "--auto-button-ack"]).cfg;
        assert_eq!(c.request_timeout(), Duration::from_secs(5));
        assert_eq!(c.event_capacity, 64);
        assert!(c.auto_button_ack);
    }

    #[tokio::test]
    async fn send_requires_idle() -> anyhow::Result<()> {
        let s = DeviceSession::from(Emulator::new(
            Script::new()
                .expect(MessageType::GetAddress)
                .reply(ButtonRequest::default()),
        ));

        assert!(matches!(
            s.send(Initialize {}).await,
            Err(Error::NotAttached)
        ));

        assert!(s.attach().await?);
        assert!(matches!(
            s.send(Initialize {}).await,
            Err(Error::NotConnected)
        ));

        s.connect().await?;
        assert_eq!(s.state().await, SessionState::Idle);

        let r = s.request(GetAddress::default(), TIMEOUT).await?;
        assert_eq!(r.message_type(), MessageType::ButtonRequest);
        assert_eq!(s.state().await, SessionState::AwaitingChallengeAnswer);

        // No sends while the challenge is outstanding
        assert!(matches!(
            s.send(Initialize {}).await,
            Err(Error::Busy(SessionState::AwaitingChallengeAnswer))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn disconnect_wakes_receiver() -> anyhow::Result<()> {
        // Device never replies
        let s = DeviceSession::from(Emulator::new(Script::new().expect(MessageType::Ping)));
        s.attach().await?;
        s.connect().await?;
        s.send(Ping::default()).await?;

        let s1 = s.clone();
        let h = tokio::spawn(async move { s1.recv(Duration::from_secs(10)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        s.disconnect().await?;

        assert!(matches!(h.await?, Err(Error::Disconnected)));
        assert_eq!(s.state().await, SessionState::Disconnected);

        Ok(())
    }
}
