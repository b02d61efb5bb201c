// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use tokio::time::Instant;

use hwlink::{
    proto::{frame::HID_SYNC, messages::*, Message, MessageType},
    transport::{Emulator, Framing, Script, Transport},
    DeviceSession, Error, SessionConfig, SessionState,
};

mod helpers;
use helpers::{event_names, setup, setup_logging};

const TIMEOUT: Duration = Duration::from_secs(1);

fn features(label: &str) -> Features {
    Features {
        vendor: Some("emulator".to_string()),
        label: Some(label.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn lifecycle_events() -> anyhow::Result<()> {
    let (h, _ctl, mut events) = setup(
        Script::new()
            .expect(MessageType::Initialize)
            .reply(features("one")),
        SessionConfig::default(),
    )
    .await;

    let f = h.initialize().await?;
    assert_eq!(f.label(), "one");
    assert_eq!(h.session().state().await, SessionState::Idle);

    h.close().await?;
    assert_eq!(h.session().state().await, SessionState::Disconnected);

    assert_eq!(
        event_names(&mut events),
        vec![
            "DEVICE_ATTACHED",
            "DEVICE_CONNECTED",
            "FEATURES",
            "DEVICE_DISCONNECTED"
        ]
    );

    // Sends are rejected once disconnected
    assert!(matches!(
        h.session().send(Initialize {}).await,
        Err(Error::Disconnected)
    ));

    Ok(())
}

#[tokio::test]
async fn event_payloads() -> anyhow::Result<()> {
    let (h, _ctl, mut events) = setup(
        Script::new()
            .expect(MessageType::Initialize)
            .reply(features("payload")),
        SessionConfig::default(),
    )
    .await;

    h.initialize().await?;

    let m = loop {
        let e = events.try_recv()?;
        if let Some(m) = e.message {
            break m;
        }
    };

    assert_eq!(m, Message::Features(features("payload")));

    Ok(())
}

#[tokio::test]
async fn soft_detach_reattach() -> anyhow::Result<()> {
    let (h, _ctl, mut events) = setup(
        Script::new()
            .expect(MessageType::Initialize)
            .reply(features("first"))
            .expect(MessageType::Initialize)
            .reply(features("second")),
        SessionConfig::default(),
    )
    .await;

    assert_eq!(h.initialize().await?.label(), "first");

    let s = h.session();
    s.soft_detach().await?;
    assert_eq!(s.state().await, SessionState::Detached);

    // Released sessions may be re-attached
    h.open().await?;
    assert_eq!(h.initialize().await?.label(), "second");

    assert_eq!(
        event_names(&mut events),
        vec![
            "DEVICE_ATTACHED",
            "DEVICE_CONNECTED",
            "FEATURES",
            "DEVICE_DETACHED",
            "DEVICE_ATTACHED",
            "DEVICE_CONNECTED",
            "FEATURES",
        ]
    );

    Ok(())
}

#[tokio::test]
async fn hard_detach() -> anyhow::Result<()> {
    let (h, _ctl, mut events) = setup(
        Script::new().expect(MessageType::Initialize),
        SessionConfig::default(),
    )
    .await;

    let s = h.session();
    s.hard_detach().await?;
    assert_eq!(s.state().await, SessionState::Detached);

    assert!(matches!(s.attach().await, Err(Error::HardDetached)));
    assert!(matches!(s.connect().await, Err(Error::HardDetached)));
    assert!(matches!(h.open().await, Err(Error::HardDetached)));

    assert_eq!(
        event_names(&mut events),
        vec!["DEVICE_ATTACHED", "DEVICE_CONNECTED", "DEVICE_DETACHED_HARD"]
    );

    Ok(())
}

#[tokio::test]
async fn absent_device() -> anyhow::Result<()> {
    setup_logging();

    let e = Emulator::new(Script::new());
    let ctl = e.control();
    ctl.set_present(false);

    let s = DeviceSession::from(e);
    assert!(!s.attach().await?);
    assert_eq!(s.state().await, SessionState::Detached);

    // Attach succeeds once the device appears
    ctl.set_present(true);
    assert!(s.attach().await?);
    assert_eq!(s.state().await, SessionState::Attached);

    Ok(())
}

#[tokio::test]
async fn response_timeout() -> anyhow::Result<()> {
    let (h, _ctl, mut events) = setup(
        Script::new()
            .expect(MessageType::Ping)
            .reply_after(Duration::from_millis(200), Success::default()),
        SessionConfig::default(),
    )
    .await;
    let s = h.session();

    let r = s.request(Ping::default(), Duration::from_millis(50)).await;
    assert!(matches!(r, Err(Error::ResponseTimeout)));

    // The request remains outstanding
    assert_eq!(s.state().await, SessionState::AwaitingResponse);
    assert!(matches!(
        s.send(Ping::default()).await,
        Err(Error::Busy(SessionState::AwaitingResponse))
    ));

    // Late responses are delivered to the next receive
    let m = s.recv(TIMEOUT).await?;
    assert_eq!(m, Message::Success(Success::default()));
    assert_eq!(s.state().await, SessionState::Idle);

    assert_eq!(
        event_names(&mut events),
        vec!["DEVICE_ATTACHED", "DEVICE_CONNECTED", "DEVICE_EOF", "SUCCESS"]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_response_not_delivered() -> anyhow::Result<()> {
    setup_logging();

    let success = |m: &str| Success {
        message: Some(m.to_string()),
    };

    for i in 0..100 {
        let s = DeviceSession::from(Emulator::new(
            Script::new()
                .expect(MessageType::Ping)
                .reply_after(Duration::from_millis(5), success("first"))
                .expect(MessageType::Ping)
                .reply(success("second")),
        ));
        s.attach().await?;
        s.connect().await?;

        // Abandon the first request
        let r = s.request(Ping::default(), Duration::from_millis(1)).await;
        assert!(matches!(r, Err(Error::ResponseTimeout)));

        // Send as soon as the session returns to idle
        let deadline = Instant::now() + TIMEOUT;
        loop {
            match s.send(Ping::default()).await {
                Ok(_) => break,
                Err(Error::Busy(_)) if Instant::now() < deadline => {
                    tokio::task::yield_now().await
                }
                Err(e) => return Err(e.into()),
            }
        }

        let m = s.recv(TIMEOUT).await?;
        assert_eq!(
            m,
            Message::Success(success("second")),
            "stale response delivered (iteration {i})"
        );

        s.disconnect().await?;
    }

    Ok(())
}

#[tokio::test]
async fn chunked_session() -> anyhow::Result<()> {
    setup_logging();

    // Spans several 63 byte chunks
    let address = Address {
        address: "1".repeat(200),
    };

    let e = Emulator::new(
        Script::new()
            .expect(MessageType::GetAddress)
            .reply(address.clone())
            .expect(MessageType::Ping)
            .reply(Success::default()),
    )
    .with_framing(Framing::Chunked);
    let ctl = e.control();

    let cfg = SessionConfig {
        frame_timeout_ms: 20,
        ..Default::default()
    };
    let s = DeviceSession::new(e, cfg);
    s.attach().await?;
    s.connect().await?;

    let req = GetAddress {
        address_n: vec![0x8000_002c, 0x8000_0000, 0x8000_0000, 0, 0],
        ..Default::default()
    };
    let m = s.request(req.clone(), TIMEOUT).await?;
    assert_eq!(m, Message::Address(address));

    // Link silence ended the reply, the next exchange is unaffected
    let m = s.request(Ping::default(), TIMEOUT).await?;
    assert_eq!(m, Message::Success(Success::default()));

    assert_eq!(ctl.received()[0], Message::GetAddress(req));
    assert_eq!(s.state().await, SessionState::Idle);

    Ok(())
}

#[tokio::test]
async fn synced_session() -> anyhow::Result<()> {
    setup_logging();

    let f = features(&"x".repeat(150));

    let e = Emulator::new(
        Script::new()
            .expect(MessageType::Initialize)
            .reply_raw(Duration::ZERO, vec![0x00, 0x3a, 0x17])
            .reply(f.clone()),
    )
    .with_framing(Framing::Synced(HID_SYNC));
    let ctl = e.control();

    let s = DeviceSession::from(e);
    s.attach().await?;
    s.connect().await?;

    // Junk report ahead of the envelope is skipped
    let m = s.request(Initialize {}, TIMEOUT).await?;
    assert_eq!(m, Message::Features(f));

    assert_eq!(ctl.received_types(), vec![MessageType::Initialize]);
    assert_eq!(s.state().await, SessionState::Idle);

    Ok(())
}

#[tokio::test]
async fn scripted_disconnect() -> anyhow::Result<()> {
    let (h, ctl, mut events) = setup(
        Script::new()
            .expect(MessageType::Initialize)
            .disconnect_after(Duration::from_millis(10)),
        SessionConfig::default(),
    )
    .await;

    assert!(matches!(h.initialize().await, Err(Error::Disconnected)));
    assert_eq!(h.session().state().await, SessionState::Disconnected);
    assert!(!ctl.is_present());

    assert_eq!(
        event_names(&mut events),
        vec!["DEVICE_ATTACHED", "DEVICE_CONNECTED", "DEVICE_DISCONNECTED"]
    );

    // Unplugged devices can not be re-attached
    assert!(!h.session().attach().await?);

    Ok(())
}

#[tokio::test]
async fn unexpected_message_failure() -> anyhow::Result<()> {
    let (h, _ctl, _events) = setup(
        Script::new().expect(MessageType::Initialize),
        SessionConfig::default(),
    )
    .await;

    match h.features().await {
        Err(Error::Failure { code, .. }) => assert_eq!(code, FailureType::UnexpectedMessage),
        r => panic!("unexpected result: {r:?}"),
    }

    // Failures leave the session usable
    assert_eq!(h.session().state().await, SessionState::Idle);

    Ok(())
}

#[tokio::test]
async fn garbage_resync() -> anyhow::Result<()> {
    let (h, _ctl, _events) = setup(
        Script::new()
            .expect(MessageType::Ping)
            .reply_raw(Duration::ZERO, vec![0xde, 0xad, 0xbe, 0xef])
            .reply_after(Duration::from_millis(10), Success::default()),
        SessionConfig::default(),
    )
    .await;

    // Leading garbage is skipped when scanning for the envelope marker
    let s = h.session();
    let m = s.request(Ping::default(), TIMEOUT).await?;
    assert_eq!(m, Message::Success(Success::default()));

    Ok(())
}

#[tokio::test]
async fn emulator_transport() -> anyhow::Result<()> {
    // Transport level sanity check, host writes are recorded
    let mut e = Emulator::new(Script::new().expect(MessageType::Initialize));
    let ctl = e.control();

    e.open().await?;
    e.write(&Message::from(Initialize {}).encode()?).await?;

    assert_eq!(ctl.received_types(), vec![MessageType::Initialize]);

    Ok(())
}
