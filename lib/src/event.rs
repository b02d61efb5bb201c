// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session events, delivered in transition order to per-session subscribers

use hwlink_proto::{Message, MessageType};

/// Event kind, displayed as the event name (`DEVICE_CONNECTED`,
/// `TX_REQUEST`, etc.)
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// Device enumerated
    Attached,
    /// Transport opened and reader started
    Connected,
    /// Orderly close or device removed
    Disconnected,
    /// Session released, may be re-attached
    Detached,
    /// Session torn down, can not be re-attached
    DetachedHard,
    /// Transport failure
    Failed(String),
    /// No response where one was expected
    Eof,
    /// Message received from the device
    Message(MessageType),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Attached => write!(f, "DEVICE_ATTACHED"),
            EventKind::Connected => write!(f, "DEVICE_CONNECTED"),
            EventKind::Disconnected => write!(f, "DEVICE_DISCONNECTED"),
            EventKind::Detached => write!(f, "DEVICE_DETACHED"),
            EventKind::DetachedHard => write!(f, "DEVICE_DETACHED_HARD"),
            EventKind::Failed(_) => write!(f, "DEVICE_FAILED"),
            EventKind::Eof => write!(f, "DEVICE_EOF"),
            EventKind::Message(t) => write!(f, "{t}"),
        }
    }
}

/// Device event, carrying the decoded message where one exists
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceEvent {
    pub kind: EventKind,
    pub message: Option<Message>,
}

impl DeviceEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Create an event for a received message
    pub fn message(m: Message) -> Self {
        Self {
            kind: EventKind::Message(m.message_type()),
            message: Some(m),
        }
    }

    /// Fetch the event name
    pub fn name(&self) -> String {
        self.kind.to_string()
    }
}
