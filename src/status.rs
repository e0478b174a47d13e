//! Status channel
//!
//! Typed events the coordinator publishes on every state transition and
//! every error. The presentation layer subscribes and renders; nothing in
//! the core blocks on a slow or absent consumer.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::engine::DriveSlot;

/// Which textual status surface a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusArea {
    Global,
    Slot(DriveSlot),
}

/// Everything the presentation layer needs to mirror coordinator state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum StatusEvent {
    SessionEstablished {
        slot: DriveSlot,
    },
    SessionClosed {
        slot: DriveSlot,
    },
    FilesUpdated {
        slot: DriveSlot,
        files: Vec<String>,
    },
    SelectionChanged {
        slot: DriveSlot,
        file: String,
    },
    TransferStarted {
        source_path: String,
        dest_path: String,
    },
    Message {
        area: StatusArea,
        text: String,
    },
}

/// Broadcast fan-out for status events. Lossy for laggy subscribers, which
/// is fine for status text.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. No subscribers is not an error.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.sender.send(event);
    }

    pub fn message(&self, area: StatusArea, text: impl Into<String>) {
        self.publish(StatusEvent::Message {
            area,
            text: text.into(),
        });
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}
