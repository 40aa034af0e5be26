//! Lifecycle notifications for monitors

use tokio::sync::broadcast;

/// Something changed in the resource core
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RmEvent {
    NodeAdded { url: String, source: String },
    NodeFree { url: String },
    NodeBusy { url: String },
    NodeToRelease { url: String },
    NodeDown { url: String },
    NodeRemoved { url: String },
    SourceAdded { name: String },
    SourceRemoved { name: String },
    ShuttingDown,
}

/// Broadcast side of the event stream; emitting never waits
#[derive(Clone)]
pub struct RmMonitor {
    tx: broadcast::Sender<RmEvent>,
}

impl RmMonitor {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn emit(&self, event: RmEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RmEvent> {
        self.tx.subscribe()
    }
}
