use gcs_shared::{ObserverEvent, ServerFrame, TelemetryState};
use tokio::sync::broadcast;
use tracing::trace;

/// Frames buffered per observer before a slow one starts skipping
pub const HUB_CAPACITY: usize = 256;

/// Fan-out of snapshots and events to every connected observer.
/// Publishing never blocks; with no observers frames are dropped.
#[derive(Debug, Clone)]
pub struct ObserverHub {
    tx: broadcast::Sender<ServerFrame>,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}

impl ObserverHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerFrame> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish_snapshot(&self, state: TelemetryState) {
        self.publish(ServerFrame::Snapshot(state));
    }

    pub fn notify(&self, event: ObserverEvent) {
        self.publish(ServerFrame::Event(event));
    }

    fn publish(&self, frame: ServerFrame) {
        if self.tx.send(frame).is_err() {
            trace!("[OBSERVER] No observers, frame dropped");
        }
    }
}
