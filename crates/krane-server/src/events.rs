//! Workflow event broadcasting.
//!
//! Operator-visible progress events fan out over a broadcast channel;
//! subscribers (SSE handlers, tests) come and go freely and a send with
//! no receivers is not an error worth surfacing.

use krane_adm::Operation;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events published while workflows run
#[derive(Debug, Clone)]
pub enum Event {
    TaskStarted {
        cluster_id: Uuid,
        operation: Operation,
    },
    PhaseCompleted {
        cluster_id: Uuid,
        phase: String,
        success: bool,
    },
    TaskCompleted {
        cluster_id: Uuid,
        operation: Operation,
        success: bool,
    },
    HostSynced {
        host: String,
        success: bool,
    },
}

/// Event manager for publishing workflow events
#[derive(Debug, Clone)]
pub struct EventManager {
    tx: broadcast::Sender<Event>,
}

impl EventManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event; dropped silently when nobody is listening
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}
