//! Engine event notifications.
//!
//! Events are published on a broadcast channel for external observers
//! (analytics, UI badges). The engine never depends on anyone listening:
//! publishing to zero receivers is a no-op.

use tokio::sync::broadcast;

use crate::models::{ResolutionStrategy, SaveId};
use crate::sync::SyncOutcome;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted by the engine after a state change.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SaveCreated {
        save_id: SaveId,
        user_id: String,
        slot_name: String,
        version: u64,
    },
    SaveDeleted {
        save_id: SaveId,
    },
    ConflictDetected {
        save_id: SaveId,
    },
    ConflictResolved {
        save_id: SaveId,
        strategy: ResolutionStrategy,
    },
    SyncCompleted {
        save_id: SaveId,
        outcome: SyncOutcome,
    },
}

/// Fire-and-forget broadcast of engine events.
#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        // A send error just means no one is listening right now.
        let _ = self.sender.send(event);
    }
}
