//! Background pollers for the dashboard.
//!
//! Each actor is an independent tokio task on its own interval. Actors never
//! touch the model; they send messages that only the logic thread applies.

pub mod logtail;
pub mod snapshot;

use tokio_util::sync::CancellationToken;

pub use logtail::LogTailActor;
pub use snapshot::SnapshotActor;

/// Handle to a running actor, used for graceful shutdown.
pub struct ActorHandle {
    cancel: CancellationToken,
}

impl ActorHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the actor to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
