//! Snapshot actor: liveness and status for every slot, once per interval.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregate::Aggregator;
use crate::tea::Message;
use crate::util::blocking_with_timeout;
use crate::{hlog_debug, hlog_trace};

use super::ActorHandle;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(3);

pub struct SnapshotActor {
    msg_tx: mpsc::UnboundedSender<Message>,
    aggregator: Arc<Mutex<Aggregator>>,
    interval: Duration,
}

impl SnapshotActor {
    pub fn new(msg_tx: mpsc::UnboundedSender<Message>, aggregator: Aggregator) -> Self {
        Self {
            msg_tx,
            aggregator: Arc::new(Mutex::new(aggregator)),
            interval: SNAPSHOT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> ActorHandle {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        hlog_debug!("SnapshotActor::spawn interval={:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        hlog_debug!("SnapshotActor cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if self.msg_tx.is_closed() {
                            hlog_debug!("SnapshotActor: message channel closed");
                            break;
                        }

                        let aggregator = self.aggregator.clone();
                        let result = blocking_with_timeout(POLL_TIMEOUT, move || {
                            let mut agg = aggregator.lock().unwrap_or_else(|e| e.into_inner());
                            Ok(agg.poll())
                        })
                        .await;

                        match result {
                            Ok(infos) => {
                                let _ = self.msg_tx.send(Message::Snapshot(infos));
                            }
                            Err(e) => hlog_trace!("SnapshotActor: poll skipped: {}", e),
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
