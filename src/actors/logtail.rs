//! Log tail actor: follows the selected worker's captured output.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::aggregate::{LogTail, DEFAULT_TAIL_LINES};
use crate::tea::Message;
use crate::util::blocking_with_timeout;
use crate::{hlog_debug, hlog_trace};

use super::ActorHandle;

const TAIL_INTERVAL: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(250);

pub struct LogTailActor {
    msg_tx: mpsc::UnboundedSender<Message>,
    target: Arc<RwLock<Option<PathBuf>>>,
    interval: Duration,
    capacity: usize,
}

impl LogTailActor {
    pub fn new(
        msg_tx: mpsc::UnboundedSender<Message>,
        target: Arc<RwLock<Option<PathBuf>>>,
    ) -> Self {
        Self {
            msg_tx,
            target,
            interval: TAIL_INTERVAL,
            capacity: DEFAULT_TAIL_LINES,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> ActorHandle {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        hlog_debug!("LogTailActor::spawn interval={:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            let mut tail: Option<Arc<Mutex<LogTail>>> = None;

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        hlog_debug!("LogTailActor cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if self.msg_tx.is_closed() {
                            hlog_debug!("LogTailActor: message channel closed");
                            break;
                        }

                        let Some(path) = self.target.read().await.clone() else {
                            tail = None;
                            continue;
                        };
                        let current = tail
                            .get_or_insert_with(|| {
                                Arc::new(Mutex::new(LogTail::new(path.clone(), self.capacity)))
                            })
                            .clone();

                        let result = blocking_with_timeout(READ_TIMEOUT, move || {
                            let mut tail = current.lock().unwrap_or_else(|e| e.into_inner());
                            tail.retarget(path.clone());
                            let changed = tail.poll();
                            let lines: Vec<String> = tail.lines().map(String::from).collect();
                            Ok((path, changed, lines))
                        })
                        .await;

                        match result {
                            Ok((path, true, lines)) => {
                                let _ = self.msg_tx.send(Message::LogUpdated(path, lines));
                            }
                            Ok(_) => {}
                            Err(e) => hlog_trace!("LogTailActor: read skipped: {}", e),
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
