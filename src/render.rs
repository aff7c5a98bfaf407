use std::sync::atomic::{AtomicU64, Ordering};

use crate::aggregate::WorkerInfo;
use crate::config::Theme;
use crate::session::SlotId;
use crate::status::{SubagentState, WorkerState};
use crate::tea::Notification;

#[derive(Debug, Clone, PartialEq)]
pub struct SubagentView {
    pub name: String,
    pub state: SubagentState,
    pub message: Option<String>,
}

/// One table row. Status fields are empty whenever the worker is not
/// running, however recent the status document is.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerView {
    pub slot: SlotId,
    pub session: String,
    pub running: bool,
    pub busy: bool,
    pub state: Option<WorkerState>,
    pub branch: Option<String>,
    pub current: Option<String>,
    /// Already clamped to 0..=100.
    pub percent: Option<u8>,
    pub subagent: Option<SubagentView>,
}

impl WorkerView {
    pub fn from_info(info: &WorkerInfo, busy: bool) -> Self {
        let status = info.live_status();
        Self {
            slot: info.slot,
            session: info.session.clone(),
            running: info.running,
            busy,
            state: status.map(|s| s.status),
            branch: status.and_then(|s| s.branch.clone()),
            current: status.and_then(|s| s.current.clone()),
            percent: status.and_then(|s| s.display_percent()),
            subagent: status.and_then(|s| s.subagent.as_ref()).map(|sub| SubagentView {
                name: sub.name.clone(),
                state: sub.status,
                message: sub.message.clone(),
            }),
        }
    }
}

static VERSION_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn next_version() -> u64 {
    VERSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Immutable snapshot handed to the render thread.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub version: u64,
    pub project: String,
    pub workers: Vec<WorkerView>,
    pub selected: usize,
    pub log_title: Option<String>,
    pub log_lines: Vec<String>,
    /// The one-shot hive overlay is showing.
    pub hive_active: bool,
    pub worker_count: u8,
    pub notification: Option<Notification>,
    pub theme: Theme,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            version: 0,
            project: String::new(),
            workers: Vec::new(),
            selected: 0,
            log_title: None,
            log_lines: Vec::new(),
            hive_active: false,
            worker_count: 0,
            notification: None,
            theme: Theme::default(),
        }
    }
}

impl RenderState {
    pub fn running_count(&self) -> usize {
        self.workers.iter().filter(|w| w.running).count()
    }
}
