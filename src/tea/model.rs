//! Model for the TEA (The Elm Architecture) pattern.
//!
//! The Model is pure dashboard state: no channels, no handles, no host.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::aggregate::WorkerInfo;
use crate::config::HiveConfig;
use crate::keys::{KeyDispatcher, ModalState};
use crate::render::{next_version, RenderState, WorkerView};
use crate::session::SlotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

pub struct Model {
    pub project: String,
    pub worker_count: u8,
    pub workers: Vec<WorkerInfo>,
    pub selected: usize,
    pub dispatcher: KeyDispatcher,

    // Tail of the selected worker's log
    pub log_path: Option<PathBuf>,
    pub log_lines: Vec<String>,

    /// Slots with a lifecycle operation in flight.
    pub busy: HashSet<SlotId>,
    pub notification: Option<Notification>,

    pub config: HiveConfig,
    pub dirty: bool,
}

impl Model {
    pub fn new(project: String, worker_count: u8, config: HiveConfig) -> Self {
        Self {
            project,
            worker_count,
            workers: Vec::new(),
            selected: 0,
            dispatcher: KeyDispatcher::new(worker_count),
            log_path: None,
            log_lines: Vec::new(),
            busy: HashSet::new(),
            notification: None,
            config,
            dirty: true,
        }
    }

    pub fn selected_worker(&self) -> Option<&WorkerInfo> {
        self.workers.get(self.selected)
    }

    pub fn selected_slot(&self) -> Option<SlotId> {
        self.selected_worker().map(|w| w.slot)
    }

    pub fn hive_active(&self) -> bool {
        self.dispatcher.state() == ModalState::Hive
    }

    pub fn snapshot(&self) -> RenderState {
        RenderState {
            version: next_version(),
            project: self.project.clone(),
            workers: self
                .workers
                .iter()
                .map(|w| WorkerView::from_info(w, self.busy.contains(&w.slot)))
                .collect(),
            selected: self.selected,
            log_title: self
                .selected_slot()
                .map(|slot| format!("worker-{}.log", slot)),
            log_lines: self.log_lines.clone(),
            hive_active: self.hive_active(),
            worker_count: self.worker_count,
            notification: self.notification.clone(),
            theme: self.config.theme,
        }
    }
}
