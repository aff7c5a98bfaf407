//! Status Store: the per-slot JSON documents workers write to report progress.
//!
//! Reading is permissive: unknown enum values fold into `Unknown`, extra
//! fields are ignored, and a missing or unparsable file reads as absent.
//! Writing is strict: only valid states and in-range percentages go to disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::paths::HivePaths;
use crate::session::SlotId;
use crate::util::write_atomic;
use crate::{hlog_debug, hlog_trace, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Coding,
    Testing,
    Reviewing,
    ReadyForReview,
    Approved,
    #[serde(other)]
    Unknown,
}

impl WorkerState {
    pub const WRITABLE: [WorkerState; 6] = [
        WorkerState::Idle,
        WorkerState::Coding,
        WorkerState::Testing,
        WorkerState::Reviewing,
        WorkerState::ReadyForReview,
        WorkerState::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Coding => "coding",
            WorkerState::Testing => "testing",
            WorkerState::Reviewing => "reviewing",
            WorkerState::ReadyForReview => "ready_for_review",
            WorkerState::Approved => "approved",
            WorkerState::Unknown => "unknown",
        }
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        WorkerState::Unknown
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WorkerState::WRITABLE
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown status '{}' (expected one of: {})",
                    s,
                    WorkerState::WRITABLE.map(|st| st.as_str()).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentState {
    Running,
    Passed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl SubagentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubagentState::Running => "running",
            SubagentState::Passed => "passed",
            SubagentState::Failed => "failed",
            SubagentState::Unknown => "unknown",
        }
    }
}

impl FromStr for SubagentState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(SubagentState::Running),
            "passed" => Ok(SubagentState::Passed),
            "failed" => Ok(SubagentState::Failed),
            other => Err(Error::Validation(format!(
                "unknown subagent status '{}' (expected running, passed or failed)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subagent {
    #[serde(default)]
    pub name: String,
    #[serde(default = "unknown_subagent")]
    pub status: SubagentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn unknown_subagent() -> SubagentState {
    SubagentState::Unknown
}

/// The status document for one slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    #[serde(default)]
    pub status: WorkerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// As written; not range-checked on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent: Option<Subagent>,
}

impl WorkerStatus {
    pub fn new(status: WorkerState) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Percent clamped to 0..=100 for display. Non-finite values are hidden.
    pub fn display_percent(&self) -> Option<u8> {
        let p = self.percent?;
        if !p.is_finite() {
            return None;
        }
        Some(p.round().clamp(0.0, 100.0) as u8)
    }

    /// Reject anything a reader would have to be lenient about.
    pub fn validate(&self) -> Result<()> {
        if self.status == WorkerState::Unknown {
            return Err(Error::Validation("status must be set".to_string()));
        }
        if let Some(p) = self.percent {
            if !p.is_finite() || !(0.0..=100.0).contains(&p) {
                return Err(Error::Validation(format!(
                    "percent must be between 0 and 100, got {}",
                    p
                )));
            }
        }
        if let Some(sub) = &self.subagent {
            if sub.status == SubagentState::Unknown {
                return Err(Error::Validation("subagent status must be set".to_string()));
            }
            if sub.name.trim().is_empty() {
                return Err(Error::Validation("subagent name must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Fields a worker reports. `None` keeps what the document already says.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<WorkerState>,
    pub branch: Option<String>,
    pub current: Option<String>,
    pub percent: Option<f64>,
    pub subagent: Option<Subagent>,
}

impl StatusUpdate {
    pub fn apply(self, base: Option<WorkerStatus>) -> WorkerStatus {
        let mut doc = base.unwrap_or_default();
        if let Some(status) = self.status {
            doc.status = status;
        }
        if self.branch.is_some() {
            doc.branch = self.branch;
        }
        if self.current.is_some() {
            doc.current = self.current;
        }
        if self.percent.is_some() {
            doc.percent = self.percent;
        }
        if self.subagent.is_some() {
            doc.subagent = self.subagent;
        }
        doc
    }
}

/// What a single read of a status file found.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Missing,
    /// Present but unreadable or not a status document (e.g. mid-write).
    Malformed,
    Present(WorkerStatus),
}

/// Reader (and strict writer) for the status directory.
#[derive(Debug, Clone)]
pub struct StatusStore {
    dir: PathBuf,
}

impl StatusStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn for_project(paths: &HivePaths) -> Self {
        Self::new(paths.status_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, slot: SlotId) -> PathBuf {
        self.dir.join(format!("worker-{}.json", slot))
    }

    pub fn probe(&self, slot: SlotId) -> Probe {
        let path = self.path(slot);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Probe::Missing,
            Err(e) => {
                hlog_trace!("status read failed for {}: {}", path.display(), e);
                return Probe::Malformed;
            }
        };
        match serde_json::from_str::<WorkerStatus>(&contents) {
            Ok(status) => Probe::Present(status),
            Err(e) => {
                hlog_trace!("status parse failed for {}: {}", path.display(), e);
                Probe::Malformed
            }
        }
    }

    /// The slot's document, or `None` when missing or malformed.
    pub fn read(&self, slot: SlotId) -> Option<WorkerStatus> {
        match self.probe(slot) {
            Probe::Present(status) => Some(status),
            Probe::Missing | Probe::Malformed => None,
        }
    }

    /// Validate and atomically replace the slot's document.
    pub fn write(&self, slot: SlotId, status: &WorkerStatus) -> Result<()> {
        status.validate()?;
        let json = serde_json::to_vec_pretty(status)?;
        write_atomic(&self.path(slot), &json)?;
        hlog_debug!("Status written for slot {}: {}", slot, status.status);
        Ok(())
    }

    /// Merge `update` into the slot's current document and write the result.
    ///
    /// A malformed document on disk is replaced, not merged.
    pub fn report(&self, slot: SlotId, update: StatusUpdate) -> Result<WorkerStatus> {
        let doc = update.apply(self.read(slot));
        self.write(slot, &doc)?;
        Ok(doc)
    }

    /// Remove the slot's document so it reads as "not yet initialized".
    pub fn reset(&self, slot: SlotId) -> Result<()> {
        match std::fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
