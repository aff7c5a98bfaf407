//! Session Registry: deterministic session naming and live existence checks.
//!
//! The session host owns the processes; this module only knows their names.
//! Existence is always asked of the host, never remembered.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tmux::SessionHost;
use crate::{hlog_trace, Error, Result};

/// Default number of worker slots.
pub const DEFAULT_WORKERS: u8 = 4;

/// Upper bound on slots so every slot has a single-digit hive key.
pub const MAX_WORKERS: u8 = 9;

/// One of the fixed worker identities `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u8);

impl SlotId {
    /// Validate `slot` against a worker count.
    pub fn new(slot: u8, workers: u8) -> Result<Self> {
        if slot == 0 || slot > workers {
            return Err(Error::InvalidSlot {
                slot,
                max: workers,
            });
        }
        Ok(Self(slot))
    }

    /// Every slot for a worker count, in order.
    pub fn all(workers: u8) -> impl Iterator<Item = SlotId> {
        (1..=workers.min(MAX_WORKERS)).map(SlotId)
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The project namespace every session name lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectIdentity(String);

impl ProjectIdentity {
    pub fn new(name: &str) -> Self {
        let sanitized = sanitize_session_name(name);
        if sanitized.is_empty() {
            Self("project".to_string())
        } else {
            Self(sanitized)
        }
    }

    /// Identity derived from the project root directory name.
    pub fn from_root(root: &Path) -> Self {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project");
        Self::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the session hosting a worker slot.
pub fn session_name(identity: &ProjectIdentity, slot: SlotId) -> String {
    format!("hive-{}-worker-{}", identity, slot)
}

/// Name of the session hosting the lead process and layout.
pub fn lead_session_name(identity: &ProjectIdentity) -> String {
    format!("hive-{}-lead", identity)
}

/// Live view of which hive sessions exist on the host.
#[derive(Clone)]
pub struct SessionRegistry {
    host: Arc<dyn SessionHost>,
    identity: ProjectIdentity,
}

impl SessionRegistry {
    pub fn new(host: Arc<dyn SessionHost>, identity: ProjectIdentity) -> Self {
        Self { host, identity }
    }

    pub fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    pub fn host(&self) -> &Arc<dyn SessionHost> {
        &self.host
    }

    pub fn name(&self, slot: SlotId) -> String {
        session_name(&self.identity, slot)
    }

    pub fn lead_name(&self) -> String {
        lead_session_name(&self.identity)
    }

    /// Ask the host whether the slot's session exists right now.
    ///
    /// Host errors read as "not running".
    pub fn exists(&self, slot: SlotId) -> bool {
        let name = self.name(slot);
        let exists = self.host.has_session(&name);
        hlog_trace!("SessionRegistry::exists name={} exists={}", name, exists);
        exists
    }
}

fn sanitize_session_name(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
