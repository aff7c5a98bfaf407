//! Commands for the TEA (The Elm Architecture) pattern.
//!
//! Commands are outputs from the update function, executed by the logic
//! thread.

use std::path::PathBuf;

use crate::lifecycle::WorkerOp;
use crate::session::SlotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachTarget {
    Worker(SlotId),
    Lead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Terminal control
    Attach(AttachTarget),

    // Worker lifecycle (runs off the logic thread)
    Worker { op: WorkerOp, slot: SlotId },

    // Layout and display
    ToggleStatusPane,
    ToggleTheme,

    /// Point the log tail actor at another file.
    FollowLog(Option<PathBuf>),

    // App lifecycle
    Quit,
}
