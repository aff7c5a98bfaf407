//! Messages for the TEA (The Elm Architecture) pattern.
//!
//! Messages come from the keyboard, from background actors, or from
//! commands reporting back when they finish.

use std::path::PathBuf;

use crossterm::event::KeyEvent;

use crate::aggregate::WorkerInfo;
use crate::config::{HiveConfig, Theme};
use crate::layout::PaneToggle;
use crate::lifecycle::{Outcome, WorkerOp};
use crate::session::SlotId;

#[derive(Debug)]
pub enum Message {
    // Keyboard/terminal events
    Key(KeyEvent),
    Resize(u16, u16),
    /// Periodic, so the hive overlay can time out.
    Tick,
    /// Config re-read from disk; another process may have toggled the theme.
    ConfigReloaded(HiveConfig),

    // From background actors
    Snapshot(Vec<WorkerInfo>),
    LogUpdated(PathBuf, Vec<String>),

    // Command completion callbacks
    OpFinished {
        op: WorkerOp,
        slot: SlotId,
        outcome: Outcome,
    },
    PaneToggled(Result<PaneToggle, String>),
    ThemeChanged(Result<Theme, String>),
    AttachFinished(Result<(), String>),
}
