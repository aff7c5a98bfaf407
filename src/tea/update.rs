//! Pure update function for the TEA (The Elm Architecture) pattern.
//!
//! The update function takes a model and a message, mutates the model,
//! and returns a list of commands to execute.

use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::keys::{HiveAction, Key, ModalState};
use crate::layout::PaneToggle;
use crate::lifecycle::WorkerOp;
use crate::{hlog_debug, hlog_warn};

use super::command::{AttachTarget, Command};
use super::message::Message;
use super::model::{Model, Notification, NotificationLevel};

fn set_error(model: &mut Model, message: String) {
    hlog_warn!("UI Error: {}", message);
    model.notification = Some(Notification {
        level: NotificationLevel::Error,
        message,
    });
    model.dirty = true;
}

fn set_info(model: &mut Model, message: String) {
    model.notification = Some(Notification {
        level: NotificationLevel::Info,
        message,
    });
    model.dirty = true;
}

/// `M-h` as in tmux, plus `Ctrl-h` for terminals that eat Alt.
fn is_prefix(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('h')
        && (key.modifiers.contains(KeyModifiers::ALT)
            || key.modifiers.contains(KeyModifiers::CONTROL))
}

fn to_modal_key(key: &KeyEvent) -> Key {
    match key.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Esc => Key::Escape,
        KeyCode::Enter => Key::Enter,
        _ => Key::Other,
    }
}

pub fn update(model: &mut Model, msg: Message) -> Vec<Command> {
    let mut cmds = Vec::new();

    match msg {
        Message::Key(key) => {
            model.notification = None;
            model.dirty = true;
            if model.dispatcher.state() == ModalState::Hive {
                if let Some(action) = model.dispatcher.dispatch(to_modal_key(&key)) {
                    hive_action(action, &mut cmds);
                }
            } else if is_prefix(&key) {
                model.dispatcher.enter(Instant::now());
            } else {
                update_root(model, key, &mut cmds);
            }
        }

        Message::Resize(_, _) => {
            model.dirty = true;
        }

        Message::Tick => {
            if model.dispatcher.expire(Instant::now()) {
                hlog_debug!("hive overlay timed out");
                model.dirty = true;
            }
        }

        Message::ConfigReloaded(config) => {
            if config != model.config {
                hlog_debug!("config changed on disk: theme={}", config.theme);
                model.config = config;
                model.dirty = true;
            }
        }

        Message::Snapshot(infos) => {
            if infos != model.workers {
                model.workers = infos;
                model.dirty = true;
            }
            if model.selected >= model.workers.len() {
                model.selected = model.workers.len().saturating_sub(1);
            }
            follow_selected(model, &mut cmds);
        }

        Message::LogUpdated(path, lines) => {
            if model.log_path.as_ref() == Some(&path) {
                model.log_lines = lines;
                model.dirty = true;
            }
        }

        Message::OpFinished { op, slot, outcome } => {
            model.busy.remove(&slot);
            let message = format!("worker {}: {}", slot, outcome);
            if outcome.is_success() {
                hlog_debug!("{} worker {} finished: {}", op, slot, outcome);
                set_info(model, message);
            } else {
                set_error(model, message);
            }
        }

        Message::PaneToggled(result) => match result {
            Ok(PaneToggle::Added) => set_info(model, "status pane shown".to_string()),
            Ok(PaneToggle::Removed) => set_info(model, "status pane hidden".to_string()),
            Err(e) => set_error(model, format!("pane toggle failed: {}", e)),
        },

        Message::ThemeChanged(result) => match result {
            Ok(theme) => {
                model.config.theme = theme;
                set_info(model, format!("theme: {}", theme));
            }
            Err(e) => set_error(model, format!("theme toggle failed: {}", e)),
        },

        Message::AttachFinished(result) => {
            model.dirty = true;
            if let Err(e) = result {
                set_error(model, format!("attach failed: {}", e));
            }
        }
    }

    cmds
}

fn hive_action(action: HiveAction, cmds: &mut Vec<Command>) {
    match action {
        HiveAction::AttachWorker(slot) => cmds.push(Command::Attach(AttachTarget::Worker(slot))),
        HiveAction::FocusLead => cmds.push(Command::Attach(AttachTarget::Lead)),
        HiveAction::ToggleStatusPane => cmds.push(Command::ToggleStatusPane),
        HiveAction::ToggleTheme => cmds.push(Command::ToggleTheme),
    }
}

fn update_root(model: &mut Model, key: KeyEvent, cmds: &mut Vec<Command>) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        cmds.push(Command::Quit);
        return;
    }
    match key.code {
        KeyCode::Char('q') => cmds.push(Command::Quit),
        KeyCode::Char('j') | KeyCode::Down => {
            if model.selected + 1 < model.workers.len() {
                model.selected += 1;
            }
            follow_selected(model, cmds);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            model.selected = model.selected.saturating_sub(1);
            follow_selected(model, cmds);
        }
        KeyCode::Char('s') => request(model, WorkerOp::Start, cmds),
        KeyCode::Char('x') => request(model, WorkerOp::Stop, cmds),
        KeyCode::Char('K') => request(model, WorkerOp::Kill, cmds),
        KeyCode::Char('r') => request(model, WorkerOp::Restart, cmds),
        KeyCode::Enter => {
            if let Some(slot) = model.selected_slot() {
                cmds.push(Command::Attach(AttachTarget::Worker(slot)));
            }
        }
        _ => {}
    }
}

fn request(model: &mut Model, op: WorkerOp, cmds: &mut Vec<Command>) {
    let Some(slot) = model.selected_slot() else {
        return;
    };
    if !model.busy.insert(slot) {
        set_info(model, format!("worker {}: busy", slot));
        return;
    }
    cmds.push(Command::Worker { op, slot });
}

fn follow_selected(model: &mut Model, cmds: &mut Vec<Command>) {
    let path = model.selected_worker().map(|w| w.log.clone());
    if path != model.log_path {
        model.log_path = path.clone();
        model.log_lines.clear();
        model.dirty = true;
        cmds.push(Command::FollowLog(path));
    }
}
