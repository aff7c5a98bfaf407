//! Terminal UI rendering for the hive dashboard.
//!
//! Layout, top to bottom:
//! - one header line: project, running count, HIVE badge while the prefix is armed
//! - the worker table, one row per slot
//! - a divider, then the tail of the selected worker's log (terminal colors kept)
//! - the keymap line, replaced by the notification when there is one
//!
//! This module renders from RenderState (immutable snapshot) and never
//! mutates application state.

use ansi_to_tui::IntoText;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::keys::{hive_table, HiveAction};
use crate::render::{RenderState, WorkerView};
use crate::tea::{Notification, NotificationLevel};
use crate::theme::Palette;

// Column widths for the worker table
const SLOT_WIDTH: usize = 4;
const RUN_WIDTH: usize = 4;
const STATE_WIDTH: usize = 16;
const BRANCH_WIDTH: usize = 24;
const BAR_WIDTH: usize = 10;
const PERCENT_WIDTH: usize = 5;
const SUBAGENT_WIDTH: usize = 22;
const SPACING: usize = 2;

const HIVE_POPUP_WIDTH: u16 = 30;

/// A single keybinding entry for display.
struct Keybinding(&'static str, &'static str);

fn root_keybindings(has_selection: bool) -> Vec<Vec<Keybinding>> {
    let mut groups = Vec::new();
    if has_selection {
        groups.push(vec![
            Keybinding("s", "start"),
            Keybinding("x", "stop"),
            Keybinding("K", "kill"),
            Keybinding("r", "restart"),
        ]);
        groups.push(vec![Keybinding("Enter", "attach")]);
    }
    groups.push(vec![Keybinding("M-h", "hive"), Keybinding("q", "quit")]);
    groups
}

/// Main render function. Takes an immutable RenderState snapshot.
pub fn draw(frame: &mut Frame, state: &RenderState) {
    let palette = Palette::for_theme(state.theme);
    let area = frame.area();

    let table_height = (state.workers.len() as u16 + 1).max(2);
    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(table_height),
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .split(area);

    render_header(frame, state, &palette, chunks[0]);
    render_table(frame, state, &palette, chunks[1]);
    render_divider(frame, state, &palette, chunks[2]);
    render_log(frame, state, chunks[3]);

    match state.notification {
        Some(ref notification) => render_notification(frame, notification, &palette, chunks[4]),
        None => render_keymap(frame, state, &palette, chunks[4]),
    }

    if state.hive_active {
        render_hive_overlay(frame, state, &palette, area);
    }
}

fn render_header(frame: &mut Frame, state: &RenderState, palette: &Palette, area: Rect) {
    let mut spans = vec![
        Span::styled(format!("hive: {}", state.project), palette.title()),
        Span::styled(
            format!(
                "  {}/{} running",
                state.running_count(),
                state.workers.len()
            ),
            palette.muted(),
        ),
    ];
    if state.hive_active {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(" HIVE ", palette.selected()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_table(frame: &mut Frame, state: &RenderState, palette: &Palette, area: Rect) {
    if state.workers.is_empty() {
        let msg = Line::from(Span::styled("No workers configured.", palette.muted()));
        frame.render_widget(Paragraph::new(msg), area);
        return;
    }

    let mut lines = Vec::with_capacity(state.workers.len() + 1);
    lines.push(render_header_row(palette, area.width));
    lines.extend(
        state
            .workers
            .iter()
            .enumerate()
            .map(|(idx, w)| render_worker_row(w, idx == state.selected, palette, area.width)),
    );
    frame.render_widget(Paragraph::new(lines), area);
}

fn current_width(width: u16) -> usize {
    let fixed = SLOT_WIDTH
        + RUN_WIDTH
        + STATE_WIDTH
        + BRANCH_WIDTH
        + BAR_WIDTH
        + PERCENT_WIDTH
        + SUBAGENT_WIDTH
        + SPACING * 6;
    (width as usize).saturating_sub(fixed)
}

fn pad(s: &str, width: usize) -> String {
    format!("{:<width$}", truncate(s, width), width = width)
}

fn render_header_row(palette: &Palette, width: u16) -> Line<'static> {
    let style = palette.muted().add_modifier(Modifier::BOLD);
    let spacing = " ".repeat(SPACING);
    let cols = [
        pad("#", SLOT_WIDTH),
        pad("RUN", RUN_WIDTH),
        pad("STATUS", STATE_WIDTH),
        pad("BRANCH", BRANCH_WIDTH),
        pad("PROGRESS", BAR_WIDTH + PERCENT_WIDTH + SPACING),
        pad("CURRENT", current_width(width)),
        pad("SUBAGENT", SUBAGENT_WIDTH),
    ];
    Line::from(Span::styled(cols.join(&spacing), style))
}

/// `██████░░░░` for the given percentage.
fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (percent as usize * width + 50) / 100;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn render_worker_row(
    worker: &WorkerView,
    is_selected: bool,
    palette: &Palette,
    width: u16,
) -> Line<'static> {
    let spacing = " ".repeat(SPACING);

    let run_label = if worker.busy {
        "…"
    } else if worker.running {
        "on"
    } else {
        "off"
    };
    let state_label = worker.state.map(|s| s.as_str()).unwrap_or("-");
    let (bar, percent) = match worker.percent {
        Some(p) => (progress_bar(p, BAR_WIDTH), format!("{}%", p)),
        None => (" ".repeat(BAR_WIDTH), String::new()),
    };
    let subagent = worker
        .subagent
        .as_ref()
        .map(|s| format!("{} {}", s.name, s.state.as_str()))
        .unwrap_or_default();

    let cells: Vec<(String, Style)> = vec![
        (pad(&worker.slot.to_string(), SLOT_WIDTH), palette.text()),
        (pad(run_label, RUN_WIDTH), palette.running(worker.running)),
        (
            pad(state_label, STATE_WIDTH),
            worker
                .state
                .map(|s| palette.worker_state(s))
                .unwrap_or_else(|| palette.muted()),
        ),
        (
            pad(worker.branch.as_deref().unwrap_or(""), BRANCH_WIDTH),
            palette.muted(),
        ),
        (bar, palette.gauge()),
        (format!("{:>width$}", percent, width = PERCENT_WIDTH), palette.text()),
        (
            pad(worker.current.as_deref().unwrap_or(""), current_width(width)),
            palette.text(),
        ),
        (
            pad(&subagent, SUBAGENT_WIDTH),
            worker
                .subagent
                .as_ref()
                .map(|s| palette.subagent(s.state))
                .unwrap_or_else(|| palette.muted()),
        ),
    ];

    let selected = palette.selected();
    let mut spans = Vec::with_capacity(cells.len() * 2);
    for (i, (text, style)) in cells.into_iter().enumerate() {
        if i > 0 {
            // The bar and its percentage read as a single column.
            let gap = if i == 5 { " ".to_string() } else { spacing.clone() };
            spans.push(Span::styled(gap, if is_selected { selected } else { Style::default() }));
        }
        spans.push(Span::styled(text, if is_selected { selected } else { style }));
    }
    Line::from(spans)
}

fn render_divider(frame: &mut Frame, state: &RenderState, palette: &Palette, area: Rect) {
    let title = state.log_title.as_deref().unwrap_or("log");
    let label = format!("── {} ", title);
    let rest = (area.width as usize).saturating_sub(label.chars().count());
    let line = Line::from(vec![
        Span::styled(label, palette.muted()),
        Span::styled("─".repeat(rest), palette.muted()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// The log keeps the agent's own colors, so no palette here.
fn render_log(frame: &mut Frame, state: &RenderState, area: Rect) {
    let visible = area.height as usize;
    let start = state.log_lines.len().saturating_sub(visible);
    let content = state.log_lines[start..].join("\n");
    let text: Text = content.into_text().unwrap_or_default();
    frame.render_widget(Paragraph::new(text), area);
}

fn render_keymap(frame: &mut Frame, state: &RenderState, palette: &Palette, area: Rect) {
    let groups = root_keybindings(state.workers.get(state.selected).is_some());
    let mut spans: Vec<Span> = Vec::new();
    for (g, group) in groups.iter().enumerate() {
        if g > 0 {
            spans.push(Span::styled(" │ ", palette.muted()));
        }
        for (i, Keybinding(key, desc)) in group.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw("  "));
            }
            spans.push(Span::styled(*key, palette.key_hint()));
            spans.push(Span::styled(format!(" {}", desc), palette.muted()));
        }
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_notification(
    frame: &mut Frame,
    notification: &Notification,
    palette: &Palette,
    area: Rect,
) {
    frame.render_widget(Clear, area);

    let line = match notification.level {
        NotificationLevel::Error => Line::from(vec![
            Span::styled("Error: ", palette.error().add_modifier(Modifier::BOLD)),
            Span::styled(notification.message.clone(), palette.error()),
        ]),
        NotificationLevel::Info => Line::from(Span::styled(
            notification.message.clone(),
            palette.running(true),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn action_label(action: HiveAction) -> String {
    match action {
        HiveAction::AttachWorker(slot) => format!("attach worker {}", slot),
        HiveAction::FocusLead => "focus lead".to_string(),
        HiveAction::ToggleStatusPane => "toggle status pane".to_string(),
        HiveAction::ToggleTheme => "toggle theme".to_string(),
    }
}

fn render_hive_overlay(frame: &mut Frame, state: &RenderState, palette: &Palette, area: Rect) {
    let table = hive_table(state.worker_count);
    let mut lines = vec![Line::from(Span::styled("hive", palette.title()))];
    lines.extend(table.iter().map(|(key, action)| {
        Line::from(vec![
            Span::styled(format!(" {} ", key), palette.key_hint()),
            Span::styled(action_label(*action), palette.text()),
        ])
    }));
    lines.push(Line::from(Span::styled(" Esc  cancel", palette.muted())));

    let height = (lines.len() as u16).min(area.height);
    let width = HIVE_POPUP_WIDTH.min(area.width);
    let popup = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(lines), popup);
}

fn truncate(s: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 1).collect();
        format!("{}~", truncated)
    }
}
