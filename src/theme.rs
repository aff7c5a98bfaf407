//! Display palette for the dashboard, chosen from the configured [`Theme`].

use ratatui::style::{Color, Modifier, Style};

use crate::config::Theme;
use crate::status::{SubagentState, WorkerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub highlight_fg: Color,
    pub highlight_bg: Color,
    pub gauge: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                text: Color::Rgb(220, 220, 225),
                muted: Color::Rgb(140, 135, 125),
                accent: Color::Rgb(255, 183, 77),
                success: Color::Rgb(100, 230, 180),
                warning: Color::Rgb(255, 215, 0),
                error: Color::Rgb(255, 90, 90),
                highlight_fg: Color::Rgb(40, 37, 32),
                highlight_bg: Color::Rgb(255, 183, 77),
                gauge: Color::Rgb(255, 138, 61),
            },
            Theme::Light => Self {
                text: Color::Rgb(40, 37, 32),
                muted: Color::Rgb(110, 104, 95),
                accent: Color::Rgb(176, 98, 0),
                success: Color::Rgb(20, 130, 80),
                warning: Color::Rgb(160, 120, 0),
                error: Color::Rgb(190, 30, 30),
                highlight_fg: Color::Rgb(255, 250, 240),
                highlight_bg: Color::Rgb(176, 98, 0),
                gauge: Color::Rgb(200, 90, 20),
            },
        }
    }

    pub fn text(&self) -> Style {
        Style::default().fg(self.text)
    }

    pub fn muted(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn title(&self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn selected(&self) -> Style {
        Style::default()
            .fg(self.highlight_fg)
            .bg(self.highlight_bg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn key_hint(&self) -> Style {
        self.title()
    }

    pub fn running(&self, running: bool) -> Style {
        if running {
            Style::default().fg(self.success)
        } else {
            self.muted()
        }
    }

    pub fn worker_state(&self, state: WorkerState) -> Style {
        let color = match state {
            WorkerState::Idle => self.muted,
            WorkerState::Coding => self.accent,
            WorkerState::Testing | WorkerState::Reviewing => self.warning,
            WorkerState::ReadyForReview | WorkerState::Approved => self.success,
            WorkerState::Unknown => self.muted,
        };
        Style::default().fg(color)
    }

    pub fn subagent(&self, state: SubagentState) -> Style {
        let color = match state {
            SubagentState::Running => self.warning,
            SubagentState::Passed => self.success,
            SubagentState::Failed => self.error,
            SubagentState::Unknown => self.muted,
        };
        Style::default().fg(color)
    }

    pub fn gauge(&self) -> Style {
        Style::default().fg(self.gauge)
    }

    pub fn error(&self) -> Style {
        Style::default().fg(self.error)
    }
}

impl From<Theme> for Palette {
    fn from(theme: Theme) -> Self {
        Self::for_theme(theme)
    }
}
