//! Layout Composer: the lead session and its pane arrangement.

use std::path::PathBuf;

use crate::agent::Agent;
use crate::keys::{hive_bindings, install_bindings, BindingContext};
use crate::paths::HivePaths;
use crate::session::{SessionRegistry, SlotId};
use crate::tmux::{exact, Orientation, PaneInfo};
use crate::util::shell_escape;
use crate::{hlog, hlog_debug, Error, Result};

pub const MIN_LEAD_PERCENT: u8 = 20;
pub const MAX_LEAD_PERCENT: u8 = 80;
pub const DEFAULT_LEAD_PERCENT: u8 = 60;

pub const LEAD_TITLE: &str = "lead";
pub const STATUS_TITLE: &str = "status";

/// Lines of history a worker pane shows when it starts tailing.
const WORKER_PANE_HISTORY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    /// Lead plus one aggregated status pane.
    #[default]
    Status,
    /// Lead plus one pane per worker tailing its log.
    Workers,
    LeadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSpec {
    lead_percent: u8,
    pub mode: LayoutMode,
}

impl LayoutSpec {
    pub fn new(lead_percent: u8, mode: LayoutMode) -> Self {
        Self {
            lead_percent: clamp_lead_percent(lead_percent),
            mode,
        }
    }

    pub fn lead_percent(&self) -> u8 {
        self.lead_percent
    }

    fn side_percent(&self) -> u8 {
        100 - self.lead_percent
    }
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self::new(DEFAULT_LEAD_PERCENT, LayoutMode::default())
    }
}

pub fn clamp_lead_percent(percent: u8) -> u8 {
    percent.clamp(MIN_LEAD_PERCENT, MAX_LEAD_PERCENT)
}

pub fn worker_title(slot: SlotId) -> String {
    format!("worker-{}", slot)
}

/// Panes created by one composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedLayout {
    pub session: String,
    pub lead_pane: String,
    pub status_pane: Option<String>,
    pub worker_panes: Vec<(SlotId, String)>,
    pub bindings_installed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneToggle {
    Added,
    Removed,
}

pub struct LayoutComposer {
    registry: SessionRegistry,
    paths: HivePaths,
    exe: PathBuf,
    agent: Agent,
    workers: u8,
}

impl LayoutComposer {
    pub fn new(
        registry: SessionRegistry,
        paths: HivePaths,
        exe: PathBuf,
        agent: Agent,
        workers: u8,
    ) -> Self {
        Self {
            registry,
            paths,
            exe,
            agent,
            workers,
        }
    }

    fn hive_command(&self, sub: &str) -> String {
        format!(
            "{} --project {} --workers {} {}",
            shell_escape(&self.exe.display().to_string()),
            shell_escape(&self.paths.root().display().to_string()),
            self.workers,
            sub
        )
    }

    /// Build the lead session from scratch. An existing one is torn down.
    pub fn compose(&self, spec: LayoutSpec) -> Result<ComposedLayout> {
        let host = self.registry.host();
        let session = self.registry.lead_name();
        let root = self.paths.root();

        if host.has_session(&session) {
            // Killing it would take this process down with it.
            if host.current_session().as_deref() == Some(session.as_str()) {
                return Err(Error::Tmux(format!(
                    "cannot rebuild '{}' from inside it; detach or run from another session",
                    session
                )));
            }
            hlog!("Rebuilding existing lead session {}", session);
            host.kill_session(&session)?;
        }
        host.create_session(&session, root, None)?;

        let lead_pane = host
            .list_panes(&session)?
            .into_iter()
            .next()
            .map(|p| p.id)
            .ok_or_else(|| Error::Tmux(format!("session '{}' has no panes", session)))?;

        let target = exact(&session);
        for (option, value) in [("pane-border-status", "top"), ("mouse", "on")] {
            if let Err(e) = host.set_option(Some(&target), option, value) {
                hlog_debug!("Ignoring unsupported option {}: {}", option, e);
            }
        }
        let _ = host.set_pane_title(&lead_pane, LEAD_TITLE);

        let mut layout = ComposedLayout {
            session: session.clone(),
            lead_pane: lead_pane.clone(),
            status_pane: None,
            worker_panes: Vec::new(),
            bindings_installed: 0,
        };

        match spec.mode {
            LayoutMode::Status => {
                layout.status_pane = Some(self.add_status_pane(&lead_pane, spec.side_percent())?);
            }
            LayoutMode::Workers => {
                layout.worker_panes = self.add_worker_panes(&lead_pane, spec.side_percent())?;
            }
            LayoutMode::LeadOnly => {}
        }

        let env = [("HIVE_PROJECT", root.display().to_string())];
        host.send_keys(&lead_pane, &self.agent.launch_line(&env, None), true)?;
        let _ = host.select_pane(&lead_pane);

        let ctx = BindingContext {
            exe: &self.exe,
            root,
            registry: &self.registry,
            workers: self.workers,
            lead_pane: Some(&lead_pane),
        };
        layout.bindings_installed = install_bindings(host.as_ref(), &hive_bindings(&ctx));

        hlog!(
            "Composed {} ({:?}, lead {}%)",
            session,
            spec.mode,
            spec.lead_percent()
        );
        Ok(layout)
    }

    fn add_status_pane(&self, lead_pane: &str, percent: u8) -> Result<String> {
        let host = self.registry.host();
        let pane = host.split_window(
            lead_pane,
            Orientation::Horizontal,
            percent,
            self.paths.root(),
        )?;
        let _ = host.set_pane_title(&pane, STATUS_TITLE);
        host.send_keys(&pane, &self.hive_command("dashboard"), true)?;
        Ok(pane)
    }

    fn add_worker_panes(&self, lead_pane: &str, percent: u8) -> Result<Vec<(SlotId, String)>> {
        let host = self.registry.host();
        let slots: Vec<SlotId> = SlotId::all(self.workers).collect();
        let n = slots.len();
        let mut panes = Vec::with_capacity(n);
        let mut previous: Option<String> = None;

        for (i, slot) in slots.into_iter().enumerate() {
            let pane = match &previous {
                None => host.split_window(
                    lead_pane,
                    Orientation::Horizontal,
                    percent,
                    self.paths.root(),
                )?,
                // Each split hands the new pane an equal share of what is left.
                Some(prev) => {
                    let left = (n - i) as u32;
                    let share = (100 * left / (left + 1)) as u8;
                    host.split_window(prev, Orientation::Vertical, share, self.paths.root())?
                }
            };
            let _ = host.set_pane_title(&pane, &worker_title(slot));
            let tail = format!(
                "tail -n {} -F {}",
                WORKER_PANE_HISTORY,
                shell_escape(&self.paths.log_file(slot).display().to_string())
            );
            host.send_keys(&pane, &tail, true)?;
            previous = Some(pane.clone());
            panes.push((slot, pane));
        }
        Ok(panes)
    }

    /// Remove the status pane if the lead window has one, otherwise add it.
    pub fn toggle_status_pane(&self, lead_percent: u8) -> Result<PaneToggle> {
        let host = self.registry.host();
        let session = self.registry.lead_name();
        if !host.has_session(&session) {
            return Err(Error::Tmux(format!(
                "lead session '{}' is not running",
                session
            )));
        }
        let panes = host.list_panes(&session)?;
        if let Some(status) = panes.iter().find(|p| p.title == STATUS_TITLE) {
            host.kill_pane(&status.id)?;
            hlog!("Status pane removed from {}", session);
            return Ok(PaneToggle::Removed);
        }

        let lead = lead_pane(&panes)
            .ok_or_else(|| Error::Tmux(format!("session '{}' has no panes", session)))?;
        let side = 100 - clamp_lead_percent(lead_percent);
        self.add_status_pane(&lead.id, side)?;
        hlog!("Status pane added to {}", session);
        Ok(PaneToggle::Added)
    }
}

fn lead_pane(panes: &[PaneInfo]) -> Option<&PaneInfo> {
    panes
        .iter()
        .find(|p| p.title == LEAD_TITLE)
        .or_else(|| panes.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProjectIdentity;
    use crate::testing::FakeHost;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(workers: u8) -> (TempDir, Arc<FakeHost>, LayoutComposer) {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        let composer = LayoutComposer::new(
            SessionRegistry::new(host.clone(), ProjectIdentity::new("proj")),
            HivePaths::new(dir.path()),
            PathBuf::from("/usr/bin/hive"),
            Agent::default(),
            workers,
        );
        (dir, host, composer)
    }

    #[test]
    fn test_lead_percent_is_clamped() {
        assert_eq!(LayoutSpec::new(5, LayoutMode::Status).lead_percent(), 20);
        assert_eq!(LayoutSpec::new(95, LayoutMode::Status).lead_percent(), 80);
        assert_eq!(LayoutSpec::new(65, LayoutMode::Status).lead_percent(), 65);
    }

    #[test]
    fn test_status_layout() {
        let (_dir, host, composer) = setup(4);
        let layout = composer
            .compose(LayoutSpec::new(95, LayoutMode::Status))
            .unwrap();

        assert_eq!(layout.session, "hive-proj-lead");
        assert!(host
            .calls()
            .contains(&format!("split_window {} Horizontal 20", layout.lead_pane)));

        let titles: Vec<String> = host
            .panes("hive-proj-lead")
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["lead", "status"]);

        let keys = host.sent_keys();
        let status_pane = layout.status_pane.unwrap();
        assert!(keys
            .iter()
            .any(|(t, k)| *t == status_pane && k.ends_with("dashboard<Enter>")));
        assert!(keys
            .iter()
            .any(|(t, k)| *t == layout.lead_pane && k.ends_with("claude<Enter>")));
        assert!(host
            .options()
            .iter()
            .any(|(_, o, v)| o == "pane-border-status" && v == "top"));
        assert!(layout.bindings_installed > 0);
    }

    #[test]
    fn test_compose_survives_rejected_options_and_bindings() {
        let (_dir, host, composer) = setup(2);
        host.fail_options(true);
        host.reject_binding("Any");
        host.reject_binding("d");

        let layout = composer.compose(LayoutSpec::default()).unwrap();
        assert!(layout.status_pane.is_some());
        assert!(host.options().is_empty());
        // Prefix, 1, 2, 0, l, t, Escape.
        assert_eq!(layout.bindings_installed, 7);
        assert_eq!(host.bindings().len(), 7);
    }

    #[test]
    fn test_compose_refuses_to_rebuild_own_session() {
        let (_dir, host, composer) = setup(2);
        composer.compose(LayoutSpec::default()).unwrap();
        host.set_current_session("hive-proj-lead");

        assert!(composer.compose(LayoutSpec::default()).is_err());
        assert_eq!(host.count("kill_session"), 0);
        assert_eq!(host.sessions(), vec!["hive-proj-lead".to_string()]);

        // Another client may still rebuild it.
        host.set_current_session("elsewhere");
        assert!(composer.compose(LayoutSpec::default()).is_ok());
        assert_eq!(host.count("kill_session hive-proj-lead"), 1);
    }

    #[test]
    fn test_compose_rebuilds_existing_session() {
        let (_dir, host, composer) = setup(2);
        composer.compose(LayoutSpec::default()).unwrap();
        composer.compose(LayoutSpec::default()).unwrap();
        assert_eq!(host.count("kill_session hive-proj-lead"), 1);
        assert_eq!(host.count("create_session hive-proj-lead"), 2);
        assert_eq!(host.panes("hive-proj-lead").len(), 2);
    }

    #[test]
    fn test_workers_layout_has_one_pane_per_worker() {
        let (_dir, host, composer) = setup(3);
        let layout = composer
            .compose(LayoutSpec::new(50, LayoutMode::Workers))
            .unwrap();
        assert_eq!(layout.worker_panes.len(), 3);
        let titles: Vec<String> = host
            .panes("hive-proj-lead")
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["lead", "worker-1", "worker-2", "worker-3"]);
        assert!(host
            .sent_keys()
            .iter()
            .any(|(_, k)| k.contains("tail -n 200 -F") && k.contains("worker-2.log")));
    }

    #[test]
    fn test_lead_only_layout() {
        let (_dir, host, composer) = setup(4);
        let layout = composer
            .compose(LayoutSpec::new(60, LayoutMode::LeadOnly))
            .unwrap();
        assert!(layout.status_pane.is_none());
        assert_eq!(host.count("split_window"), 0);
    }

    #[test]
    fn test_toggle_status_pane() {
        let (_dir, host, composer) = setup(4);
        assert!(composer.toggle_status_pane(60).is_err());

        composer.compose(LayoutSpec::default()).unwrap();
        assert_eq!(composer.toggle_status_pane(60).unwrap(), PaneToggle::Removed);
        assert_eq!(host.panes("hive-proj-lead").len(), 1);
        assert_eq!(composer.toggle_status_pane(60).unwrap(), PaneToggle::Added);
        assert_eq!(host.panes("hive-proj-lead").len(), 2);
    }
}
