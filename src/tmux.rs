//! Session host contract and its tmux implementation.

use std::path::Path;
use std::process::Command;

use crate::util::shell_escape;
use crate::{hlog_debug, hlog_trace, hlog_warn, Error, Result};

/// Direction of a pane split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// New pane to the right (`split-window -h`).
    Horizontal,
    /// New pane below (`split-window -v`).
    Vertical,
}

/// Initial size of a detached session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub id: String,
    pub title: String,
}

/// The external terminal multiplexer that owns worker processes.
///
/// Every call is fallible. Callers decide whether a failure matters;
/// interactive options in particular are set best-effort.
pub trait SessionHost: Send + Sync {
    fn is_available(&self) -> bool;
    fn has_session(&self, name: &str) -> bool;
    fn create_session(&self, name: &str, cwd: &Path, geometry: Option<Geometry>) -> Result<()>;
    fn kill_session(&self, name: &str) -> Result<()>;
    /// Split `target` and return the new pane id.
    fn split_window(
        &self,
        target: &str,
        orientation: Orientation,
        percent: u8,
        cwd: &Path,
    ) -> Result<String>;
    fn kill_pane(&self, pane: &str) -> Result<()>;
    fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>>;
    fn send_keys(&self, target: &str, keys: &str, enter: bool) -> Result<()>;
    fn pipe_output(&self, target: &str, path: &Path) -> Result<()>;
    /// `target: None` sets a global option.
    fn set_option(&self, target: Option<&str>, option: &str, value: &str) -> Result<()>;
    fn bind_key(&self, table: &str, key: &str, command: &[String]) -> Result<()>;
    fn set_pane_title(&self, pane: &str, title: &str) -> Result<()>;
    fn select_pane(&self, pane: &str) -> Result<()>;
    /// Hand the terminal to the session; returns once the operator detaches.
    fn attach(&self, name: &str) -> Result<()>;
    /// Move the current client to another session (inside tmux only).
    fn switch_client(&self, name: &str) -> Result<()>;
    /// Session of the client this process runs in, if it runs inside the host.
    fn current_session(&self) -> Option<String>;

    /// Fail with [`Error::HostUnavailable`] unless the host can be run.
    fn require(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::HostUnavailable)
        }
    }
}

pub struct Tmux;

impl Tmux {
    /// Check if we're running inside a tmux session
    pub fn inside_tmux() -> bool {
        std::env::var("TMUX").is_ok()
    }

    pub fn version() -> Result<String> {
        let output = Command::new("tmux").arg("-V").output()?;
        if !output.status.success() {
            return Err(Error::Tmux("Failed to get tmux version".to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run(args: &[&str]) -> Result<String> {
        hlog_trace!("tmux {}", args.join(" "));
        let output = Command::new("tmux").args(args).output()?;
        if !output.status.success() {
            return Err(Error::Tmux(format!(
                "`tmux {}` failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Exact-match session target (tmux otherwise matches by prefix).
pub fn exact(name: &str) -> String {
    format!("={}", name)
}

/// The active pane of a session, matched exactly.
pub fn pane_target(session: &str) -> String {
    format!("={}:", session)
}

impl SessionHost for Tmux {
    fn is_available(&self) -> bool {
        if which::which("tmux").is_err() {
            return false;
        }
        match Self::version() {
            Ok(version) => {
                hlog_debug!("Session host: {}", version);
                true
            }
            Err(e) => {
                hlog_warn!("tmux found but not runnable: {}", e);
                false
            }
        }
    }

    fn has_session(&self, name: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", &exact(name)])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn create_session(&self, name: &str, cwd: &Path, geometry: Option<Geometry>) -> Result<()> {
        hlog_debug!(
            "Tmux::create_session name={} cwd={} geometry={:?}",
            name,
            cwd.display(),
            geometry
        );
        let cwd = cwd.display().to_string();
        let size = geometry.map(|g| (g.width.to_string(), g.height.to_string()));
        let mut args = vec!["new-session", "-d", "-s", name, "-c", &cwd];
        if let Some((width, height)) = &size {
            args.extend(["-x", width.as_str(), "-y", height.as_str()]);
        }
        Self::run(&args).map_err(|e| {
            hlog_warn!("tmux create_session failed: {}", e);
            e
        })?;
        hlog_debug!("Tmux session created: {}", name);
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        hlog_debug!("Tmux::kill_session name={}", name);
        match Self::run(&["kill-session", "-t", &exact(name)]) {
            Ok(_) => {
                hlog_debug!("Tmux session killed: {}", name);
                Ok(())
            }
            Err(Error::Tmux(msg))
                if msg.contains("can't find session")
                    || msg.contains("session not found")
                    || msg.contains("no server running") =>
            {
                hlog_debug!("Tmux session '{}' not found (already dead?)", name);
                Ok(())
            }
            Err(e) => {
                hlog_warn!("Failed to kill tmux session '{}': {}", name, e);
                Err(e)
            }
        }
    }

    fn split_window(
        &self,
        target: &str,
        orientation: Orientation,
        percent: u8,
        cwd: &Path,
    ) -> Result<String> {
        hlog_debug!(
            "Tmux::split_window target={} orientation={:?} percent={}",
            target,
            orientation,
            percent
        );
        let flag = match orientation {
            Orientation::Horizontal => "-h",
            Orientation::Vertical => "-v",
        };
        let size = format!("{}%", percent);
        let cwd = cwd.display().to_string();
        let out = Self::run(&[
            "split-window",
            "-d",
            "-t",
            target,
            flag,
            "-l",
            &size,
            "-c",
            &cwd,
            "-P",
            "-F",
            "#{pane_id}",
        ])?;
        Ok(out.trim().to_string())
    }

    fn kill_pane(&self, pane: &str) -> Result<()> {
        hlog_debug!("Tmux::kill_pane pane={}", pane);
        Self::run(&["kill-pane", "-t", pane]).map(|_| ())
    }

    fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>> {
        let target = format!("{}:", exact(session));
        let out = Self::run(&[
            "list-panes",
            "-t",
            &target,
            "-F",
            "#{pane_id}\t#{pane_title}",
        ])?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (id, title) = line.split_once('\t')?;
                Some(PaneInfo {
                    id: id.to_string(),
                    title: title.to_string(),
                })
            })
            .collect())
    }

    fn send_keys(&self, target: &str, keys: &str, enter: bool) -> Result<()> {
        hlog_debug!(
            "Tmux::send_keys target={} keys={} enter={}",
            target,
            keys,
            enter
        );
        let mut args = vec!["send-keys", "-t", target, keys];
        if enter {
            args.push("Enter");
        }
        Self::run(&args).map(|_| ()).map_err(|e| {
            hlog_warn!("Failed to send keys to '{}': {}", target, e);
            e
        })
    }

    fn pipe_output(&self, target: &str, path: &Path) -> Result<()> {
        hlog_debug!("Tmux::pipe_output target={} path={}", target, path.display());
        let sink = format!("cat >> {}", shell_escape(&path.display().to_string()));
        Self::run(&["pipe-pane", "-o", "-t", target, &sink]).map(|_| ())
    }

    fn set_option(&self, target: Option<&str>, option: &str, value: &str) -> Result<()> {
        hlog_trace!(
            "Tmux::set_option target={:?} {}={}",
            target,
            option,
            value
        );
        match target {
            Some(t) => Self::run(&["set-option", "-t", t, option, value]),
            None => Self::run(&["set-option", "-g", option, value]),
        }
        .map(|_| ())
    }

    fn bind_key(&self, table: &str, key: &str, command: &[String]) -> Result<()> {
        hlog_trace!("Tmux::bind_key table={} key={} cmd={:?}", table, key, command);
        let mut args = vec!["bind-key", "-T", table, key];
        args.extend(command.iter().map(String::as_str));
        Self::run(&args).map(|_| ())
    }

    fn set_pane_title(&self, pane: &str, title: &str) -> Result<()> {
        Self::run(&["select-pane", "-t", pane, "-T", title]).map(|_| ())
    }

    fn select_pane(&self, pane: &str) -> Result<()> {
        Self::run(&["select-pane", "-t", pane]).map(|_| ())
    }

    fn attach(&self, name: &str) -> Result<()> {
        hlog_debug!("Tmux::attach name={}", name);
        let status = if Self::inside_tmux() {
            hlog_debug!("Attaching via popup (inside tmux)");
            let inner = format!("TMUX= tmux attach-session -t {}", shell_escape(&exact(name)));
            Command::new("tmux")
                .args(["display-popup", "-E", "-w", "95%", "-h", "95%", &inner])
                .status()?
        } else {
            hlog_debug!("Attaching directly (outside tmux)");
            Command::new("tmux")
                .args(["attach-session", "-t", &exact(name)])
                .status()?
        };
        if !status.success() {
            hlog_warn!("Failed to attach to session '{}'", name);
            return Err(Error::Tmux(format!(
                "Failed to attach to session '{}'",
                name
            )));
        }
        hlog_debug!("Detached from session: {}", name);
        Ok(())
    }

    fn switch_client(&self, name: &str) -> Result<()> {
        hlog_debug!("Tmux::switch_client name={}", name);
        Self::run(&["switch-client", "-t", &exact(name)]).map(|_| ())
    }

    fn current_session(&self) -> Option<String> {
        if !Self::inside_tmux() {
            return None;
        }
        Self::run(&["display-message", "-p", "#{session_name}"])
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_target() {
        assert_eq!(exact("hive-p-worker-1"), "=hive-p-worker-1");
        assert_eq!(pane_target("hive-p-lead"), "=hive-p-lead:");
    }

    #[test]
    fn test_require_reports_missing_host() {
        use crate::testing::FakeHost;
        assert!(FakeHost::new().require().is_ok());
        assert!(matches!(
            FakeHost::unavailable().require(),
            Err(Error::HostUnavailable)
        ));
    }

    #[test]
    fn test_missing_session_is_not_running() {
        // Whether or not tmux is installed, an unknown name must read as absent.
        assert!(!Tmux.has_session("hive-nonexistent-session-12345"));
    }
}
