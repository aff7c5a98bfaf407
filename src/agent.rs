use crate::util::shell_escape;

pub const DEFAULT_AGENT: &str = "claude";

/// The hosted agent process. Hive only knows how to launch it and how to ask
/// it to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    base_command: Vec<String>,
}

impl Agent {
    pub fn new(command: &str) -> Self {
        let base_command: Vec<String> = command.split_whitespace().map(String::from).collect();
        if base_command.is_empty() {
            return Self::default();
        }
        Self { base_command }
    }

    pub fn binary(&self) -> &str {
        self.base_command
            .first()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_AGENT)
    }

    pub fn command(&self, prompt: Option<&str>) -> Vec<String> {
        let mut cmd = self.base_command.clone();
        if let Some(p) = prompt {
            cmd.push(p.to_string());
        }
        cmd
    }

    /// A single shell line that exports `env` and runs the agent.
    pub fn launch_line(&self, env: &[(&str, String)], prompt: Option<&str>) -> String {
        let mut parts: Vec<String> = env
            .iter()
            .map(|(key, value)| format!("{}={}", key, shell_escape(value)))
            .collect();
        parts.extend(self.command(prompt).iter().map(|arg| shell_escape(arg)));
        parts.join(" ")
    }

    /// Text typed into the agent's input to request a graceful exit.
    pub fn exit_sequence(&self) -> &'static str {
        "/exit"
    }

    pub fn is_available(&self) -> bool {
        which::which(self.binary()).is_ok()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            base_command: vec![DEFAULT_AGENT.to_string()],
        }
    }
}
