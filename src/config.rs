//! Layered configuration: `<project>/.hive/config.json` over the global file.
//!
//! Precedence is per key. Stored documents are JSON objects; keys hive does
//! not know are carried through rewrites untouched.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::paths::{global_config_path, HivePaths};
use crate::util::write_atomic;
use crate::{hlog_debug, hlog_warn, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Theme,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 1] = [ConfigKey::Theme];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Theme => "theme",
        }
    }

    pub fn default_value(&self) -> String {
        match self {
            ConfigKey::Theme => Theme::default().to_string(),
        }
    }

    /// Check `raw` and return it in canonical form.
    pub fn validate(&self, raw: &str) -> Result<String> {
        match self {
            ConfigKey::Theme => raw.parse::<Theme>().map(|t| t.to_string()),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConfigKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "unknown key '{}' (known keys: {})",
                    s,
                    ConfigKey::ALL.map(|k| k.as_str()).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        })
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err(Error::InvalidConfig(format!(
                "invalid theme '{}' (expected dark or light)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Local,
    Global,
}

/// Where an effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Local,
    Global,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigSource::Local => "local",
            ConfigSource::Global => "global",
            ConfigSource::Default => "default",
        })
    }
}

/// One config document on disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl ConfigFile {
    /// Load for rewriting. A missing file is empty; a malformed one is an
    /// error so it is never silently replaced.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = match fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(Error::InvalidConfig(format!(
                        "{} is not a JSON object",
                        path.display()
                    )))
                }
                Err(e) => {
                    return Err(Error::InvalidConfig(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    /// Load for reading. Anything unreadable reads as empty.
    fn load_lenient(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            hlog_warn!("Ignoring config {}: {}", path.display(), e);
            Self {
                path: path.to_path_buf(),
                doc: Map::new(),
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.doc.get(key.as_str()).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: ConfigKey, value: String) {
        self.doc.insert(key.as_str().to_string(), Value::String(value));
    }

    pub fn unset(&mut self, key: ConfigKey) -> bool {
        self.doc.remove(key.as_str()).is_some()
    }

    pub fn save(&self) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(&Value::Object(self.doc.clone()))?;
        json.push(b'\n');
        write_atomic(&self.path, &json)?;
        hlog_debug!("Config saved to {}", self.path.display());
        Ok(())
    }
}

/// Resolved settings, built once per process and passed to whatever needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HiveConfig {
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub value: String,
    pub source: ConfigSource,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    local: PathBuf,
    global: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(local: PathBuf, global: Option<PathBuf>) -> Self {
        Self { local, global }
    }

    pub fn for_project(paths: &HivePaths) -> Self {
        Self::new(paths.local_config(), global_config_path())
    }

    fn scope_path(&self, scope: ConfigScope) -> Result<&Path> {
        match scope {
            ConfigScope::Local => Ok(&self.local),
            ConfigScope::Global => self.global.as_deref().ok_or(Error::NoHomeDir),
        }
    }

    /// Effective value of `key`: local, then global, then the built-in default.
    pub fn get(&self, key: ConfigKey) -> ConfigEntry {
        let layers = [
            (Some(self.local.as_path()), ConfigSource::Local),
            (self.global.as_deref(), ConfigSource::Global),
        ];
        for (path, source) in layers {
            let Some(path) = path else { continue };
            let file = ConfigFile::load_lenient(path);
            let Some(raw) = file.get(key) else { continue };
            match key.validate(raw) {
                Ok(value) => return ConfigEntry { key, value, source },
                Err(e) => hlog_warn!("Skipping {} in {}: {}", key, path.display(), e),
            }
        }
        ConfigEntry {
            key,
            value: key.default_value(),
            source: ConfigSource::Default,
        }
    }

    pub fn list(&self) -> Vec<ConfigEntry> {
        ConfigKey::ALL.into_iter().map(|k| self.get(k)).collect()
    }

    /// Validate then write. Nothing touches disk if `raw` is invalid.
    pub fn set(&self, scope: ConfigScope, key: ConfigKey, raw: &str) -> Result<String> {
        let value = key.validate(raw)?;
        let mut file = ConfigFile::load(self.scope_path(scope)?)?;
        file.set(key, value.clone());
        file.save()?;
        Ok(value)
    }

    /// Remove `key` from one scope. Returns false when it was not set there.
    pub fn unset(&self, scope: ConfigScope, key: ConfigKey) -> Result<bool> {
        let path = self.scope_path(scope)?;
        if !path.exists() {
            return Ok(false);
        }
        let mut file = ConfigFile::load(path)?;
        let removed = file.unset(key);
        if removed {
            file.save()?;
        }
        Ok(removed)
    }

    pub fn resolve(&self) -> HiveConfig {
        let theme = self
            .get(ConfigKey::Theme)
            .value
            .parse()
            .unwrap_or_default();
        HiveConfig { theme }
    }

    /// Flip the effective theme and store it locally.
    pub fn toggle_theme(&self) -> Result<Theme> {
        let next = self.resolve().theme.toggled();
        self.set(ConfigScope::Local, ConfigKey::Theme, &next.to_string())?;
        Ok(next)
    }
}
