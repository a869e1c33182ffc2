// ABOUTME: Configuration for the ttirc master supervisor.
// ABOUTME: Loaded from a TOML file per settings node, with sensible defaults.

use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which worker variant runs each connection session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Session handler runs as a task inside the master process
    Native,
    /// Session handler runs as a separately launched process
    #[default]
    External,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Native => f.write_str("native"),
            WorkerKind::External => f.write_str("external"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database shared with the web front-end (e.g. "~/.local/share/ttirc/ttirc.db")
    pub database: String,

    /// Worker variant used for new sessions
    #[serde(default)]
    pub worker: WorkerKind,

    /// Program launched per connection by the external worker
    #[serde(default = "default_session_command")]
    pub session_command: String,

    /// Arguments for `session_command`; `{id}` is replaced with the connection id
    #[serde(default = "default_session_args")]
    pub session_args: Vec<String>,

    /// Pause between reconciliation ticks
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    /// How recent a client heartbeat must be for a non-permanent connection
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,

    /// How long shutdown waits for workers before killing them
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Upper bound on the freshness window (one year), keeping `now - window` in range.
const MAX_FRESHNESS_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

fn default_session_command() -> String {
    "ttirc-session".to_string()
}

fn default_session_args() -> Vec<String> {
    vec!["--connection".to_string(), "{id}".to_string()]
}

fn default_idle_interval_secs() -> u64 {
    5
}

fn default_freshness_window_secs() -> u64 {
    300
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "~/.local/share/ttirc/ttirc.db".to_string(),
            worker: WorkerKind::default(),
            session_command: default_session_command(),
            session_args: default_session_args(),
            idle_interval_secs: default_idle_interval_secs(),
            freshness_window_secs: default_freshness_window_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            anyhow::bail!("database must not be empty");
        }
        if self.idle_interval_secs == 0 {
            anyhow::bail!("idle_interval_secs must be at least 1");
        }
        if self.freshness_window_secs > MAX_FRESHNESS_WINDOW_SECS {
            anyhow::bail!(
                "freshness_window_secs must be at most {}",
                MAX_FRESHNESS_WINDOW_SECS
            );
        }
        if self.worker == WorkerKind::External && self.session_command.trim().is_empty() {
            anyhow::bail!("session_command is required for the external worker");
        }
        Ok(())
    }

    /// Get the config file path for a settings node.
    ///
    /// `None` gives `~/.config/ttirc/master.toml`; `Some("staging")` gives
    /// `~/.config/ttirc/staging/master.toml`.
    pub fn default_path(node: Option<&str>) -> Result<PathBuf> {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("ttirc");

        match node {
            None => Ok(config_dir.join("master.toml")),
            Some(node) => {
                if node.is_empty() || node.contains(['/', '\\']) || node == "." || node == ".." {
                    anyhow::bail!("Invalid settings node name: {:?}", node);
                }
                Ok(config_dir.join(node).join("master.toml"))
            }
        }
    }

    /// Expand ~ in the database path
    pub fn database_path(&self) -> PathBuf {
        shellexpand::tilde(&self.database).into_owned().into()
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn freshness_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.freshness_window_secs.min(MAX_FRESHNESS_WINDOW_SECS) as i64)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            database = "/var/lib/ttirc/ttirc.db"
            worker = "native"
            idle_interval_secs = 2
        "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database, "/var/lib/ttirc/ttirc.db");
        assert_eq!(config.worker, WorkerKind::Native);
        assert_eq!(config.idle_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"database = "ttirc.db""#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.worker, WorkerKind::External);
        assert_eq!(config.session_command, "ttirc-session");
        assert_eq!(config.session_args, vec!["--connection", "{id}"]);
        assert_eq!(config.idle_interval_secs, 5);
        assert_eq!(config.freshness_window(), TimeDelta::minutes(5));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("master.toml");

        let config = Config {
            database: "/tmp/ttirc.db".to_string(),
            worker: WorkerKind::Native,
            shutdown_timeout_secs: 10,
            ..Config::default()
        };

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.database, config.database);
        assert_eq!(loaded.worker, WorkerKind::Native);
        assert_eq!(loaded.shutdown_timeout_secs, 10);
    }

    #[test]
    fn test_zero_idle_interval_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            database = "ttirc.db"
            idle_interval_secs = 0
        "#
        )
        .unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("idle_interval_secs"));
    }

    #[test]
    fn test_external_worker_requires_command() {
        let config = Config {
            session_command: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let native = Config {
            worker: WorkerKind::Native,
            ..config
        };
        assert!(native.validate().is_ok());
    }

    #[test]
    fn test_oversized_freshness_window_rejected() {
        let config = Config {
            freshness_window_secs: u64::MAX,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.freshness_window(), TimeDelta::days(365));
    }

    #[test]
    fn test_database_path_expansion() {
        let config = Config::default();
        let expanded = config.database_path();

        assert!(!expanded.to_string_lossy().contains('~'));
        let home = std::env::var("HOME").unwrap();
        assert!(expanded.to_string_lossy().starts_with(&home));
    }

    #[test]
    fn test_default_path_for_node() {
        let plain = Config::default_path(None).unwrap();
        let node = Config::default_path(Some("staging")).unwrap();

        assert!(plain.ends_with("ttirc/master.toml"));
        assert!(node.ends_with("ttirc/staging/master.toml"));
    }

    #[test]
    fn test_default_path_rejects_path_like_nodes() {
        assert!(Config::default_path(Some("../etc")).is_err());
        assert!(Config::default_path(Some("")).is_err());
        assert!(Config::default_path(Some("..")).is_err());
    }

    #[test]
    fn test_worker_kind_display() {
        assert_eq!(WorkerKind::Native.to_string(), "native");
        assert_eq!(WorkerKind::External.to_string(), "external");
    }
}
