// Layered configuration: flags > environment > config file > defaults

use crate::entry::Zone;
use crate::store::{DEFAULT_BUSY_TIMEOUT, validate_queue_name};
use eyre::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Queue used when none is named
pub const DEFAULT_QUEUE: &str = "default";

/// Contents of `config.yaml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub database: Option<PathBuf>,
    pub queue: Option<String>,
    pub timezone: Option<Zone>,
    pub quiet: Option<bool>,
    pub busy_timeout_ms: Option<u64>,
}

impl ConfigFile {
    /// `<config dir>/taskq/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskq").join("config.yaml"))
    }

    /// Load a config file
    ///
    /// An explicitly named file must exist. The default location may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        debug!(path = %path.display(), "Loading config");
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub queue: Option<String>,
    pub timezone: Option<Zone>,
    pub quiet: bool,
}

/// Resolved, immutable settings threaded through every command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub queue: String,
    pub zone: Zone,
    pub quiet: bool,
    pub busy_timeout: Duration,
}

impl Settings {
    pub fn resolve(overrides: Overrides, file: ConfigFile) -> Result<Self> {
        let queue = overrides
            .queue
            .or(file.queue)
            .unwrap_or_else(|| DEFAULT_QUEUE.to_string());
        validate_queue_name(&queue)?;

        Ok(Self {
            database: overrides.database.or(file.database).unwrap_or_else(default_database),
            queue,
            zone: overrides.timezone.or(file.timezone).unwrap_or_default(),
            quiet: overrides.quiet || file.quiet.unwrap_or(false),
            busy_timeout: file
                .busy_timeout_ms
                .map_or(DEFAULT_BUSY_TIMEOUT, Duration::from_millis),
        })
    }
}

/// `<data dir>/taskq/taskq.db`, or `./taskq.db` without a data dir
pub fn default_database() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("taskq"))
        .unwrap_or_default()
        .join("taskq.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_file() {
        let file = ConfigFile::parse(
            "database: /tmp/q.db\nqueue: jobs\ntimezone: utc\nquiet: true\nbusy_timeout_ms: 250\n",
        )
        .unwrap();
        assert_eq!(file.database, Some(PathBuf::from("/tmp/q.db")));
        assert_eq!(file.queue.as_deref(), Some("jobs"));
        assert_eq!(file.timezone, Some(Zone::Utc));
        assert_eq!(file.quiet, Some(true));
        assert_eq!(file.busy_timeout_ms, Some(250));
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        assert_eq!(ConfigFile::parse("").unwrap(), ConfigFile::default());
        assert!(ConfigFile::parse("colour: blue\n").is_err());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        assert!(ConfigFile::load(Some(temp.path().join("missing.yaml").as_path())).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "queue: nightly\n").unwrap();
        let file = ConfigFile::load(Some(path.as_path())).unwrap();
        assert_eq!(file.queue.as_deref(), Some("nightly"));
    }

    #[test]
    fn test_overrides_beat_file() {
        let file = ConfigFile {
            database: Some(PathBuf::from("file.db")),
            queue: Some("fromfile".to_string()),
            timezone: Some(Zone::Utc),
            quiet: None,
            busy_timeout_ms: Some(100),
        };
        let overrides = Overrides {
            database: Some(PathBuf::from("flag.db")),
            queue: Some("fromflag".to_string()),
            timezone: Some(Zone::Local),
            quiet: true,
        };
        let settings = Settings::resolve(overrides, file).unwrap();
        assert_eq!(settings.database, PathBuf::from("flag.db"));
        assert_eq!(settings.queue, "fromflag");
        assert_eq!(settings.zone, Zone::Local);
        assert!(settings.quiet);
        assert_eq!(settings.busy_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(Overrides::default(), ConfigFile::default()).unwrap();
        assert_eq!(settings.queue, DEFAULT_QUEUE);
        assert_eq!(settings.zone, Zone::Local);
        assert!(!settings.quiet);
        assert_eq!(settings.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert!(settings.database.ends_with("taskq.db"));
    }

    #[test]
    fn test_invalid_queue_rejected() {
        let overrides = Overrides {
            queue: Some("no spaces".to_string()),
            ..Overrides::default()
        };
        assert!(Settings::resolve(overrides, ConfigFile::default()).is_err());
    }
}
