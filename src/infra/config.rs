use crate::domain::GroupBy;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimelineConfig {
    pub base_url: String,
    pub group_by: GroupBy,
    pub include_deleted: bool,
    pub request_timeout: Duration,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            group_by: GroupBy::Project,
            include_deleted: false,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers in place.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub group_by: Option<GroupBy>,
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    base_url: Option<String>,
    group_by: Option<GroupBy>,
    include_deleted: Option<bool>,
    request_timeout_secs: Option<u64>,
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("SESSIONLINE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("sessionline").join("config.json"))
}

/// Defaults, then the config file, then the environment, then the command line.
pub fn load_config(overrides: &ConfigOverrides) -> Result<TimelineConfig, ConfigError> {
    let mut config = TimelineConfig::default();
    if let Some(path) = resolve_config_path() {
        apply_file(&mut config, &path)?;
    }
    apply_env(&mut config, |name| std::env::var(name).ok())?;
    apply_overrides(&mut config, overrides);
    Ok(config)
}

fn apply_file(config: &mut TimelineConfig, path: &Path) -> Result<(), ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: error,
            });
        }
    };

    let file: ConfigFile = serde_json::from_str(&raw).map_err(|error| ConfigError::Parse {
        path: path.display().to_string(),
        source: error,
    })?;
    if let Some(base_url) = file.base_url.filter(|url| !url.trim().is_empty()) {
        config.base_url = base_url;
    }
    if let Some(group_by) = file.group_by {
        config.group_by = group_by;
    }
    if let Some(include_deleted) = file.include_deleted {
        config.include_deleted = include_deleted;
    }
    if let Some(secs) = file.request_timeout_secs.filter(|secs| *secs > 0) {
        config.request_timeout = Duration::from_secs(secs);
    }
    Ok(())
}

fn apply_env(
    config: &mut TimelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(url) = lookup("SESSIONLINE_URL").filter(|url| !url.trim().is_empty()) {
        config.base_url = url.trim().to_string();
    }
    if let Some(value) = lookup("SESSIONLINE_GROUP_BY") {
        config.group_by = GroupBy::parse(&value).ok_or(ConfigError::InvalidEnv {
            name: "SESSIONLINE_GROUP_BY",
            value,
        })?;
    }
    Ok(())
}

fn apply_overrides(config: &mut TimelineConfig, overrides: &ConfigOverrides) {
    if let Some(base_url) = &overrides.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(group_by) = overrides.group_by {
        config.group_by = group_by;
    }
    if let Some(include_deleted) = overrides.include_deleted {
        config.include_deleted = include_deleted;
    }
}
