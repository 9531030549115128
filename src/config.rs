use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Raw keys as they come out of `bulletind.toml` and `BULLETIND_*`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    log: Option<String>,
    log_format: Option<String>,
    workspace: Option<String>,
}

/// Process settings: optional `bulletind.{toml,json,..}` file, then
/// `BULLETIND_LOG`, `BULLETIND_LOG_FORMAT`, `BULLETIND_WORKSPACE`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub log_filter: String,
    pub log_format: LogFormat,
    pub workspace: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawSettings::default())
    }
}

impl DaemonConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Environment::with_prefix("BULLETIND"))
    }

    fn load_from(env: Environment) -> Result<Self, ConfigError> {
        let raw: RawSettings = Config::builder()
            .add_source(File::with_name("bulletind").required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawSettings) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            log_filter: non_empty(raw.log).unwrap_or_else(|| "info".to_string()),
            log_format: non_empty(raw.log_format)
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(LogFormat::Text),
            workspace: non_empty(raw.workspace).map(PathBuf::from),
        }
    }
}
