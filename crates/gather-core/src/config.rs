use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for the heartbeat and staleness windows.
pub const MAX_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables of the chat core. Every field has a default, so an empty TOML
/// document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatConfig {
    /// Most recent messages kept in a room snapshot.
    #[serde(default = "default_message_window")]
    pub message_window: usize,
    /// Raw presence records fetched per room before staleness filtering.
    #[serde(default = "default_presence_limit")]
    pub presence_limit: usize,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// A presence record at least this old is no longer online.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Read-receipt writes issued per message snapshot.
    #[serde(default = "default_read_receipt_batch")]
    pub read_receipt_batch: usize,
    /// Maximum message text length in bytes.
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
    /// Snowflake worker id for client-generated message ids.
    #[serde(default)]
    pub worker_id: u16,
}

fn default_message_window() -> usize {
    80
}

fn default_presence_limit() -> usize {
    25
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> u64 {
    70
}

fn default_read_receipt_batch() -> usize {
    15
}

fn default_max_text_len() -> usize {
    4000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            message_window: default_message_window(),
            presence_limit: default_presence_limit(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            read_receipt_batch: default_read_receipt_batch(),
            max_text_len: default_max_text_len(),
            worker_id: 0,
        }
    }
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(raw: Option<String>) -> Option<T> {
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}

impl ChatConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ChatConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    /// Environment overrides are applied on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            tracing::info!(path = %path.display(), "chat config not found, using defaults");
            ChatConfig::default()
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `GATHER_*` overrides read through `lookup`. Unparseable or
    /// zero values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_positive(lookup("GATHER_MESSAGE_WINDOW")) {
            self.message_window = v;
        }
        if let Some(v) = parse_positive(lookup("GATHER_PRESENCE_LIMIT")) {
            self.presence_limit = v;
        }
        if let Some(v) = parse_positive(lookup("GATHER_HEARTBEAT_INTERVAL_SECS")) {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = parse_positive(lookup("GATHER_STALE_AFTER_SECS")) {
            self.stale_after_secs = v;
        }
        if let Some(v) = parse_positive(lookup("GATHER_READ_RECEIPT_BATCH")) {
            self.read_receipt_batch = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("message_window", self.message_window),
            ("presence_limit", self.presence_limit),
            ("read_receipt_batch", self.read_receipt_batch),
            ("max_text_len", self.max_text_len),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "heartbeat_interval_secs",
                reason: "must be greater than zero".into(),
            });
        }
        let windows = [
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("stale_after_secs", self.stale_after_secs),
        ];
        for (field, value) in windows {
            if value > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must not exceed {MAX_WINDOW_SECS}"),
                });
            }
        }
        if self.stale_after_secs <= self.heartbeat_interval_secs {
            return Err(ConfigError::Invalid {
                field: "stale_after_secs",
                reason: format!(
                    "must exceed heartbeat_interval_secs ({})",
                    self.heartbeat_interval_secs
                ),
            });
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        i64::try_from(self.stale_after_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}
