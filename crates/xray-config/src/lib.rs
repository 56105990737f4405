//! Configuration for the xray memory governor host.
//!
//! ```toml
//! [logging]
//! level = "info"
//! json = false
//! stderr = true
//! file = "/tmp/xray.log"
//!
//! [memory]
//! limit = "32MiB"                 # clamped to the 50 MiB hard ceiling
//! collection_target_percent = 20
//! monitor = true
//! monitor_interval_secs = 30
//! ```

mod logging;

pub use logging::{init_tracing, LoggingConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use xray_memory::{
    MemoryGovernor, MonitorConfig, AGGRESSIVE_COLLECTION_PERCENT, HARD_CEILING_BYTES,
    MEMORY_CHECK_INTERVAL,
};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "XRAY_CONFIG";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "xray.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a snippet of the input; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

/// A byte size which accepts raw byte counts or human-friendly strings
/// (`"32MiB"`, `"64 MB"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Human(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bytes(value) => Ok(ByteSize(value)),
            Repr::Human(value) => xray_memory::parse_byte_size(&value)
                .map(ByteSize)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Memory governor settings. The hard ceiling itself is not configurable;
/// `limit` can only lower the ceiling configured on the runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Requested runtime ceiling; clamped to the hard ceiling.
    #[serde(default)]
    pub limit: Option<ByteSize>,

    /// Collection target applied together with `limit` (not clamped).
    #[serde(default)]
    pub collection_target_percent: Option<i32>,

    /// Run the background monitor.
    #[serde(default = "MemoryConfig::default_monitor")]
    pub monitor: bool,

    #[serde(default = "MemoryConfig::default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

impl MemoryConfig {
    fn default_monitor() -> bool {
        true
    }

    fn default_monitor_interval_secs() -> u64 {
        MEMORY_CHECK_INTERVAL.as_secs()
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.monitor_interval_secs),
        }
    }

    /// Applies the configured overrides through [`MemoryGovernor::set_policy`].
    /// Does nothing when neither override is set.
    pub fn apply(&self, governor: &MemoryGovernor) {
        if self.limit.is_none() && self.collection_target_percent.is_none() {
            return;
        }
        let limit = self.limit.map_or(HARD_CEILING_BYTES, |limit| limit.0);
        let target = self
            .collection_target_percent
            .unwrap_or(AGGRESSIVE_COLLECTION_PERCENT);
        if limit > HARD_CEILING_BYTES {
            tracing::warn!(
                target: "xray.config",
                limit,
                hard_ceiling = HARD_CEILING_BYTES,
                "configured memory limit exceeds the hard ceiling and will be clamped"
            );
        }
        governor.set_policy(limit, target);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "memory.monitor_interval_secs must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit: None,
            collection_target_percent: None,
            monitor: Self::default_monitor(),
            monitor_interval_secs: Self::default_monitor_interval_secs(),
        }
    }
}

/// Top-level configuration loaded from TOML.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XrayConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

impl XrayConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: XrayConfig = toml::from_str(text)?;
        config.memory.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    /// Loads `explicit` if given, else `$XRAY_CONFIG`, else `./xray.toml`
    /// when it exists. Falls back to defaults when there is no file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match discover_config_path(explicit) {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolves the config file path. An explicit path or `$XRAY_CONFIG` is
/// returned even when the file is missing so the caller gets a read error.
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.is_file().then_some(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xray_memory::{ProcessRuntime, MB};

    #[test]
    fn empty_config_uses_defaults() {
        let config = XrayConfig::load_from_str("").unwrap();
        assert_eq!(config, XrayConfig::default());
        assert!(config.memory.monitor);
        assert_eq!(config.memory.monitor_config().interval, MEMORY_CHECK_INTERVAL);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn memory_table_parses_human_sizes() {
        let config = XrayConfig::load_from_str(
            r#"
[memory]
limit = "32MiB"
collection_target_percent = 35
monitor = false
monitor_interval_secs = 5
"#,
        )
        .unwrap();

        assert_eq!(config.memory.limit, Some(ByteSize(32 * MB)));
        assert_eq!(config.memory.collection_target_percent, Some(35));
        assert!(!config.memory.monitor);
        assert_eq!(
            config.memory.monitor_config().interval,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn raw_byte_counts_are_accepted() {
        let config = XrayConfig::load_from_str("[memory]\nlimit = 1048576\n").unwrap();
        assert_eq!(config.memory.limit, Some(ByteSize(MB)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = XrayConfig::load_from_str("[memory]\nhard_ceiling = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{err}");
    }

    #[test]
    fn bad_sizes_are_rejected() {
        let err = XrayConfig::load_from_str("[memory]\nlimit = \"lots\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{err}");
    }

    #[test]
    fn zero_interval_is_invalid() {
        let err =
            XrayConfig::load_from_str("[memory]\nmonitor_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn load_from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = XrayConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "{err}");
    }

    #[test]
    fn load_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xray.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = XrayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn apply_clamps_configured_limit() {
        let runtime = Arc::new(ProcessRuntime::new());
        let governor = MemoryGovernor::new(runtime);

        let config = MemoryConfig {
            limit: Some(ByteSize(200 * MB)),
            collection_target_percent: Some(70),
            ..MemoryConfig::default()
        };
        config.apply(&governor);

        let policy = governor.policy();
        assert_eq!(policy.ceiling_bytes, HARD_CEILING_BYTES);
        assert_eq!(policy.collection_target_percent, 70);

        let lower = MemoryConfig {
            limit: Some(ByteSize(10 * MB)),
            ..MemoryConfig::default()
        };
        lower.apply(&governor);
        let policy = governor.policy();
        assert_eq!(policy.ceiling_bytes, 10 * MB);
        assert_eq!(
            policy.collection_target_percent,
            AGGRESSIVE_COLLECTION_PERCENT
        );
    }

    #[test]
    fn apply_without_overrides_keeps_policy() {
        let governor = MemoryGovernor::new(Arc::new(ProcessRuntime::new()));
        governor.set_policy(5 * MB, 60);

        MemoryConfig::default().apply(&governor);

        assert_eq!(governor.policy().ceiling_bytes, 5 * MB);
        assert_eq!(governor.policy().collection_target_percent, 60);
    }
}
