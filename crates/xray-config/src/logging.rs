use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive
    /// string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file. If it cannot be opened, file logging is
    /// skipped and the other sinks stay active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// Lowercases bare level names (accepting `warning`); anything else is
    /// passed through as `EnvFilter` directives.
    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Self::default_level(),
            "warning" => "warn".to_owned(),
            level @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => level.to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    /// The configured level with `RUST_LOG` directives appended. Falls back
    /// to `info` when the result does not parse.
    pub fn env_filter(&self) -> EnvFilter {
        let mut directives = Self::normalize_level_directives(&self.level);
        if let Some(env) = std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            directives = format!("{directives},{}", env.trim());
        }
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = config.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if config.stderr {
            // Stdout is reserved for command output.
            make_writer = BoxMakeWriter::new(make_writer.and(io::stderr));
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(Arc::new(file)));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target: "xray.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_synonyms_are_normalized() {
        assert_eq!(LoggingConfig::normalize_level_directives(" WARNING "), "warn");
        assert_eq!(LoggingConfig::normalize_level_directives(""), "info");
        assert_eq!(LoggingConfig::normalize_level_directives("DEBUG"), "debug");
        assert_eq!(
            LoggingConfig::normalize_level_directives("xray.memory=trace,info"),
            "xray.memory=trace,info"
        );
    }

    #[test]
    fn logs_are_appended_to_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xray.log");
        let config = LoggingConfig {
            level: "info".to_owned(),
            stderr: false,
            file: Some(path.clone()),
            ..LoggingConfig::default()
        };

        init_tracing(&config);
        // Second call is a no-op.
        init_tracing(&LoggingConfig::default());

        tracing::info!(target: "xray.memory", "governor online");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("governor online"), "{text}");
    }
}
