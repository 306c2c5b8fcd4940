use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

mod logging;

pub use logging::init_tracing;

/// File names probed (in order) by [`discover_config_path`].
pub const CONFIG_FILE_NAMES: [&str; 2] = ["easyport.toml", ".easyport/config.toml"];

/// Environment variable overriding config discovery.
pub const CONFIG_PATH_ENV: &str = "EASYPORT_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while stderr logging stays active.
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

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    /// The effective filter: the configured level, with `RUST_LOG` directives appended.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let config_directives = Self::normalize_level_directives(&self.level);
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let directives = match env_directives {
            Some(env) => format!("{config_directives},{env}"),
            None => config_directives,
        };
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Threads available to background jobs.
    #[serde(default = "ImportConfig::default_background_threads")]
    pub background_threads: usize,

    /// Upper bound for a single batch of project updates (in milliseconds). Unbounded if unset.
    #[serde(default)]
    pub batch_timeout_ms: Option<u64>,

    /// How long an import waits for background configuration to settle (in milliseconds).
    #[serde(default = "ImportConfig::default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl ImportConfig {
    fn default_background_threads() -> usize {
        1
    }

    fn default_wait_timeout_ms() -> u64 {
        120_000
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            background_threads: Self::default_background_threads(),
            batch_timeout_ms: None,
            wait_timeout_ms: Self::default_wait_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EasyportConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EasyportConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Finds the config file for `workspace_root`.
///
/// `EASYPORT_CONFIG` wins (relative paths resolve against the workspace root); otherwise the
/// first existing entry of [`CONFIG_FILE_NAMES`] is used.
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        return Some(if path.is_absolute() {
            path
        } else {
            workspace_root.join(path)
        });
    }

    CONFIG_FILE_NAMES
        .iter()
        .map(|name| workspace_root.join(name))
        .find(|candidate| candidate.is_file())
}

/// Loads the workspace config, falling back to defaults when no config file exists.
pub fn load_for_workspace(workspace_root: &Path) -> Result<EasyportConfig, ConfigError> {
    match discover_config_path(workspace_root) {
        Some(path) => EasyportConfig::load_from_path(path),
        None => Ok(EasyportConfig::default()),
    }
}
