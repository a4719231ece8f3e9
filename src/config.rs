//! TOML configuration for speedwatch.
//!
//! Layered lookup: an explicit path, then the `SPEEDWATCH_CONFIG` environment
//! variable, then `./speedwatch.toml`, then compiled-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "SPEEDWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "speedwatch.toml";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("interval must be one of 1, 5, 10, 30 or 60 seconds (got {0})")]
    InvalidInterval(u64),

    #[error("unknown date range '{0}' (expected all, today, hour, day, week or month)")]
    UnknownDateRange(String),

    #[error("max_history_size must be at least 1")]
    ZeroHistoryCap,

    #[error("{field} must contain at least one payload size")]
    EmptyPayloadSizes { field: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration. An explicit path must load; the environment
    /// and local-file layers fall through to defaults on error.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SPEEDWATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.probes.validate()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Allowed cadences for continuous testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum TestInterval {
    OneSecond,
    #[default]
    FiveSeconds,
    TenSeconds,
    ThirtySeconds,
    OneMinute,
}

impl TestInterval {
    pub const ALL: [TestInterval; 5] = [
        TestInterval::OneSecond,
        TestInterval::FiveSeconds,
        TestInterval::TenSeconds,
        TestInterval::ThirtySeconds,
        TestInterval::OneMinute,
    ];

    pub fn as_secs(self) -> u64 {
        match self {
            TestInterval::OneSecond => 1,
            TestInterval::FiveSeconds => 5,
            TestInterval::TenSeconds => 10,
            TestInterval::ThirtySeconds => 30,
            TestInterval::OneMinute => 60,
        }
    }

    pub fn period(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl TryFrom<u64> for TestInterval {
    type Error = ConfigError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|i| i.as_secs() == secs)
            .ok_or(ConfigError::InvalidInterval(secs))
    }
}

impl From<TestInterval> for u64 {
    fn from(i: TestInterval) -> u64 {
        i.as_secs()
    }
}

impl fmt::Display for TestInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs())
    }
}

/// User-facing test settings. Serialized camelCase for the API; the TOML
/// `[settings]` table also accepts the snake_case spellings used by the
/// other sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    #[serde(rename = "intervalSeconds", alias = "interval_seconds")]
    pub interval: TestInterval,
    #[serde(alias = "max_history_size")]
    pub max_history_size: usize,
    #[serde(alias = "auto_cleanup")]
    pub auto_cleanup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: TestInterval::default(),
            max_history_size: 1000,
            auto_cleanup: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::ZeroHistoryCap);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// What the engine does when a whole run fails past per-probe recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Return a plausible random reading (legacy behaviour).
    #[default]
    Synthesize,
    /// Report the failure so the orchestrator records `error`.
    Surface,
}

/// Probe endpoints, payload plans and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Download URL prefix; the payload size in bytes is appended.
    pub download_url: String,
    /// Upload endpoint accepting a POST body.
    pub upload_url: String,
    /// Endpoint for the latency HEAD request.
    pub ping_url: String,
    /// Download payload sizes in bytes, one concurrent probe each.
    pub download_sizes: Vec<usize>,
    /// Upload payload sizes in bytes, one concurrent probe each.
    pub upload_sizes: Vec<usize>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Upper bound on a whole run in seconds.
    pub run_timeout_secs: u64,
    pub fallback: FallbackPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            download_url: "https://httpbin.org/bytes/".to_string(),
            upload_url: "https://httpbin.org/post".to_string(),
            ping_url: "https://httpbin.org/status/200".to_string(),
            download_sizes: vec![100 * 1024, 500 * 1024, 1024 * 1024],
            upload_sizes: vec![50 * 1024, 100 * 1024],
            request_timeout_secs: 20,
            run_timeout_secs: 45,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download_sizes.is_empty() {
            return Err(ConfigError::EmptyPayloadSizes { field: "download_sizes" });
        }
        if self.upload_sizes.is_empty() {
            return Err(ConfigError::EmptyPayloadSizes { field: "upload_sizes" });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout { field: "request_timeout_secs" });
        }
        if self.run_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout { field: "run_timeout_secs" });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Storage / API / Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the reading history.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/speedwatch.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.settings.interval, TestInterval::FiveSeconds);
        assert_eq!(cfg.settings.max_history_size, 1000);
        assert!(cfg.settings.auto_cleanup);
        assert_eq!(cfg.probes.fallback, FallbackPolicy::Synthesize);
    }

    #[test]
    fn test_interval_accepts_presets_only() {
        for secs in [1, 5, 10, 30, 60] {
            assert_eq!(TestInterval::try_from(secs).unwrap().as_secs(), secs);
        }
        assert_eq!(
            TestInterval::try_from(7),
            Err(ConfigError::InvalidInterval(7))
        );
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [settings]
            intervalSeconds = 30
            autoCleanup = false

            [probes]
            fallback = "surface"
            upload_sizes = [1024]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.settings.interval, TestInterval::ThirtySeconds);
        assert!(!cfg.settings.auto_cleanup);
        assert_eq!(cfg.settings.max_history_size, 1000);
        assert_eq!(cfg.probes.fallback, FallbackPolicy::Surface);
        assert_eq!(cfg.probes.upload_sizes, vec![1024]);
        assert_eq!(cfg.probes.download_sizes.len(), 3);
    }

    #[test]
    fn test_settings_accept_snake_case_keys() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [settings]
            interval_seconds = 10
            max_history_size = 50
            auto_cleanup = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.settings.interval, TestInterval::TenSeconds);
        assert_eq!(cfg.settings.max_history_size, 50);
        assert!(!cfg.settings.auto_cleanup);

        let wire = serde_json::to_value(&cfg.settings).unwrap();
        assert_eq!(wire["intervalSeconds"], 10);
        assert_eq!(wire["maxHistorySize"], 50);
        assert_eq!(wire["autoCleanup"], false);
    }

    #[test]
    fn test_parse_rejects_bad_interval() {
        let res: Result<AppConfig, _> = toml::from_str("[settings]\nintervalSeconds = 15\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_plan() {
        let mut cfg = AppConfig::default();
        cfg.probes.download_sizes.clear();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyPayloadSizes { field: "download_sizes" })
        );

        let mut cfg = AppConfig::default();
        cfg.settings.max_history_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroHistoryCap));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speedwatch.toml");
        std::fs::write(&path, "[api]\nbind = \"0.0.0.0:9000\"\n").unwrap();
        let cfg = AppConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.api.bind, "0.0.0.0:9000");

        let missing = dir.path().join("missing.toml");
        assert!(AppConfig::resolve(Some(&missing)).is_err());
    }
}
