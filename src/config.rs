//! ==============================================================================
//! config.rs - runtime configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `cloud-riddle.toml`.
//!     loads configuration from file or falls back to defaults.
//!     secrets (api tokens, sas strings) never live in the toml file; they are
//!     read from the environment, which `load_env()` seeds from `.env`.
//!
//! structure:
//!     - PollingConfig: cycle length of each upload loop.
//!     - SensorsConfig: i2c addresses, uv conversion, sma window.
//!     - CameraConfig: capture command and where photos land.
//!     - StorageConfig: which object store to upload into.
//!     - RealtimeConfig: realtime database url and push path.
//!     - RiddleConfig: web app bind address and vision model settings.
//!     - LoggingConfig: log level and whether sensor lines are printed.
//!
//! ==============================================================================

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "cloud-riddle.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub polling: PollingConfig,
    pub sensors: SensorsConfig,
    pub camera: CameraConfig,
    pub storage: StorageConfig,
    pub realtime: RealtimeConfig,
    pub riddle: RiddleConfig,
    pub logging: LoggingConfig,
    /// file the config came from, None for built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
    /// problems hit while loading, reported by print_summary once logging is up
    #[serde(skip)]
    pub load_warnings: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub camera_interval_seconds: u64,
    pub edge_interval_seconds: u64,
    pub light_interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            camera_interval_seconds: 10,
            edge_interval_seconds: 5,
            light_interval_seconds: 5,
        }
    }
}

impl PollingConfig {
    pub fn camera_interval(&self) -> Duration {
        Duration::from_secs(self.camera_interval_seconds)
    }

    pub fn edge_interval(&self) -> Duration {
        Duration::from_secs(self.edge_interval_seconds)
    }

    pub fn light_interval(&self) -> Duration {
        Duration::from_secs(self.light_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    /// i2c bus number (1 on every pi since the model b+)
    pub i2c_bus: u8,
    /// veml7700 ambient light sensor, e.g. "0x10"
    pub veml7700_address: String,
    /// bme280 temperature/humidity/pressure sensor, e.g. "0x76"
    pub bme280_address: String,
    /// ads1115 adc carrying the analog uv sensor, e.g. "0x48"
    pub ads1115_address: String,
    /// ads1115 input the uv sensor is wired to (0-3)
    pub uv_channel: u8,
    /// volts -> uv index factor
    pub uv_scale: f64,
    /// photos are only taken while the uv index is strictly above this
    pub uv_threshold: f64,
    /// number of lux samples in the moving average
    pub lux_window: usize,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            veml7700_address: "0x10".to_string(),
            bme280_address: "0x76".to_string(),
            ads1115_address: "0x48".to_string(),
            uv_channel: 0,
            uv_scale: 0.2,
            uv_threshold: 0.1,
            lux_window: 5,
        }
    }
}

impl SensorsConfig {
    pub fn veml7700(&self) -> Result<u8> {
        parse_i2c_address(&self.veml7700_address)
    }

    pub fn bme280(&self) -> Result<u8> {
        parse_i2c_address(&self.bme280_address)
    }

    pub fn ads1115(&self) -> Result<u8> {
        parse_i2c_address(&self.ads1115_address)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    /// still capture program, invoked as `<command> -o <path>`
    pub command: String,
    pub photo_dir: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: "libcamera-still".to_string(),
            photo_dir: PathBuf::from("CloudPhotos"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Azure,
    Firebase,
    #[default]
    Local,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// https://<account>.blob.core.windows.net/<container>
    pub azure_container_url: String,
    /// firebase storage bucket, e.g. "milestone1.appspot.com"
    pub firebase_bucket: String,
    pub firebase_api_base: String,
    /// target directory for the local backend
    pub local_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Local,
            azure_container_url: String::new(),
            firebase_bucket: String::new(),
            firebase_api_base: "https://firebasestorage.googleapis.com".to_string(),
            local_dir: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RealtimeConfig {
    pub database_url: String,
    pub path: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            path: "vemldata".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiddleConfig {
    pub bind_address: String,
    pub api_base: String,
    pub model_version: String,
    pub prompt: String,
    pub welcome_delay_seconds: u64,
    pub prediction_timeout_seconds: u64,
    pub max_upload_bytes: usize,
    /// sessions not seen for this long are dropped
    pub session_idle_seconds: u64,
    /// upper bound on live sessions; the least recently seen goes first
    pub max_sessions: usize,
}

impl Default for RiddleConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8501".to_string(),
            api_base: "https://api.replicate.com".to_string(),
            model_version: "b5f6212d032508382d61ff00469ddda3e32fd8a0e75dc39d8a4191bb742157fb"
                .to_string(),
            prompt: crate::riddle::vision::RIDDLE_PROMPT.to_string(),
            welcome_delay_seconds: 4,
            prediction_timeout_seconds: 120,
            max_upload_bytes: 10 * 1024 * 1024,
            session_idle_seconds: 30 * 60,
            max_sessions: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config")
    }

    /// Load with default fallback. Runs before logging is set up, so problems
    /// are kept on the config and reported by `print_summary`.
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join(CONFIG_FILE),
            PathBuf::from("..").join("config").join(CONFIG_FILE),
        ];

        let mut warnings = Vec::new();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(mut config) => {
                        config.source = Some(path.clone());
                        config.load_warnings = warnings;
                        return config;
                    }
                    Err(e) => warnings.push(format!("Failed to load {}: {:#}", path.display(), e)),
                }
            }
        }

        warnings.push("No config file found - using defaults".to_string());
        Self { load_warnings: warnings, ..Self::default() }
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        for warning in &self.load_warnings {
            tracing::warn!("[CONFIG] {}", warning);
        }
        if let Some(path) = &self.source {
            tracing::info!("[CONFIG] Loaded from {}", path.display());
        }
        tracing::info!(
            storage = ?self.storage.backend,
            camera_every = self.polling.camera_interval_seconds,
            edge_every = self.polling.edge_interval_seconds,
            light_every = self.polling.light_interval_seconds,
            uv_threshold = self.sensors.uv_threshold,
            lux_window = self.sensors.lux_window,
            log_level = %self.logging.level,
            "[CONFIG] effective configuration"
        );
    }
}

/// Seed the process environment from `.env` when one exists. Returns the
/// file that was read.
pub fn load_env() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Read a required secret from the environment.
pub fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set", name))
}

/// Parse "0x76" / "118" style i2c addresses.
pub fn parse_i2c_address(raw: &str) -> Result<u8> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => trimmed.parse::<u8>(),
    };
    parsed.with_context(|| format!("invalid i2c address {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_setup() {
        let config = AppConfig::default();
        assert_eq!(config.polling.camera_interval(), Duration::from_secs(10));
        assert_eq!(config.polling.edge_interval(), Duration::from_secs(5));
        assert_eq!(config.sensors.lux_window, 5);
        assert_eq!(config.sensors.uv_threshold, 0.1);
        assert_eq!(config.realtime.path, "vemldata");
        assert_eq!(config.riddle.welcome_delay_seconds, 4);
        assert_eq!(config.riddle.session_idle_seconds, 1800);
        assert_eq!(config.storage.backend, StorageBackendKind::Local);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::parse(
            r#"
[storage]
backend = "azure"
azure_container_url = "https://acct.blob.core.windows.net/clouds"

[sensors]
uv_threshold = 0.3
"#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackendKind::Azure);
        assert_eq!(config.storage.azure_container_url, "https://acct.blob.core.windows.net/clouds");
        assert_eq!(config.sensors.uv_threshold, 0.3);
        assert_eq!(config.sensors.bme280_address, "0x76");
        assert_eq!(config.polling.light_interval_seconds, 5);
    }

    #[test]
    fn test_load_reads_file_and_reports_missing_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[realtime]\ndatabase_url = \"https://demo.firebaseio.com\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.realtime.database_url, "https://demo.firebaseio.com");
        assert_eq!(config.realtime.path, "vemldata");

        let err = AppConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(AppConfig::parse("[storage]\nbackend = \"dropbox\"\n").is_err());
    }

    #[test]
    fn test_parse_i2c_address() {
        assert_eq!(parse_i2c_address("0x76").unwrap(), 0x76);
        assert_eq!(parse_i2c_address("0X10").unwrap(), 0x10);
        assert_eq!(parse_i2c_address("72").unwrap(), 72);
        assert!(parse_i2c_address("0xZZ").is_err());
        assert!(parse_i2c_address("").is_err());
    }
}
