use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{AttendanceError, Result};
use crate::common::paths;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub stream: StreamConfig,
    pub backend: BackendConfig,
    pub serial: SerialConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    pub detector: DetectorConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamConfig {
    pub url: String,
    #[serde(default = "default_error_retry")]
    pub error_retry_ms: u64,
    #[serde(default = "default_eos_retry")]
    pub eos_retry_ms: u64,
    #[serde(default = "default_max_buffer")]
    pub max_buffer_bytes: usize,
    #[serde(default = "default_read_chunk")]
    pub read_chunk_bytes: usize,
}

fn default_error_retry() -> u64 { 1000 }
fn default_eos_retry() -> u64 { 100 }
fn default_max_buffer() -> usize { 1_000_000 }
fn default_read_chunk() -> usize { 16 * 1024 }

impl StreamConfig {
    /// Delay before reopening a stream that failed (`true`) or ended cleanly.
    pub fn retry_delay(&self, failed: bool) -> Duration {
        Duration::from_millis(if failed { self.error_retry_ms } else { self.eos_retry_ms })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_backend_write_timeout")]
    pub write_timeout_ms: u64,
}

fn default_retry_interval() -> u64 { 5000 }
fn default_connect_timeout() -> u64 { 3000 }
fn default_backend_write_timeout() -> u64 { 2000 }

impl BackendConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_serial_write_timeout")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_baud_rate() -> u32 { 115_200 }
fn default_serial_write_timeout() -> u64 { 1000 }
fn default_true() -> bool { true }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PresenceConfig {
    #[serde(default = "default_confirm_threshold")]
    pub confirm_threshold: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: u32,
    #[serde(default = "default_crop_margin")]
    pub crop_margin: f32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_confirm_threshold() -> u32 { 5 }
fn default_frame_size() -> u32 { 480 }
fn default_crop_margin() -> f32 { 0.15 }
fn default_jpeg_quality() -> u8 { 90 }

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            confirm_threshold: default_confirm_threshold(),
            frame_size: default_frame_size(),
            crop_margin: default_crop_margin(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_input_size() -> u32 { 640 }
fn default_confidence() -> f32 { 0.5 }
fn default_optimization_level() -> u32 { 3 }

impl Config {
    /// Looks in `configs/` first, then the system location.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(paths::LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_from_path(&local);
        }
        Self::load_from_path(&paths::system_config_file())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AttendanceError::Config(format!(
                "Config file not found: {}. Copy configs/face-attendance.toml there to start.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| AttendanceError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.url.trim().is_empty() {
            return Err(AttendanceError::Config("Stream URL must not be empty".into()));
        }
        if self.stream.max_buffer_bytes < 64 * 1024 {
            return Err(AttendanceError::Config(format!(
                "Stream buffer cap must be at least 65536 bytes, got {}", self.stream.max_buffer_bytes
            )));
        }
        if self.stream.read_chunk_bytes == 0 {
            return Err(AttendanceError::Config("Stream read chunk must be non-zero".into()));
        }

        if self.backend.host.trim().is_empty() || self.backend.port == 0 {
            return Err(AttendanceError::Config(format!(
                "Backend address is invalid: {}", self.backend.address()
            )));
        }
        if self.backend.retry_interval_ms == 0 {
            return Err(AttendanceError::Config("Backend retry interval must be non-zero".into()));
        }

        if self.serial.enabled && self.serial.port.trim().is_empty() {
            return Err(AttendanceError::Config("Serial port must be set when serial is enabled".into()));
        }

        if self.presence.confirm_threshold == 0 {
            return Err(AttendanceError::Config("Confirm threshold must be at least 1".into()));
        }
        if self.presence.frame_size == 0 || self.presence.frame_size > 4096 {
            return Err(AttendanceError::Config(format!(
                "Frame size must be between 1 and 4096, got {}", self.presence.frame_size
            )));
        }
        if !(0.0..=1.0).contains(&self.presence.crop_margin) {
            return Err(AttendanceError::Config(format!(
                "Crop margin must be between 0.0 and 1.0, got {}", self.presence.crop_margin
            )));
        }
        if self.presence.jpeg_quality == 0 || self.presence.jpeg_quality > 100 {
            return Err(AttendanceError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}", self.presence.jpeg_quality
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(AttendanceError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}", self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(AttendanceError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}", self.detector.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(AttendanceError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence_threshold
            )));
        }

        Ok(())
    }
}
