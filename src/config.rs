use crate::camera::{Parameter, ParameterSetting, SyntheticCameraConfig};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CamrelayConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub relay: RelayConfig,
    pub present: PresentConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Frame width in pixels
    #[serde(default = "default_camera_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_camera_height")]
    pub height: u32,

    /// Synthetic camera reports "not ready" on every n-th attempt (0 = never)
    #[serde(default)]
    pub not_ready_every: u32,

    /// Parameter overrides applied before the frame size is read
    #[serde(default)]
    pub parameters: BTreeMap<Parameter, ParameterSetting>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Wall-clock budget of the capture loop in seconds
    #[serde(default = "default_capture_run_seconds")]
    pub run_seconds: u64,

    /// Sleep between attempts while the camera is not ready
    #[serde(default = "default_capture_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelayConfig {
    /// Number of frames relayed before the loop ends
    #[serde(default = "default_relay_frame_count")]
    pub frame_count: u64,

    /// Throttle after each relayed frame
    #[serde(default = "default_relay_interval_ms")]
    pub interval_ms: u64,

    /// Sleep between checks while no refresh is requested
    #[serde(default = "default_relay_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PresentConfig {
    /// Sleep while waiting for the relay to refresh the display slot
    #[serde(default = "default_present_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Directory persisted frames are written to
    #[serde(default = "default_present_output_dir")]
    pub output_dir: String,

    /// File name prefix of persisted frames
    #[serde(default = "default_present_file_prefix")]
    pub file_prefix: String,

    /// Optional file overwritten with every rendered frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<String>,

    /// Watch the terminal for the quit key
    #[serde(default = "default_present_keyboard")]
    pub keyboard: bool,

    /// Timeout of each quit-key poll
    #[serde(default = "default_present_input_poll_ms")]
    pub input_poll_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// How the three loops are run
    #[serde(default)]
    pub mode: RunMode,
}

/// Loop isolation: separate processes sharing a mapping, or threads of one process
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Process,
    Thread,
}

impl CameraConfig {
    pub fn synthetic(&self) -> SyntheticCameraConfig {
        SyntheticCameraConfig {
            width: self.width,
            height: self.height,
            not_ready_every: self.not_ready_every,
        }
    }
}

impl CaptureConfig {
    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl PresentConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

impl CamrelayConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camrelay.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.width", default_camera_width())?
            .set_default("camera.height", default_camera_height())?
            .set_default("camera.not_ready_every", 0)?
            .set_default("capture.run_seconds", default_capture_run_seconds())?
            .set_default(
                "capture.retry_interval_ms",
                default_capture_retry_interval_ms(),
            )?
            .set_default("relay.frame_count", default_relay_frame_count())?
            .set_default("relay.interval_ms", default_relay_interval_ms())?
            .set_default("relay.poll_interval_ms", default_relay_poll_interval_ms())?
            .set_default(
                "present.idle_interval_ms",
                default_present_idle_interval_ms(),
            )?
            .set_default("present.output_dir", default_present_output_dir())?
            .set_default("present.file_prefix", default_present_file_prefix())?
            .set_default("present.keyboard", default_present_keyboard())?
            .set_default("present.input_poll_ms", default_present_input_poll_ms())?
            .set_default("system.mode", "process")?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. CAMRELAY_RELAY__FRAME_COUNT=5
            .add_source(
                Environment::with_prefix("CAMRELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CamrelayConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Message(
                "Camera width and height must be greater than 0".to_string(),
            ));
        }

        if self.capture.run_seconds == 0 {
            return Err(ConfigError::Message(
                "Capture run_seconds must be greater than 0".to_string(),
            ));
        }

        if self.relay.frame_count == 0 {
            return Err(ConfigError::Message(
                "Relay frame_count must be greater than 0".to_string(),
            ));
        }

        if self.present.output_dir.trim().is_empty() {
            return Err(ConfigError::Message(
                "Present output_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CamrelayConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                width: default_camera_width(),
                height: default_camera_height(),
                not_ready_every: 0,
                parameters: BTreeMap::new(),
            },
            capture: CaptureConfig {
                run_seconds: default_capture_run_seconds(),
                retry_interval_ms: default_capture_retry_interval_ms(),
            },
            relay: RelayConfig {
                frame_count: default_relay_frame_count(),
                interval_ms: default_relay_interval_ms(),
                poll_interval_ms: default_relay_poll_interval_ms(),
            },
            present: PresentConfig {
                idle_interval_ms: default_present_idle_interval_ms(),
                output_dir: default_present_output_dir(),
                file_prefix: default_present_file_prefix(),
                preview_path: None,
                keyboard: default_present_keyboard(),
                input_poll_ms: default_present_input_poll_ms(),
            },
            system: SystemConfig {
                mode: RunMode::Process,
            },
        }
    }
}

// Default value functions
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}

fn default_capture_run_seconds() -> u64 {
    20
}
fn default_capture_retry_interval_ms() -> u64 {
    1
}

fn default_relay_frame_count() -> u64 {
    20
}
fn default_relay_interval_ms() -> u64 {
    3000
}
fn default_relay_poll_interval_ms() -> u64 {
    10
}

fn default_present_idle_interval_ms() -> u64 {
    50
}
fn default_present_output_dir() -> String {
    "./frames".to_string()
}
fn default_present_file_prefix() -> String {
    "save".to_string()
}
fn default_present_keyboard() -> bool {
    true
}
fn default_present_input_poll_ms() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CamrelayConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.capture.run_duration(), Duration::from_secs(20));
        assert_eq!(config.relay.frame_count, 20);
        assert_eq!(config.relay.interval(), Duration::from_secs(3));
        assert_eq!(config.relay.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.present.idle_interval(), Duration::from_millis(50));
        assert_eq!(config.system.mode, RunMode::Process);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
width = 4
height = 2

[camera.parameters]
gain = 12.5
shutter = false

[relay]
frame_count = 3
interval_ms = 5

[system]
mode = "thread"
"#
        )
        .unwrap();

        let config = CamrelayConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.camera.width, 4);
        assert_eq!(config.camera.height, 2);
        assert_eq!(
            config.camera.parameters.get(&Parameter::Gain),
            Some(&ParameterSetting::Value(12.5))
        );
        assert_eq!(
            config.camera.parameters.get(&Parameter::Shutter),
            Some(&ParameterSetting::Auto(false))
        );
        assert_eq!(config.relay.frame_count, 3);
        assert_eq!(config.relay.interval_ms, 5);
        assert_eq!(config.relay.poll_interval_ms, 10);
        assert_eq!(config.capture.run_seconds, 20);
        assert_eq!(config.system.mode, RunMode::Thread);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = CamrelayConfig::load_from_file("/nonexistent/camrelay-test").unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.present.output_dir, "./frames");
    }

    #[test]
    fn test_config_validation() {
        let mut config = CamrelayConfig::default();
        config.camera.width = 0;
        assert!(config.validate().is_err());

        config.camera.width = 640;
        config.relay.frame_count = 0;
        assert!(config.validate().is_err());

        config.relay.frame_count = 1;
        config.capture.run_seconds = 0;
        assert!(config.validate().is_err());

        config.capture.run_seconds = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_serializes() {
        let rendered = toml::to_string_pretty(&CamrelayConfig::default()).unwrap();
        assert!(rendered.contains("[relay]"));
        assert!(rendered.contains("mode = \"process\""));

        let parsed: CamrelayConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, CamrelayConfig::default());
    }
}
