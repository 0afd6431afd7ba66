//! Monitor settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `DROWSY_*` environment variables (`__` separates nested keys,
//! e.g. `DROWSY_DMS__EAR_THRESHOLD=0.25`).

use alerting::AlertConfig;
use camera_capture::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::MonitorError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DROWSY";

/// Complete runtime configuration of the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Frame source
    pub camera: CameraConfig,
    /// Detection thresholds and model paths
    pub dms: DmsConfig,
    /// Status labels
    pub alerts: AlertConfig,
    /// Where annotated frames are written (disabled when unset)
    pub output_dir: Option<PathBuf>,
    /// JSON-lines file receiving one analysis record per frame
    pub analysis_log: Option<PathBuf>,
    /// Gaussian blur applied to each frame before detection (0 disables)
    pub blur_sigma: f32,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON
    pub json_logs: bool,
    /// Prometheus listen address, e.g. "0.0.0.0:9100"
    pub metrics_addr: Option<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            dms: DmsConfig::default(),
            alerts: AlertConfig::default(),
            output_dir: None,
            analysis_log: None,
            blur_sigma: 1.0,
            log_level: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl MonitorSettings {
    /// Load settings, reading `path` if given
    pub fn load(path: Option<&Path>) -> Result<Self, MonitorError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: MonitorSettings = builder.build()?.try_deserialize()?;
        settings.dms.validate()?;
        if !settings.blur_sigma.is_finite() || settings.blur_sigma < 0.0 {
            return Err(MonitorError::Config(ConfigError::Message(format!(
                "blur_sigma must be a non-negative number, got {}",
                settings.blur_sigma
            ))));
        }
        Ok(settings)
    }

    /// Parsed log level, INFO when unrecognised
    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let settings = MonitorSettings::load(None).unwrap();
        assert_eq!(settings.dms.ear_threshold, 0.3);
        assert_eq!(settings.camera.fps, 15);
        assert_eq!(settings.level(), Level::INFO);
        assert!(settings.output_dir.is_none());
        assert_eq!(settings.blur_sigma, 1.0);
    }

    #[test]
    fn test_file_overrides_nested_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"
output_dir = "annotated"

[camera]
source_dir = "/tmp/frames"
fps = 30

[dms]
ear_threshold = 0.22
warnings_to_safe_mode = 5
face_model_path = "models/face.onnx"

[alerts]
warning_message = "Wake up!"
"#
        )
        .unwrap();

        let settings = MonitorSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.level(), Level::DEBUG);
        assert_eq!(settings.output_dir, Some(PathBuf::from("annotated")));
        assert_eq!(settings.camera.fps, 30);
        assert_eq!(settings.camera.channel_capacity, 4);
        assert_eq!(settings.dms.ear_threshold, 0.22);
        assert_eq!(settings.dms.warnings_to_safe_mode, 5);
        assert_eq!(settings.dms.eyes_closed_threshold_ms, 2000);
        assert_eq!(settings.dms.face_model_path.as_deref(), Some("models/face.onnx"));
        assert_eq!(settings.alerts.warning_message, "Wake up!");
        assert_eq!(settings.alerts.ok_message, "OK!");
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dms]\nwarnings_to_safe_mode = 0").unwrap();
        assert!(matches!(
            MonitorSettings::load(Some(file.path())),
            Err(MonitorError::Dms(_))
        ));
    }

    #[test]
    fn test_blur_sigma_settings() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "blur_sigma = 0.0").unwrap();
        assert_eq!(MonitorSettings::load(Some(file.path())).unwrap().blur_sigma, 0.0);

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "blur_sigma = -1.5").unwrap();
        assert!(matches!(
            MonitorSettings::load(Some(file.path())),
            Err(MonitorError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/no/such/settings.toml");
        assert!(matches!(
            MonitorSettings::load(Some(missing)),
            Err(MonitorError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let settings = MonitorSettings {
            log_level: "loud".into(),
            ..Default::default()
        };
        assert_eq!(settings.level(), Level::INFO);
    }
}
