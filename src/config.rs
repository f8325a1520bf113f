use crate::camera::CameraBackend;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothConfig {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub collage: CollageConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera backend to use
    #[serde(default = "default_camera_backend")]
    pub backend: CameraBackend,

    /// Camera device index (e.g., 0 for the first webcam)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Preview polling rate in frames per second
    #[serde(default = "default_preview_fps")]
    pub preview_fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Event this booth is running for
    #[serde(default = "default_event_id")]
    pub event_id: i64,

    /// Countdown length before each shot, in seconds
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,

    /// Pause between the post-shot display and the next countdown, in seconds
    #[serde(default = "default_inter_shot_delay")]
    pub inter_shot_delay_seconds: u32,

    /// How long the captured shot is held on screen, in seconds
    #[serde(default = "default_display_duration")]
    pub display_duration_seconds: u32,

    /// Grace delay between the final countdown tick and the capture trigger,
    /// in milliseconds
    #[serde(default = "default_capture_grace_ms")]
    pub capture_grace_ms: u64,

    /// How many manual retries of a failed capture are allowed before the
    /// session is failed
    #[serde(default = "default_max_capture_retries")]
    pub max_capture_retries: u32,

    /// Name of the built-in template used when the event has none configured
    #[serde(default = "default_template_name")]
    pub default_template: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CollageConfig {
    /// JPEG quality factor for the composed output (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Draw the per-photo border declared by the template
    #[serde(default = "default_apply_border")]
    pub apply_border: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Base path for session photos and composed collages
    #[serde(default = "default_storage_root")]
    pub root: String,
}

impl BoothConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("boothcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.backend", default_camera_backend().as_str())?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.preview_fps", default_preview_fps())?
            .set_default("session.event_id", default_event_id())?
            .set_default("session.countdown_seconds", default_countdown_seconds())?
            .set_default(
                "session.inter_shot_delay_seconds",
                default_inter_shot_delay(),
            )?
            .set_default(
                "session.display_duration_seconds",
                default_display_duration(),
            )?
            .set_default("session.capture_grace_ms", default_capture_grace_ms() as i64)?
            .set_default(
                "session.max_capture_retries",
                default_max_capture_retries(),
            )?
            .set_default("session.default_template", default_template_name())?
            .set_default("collage.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("collage.apply_border", default_apply_border())?
            .set_default("storage.root", default_storage_root())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with BOOTHCAM_ prefix
            .add_source(Environment::with_prefix("BOOTHCAM").separator("__"))
            .build()?;

        let config: BoothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.preview_fps == 0 {
            return Err(ConfigError::Message(
                "Preview fps must be greater than 0".to_string(),
            ));
        }

        if self.session.countdown_seconds == 0 {
            return Err(ConfigError::Message(
                "Countdown must be at least 1 second".to_string(),
            ));
        }

        if self.collage.jpeg_quality == 0 || self.collage.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.storage.root.is_empty() {
            return Err(ConfigError::Message(
                "Storage root must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                backend: default_camera_backend(),
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                preview_fps: default_preview_fps(),
            },
            session: SessionConfig {
                event_id: default_event_id(),
                countdown_seconds: default_countdown_seconds(),
                inter_shot_delay_seconds: default_inter_shot_delay(),
                display_duration_seconds: default_display_duration(),
                capture_grace_ms: default_capture_grace_ms(),
                max_capture_retries: default_max_capture_retries(),
                default_template: default_template_name(),
            },
            collage: CollageConfig {
                jpeg_quality: default_jpeg_quality(),
                apply_border: default_apply_border(),
            },
            storage: StorageConfig {
                root: default_storage_root(),
            },
        }
    }
}

fn default_camera_backend() -> CameraBackend {
    CameraBackend::Webcam
}

fn default_camera_index() -> u32 {
    0
}

fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}

fn default_preview_fps() -> u32 {
    30
}

fn default_event_id() -> i64 {
    0
}

fn default_countdown_seconds() -> u32 {
    3
}

fn default_inter_shot_delay() -> u32 {
    3
}

fn default_display_duration() -> u32 {
    2
}

fn default_capture_grace_ms() -> u64 {
    500
}

fn default_max_capture_retries() -> u32 {
    3
}

fn default_template_name() -> String {
    "4 Fotos Grid".to_string()
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_apply_border() -> bool {
    true
}

fn default_storage_root() -> String {
    "./booth_data".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BoothConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.countdown_seconds, 3);
        assert_eq!(config.collage.jpeg_quality, 95);
        assert_eq!(config.camera.resolution, (1280, 720));
    }

    #[test]
    fn test_validate_rejects_zero_resolution() {
        let mut config = BoothConfig::default();
        config.camera.resolution = (0, 720);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_jpeg_quality() {
        let mut config = BoothConfig::default();
        config.collage.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.collage.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = BoothConfig::load_from_file("/nonexistent/boothcam.toml").unwrap();
        assert_eq!(config.session.display_duration_seconds, 2);
        assert_eq!(config.session.max_capture_retries, 3);
    }
}
