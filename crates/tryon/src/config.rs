use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tryon_core::{DetectorOptions, InputLayout};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration: TOML file, then `TRYON_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture resolution; the driver may pick another.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Face landmark ONNX model.
    pub model_path: PathBuf,
    pub input_layout: InputLayout,
    /// Eyewear glTF/GLB asset.
    pub asset_path: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound on detection cycles per second.
    pub target_fps: u32,
    /// Where screenshots are written.
    pub screenshot_dir: PathBuf,
    pub detector: DetectorOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            model_path: PathBuf::from("models/face_landmark.onnx"),
            input_layout: InputLayout::default(),
            asset_path: PathBuf::from("assets/eyewear.glb"),
            viewport_width: 1280,
            viewport_height: 720,
            target_fps: 60,
            screenshot_dir: PathBuf::from("."),
            detector: DetectorOptions::default(),
        }
    }
}

/// Printed by `tryon config`.
pub const EXAMPLE_CONFIG: &str = r#"# tryon configuration
camera_device = "/dev/video0"
capture_width = 640
capture_height = 480
model_path = "models/face_landmark.onnx"
# "nhwc" or "nchw"
input_layout = "nhwc"
asset_path = "assets/eyewear.glb"
viewport_width = 1280
viewport_height = 720
target_fps = 60
screenshot_dir = "."

[detector]
max_faces = 1
refine_landmarks = true
min_detection_confidence = 0.5
min_tracking_confidence = 0.5
"#;

impl Config {
    /// Load from an optional TOML file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from `TRYON_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(device) = std::env::var("TRYON_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Ok(path) = std::env::var("TRYON_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TRYON_ASSET_PATH") {
            self.asset_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("TRYON_SCREENSHOT_DIR") {
            self.screenshot_dir = PathBuf::from(dir);
        }
        self.target_fps = env_u32("TRYON_TARGET_FPS", self.target_fps);
        self.detector.min_detection_confidence =
            env_f32("TRYON_MIN_DETECTION_CONFIDENCE", self.detector.min_detection_confidence);
        self.detector.min_tracking_confidence =
            env_f32("TRYON_MIN_TRACKING_CONFIDENCE", self.detector.min_tracking_confidence);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport_width, self.viewport_height
            )));
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(ConfigError::Invalid("capture size must be non-empty".into()));
        }
        if self.target_fps == 0 {
            return Err(ConfigError::Invalid("target_fps must be at least 1".into()));
        }
        self.detector
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
