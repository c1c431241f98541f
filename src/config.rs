// Configuration management for Motioncam

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for loading and validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid camera entry at index {index}: {reason}")]
    InvalidCamera { index: usize, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Daemon-wide settings shared by every camera
    #[serde(flatten)]
    pub settings: Settings,

    /// Cameras to monitor, one worker each
    pub cameras: Vec<CameraProfile>,
}

/// Settings shared by all camera workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ffmpeg executable used for both the frame source and the recorder
    pub ffmpeg_path: String,

    /// Shader passed to the libplacebo filter for cameras without their own shader parameters
    pub filter_shader: PathBuf,

    /// Directory where generated per-camera shaders are cached
    pub shader_dir: PathBuf,

    /// Container extension for recordings (no leading dot)
    pub container_extension: String,

    /// Seconds to wait after SIGTERM before a subprocess is killed
    pub stop_timeout_secs: u64,

    /// ffmpeg `-hwaccel` value for both subprocesses, None to decode in software
    pub hwaccel: Option<String>,

    /// RTSP transport for rtsp:// locators
    pub rtsp_transport: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            filter_shader: PathBuf::from("frame-diff.glsl"),
            shader_dir: PathBuf::from("shaders"),
            container_extension: "mkv".to_string(),
            stop_timeout_secs: 5,
            hwaccel: Some("drm".to_string()),
            rtsp_transport: "udp".to_string(),
        }
    }
}

impl Settings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// A single camera and its motion tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraProfile {
    pub name: String,

    /// High-quality stream handed to the recorder
    pub stream_hq: String,

    /// Low-quality stream analysed for motion
    pub stream_lq: String,

    /// Directory recordings are written to
    pub output_dir: PathBuf,

    /// Frame width of the analysed stream
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height of the analysed stream
    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(flatten)]
    pub hysteresis: HysteresisParams,

    /// Per-camera motion filter parameters; the global filter shader is used when absent
    #[serde(default)]
    pub shader: Option<ShaderParams>,
}

impl CameraProfile {
    /// Bytes in one single-channel frame
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Hysteresis tuning for the motion detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HysteresisParams {
    /// Number of frame deltas in the moving average
    #[serde(default = "default_frame_history")]
    pub frame_history: usize,

    /// Moving average above which a frame counts as busy
    #[serde(default = "default_active_threshold")]
    pub active_threshold: f64,

    /// Consecutive busy frames needed to start recording
    #[serde(default = "default_start_frames")]
    pub start_frames: u32,

    /// Reserved, not used by the detector
    #[serde(default = "default_prestop_low_min")]
    pub prestop_low_min: u32,

    /// Reserved, not used by the detector
    #[serde(default = "default_prestop_low_max")]
    pub prestop_low_max: u32,

    /// Consecutive quiet frames needed to enter pre-stop
    #[serde(default = "default_prestop_low_full")]
    pub prestop_low_full: u32,

    /// Reserved, not used by the detector
    #[serde(default = "default_prestop_high_max")]
    pub prestop_high_max: u32,

    /// Consecutive busy frames in pre-stop that cancel it
    #[serde(default = "default_cancel_prestop_frames")]
    pub cancel_prestop_frames: u32,

    /// Seconds of quiet after entering pre-stop before recording stops
    #[serde(default = "default_full_stop_delay")]
    pub full_stop_delay: f64,
}

impl HysteresisParams {
    pub fn full_stop_delay(&self) -> Duration {
        Duration::from_secs_f64(self.full_stop_delay)
    }
}

impl Default for HysteresisParams {
    fn default() -> Self {
        Self {
            frame_history: default_frame_history(),
            active_threshold: default_active_threshold(),
            start_frames: default_start_frames(),
            prestop_low_min: default_prestop_low_min(),
            prestop_low_max: default_prestop_low_max(),
            prestop_low_full: default_prestop_low_full(),
            prestop_high_max: default_prestop_high_max(),
            cancel_prestop_frames: default_cancel_prestop_frames(),
            full_stop_delay: default_full_stop_delay(),
        }
    }
}

/// Parameters baked into a generated motion shader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderParams {
    /// Gaussian blur sigma in pixels
    pub sigma: f64,
    /// Blur radius in pixels
    pub radius: u32,
    /// Per-pixel luma difference that counts as motion
    pub motion_threshold: f64,
}

impl Config {
    /// Load and validate a config file.
    ///
    /// `.json` files are read as a bare array of cameras with default settings;
    /// everything else is parsed as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            Self::from_json_str(&contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse the legacy `cameras.json` format
    pub fn from_json_str(contents: &str) -> std::result::Result<Self, serde_json::Error> {
        let cameras: Vec<CameraProfile> = serde_json::from_str(contents)?;
        Ok(Self {
            settings: Settings::default(),
            cameras,
        })
    }

    /// Check every camera before any worker is launched
    pub fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("no cameras configured".into()));
        }
        if self.settings.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::Invalid("ffmpeg_path is empty".into()));
        }
        if self.settings.container_extension.trim().is_empty() {
            return Err(ConfigError::Invalid("container_extension is empty".into()));
        }

        let mut names = HashSet::new();
        for (index, camera) in self.cameras.iter().enumerate() {
            validate_camera(camera).map_err(|reason| ConfigError::InvalidCamera { index, reason })?;
            if !names.insert(camera.name.as_str()) {
                return Err(ConfigError::InvalidCamera {
                    index,
                    reason: format!("duplicate camera name '{}'", camera.name),
                });
            }
        }
        Ok(())
    }
}

fn validate_camera(camera: &CameraProfile) -> std::result::Result<(), String> {
    let required = [
        ("name", camera.name.as_str()),
        ("stream_hq", camera.stream_hq.as_str()),
        ("stream_lq", camera.stream_lq.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(format!("{} is empty", field));
        }
    }
    if camera.output_dir.as_os_str().is_empty() {
        return Err("output_dir is empty".into());
    }
    // The name ends up in file names
    if camera.name.contains(['/', '\\']) {
        return Err(format!("name '{}' contains a path separator", camera.name));
    }
    if camera.width == 0 || camera.height == 0 {
        return Err(format!("invalid geometry {}x{}", camera.width, camera.height));
    }

    let h = &camera.hysteresis;
    if h.frame_history == 0 {
        return Err("frame_history must be greater than 0".into());
    }
    if !(0.0..=1.0).contains(&h.active_threshold) {
        return Err(format!("active_threshold {} is outside [0, 1]", h.active_threshold));
    }
    let counters = [
        ("start_frames", h.start_frames),
        ("prestop_low_full", h.prestop_low_full),
        ("cancel_prestop_frames", h.cancel_prestop_frames),
    ];
    for (field, value) in counters {
        if value == 0 {
            return Err(format!("{} must be greater than 0", field));
        }
    }
    if h.prestop_low_min > h.prestop_low_max {
        return Err(format!(
            "prestop_low_min {} exceeds prestop_low_max {}",
            h.prestop_low_min, h.prestop_low_max
        ));
    }
    if !h.full_stop_delay.is_finite() || h.full_stop_delay < 0.0 {
        return Err(format!("full_stop_delay {} must be a non-negative number", h.full_stop_delay));
    }

    if let Some(shader) = &camera.shader {
        if !shader.sigma.is_finite() || shader.sigma <= 0.0 {
            return Err(format!("shader sigma {} must be positive", shader.sigma));
        }
        if !shader.motion_threshold.is_finite() || shader.motion_threshold < 0.0 {
            return Err(format!(
                "shader motion_threshold {} must be non-negative",
                shader.motion_threshold
            ));
        }
    }
    Ok(())
}

/// Print the loaded cameras (for `--check`)
pub fn print_camera_table(config: &Config) {
    println!("\n  Cameras ({}):", config.cameras.len());
    for camera in &config.cameras {
        let h = &camera.hysteresis;
        println!(
            "    {} {}x{} history={} threshold={} start={} prestop={} cancel={} stop_delay={:.1}s -> {}",
            camera.name,
            camera.width,
            camera.height,
            h.frame_history,
            h.active_threshold,
            h.start_frames,
            h.prestop_low_full,
            h.cancel_prestop_frames,
            h.full_stop_delay,
            camera.output_dir.display(),
        );
    }
    println!();
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("motioncam")
        .join("config.toml")
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_frame_history() -> usize {
    10
}

fn default_active_threshold() -> f64 {
    0.002
}

fn default_start_frames() -> u32 {
    15
}

fn default_prestop_low_min() -> u32 {
    10
}

fn default_prestop_low_max() -> u32 {
    19
}

fn default_prestop_low_full() -> u32 {
    20
}

fn default_prestop_high_max() -> u32 {
    20
}

fn default_cancel_prestop_frames() -> u32 {
    15
}

fn default_full_stop_delay() -> f64 {
    4.0
}
