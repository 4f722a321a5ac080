use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// One of `image`, `video` or `camera`.
    #[serde(default = "default_source_kind")]
    pub kind: String,
    /// Required for `image` and `video`, ignored for `camera`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_device")]
    pub device: String,
    /// ffmpeg input format used to open the device (`v4l2`, `avfoundation`, `dshow`).
    #[serde(default = "default_camera_input_format")]
    pub input_format: String,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            input_format: default_camera_input_format(),
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FfmpegConfig {
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg_bin(),
            ffprobe: default_ffprobe_bin(),
        }
    }
}

/// A stage option given either by name (`"cross"`) or by numeric id (`1`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    Id(i64),
    Name(String),
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Name(name.to_string())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Id(id) => write!(f, "{id}"),
            Selector::Name(name) => f.write_str(name),
        }
    }
}

/// One pipeline stage as written in the config file.
///
/// Options are kept unresolved here; the pipeline crate maps them and
/// reports unknown values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    SaltAndPepper {
        probability: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
    Erode {
        #[serde(default = "default_kernel_shape")]
        shape: Selector,
        #[serde(default = "default_kernel_size")]
        size: u32,
    },
    Flip {
        #[serde(default = "default_flip_axis")]
        axis: Selector,
    },
    Equalize,
    LowPass {
        #[serde(default = "default_low_pass_filter")]
        filter: Selector,
        #[serde(default = "default_kernel_size")]
        size: u32,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Stop after this many output frames have been written.
    #[serde(default)]
    pub max_frames: Option<u64>,
    #[serde(default = "default_stop_at_end_of_stream")]
    pub stop_at_end_of_stream: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            max_frames: None,
            stop_at_end_of_stream: default_stop_at_end_of_stream(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_source_kind() -> String {
    "image".into()
}
fn default_camera_device() -> String {
    "/dev/video0".into()
}
fn default_camera_input_format() -> String {
    "v4l2".into()
}
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}
fn default_ffmpeg_bin() -> String {
    "ffmpeg".into()
}
fn default_ffprobe_bin() -> String {
    "ffprobe".into()
}
fn default_kernel_shape() -> Selector {
    Selector::from("rect")
}
fn default_kernel_size() -> u32 {
    3
}
fn default_flip_axis() -> Selector {
    Selector::from("horizontal")
}
fn default_low_pass_filter() -> Selector {
    Selector::from("box")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_stop_at_end_of_stream() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
