//! Export settings supplied by the host at session start.
//!
//! Settings are read-only for the lifetime of a session. They are stored as
//! JSON so the command line front end can drive exports from a file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::options::ExporterOptions;

/// Everything a session needs to know before the first frame arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Output name; the delivered file is `<name>.mp4`.
    pub name: String,

    /// Render frame rate in Hz.
    pub fps: f64,

    /// Nominal output size before `resolution_scale` is applied.
    pub size: OutputSize,

    /// Multiplier applied to `size` for the encoded surface.
    #[serde(default = "default_resolution_scale")]
    pub resolution_scale: f64,

    /// Export range in seconds of project time.
    pub range: ExportRange,

    /// Exporter options.
    #[serde(default)]
    pub options: ExporterOptions,

    /// Project audio track, if the project has one.
    #[serde(default)]
    pub audio: Option<ProjectAudio>,
}

/// Output dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Half-open export range `[start_secs, end_secs)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Reference to the project's audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAudio {
    /// Location of the audio resource (a file path for the WAV decoder).
    pub path: PathBuf,

    /// Calibration offset: project time at which the decoded buffer's first
    /// sample plays.
    #[serde(default)]
    pub offset_secs: f64,
}

fn default_resolution_scale() -> f64 {
    1.0
}

impl ExportRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    /// Length of the range in seconds (may be non-positive for bad input).
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Whether `end > start` and both bounds are finite.
    pub fn is_valid(&self) -> bool {
        self.start_secs.is_finite() && self.end_secs.is_finite() && self.end_secs > self.start_secs
    }
}

impl ExportSettings {
    /// Create settings with default options and no audio.
    pub fn new(name: impl Into<String>, width: u32, height: u32, fps: f64) -> Self {
        Self {
            name: name.into(),
            fps,
            size: OutputSize { width, height },
            resolution_scale: 1.0,
            range: ExportRange::new(0.0, 10.0),
            options: ExporterOptions::default(),
            audio: None,
        }
    }

    /// Size of the encoded surface after applying `resolution_scale`.
    pub fn scaled_size(&self) -> OutputSize {
        let scale = |v: u32| ((v as f64 * self.resolution_scale).round() as u32).max(1);
        OutputSize {
            width: scale(self.size.width),
            height: scale(self.size.height),
        }
    }

    /// Suggested file name for the delivered artifact.
    pub fn file_name(&self) -> String {
        format!("{}.mp4", self.name)
    }

    /// Whether audio will actually be exported.
    ///
    /// Audio requires both the option and a project audio track.
    pub fn exports_audio(&self) -> bool {
        self.options.include_audio && self.audio.is_some()
    }

    /// Validate all settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.range.is_valid() {
            return Err(SettingsError::ValidationError {
                message: format!(
                    "range end ({}) must be greater than start ({})",
                    self.range.end_secs, self.range.start_secs
                ),
            });
        }

        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(SettingsError::ValidationError {
                message: format!("frame rate must be positive, got {}", self.fps),
            });
        }

        if self.size.width == 0 || self.size.height == 0 {
            return Err(SettingsError::ValidationError {
                message: format!(
                    "output size must be non-zero, got {}x{}",
                    self.size.width, self.size.height
                ),
            });
        }

        if !self.resolution_scale.is_finite() || self.resolution_scale <= 0.0 {
            return Err(SettingsError::ValidationError {
                message: format!(
                    "resolution scale must be positive, got {}",
                    self.resolution_scale
                ),
            });
        }

        if self.name.trim().is_empty() {
            return Err(SettingsError::ValidationError {
                message: "output name must not be empty".to_string(),
            });
        }

        if !is_plain_file_name(&self.name) {
            return Err(SettingsError::ValidationError {
                message: format!(
                    "output name must be a plain file name, got {:?}",
                    self.name
                ),
            });
        }

        if let Some(audio) = &self.audio {
            if !audio.offset_secs.is_finite() {
                return Err(SettingsError::ValidationError {
                    message: "audio offset must be finite".to_string(),
                });
            }
        }

        self.options.validate()
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| SettingsError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| SettingsError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save settings to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SettingsError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| SettingsError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when working with settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid settings: {message}")]
    ValidationError { message: String },
}

/// True when `name` is a single path component other than `.` or `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}
