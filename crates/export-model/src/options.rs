//! User-tunable exporter options.
//!
//! Options are consumed read-only when a session starts. Which options are
//! meaningful depends on other options (a quality preset makes the explicit
//! bitrate irrelevant, disabling audio makes every audio option irrelevant);
//! that dependency is expressed as the static [`FIELD_RULES`] table rather
//! than as change subscriptions between fields.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::settings::SettingsError;

/// Video codecs the exporter can request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[default]
    Avc,
    /// H.265 / HEVC.
    Hevc,
    Vp9,
    Av1,
    Vp8,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 5] = [
        VideoCodec::Avc,
        VideoCodec::Hevc,
        VideoCodec::Vp9,
        VideoCodec::Av1,
        VideoCodec::Vp8,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::Avc => "avc",
            VideoCodec::Hevc => "hevc",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Av1 => "av1",
            VideoCodec::Vp8 => "vp8",
        }
    }

    /// Relative bitrate needed for equal perceived quality (AVC = 1.0).
    fn efficiency(self) -> f64 {
        match self {
            VideoCodec::Avc => 1.0,
            VideoCodec::Hevc => 0.6,
            VideoCodec::Vp9 => 0.6,
            VideoCodec::Av1 => 0.4,
            VideoCodec::Vp8 => 1.2,
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoCodec::ALL
            .into_iter()
            .find(|codec| codec.as_str() == s)
            .ok_or_else(|| SettingsError::ValidationError {
                message: format!("Unknown video codec: {s}. Use: avc, hevc, vp9, av1, vp8"),
            })
    }
}

/// Audio codecs the exporter can request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
    Opus,
    Mp3,
    Vorbis,
    Flac,
}

impl AudioCodec {
    pub const ALL: [AudioCodec; 5] = [
        AudioCodec::Aac,
        AudioCodec::Opus,
        AudioCodec::Mp3,
        AudioCodec::Vorbis,
        AudioCodec::Flac,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "opus",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
        }
    }

    /// Lossless codecs ignore the bitrate entirely.
    pub fn is_lossless(self) -> bool {
        matches!(self, AudioCodec::Flac)
    }

    fn efficiency(self) -> f64 {
        match self {
            AudioCodec::Aac => 1.0,
            AudioCodec::Opus => 0.6,
            AudioCodec::Mp3 => 1.3,
            AudioCodec::Vorbis => 1.0,
            AudioCodec::Flac => 1.0,
        }
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioCodec::ALL
            .into_iter()
            .find(|codec| codec.as_str() == s)
            .ok_or_else(|| SettingsError::ValidationError {
                message: format!("Unknown audio codec: {s}. Use: aac, opus, mp3, vorbis, flac"),
            })
    }
}

/// Quality preset, or `Custom` to use the explicit bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    VeryHigh,
    #[default]
    High,
    Medium,
    Low,
    VeryLow,
    Custom,
}

/// Reference video bitrate: AVC at 1920x1080, 30fps, medium quality.
const VIDEO_REFERENCE_BPS: f64 = 3_000_000.0;
const VIDEO_REFERENCE_PIXELS: f64 = 1920.0 * 1080.0;
const VIDEO_REFERENCE_FPS: f64 = 30.0;
/// Reference audio bitrate: AAC stereo, medium quality.
const AUDIO_REFERENCE_BPS: f64 = 128_000.0;

impl QualityPreset {
    /// Bitrate multiplier relative to `Medium`; `None` for `Custom`.
    pub fn factor(self) -> Option<f64> {
        match self {
            QualityPreset::VeryHigh => Some(4.0),
            QualityPreset::High => Some(2.0),
            QualityPreset::Medium => Some(1.0),
            QualityPreset::Low => Some(0.6),
            QualityPreset::VeryLow => Some(0.3),
            QualityPreset::Custom => None,
        }
    }

    /// Video bitrate in bits/s for this preset.
    ///
    /// Scales sub-linearly with pixel count and linearly with frame rate.
    pub fn video_bitrate(self, codec: VideoCodec, width: u32, height: u32, fps: f64) -> Option<u32> {
        let factor = self.factor()?;
        let pixels = (width as f64 * height as f64).max(1.0);
        let resolution_scale = (pixels / VIDEO_REFERENCE_PIXELS).powf(0.95);
        let fps_scale = (fps / VIDEO_REFERENCE_FPS).max(0.1);
        let bps = VIDEO_REFERENCE_BPS * resolution_scale * fps_scale * codec.efficiency() * factor;
        Some(round_bitrate(bps.max(100_000.0)))
    }

    /// Audio bitrate in bits/s for this preset.
    pub fn audio_bitrate(self, codec: AudioCodec) -> Option<u32> {
        let factor = self.factor()?;
        let bps = AUDIO_REFERENCE_BPS * codec.efficiency() * factor;
        Some(round_bitrate(bps.clamp(32_000.0, 512_000.0)))
    }
}

fn round_bitrate(bps: f64) -> u32 {
    ((bps / 1000.0).round() * 1000.0) as u32
}

/// Exporter options, as chosen in the host's settings UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterOptions {
    pub video_codec: VideoCodec,
    pub video_quality: QualityPreset,
    /// Explicit video bitrate in bits/s, used when quality is `Custom`.
    pub video_bitrate: u32,

    pub include_audio: bool,
    /// Linear gain applied to the exported audio, in `[0.0, 2.0]`.
    pub audio_volume: f64,
    pub audio_codec: AudioCodec,
    pub audio_quality: QualityPreset,
    /// Explicit audio bitrate in bits/s, used when quality is `Custom`.
    pub audio_bitrate: u32,

    /// Finalize a partial export when the render is aborted.
    pub render_on_abort: bool,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::Avc,
            video_quality: QualityPreset::High,
            video_bitrate: 0,
            include_audio: true,
            audio_volume: 1.0,
            audio_codec: AudioCodec::Aac,
            audio_quality: QualityPreset::High,
            audio_bitrate: 0,
            render_on_abort: true,
        }
    }
}

pub const MIN_AUDIO_VOLUME: f64 = 0.0;
pub const MAX_AUDIO_VOLUME: f64 = 2.0;

impl ExporterOptions {
    /// Effective video bitrate for the given output geometry.
    pub fn resolve_video_bitrate(&self, width: u32, height: u32, fps: f64) -> u32 {
        self.video_quality
            .video_bitrate(self.video_codec, width, height, fps)
            .unwrap_or(self.video_bitrate)
    }

    /// Effective audio bitrate.
    pub fn resolve_audio_bitrate(&self) -> u32 {
        self.audio_quality
            .audio_bitrate(self.audio_codec)
            .unwrap_or(self.audio_bitrate)
    }

    /// Check option values that the encoder cannot be asked to fix.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.audio_volume.is_finite()
            || !(MIN_AUDIO_VOLUME..=MAX_AUDIO_VOLUME).contains(&self.audio_volume)
        {
            return Err(SettingsError::ValidationError {
                message: format!(
                    "audio volume {} is outside [{MIN_AUDIO_VOLUME}, {MAX_AUDIO_VOLUME}]",
                    self.audio_volume
                ),
            });
        }

        if self.video_quality == QualityPreset::Custom && self.video_bitrate == 0 {
            return Err(SettingsError::ValidationError {
                message: "custom video quality requires a video bitrate".to_string(),
            });
        }

        if self.include_audio
            && self.audio_quality == QualityPreset::Custom
            && self.audio_bitrate == 0
            && !self.audio_codec.is_lossless()
        {
            return Err(SettingsError::ValidationError {
                message: "custom audio quality requires an audio bitrate".to_string(),
            });
        }

        Ok(())
    }

    /// Fields that are currently irrelevant given the other options.
    pub fn disabled_fields(&self) -> BTreeSet<OptionField> {
        FIELD_RULES
            .iter()
            .filter(|rule| (rule.predicate)(self))
            .flat_map(|rule| rule.disables.iter().copied())
            .collect()
    }

    /// Whether a single field is currently enabled.
    pub fn is_enabled(&self, field: OptionField) -> bool {
        !self.disabled_fields().contains(&field)
    }
}

/// Names of the exporter option fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionField {
    VideoCodec,
    VideoQuality,
    VideoBitrate,
    IncludeAudio,
    AudioVolume,
    AudioCodec,
    AudioQuality,
    AudioBitrate,
    RenderOnAbort,
}

impl OptionField {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionField::VideoCodec => "video codec",
            OptionField::VideoQuality => "video quality",
            OptionField::VideoBitrate => "video bitrate",
            OptionField::IncludeAudio => "include audio",
            OptionField::AudioVolume => "audio volume",
            OptionField::AudioCodec => "audio codec",
            OptionField::AudioQuality => "audio quality",
            OptionField::AudioBitrate => "audio bitrate",
            OptionField::RenderOnAbort => "render on abort",
        }
    }
}

/// One row of the option dependency table.
///
/// When `predicate` holds for the current options, every field in
/// `disables` is disabled. `field` names the option whose value drives the
/// rule.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: OptionField,
    pub disables: &'static [OptionField],
    pub predicate: fn(&ExporterOptions) -> bool,
}

fn video_quality_is_preset(options: &ExporterOptions) -> bool {
    options.video_quality != QualityPreset::Custom
}

fn audio_excluded(options: &ExporterOptions) -> bool {
    !options.include_audio
}

fn audio_quality_is_preset(options: &ExporterOptions) -> bool {
    options.audio_quality != QualityPreset::Custom
}

/// Option dependency table, evaluated in full on every change.
pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: OptionField::VideoQuality,
        disables: &[OptionField::VideoBitrate],
        predicate: video_quality_is_preset,
    },
    FieldRule {
        field: OptionField::IncludeAudio,
        disables: &[
            OptionField::AudioVolume,
            OptionField::AudioCodec,
            OptionField::AudioQuality,
            OptionField::AudioBitrate,
        ],
        predicate: audio_excluded,
    },
    FieldRule {
        field: OptionField::AudioQuality,
        disables: &[OptionField::AudioBitrate],
        predicate: audio_quality_is_preset,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_disable_only_bitrates() {
        let options = ExporterOptions::default();
        let disabled = options.disabled_fields();
        assert_eq!(
            disabled,
            BTreeSet::from([OptionField::VideoBitrate, OptionField::AudioBitrate])
        );
    }

    #[test]
    fn test_custom_quality_enables_bitrate() {
        let options = ExporterOptions {
            video_quality: QualityPreset::Custom,
            video_bitrate: 5_000_000,
            ..Default::default()
        };
        assert!(options.is_enabled(OptionField::VideoBitrate));
        assert!(!options.is_enabled(OptionField::AudioBitrate));
    }

    #[test]
    fn test_excluding_audio_disables_all_audio_fields() {
        let options = ExporterOptions {
            include_audio: false,
            audio_quality: QualityPreset::Custom,
            ..Default::default()
        };
        let disabled = options.disabled_fields();
        for field in [
            OptionField::AudioVolume,
            OptionField::AudioCodec,
            OptionField::AudioQuality,
            OptionField::AudioBitrate,
        ] {
            assert!(disabled.contains(&field), "{} should be disabled", field.as_str());
        }
        assert!(!disabled.contains(&OptionField::RenderOnAbort));
    }

    #[test]
    fn test_rule_table_rows_name_their_driver() {
        for rule in FIELD_RULES {
            assert!(!rule.disables.is_empty());
            assert!(!rule.disables.contains(&rule.field));
        }
    }

    #[test]
    fn test_preset_bitrates_are_ordered() {
        let presets = [
            QualityPreset::VeryLow,
            QualityPreset::Low,
            QualityPreset::Medium,
            QualityPreset::High,
            QualityPreset::VeryHigh,
        ];
        let bitrates: Vec<u32> = presets
            .iter()
            .map(|p| p.video_bitrate(VideoCodec::Avc, 1920, 1080, 30.0).unwrap())
            .collect();
        assert!(bitrates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(bitrates[2], 3_000_000);
    }

    #[test]
    fn test_efficient_codecs_need_fewer_bits() {
        let avc = QualityPreset::High.video_bitrate(VideoCodec::Avc, 1280, 720, 60.0);
        let av1 = QualityPreset::High.video_bitrate(VideoCodec::Av1, 1280, 720, 60.0);
        assert!(av1 < avc);
    }

    #[test]
    fn test_custom_bitrate_is_used_verbatim() {
        let options = ExporterOptions {
            audio_quality: QualityPreset::Custom,
            audio_bitrate: 96_000,
            ..Default::default()
        };
        assert_eq!(options.resolve_audio_bitrate(), 96_000);
        assert_eq!(
            options.resolve_video_bitrate(1920, 1080, 30.0),
            QualityPreset::High
                .video_bitrate(VideoCodec::Avc, 1920, 1080, 30.0)
                .unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let options = ExporterOptions {
            audio_volume: 2.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let silent = ExporterOptions {
            audio_volume: 0.0,
            ..Default::default()
        };
        assert!(silent.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_custom_bitrate() {
        let options = ExporterOptions {
            video_quality: QualityPreset::Custom,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_codec_parsing() {
        assert_eq!("hevc".parse::<VideoCodec>().unwrap(), VideoCodec::Hevc);
        assert_eq!("opus".parse::<AudioCodec>().unwrap(), AudioCodec::Opus);
        assert!("h264".parse::<VideoCodec>().is_err());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let parsed: ExporterOptions =
            serde_json::from_str(r#"{"video_codec":"vp9","render_on_abort":false}"#).unwrap();
        assert_eq!(parsed.video_codec, VideoCodec::Vp9);
        assert!(!parsed.render_on_abort);
        assert!(parsed.include_audio);
        assert_eq!(parsed.audio_quality, QualityPreset::High);
    }
}
