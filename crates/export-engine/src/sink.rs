//! Encoder backend traits.
//!
//! A [`MediaBackend`] answers capability queries and opens one output: a
//! video sink, an optional audio sink and the container writer that muxes
//! them. Each handle is exclusively owned by the session that opened it.

use framecast_common::error::ExportResult;
use framecast_export_model::{
    AudioCodec, QualityPreset, RasterSurface, TrimmedAudioBuffer, VideoCodec,
};

/// Parameters for opening an output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    /// Encoded frame width in pixels.
    pub width: u32,

    /// Encoded frame height in pixels.
    pub height: u32,

    /// Frame rate in Hz.
    pub fps: f64,

    pub video_codec: VideoCodec,

    /// Resolved video bitrate in bits per second.
    pub video_bitrate: u32,

    /// Audio track parameters; `None` opens a video-only output.
    pub audio: Option<AudioTrackSpec>,
}

/// Parameters of the audio track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioTrackSpec {
    pub codec: AudioCodec,

    /// Resolved audio bitrate in bits per second.
    pub bitrate: u32,
}

/// Handles returned by [`MediaBackend::open`].
pub struct OpenedOutput {
    pub video: Box<dyn VideoSink>,
    pub audio: Option<Box<dyn AudioSink>>,
    pub writer: Box<dyn ContainerWriter>,
}

/// An encoder implementation.
#[async_trait::async_trait]
pub trait MediaBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether the backend accepts this video configuration.
    async fn can_encode_video(&self, codec: VideoCodec, bitrate: u32) -> bool;

    /// Whether the backend accepts this audio configuration.
    async fn can_encode_audio(&self, codec: AudioCodec, bitrate: u32) -> bool;

    /// Open an output with one video track and, if requested, one audio track.
    async fn open(&self, spec: &OutputSpec) -> ExportResult<OpenedOutput>;
}

/// Consumer of encoded video frames.
#[async_trait::async_trait]
pub trait VideoSink: Send {
    /// Encode the current surface contents at `timestamp_secs` for
    /// `duration_secs`. Timestamps are non-negative and non-decreasing.
    async fn add(
        &mut self,
        surface: &RasterSurface,
        timestamp_secs: f64,
        duration_secs: f64,
    ) -> ExportResult<()>;

    /// Flush and close. Further `add` calls fail.
    async fn close(&mut self) -> ExportResult<()>;
}

/// Consumer of the trimmed audio track.
#[async_trait::async_trait]
pub trait AudioSink: Send {
    async fn add(&mut self, buffer: &TrimmedAudioBuffer) -> ExportResult<()>;

    async fn close(&mut self) -> ExportResult<()>;
}

/// Muxer for the output container.
#[async_trait::async_trait]
pub trait ContainerWriter: Send {
    /// Finish the container. `Ok(None)` means the muxer produced no output.
    async fn finalize(&mut self) -> ExportResult<Option<Vec<u8>>>;

    /// Discard everything written so far.
    async fn cancel(&mut self);
}

/// Codecs the backend accepts at their default quality bitrate.
///
/// Used to build codec menus; `width`, `height` and `fps` size the video
/// bitrate probe.
pub async fn encodable_codecs(
    backend: &dyn MediaBackend,
    width: u32,
    height: u32,
    fps: f64,
) -> (Vec<VideoCodec>, Vec<AudioCodec>) {
    let quality = QualityPreset::default();
    let mut video = Vec::new();
    for codec in VideoCodec::ALL {
        let bitrate = quality
            .video_bitrate(codec, width, height, fps)
            .unwrap_or_default();
        if backend.can_encode_video(codec, bitrate).await {
            video.push(codec);
        }
    }
    let mut audio = Vec::new();
    for codec in AudioCodec::ALL {
        let bitrate = quality.audio_bitrate(codec).unwrap_or_default();
        if backend.can_encode_audio(codec, bitrate).await {
            audio.push(codec);
        }
    }
    (video, audio)
}
