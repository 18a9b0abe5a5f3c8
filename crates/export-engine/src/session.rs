//! Export session lifecycle.
//!
//! ```text
//! Idle ──start──▶ Running ──stop──▶ Finalizing ──▶ Done
//!   │               │
//!   │ (start fails) └─abort, render_on_abort = false─▶ Canceling ──stop──▶ Canceled
//!   └──────────────▶ Done
//! ```
//!
//! Transitions only move forward. Every method takes `&mut self`, so calls
//! on one session never overlap.

use std::sync::Arc;

use framecast_common::clock::{DriftMeasurement, FrameClock};
use framecast_common::error::{ExportError, ExportResult, TrackKind};
use framecast_export_model::{ExportSettings, RasterFrame, RasterSurface};
use serde::Serialize;

use crate::decode::AudioDecoder;
use crate::delivery::{ArtifactDelivery, ExportArtifact};
use crate::feed::VideoFrameFeed;
use crate::signal::AbortSignal;
use crate::sink::{AudioSink, AudioTrackSpec, ContainerWriter, MediaBackend, OutputSpec};
use crate::trim::trim;

/// State of an export session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing opened yet.
    Idle,
    /// Accepting frames.
    Running,
    /// Aborted without render-on-abort; frames are dropped until `stop`.
    Canceling,
    /// Stopped after a cancel; no artifact.
    Canceled,
    /// `stop` is closing tracks and finalizing the container.
    Finalizing,
    /// Terminal. Either an artifact was delivered or the export failed.
    Done,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Canceled | SessionState::Done)
    }
}

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionComponents {
    pub backend: Arc<dyn MediaBackend>,
    pub decoder: Arc<dyn AudioDecoder>,
    pub delivery: Arc<dyn ArtifactDelivery>,
}

/// Session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    /// Frames forwarded to the video sink.
    pub frames_submitted: u64,
    /// Frames dropped for abort, cancel or ordering.
    pub frames_dropped: u64,
    /// Audio frames handed to the audio sink.
    pub audio_frames_written: u64,
}

/// One export, from `start` to `stop`.
pub struct ExportSession {
    settings: ExportSettings,
    components: SessionComponents,
    state: SessionState,
    clock: FrameClock,
    include_audio: bool,
    feed: Option<VideoFrameFeed>,
    audio_sink: Option<Box<dyn AudioSink>>,
    writer: Option<Box<dyn ContainerWriter>>,
    last_frame_index: Option<i64>,
    frames_dropped: u64,
    audio_frames_written: u64,
}

impl ExportSession {
    /// Create a session. Nothing is opened until [`start`](Self::start).
    pub fn new(settings: ExportSettings, components: SessionComponents) -> ExportResult<Self> {
        if !settings.range.is_valid() {
            return Err(ExportError::invalid_range(
                settings.range.start_secs,
                settings.range.end_secs,
            ));
        }
        settings
            .validate()
            .map_err(|e| ExportError::invalid_settings(e.to_string()))?;

        let include_audio = settings.exports_audio();
        if settings.options.include_audio && !include_audio {
            tracing::debug!("Project has no audio track, exporting video only");
        }

        Ok(Self {
            clock: FrameClock::new(settings.fps, settings.range.start_secs),
            settings,
            components,
            state: SessionState::Idle,
            include_audio,
            feed: None,
            audio_sink: None,
            writer: None,
            last_frame_index: None,
            frames_dropped: 0,
            audio_frames_written: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Whether this session exports an audio track.
    pub fn includes_audio(&self) -> bool {
        self.include_audio
    }

    pub fn stats(&self) -> SessionStats {
        let feed = self.feed.as_ref().map(VideoFrameFeed::stats).unwrap_or_default();
        SessionStats {
            state: self.state,
            frames_submitted: feed.frames_forwarded,
            frames_dropped: self.frames_dropped + feed.frames_cancelled,
            audio_frames_written: self.audio_frames_written,
        }
    }

    /// Check encoder support and open the output.
    ///
    /// A failure moves the session straight to `Done`.
    pub async fn start(&mut self) -> ExportResult<()> {
        if self.state != SessionState::Idle {
            return Err(ExportError::sink_unavailable(format!(
                "session already started (state {:?})",
                self.state
            )));
        }

        if let Err(e) = self.open_output().await {
            tracing::error!(error = %e, "Failed to start export");
            self.state = SessionState::Done;
            return Err(e);
        }

        self.state = SessionState::Running;
        Ok(())
    }

    async fn open_output(&mut self) -> ExportResult<()> {
        let backend = Arc::clone(&self.components.backend);
        let options = &self.settings.options;
        let size = self.settings.scaled_size();

        let video_bitrate = options.resolve_video_bitrate(size.width, size.height, self.settings.fps);
        if !backend.can_encode_video(options.video_codec, video_bitrate).await {
            return Err(ExportError::codec_unsupported(
                TrackKind::Video,
                format!(
                    "{} backend cannot encode {} at {} bps",
                    backend.name(),
                    options.video_codec.as_str(),
                    video_bitrate
                ),
            ));
        }

        let audio = if self.include_audio {
            let bitrate = options.resolve_audio_bitrate();
            if !backend.can_encode_audio(options.audio_codec, bitrate).await {
                return Err(ExportError::codec_unsupported(
                    TrackKind::Audio,
                    format!(
                        "{} backend cannot encode {} at {} bps",
                        backend.name(),
                        options.audio_codec.as_str(),
                        bitrate
                    ),
                ));
            }
            Some(AudioTrackSpec {
                codec: options.audio_codec,
                bitrate,
            })
        } else {
            None
        };

        tracing::info!(
            backend = backend.name(),
            width = size.width,
            height = size.height,
            fps = self.settings.fps,
            video_codec = options.video_codec.as_str(),
            video_bitrate,
            audio = self.include_audio,
            range_start = self.settings.range.start_secs,
            range_end = self.settings.range.end_secs,
            frame_index_offset = self.clock.frame_index_offset(),
            "Starting render"
        );

        let output = backend
            .open(&OutputSpec {
                width: size.width,
                height: size.height,
                fps: self.settings.fps,
                video_codec: options.video_codec,
                video_bitrate,
                audio,
            })
            .await?;

        if self.include_audio && output.audio.is_none() {
            tracing::warn!("Backend opened no audio track, exporting video only");
            self.include_audio = false;
        }

        self.feed = Some(VideoFrameFeed::new(
            self.clock,
            RasterSurface::new(size.width, size.height),
            output.video,
        ));
        self.audio_sink = output.audio;
        self.writer = Some(output.writer);
        Ok(())
    }

    /// Accept one rendered frame.
    ///
    /// The abort signal is read once, before anything else. Frames that would
    /// break timestamp ordering are dropped with a warning.
    pub async fn handle_frame(
        &mut self,
        frame: &RasterFrame,
        render_frame_index: i64,
        abort: &AbortSignal,
    ) -> ExportResult<()> {
        match self.state {
            SessionState::Running => {}
            SessionState::Canceling => {
                self.frames_dropped += 1;
                return Ok(());
            }
            state => {
                tracing::error!(?state, render_frame_index, "Frame received outside of a running export");
                return Err(ExportError::sink_unavailable(format!(
                    "cannot accept frames in state {state:?}"
                )));
            }
        }

        let Some(feed) = self.feed.as_mut() else {
            tracing::error!(render_frame_index, "Running export has no video feed");
            return Err(ExportError::sink_unavailable("video feed is not open"));
        };

        if abort.is_aborted() {
            if self.settings.options.render_on_abort {
                return feed.submit_frame(frame, render_frame_index, true).await;
            }
            tracing::info!(render_frame_index, "Render aborted, canceling export");
            self.state = SessionState::Canceling;
            self.frames_dropped += 1;
            return Ok(());
        }

        let offset = self.clock.frame_index_offset();
        let out_of_order = self
            .last_frame_index
            .is_some_and(|last| render_frame_index <= last);
        if render_frame_index < offset || out_of_order {
            tracing::warn!(
                render_frame_index,
                frame_index_offset = offset,
                last_frame_index = ?self.last_frame_index,
                "Dropping frame outside export order"
            );
            self.frames_dropped += 1;
            return Ok(());
        }

        if let Err(e) = feed.submit_frame(frame, render_frame_index, false).await {
            tracing::error!(error = %e, render_frame_index, "Failed to submit frame");
            return Err(e);
        }
        self.last_frame_index = Some(render_frame_index);
        Ok(())
    }

    /// End the export.
    ///
    /// Returns the delivered artifact, or `None` when the export was
    /// canceled.
    pub async fn stop(&mut self) -> ExportResult<Option<ExportArtifact>> {
        match self.state {
            SessionState::Canceling => {
                self.release().await;
                self.state = SessionState::Canceled;
                tracing::info!(stats = ?self.stats(), "Export canceled");
                Ok(None)
            }
            SessionState::Running => self.finalize().await.map(Some),
            state => {
                self.release().await;
                tracing::error!(?state, "Stop requested with no running export");
                Err(ExportError::sink_unavailable(format!(
                    "no output available in state {state:?}"
                )))
            }
        }
    }

    async fn finalize(&mut self) -> ExportResult<ExportArtifact> {
        self.state = SessionState::Finalizing;
        tracing::info!("Finalizing render");

        if let Some(feed) = self.feed.as_mut() {
            if let Err(e) = feed.close().await {
                self.release().await;
                self.state = SessionState::Done;
                return Err(ExportError::finalize_failed(format!(
                    "failed to close video track: {e}"
                )));
            }
        }

        if self.include_audio {
            self.mix_audio().await;
        }
        if let Some(mut sink) = self.audio_sink.take() {
            if let Err(e) = sink.close().await {
                tracing::error!(error = %e, "Failed to close audio track");
            }
        }

        self.log_drift();

        let result = match self.writer.take() {
            Some(mut writer) => writer.finalize().await,
            None => Ok(None),
        };
        self.state = SessionState::Done;

        let bytes = match result {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::error!("Container writer produced no output");
                return Err(ExportError::finalize_failed(
                    "container writer produced no output",
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "Container finalize failed");
                return Err(ExportError::finalize_failed(e.to_string()));
            }
        };

        let artifact = ExportArtifact::mp4(self.settings.file_name(), bytes);
        self.components.delivery.deliver(&artifact).await?;

        tracing::info!(
            file_name = %artifact.file_name,
            bytes = artifact.len(),
            stats = ?self.stats(),
            "Export complete"
        );
        Ok(artifact)
    }

    /// Decode, trim and submit the project audio once.
    ///
    /// Failures are logged and the export continues without audio.
    async fn mix_audio(&mut self) {
        let Some(audio) = self.settings.audio.clone() else {
            return;
        };
        let Some(sink) = self.audio_sink.as_mut() else {
            return;
        };
        tracing::info!(path = %audio.path.display(), offset_secs = audio.offset_secs, "Including audio");

        let source = match self.components.decoder.decode(&audio.path).await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "Failed to decode project audio, continuing without audio");
                return;
            }
        };

        let trimmed = match trim(
            &source,
            self.settings.range.start_secs,
            self.settings.range.end_secs,
            audio.offset_secs,
            self.settings.options.audio_volume,
        ) {
            Ok(trimmed) => trimmed,
            Err(e) => {
                tracing::error!(error = %e, "Failed to trim project audio, continuing without audio");
                return;
            }
        };

        match sink.add(&trimmed).await {
            Ok(()) => self.audio_frames_written = trimmed.frame_count() as u64,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode project audio, continuing without audio");
            }
        }
    }

    fn log_drift(&self) {
        let Some(last) = self.last_frame_index else {
            return;
        };
        let frames = (last - self.clock.frame_index_offset() + 1) as f64;
        let drift = DriftMeasurement {
            reference_secs: self.settings.range.duration_secs(),
            measured_secs: frames * self.clock.frame_duration_secs(),
        };
        let threshold_ms = self.clock.frame_duration_secs() * 1000.0;
        if drift.exceeds_threshold_ms(threshold_ms) {
            tracing::warn!(
                drift_ms = drift.drift_ms(),
                video_secs = drift.measured_secs,
                range_secs = drift.reference_secs,
                "Video track length differs from export range"
            );
        } else {
            tracing::debug!(drift_ms = drift.drift_ms(), "Video track covers export range");
        }
    }

    /// Close sinks and cancel the writer, logging failures.
    async fn release(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            if let Err(e) = feed.close().await {
                tracing::warn!(error = %e, "Failed to close video track");
            }
            // keep counters visible through stats()
            self.feed = Some(feed);
        }
        if let Some(mut sink) = self.audio_sink.take() {
            if let Err(e) = sink.close().await {
                tracing::warn!(error = %e, "Failed to close audio track");
            }
        }
        if let Some(mut writer) = self.writer.take() {
            writer.cancel().await;
        }
    }
}

// Sinks and writer are released by their own field drops after this runs
// (the ffmpeg children are `kill_on_drop`, the scratch `TempDir` is removed).
impl Drop for ExportSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Running | SessionState::Canceling) {
            tracing::warn!(state = ?self.state, "Export session dropped before stop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::WavDecoder;
    use crate::delivery::CollectingDelivery;
    use crate::memory::MemoryBackend;
    use framecast_common::error::ErrorKind;
    use framecast_export_model::{ExportRange, VideoCodec};

    fn components(backend: MemoryBackend) -> (SessionComponents, CollectingDelivery) {
        let delivery = CollectingDelivery::new();
        (
            SessionComponents {
                backend: Arc::new(backend),
                decoder: Arc::new(WavDecoder::new()),
                delivery: Arc::new(delivery.clone()),
            },
            delivery,
        )
    }

    fn settings() -> ExportSettings {
        let mut settings = ExportSettings::new("clip", 4, 4, 10.0);
        settings.range = ExportRange::new(1.0, 2.0);
        settings
    }

    fn frame() -> RasterFrame {
        RasterFrame::filled(4, 4, [20, 40, 60, 255]).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        let mut s = settings();
        s.range = ExportRange::new(3.0, 1.0);
        let (c, _) = components(MemoryBackend::new());
        let err = ExportSession::new(s, c).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn test_new_rejects_bad_volume() {
        let mut s = settings();
        s.options.audio_volume = 3.0;
        let (c, _) = components(MemoryBackend::new());
        let err = ExportSession::new(s, c).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidSettings);
    }

    #[test]
    fn test_audio_disabled_without_track() {
        let (c, _) = components(MemoryBackend::new());
        let session = ExportSession::new(settings(), c).unwrap();
        assert!(session.settings().options.include_audio);
        assert!(!session.includes_audio());
        assert_eq!(session.clock().frame_index_offset(), 10);
    }

    #[tokio::test]
    async fn test_unsupported_codec_fails_start() {
        let backend = MemoryBackend::new().with_video_codecs(&[VideoCodec::Vp9]);
        let (c, _) = components(backend.clone());
        let mut session = ExportSession::new(settings(), c).unwrap();

        let err = session.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CodecUnsupported);
        assert_eq!(session.state(), SessionState::Done);
        assert!(backend.record().opened.is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (c, _) = components(MemoryBackend::new());
        let mut session = ExportSession::new(settings(), c).unwrap();
        session.start().await.unwrap();
        let err = session.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkUnavailable);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_frame_before_start_is_sink_unavailable() {
        let (c, _) = components(MemoryBackend::new());
        let mut session = ExportSession::new(settings(), c).unwrap();
        let err = session
            .handle_frame(&frame(), 10, &AbortSignal::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkUnavailable);
    }

    #[tokio::test]
    async fn test_out_of_order_frames_dropped() {
        let backend = MemoryBackend::new();
        let (c, _) = components(backend.clone());
        let mut session = ExportSession::new(settings(), c).unwrap();
        session.start().await.unwrap();
        let abort = AbortSignal::new();

        for index in [5, 10, 11, 11, 9, 12] {
            session.handle_frame(&frame(), index, &abort).await.unwrap();
        }

        let stats = session.stats();
        assert_eq!(stats.frames_submitted, 3);
        assert_eq!(stats.frames_dropped, 3);
        let timestamps: Vec<f64> = backend
            .record()
            .frames
            .iter()
            .map(|f| f.timestamp_secs)
            .collect();
        assert_eq!(timestamps.len(), 3);
        assert_eq!(timestamps[0], 0.0);
        assert!(timestamps.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn test_abort_with_render_on_abort_still_finalizes() {
        let backend = MemoryBackend::new();
        let (c, delivery) = components(backend.clone());
        let mut session = ExportSession::new(settings(), c).unwrap();
        session.start().await.unwrap();
        let abort = AbortSignal::new();

        session.handle_frame(&frame(), 10, &abort).await.unwrap();
        abort.abort();
        session.handle_frame(&frame(), 11, &abort).await.unwrap();
        assert_eq!(session.state(), SessionState::Running);

        let artifact = session.stop().await.unwrap().unwrap();
        assert_eq!(artifact.file_name, "clip.mp4");
        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(backend.record().frames.len(), 1);
        assert_eq!(delivery.artifacts().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_finalize_is_finalize_failed() {
        let backend = MemoryBackend::new().without_output();
        let (c, delivery) = components(backend);
        let mut session = ExportSession::new(settings(), c).unwrap();
        session.start().await.unwrap();
        session
            .handle_frame(&frame(), 10, &AbortSignal::new())
            .await
            .unwrap();

        let err = session.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FinalizeFailed);
        assert_eq!(session.state(), SessionState::Done);
        assert!(delivery.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_stop_from_idle_is_sink_unavailable() {
        let (c, _) = components(MemoryBackend::new());
        let mut session = ExportSession::new(settings(), c).unwrap();
        let err = session.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkUnavailable);
    }

    #[tokio::test]
    async fn test_stop_twice_is_sink_unavailable() {
        let (c, _) = components(MemoryBackend::new());
        let mut session = ExportSession::new(settings(), c).unwrap();
        session.start().await.unwrap();
        session.stop().await.unwrap();
        let err = session.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkUnavailable);
        assert_eq!(session.state(), SessionState::Done);
    }
}
