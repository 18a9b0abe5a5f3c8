//! Video frame feed.
//!
//! Re-zeros render-frame indices onto the output timeline, copies each raster
//! into the session's encode surface and forwards it to the video sink.

use framecast_common::clock::FrameClock;
use framecast_common::error::{ExportError, ExportResult};
use framecast_export_model::{RasterFrame, RasterSurface};
use serde::Serialize;

use crate::sink::VideoSink;

/// Counters kept by the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    /// Frames handed to the video sink.
    pub frames_forwarded: u64,

    /// Frames dropped because the caller marked them cancelled.
    pub frames_cancelled: u64,
}

/// Owns the video sink and the encode surface for one session.
pub struct VideoFrameFeed {
    clock: FrameClock,
    surface: RasterSurface,
    sink: Option<Box<dyn VideoSink>>,
    stats: FeedStats,
}

impl VideoFrameFeed {
    pub fn new(clock: FrameClock, surface: RasterSurface, sink: Box<dyn VideoSink>) -> Self {
        Self {
            clock,
            surface,
            sink: Some(sink),
            stats: FeedStats::default(),
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Whether the sink is still open.
    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Forward one rendered frame.
    ///
    /// Index ordering is the caller's responsibility. A cancelled frame is
    /// dropped without touching the sink.
    pub async fn submit_frame(
        &mut self,
        frame: &RasterFrame,
        render_frame_index: i64,
        cancelled: bool,
    ) -> ExportResult<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(ExportError::sink_unavailable("video sink is not open"));
        };

        if cancelled {
            self.stats.frames_cancelled += 1;
            return Ok(());
        }

        self.surface.draw(frame);
        let timestamp_secs = self.clock.timestamp_secs(render_frame_index);
        sink.add(
            &self.surface,
            timestamp_secs,
            self.clock.frame_duration_secs(),
        )
        .await?;
        self.stats.frames_forwarded += 1;

        tracing::trace!(render_frame_index, timestamp_secs, "Frame forwarded");
        Ok(())
    }

    /// Close the video sink. Safe to call more than once.
    pub async fn close(&mut self) -> ExportResult<()> {
        match self.sink.take() {
            Some(mut sink) => sink.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::sink::{MediaBackend, OutputSpec};
    use framecast_common::error::ErrorKind;
    use framecast_export_model::VideoCodec;

    async fn feed_with_backend(fps: f64, start_secs: f64) -> (VideoFrameFeed, MemoryBackend) {
        let backend = MemoryBackend::new();
        let output = backend
            .open(&OutputSpec {
                width: 2,
                height: 2,
                fps,
                video_codec: VideoCodec::Avc,
                video_bitrate: 500_000,
                audio: None,
            })
            .await
            .unwrap();
        let feed = VideoFrameFeed::new(
            FrameClock::new(fps, start_secs),
            RasterSurface::new(2, 2),
            output.video,
        );
        (feed, backend)
    }

    #[tokio::test]
    async fn test_timestamps_rezeroed_at_range_start() {
        let (mut feed, backend) = feed_with_backend(30.0, 2.0).await;
        let frame = RasterFrame::filled(2, 2, [255, 255, 255, 255]).unwrap();
        feed.submit_frame(&frame, 60, false).await.unwrap();
        feed.submit_frame(&frame, 61, false).await.unwrap();

        let frames = backend.record().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp_secs, 0.0);
        assert!((frames[1].timestamp_secs - 1.0 / 30.0).abs() < 1e-12);
        assert!((frames[0].duration_secs - 1.0 / 30.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_cancelled_frame_is_dropped() {
        let (mut feed, backend) = feed_with_backend(24.0, 0.0).await;
        let frame = RasterFrame::filled(2, 2, [0, 0, 255, 255]).unwrap();
        feed.submit_frame(&frame, 0, true).await.unwrap();
        assert!(backend.record().frames.is_empty());
        assert_eq!(feed.stats().frames_cancelled, 1);
        assert_eq!(feed.stats().frames_forwarded, 0);
    }

    #[tokio::test]
    async fn test_surface_copied_for_every_frame() {
        let (mut feed, backend) = feed_with_backend(30.0, 0.0).await;
        let red = RasterFrame::filled(2, 2, [255, 0, 0, 255]).unwrap();
        let blue = RasterFrame::filled(2, 2, [0, 0, 255, 255]).unwrap();
        feed.submit_frame(&red, 0, false).await.unwrap();
        feed.submit_frame(&blue, 1, false).await.unwrap();

        let frames = backend.record().frames;
        assert_ne!(frames[0].checksum, frames[1].checksum);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_sink_unavailable() {
        let (mut feed, backend) = feed_with_backend(30.0, 0.0).await;
        feed.close().await.unwrap();
        feed.close().await.unwrap();
        assert!(backend.record().video_closed);

        let frame = RasterFrame::filled(2, 2, [0, 0, 0, 255]).unwrap();
        let err = feed.submit_frame(&frame, 0, false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SinkUnavailable);
    }
}
