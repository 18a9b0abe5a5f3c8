//! In-memory encoder backend.
//!
//! Records every call instead of encoding. Used by tests and by
//! `framecast export --dry-run`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use framecast_common::error::{ExportError, ExportResult};
use framecast_export_model::{AudioCodec, RasterSurface, TrimmedAudioBuffer, VideoCodec};

use crate::sink::{AudioSink, ContainerWriter, MediaBackend, OpenedOutput, OutputSpec, VideoSink};

/// One frame handed to the video sink.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub timestamp_secs: f64,
    pub duration_secs: f64,
    /// Checksum of the surface at submission time.
    pub checksum: u64,
}

/// Everything the backend observed.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecord {
    pub opened: Vec<OutputSpec>,
    pub frames: Vec<RecordedFrame>,
    pub audio: Vec<TrimmedAudioBuffer>,
    pub video_closed: bool,
    pub audio_closed: bool,
    pub finalized: bool,
    pub canceled: bool,
    /// Set when the corresponding handle is dropped.
    pub video_released: bool,
    pub audio_released: bool,
    pub writer_released: bool,
}

impl MemoryRecord {
    /// Total audio frames received across all buffers.
    pub fn audio_frames(&self) -> usize {
        self.audio.iter().map(TrimmedAudioBuffer::frame_count).sum()
    }
}

/// Recording backend with configurable behavior.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    record: Arc<Mutex<MemoryRecord>>,
    video_codecs: BTreeSet<VideoCodec>,
    audio_codecs: BTreeSet<AudioCodec>,
    produce_output: bool,
    fail_audio: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend that accepts every codec and finalizes successfully.
    pub fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(MemoryRecord::default())),
            video_codecs: VideoCodec::ALL.into_iter().collect(),
            audio_codecs: AudioCodec::ALL.into_iter().collect(),
            produce_output: true,
            fail_audio: false,
        }
    }

    /// Restrict the accepted video codecs.
    pub fn with_video_codecs(mut self, codecs: &[VideoCodec]) -> Self {
        self.video_codecs = codecs.iter().copied().collect();
        self
    }

    /// Restrict the accepted audio codecs.
    pub fn with_audio_codecs(mut self, codecs: &[AudioCodec]) -> Self {
        self.audio_codecs = codecs.iter().copied().collect();
        self
    }

    /// Make the writer finalize without producing any bytes.
    pub fn without_output(mut self) -> Self {
        self.produce_output = false;
        self
    }

    /// Make the audio sink reject submitted buffers.
    pub fn with_failing_audio(mut self) -> Self {
        self.fail_audio = true;
        self
    }

    /// Snapshot of everything recorded so far.
    pub fn record(&self) -> MemoryRecord {
        lock(&self.record).clone()
    }
}

fn lock(record: &Mutex<MemoryRecord>) -> MutexGuard<'_, MemoryRecord> {
    // A panicking test thread must not hide the record from the next assertion.
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl MediaBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn can_encode_video(&self, codec: VideoCodec, bitrate: u32) -> bool {
        bitrate > 0 && self.video_codecs.contains(&codec)
    }

    async fn can_encode_audio(&self, codec: AudioCodec, bitrate: u32) -> bool {
        (bitrate > 0 || codec.is_lossless()) && self.audio_codecs.contains(&codec)
    }

    async fn open(&self, spec: &OutputSpec) -> ExportResult<OpenedOutput> {
        lock(&self.record).opened.push(spec.clone());

        let audio: Option<Box<dyn AudioSink>> = spec.audio.map(|_| {
            Box::new(MemoryAudioSink {
                record: Arc::clone(&self.record),
                fail: self.fail_audio,
                closed: false,
            }) as Box<dyn AudioSink>
        });

        Ok(OpenedOutput {
            video: Box::new(MemoryVideoSink {
                record: Arc::clone(&self.record),
                closed: false,
            }),
            audio,
            writer: Box::new(MemoryWriter {
                record: Arc::clone(&self.record),
                produce_output: self.produce_output,
            }),
        })
    }
}

struct MemoryVideoSink {
    record: Arc<Mutex<MemoryRecord>>,
    closed: bool,
}

#[async_trait::async_trait]
impl VideoSink for MemoryVideoSink {
    async fn add(
        &mut self,
        surface: &RasterSurface,
        timestamp_secs: f64,
        duration_secs: f64,
    ) -> ExportResult<()> {
        if self.closed {
            return Err(ExportError::sink_unavailable("video sink is closed"));
        }
        lock(&self.record).frames.push(RecordedFrame {
            timestamp_secs,
            duration_secs,
            checksum: surface.checksum(),
        });
        Ok(())
    }

    async fn close(&mut self) -> ExportResult<()> {
        self.closed = true;
        lock(&self.record).video_closed = true;
        Ok(())
    }
}

impl Drop for MemoryVideoSink {
    fn drop(&mut self) {
        lock(&self.record).video_released = true;
    }
}

struct MemoryAudioSink {
    record: Arc<Mutex<MemoryRecord>>,
    fail: bool,
    closed: bool,
}

#[async_trait::async_trait]
impl AudioSink for MemoryAudioSink {
    async fn add(&mut self, buffer: &TrimmedAudioBuffer) -> ExportResult<()> {
        if self.closed {
            return Err(ExportError::sink_unavailable("audio sink is closed"));
        }
        if self.fail {
            return Err(ExportError::encoder("audio encoder rejected buffer"));
        }
        lock(&self.record).audio.push(buffer.clone());
        Ok(())
    }

    async fn close(&mut self) -> ExportResult<()> {
        self.closed = true;
        lock(&self.record).audio_closed = true;
        Ok(())
    }
}

impl Drop for MemoryAudioSink {
    fn drop(&mut self) {
        lock(&self.record).audio_released = true;
    }
}

struct MemoryWriter {
    record: Arc<Mutex<MemoryRecord>>,
    produce_output: bool,
}

#[async_trait::async_trait]
impl ContainerWriter for MemoryWriter {
    async fn finalize(&mut self) -> ExportResult<Option<Vec<u8>>> {
        let mut record = lock(&self.record);
        record.finalized = true;
        if !self.produce_output {
            return Ok(None);
        }
        let summary = format!(
            "framecast-memory frames={} audio_frames={}",
            record.frames.len(),
            record.audio_frames()
        );
        Ok(Some(summary.into_bytes()))
    }

    async fn cancel(&mut self) {
        lock(&self.record).canceled = true;
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        lock(&self.record).writer_released = true;
    }
}
