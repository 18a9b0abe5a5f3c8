//! Framecast Export Engine
//!
//! Drives one export from the first rendered frame to the delivered MP4.
//!
//! ```text
//! renderer ──frame──▶ ExportSession ──▶ VideoFrameFeed ──▶ VideoSink ─┐
//!                         │                                          ├─▶ ContainerWriter ──▶ ArtifactDelivery
//!                         └─stop─▶ AudioDecoder ──▶ trim() ──▶ AudioSink ─┘
//! ```
//!
//! The encoder is abstracted behind [`MediaBackend`]: [`FfmpegBackend`] shells
//! out to the ffmpeg CLI, [`MemoryBackend`] records every call for tests and
//! dry runs.

pub mod decode;
pub mod delivery;
pub mod feed;
pub mod ffmpeg;
pub mod memory;
pub mod session;
pub mod signal;
pub mod sink;
pub mod trim;

pub use decode::{AudioDecoder, WavDecoder};
pub use delivery::{ArtifactDelivery, CollectingDelivery, DirectoryDelivery, ExportArtifact};
pub use feed::{FeedStats, VideoFrameFeed};
pub use ffmpeg::FfmpegBackend;
pub use memory::{MemoryBackend, MemoryRecord};
pub use session::{ExportSession, SessionComponents, SessionState, SessionStats};
pub use signal::AbortSignal;
pub use sink::{
    encodable_codecs, AudioSink, AudioTrackSpec, ContainerWriter, MediaBackend, OpenedOutput,
    OutputSpec, VideoSink,
};
pub use trim::trim;
