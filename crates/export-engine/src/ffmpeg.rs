//! ffmpeg-backed encoder.
//!
//! The video sink pipes raw RGBA frames into an ffmpeg child that encodes to
//! an intermediate Matroska file. The audio sink writes the trimmed track as
//! a float WAV. The writer muxes both into a fragmented MP4 and reads the
//! bytes back. Intermediates live in a temporary directory that is removed
//! once the sinks and writer are gone.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use framecast_common::config::EncoderConfig;
use framecast_common::error::{ExportError, ExportResult};
use framecast_export_model::{AudioCodec, RasterSurface, TrimmedAudioBuffer, VideoCodec};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::decode::encode_wav_f32;
use crate::sink::{
    AudioSink, AudioTrackSpec, ContainerWriter, MediaBackend, OpenedOutput, OutputSpec, VideoSink,
};

const VIDEO_FILE: &str = "video.mkv";
const AUDIO_FILE: &str = "audio.wav";
const OUTPUT_FILE: &str = "output.mp4";

/// Encoder backend that shells out to the ffmpeg CLI.
pub struct FfmpegBackend {
    ffmpeg_path: PathBuf,
    preset: String,
    scratch_dir: Option<PathBuf>,
    encoders: OnceCell<BTreeSet<String>>,
}

impl FfmpegBackend {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            preset: config.preset.clone(),
            scratch_dir: config.scratch_dir.clone(),
            encoders: OnceCell::new(),
        }
    }

    /// Whether the ffmpeg binary runs and lists at least one encoder.
    pub async fn is_available(&self) -> bool {
        !self.encoders().await.is_empty()
    }

    /// Encoder names reported by `ffmpeg -encoders`, probed once.
    ///
    /// Empty when ffmpeg cannot be run.
    pub async fn encoders(&self) -> &BTreeSet<String> {
        self.encoders
            .get_or_init(|| async {
                match probe_encoders(&self.ffmpeg_path).await {
                    Ok(encoders) => {
                        tracing::debug!(count = encoders.len(), "Probed ffmpeg encoders");
                        encoders
                    }
                    Err(e) => {
                        tracing::warn!(
                            ffmpeg = %self.ffmpeg_path.display(),
                            error = %e,
                            "ffmpeg is not available"
                        );
                        BTreeSet::new()
                    }
                }
            })
            .await
    }

    fn scratch_dir(&self) -> ExportResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("framecast-");
        let dir = match &self.scratch_dir {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

#[async_trait::async_trait]
impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn can_encode_video(&self, codec: VideoCodec, bitrate: u32) -> bool {
        bitrate > 0 && video_encoder(codec, self.encoders().await).is_some()
    }

    async fn can_encode_audio(&self, codec: AudioCodec, bitrate: u32) -> bool {
        (bitrate > 0 || codec.is_lossless()) && audio_encoder(codec, self.encoders().await).is_some()
    }

    async fn open(&self, spec: &OutputSpec) -> ExportResult<OpenedOutput> {
        let encoders = self.encoders().await;
        let video_encoder = video_encoder(spec.video_codec, encoders).ok_or_else(|| {
            ExportError::encoder(format!(
                "no ffmpeg encoder for {}",
                spec.video_codec.as_str()
            ))
        })?;
        let audio = match spec.audio {
            Some(track) => Some((
                track,
                audio_encoder(track.codec, encoders).ok_or_else(|| {
                    ExportError::encoder(format!("no ffmpeg encoder for {}", track.codec.as_str()))
                })?,
            )),
            None => None,
        };

        let dir = Arc::new(self.scratch_dir()?);
        tracing::debug!(dir = %dir.path().display(), "Created export scratch directory");

        let args = video_encode_args(spec, video_encoder, &self.preset, &dir.path().join(VIDEO_FILE));
        let video = FfmpegVideoSink::spawn(&self.ffmpeg_path, args, spec, Arc::clone(&dir))?;

        let audio_sink = audio.map(|(track, _)| {
            Box::new(WavAudioSink {
                dir: Arc::clone(&dir),
                track,
                written: false,
                closed: false,
            }) as Box<dyn AudioSink>
        });

        Ok(OpenedOutput {
            video: Box::new(video),
            audio: audio_sink,
            writer: Box::new(FfmpegMuxer {
                ffmpeg_path: self.ffmpeg_path.clone(),
                dir: Some(dir),
                audio,
            }),
        })
    }
}

async fn probe_encoders(ffmpeg: &Path) -> ExportResult<BTreeSet<String>> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ExportError::encoder(format!("failed to run {}: {e}", ffmpeg.display())))?;
    if !output.status.success() {
        return Err(ExportError::encoder(format!(
            "ffmpeg -encoders exited with {}",
            output.status
        )));
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the table printed by `ffmpeg -encoders`.
///
/// Rows follow a `------` separator; the second column is the encoder name.
pub fn parse_encoder_list(text: &str) -> BTreeSet<String> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let flags = cols.next()?;
            let name = cols.next()?;
            (flags.len() == 6).then(|| name.to_string())
        })
        .collect()
}

/// First available ffmpeg encoder for a video codec.
pub fn video_encoder(codec: VideoCodec, encoders: &BTreeSet<String>) -> Option<&'static str> {
    let candidates: &[&'static str] = match codec {
        VideoCodec::Avc => &["libx264", "h264_nvenc", "h264_vaapi", "h264_videotoolbox"],
        VideoCodec::Hevc => &["libx265", "hevc_nvenc", "hevc_vaapi", "hevc_videotoolbox"],
        VideoCodec::Vp9 => &["libvpx-vp9"],
        VideoCodec::Av1 => &["libsvtav1", "libaom-av1", "librav1e"],
        VideoCodec::Vp8 => &["libvpx"],
    };
    candidates
        .iter()
        .copied()
        .find(|name| encoders.contains(*name))
}

/// First available ffmpeg encoder for an audio codec.
pub fn audio_encoder(codec: AudioCodec, encoders: &BTreeSet<String>) -> Option<&'static str> {
    let candidates: &[&'static str] = match codec {
        AudioCodec::Aac => &["aac", "libfdk_aac"],
        AudioCodec::Opus => &["libopus", "opus"],
        AudioCodec::Mp3 => &["libmp3lame"],
        AudioCodec::Vorbis => &["libvorbis", "vorbis"],
        AudioCodec::Flac => &["flac"],
    };
    candidates
        .iter()
        .copied()
        .find(|name| encoders.contains(*name))
}

/// Arguments for the raw-RGBA video encoder child.
pub fn video_encode_args(
    spec: &OutputSpec,
    encoder: &str,
    preset: &str,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", spec.width, spec.height),
        "-r".to_string(),
        format!("{}", spec.fps),
        "-i".to_string(),
        "pipe:0".to_string(),
        // yuv420p needs even dimensions
        "-vf".to_string(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string(),
        "-c:v".to_string(),
        encoder.to_string(),
    ];
    if matches!(encoder, "libx264" | "libx265") {
        args.push("-preset".to_string());
        args.push(preset.to_string());
    }
    args.extend([
        "-b:v".to_string(),
        spec.video_bitrate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// Arguments for the final mux into fragmented MP4.
pub fn mux_args(dir: &Path, audio: Option<(AudioTrackSpec, &str)>, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        dir.join(VIDEO_FILE).display().to_string(),
    ];
    if audio.is_some() {
        args.push("-i".to_string());
        args.push(dir.join(AUDIO_FILE).display().to_string());
    }
    args.extend([
        "-map".to_string(),
        "0:v:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
    ]);
    if let Some((track, encoder)) = audio {
        args.extend([
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:a".to_string(),
            encoder.to_string(),
        ]);
        if !track.codec.is_lossless() {
            args.push("-b:a".to_string());
            args.push(track.bitrate.to_string());
        }
    }
    args.extend([
        "-strict".to_string(),
        "experimental".to_string(),
        "-movflags".to_string(),
        "frag_keyframe+empty_moov".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// Output frame slot for a timestamp.
fn frame_slot(timestamp_secs: f64, fps: f64) -> u64 {
    (timestamp_secs * fps).round().max(0.0) as u64
}

/// Frames to repeat before writing `slot`, or `None` if it was already written.
fn slot_gap(slot: u64, next_slot: u64) -> Option<u64> {
    slot.checked_sub(next_slot)
}

struct FfmpegVideoSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    fps: f64,
    next_slot: u64,
    last_frame: Vec<u8>,
    _dir: Arc<TempDir>,
}

impl FfmpegVideoSink {
    fn spawn(
        ffmpeg: &Path,
        args: Vec<String>,
        spec: &OutputSpec,
        dir: Arc<TempDir>,
    ) -> ExportResult<Self> {
        tracing::debug!(?args, "Spawning ffmpeg video encoder");
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::encoder(format!("failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::encoder("failed to capture ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::encoder("failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once its stderr pipe fills up
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Err(err) = stderr.read_to_string(&mut output).await {
                output.push_str(&format!("<failed to read ffmpeg stderr: {err}>"));
            }
            output
        });

        tracing::info!(pid = child.id(), "ffmpeg video encoder started");
        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr_task: Some(stderr_task),
            fps: spec.fps,
            next_slot: 0,
            last_frame: Vec::new(),
            _dir: dir,
        })
    }

    async fn stderr_output(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait::async_trait]
impl VideoSink for FfmpegVideoSink {
    async fn add(
        &mut self,
        surface: &RasterSurface,
        timestamp_secs: f64,
        _duration_secs: f64,
    ) -> ExportResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ExportError::sink_unavailable("video encoder is closed"));
        };

        let slot = frame_slot(timestamp_secs, self.fps);
        let Some(gap) = slot_gap(slot, self.next_slot) else {
            tracing::warn!(
                timestamp_secs,
                slot,
                next_slot = self.next_slot,
                "Frame maps to an already written output slot, dropping"
            );
            return Ok(());
        };

        let frame = surface.as_bytes();
        if gap > 0 {
            tracing::debug!(gap, slot, "Filling frame gap");
            let fill: &[u8] = if self.last_frame.is_empty() {
                frame
            } else {
                &self.last_frame
            };
            for _ in 0..gap {
                stdin.write_all(fill).await?;
            }
        }
        stdin.write_all(frame).await?;

        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame);
        self.next_slot = slot + 1;
        Ok(())
    }

    async fn close(&mut self) -> ExportResult<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        stdin.shutdown().await?;
        drop(stdin);

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .await
            .map_err(|e| ExportError::encoder(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self.stderr_output().await;
        if !status.success() {
            return Err(ExportError::encoder(format!(
                "ffmpeg video encoder exited with {status}: {}",
                stderr.trim()
            )));
        }
        tracing::debug!(frames = self.next_slot, "ffmpeg video encoder finished");
        Ok(())
    }
}

struct WavAudioSink {
    dir: Arc<TempDir>,
    track: AudioTrackSpec,
    written: bool,
    closed: bool,
}

#[async_trait::async_trait]
impl AudioSink for WavAudioSink {
    async fn add(&mut self, buffer: &TrimmedAudioBuffer) -> ExportResult<()> {
        if self.closed {
            return Err(ExportError::sink_unavailable("audio sink is closed"));
        }
        if self.written {
            return Err(ExportError::encoder("audio track was already written"));
        }
        let wav = encode_wav_f32(
            buffer.sample_rate(),
            buffer.channel_count(),
            &buffer.interleaved(),
        )?;
        tokio::fs::write(self.dir.path().join(AUDIO_FILE), wav).await?;
        self.written = true;
        tracing::debug!(
            codec = self.track.codec.as_str(),
            frames = buffer.frame_count(),
            "Audio track staged"
        );
        Ok(())
    }

    async fn close(&mut self) -> ExportResult<()> {
        self.closed = true;
        Ok(())
    }
}

struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    dir: Option<Arc<TempDir>>,
    audio: Option<(AudioTrackSpec, &'static str)>,
}

#[async_trait::async_trait]
impl ContainerWriter for FfmpegMuxer {
    async fn finalize(&mut self) -> ExportResult<Option<Vec<u8>>> {
        let Some(dir) = self.dir.take() else {
            return Ok(None);
        };
        let video_path = dir.path().join(VIDEO_FILE);
        let has_video = tokio::fs::metadata(&video_path)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !has_video {
            tracing::warn!("No encoded video to mux");
            return Ok(None);
        }

        // Audio is optional at this point: a failed audio stage leaves no file.
        let audio = match self.audio {
            Some(track) if dir.path().join(AUDIO_FILE).exists() => Some(track),
            _ => None,
        };

        let output = dir.path().join(OUTPUT_FILE);
        let args = mux_args(dir.path(), audio, &output);
        tracing::debug!(?args, "Muxing container");
        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExportError::encoder(format!("failed to start ffmpeg: {e}")))?;
        if !result.status.success() {
            return Err(ExportError::encoder(format!(
                "ffmpeg mux exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(&output).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    async fn cancel(&mut self) {
        if let Some(dir) = self.dir.take() {
            tracing::debug!(dir = %dir.path().display(), "Discarding export intermediates");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS_OUTPUT: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
 A....D flac                 FLAC (Free Lossless Audio Codec)
";

    fn spec() -> OutputSpec {
        OutputSpec {
            width: 641,
            height: 361,
            fps: 30.0,
            video_codec: VideoCodec::Avc,
            video_bitrate: 2_000_000,
            audio: None,
        }
    }

    #[test]
    fn test_parse_encoder_list() {
        let encoders = parse_encoder_list(ENCODERS_OUTPUT);
        assert_eq!(encoders.len(), 4);
        assert!(encoders.contains("libx264"));
        assert!(encoders.contains("flac"));
        assert!(!encoders.contains("V....."));
    }

    #[test]
    fn test_codec_mapping_follows_probe() {
        let encoders = parse_encoder_list(ENCODERS_OUTPUT);
        assert_eq!(video_encoder(VideoCodec::Avc, &encoders), Some("libx264"));
        assert_eq!(video_encoder(VideoCodec::Vp9, &encoders), Some("libvpx-vp9"));
        assert_eq!(video_encoder(VideoCodec::Hevc, &encoders), None);
        assert_eq!(audio_encoder(AudioCodec::Aac, &encoders), Some("aac"));
        assert_eq!(audio_encoder(AudioCodec::Opus, &encoders), None);
    }

    #[test]
    fn test_video_args_pad_and_preset() {
        let args = video_encode_args(&spec(), "libx264", "veryfast", Path::new("/tmp/v.mkv"));
        let joined = args.join(" ");
        assert!(joined.contains("-s 641x361"));
        assert!(joined.contains("pad=ceil(iw/2)*2:ceil(ih/2)*2"));
        assert!(joined.contains("-preset veryfast"));
        assert!(joined.contains("-b:v 2000000"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/v.mkv"));

        let vp9 = video_encode_args(&spec(), "libvpx-vp9", "veryfast", Path::new("/tmp/v.mkv"));
        assert!(!vp9.iter().any(|a| a == "-preset"));
    }

    #[test]
    fn test_mux_args_with_and_without_audio() {
        let dir = Path::new("/tmp/x");
        let out = Path::new("/tmp/x/out.mp4");
        let video_only = mux_args(dir, None, out).join(" ");
        assert!(!video_only.contains("1:a:0"));
        assert!(video_only.contains("frag_keyframe+empty_moov"));

        let track = AudioTrackSpec {
            codec: AudioCodec::Aac,
            bitrate: 160_000,
        };
        let with_audio = mux_args(dir, Some((track, "aac")), out).join(" ");
        assert!(with_audio.contains("-map 1:a:0 -c:a aac -b:a 160000"));

        let flac = AudioTrackSpec {
            codec: AudioCodec::Flac,
            bitrate: 0,
        };
        assert!(!mux_args(dir, Some((flac, "flac")), out).contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_frame_slot_rounds_to_nearest() {
        assert_eq!(frame_slot(0.0, 30.0), 0);
        assert_eq!(frame_slot(1.0 / 30.0, 30.0), 1);
        assert_eq!(frame_slot(0.999_999, 30.0), 30);
    }

    #[test]
    fn test_slot_gap_flags_already_written_slots() {
        assert_eq!(slot_gap(0, 0), Some(0));
        assert_eq!(slot_gap(5, 2), Some(3));
        assert_eq!(slot_gap(1, 2), None);
    }

    #[test]
    fn test_consecutive_feed_timestamps_never_share_a_slot() {
        for fps in [23.976, 24.0, 29.97, 30.0, 59.94, 60.0] {
            let mut next = 0;
            for n in 0..2_000u64 {
                let slot = frame_slot(n as f64 / fps, fps);
                assert_eq!(slot_gap(slot, next), Some(0), "fps {fps} frame {n}");
                next = slot + 1;
            }
        }
    }

    #[tokio::test]
    async fn test_missing_binary_reports_unavailable() {
        let backend = FfmpegBackend::new(&EncoderConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/framecast/ffmpeg"),
            ..EncoderConfig::default()
        });
        assert!(!backend.is_available().await);
        assert!(!backend.can_encode_video(VideoCodec::Avc, 1_000_000).await);
    }
}
