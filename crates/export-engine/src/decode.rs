//! Source audio decoding.

use std::io::Cursor;
use std::path::Path;

use framecast_common::error::{ExportError, ExportResult};
use framecast_export_model::SourceAudioBuffer;

/// Turns an audio resource into a planar sample buffer.
#[async_trait::async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode(&self, path: &Path) -> ExportResult<SourceAudioBuffer>;
}

/// WAV decoder backed by `hound`.
///
/// Integer PCM is normalised by bit depth into `[-1.0, 1.0)`; float PCM is
/// passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode WAV bytes already in memory.
    pub fn decode_bytes(&self, data: &[u8]) -> ExportResult<SourceAudioBuffer> {
        let reader = hound::WavReader::new(Cursor::new(data))
            .map_err(|e| ExportError::audio_decode(format!("failed to parse WAV header: {e}")))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    ExportError::audio_decode(format!("failed to read float samples: {e}"))
                })?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        ExportError::audio_decode(format!("failed to read int samples: {e}"))
                    })?
            }
        };

        SourceAudioBuffer::from_interleaved(spec.sample_rate, spec.channels as usize, &samples)
            .map_err(|e| ExportError::audio_decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AudioDecoder for WavDecoder {
    async fn decode(&self, path: &Path) -> ExportResult<SourceAudioBuffer> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            ExportError::audio_decode(format!("failed to read {}: {e}", path.display()))
        })?;
        let buffer = self.decode_bytes(&data)?;
        tracing::debug!(
            path = %path.display(),
            sample_rate = buffer.sample_rate(),
            channels = buffer.channel_count(),
            frames = buffer.frame_count(),
            "Decoded source audio"
        );
        Ok(buffer)
    }
}

/// Write a planar buffer as a 32-bit float WAV into memory.
pub fn encode_wav_f32(
    sample_rate: u32,
    channel_count: usize,
    interleaved: &[f32],
) -> ExportResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: channel_count as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| ExportError::encoder(format!("failed to start WAV: {e}")))?;
        for sample in interleaved {
            writer
                .write_sample(*sample)
                .map_err(|e| ExportError::encoder(format!("failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ExportError::encoder(format!("failed to finish WAV: {e}")))?;
    }
    Ok(cursor.into_inner())
}
