//! Planar audio buffers.
//!
//! [`SourceAudioBuffer`] holds the decoded project audio. [`TrimmedAudioBuffer`]
//! is the export-length output of the trim stage; its length is fixed at
//! construction so the mix step can only write into existing samples.

/// Errors constructing audio buffers.
#[derive(Debug, thiserror::Error)]
pub enum AudioBufferError {
    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("audio buffer must have at least one channel")]
    NoChannels,

    #[error("channel {channel} has {actual} frames, expected {expected}")]
    RaggedChannels {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("interleaved length {len} is not a multiple of {channels} channels")]
    InterleavedLength { len: usize, channels: usize },
}

/// Decoded source audio, one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SourceAudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, AudioBufferError> {
        if sample_rate == 0 {
            return Err(AudioBufferError::ZeroSampleRate);
        }
        let Some(first) = channels.first() else {
            return Err(AudioBufferError::NoChannels);
        };
        let expected = first.len();
        if let Some((channel, ch)) = channels
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != expected)
        {
            return Err(AudioBufferError::RaggedChannels {
                channel,
                expected,
                actual: ch.len(),
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Split interleaved samples into planar channels.
    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        samples: &[f32],
    ) -> Result<Self, AudioBufferError> {
        if channel_count == 0 {
            return Err(AudioBufferError::NoChannels);
        }
        if samples.len() % channel_count != 0 {
            return Err(AudioBufferError::InterleavedLength {
                len: samples.len(),
                channels: channel_count,
            });
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, sample) in channels.iter_mut().zip(frame) {
                ch.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}

/// Export-length output of the trim stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedAudioBuffer {
    sample_rate: u32,
    channels: Vec<Box<[f32]>>,
}

impl TrimmedAudioBuffer {
    /// Buffer of `frames` zero samples per channel.
    pub fn silent(sample_rate: u32, channel_count: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: (0..channel_count)
                .map(|_| vec![0.0f32; frames].into_boxed_slice())
                .collect(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, |ch| ch.len())
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|ch| &ch[..])
    }

    /// Mutable access to a channel's samples. Length cannot change.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.channels.get_mut(index).map(|ch| &mut ch[..])
    }

    /// Interleave all channels frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    pub fn is_silent(&self) -> bool {
        self.channels.iter().all(|ch| ch.iter().all(|s| *s == 0.0))
    }
}
