//! Run the audio trim stage on a WAV file.

use std::path::PathBuf;

use framecast_export_engine::decode::encode_wav_f32;
use framecast_export_engine::{trim, AudioDecoder, WavDecoder};
use framecast_export_model::{MAX_AUDIO_VOLUME, MIN_AUDIO_VOLUME};

pub async fn run(
    input: PathBuf,
    start: f64,
    end: f64,
    offset: f64,
    volume: f64,
    output: PathBuf,
) -> anyhow::Result<()> {
    if !(MIN_AUDIO_VOLUME..=MAX_AUDIO_VOLUME).contains(&volume) {
        return Err(anyhow::anyhow!(
            "Volume must be between {MIN_AUDIO_VOLUME} and {MAX_AUDIO_VOLUME}, got {volume}"
        ));
    }

    println!("Trimming {}", input.display());
    let source = WavDecoder::new().decode(&input).await?;
    println!(
        "  Source: {} Hz, {} channel(s), {:.3}s",
        source.sample_rate(),
        source.channel_count(),
        source.duration_secs()
    );

    let trimmed = trim(&source, start, end, offset, volume)?;
    let wav = encode_wav_f32(
        trimmed.sample_rate(),
        trimmed.channel_count(),
        &trimmed.interleaved(),
    )?;
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output, wav).await?;

    println!(
        "  Output: {} frames ({:.3}s){}",
        trimmed.frame_count(),
        trimmed.duration_secs(),
        if trimmed.is_silent() { ", silent" } else { "" }
    );
    println!("Written to: {}", output.display());
    Ok(())
}
