//! Check encoder capabilities.

use framecast_common::config::AppConfig;
use framecast_export_engine::{encodable_codecs, FfmpegBackend};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Framecast System Check");
    println!("{}", "=".repeat(50));

    let backend = FfmpegBackend::new(&config.encoder);
    if !backend.is_available().await {
        println!(
            "[FAIL] ffmpeg not found or not runnable: {}",
            config.encoder.ffmpeg_path.display()
        );
        println!();
        println!("Install ffmpeg or set encoder.ffmpeg_path in the config file.");
        return Ok(());
    }
    println!(
        "[OK] ffmpeg: {} ({} encoders)",
        config.encoder.ffmpeg_path.display(),
        backend.encoders().await.len()
    );

    let (video, audio) = encodable_codecs(&backend, 1920, 1080, 30.0).await;
    let video: Vec<&str> = video.iter().map(|c| c.as_str()).collect();
    let audio: Vec<&str> = audio.iter().map(|c| c.as_str()).collect();
    println!(
        "[{}] Video codecs: {}",
        if video.is_empty() { "WARN" } else { "OK" },
        if video.is_empty() { "none".to_string() } else { video.join(", ") }
    );
    println!(
        "[{}] Audio codecs: {}",
        if audio.is_empty() { "WARN" } else { "OK" },
        if audio.is_empty() { "none".to_string() } else { audio.join(", ") }
    );

    println!("     Output directory: {}", config.output_dir.display());
    println!();
    if video.is_empty() {
        println!("No usable video encoder. Exports will fail at start.");
    } else {
        println!("Framecast is ready to export.");
    }

    Ok(())
}
