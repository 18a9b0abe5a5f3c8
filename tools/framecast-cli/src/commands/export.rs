//! Run an export session over the synthetic test pattern.

use std::path::PathBuf;
use std::sync::Arc;

use framecast_common::config::AppConfig;
use framecast_export_engine::{
    AbortSignal, DirectoryDelivery, ExportSession, FfmpegBackend, MediaBackend, MemoryBackend,
    SessionComponents, WavDecoder,
};
use framecast_export_model::ExportSettings;

use crate::synthetic::render_frame;

pub struct ExportArgs {
    pub path: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub abort_after: Option<u64>,
    pub dry_run: bool,
    pub json: bool,
}

pub async fn run(config: &AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    let ExportArgs {
        path,
        output_dir,
        abort_after,
        dry_run,
        json,
    } = args;
    println!("Exporting with settings: {}", path.display());

    let settings = ExportSettings::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;
    let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());

    let backend: Arc<dyn MediaBackend> = if dry_run {
        Arc::new(MemoryBackend::new())
    } else {
        let ffmpeg = FfmpegBackend::new(&config.encoder);
        if !ffmpeg.is_available().await {
            return Err(anyhow::anyhow!(
                "ffmpeg not available at {} (use --dry-run to skip encoding)",
                config.encoder.ffmpeg_path.display()
            ));
        }
        Arc::new(ffmpeg)
    };
    let delivery = DirectoryDelivery::new(&output_dir);
    let output_path = delivery.path_for(&settings.file_name());

    let size = settings.scaled_size();
    let fps = settings.fps;
    println!("  Backend: {}", backend.name());
    println!("  Output: {}", output_path.display());
    println!("  Resolution: {}x{} @ {fps} fps", size.width, size.height);

    let mut session = ExportSession::new(
        settings,
        SessionComponents {
            backend,
            decoder: Arc::new(WavDecoder::new()),
            delivery: Arc::new(delivery),
        },
    )?;
    session.start().await?;

    let abort = AbortSignal::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.abort();
        }
    });

    let clock = *session.clock();
    let total_frames = clock.frames_for_duration(session.settings().range.duration_secs());
    let first = clock.frame_index_offset();
    println!("  Frames: {total_frames}");
    println!();

    for n in 0..total_frames {
        if abort_after == Some(n) {
            tracing::info!(frames = n, "Raising abort signal");
            abort.abort();
        }
        let index = first + n as i64;
        let frame = render_frame(size.width, size.height, index, fps)?;
        if let Err(e) = session.handle_frame(&frame, index, &abort).await {
            tracing::error!(error = %e, "Frame rejected, stopping early");
            break;
        }
        if n % fps.round().max(1.0) as u64 == 0 {
            print!("\r  Rendering: {:>5.1}%", (n + 1) as f64 / total_frames as f64 * 100.0);
        }
    }
    println!("\r  Rendering: 100.0%");

    let artifact = session.stop().await?;
    let stats = session.stats();
    match artifact {
        Some(artifact) => {
            println!();
            println!("Export complete: {}", output_path.display());
            println!("  Size: {} bytes", artifact.len());
        }
        None => {
            println!();
            println!("Export canceled. No file was written.");
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "  Frames submitted: {}, dropped: {}, audio frames: {}",
            stats.frames_submitted, stats.frames_dropped, stats.audio_frames_written
        );
    }

    Ok(())
}
