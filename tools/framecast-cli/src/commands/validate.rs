//! Validate an export settings file.

use std::path::PathBuf;

use framecast_export_model::{ExportSettings, FIELD_RULES};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating export settings at: {}", path.display());

    let settings = ExportSettings::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;

    let size = settings.scaled_size();
    let options = &settings.options;
    println!("  Name: {}", settings.name);
    println!(
        "  Output: {}x{} (scale {}) @ {} fps",
        size.width, size.height, settings.resolution_scale, settings.fps
    );
    println!(
        "  Range: {:.3}s - {:.3}s ({:.3}s)",
        settings.range.start_secs,
        settings.range.end_secs,
        settings.range.duration_secs()
    );
    println!(
        "  Video: {} {:?} -> {} bps",
        options.video_codec.as_str(),
        options.video_quality,
        options.resolve_video_bitrate(size.width, size.height, settings.fps)
    );
    if settings.exports_audio() {
        println!(
            "  Audio: {} {:?} -> {} bps, volume {}",
            options.audio_codec.as_str(),
            options.audio_quality,
            options.resolve_audio_bitrate(),
            options.audio_volume
        );
    } else if options.include_audio {
        println!("  Audio: none (project has no audio track)");
    } else {
        println!("  Audio: excluded");
    }
    println!("  Render on abort: {}", options.render_on_abort);

    let disabled = options.disabled_fields();
    if !disabled.is_empty() {
        println!("  Disabled options:");
        for rule in FIELD_RULES.iter().filter(|rule| (rule.predicate)(options)) {
            let names: Vec<&str> = rule.disables.iter().map(|f| f.as_str()).collect();
            println!("    {} -> {}", rule.field.as_str(), names.join(", "));
        }
    }

    match settings.validate() {
        Ok(()) => {
            println!("\nSettings are valid.");
            Ok(())
        }
        Err(e) => {
            println!("\nValidation failed:");
            println!("  - {e}");
            Err(anyhow::anyhow!("Invalid export settings"))
        }
    }
}
