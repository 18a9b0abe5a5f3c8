//! Write a default export settings file.

use std::path::{Path, PathBuf};

use framecast_export_model::{ExportRange, ExportSettings};

pub fn run(name: String, output: PathBuf, fps: f64, width: u32, height: u32) -> anyhow::Result<()> {
    let path = write_settings(&name, &output, fps, width, height)?;

    println!("Created export settings '{}' at {}", name, path.display());
    println!("  Resolution: {width}x{height}");
    println!("  FPS: {fps}");
    println!("  Output file: {name}.mp4");
    println!();
    println!("Edit \"range\" to choose the exported span and add an \"audio\"");
    println!("section with a WAV path to include project audio.");

    Ok(())
}

fn write_settings(
    name: &str,
    output: &Path,
    fps: f64,
    width: u32,
    height: u32,
) -> anyhow::Result<PathBuf> {
    let mut settings = ExportSettings::new(name, width, height, fps);
    settings.range = ExportRange::new(0.0, 5.0);
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Refusing to write invalid settings: {e}"))?;

    let path = output.join(format!("{name}.export.json"));
    settings
        .save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write settings: {e}"))?;
    Ok(path)
}
