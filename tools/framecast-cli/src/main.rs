//! Framecast CLI: drive frame-synchronized exports from the command line.
//!
//! Usage:
//!   framecast init <NAME>          Write a default export settings file
//!   framecast validate <PATH>      Validate an export settings file
//!   framecast check                Check encoder capabilities
//!   framecast trim <WAV> ...       Run the audio trim stage on a WAV file
//!   framecast export <PATH>        Render a test pattern through an export session

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framecast_common::config::AppConfig;

mod commands;
mod synthetic;

#[derive(Parser)]
#[command(
    name = "framecast",
    about = "Frame-synchronized audiovisual export pipeline",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default export settings file
    Init {
        /// Export name (the output file is <name>.mp4)
        name: String,

        /// Directory for the settings file
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Frame rate
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Output width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Output height
        #[arg(long, default_value = "1080")]
        height: u32,
    },

    /// Validate an export settings file
    Validate {
        /// Path to the settings JSON
        path: PathBuf,
    },

    /// Check ffmpeg availability and encodable codecs
    Check,

    /// Trim a WAV file to an export range
    Trim {
        /// Source WAV file
        input: PathBuf,

        /// Range start (seconds of project time)
        #[arg(long)]
        start: f64,

        /// Range end (seconds of project time)
        #[arg(long)]
        end: f64,

        /// Project time at which the source's first sample plays
        #[arg(long, default_value = "0.0")]
        offset: f64,

        /// Linear volume in [0, 2]
        #[arg(long, default_value = "1.0")]
        volume: f64,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run an export session over a synthetic test pattern
    Export {
        /// Path to the settings JSON
        path: PathBuf,

        /// Delivery directory (defaults to the configured output directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Raise the abort signal after this many frames
        #[arg(long)]
        abort_after: Option<u64>,

        /// Record encoder calls in memory instead of running ffmpeg
        #[arg(long)]
        dry_run: bool,

        /// Print the final session stats as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    framecast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init {
            name,
            output,
            fps,
            width,
            height,
        } => commands::init::run(name, output, fps, width, height),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Check => commands::check::run(&config).await,
        Commands::Trim {
            input,
            start,
            end,
            offset,
            volume,
            output,
        } => commands::trim::run(input, start, end, offset, volume, output).await,
        Commands::Export {
            path,
            output_dir,
            abort_after,
            dry_run,
            json,
        } => {
            let opts = commands::export::ExportArgs {
                path,
                output_dir,
                abort_after,
                dry_run,
                json,
            };
            commands::export::run(&config, opts).await
        }
    }
}
