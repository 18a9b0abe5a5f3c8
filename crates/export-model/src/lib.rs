//! Framecast Export Model
//!
//! Defines the data contracts shared by the export pipeline:
//! - **Settings:** frame rate, output size, export range, project audio
//! - **Options:** codec choice, quality presets, volume, render-on-abort,
//!   and the declarative table of which options disable which
//! - **Raster:** rendered RGBA frames and the encode-ready surface
//! - **Audio:** decoded source buffers and fixed-length trimmed buffers
//!
//! All times are in seconds, all audio samples are `f32` in `[-1.0, 1.0]`.

pub mod audio;
pub mod options;
pub mod raster;
pub mod settings;

pub use audio::*;
pub use options::*;
pub use raster::*;
pub use settings::*;
