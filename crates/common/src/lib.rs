//! Framecast Common Utilities
//!
//! Shared infrastructure for all Framecast crates:
//! - Error types, error kinds and result aliases
//! - Clock arithmetic between render frames, output time and audio samples
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
