//! Chunked parallel falling-sand engine
//!
//! The grid is split into 32x32 chunks. Each frame the chunks that changed
//! are simulated in four checkerboard groups; chunks inside a group run in
//! parallel on a rayon pool and never touch the same cells.

pub mod config;
pub mod error;
pub mod world;

pub use config::EngineConfig;
pub use error::{EngineError, GridError};
pub use world::{CHUNK_SIZE, FrameReport, Grid, NoopStats, SimStats, World};

// Re-export the data crate so callers need a single dependency
pub use sifter_simulation as simulation;
