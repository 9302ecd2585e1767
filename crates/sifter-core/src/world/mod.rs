//! World management - grid, chunk activity, scheduling and movement

mod activity;
mod chunk;
mod grid;
pub mod movement;
pub mod rng_trait;
pub mod scheduler;
pub mod stats;
#[allow(clippy::module_inception)]
mod world;

pub use sifter_simulation::{CHUNK_SIZE, MAX_REACH};

pub use activity::{ActivitySummary, ActivityTracker, DirtyLog, DirtySink, mark_with_neighbors};
pub use chunk::{ChunkState, DirtyRect};
pub use grid::{CellStore, Grid};
pub use movement::{
    ChunkOutcome, ChunkSimulator, CollisionResponse, GasResponse, LiquidResponse,
    PowderResponse, RestRule, can_displace,
};
pub use rng_trait::{WorldRng, chunk_rng};
pub use scheduler::{
    ChunkGroup, Footprint, Schedule, check_spacing, footprints_overlap, material_reach,
};
pub use stats::{CountingStats, NoopStats, SimStats};
pub use world::{FrameReport, World};
