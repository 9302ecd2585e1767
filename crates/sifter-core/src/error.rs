//! Engine error taxonomy
//!
//! None of these are recoverable gameplay conditions: they indicate a caller
//! bug (`Bounds`), a collaborator breaking the ownership contract
//! (`InvariantViolation`), or a material table that would make same-group
//! chunks race (`SchedulingHazard`).

use sifter_simulation::MaterialError;
use thiserror::Error;

/// Grid access outside the world extents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Bounds(#[from] GridError),

    #[error("invariant violation at ({x}, {y}): {reason}")]
    InvariantViolation {
        x: i32,
        y: i32,
        reason: &'static str,
    },

    #[error(
        "scheduling hazard: '{material}' reaches {reach} cells per frame, \
         same-group chunk cores are only {gap} cells apart"
    )]
    SchedulingHazard {
        material: String,
        reach: usize,
        gap: usize,
    },

    #[error(transparent)]
    Material(#[from] MaterialError),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
