//! Engine configuration

use serde::{Deserialize, Serialize};
use sifter_simulation::SUBCELL;

use crate::error::EngineError;

/// Settings fixed for the life of a `World`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World width in chunks
    pub chunks_x: u32,
    /// World height in chunks
    pub chunks_y: u32,
    /// Gravity is applied as `SUBCELL / gravity_divisor` per frame;
    /// 1 = full speed, larger values slow the simulation down.
    /// Must be in `1..=SUBCELL` so gravity never rounds to zero.
    pub gravity_divisor: u8,
    /// Worker threads for chunk jobs (0 = one per core)
    pub worker_threads: usize,
    /// Seed for the per-chunk random streams
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunks_x: 16,
            chunks_y: 16,
            gravity_divisor: 1,
            worker_threads: 0,
            seed: 42,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunks_x == 0 || self.chunks_y == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "world must be at least one chunk, got {}x{}",
                self.chunks_x, self.chunks_y
            )));
        }
        if self.gravity_divisor == 0 || self.gravity_divisor as i16 > SUBCELL {
            return Err(EngineError::InvalidConfig(format!(
                "gravity_divisor must be in 1..={SUBCELL}, got {}",
                self.gravity_divisor
            )));
        }
        Ok(())
    }
}
