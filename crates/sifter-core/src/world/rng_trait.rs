//! RNG trait abstraction for chunk jobs
//!
//! Movement code only needs coin flips and probability rolls. Chunk jobs use
//! a seeded `Xoshiro256StarStar` per (frame, chunk) so results do not depend
//! on thread timing; tests substitute a fixed-answer implementation.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

/// Random number generator trait for the movement engine
pub trait WorldRng {
    /// Generate random boolean with 50% probability
    fn gen_bool(&mut self) -> bool;

    /// Generate random f32 in [0.0, 1.0)
    fn gen_f32(&mut self) -> f32;

    /// Check if random value is less than probability threshold
    fn check_probability(&mut self, probability: f32) -> bool {
        self.gen_f32() < probability
    }
}

// Blanket implementation for any type implementing rand::Rng
impl<T: ?Sized + rand::Rng> WorldRng for T {
    fn gen_bool(&mut self) -> bool {
        rand::Rng::r#gen(self)
    }

    fn gen_f32(&mut self) -> f32 {
        rand::Rng::r#gen(self)
    }
}

/// Stream for one chunk job
pub fn chunk_rng(seed: u64, frame: u32, chunk_index: usize) -> Xoshiro256StarStar {
    Xoshiro256StarStar::seed_from_u64(
        seed ^ (frame as u64).rotate_left(32) ^ (chunk_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
    )
}
