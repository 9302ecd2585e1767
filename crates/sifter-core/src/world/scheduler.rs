//! Chunk scheduler - checkerboard groups and the spacing rule that keeps
//! same-group chunk jobs from touching the same cells.
//!
//! ```text
//!   cy odd   C D C D
//!   cy even  A B A B
//!            cx even/odd
//! ```
//!
//! Groups run A, B, C, D; chunks inside a group run in parallel. Two chunks
//! of one group are always one full chunk apart, so their cores have a gap
//! of `CHUNK_SIZE` cells between them.

use glam::IVec2;
use sifter_simulation::{MAX_VELOCITY, MaterialDef, Materials};

use super::CHUNK_SIZE;
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkGroup {
    A,
    B,
    C,
    D,
}

impl ChunkGroup {
    /// Execution order
    pub const ALL: [ChunkGroup; 4] = [ChunkGroup::A, ChunkGroup::B, ChunkGroup::C, ChunkGroup::D];

    /// `g = (cx mod 2) + 2 (cy mod 2)`
    pub fn of(chunk_x: i32, chunk_y: i32) -> Self {
        match chunk_x.rem_euclid(2) + 2 * chunk_y.rem_euclid(2) {
            0 => ChunkGroup::A,
            1 => ChunkGroup::B,
            2 => ChunkGroup::C,
            _ => ChunkGroup::D,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ChunkGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChunkGroup::A => "A",
            ChunkGroup::B => "B",
            ChunkGroup::C => "C",
            ChunkGroup::D => "D",
        };
        f.write_str(name)
    }
}

/// Cells one update of this material may read or write away from its origin
pub fn material_reach(material: &MaterialDef) -> usize {
    if material.is_static() {
        return 0;
    }
    MAX_VELOCITY as usize + material.spread as usize + 1
}

/// Two footprints of `reach` around cores `gap` cells apart must not meet
pub fn check_spacing(material: &str, gap: usize, reach: usize) -> Result<(), EngineError> {
    if gap < 2 * reach {
        return Err(EngineError::SchedulingHazard {
            material: material.to_string(),
            reach,
            gap,
        });
    }
    Ok(())
}

pub struct Schedule;

impl Schedule {
    /// Split active chunks into the four groups, keeping input order
    pub fn partition(active: &[IVec2]) -> [Vec<IVec2>; 4] {
        let mut groups: [Vec<IVec2>; 4] = Default::default();
        for &pos in active {
            groups[ChunkGroup::of(pos.x, pos.y).index()].push(pos);
        }
        groups
    }

    /// Verify every material fits the same-group core gap
    pub fn validate(materials: &Materials) -> Result<(), EngineError> {
        for material in materials.iter() {
            check_spacing(&material.name, CHUNK_SIZE, material_reach(material))?;
        }
        Ok(())
    }
}

/// Inclusive world-space rectangle a job may touch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footprint {
    pub min: IVec2,
    pub max: IVec2,
}

impl Footprint {
    /// Rect `[min, max]` grown by `reach` on every side
    pub fn around(min: IVec2, max: IVec2, reach: usize) -> Self {
        let reach = IVec2::splat(reach as i32);
        Self {
            min: min - reach,
            max: max + reach,
        }
    }

    /// Reach of a single cell update
    pub fn of_cell(x: i32, y: i32, reach: usize) -> Self {
        let pos = IVec2::new(x, y);
        Self::around(pos, pos, reach)
    }

    /// Everything the job for `chunk_pos` may touch
    pub fn of_core(chunk_pos: IVec2, reach: usize) -> Self {
        let origin = chunk_pos * CHUNK_SIZE as i32;
        Self::around(origin, origin + IVec2::splat(CHUNK_SIZE as i32 - 1), reach)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }

    pub fn overlaps(&self, other: &Footprint) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

pub fn footprints_overlap(a: &Footprint, b: &Footprint) -> bool {
    a.overlaps(b)
}
