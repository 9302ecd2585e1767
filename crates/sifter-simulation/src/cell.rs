//! Cell types and engine-wide limits
//!
//! A `Cell` is the unpacked view of one grid position. The grid stores each
//! cell as three 64-bit words (see [`Cell::pack_head`], [`Cell::pack_motion`],
//! [`Cell::pack_link`]) so that every word can be read and written atomically.

use crate::MaterialId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Size of a chunk in cells (32x32)
pub const CHUNK_SIZE: usize = 32;

/// Maximum velocity per axis, in cells/frame
pub const MAX_VELOCITY: i8 = 6;

/// Maximum horizontal spread/dispersion distance any material may declare
pub const MAX_SPREAD: u8 = 8;

/// Sub-cell resolution of the fractional accumulators (one cell = 64 units)
pub const SUBCELL: i16 = 64;

/// Cells any single cell update may read or write away from its origin:
/// a full velocity trace, then a full spread, then one neighbour check.
pub const MAX_REACH: usize = MAX_VELOCITY as usize + MAX_SPREAD as usize + 1;

// Same-group chunk cores are exactly one chunk apart. Both footprints must fit
// in that gap or two workers of one group could touch the same cell.
const _: () = assert!(CHUNK_SIZE >= 2 * MAX_REACH);

bitflags! {
    /// Per-cell state flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CellFlags: u16 {
        /// Placed by authoring tools rather than produced by simulation
        const PLACED = 1 << 0;
        /// Never simulated even if its material could move (terrain anchors)
        const STATIC = 1 << 1;
        /// Can be removed by digging tools
        const DIGGABLE = 1 << 2;
        /// Last horizontal flow went left (liquids/gases)
        const FLOW_LEFT = 1 << 3;
    }
}

/// A single cell in the world
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Material type (0 = air)
    pub material_id: u16,
    pub flags: CellFlags,
    /// Last frame this cell moved or was displaced by a mover (0 = never)
    pub frame: u32,
    pub vel_x: i8,
    pub vel_y: i8,
    /// Sub-cell velocity accumulators, in 1/SUBCELL cells/frame
    pub frac_x: i8,
    pub frac_y: i8,
    /// Temperature in Celsius
    pub temperature: i16,
    /// Owning structure (0 = none)
    pub structure_id: u16,
    /// Owning rigid-body cluster (0 = free)
    pub owner_id: u32,
}

impl Cell {
    pub const AIR: Cell = Cell {
        material_id: MaterialId::AIR,
        flags: CellFlags::empty(),
        frame: 0,
        vel_x: 0,
        vel_y: 0,
        frac_x: 0,
        frac_y: 0,
        temperature: 20,
        structure_id: 0,
        owner_id: 0,
    };

    pub fn new(material_id: u16) -> Self {
        Self {
            material_id,
            ..Self::AIR
        }
    }

    pub fn is_empty(&self) -> bool {
        self.material_id == MaterialId::AIR
    }

    pub fn is_owned(&self) -> bool {
        self.owner_id != 0
    }

    pub fn is_at_rest(&self) -> bool {
        self.vel_x == 0 && self.vel_y == 0
    }

    /// Clamp velocity to `MAX_VELOCITY` on both axes
    pub fn clamp_velocity(&mut self) {
        self.vel_x = self.vel_x.clamp(-MAX_VELOCITY, MAX_VELOCITY);
        self.vel_y = self.vel_y.clamp(-MAX_VELOCITY, MAX_VELOCITY);
    }

    /// Add a sub-cell force and carry whole cells into the velocity.
    pub fn accelerate(&mut self, fx: i16, fy: i16) {
        let (vx, rx) = carry(self.vel_x, self.frac_x, fx);
        let (vy, ry) = carry(self.vel_y, self.frac_y, fy);
        self.vel_x = vx;
        self.frac_x = rx;
        self.vel_y = vy;
        self.frac_y = ry;
        self.clamp_velocity();
    }

    /// Reset all motion state, keeping material, temperature and position links
    pub fn stop(&mut self) {
        self.vel_x = 0;
        self.vel_y = 0;
        self.frac_x = 0;
        self.frac_y = 0;
    }

    /// Material, flags and frame stamp
    pub fn pack_head(&self) -> u64 {
        self.material_id as u64 | (self.flags.bits() as u64) << 16 | (self.frame as u64) << 32
    }

    /// Velocity, accumulators and temperature
    pub fn pack_motion(&self) -> u64 {
        (self.vel_x as u8) as u64
            | ((self.vel_y as u8) as u64) << 8
            | ((self.frac_x as u8) as u64) << 16
            | ((self.frac_y as u8) as u64) << 24
            | ((self.temperature as u16) as u64) << 32
    }

    /// Positional ownership (cluster and structure)
    pub fn pack_link(&self) -> u64 {
        self.owner_id as u64 | (self.structure_id as u64) << 32
    }

    pub fn unpack(head: u64, motion: u64, link: u64) -> Self {
        Self {
            material_id: head as u16,
            flags: CellFlags::from_bits_retain((head >> 16) as u16),
            frame: (head >> 32) as u32,
            vel_x: motion as u8 as i8,
            vel_y: (motion >> 8) as u8 as i8,
            frac_x: (motion >> 16) as u8 as i8,
            frac_y: (motion >> 24) as u8 as i8,
            temperature: (motion >> 32) as u16 as i16,
            owner_id: link as u32,
            structure_id: (link >> 32) as u16,
        }
    }
}

fn carry(vel: i8, frac: i8, force: i16) -> (i8, i8) {
    let total = frac as i32 + force as i32;
    let whole = total / SUBCELL as i32;
    let rest = total % SUBCELL as i32;
    let vel = (vel as i32 + whole).clamp(-(MAX_VELOCITY as i32), MAX_VELOCITY as i32);
    (vel as i8, rest as i8)
}
