//! Cell movement engine - forces, velocity trace and collision response
//!
//! Every movable cell follows the same path each frame:
//!
//! 1. gravity (or buoyancy for gases) feeds the sub-cell accumulators,
//! 2. one Bresenham ray-march along the velocity vector, swapping the cell
//!    past anything it may displace,
//! 3. a [`CollisionResponse`] for the behaviour category when the march is
//!    blocked,
//! 4. the category's rest rule (topple, spread, disperse) once the cell has
//!    no velocity left and sits on a support.

use bresenham::Bresenham;
use glam::IVec2;
use smallvec::SmallVec;

use sifter_simulation::{
    Cell, CellFlags, MAX_REACH, MAX_VELOCITY, MaterialDef, MaterialType, Materials,
};

use super::activity::{DirtyLog, mark_with_neighbors};
use super::chunk::DirtyRect;
use super::grid::CellStore;
use super::scheduler::Footprint;
use super::{CHUNK_SIZE, WorldRng};
use crate::error::EngineError;

/// Whether a `mover` travelling with vertical direction `dy` may swap with `target`
///
/// Air always yields. Static and powder cells never do. Otherwise the lighter
/// cell gives way: downwards and sideways the mover must be denser, upwards
/// (gases, bounces) it must be lighter.
pub fn can_displace(mover: &MaterialDef, target: &Cell, target_def: &MaterialDef, dy: i32) -> bool {
    if target.is_owned() {
        return false;
    }
    if target.is_empty() {
        return true;
    }
    if target.flags.contains(CellFlags::STATIC) {
        return false;
    }
    match target_def.material_type {
        MaterialType::Static | MaterialType::Powder => false,
        _ if dy > 0 => mover.density < target_def.density,
        _ => mover.density > target_def.density,
    }
}

/// What a cell does once it has stopped on a support
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestRule {
    /// Slide into an open diagonal on the gravity side
    Topple,
    /// Flow sideways toward a drop or the farthest level cell
    Spread,
    /// Topple first, then spread
    Disperse,
}

/// Per-category reaction to a blocked trace
pub trait CollisionResponse: Sync {
    /// -1 when gravity pulls down, +1 when the category rises
    fn gravity_dir(&self) -> i32;

    fn rest_rule(&self) -> RestRule;

    fn vertical_hit(&self, cell: &mut Cell, material: &MaterialDef) {
        cell.vel_y = bounce(cell.vel_y, material.restitution);
        cell.frac_y = 0;
    }

    fn horizontal_hit(&self, cell: &mut Cell, material: &MaterialDef) {
        cell.vel_x = bounce(cell.vel_x, material.restitution);
        cell.frac_x = 0;
    }
}

pub struct PowderResponse;
pub struct LiquidResponse;
pub struct GasResponse;

impl CollisionResponse for PowderResponse {
    fn gravity_dir(&self) -> i32 {
        -1
    }

    fn rest_rule(&self) -> RestRule {
        RestRule::Topple
    }

    /// Landing grains turn part of the lost fall speed into sideways speed
    fn vertical_hit(&self, cell: &mut Cell, material: &MaterialDef) {
        let before = cell.vel_y;
        cell.vel_y = bounce(before, material.restitution);
        cell.frac_y = 0;

        if before < 0 && cell.vel_x != 0 {
            let lost = before.unsigned_abs() - cell.vel_y.unsigned_abs();
            let kick = (lost / 2) as i8;
            cell.vel_x = (cell.vel_x + cell.vel_x.signum() * kick).clamp(-MAX_VELOCITY, MAX_VELOCITY);
        }
    }
}

impl CollisionResponse for LiquidResponse {
    fn gravity_dir(&self) -> i32 {
        -1
    }

    fn rest_rule(&self) -> RestRule {
        RestRule::Spread
    }
}

impl CollisionResponse for GasResponse {
    fn gravity_dir(&self) -> i32 {
        1
    }

    fn rest_rule(&self) -> RestRule {
        RestRule::Disperse
    }
}

pub fn response_for(material_type: MaterialType) -> Option<&'static dyn CollisionResponse> {
    match material_type {
        MaterialType::Static => None,
        MaterialType::Powder => Some(&PowderResponse),
        MaterialType::Liquid => Some(&LiquidResponse),
        MaterialType::Gas => Some(&GasResponse),
    }
}

/// Reflect a velocity component, rounding toward zero
fn bounce(vel: i8, restitution: f32) -> i8 {
    (-(vel as f32) * restitution).trunc() as i8
}

/// Cells visited moving from `from` to `to`, excluding `from`
fn trace_path(from: IVec2, to: IVec2) -> SmallVec<[IVec2; 8]> {
    let mut path: SmallVec<[IVec2; 8]> = SmallVec::new();
    let points = Bresenham::new(
        (from.x as isize, from.y as isize),
        (to.x as isize, to.y as isize),
    )
    .map(|(x, y)| IVec2::new(x as i32, y as i32))
    .chain(std::iter::once(to));

    for point in points {
        if point != from && path.last() != Some(&point) {
            path.push(point);
        }
    }
    path
}

/// Result of one chunk job, merged serially by the frame driver
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub log: DirtyLog,
    pub moved: u32,
    pub collisions: u32,
}

/// Simulates the core of one chunk for one frame
///
/// Reads and writes go straight to the shared [`CellStore`]; dirty marks go
/// to a private [`DirtyLog`].
pub struct ChunkSimulator<'a, R: WorldRng> {
    cells: &'a CellStore,
    materials: &'a Materials,
    frame: u32,
    gravity: i16,
    chunk_pos: IVec2,
    footprint: Footprint,
    rng: R,
    outcome: ChunkOutcome,
}

impl<'a, R: WorldRng> ChunkSimulator<'a, R> {
    pub fn new(
        cells: &'a CellStore,
        materials: &'a Materials,
        frame: u32,
        gravity: i16,
        chunk_pos: IVec2,
        rng: R,
    ) -> Self {
        Self {
            cells,
            materials,
            frame,
            gravity,
            chunk_pos,
            footprint: Footprint::of_core(chunk_pos, MAX_REACH),
            rng,
            outcome: ChunkOutcome::default(),
        }
    }

    /// Sweep `sweep` (chunk-local) bottom to top, alternating column order
    pub fn run(mut self, sweep: DirtyRect) -> ChunkOutcome {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let origin = self.chunk_pos * CHUNK_SIZE as i32;
        for ly in sweep.min_y..=sweep.max_y {
            let left_to_right = (ly as u32).wrapping_add(self.frame) % 2 == 0;
            for i in 0..sweep.width() {
                let lx = if left_to_right {
                    sweep.min_x + i
                } else {
                    sweep.max_x - i
                };
                self.simulate_cell(origin.x + lx as i32, origin.y + ly as i32);
            }
        }
        self.outcome
    }

    pub fn finish(self) -> ChunkOutcome {
        self.outcome
    }

    pub fn simulate_cell(&mut self, x: i32, y: i32) {
        let Some(index) = self.cells.index(x, y) else {
            return;
        };
        let before = self.cells.load(index);
        if before.frame == self.frame
            || before.is_owned()
            || before.is_empty()
            || before.flags.contains(CellFlags::STATIC)
        {
            return;
        }

        let materials = self.materials;
        let material = materials.get(before.material_id);
        let Some(response) = response_for(material.material_type) else {
            return;
        };
        let fall = response.gravity_dir();
        let origin = IVec2::new(x, y);
        let mut cell = before;

        if self.can_enter(origin + IVec2::new(0, fall), fall, material) {
            cell.accelerate(0, fall as i16 * self.gravity);
        } else {
            // Supported: no accumulation against the floor
            cell.frac_y = 0;
            if cell.vel_x != 0 && self.rng.check_probability(material.friction) {
                cell.vel_x -= cell.vel_x.signum();
            }
        }

        let mut pos = self.trace(origin, &mut cell, material, response);

        if cell.is_at_rest() && !self.can_enter(pos + IVec2::new(0, fall), fall, material) {
            let settled = match response.rest_rule() {
                RestRule::Topple => self.topple(pos, fall, material),
                RestRule::Spread => self.spread(pos, &mut cell, fall, material),
                RestRule::Disperse => match self.topple(pos, fall, material) {
                    Some(to) => Some(to),
                    None => self.spread(pos, &mut cell, fall, material),
                },
            };
            if let Some(to) = settled {
                pos = to;
            }
        }

        if pos != origin {
            cell.frame = self.frame;
            self.write(pos, &cell);
            self.outcome.moved += 1;
        } else if cell != before {
            self.write(origin, &cell);
        }
    }

    /// March along the velocity; returns where the cell ends up
    fn trace(
        &mut self,
        origin: IVec2,
        cell: &mut Cell,
        material: &MaterialDef,
        response: &dyn CollisionResponse,
    ) -> IVec2 {
        let target = origin + IVec2::new(cell.vel_x as i32, cell.vel_y as i32);
        let mut pos = origin;

        for next in trace_path(origin, target) {
            let step = next - pos;
            if self.can_enter(next, step.y, material) {
                self.displace(pos, next);
                pos = next;
                continue;
            }

            let (vertical, horizontal) = if step.x != 0 && step.y != 0 {
                let v = !self.can_enter(pos + IVec2::new(0, step.y), step.y, material);
                let h = !self.can_enter(pos + IVec2::new(step.x, 0), 0, material);
                // Only the corner blocked: treat as landing
                (v || !h, h)
            } else {
                (step.y != 0, step.x != 0)
            };

            if vertical {
                response.vertical_hit(cell, material);
            }
            if horizontal {
                response.horizontal_hit(cell, material);
            }
            self.outcome.collisions += 1;
            break;
        }
        pos
    }

    fn topple(&mut self, from: IVec2, fall: i32, material: &MaterialDef) -> Option<IVec2> {
        let dir = if self.rng.gen_bool() { -1 } else { 1 };
        for dx in [dir, -dir] {
            let to = from + IVec2::new(dx, fall);
            if !self.can_enter(to, fall, material) {
                continue;
            }
            if self.rng.check_probability(material.stability) {
                if material.stability < 1.0 {
                    self.mark(from);
                }
                return None;
            }
            self.displace(from, to);
            return Some(to);
        }
        None
    }

    fn spread(
        &mut self,
        from: IVec2,
        cell: &mut Cell,
        fall: i32,
        material: &MaterialDef,
    ) -> Option<IVec2> {
        let preferred = if cell.flags.contains(CellFlags::FLOW_LEFT) {
            -1
        } else {
            1
        };
        let (dir, to) = [preferred, -preferred].into_iter().find_map(|dir| {
            self.spread_target(from, dir, fall, material)
                .map(|to| (dir, to))
        })?;

        if !self.rng.check_probability(material.spread_chance) {
            self.mark(from);
            return None;
        }

        cell.flags.set(CellFlags::FLOW_LEFT, dir < 0);
        let mut pos = from;
        while pos != to {
            let next = pos + IVec2::new(dir, 0);
            self.displace(pos, next);
            pos = next;
        }
        Some(to)
    }

    /// First cell within `spread` that has an open drop, else the farthest
    /// enterable cell on the same row
    fn spread_target(&self, from: IVec2, dir: i32, fall: i32, material: &MaterialDef) -> Option<IVec2> {
        let mut farthest = None;
        for k in 1..=material.spread as i32 {
            let pos = from + IVec2::new(dir * k, 0);
            if !self.can_enter(pos, 0, material) {
                break;
            }
            if self.can_enter(pos + IVec2::new(0, fall), fall, material) {
                return Some(pos);
            }
            farthest = Some(pos);
        }
        farthest
    }

    fn can_enter(&self, pos: IVec2, dy: i32, mover: &MaterialDef) -> bool {
        let Some(index) = self.cells.index(pos.x, pos.y) else {
            return false; // World edges are solid
        };
        let target = self.cells.load(index);
        can_displace(mover, &target, self.materials.get(target.material_id), dy)
    }

    /// Move whatever sits at `to` back into `from`
    fn displace(&mut self, from: IVec2, to: IVec2) {
        let Some(index) = self.cells.index(to.x, to.y) else {
            return;
        };
        let mut displaced = self.cells.load(index);
        if !displaced.is_empty() {
            displaced.frame = self.frame;
        }
        self.write(from, &displaced);
    }

    fn write(&mut self, pos: IVec2, cell: &Cell) {
        debug_assert!(
            self.footprint.contains(pos.x, pos.y),
            "chunk {} wrote ({}, {}) outside its footprint",
            self.chunk_pos,
            pos.x,
            pos.y
        );
        let Some(index) = self.cells.index(pos.x, pos.y) else {
            return;
        };

        let owner = self.cells.load_owner(index);
        if owner != 0 {
            let err = EngineError::InvariantViolation {
                x: pos.x,
                y: pos.y,
                reason: "movement reached an owned cell",
            };
            log::error!("{err}");
            debug_assert_eq!(owner, 0, "{err}");
            return;
        }

        self.cells.store(index, cell);
        self.mark(pos);
    }

    fn mark(&mut self, pos: IVec2) {
        mark_with_neighbors(&mut self.outcome.log, self.cells, pos.x, pos.y);
    }
}
