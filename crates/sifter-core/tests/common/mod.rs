//! Shared helpers for engine integration tests
#![allow(dead_code)]

use sifter_core::simulation::{Cell, MaterialId, Materials};
use sifter_core::world::{NoopStats, World};
use sifter_core::EngineConfig;

pub fn world(chunks_x: u32, chunks_y: u32, threads: usize, seed: u64) -> World {
    let config = EngineConfig {
        chunks_x,
        chunks_y,
        worker_threads: threads,
        seed,
        ..Default::default()
    };
    World::new(config, Materials::new()).expect("valid test world")
}

pub fn fill(world: &mut World, x0: i32, y0: i32, x1: i32, y1: i32, material: u16) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            world.grid_mut().set(x, y, material).unwrap();
        }
    }
}

pub fn floor(world: &mut World, y: i32) {
    let width = world.grid().width() as i32;
    fill(world, 0, y, width - 1, y, MaterialId::STONE);
}

/// Every cell, row-major
pub fn snapshot(world: &World) -> Vec<Cell> {
    let grid = world.grid();
    let mut cells = Vec::with_capacity((grid.width() * grid.height()) as usize);
    for y in 0..grid.height() as i32 {
        for x in 0..grid.width() as i32 {
            cells.push(grid.get(x, y).unwrap());
        }
    }
    cells
}

pub fn run(world: &mut World, frames: u32) {
    for _ in 0..frames {
        let report = world.step(&mut NoopStats);
        assert!(!report.aborted, "frame {} aborted", report.frame);
    }
}

/// Step until no chunk is queued; returns frames taken
pub fn run_until_idle(world: &mut World, max_frames: u32) -> Option<u32> {
    for frame in 1..=max_frames {
        world.step(&mut NoopStats);
        if world.active_chunk_count() == 0 {
            return Some(frame);
        }
    }
    None
}

/// Height of the `material` column at `x`, counted from `y0` upwards
pub fn column_height(world: &World, x: i32, y0: i32, material: u16) -> usize {
    let grid = world.grid();
    (y0..grid.height() as i32)
        .filter(|&y| grid.get(x, y).unwrap().material_id == material)
        .count()
}
