//! Built-in scenes for the headless runner
//!
//! Each scenario paints a starting scene scaled to the world size, and may
//! feed new material every frame (the vent and the rain).

use std::fmt;

use clap::ValueEnum;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use sifter_core::world::{CountingStats, World};
use sifter_core::GridError;
use sifter_simulation::MaterialId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// A sand column collapsing into a pile
    Pile,
    /// Water released into a walled basin
    Basin,
    /// Steam rising from a vent into a cave with a pool of oil
    Vent,
    /// Water and gravel raining onto stone ledges
    Rain,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Pile,
        Scenario::Basin,
        Scenario::Vent,
        Scenario::Rain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Pile => "pile",
            Scenario::Basin => "basin",
            Scenario::Vent => "vent",
            Scenario::Rain => "rain",
        }
    }

    /// Paint the starting scene
    pub fn paint(self, world: &mut World) -> Result<(), GridError> {
        let w = world.grid().width() as i32;
        let h = world.grid().height() as i32;

        fill(world, 0, 0, w - 1, 0, MaterialId::BEDROCK)?;
        match self {
            Scenario::Pile => {
                let half = (w / 16).max(2);
                fill(world, w / 2 - half, h / 2, w / 2 + half, h * 3 / 4, MaterialId::SAND)?;
                fill(world, w / 2 - half, h * 3 / 4 + 1, w / 2 + half, h * 3 / 4 + 4, MaterialId::GRAVEL)?;
            }
            Scenario::Basin => {
                let (left, right, top) = (w / 4, w * 3 / 4, h / 3);
                fill(world, left, 1, left, top, MaterialId::STONE)?;
                fill(world, right, 1, right, top, MaterialId::STONE)?;
                let pour = (right - left) / 4;
                fill(world, left + 1, top / 2, left + pour, top, MaterialId::WATER)?;
            }
            Scenario::Vent => {
                fill(world, 0, h - 1, w - 1, h - 1, MaterialId::STONE)?;
                fill(world, w / 8, 1, w / 3, h / 10, MaterialId::OIL)?;
                fill(world, w / 2 - 2, 1, w / 2 - 2, 4, MaterialId::STONE)?;
                fill(world, w / 2 + 2, 1, w / 2 + 2, 4, MaterialId::STONE)?;
            }
            Scenario::Rain => {
                for i in 1..4 {
                    let y = h * i / 4;
                    let x0 = (w * i / 5) - w / 10;
                    fill(world, x0, y, x0 + w / 5, y, MaterialId::STONE)?;
                }
            }
        }
        Ok(())
    }

    /// Emit material for `frame`; returns the number of cells placed
    pub fn feed(self, world: &mut World, rng: &mut Xoshiro256StarStar) -> Result<u32, GridError> {
        let w = world.grid().width() as i32;
        let h = world.grid().height() as i32;

        let mut placed = 0;
        match self {
            Scenario::Pile | Scenario::Basin => {}
            Scenario::Vent => {
                for x in w / 2 - 1..=w / 2 + 1 {
                    if world.grid().get(x, 1)?.is_empty() {
                        world.grid_mut().set(x, 1, MaterialId::STEAM)?;
                        placed += 1;
                    }
                }
            }
            Scenario::Rain => {
                for _ in 0..(w / 64).max(1) {
                    let x = rng.gen_range(0..w);
                    let material = if rng.gen_bool(0.2) {
                        MaterialId::GRAVEL
                    } else {
                        MaterialId::WATER
                    };
                    if world.grid().get(x, h - 1)?.is_empty() {
                        world.grid_mut().set(x, h - 1, material)?;
                        placed += 1;
                    }
                }
            }
        }
        Ok(placed)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn fill(world: &mut World, x0: i32, y0: i32, x1: i32, y1: i32, material: u16) -> Result<(), GridError> {
    let grid = world.grid_mut();
    for y in y0..=y1 {
        for x in x0..=x1 {
            grid.set(x, y, material)?;
        }
    }
    Ok(())
}

/// Totals of one scenario run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames: u32,
    pub aborted_frames: u32,
    pub cells_fed: u64,
    pub stats: CountingStats,
    pub census_before: Vec<usize>,
    pub census_after: Vec<usize>,
    /// Chunks still queued when the run ended
    pub active_chunks: usize,
}

/// Paint `scenario`, then step `frames` frames, logging every
/// `report_interval` frames
pub fn run(
    world: &mut World,
    scenario: Scenario,
    frames: u32,
    report_interval: u32,
) -> Result<RunSummary, GridError> {
    scenario.paint(world)?;

    let materials = world.materials().clone();
    let mut rng = Xoshiro256StarStar::seed_from_u64(world.config().seed);
    let mut summary = RunSummary {
        census_before: world.grid().count_materials(&materials),
        ..Default::default()
    };

    for _ in 0..frames {
        summary.cells_fed += scenario.feed(world, &mut rng)? as u64;
        let report = world.step(&mut summary.stats);
        summary.frames += 1;
        if report.aborted {
            summary.aborted_frames += 1;
        }

        if report_interval > 0 && report.frame % report_interval == 0 {
            log::info!(
                "[{}] frame {}: {} chunks, {} cells moved, {} woken, {} slept",
                scenario,
                report.frame,
                report.chunks_simulated,
                report.cells_moved,
                report.activity.woken,
                report.activity.slept
            );
        }
    }

    summary.census_after = world.grid().count_materials(&materials);
    summary.active_chunks = world.active_chunk_count();
    Ok(summary)
}
