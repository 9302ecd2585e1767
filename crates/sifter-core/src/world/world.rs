//! World - owns the grid and drives one frame of chunk jobs

use std::panic::{self, AssertUnwindSafe};

use glam::IVec2;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sifter_simulation::{Materials, SUBCELL};

use super::activity::{ActivitySummary, ActivityTracker};
use super::chunk::{ChunkState, DirtyRect};
use super::grid::Grid;
use super::movement::{ChunkOutcome, ChunkSimulator};
use super::rng_trait::chunk_rng;
use super::scheduler::{ChunkGroup, Schedule};
use super::stats::SimStats;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Simulation rate for [`World::update`]
const FIXED_TIMESTEP: f32 = 1.0 / 60.0;

/// Cap on steps per `update` call; a slow host slows the world down instead
/// of falling further behind
const MAX_STEPS_PER_FRAME: u32 = 2;

/// Summary of one `step`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u32,
    pub chunks_simulated: usize,
    pub cells_moved: u64,
    pub collisions: u64,
    /// A chunk job panicked; remaining groups were skipped
    pub aborted: bool,
    pub activity: ActivitySummary,
}

/// One scheduled chunk job
#[derive(Clone, Copy, Debug)]
struct ChunkJob {
    index: usize,
    pos: IVec2,
    sweep: DirtyRect,
}

type JobResult = std::thread::Result<ChunkOutcome>;

pub struct World {
    config: EngineConfig,
    materials: Materials,
    grid: Grid,
    pool: ThreadPool,

    /// Current frame stamp (0 is never used)
    frame: u32,

    time_accumulator: f32,

    /// Chunk whose job panics, for exercising frame aborts
    #[cfg(test)]
    fail_chunk: Option<IVec2>,
}

impl World {
    pub fn new(config: EngineConfig, materials: Materials) -> Result<Self, EngineError> {
        config.validate()?;
        Schedule::validate(&materials)?;

        let mut builder =
            ThreadPoolBuilder::new().thread_name(|i| format!("sifter-worker-{i}"));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder.build()?;

        log::info!(
            "World: {}x{} chunks, {} materials, {} worker threads",
            config.chunks_x,
            config.chunks_y,
            materials.len(),
            pool.current_num_threads()
        );

        Ok(Self {
            grid: Grid::new(config.chunks_x, config.chunks_y),
            config,
            materials,
            pool,
            frame: 0,
            time_accumulator: 0.0,
            #[cfg(test)]
            fail_chunk: None,
        })
    }

    /// Advance by wall-clock time using a fixed timestep
    ///
    /// Returns the number of frames stepped.
    pub fn update(&mut self, dt: f32, stats: &mut dyn SimStats) -> u32 {
        self.time_accumulator += dt;

        let mut steps = 0;
        while self.time_accumulator >= FIXED_TIMESTEP && steps < MAX_STEPS_PER_FRAME {
            self.step(stats);
            self.time_accumulator -= FIXED_TIMESTEP;
            steps += 1;
        }

        // Clamp accumulator to prevent runaway
        if self.time_accumulator > FIXED_TIMESTEP * 2.0 {
            self.time_accumulator = FIXED_TIMESTEP;
        }
        steps
    }

    /// Run one frame: plan, then groups A to D, merging dirty logs after each
    pub fn step(&mut self, stats: &mut dyn SimStats) -> FrameReport {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.frame = self.frame.wrapping_add(1);
        if self.frame == 0 {
            self.frame = 1;
        }
        let frame = self.frame;
        let seed = self.config.seed;
        let gravity = SUBCELL / self.config.gravity_divisor as i16;
        let materials = &self.materials;
        let pool = &self.pool;
        #[cfg(test)]
        let fail_chunk = self.fail_chunk;

        let (cells, chunks) = self.grid.split_mut();
        let (plan, activity) = ActivityTracker::plan_frame(chunks);
        let active: Vec<IVec2> = plan.iter().map(|&i| chunks[i].pos).collect();
        let groups = Schedule::partition(&active);

        let mut report = FrameReport {
            frame,
            activity,
            ..Default::default()
        };

        for group in ChunkGroup::ALL {
            let jobs: Vec<ChunkJob> = groups[group.index()]
                .iter()
                .filter_map(|&pos| {
                    let index = cells.chunk_index(pos)?;
                    let sweep = chunks[index].sweep_rect?;
                    Some(ChunkJob { index, pos, sweep })
                })
                .collect();
            if jobs.is_empty() {
                continue;
            }

            #[cfg(feature = "profiling")]
            puffin::profile_scope!("group", group.to_string());

            let results: Vec<JobResult> = pool.install(|| {
                jobs.par_iter()
                    .map(|job| {
                        panic::catch_unwind(AssertUnwindSafe(|| {
                            #[cfg(feature = "profiling")]
                            puffin::profile_scope!("chunk");

                            #[cfg(test)]
                            if fail_chunk == Some(job.pos) {
                                panic!("injected failure in chunk {}", job.pos);
                            }

                            let rng = chunk_rng(seed, frame, job.index);
                            ChunkSimulator::new(cells, materials, frame, gravity, job.pos, rng)
                                .run(job.sweep)
                        }))
                    })
                    .collect()
            });

            if !merge_group(chunks, &jobs, results, stats, &mut report) {
                log::error!(
                    "Frame {} aborted in group {}; {} planned chunks re-queued",
                    frame,
                    group,
                    plan.len()
                );
                ActivityTracker::mark_all_dirty(chunks, &plan);
                report.aborted = true;
                break;
            }
        }

        let queued = ActivityTracker::settle(chunks);
        log::debug!(
            "Frame {}: {} chunks simulated, {} cells moved, {} collisions, {} queued",
            frame,
            report.chunks_simulated,
            report.cells_moved,
            report.collisions,
            queued
        );
        report
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn materials(&self) -> &Materials {
        &self.materials
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Chunks queued for the next frame
    pub fn active_chunk_count(&self) -> usize {
        ActivityTracker::queued_count(self.grid.chunks())
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Fold one group's results into chunk state, stats and the report
///
/// Returns `false` when any job panicked. Successful logs are still merged.
fn merge_group(
    chunks: &mut [ChunkState],
    jobs: &[ChunkJob],
    results: Vec<JobResult>,
    stats: &mut dyn SimStats,
    report: &mut FrameReport,
) -> bool {
    let mut ok = true;
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(outcome) => {
                outcome.log.merge_into(chunks);
                for _ in 0..outcome.moved {
                    stats.record_cell_moved();
                }
                for _ in 0..outcome.collisions {
                    stats.record_collision();
                }
                stats.record_chunk_simulated();

                report.chunks_simulated += 1;
                report.cells_moved += outcome.moved as u64;
                report.collisions += outcome.collisions as u64;
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("Chunk {} job panicked: {}", job.pos, message);
                ok = false;
            }
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{CountingStats, NoopStats};
    use sifter_simulation::MaterialId;

    fn small_world(threads: usize) -> World {
        let config = EngineConfig {
            chunks_x: 2,
            chunks_y: 2,
            worker_threads: threads,
            ..Default::default()
        };
        World::new(config, Materials::new()).unwrap()
    }

    #[test]
    fn test_new_world_is_idle() {
        let mut world = small_world(1);
        assert_eq!(world.frame(), 0);
        assert_eq!(world.active_chunk_count(), 0);

        let report = world.step(&mut NoopStats);
        assert_eq!(report.frame, 1);
        assert_eq!(report.chunks_simulated, 0);
        assert!(!report.aborted);
    }

    #[test]
    fn test_frame_counter_skips_zero() {
        let mut world = small_world(1);
        world.frame = u32::MAX;
        assert_eq!(world.step(&mut NoopStats).frame, 1);
    }

    #[test]
    fn test_step_moves_cells_and_counts() {
        let mut world = small_world(2);
        world.grid_mut().set(10, 40, MaterialId::SAND).unwrap();
        assert!(world.active_chunk_count() >= 1);

        let mut stats = CountingStats::default();
        let report = world.step(&mut stats);

        assert_eq!(report.cells_moved, 1);
        assert_eq!(stats.cells_moved, 1);
        assert_eq!(stats.chunks_simulated, report.chunks_simulated as u64);
        assert_eq!(world.grid().get(10, 39).unwrap().material_id, MaterialId::SAND);
    }

    #[test]
    fn test_update_caps_steps() {
        let mut world = small_world(1);
        assert_eq!(world.update(1.0, &mut NoopStats), MAX_STEPS_PER_FRAME);
        assert_eq!(world.frame(), 2);

        // Accumulator was clamped; the next short tick runs at most one step
        assert!(world.update(0.001, &mut NoopStats) <= 1);
    }

    #[test]
    fn test_update_waits_for_full_timestep() {
        let mut world = small_world(1);
        assert_eq!(world.update(FIXED_TIMESTEP / 2.0, &mut NoopStats), 0);
        assert_eq!(world.update(FIXED_TIMESTEP / 2.0 + 0.001, &mut NoopStats), 1);
    }

    #[test]
    fn test_panicked_job_requeues_plan() {
        let mut chunks: Vec<ChunkState> = (0..4)
            .map(|i| ChunkState::new(IVec2::new(i % 2, i / 2)))
            .collect();
        let jobs = [
            ChunkJob {
                index: 0,
                pos: IVec2::new(0, 0),
                sweep: DirtyRect::full(),
            },
            ChunkJob {
                index: 3,
                pos: IVec2::new(1, 1),
                sweep: DirtyRect::full(),
            },
        ];
        let failure: Box<dyn std::any::Any + Send> = Box::new("boom");
        let results: Vec<JobResult> = vec![Ok(ChunkOutcome::default()), Err(failure)];

        let mut report = FrameReport::default();
        let ok = merge_group(&mut chunks, &jobs, results, &mut NoopStats, &mut report);
        assert!(!ok);
        assert_eq!(report.chunks_simulated, 1);

        ActivityTracker::mark_all_dirty(&mut chunks, &[0, 3]);
        assert_eq!(chunks[0].dirty_rect, Some(DirtyRect::full()));
        assert_eq!(chunks[3].dirty_rect, Some(DirtyRect::full()));
        assert!(!chunks[1].is_dirty());
    }

    #[test]
    fn test_step_aborts_on_panicking_job_and_requeues_plan() {
        let mut world = small_world(2);
        let grains = [(10, 10), (42, 10), (10, 42), (42, 42)];
        for (x, y) in grains {
            world.grid_mut().set(x, y, MaterialId::SAND).unwrap();
        }
        // Group B: group A has already run when it fails
        world.fail_chunk = Some(IVec2::new(1, 0));

        let report = world.step(&mut NoopStats);
        assert!(report.aborted);
        assert_eq!(report.activity.active, 4);
        assert_eq!(report.chunks_simulated, 1);
        for chunk in world.grid().chunks() {
            assert_eq!(chunk.dirty_rect, Some(DirtyRect::full()), "chunk {} not re-queued", chunk.pos);
        }
        // Groups C and D never ran
        assert_eq!(world.grid().get(10, 42).unwrap().material_id, MaterialId::SAND);
        assert_eq!(world.grid().get(42, 42).unwrap().material_id, MaterialId::SAND);

        world.fail_chunk = None;
        let report = world.step(&mut NoopStats);
        assert!(!report.aborted);
        assert_eq!(report.chunks_simulated, 4);
        assert_eq!(world.grid().get(10, 41).unwrap().material_id, MaterialId::SAND);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            gravity_divisor: 0,
            ..Default::default()
        };
        assert!(World::new(config, Materials::new()).is_err());

        // Would truncate gravity to zero and freeze every falling cell
        let config = EngineConfig {
            gravity_divisor: 100,
            ..Default::default()
        };
        assert!(matches!(
            World::new(config, Materials::new()),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
