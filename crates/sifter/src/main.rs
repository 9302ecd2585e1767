use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sifter::{Overrides, RunnerConfig, Scenario};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: sifter.ron in the working directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paint a scenario and simulate it
    Run {
        #[arg(long, value_enum, default_value_t = Scenario::Pile)]
        scenario: Scenario,

        /// Frames to simulate (default from config)
        #[arg(long)]
        frames: Option<u32>,

        /// Worker threads (0 = one per core)
        #[arg(long)]
        threads: Option<usize>,

        /// Seed for the per-chunk random streams
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List the material table
    Materials,

    /// Validate the material table against the chunk spacing
    Check,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    #[cfg(feature = "profiling")]
    {
        puffin::set_scopes_on(true);
        log::info!("Puffin scopes enabled");
    }

    let args = Args::parse();
    let mut config = RunnerConfig::load_from(args.config.as_deref())?;

    match args.command {
        Command::Run {
            scenario,
            frames,
            threads,
            seed,
        } => {
            config.apply(Overrides {
                frames,
                threads,
                seed,
            });
            run(&config, scenario)
        }
        Command::Materials => {
            let materials = sifter::load_materials(&config)?;
            for line in sifter::material_table(&materials) {
                println!("{line}");
            }
            Ok(())
        }
        Command::Check => sifter::check(&config),
    }
}

fn run(config: &RunnerConfig, scenario: Scenario) -> anyhow::Result<()> {
    let mut world = sifter::build_world(config)?;
    let materials = world.materials().clone();

    log::info!(
        "Running '{}' for {} frames on {} threads (seed {})",
        scenario,
        config.run.frames,
        world.worker_threads(),
        config.engine.seed
    );

    let summary = sifter::scenario::run(
        &mut world,
        scenario,
        config.run.frames,
        config.run.report_interval,
    )
    .with_context(|| format!("Scenario '{scenario}' does not fit the world"))?;

    log::info!(
        "Done: {} frames, {} chunk jobs, {} cells moved, {} collisions, {} cells fed, {} chunks still active",
        summary.frames,
        summary.stats.chunks_simulated,
        summary.stats.cells_moved,
        summary.stats.collisions,
        summary.cells_fed,
        summary.active_chunks
    );
    for def in materials.iter() {
        let id = def.id as usize;
        let before = summary.census_before.get(id).copied().unwrap_or(0);
        let after = summary.census_after.get(id).copied().unwrap_or(0);
        if id != 0 && (before > 0 || after > 0) {
            log::info!("  {:<12} {:>8} -> {:>8}", def.name, before, after);
        }
    }

    if summary.aborted_frames > 0 {
        log::warn!("{} frames were aborted by a panicking chunk job", summary.aborted_frames);
    }
    Ok(())
}
