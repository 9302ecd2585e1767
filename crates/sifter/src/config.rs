//! Runner configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `sifter.ron` file (if exists), or the file given with `--config`
//! 3. Environment variables prefixed with `SIFTER_`
//! 4. Command-line overrides
//!
//! Example environment variable: `SIFTER_ENGINE__WORKER_THREADS=4`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use sifter_core::EngineConfig;

/// Main runner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub run: RunConfig,
}

/// Scenario run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Frames to simulate when `--frames` is not given
    pub frames: u32,
    /// Log a progress line every this many frames (0 = only the summary)
    pub report_interval: u32,
    /// Optional RON file with extra or overriding material definitions
    pub materials_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            report_interval: 60,
            materials_file: None,
        }
    }
}

/// Values given on the command line; `None` keeps the layered value
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub frames: Option<u32>,
    pub threads: Option<usize>,
    pub seed: Option<u64>,
}

impl RunnerConfig {
    /// Load with layered priority, reading `sifter.ron` from the working
    /// directory when present
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with layered priority; an explicit `path` must exist
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let engine = EngineConfig::default();
        let run = RunConfig::default();

        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Ron).required(true),
            None => File::with_name("sifter").format(FileFormat::Ron).required(false),
        };

        let builder = Config::builder()
            // Layer 1: Compiled defaults
            .set_default("engine.chunks_x", engine.chunks_x as i64)?
            .set_default("engine.chunks_y", engine.chunks_y as i64)?
            .set_default("engine.gravity_divisor", engine.gravity_divisor as i64)?
            .set_default("engine.worker_threads", engine.worker_threads as i64)?
            .set_default("engine.seed", engine.seed)?
            .set_default("run.frames", run.frames as i64)?
            .set_default("run.report_interval", run.report_interval as i64)?
            // Layer 2: Config file
            .add_source(file)
            // Layer 3: Environment variables (SIFTER_ENGINE__SEED, etc.)
            .add_source(Environment::with_prefix("SIFTER").separator("__"));

        let config = builder.build().context("Failed to build configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        loaded
            .engine
            .validate()
            .context("Invalid engine configuration")?;
        Ok(loaded)
    }

    /// Layer 4: command-line values win over everything else
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(frames) = overrides.frames {
            self.run.frames = frames;
        }
        if let Some(threads) = overrides.threads {
            self.engine.worker_threads = threads;
        }
        if let Some(seed) = overrides.seed {
            self.engine.seed = seed;
        }
    }
}
