//! # Sifter - headless runner
//!
//! Loads layered configuration, builds a `World` and drives built-in
//! scenarios without any rendering.

pub mod config;
pub mod scenario;

use std::fs;

use anyhow::{Context, Result};
use sifter_core::world::{Schedule, World, material_reach};
use sifter_core::CHUNK_SIZE;
use sifter_simulation::Materials;

pub use config::{Overrides, RunnerConfig};
pub use scenario::{RunSummary, Scenario};

/// Built-in materials, extended by the configured RON file if any
pub fn load_materials(config: &RunnerConfig) -> Result<Materials> {
    let Some(path) = &config.run.materials_file else {
        return Ok(Materials::new());
    };
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read material file {}", path.display()))?;
    let materials = Materials::from_ron(&source)
        .with_context(|| format!("Invalid material file {}", path.display()))?;
    log::info!("Loaded {} materials from {}", materials.len(), path.display());
    Ok(materials)
}

pub fn build_world(config: &RunnerConfig) -> Result<World> {
    let materials = load_materials(config)?;
    World::new(config.engine.clone(), materials).context("Failed to create world")
}

/// One line per registered material: id, name, type, density, spread, reach
pub fn material_table(materials: &Materials) -> Vec<String> {
    materials
        .iter()
        .filter(|def| def.name != "unknown")
        .map(|def| {
            let kind = format!("{:?}", def.material_type);
            format!(
                "{:>4}  {:<12} {:<8} density {:>5.2}  spread {}  reach {}",
                def.id,
                def.name,
                kind,
                def.density,
                def.spread,
                material_reach(def)
            )
        })
        .collect()
}

/// Verify the spacing invariant for the configured material table
pub fn check(config: &RunnerConfig) -> Result<()> {
    let materials = load_materials(config)?;
    Schedule::validate(&materials).context("Material table is unsafe to schedule")?;

    let widest = materials.iter().map(material_reach).max().unwrap_or(0);
    log::info!(
        "{} materials OK: widest reach {} fits the {}-cell core gap",
        materials.len(),
        widest,
        CHUNK_SIZE
    );
    Ok(())
}
