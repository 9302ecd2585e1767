//! Cell and material data for the sifter engine
//!
//! This crate provides the foundational data types for the simulation:
//! - Material definitions (MaterialId, MaterialDef, Materials)
//! - Material behavior categories and capability flags (MaterialType, MaterialFlags)
//! - Cell types and engine limits (Cell, CellFlags, CHUNK_SIZE, MAX_VELOCITY, MAX_SPREAD)

mod cell;
mod materials;

pub use cell::{
    CHUNK_SIZE, Cell, CellFlags, MAX_REACH, MAX_SPREAD, MAX_VELOCITY, SUBCELL,
};
pub use materials::{MaterialDef, MaterialError, MaterialFlags, MaterialId, MaterialType, Materials};
