//! Material definitions and registry

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::MAX_SPREAD;

/// Built-in material IDs
pub struct MaterialId;

impl MaterialId {
    pub const AIR: u16 = 0;
    pub const STONE: u16 = 1;
    pub const SAND: u16 = 2;
    pub const WATER: u16 = 3;
    pub const BEDROCK: u16 = 4;
    pub const DIRT: u16 = 5;
    pub const GRAVEL: u16 = 6;
    pub const OIL: u16 = 7;
    pub const LAVA: u16 = 8;
    pub const STEAM: u16 = 9;
    pub const SMOKE: u16 = 10;
}

/// How a material behaves physically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    /// Doesn't move (stone, bedrock)
    Static,
    /// Falls, piles up (sand, gravel, dirt)
    Powder,
    /// Flows, seeks level (water, oil, lava)
    Liquid,
    /// Rises, disperses (steam, smoke)
    Gas,
}

bitflags! {
    /// Capability flags consulted by collaborators (tools, clusters)
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MaterialFlags: u8 {
        const FLAMMABLE = 1 << 0;
        /// Clusters and entities may pass through it
        const PASSABLE = 1 << 1;
        const DIGGABLE = 1 << 2;
        /// May be removed by explicit destroy operations
        const DESTROYABLE = 1 << 3;
    }
}

/// Definition of a material's properties
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDef {
    pub id: u16,
    pub name: String,
    pub material_type: MaterialType,

    /// Base color (RGBA), for tooling
    pub color: [u8; 4],

    /// Relative density - decides displacement order
    pub density: f32,

    /// Chance per frame that a resting cell loses one cell/frame of sideways speed
    pub friction: f32,
    /// Fraction of blocked velocity returned as a bounce (0.0 - 1.0)
    pub restitution: f32,
    /// Chance a resting powder refuses to topple into an open diagonal
    pub stability: f32,

    /// Horizontal spread/dispersion distance in cells (liquids and gases)
    pub spread: u8,
    /// Chance a blocked liquid/gas attempts to spread this frame
    pub spread_chance: f32,

    pub flags: MaterialFlags,
}

impl Default for MaterialDef {
    fn default() -> Self {
        Self {
            id: 0,
            name: "unknown".to_string(),
            material_type: MaterialType::Static,
            color: [255, 0, 255, 255], // Magenta for missing materials
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
            stability: 0.0,
            spread: 0,
            spread_chance: 0.0,
            flags: MaterialFlags::empty(),
        }
    }
}

impl MaterialDef {
    pub fn is_static(&self) -> bool {
        self.material_type == MaterialType::Static
    }

    /// Check coefficient ranges and the spread limit
    pub fn validate(&self) -> Result<(), MaterialError> {
        if self.spread > MAX_SPREAD {
            return Err(MaterialError::SpreadTooLarge {
                name: self.name.clone(),
                spread: self.spread,
                max: MAX_SPREAD,
            });
        }

        let unit_fields = [
            ("friction", self.friction),
            ("restitution", self.restitution),
            ("stability", self.stability),
            ("spread_chance", self.spread_chance),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(MaterialError::InvalidCoefficient {
                    name: self.name.clone(),
                    field,
                    value,
                });
            }
        }

        if !self.density.is_finite() || self.density < 0.0 {
            return Err(MaterialError::InvalidCoefficient {
                name: self.name.clone(),
                field: "density",
                value: self.density,
            });
        }

        Ok(())
    }
}

/// Errors raised while building the material table
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("material '{name}' spreads {spread} cells, limit is {max}")]
    SpreadTooLarge { name: String, spread: u8, max: u8 },

    #[error("material '{name}' has {field} = {value}, expected a value in 0.0..=1.0")]
    InvalidCoefficient {
        name: String,
        field: &'static str,
        value: f32,
    },

    #[error("failed to parse material definitions: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Registry of all materials
#[derive(Clone, Debug)]
pub struct Materials {
    materials: Vec<MaterialDef>,
}

impl Materials {
    pub fn new() -> Self {
        let mut materials = Self {
            materials: Vec::new(),
        };
        materials.register_defaults();
        materials
    }

    /// Built-in table extended or overridden by RON definitions
    ///
    /// The source is a list of `MaterialDef`; omitted fields take their
    /// defaults, so `(id: 20, name: "brine", material_type: Liquid, spread: 4)`
    /// is a complete entry.
    pub fn from_ron(source: &str) -> Result<Self, MaterialError> {
        let defs: Vec<MaterialDef> = ron::from_str(source)?;
        let mut materials = Self::new();
        for def in defs {
            materials.register(def)?;
        }
        Ok(materials)
    }

    fn register_defaults(&mut self) {
        self.insert(MaterialDef {
            id: MaterialId::AIR,
            name: "air".to_string(),
            material_type: MaterialType::Gas,
            color: [0, 0, 0, 0], // Transparent
            density: 0.0,
            flags: MaterialFlags::PASSABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::STONE,
            name: "stone".to_string(),
            material_type: MaterialType::Static,
            color: [128, 128, 128, 255],
            density: 2.5,
            flags: MaterialFlags::DIGGABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::SAND,
            name: "sand".to_string(),
            material_type: MaterialType::Powder,
            color: [194, 178, 128, 255],
            density: 1.5,
            friction: 0.3,
            restitution: 0.2,
            stability: 0.1,
            flags: MaterialFlags::DIGGABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::WATER,
            name: "water".to_string(),
            material_type: MaterialType::Liquid,
            color: [64, 164, 223, 200],
            density: 1.0,
            friction: 0.05,
            restitution: 0.1,
            spread: 5,
            spread_chance: 0.9,
            flags: MaterialFlags::PASSABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        // Indestructible foundation
        self.insert(MaterialDef {
            id: MaterialId::BEDROCK,
            name: "bedrock".to_string(),
            material_type: MaterialType::Static,
            color: [40, 40, 50, 255],
            density: 100.0,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::DIRT,
            name: "dirt".to_string(),
            material_type: MaterialType::Powder,
            color: [101, 67, 33, 255],
            density: 1.3,
            friction: 0.6,
            restitution: 0.1,
            stability: 0.6, // Holds steep walls
            flags: MaterialFlags::DIGGABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::GRAVEL,
            name: "gravel".to_string(),
            material_type: MaterialType::Powder,
            color: [110, 105, 100, 255],
            density: 1.8,
            friction: 0.4,
            restitution: 0.3,
            stability: 0.3,
            flags: MaterialFlags::DIGGABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::OIL,
            name: "oil".to_string(),
            material_type: MaterialType::Liquid,
            color: [50, 40, 30, 255],
            density: 0.8, // Floats on water
            friction: 0.1,
            spread: 4,
            spread_chance: 0.8,
            flags: MaterialFlags::FLAMMABLE | MaterialFlags::PASSABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::LAVA,
            name: "lava".to_string(),
            material_type: MaterialType::Liquid,
            color: [255, 80, 0, 255],
            density: 3.0,
            friction: 0.4,
            spread: 1, // Very viscous
            spread_chance: 0.3,
            flags: MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::STEAM,
            name: "steam".to_string(),
            material_type: MaterialType::Gas,
            color: [200, 200, 200, 100],
            density: 0.0006,
            spread: 6,
            spread_chance: 0.7,
            flags: MaterialFlags::PASSABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });

        self.insert(MaterialDef {
            id: MaterialId::SMOKE,
            name: "smoke".to_string(),
            material_type: MaterialType::Gas,
            color: [60, 60, 60, 150],
            density: 0.001,
            spread: 3,
            spread_chance: 0.5,
            flags: MaterialFlags::PASSABLE | MaterialFlags::DESTROYABLE,
            ..Default::default()
        });
    }

    /// Register a material, replacing any definition with the same id
    pub fn register(&mut self, material: MaterialDef) -> Result<(), MaterialError> {
        material.validate()?;
        if (material.id as usize) < self.materials.len()
            && self.materials[material.id as usize].name != "unknown"
        {
            log::debug!(
                "Material {} ('{}') overrides '{}'",
                material.id,
                material.name,
                self.materials[material.id as usize].name
            );
        }
        self.insert(material);
        Ok(())
    }

    fn insert(&mut self, material: MaterialDef) {
        let id = material.id as usize;

        // Ensure vec is large enough
        if self.materials.len() <= id {
            self.materials.resize(id + 1, MaterialDef::default());
        }

        self.materials[id] = material;
    }

    /// Get material definition by ID
    pub fn get(&self, id: u16) -> &MaterialDef {
        self.materials
            .get(id as usize)
            .unwrap_or(&self.materials[0])
    }

    pub fn by_name(&self, name: &str) -> Option<&MaterialDef> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialDef> {
        self.materials.iter()
    }

    /// Number of material slots (highest id + 1)
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for Materials {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_materials_are_valid() {
        let materials = Materials::new();
        for def in materials.iter() {
            def.validate()
                .unwrap_or_else(|e| panic!("built-in {} invalid: {e}", def.name));
        }
    }

    #[test]
    fn test_ids_match_slots() {
        let materials = Materials::new();
        assert_eq!(materials.get(MaterialId::WATER).name, "water");
        assert_eq!(materials.get(MaterialId::SMOKE).name, "smoke");
        assert_eq!(materials.len(), MaterialId::SMOKE as usize + 1);
    }

    #[test]
    fn test_unknown_id_falls_back_to_air() {
        let materials = Materials::new();
        assert_eq!(materials.get(9999).id, MaterialId::AIR);
    }

    #[test]
    fn test_register_rejects_excess_spread() {
        let mut materials = Materials::new();
        let result = materials.register(MaterialDef {
            id: 40,
            name: "superfluid".to_string(),
            material_type: MaterialType::Liquid,
            spread: MAX_SPREAD + 1,
            ..Default::default()
        });
        assert!(matches!(result, Err(MaterialError::SpreadTooLarge { .. })));
    }

    #[test]
    fn test_register_rejects_bad_restitution() {
        let mut materials = Materials::new();
        let result = materials.register(MaterialDef {
            id: 41,
            name: "rubber".to_string(),
            material_type: MaterialType::Powder,
            restitution: 1.5,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(MaterialError::InvalidCoefficient {
                field: "restitution",
                ..
            })
        ));
    }

    #[test]
    fn test_from_ron_adds_and_overrides() {
        let source = r#"[
            (id: 20, name: "brine", material_type: Liquid, density: 1.2, spread: 4, spread_chance: 0.5),
            (id: 2, name: "sand", material_type: Powder, density: 1.6, stability: 0.5),
        ]"#;
        let materials = Materials::from_ron(source).expect("valid definitions");

        let brine = materials.by_name("brine").expect("brine registered");
        assert_eq!(brine.id, 20);
        assert_eq!(brine.material_type, MaterialType::Liquid);
        assert_eq!(brine.spread, 4);

        assert_eq!(materials.get(MaterialId::SAND).stability, 0.5);
        // Untouched builtins survive
        assert_eq!(materials.get(MaterialId::WATER).name, "water");
    }

    #[test]
    fn test_from_ron_reports_parse_errors() {
        assert!(matches!(
            Materials::from_ron("[(id: "),
            Err(MaterialError::Parse(_))
        ));
    }
}
