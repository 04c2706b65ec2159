//! Block catalog entries and the face-culling capability model.
//!
//! Blocks are plain data: a handful of archetypes ([`RenderShape`]) plus
//! per-block flags cover everything the world, lighting, and meshing layers
//! need to know.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block identifier referencing the registry.
pub type BlockId = u16;

/// Reserved ID for air.
pub const BLOCK_AIR: BlockId = 0;

/// ID for stone.
pub const BLOCK_STONE: BlockId = 1;

/// ID for dirt.
pub const BLOCK_DIRT: BlockId = 2;

/// ID for grass.
pub const BLOCK_GRASS: BlockId = 3;

/// ID for sand.
pub const BLOCK_SAND: BlockId = 4;

/// ID for gravel.
pub const BLOCK_GRAVEL: BlockId = 5;

/// ID for snow cover.
pub const BLOCK_SNOW: BlockId = 6;

/// ID for a full water cell (level 4).
pub const BLOCK_WATER: BlockId = 7;

/// ID for three-quarter water (level 3).
pub const BLOCK_WATER_3: BlockId = 8;

/// ID for half water (level 2).
pub const BLOCK_WATER_2: BlockId = 9;

/// ID for quarter water (level 1).
pub const BLOCK_WATER_1: BlockId = 10;

/// ID for a torch (block light emitter, level 14).
pub const BLOCK_TORCH: BlockId = 11;

/// ID for coal ore.
pub const BLOCK_COAL_ORE: BlockId = 12;

/// ID for iron ore.
pub const BLOCK_IRON_ORE: BlockId = 13;

/// ID for gold ore.
pub const BLOCK_GOLD_ORE: BlockId = 14;

/// ID for diamond ore.
pub const BLOCK_DIAMOND_ORE: BlockId = 15;

/// ID for tall grass decoration.
pub const BLOCK_TALL_GRASS: BlockId = 16;

/// ID for a flower decoration.
pub const BLOCK_FLOWER: BlockId = 17;

/// ID for glass.
pub const BLOCK_GLASS: BlockId = 18;

/// Light level emitted by a torch.
pub const TORCH_LIGHT_LEVEL: u8 = 14;

/// Full water cell level.
pub const WATER_LEVEL_FULL: u8 = 4;

/// Water level carried by a block id, None for non-water blocks.
pub const fn water_level(id: BlockId) -> Option<u8> {
    match id {
        BLOCK_WATER => Some(4),
        BLOCK_WATER_3 => Some(3),
        BLOCK_WATER_2 => Some(2),
        BLOCK_WATER_1 => Some(1),
        _ => None,
    }
}

/// Block id for a water level; 0 maps to air, levels above FULL clamp.
pub const fn water_block(level: u8) -> BlockId {
    match level {
        0 => BLOCK_AIR,
        1 => BLOCK_WATER_1,
        2 => BLOCK_WATER_2,
        3 => BLOCK_WATER_3,
        _ => BLOCK_WATER,
    }
}

/// A face of a voxel cube.
///
/// Axis convention follows the world layer: east = +X, west = −X,
/// up = +Y, down = −Y, south = +Z, north = −Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    East,
    West,
    Up,
    Down,
    South,
    North,
}

impl Face {
    /// All six faces, in a fixed iteration order.
    pub const ALL: [Face; 6] = [
        Face::East,
        Face::West,
        Face::Up,
        Face::Down,
        Face::South,
        Face::North,
    ];

    /// Integer offset to the neighboring cell across this face.
    pub const fn offset(self) -> (i64, i64, i64) {
        match self {
            Face::East => (1, 0, 0),
            Face::West => (-1, 0, 0),
            Face::Up => (0, 1, 0),
            Face::Down => (0, -1, 0),
            Face::South => (0, 0, 1),
            Face::North => (0, 0, -1),
        }
    }

    /// Unit normal as floats, for mesh emission.
    pub const fn normal(self) -> [f32; 3] {
        match self {
            Face::East => [1.0, 0.0, 0.0],
            Face::West => [-1.0, 0.0, 0.0],
            Face::Up => [0.0, 1.0, 0.0],
            Face::Down => [0.0, -1.0, 0.0],
            Face::South => [0.0, 0.0, 1.0],
            Face::North => [0.0, 0.0, -1.0],
        }
    }

    /// The face on the opposite side of the cube.
    pub const fn opposite(self) -> Face {
        match self {
            Face::East => Face::West,
            Face::West => Face::East,
            Face::Up => Face::Down,
            Face::Down => Face::Up,
            Face::South => Face::North,
            Face::North => Face::South,
        }
    }

    /// Stable index 0..6 (matches [`Face::ALL`] ordering).
    pub const fn index(self) -> usize {
        match self {
            Face::East => 0,
            Face::West => 1,
            Face::Up => 2,
            Face::Down => 3,
            Face::South => 4,
            Face::North => 5,
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Face::East => "east",
            Face::West => "west",
            Face::Up => "up",
            Face::Down => "down",
            Face::South => "south",
            Face::North => "north",
        };
        write!(f, "{name}")
    }
}

/// Render archetype for a block.
///
/// The common case is a handful of shapes; anything fancier is
/// `CustomGeometry` and the renderer sorts it out from the block id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderShape {
    /// Full cube, fully opaque.
    SolidOpaque,
    /// Full cube with transparency (glass, ice).
    TransparentCube,
    /// Two crossed quads (grass tufts, flowers).
    CrossFoliage,
    /// Liquid cell; top surface height scales with the fill level.
    Liquid,
    /// Renderer-defined geometry keyed by block id (torches etc.).
    CustomGeometry,
}

/// Axis-aligned collision box in block-local space ([0,1]^3 for a full cube).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    /// The full unit cube.
    pub const FULL: Aabb = Aabb {
        min: [0.0, 0.0, 0.0],
        max: [1.0, 1.0, 1.0],
    };
}

/// Static catalog entry for a block type.
#[derive(Debug, Clone)]
pub struct BlockDef {
    pub id: BlockId,
    pub name: &'static str,
    /// Fully blocks light and hides neighboring opaque faces.
    pub is_opaque: bool,
    /// Participates in collision and stops raycasts.
    pub is_solid: bool,
    /// Is a liquid cell (any fill level).
    pub is_liquid: bool,
    /// Base mining time in seconds.
    pub hardness: f32,
    /// Emitted block light, 0..15.
    pub light_level: u8,
    /// Light attenuation added on top of the per-step decay, 0..15.
    pub light_blocking: u8,
    pub shape: RenderShape,
    /// Collision box, if any.
    pub collision: Option<Aabb>,
    /// Item ids dropped on mining (interpreted by the item layer).
    pub drops: &'static [BlockId],
    pub tags: &'static [&'static str],
}

impl BlockDef {
    /// Standard opaque solid cube.
    pub const fn solid(id: BlockId, name: &'static str, hardness: f32) -> Self {
        Self {
            id,
            name,
            is_opaque: true,
            is_solid: true,
            is_liquid: false,
            hardness,
            light_level: 0,
            light_blocking: 15,
            shape: RenderShape::SolidOpaque,
            collision: Some(Aabb::FULL),
            drops: &[],
            tags: &[],
        }
    }

    /// Transparent full cube (glass-like).
    pub const fn transparent(id: BlockId, name: &'static str, hardness: f32) -> Self {
        Self {
            id,
            name,
            is_opaque: false,
            is_solid: true,
            is_liquid: false,
            hardness,
            light_level: 0,
            light_blocking: 0,
            shape: RenderShape::TransparentCube,
            collision: Some(Aabb::FULL),
            drops: &[],
            tags: &[],
        }
    }

    /// Water cell at the given fill level (1..=4).
    pub const fn water(id: BlockId, name: &'static str) -> Self {
        Self {
            id,
            name,
            is_opaque: false,
            is_solid: false,
            is_liquid: true,
            hardness: 100.0,
            light_level: 0,
            light_blocking: 1,
            shape: RenderShape::Liquid,
            collision: None,
            drops: &[],
            tags: &["water"],
        }
    }

    /// Non-solid cross-quad foliage.
    pub const fn foliage(id: BlockId, name: &'static str) -> Self {
        Self {
            id,
            name,
            is_opaque: false,
            is_solid: false,
            is_liquid: false,
            hardness: 0.0,
            light_level: 0,
            light_blocking: 0,
            shape: RenderShape::CrossFoliage,
            collision: None,
            drops: &[],
            tags: &["foliage"],
        }
    }

    /// The face between `self` and `neighbor` needs geometry.
    ///
    /// Rules: opaque against opaque is hidden; a transparent block hides
    /// faces against its own id (stacked water has no interior faces); any
    /// liquid hides against any other liquid.
    pub fn should_render_face(&self, neighbor: Option<&BlockDef>) -> bool {
        let Some(neighbor) = neighbor else {
            return true;
        };
        if neighbor.id == BLOCK_AIR {
            return true;
        }
        if self.is_opaque && neighbor.is_opaque {
            return false;
        }
        if !self.is_opaque && neighbor.id == self.id {
            return false;
        }
        if self.is_liquid && neighbor.is_liquid {
            return false;
        }
        true
    }
}

/// Catalog entry used for air and for unknown ids.
pub const AIR_DEF: BlockDef = BlockDef {
    id: BLOCK_AIR,
    name: "air",
    is_opaque: false,
    is_solid: false,
    is_liquid: false,
    hardness: 0.0,
    light_level: 0,
    light_blocking: 0,
    shape: RenderShape::CustomGeometry,
    collision: None,
    drops: &[],
    tags: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_offsets_are_unit() {
        for face in Face::ALL {
            let (dx, dy, dz) = face.offset();
            assert_eq!(dx.abs() + dy.abs() + dz.abs(), 1);
        }
    }

    #[test]
    fn face_opposites_roundtrip() {
        for face in Face::ALL {
            assert_eq!(face.opposite().opposite(), face);
        }
    }

    #[test]
    fn opaque_vs_opaque_hides() {
        let stone = BlockDef::solid(BLOCK_STONE, "stone", 1.5);
        let dirt = BlockDef::solid(BLOCK_DIRT, "dirt", 0.5);
        assert!(!stone.should_render_face(Some(&dirt)));
        assert!(stone.should_render_face(None));
        assert!(stone.should_render_face(Some(&AIR_DEF)));
    }

    #[test]
    fn transparent_hides_against_same_id() {
        let glass = BlockDef::transparent(BLOCK_GLASS, "glass", 0.3);
        let stone = BlockDef::solid(BLOCK_STONE, "stone", 1.5);
        assert!(!glass.should_render_face(Some(&glass.clone())));
        assert!(glass.should_render_face(Some(&stone)));
        // Opaque against transparent still renders.
        assert!(stone.should_render_face(Some(&glass)));
    }

    #[test]
    fn liquids_hide_against_any_liquid() {
        let full = BlockDef::water(BLOCK_WATER, "water");
        let half = BlockDef::water(BLOCK_WATER_2, "water_2");
        assert!(!full.should_render_face(Some(&half)));
        assert!(!half.should_render_face(Some(&full)));
        assert!(half.should_render_face(Some(&AIR_DEF)));
    }
}
