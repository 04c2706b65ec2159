//! Texture-atlas tile mapping.
//!
//! The atlas is a square grid of uniform tiles; each block face maps to one
//! tile and the mesher bakes the tile's UV rect into the vertices.

use slopworld_core::{
    BlockId, Face, BLOCK_COAL_ORE, BLOCK_DIAMOND_ORE, BLOCK_DIRT, BLOCK_FLOWER, BLOCK_GLASS,
    BLOCK_GOLD_ORE, BLOCK_GRASS, BLOCK_GRAVEL, BLOCK_IRON_ORE, BLOCK_SAND, BLOCK_SNOW,
    BLOCK_STONE, BLOCK_TALL_GRASS, BLOCK_TORCH, BLOCK_WATER, BLOCK_WATER_1, BLOCK_WATER_2,
    BLOCK_WATER_3,
};

/// Tiles per atlas row/column.
pub const ATLAS_TILES_PER_ROW: u32 = 8;

/// UV rectangle as (u0, v0, u1, v1).
pub type UvRect = [f32; 4];

/// Atlas tile index for a block face.
///
/// Unmapped ids fall back to the stone tile, which makes a missing mapping
/// visible in-world without breaking the mesh.
pub fn tile_for(id: BlockId, face: Face) -> u32 {
    match id {
        BLOCK_GRASS => match face {
            Face::Up => 0,
            Face::Down => 2,
            _ => 1,
        },
        BLOCK_DIRT => 2,
        BLOCK_STONE => 3,
        BLOCK_SAND => 4,
        BLOCK_GRAVEL => 5,
        BLOCK_SNOW => 6,
        BLOCK_WATER | BLOCK_WATER_3 | BLOCK_WATER_2 | BLOCK_WATER_1 => 7,
        BLOCK_TORCH => 8,
        BLOCK_COAL_ORE => 9,
        BLOCK_IRON_ORE => 10,
        BLOCK_GOLD_ORE => 11,
        BLOCK_DIAMOND_ORE => 12,
        BLOCK_TALL_GRASS => 13,
        BLOCK_FLOWER => 14,
        BLOCK_GLASS => 15,
        _ => 3,
    }
}

/// UV rect of an atlas tile.
pub fn uv_rect(tile: u32) -> UvRect {
    let size = 1.0 / ATLAS_TILES_PER_ROW as f32;
    let col = (tile % ATLAS_TILES_PER_ROW) as f32;
    let row = (tile / ATLAS_TILES_PER_ROW) as f32;
    [col * size, row * size, (col + 1.0) * size, (row + 1.0) * size]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grass_has_distinct_top_and_side() {
        assert_ne!(tile_for(BLOCK_GRASS, Face::Up), tile_for(BLOCK_GRASS, Face::East));
        assert_eq!(
            tile_for(BLOCK_GRASS, Face::Down),
            tile_for(BLOCK_DIRT, Face::Up)
        );
    }

    #[test]
    fn water_levels_share_a_tile() {
        let full = tile_for(BLOCK_WATER, Face::Up);
        for id in [BLOCK_WATER_3, BLOCK_WATER_2, BLOCK_WATER_1] {
            assert_eq!(tile_for(id, Face::Up), full);
        }
    }

    #[test]
    fn uv_rects_stay_inside_unit_square() {
        for tile in 0..(ATLAS_TILES_PER_ROW * ATLAS_TILES_PER_ROW) {
            let [u0, v0, u1, v1] = uv_rect(tile);
            assert!(u0 >= 0.0 && v0 >= 0.0 && u1 <= 1.0 && v1 <= 1.0);
            assert!(u0 < u1 && v0 < v1);
        }
    }

    #[test]
    fn unknown_ids_fall_back_to_stone() {
        assert_eq!(tile_for(9999, Face::Up), tile_for(BLOCK_STONE, Face::Up));
    }
}
