//! Shared fixtures for world/mesh tests.
//!
//! Helpers operate on the raw block/light arrays so they work from any
//! crate without dragging the world types in.

use slopworld_core::{BlockId, BlockRegistry, BLOCK_AIR, SUB_H, SUB_VOLUME, SX, SZ};

/// The standard block catalog used across tests.
pub fn test_registry() -> BlockRegistry {
    BlockRegistry::with_defaults()
}

/// Linear index into a sub-chunk-shaped array (y-major).
pub fn cell_index(x: usize, y: usize, z: usize) -> usize {
    assert!(x < SX && y < SUB_H && z < SZ);
    y * SX * SZ + z * SX + x
}

/// A sub-chunk-sized block array filled with one id.
pub fn solid_blocks(id: BlockId) -> Vec<BlockId> {
    vec![id; SUB_VOLUME]
}

/// A sub-chunk-sized block array of air.
pub fn air_blocks() -> Vec<BlockId> {
    solid_blocks(BLOCK_AIR)
}

/// A sub-chunk-sized zeroed packed-light array.
pub fn dark_light() -> Vec<u8> {
    vec![0u8; SUB_VOLUME]
}

/// Pack sky/block nibbles into the stored byte.
pub fn pack_light(sky: u8, block: u8) -> u8 {
    (sky.min(15) << 4) | block.min(15)
}

/// Check the per-cell light invariants over one sub-chunk's arrays:
/// nibbles in range by construction, opaque non-emitters hold zero, and no
/// air cell exceeds its best neighbor minus decay and blocking.
///
/// Panics with a located message on the first violation.
pub fn assert_light_invariants(blocks: &[BlockId], light: &[u8], registry: &BlockRegistry) {
    assert_eq!(blocks.len(), SUB_VOLUME);
    assert_eq!(light.len(), SUB_VOLUME);

    for y in 0..SUB_H {
        for z in 0..SZ {
            for x in 0..SX {
                let idx = cell_index(x, y, z);
                let id = blocks[idx];
                let sky = light[idx] >> 4;
                let block = light[idx] & 0x0F;

                if registry.is_opaque(id) {
                    assert_eq!(sky, 0, "opaque cell ({x},{y},{z}) holds sky light");
                    if registry.light_emission(id) == 0 {
                        assert_eq!(block, 0, "opaque cell ({x},{y},{z}) holds block light");
                    }
                    continue;
                }

                // Interior air cells: level ≤ best neighbor − 1 − blocking.
                // Boundary cells are skipped; their sources live outside the
                // array. Direct-sky cells are exempt for the sky channel.
                if x == 0 || x == SX - 1 || y == 0 || y == SUB_H - 1 || z == 0 || z == SZ - 1 {
                    continue;
                }
                let blocking = registry.light_blocking(id);
                let mut best_sky = 0u8;
                let mut best_block = 0u8;
                for (dx, dy, dz) in [
                    (1i64, 0i64, 0i64),
                    (-1, 0, 0),
                    (0, 1, 0),
                    (0, -1, 0),
                    (0, 0, 1),
                    (0, 0, -1),
                ] {
                    let nidx = cell_index(
                        (x as i64 + dx) as usize,
                        (y as i64 + dy) as usize,
                        (z as i64 + dz) as usize,
                    );
                    best_sky = best_sky.max(light[nidx] >> 4);
                    best_block = best_block.max(light[nidx] & 0x0F);
                }
                if sky > 0 && sky < 15 {
                    assert!(
                        sky <= best_sky.saturating_sub(1 + blocking),
                        "sky light {sky} at ({x},{y},{z}) exceeds neighbors (best {best_sky})"
                    );
                }
                let emission = registry.light_emission(id);
                if block > emission {
                    assert!(
                        block <= best_block.saturating_sub(1 + blocking),
                        "block light {block} at ({x},{y},{z}) exceeds neighbors (best {best_block})"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slopworld_core::{BLOCK_STONE, BLOCK_TORCH};

    #[test]
    fn clean_arrays_pass() {
        let registry = test_registry();
        assert_light_invariants(&air_blocks(), &dark_light(), &registry);
        assert_light_invariants(&solid_blocks(BLOCK_STONE), &dark_light(), &registry);
    }

    #[test]
    #[should_panic(expected = "opaque cell")]
    fn lit_stone_fails() {
        let registry = test_registry();
        let blocks = solid_blocks(BLOCK_STONE);
        let mut light = dark_light();
        light[cell_index(3, 3, 3)] = pack_light(7, 0);
        assert_light_invariants(&blocks, &light, &registry);
    }

    #[test]
    #[should_panic(expected = "exceeds neighbors")]
    fn floating_light_fails() {
        let registry = test_registry();
        let blocks = air_blocks();
        let mut light = dark_light();
        // Interior cell with block light but dark neighbors.
        light[cell_index(10, 10, 10)] = pack_light(0, 9);
        assert_light_invariants(&blocks, &light, &registry);
    }

    #[test]
    fn torch_field_passes() {
        let registry = test_registry();
        let mut blocks = air_blocks();
        let mut light = dark_light();
        blocks[cell_index(8, 8, 8)] = BLOCK_TORCH;
        // Full taxicab field around the torch.
        for y in 0..SUB_H {
            for z in 0..SZ {
                for x in 0..SX {
                    let d = (x as i64 - 8).abs() + (y as i64 - 8).abs() + (z as i64 - 8).abs();
                    let level = 14i64 - d;
                    if level > 0 {
                        light[cell_index(x, y, z)] = pack_light(0, level as u8);
                    }
                }
            }
        }
        assert_light_invariants(&blocks, &light, &registry);
    }
}
