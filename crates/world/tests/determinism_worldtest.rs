//! World-generation determinism and the seed-1 column scenario.

use slopworld_core::{BLOCK_AIR, SUB_COUNT, SX, SZ};
use slopworld_testkit::test_registry;
use slopworld_world::{
    seed_column_skylight, water_level, ChunkColumn, ChunkPos, SubChunkPos, WorldGenerator, COL_H,
};

const SEA_LEVEL: i64 = 256;

fn generate_column(seed: u64, chunk: ChunkPos) -> (WorldGenerator, ChunkColumn) {
    let generator = WorldGenerator::new(seed, SEA_LEVEL);
    let mut column = ChunkColumn::new(chunk);
    for sub_y in 0..SUB_COUNT {
        column.insert_sub(
            sub_y,
            Box::new(generator.generate_sub(SubChunkPos::new(chunk, sub_y as u8))),
        );
    }
    generator.finalize_column(&mut column);
    (generator, column)
}

#[test]
fn regeneration_is_byte_identical() {
    let chunk = ChunkPos::new(0, 0);
    let (_, a) = generate_column(1, chunk);
    let (_, b) = generate_column(1, chunk);
    for sub_y in 0..SUB_COUNT {
        let lhs = a.sub(sub_y).expect("sub present");
        let rhs = b.sub(sub_y).expect("sub present");
        assert_eq!(lhs.blocks(), rhs.blocks(), "sub {sub_y} differs");
    }
}

#[test]
fn different_seeds_differ() {
    let chunk = ChunkPos::new(0, 0);
    let (_, a) = generate_column(1, chunk);
    let (_, b) = generate_column(2, chunk);
    let differs = (0..SUB_COUNT).any(|sub_y| {
        a.sub(sub_y).map(|s| s.blocks().to_vec()) != b.sub(sub_y).map(|s| s.blocks().to_vec())
    });
    assert!(differs);
}

#[test]
fn seed_one_column_scenario() {
    let registry = test_registry();
    let chunk = ChunkPos::new(0, 0);
    let (generator, mut column) = generate_column(1, chunk);

    // Highest grounded height at local (0,0) tracks the height function,
    // unless a cave bit that exact cell column.
    let expected = generator.terrain_height(0, 0);
    let grounded = column.grounded_height_scan(0, 0) as i64;
    assert!(grounded <= expected + 1, "grounded {grounded} above terrain {expected}");
    let cave_bit_it = (0..=expected).any(|y| {
        let id = column.block_at(0, y, 0);
        id == BLOCK_AIR || water_level(id).is_some()
    });
    if !cave_bit_it {
        assert!(
            (grounded - expected).abs() <= 1,
            "grounded {grounded} vs terrain {expected}"
        );
    }

    // No air below sea level anywhere in the column.
    for z in 0..SZ {
        for x in 0..SX {
            for y in 0..SEA_LEVEL {
                assert_ne!(
                    column.block_at(x, y, z),
                    BLOCK_AIR,
                    "air below sea level at ({x}, {y}, {z})"
                );
            }
        }
    }

    // Sky is 15 at every cell above the surface once seeded.
    seed_column_skylight(&mut column, &registry);
    for (x, z) in [(0, 0), (10, 20), (31, 31), (16, 5)] {
        let surface = column.surface_height_scan(x, z) as i64;
        for y in (surface + 1)..(surface + 20).min(COL_H as i64) {
            assert_eq!(
                column.sky_light_at(x, y, z),
                15,
                "sky not full above surface at ({x}, {y}, {z})"
            );
        }
    }
}

#[test]
fn heightmap_matches_direct_scans() {
    let chunk = ChunkPos::new(3, -4);
    let (_, column) = generate_column(7, chunk);
    for z in 0..SZ {
        for x in 0..SX {
            let sample = column.heightmap().sample_at(x, z);
            assert!(sample.grounded <= sample.surface);
        }
    }
    // Each sample aggregates its 8×8 footprint: surface is the footprint
    // max, grounded the footprint min.
    for sample_z in 0..SZ / 8 {
        for sample_x in 0..SX / 8 {
            let mut surface_max = -1;
            let mut grounded_min = i32::MAX;
            for dz in 0..8 {
                for dx in 0..8 {
                    let x = sample_x * 8 + dx;
                    let z = sample_z * 8 + dz;
                    surface_max = surface_max.max(column.surface_height_scan(x, z));
                    grounded_min = grounded_min.min(column.grounded_height_scan(x, z));
                }
            }
            let sample = column.heightmap().sample_at(sample_x * 8, sample_z * 8);
            assert_eq!(sample.surface, surface_max);
            assert_eq!(sample.grounded, grounded_min);
        }
    }
}

#[test]
fn columns_do_not_depend_on_generation_order() {
    let generator = WorldGenerator::new(11, SEA_LEVEL);
    let target = SubChunkPos::new(ChunkPos::new(2, 2), 4);
    let alone = generator.generate_sub(target);
    // Interleave a pile of other generations, then repeat.
    for cx in -2..2 {
        for cz in -2..2 {
            let _ = generator.generate_sub(SubChunkPos::new(ChunkPos::new(cx, cz), 4));
        }
    }
    let after = generator.generate_sub(target);
    assert_eq!(alone.blocks(), after.blocks());
}
