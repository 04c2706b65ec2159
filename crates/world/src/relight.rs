//! Background full-column re-light.
//!
//! Columns are lit speculatively as sub-chunks stream in, so cave air can
//! briefly hold sky light it never earned. Once a column is Ready a
//! low-priority task recomputes its lighting from scratch: sky 15 is only
//! permitted on cells with genuine sky access in the final block data, and
//! every other cell earns light through the BFS. The recompute is a pure
//! function of the block snapshot, so it runs on a worker.

use crate::column::ChunkColumn;
use crate::coords::{ChunkPos, COL_H, SUB_COUNT, SUB_H, SUB_VOLUME, SX, SZ};
use crate::lighting::{
    column_boundary, propagate_from_boundary, stitch_column, LightChannel, SIDE_FACES,
};
use crate::subchunk::MAX_LIGHT;
use slopworld_core::{BlockId, BlockRegistry, BLOCK_AIR};
use std::collections::{HashMap, VecDeque};

/// Immutable copy of a column's block data, taken on the tick thread and
/// moved into the worker.
pub struct ColumnBlockSnapshot {
    pub chunk: ChunkPos,
    subs: Vec<Option<Vec<BlockId>>>,
}

impl ColumnBlockSnapshot {
    pub fn capture(column: &ChunkColumn) -> Self {
        let mut subs = Vec::with_capacity(SUB_COUNT);
        for sub_y in 0..SUB_COUNT {
            subs.push(column.sub(sub_y).map(|sub| sub.blocks().to_vec()));
        }
        Self {
            chunk: column.pos(),
            subs,
        }
    }

    fn block(&self, x: usize, y: usize, z: usize) -> BlockId {
        let sub_y = y / SUB_H;
        match self.subs.get(sub_y).and_then(|slot| slot.as_ref()) {
            Some(blocks) => blocks[(y % SUB_H) * SX * SZ + z * SX + x],
            None => BLOCK_AIR,
        }
    }
}

/// Freshly computed packed light (sky high nibble, block low nibble), one
/// array per present sub-chunk.
pub struct ColumnRelightResult {
    pub chunk: ChunkPos,
    pub light: Vec<Option<Vec<u8>>>,
}

const CELLS: usize = COL_H * SX * SZ;

#[inline]
fn cell_index(x: usize, y: usize, z: usize) -> usize {
    y * SX * SZ + z * SX + x
}

/// Recompute a column's lighting from its block snapshot alone.
///
/// Neighbor contributions are deliberately absent here; the apply step
/// re-stitches borders on the tick thread.
pub fn relight_column(
    snapshot: &ColumnBlockSnapshot,
    registry: &BlockRegistry,
) -> ColumnRelightResult {
    let mut sky = vec![0u8; CELLS];
    let mut block = vec![0u8; CELLS];
    let mut queue: VecDeque<(usize, usize, usize, u8)> = VecDeque::new();

    // Sky-access correction: walk each cell column down from the top; only
    // cells strictly above the first opaque block seed, and they seed at
    // full strength.
    for z in 0..SZ {
        for x in 0..SX {
            for y in (0..COL_H).rev() {
                if registry.is_opaque(snapshot.block(x, y, z)) {
                    break;
                }
                sky[cell_index(x, y, z)] = MAX_LIGHT;
                queue.push_back((x, y, z, MAX_LIGHT));
            }
        }
    }
    flood(snapshot, registry, &mut sky, queue);

    // Block light from emitters.
    let mut queue: VecDeque<(usize, usize, usize, u8)> = VecDeque::new();
    for y in 0..COL_H {
        for z in 0..SZ {
            for x in 0..SX {
                let emission = registry.light_emission(snapshot.block(x, y, z));
                if emission > 0 {
                    block[cell_index(x, y, z)] = emission;
                    queue.push_back((x, y, z, emission));
                }
            }
        }
    }
    flood(snapshot, registry, &mut block, queue);

    // Pack into per-sub arrays, skipping absent slots.
    let mut light = Vec::with_capacity(SUB_COUNT);
    for sub_y in 0..SUB_COUNT {
        if snapshot.subs[sub_y].is_none() {
            light.push(None);
            continue;
        }
        let mut packed = vec![0u8; SUB_VOLUME];
        for local_y in 0..SUB_H {
            let y = sub_y * SUB_H + local_y;
            for z in 0..SZ {
                for x in 0..SX {
                    let idx = cell_index(x, y, z);
                    packed[local_y * SX * SZ + z * SX + x] = (sky[idx] << 4) | block[idx];
                }
            }
        }
        light.push(Some(packed));
    }

    ColumnRelightResult {
        chunk: snapshot.chunk,
        light,
    }
}

fn flood(
    snapshot: &ColumnBlockSnapshot,
    registry: &BlockRegistry,
    field: &mut [u8],
    mut queue: VecDeque<(usize, usize, usize, u8)>,
) {
    while let Some((x, y, z, level)) = queue.pop_front() {
        if level <= 1 || field[cell_index(x, y, z)] > level {
            continue;
        }
        for (dx, dy, dz) in [
            (1i64, 0i64, 0i64),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ] {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            let nz = z as i64 + dz;
            if !(0..SX as i64).contains(&nx)
                || !(0..COL_H as i64).contains(&ny)
                || !(0..SZ as i64).contains(&nz)
            {
                continue;
            }
            let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
            let blocking = registry.light_blocking(snapshot.block(nx, ny, nz));
            let offered = level.saturating_sub(1 + blocking);
            if offered > field[cell_index(nx, ny, nz)] {
                field[cell_index(nx, ny, nz)] = offered;
                queue.push_back((nx, ny, nz, offered));
            }
        }
    }
}

/// Install a relight result and re-stitch borders.
///
/// Returns the sub-chunk slots whose light actually changed; only those are
/// marked dirty for meshing. Applying the same result to an already
/// consistent column returns an empty list.
pub fn apply_column_relight(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    result: &ColumnRelightResult,
) -> Vec<usize> {
    let chunk = result.chunk;

    // Snapshot the old light so the diff happens after stitching.
    let old: Vec<Option<Vec<u8>>> = match columns.get(&chunk) {
        Some(column) => (0..SUB_COUNT)
            .map(|sub_y| column.sub(sub_y).map(|sub| sub.light().to_vec()))
            .collect(),
        None => return Vec::new(),
    };

    // Incoming boundary light from the four loaded neighbors, captured
    // before the overwrite.
    let mut incoming = Vec::new();
    for toward in SIDE_FACES {
        let neighbor_pos = chunk.offset(toward.0, toward.1);
        if let Some(neighbor) = columns.get(&neighbor_pos) {
            for channel in [LightChannel::Sky, LightChannel::Block] {
                // The neighbor's layer travels opposite to `toward` from its
                // own point of view.
                let layer = column_boundary(neighbor, (-toward.0, -toward.1), channel);
                incoming.push((layer, channel));
            }
        }
    }

    {
        let Some(column) = columns.get_mut(&chunk) else {
            return Vec::new();
        };
        for (sub_y, light) in result.light.iter().enumerate() {
            if let (Some(light), Some(sub)) = (light, column.sub_mut(sub_y)) {
                sub.replace_light(light);
            }
        }
        for (layer, channel) in &incoming {
            propagate_from_boundary(column, registry, layer, *channel);
        }
    }

    // Push the fresh light outward until the seams converge.
    stitch_column(columns, registry, chunk, LightChannel::Sky);
    stitch_column(columns, registry, chunk, LightChannel::Block);

    let Some(column) = columns.get_mut(&chunk) else {
        return Vec::new();
    };
    let mut changed = Vec::new();
    for (sub_y, old_light) in old.iter().enumerate() {
        let new_light = column.sub(sub_y).map(|sub| sub.light().to_vec());
        if *old_light != new_light {
            changed.push(sub_y);
        }
    }
    changed
}
