//! Dual-channel BFS lighting propagation.
//!
//! Skylight and block light (0–15 each) propagate independently over the
//! 6-neighborhood with FIFO queues: popping `(cell, L)` offers every
//! neighbor `L' = L − 1 − blocking(neighbor)` and enqueues improvements.
//! Opaque blocks have blocking 15, so light never enters them.
//!
//! Bulk passes (seed, boundary stitch) run column-local for cache locality;
//! incremental edit updates walk world space so they can cross column
//! borders freely.

use crate::column::ChunkColumn;
use crate::coords::{world_to_chunk_axis, world_to_local_axis, ChunkPos, WorldPos, COL_H, SX, SZ};
use crate::subchunk::MAX_LIGHT;
use slopworld_core::BlockRegistry;
use std::collections::{HashMap, VecDeque};

/// Which light channel an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightChannel {
    Sky,
    Block,
}

/// A pending light write in a neighboring column, carrying the *source*
/// level at the border; the applying side subtracts the step decay and the
/// target cell's blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossColumnUpdate {
    pub target_chunk: ChunkPos,
    pub x: usize,
    pub y: i64,
    pub z: usize,
    pub source_level: u8,
    pub channel: LightChannel,
}

/// Metrics describing one propagation pass.
#[derive(Debug, Clone)]
pub struct LightUpdate {
    pub chunk: ChunkPos,
    pub channel: LightChannel,
    pub nodes_processed: usize,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    x: usize,
    y: i64,
    z: usize,
    level: u8,
}

/// FIFO propagation queue scoped to one column.
pub struct LightQueue {
    queue: VecDeque<Node>,
    chunk: ChunkPos,
    cross: Vec<CrossColumnUpdate>,
}

impl LightQueue {
    pub fn new_for_column(chunk: ChunkPos) -> Self {
        Self {
            queue: VecDeque::with_capacity(256),
            chunk,
            cross: Vec::new(),
        }
    }

    /// Queue a level to write at a local cell.
    pub fn enqueue(&mut self, x: usize, y: i64, z: usize, level: u8) {
        self.queue.push_back(Node {
            x,
            y,
            z,
            level: level.min(MAX_LIGHT),
        });
    }

    /// Take the cross-column updates collected during propagation.
    pub fn take_cross_updates(&mut self) -> Vec<CrossColumnUpdate> {
        std::mem::take(&mut self.cross)
    }

    /// Drain the queue, writing improvements into the column.
    pub fn propagate(
        &mut self,
        column: &mut ChunkColumn,
        registry: &BlockRegistry,
        channel: LightChannel,
    ) -> usize {
        let mut nodes_processed = 0;
        while let Some(node) = self.queue.pop_front() {
            nodes_processed += 1;
            let stored = read_light(column, node.x, node.y, node.z, channel);
            if stored >= node.level {
                continue;
            }
            write_light(column, node.x, node.y, node.z, channel, node.level);

            if node.level <= 1 {
                continue;
            }
            for (dx, dy, dz) in DIRECTIONS {
                let ny = node.y + dy;
                if !(0..COL_H as i64).contains(&ny) {
                    continue;
                }
                let nx = node.x as i64 + dx;
                let nz = node.z as i64 + dz;
                if !(0..SX as i64).contains(&nx) || !(0..SZ as i64).contains(&nz) {
                    // Left the column horizontally: hand the source level to
                    // the neighbor for later application.
                    self.cross.push(CrossColumnUpdate {
                        target_chunk: self.chunk.offset(
                            world_to_chunk_axis(nx),
                            world_to_chunk_axis(nz),
                        ),
                        x: world_to_local_axis(nx),
                        y: ny,
                        z: world_to_local_axis(nz),
                        source_level: node.level,
                        channel,
                    });
                    continue;
                }
                let nx = nx as usize;
                let nz = nz as usize;
                let blocking = registry.light_blocking(column.block_at(nx, ny, nz));
                let offered = node.level.saturating_sub(1 + blocking);
                if offered > 0 && offered > read_light(column, nx, ny, nz, channel) {
                    self.enqueue(nx, ny, nz, offered);
                }
            }
        }
        nodes_processed
    }
}

const DIRECTIONS: [(i64, i64, i64); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

fn read_light(column: &ChunkColumn, x: usize, y: i64, z: usize, channel: LightChannel) -> u8 {
    match channel {
        LightChannel::Sky => column.sky_light_at(x, y, z),
        LightChannel::Block => column.block_light_at(x, y, z),
    }
}

fn write_light(column: &mut ChunkColumn, x: usize, y: i64, z: usize, channel: LightChannel, level: u8) {
    match channel {
        LightChannel::Sky => column.set_sky_light_at(x, y, z, level),
        LightChannel::Block => column.set_block_light_at(x, y, z, level),
    }
}

/// Seed pass for a freshly generated column.
///
/// Every cell with direct sky access (no opaque block above it in this
/// column) gets 15; everything else starts at 0 and earns light through the
/// BFS, where translucent blockers attenuate. Sky access is binary on
/// opacity, which is what keeps the cell right above the sea floor at 15.
pub fn seed_column_skylight(
    column: &mut ChunkColumn,
    registry: &BlockRegistry,
) -> (LightUpdate, Vec<CrossColumnUpdate>) {
    let chunk = column.pos();
    let mut queue = LightQueue::new_for_column(chunk);

    for z in 0..SZ {
        for x in 0..SX {
            // Clear the cell column, then walk down from the sky.
            let mut descending = true;
            for y in (0..COL_H as i64).rev() {
                write_light(column, x, y, z, LightChannel::Sky, 0);
                if !descending {
                    continue;
                }
                if registry.is_opaque(column.block_at(x, y, z)) {
                    descending = false;
                    continue;
                }
                write_light(column, x, y, z, LightChannel::Sky, MAX_LIGHT);
                queue.enqueue(x, y, z, MAX_LIGHT);
            }
        }
    }

    let nodes_processed = queue.propagate(column, registry, LightChannel::Sky);
    let cross = queue.take_cross_updates();
    (
        LightUpdate {
            chunk,
            channel: LightChannel::Sky,
            nodes_processed,
        },
        cross,
    )
}

/// Seed block light from every emitter in the column and propagate.
pub fn seed_column_blocklight(
    column: &mut ChunkColumn,
    registry: &BlockRegistry,
) -> (LightUpdate, Vec<CrossColumnUpdate>) {
    let chunk = column.pos();
    let mut queue = LightQueue::new_for_column(chunk);
    for z in 0..SZ {
        for x in 0..SX {
            for y in 0..COL_H as i64 {
                let emission = registry.light_emission(column.block_at(x, y, z));
                if emission > 0 {
                    write_light(column, x, y, z, LightChannel::Block, emission);
                    queue.enqueue(x, y, z, emission);
                }
            }
        }
    }
    let nodes_processed = queue.propagate(column, registry, LightChannel::Block);
    let cross = queue.take_cross_updates();
    (
        LightUpdate {
            chunk,
            channel: LightChannel::Block,
            nodes_processed,
        },
        cross,
    )
}

/// One nonzero entry on a column's vertical boundary face.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryEntry {
    /// Index along the face (x for north/south faces, z for east/west).
    pub along: usize,
    pub y: i64,
    pub level: u8,
}

/// A column's boundary light values on one of its four side faces.
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    /// Offset from the source column to the receiving neighbor.
    pub toward: (i64, i64),
    pub entries: Vec<BoundaryEntry>,
}

/// The four horizontal face directions, as chunk offsets.
pub const SIDE_FACES: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Extract the nonzero boundary levels on the face toward `toward`.
pub fn column_boundary(
    column: &ChunkColumn,
    toward: (i64, i64),
    channel: LightChannel,
) -> BoundaryLayer {
    let mut entries = Vec::new();
    let mut push = |column: &ChunkColumn, x: usize, z: usize, along: usize| {
        for y in 0..COL_H as i64 {
            let level = read_light(column, x, y, z, channel);
            if level > 1 {
                entries.push(BoundaryEntry { along, y, level });
            }
        }
    };
    match toward {
        (1, 0) => {
            for z in 0..SZ {
                push(column, SX - 1, z, z);
            }
        }
        (-1, 0) => {
            for z in 0..SZ {
                push(column, 0, z, z);
            }
        }
        (0, 1) => {
            for x in 0..SX {
                push(column, x, SZ - 1, x);
            }
        }
        (0, -1) => {
            for x in 0..SX {
                push(column, x, 0, x);
            }
        }
        _ => {}
    }
    BoundaryLayer { toward, entries }
}

/// Apply a neighbor's boundary layer to this column.
///
/// Incoming levels are treated as sources reduced by one step plus the
/// local cell's blocking, then flooded locally. Returns the number of
/// changed cells on the receiving face.
pub fn propagate_from_boundary(
    column: &mut ChunkColumn,
    registry: &BlockRegistry,
    layer: &BoundaryLayer,
    channel: LightChannel,
) -> usize {
    // The layer travels `toward`; we receive on the opposite face.
    let mut queue = LightQueue::new_for_column(column.pos());
    let mut seeded = 0;
    for entry in &layer.entries {
        let (x, z) = match layer.toward {
            (1, 0) => (0, entry.along),
            (-1, 0) => (SX - 1, entry.along),
            (0, 1) => (entry.along, 0),
            (0, -1) => (entry.along, SZ - 1),
            _ => continue,
        };
        let blocking = registry.light_blocking(column.block_at(x, entry.y, z));
        let offered = entry.level.saturating_sub(1 + blocking);
        if offered > read_light(column, x, entry.y, z, channel) {
            queue.enqueue(x, entry.y, z, offered);
            seeded += 1;
        }
    }
    if seeded > 0 {
        queue.propagate(column, registry, channel);
    }
    seeded
}

/// Stitch a column's light into its loaded neighbors until no boundary
/// exchange changes a cell. Convergence is independent of visit order.
pub fn stitch_column(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    source: ChunkPos,
    channel: LightChannel,
) -> usize {
    let mut worklist: VecDeque<ChunkPos> = VecDeque::new();
    worklist.push_back(source);
    let mut exchanged = 0;

    while let Some(current) = worklist.pop_front() {
        for toward in SIDE_FACES {
            let neighbor_pos = current.offset(toward.0, toward.1);
            if !columns.contains_key(&neighbor_pos) {
                continue;
            }
            let layer = match columns.get(&current) {
                Some(column) => column_boundary(column, toward, channel),
                None => continue,
            };
            if layer.entries.is_empty() {
                continue;
            }
            let Some(neighbor) = columns.get_mut(&neighbor_pos) else {
                continue;
            };
            let changed = propagate_from_boundary(neighbor, registry, &layer, channel);
            if changed > 0 {
                exchanged += changed;
                worklist.push_back(neighbor_pos);
            }
        }
    }
    exchanged
}

/// Apply queued cross-column updates, chasing any knock-on crossings.
pub fn apply_cross_updates(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    updates: Vec<CrossColumnUpdate>,
) -> usize {
    let mut pending: VecDeque<CrossColumnUpdate> = updates.into();
    let mut applied = 0;
    while let Some(update) = pending.pop_front() {
        let Some(column) = columns.get_mut(&update.target_chunk) else {
            continue;
        };
        let blocking = registry.light_blocking(column.block_at(update.x, update.y, update.z));
        let offered = update.source_level.saturating_sub(1 + blocking);
        if offered <= read_light(column, update.x, update.y, update.z, update.channel) {
            continue;
        }
        let mut queue = LightQueue::new_for_column(update.target_chunk);
        queue.enqueue(update.x, update.y, update.z, offered);
        queue.propagate(column, registry, update.channel);
        applied += 1;
        for next in queue.take_cross_updates() {
            pending.push_back(next);
        }
    }
    applied
}

// ---------------------------------------------------------------------------
// World-space incremental updates (block edits).
// ---------------------------------------------------------------------------

fn split_world(pos: WorldPos) -> (ChunkPos, usize, usize) {
    (pos.chunk(), pos.local_x(), pos.local_z())
}

fn light_at(
    columns: &HashMap<ChunkPos, ChunkColumn>,
    pos: WorldPos,
    channel: LightChannel,
) -> u8 {
    if !pos.in_world_height() {
        return 0;
    }
    let (chunk, x, z) = split_world(pos);
    columns
        .get(&chunk)
        .map_or(0, |column| read_light(column, x, pos.y, z, channel))
}

fn set_light_at(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    pos: WorldPos,
    channel: LightChannel,
    level: u8,
) {
    if !pos.in_world_height() {
        return;
    }
    let (chunk, x, z) = split_world(pos);
    if let Some(column) = columns.get_mut(&chunk) {
        write_light(column, x, pos.y, z, channel, level);
    }
}

fn blocking_at(
    columns: &HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    pos: WorldPos,
) -> Option<u8> {
    if !pos.in_world_height() {
        return None;
    }
    let (chunk, x, z) = split_world(pos);
    columns
        .get(&chunk)
        .map(|column| registry.light_blocking(column.block_at(x, pos.y, z)))
}

/// Standard world-space flood from pre-written source cells.
fn flood_world(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    sources: VecDeque<(WorldPos, u8)>,
    channel: LightChannel,
) -> usize {
    let mut queue = sources;
    let mut nodes = 0;
    while let Some((pos, level)) = queue.pop_front() {
        nodes += 1;
        if level <= 1 {
            continue;
        }
        // A queued source may have been darkened since it was collected.
        if light_at(columns, pos, channel) < level {
            continue;
        }
        for (dx, dy, dz) in DIRECTIONS {
            let neighbor = pos.offset(dx, dy, dz);
            let Some(blocking) = blocking_at(columns, registry, neighbor) else {
                continue;
            };
            let offered = level.saturating_sub(1 + blocking);
            if offered > light_at(columns, neighbor, channel) {
                set_light_at(columns, neighbor, channel, offered);
                queue.push_back((neighbor, offered));
            }
        }
    }
    nodes
}

/// Clear-and-recalculate around removed light sources.
///
/// The darkening BFS clears every cell whose value could have descended
/// from a removed source (strictly smaller along the decay chain) and
/// collects the brighter frontier as "other sources"; those then re-flood.
pub fn remove_light_sources(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    sources: Vec<(WorldPos, u8)>,
    channel: LightChannel,
) -> usize {
    let mut darkening: VecDeque<(WorldPos, u8)> = VecDeque::new();
    for (pos, old_level) in sources {
        if old_level == 0 {
            continue;
        }
        set_light_at(columns, pos, channel, 0);
        darkening.push_back((pos, old_level));
    }

    let mut nodes = 0;
    let mut relight: VecDeque<(WorldPos, u8)> = VecDeque::new();
    while let Some((pos, level)) = darkening.pop_front() {
        nodes += 1;
        for (dx, dy, dz) in DIRECTIONS {
            let neighbor = pos.offset(dx, dy, dz);
            let neighbor_level = light_at(columns, neighbor, channel);
            if neighbor_level == 0 {
                continue;
            }
            if neighbor_level < level {
                // Could only have come from the removed source chain.
                set_light_at(columns, neighbor, channel, 0);
                darkening.push_back((neighbor, neighbor_level));
            } else {
                relight.push_back((neighbor, neighbor_level));
            }
        }
    }

    nodes + flood_world(columns, registry, relight, channel)
}

/// Pull light into a newly exposed (no longer opaque) cell from its six
/// neighbors, then continue the flood outward.
pub fn propagate_into_exposed(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    pos: WorldPos,
    channel: LightChannel,
) -> usize {
    let Some(own_blocking) = blocking_at(columns, registry, pos) else {
        return 0;
    };
    let mut best = 0u8;
    for (dx, dy, dz) in DIRECTIONS {
        let neighbor = pos.offset(dx, dy, dz);
        let level = light_at(columns, neighbor, channel);
        best = best.max(level.saturating_sub(1 + own_blocking));
    }
    if best <= light_at(columns, pos, channel) {
        return 0;
    }
    set_light_at(columns, pos, channel, best);
    flood_world(columns, registry, VecDeque::from([(pos, best)]), channel)
}

/// True when no opaque block sits above `pos` in its column.
pub fn has_sky_access(
    columns: &HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    pos: WorldPos,
) -> bool {
    let (chunk, x, z) = split_world(pos);
    let Some(column) = columns.get(&chunk) else {
        return true;
    };
    for y in (pos.y + 1)..COL_H as i64 {
        if registry.is_opaque(column.block_at(x, y, z)) {
            return false;
        }
    }
    true
}

/// An opaque block landed on a sky-lit column: strip the direct-sky values
/// from `top_y` downward (stopping at the first opaque cell), darken their
/// dependents, and re-flood from surviving light.
pub fn clear_sky_column(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    pos: WorldPos,
) -> usize {
    let mut removed = Vec::new();
    let mut y = pos.y;
    while y >= 0 {
        let cell = WorldPos::new(pos.x, y, pos.z);
        let Some(blocking) = blocking_at(columns, registry, cell) else {
            break;
        };
        if blocking >= MAX_LIGHT {
            break;
        }
        let old = light_at(columns, cell, LightChannel::Sky);
        if old > 0 {
            removed.push((cell, old));
        }
        y -= 1;
    }
    remove_light_sources(columns, registry, removed, LightChannel::Sky)
}

/// A block was mined out of a sky column: restore direct-sky seeds from
/// `pos` downward and flood them out.
pub fn reseed_sky_column(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    pos: WorldPos,
) -> usize {
    if !has_sky_access(columns, registry, pos) {
        return 0;
    }
    let mut queue: VecDeque<(WorldPos, u8)> = VecDeque::new();
    let mut y = pos.y;
    while y >= 0 {
        let cell = WorldPos::new(pos.x, y, pos.z);
        let Some(blocking) = blocking_at(columns, registry, cell) else {
            break;
        };
        if blocking >= MAX_LIGHT {
            break;
        }
        if light_at(columns, cell, LightChannel::Sky) < MAX_LIGHT {
            set_light_at(columns, cell, LightChannel::Sky, MAX_LIGHT);
            queue.push_back((cell, MAX_LIGHT));
        }
        y -= 1;
    }
    flood_world(columns, registry, queue, LightChannel::Sky)
}

/// Fan out every lighting consequence of one block edit.
///
/// Returns the number of BFS nodes processed, for metrics.
pub fn on_block_changed(
    columns: &mut HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    pos: WorldPos,
    old_id: slopworld_core::BlockId,
    new_id: slopworld_core::BlockId,
) -> usize {
    let mut nodes = 0;
    let old_emission = registry.light_emission(old_id);
    let new_emission = registry.light_emission(new_id);
    let old_opaque = registry.is_opaque(old_id);
    let new_opaque = registry.is_opaque(new_id);

    // Emitter removed: darken its contribution, keep other light.
    if old_emission > 0 && new_emission < old_emission {
        let stored = light_at(columns, pos, LightChannel::Block);
        nodes += remove_light_sources(
            columns,
            registry,
            vec![(pos, stored)],
            LightChannel::Block,
        );
    }

    if new_opaque && !old_opaque {
        // Placed something solid: kill any light stored in the cell and the
        // chains hanging off it, then strip the sky column underneath.
        for channel in [LightChannel::Sky, LightChannel::Block] {
            let stored = light_at(columns, pos, channel);
            if stored > 0 {
                nodes += remove_light_sources(columns, registry, vec![(pos, stored)], channel);
            }
        }
        nodes += clear_sky_column(columns, registry, WorldPos::new(pos.x, pos.y - 1, pos.z));
    } else if old_opaque && !new_opaque {
        // Exposed a cell: pull light back in from every side.
        nodes += propagate_into_exposed(columns, registry, pos, LightChannel::Sky);
        nodes += propagate_into_exposed(columns, registry, pos, LightChannel::Block);
        nodes += reseed_sky_column(columns, registry, pos);
    } else if !new_opaque && registry.light_blocking(new_id) != registry.light_blocking(old_id) {
        // Translucency change (e.g. water placed/removed): cheapest correct
        // answer is darken-then-refill around the cell.
        for channel in [LightChannel::Sky, LightChannel::Block] {
            let stored = light_at(columns, pos, channel);
            if stored > 0 {
                nodes += remove_light_sources(columns, registry, vec![(pos, stored)], channel);
            }
            nodes += propagate_into_exposed(columns, registry, pos, channel);
        }
        nodes += reseed_sky_column(columns, registry, pos);
    }

    // Emitter placed: light it up.
    if new_emission > 0 {
        set_light_at(columns, pos, LightChannel::Block, new_emission);
        nodes += flood_world(
            columns,
            registry,
            VecDeque::from([(pos, new_emission)]),
            LightChannel::Block,
        );
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::SUB_COUNT;
    use slopworld_core::{BLOCK_AIR, BLOCK_STONE, BLOCK_TORCH};

    fn registry() -> BlockRegistry {
        BlockRegistry::with_defaults()
    }

    fn empty_column(chunk: ChunkPos) -> ChunkColumn {
        let mut column = ChunkColumn::new(chunk);
        for sub_y in 0..SUB_COUNT {
            column.ensure_sub(sub_y);
        }
        column
    }

    #[test]
    fn seed_gives_full_sky_to_open_columns() {
        let registry = registry();
        let mut column = empty_column(ChunkPos::new(0, 0));
        let (update, _) = seed_column_skylight(&mut column, &registry);
        assert!(update.nodes_processed > 0);
        assert_eq!(column.sky_light_at(0, 0, 0), 15);
        assert_eq!(column.sky_light_at(31, 1023, 31), 15);
        assert_eq!(column.sky_light_at(16, 512, 16), 15);
    }

    #[test]
    fn seed_stops_below_opaque_roof() {
        let registry = registry();
        let mut column = empty_column(ChunkPos::new(0, 0));
        // Roof over one cell column at y=100.
        column.set_block_at(5, 100, 5, BLOCK_STONE);
        let (_, _) = seed_column_skylight(&mut column, &registry);
        assert_eq!(column.sky_light_at(5, 101, 5), 15);
        assert_eq!(column.sky_light_at(5, 100, 5), 0);
        // The cell right below the roof is side-lit by the open neighbors:
        // a neighbor at 15 offers 15 − 1 − 0 = 14.
        assert_eq!(column.sky_light_at(5, 99, 5), 14);
    }

    #[test]
    fn stored_light_in_opaque_cells_is_zero() {
        let registry = registry();
        let mut column = empty_column(ChunkPos::new(0, 0));
        for z in 0..SZ {
            for x in 0..SX {
                for y in 0..10 {
                    column.set_block_at(x, y, z, BLOCK_STONE);
                }
            }
        }
        seed_column_skylight(&mut column, &registry);
        for z in 0..SZ {
            for x in 0..SX {
                assert_eq!(column.sky_light_at(x, 5, z), 0);
                assert_eq!(column.sky_light_at(x, 10, z), 15);
            }
        }
    }

    #[test]
    fn torch_light_decays_by_taxicab_distance() {
        let registry = registry();
        let mut columns = HashMap::new();
        columns.insert(ChunkPos::new(0, 0), empty_column(ChunkPos::new(0, 0)));
        let pos = WorldPos::new(10, 30, 10);
        if let Some(c) = columns.get_mut(&ChunkPos::new(0, 0)) {
            c.set_block_at(10, 30, 10, BLOCK_TORCH);
        }
        on_block_changed(&mut columns, &registry, pos, BLOCK_AIR, BLOCK_TORCH);

        for (d, expected) in [(0i64, 14u8), (1, 13), (5, 9), (13, 1), (14, 0), (16, 0)] {
            let level = light_at(
                &columns,
                WorldPos::new(10 + d, 30, 10),
                LightChannel::Block,
            );
            assert_eq!(level, expected, "at distance {d}");
        }
        // Diagonal taxicab distance 2.
        assert_eq!(
            light_at(&columns, WorldPos::new(11, 31, 10), LightChannel::Block),
            12
        );
    }

    #[test]
    fn mining_the_torch_clears_all_of_its_light() {
        let registry = registry();
        let mut columns = HashMap::new();
        columns.insert(ChunkPos::new(0, 0), empty_column(ChunkPos::new(0, 0)));
        let pos = WorldPos::new(10, 30, 10);
        if let Some(c) = columns.get_mut(&ChunkPos::new(0, 0)) {
            c.set_block_at(10, 30, 10, BLOCK_TORCH);
        }
        on_block_changed(&mut columns, &registry, pos, BLOCK_AIR, BLOCK_TORCH);
        if let Some(c) = columns.get_mut(&ChunkPos::new(0, 0)) {
            c.set_block_at(10, 30, 10, BLOCK_AIR);
        }
        on_block_changed(&mut columns, &registry, pos, BLOCK_TORCH, BLOCK_AIR);

        let column = columns.get(&ChunkPos::new(0, 0)).unwrap();
        for y in 0..COL_H as i64 {
            for z in 0..SZ {
                for x in 0..SX {
                    assert_eq!(
                        column.block_light_at(x, y, z),
                        0,
                        "residual block light at ({x}, {y}, {z})"
                    );
                }
            }
        }
    }

    #[test]
    fn cross_column_stitch_carries_block_light() {
        let registry = registry();
        let mut columns = HashMap::new();
        let a = ChunkPos::new(0, 0);
        let b = ChunkPos::new(1, 0);
        columns.insert(a, empty_column(a));
        columns.insert(b, empty_column(b));

        // Torch at the east edge of column A.
        let pos = WorldPos::new(31, 64, 8);
        if let Some(c) = columns.get_mut(&a) {
            c.set_block_at(31, 64, 8, BLOCK_TORCH);
        }
        on_block_changed(&mut columns, &registry, pos, BLOCK_AIR, BLOCK_TORCH);

        // The west face of column B receives 13 (one step of decay).
        let level = light_at(&columns, WorldPos::new(32, 64, 8), LightChannel::Block);
        assert_eq!(level, 13);
    }

    #[test]
    fn stitch_column_reaches_fixpoint() {
        let registry = registry();
        let mut columns = HashMap::new();
        let a = ChunkPos::new(0, 0);
        let b = ChunkPos::new(1, 0);
        columns.insert(a, empty_column(a));
        columns.insert(b, empty_column(b));

        // Hand-seed light on A's east face without touching B.
        if let Some(column) = columns.get_mut(&a) {
            column.set_block_light_at(31, 50, 8, 12);
        }
        let exchanged = stitch_column(&mut columns, &registry, a, LightChannel::Block);
        assert!(exchanged > 0);
        assert_eq!(
            light_at(&columns, WorldPos::new(32, 50, 8), LightChannel::Block),
            11
        );
        // A second stitch is a no-op: the exchange converged.
        let again = stitch_column(&mut columns, &registry, a, LightChannel::Block);
        assert_eq!(again, 0);
    }

    #[test]
    fn placing_a_roof_darkens_the_column_below() {
        let registry = registry();
        let mut columns = HashMap::new();
        let chunk = ChunkPos::new(0, 0);
        let mut column = empty_column(chunk);
        // Solid floor so the test column is bounded below.
        for z in 0..SZ {
            for x in 0..SX {
                column.set_block_at(x, 0, z, BLOCK_STONE);
            }
        }
        seed_column_skylight(&mut column, &registry);
        columns.insert(chunk, column);

        let roof = WorldPos::new(8, 200, 8);
        if let Some(c) = columns.get_mut(&chunk) {
            c.set_block_at(8, 200, 8, BLOCK_STONE);
        }
        on_block_changed(&mut columns, &registry, roof, BLOCK_AIR, BLOCK_STONE);

        // Directly below the roof: no more direct sky, only side light.
        let below = light_at(&columns, WorldPos::new(8, 199, 8), LightChannel::Sky);
        assert!(below < 15, "cell below roof kept direct sky");
        assert_eq!(below, 14, "side-lit by open neighbors");
        // Far below, still side-lit through the open neighbors.
        let deep = light_at(&columns, WorldPos::new(8, 100, 8), LightChannel::Sky);
        assert_eq!(deep, 14);
        // The roof cell itself stores nothing.
        assert_eq!(light_at(&columns, roof, LightChannel::Sky), 0);
    }

    #[test]
    fn mining_a_roof_restores_direct_sky() {
        let registry = registry();
        let mut columns = HashMap::new();
        let chunk = ChunkPos::new(0, 0);
        let mut column = empty_column(chunk);
        // Full opaque slab at y=200.
        for z in 0..SZ {
            for x in 0..SX {
                column.set_block_at(x, 200, z, BLOCK_STONE);
            }
        }
        seed_column_skylight(&mut column, &registry);
        columns.insert(chunk, column);
        assert_eq!(
            light_at(&columns, WorldPos::new(8, 150, 8), LightChannel::Sky),
            0
        );

        let hole = WorldPos::new(8, 200, 8);
        if let Some(c) = columns.get_mut(&chunk) {
            c.set_block_at(8, 200, 8, BLOCK_AIR);
        }
        on_block_changed(&mut columns, &registry, hole, BLOCK_STONE, BLOCK_AIR);

        assert_eq!(light_at(&columns, hole, LightChannel::Sky), 15);
        assert_eq!(
            light_at(&columns, WorldPos::new(8, 150, 8), LightChannel::Sky),
            15,
            "shaft below the hole gets direct sky"
        );
        assert_eq!(
            light_at(&columns, WorldPos::new(9, 150, 8), LightChannel::Sky),
            14,
            "cells beside the shaft are side-lit"
        );
    }

    #[test]
    fn propagation_is_fifo_order_independent() {
        let registry = registry();
        // Two torches; final field must be the pointwise max of both
        // regardless of placement order.
        let run = |first: WorldPos, second: WorldPos| {
            let mut columns = HashMap::new();
            columns.insert(ChunkPos::new(0, 0), empty_column(ChunkPos::new(0, 0)));
            for pos in [first, second] {
                if let Some(c) = columns.get_mut(&ChunkPos::new(0, 0)) {
                    c.set_block_at(pos.local_x(), pos.y, pos.local_z(), BLOCK_TORCH);
                }
                on_block_changed(&mut columns, &registry, pos, BLOCK_AIR, BLOCK_TORCH);
            }
            let column = columns.remove(&ChunkPos::new(0, 0)).unwrap();
            let mut field = Vec::new();
            for y in 25..40 {
                for z in 0..SZ {
                    for x in 0..SX {
                        field.push(column.block_light_at(x, y, z));
                    }
                }
            }
            field
        };
        let a = WorldPos::new(10, 30, 10);
        let b = WorldPos::new(14, 30, 12);
        assert_eq!(run(a, b), run(b, a));
    }
}
