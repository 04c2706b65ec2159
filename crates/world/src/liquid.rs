//! Water-level cellular automaton.
//!
//! Water exists at four levels (QUARTER=1 .. FULL=4). The queueing unit is
//! a chunk column: a deduplicated queue feeds a rate-limited per-column
//! tick that walks the column's liquid-position index top-down, moving
//! water downward first and then splitting it evenly sideways. All writes
//! from one tick are batched into a single invalidation.

use crate::column::{ChunkColumn, LiquidCell};
use crate::coords::{world_y_to_sub, ChunkPos, SX, SZ};
use slopworld_core::{BlockId, BlockRegistry, BLOCK_AIR};
use std::collections::{HashSet, VecDeque};
use tracing::trace;

pub use slopworld_core::{water_block, water_level};

/// Full water cell.
pub const LEVEL_FULL: u8 = 4;
/// Three-quarter water cell.
pub const LEVEL_THREE_QUARTER: u8 = 3;
/// Half water cell.
pub const LEVEL_HALF: u8 = 2;
/// Quarter water cell.
pub const LEVEL_QUARTER: u8 = 1;

/// Default minimum interval between ticks of one column.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 200;

/// Result of one column tick.
#[derive(Debug, Default)]
pub struct LiquidTickOutcome {
    pub chunk: ChunkPos,
    pub cells_changed: usize,
    /// Sub-chunks (by owning column) whose blocks changed; the caller issues
    /// one lighting/meshing invalidation per entry, not per cell.
    pub touched_subs: Vec<(ChunkPos, u8)>,
}

impl LiquidTickOutcome {
    pub fn changed(&self) -> bool {
        self.cells_changed > 0
    }
}

/// Column-granular liquid scheduler state.
pub struct LiquidEngine {
    queue: VecDeque<ChunkPos>,
    queued: HashSet<ChunkPos>,
    pub update_interval_ms: u64,
}

impl LiquidEngine {
    pub fn new(update_interval_ms: u64) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            update_interval_ms,
        }
    }

    /// Add a column to the processing queue (idempotent).
    pub fn enqueue_column(&mut self, chunk: ChunkPos) {
        if self.queued.insert(chunk) {
            self.queue.push_back(chunk);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Tick the nearest eligible queued column, if any.
    ///
    /// Eligibility is rate-limited per column; the nearest eligible column
    /// (chunk-space distance to the player) goes first. A changed column
    /// re-enqueues itself and its four cardinal neighbors.
    pub fn process_next(
        &mut self,
        columns: &mut std::collections::HashMap<ChunkPos, ChunkColumn>,
        registry: &BlockRegistry,
        now_ms: u64,
        player_chunk: ChunkPos,
    ) -> Option<LiquidTickOutcome> {
        // Drop queue entries whose columns are gone, then pick the nearest
        // eligible survivor.
        let mut best: Option<(usize, f64)> = None;
        let mut stale = Vec::new();
        for (idx, chunk) in self.queue.iter().enumerate() {
            let Some(column) = columns.get(chunk) else {
                stale.push(idx);
                continue;
            };
            if now_ms.saturating_sub(column.last_liquid_tick_ms) < self.update_interval_ms {
                continue;
            }
            let distance = chunk.distance_to(player_chunk);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
        for idx in stale.into_iter().rev() {
            if let Some(chunk) = self.queue.remove(idx) {
                self.queued.remove(&chunk);
            }
        }

        let (idx, _) = best?;
        let chunk = self.queue.remove(idx)?;
        self.queued.remove(&chunk);

        if let Some(column) = columns.get_mut(&chunk) {
            column.last_liquid_tick_ms = now_ms;
        }
        let outcome = tick_column(columns, registry, chunk);
        if outcome.changed() {
            trace!(chunk = %chunk, cells = outcome.cells_changed, "liquid tick");
            self.enqueue_column(chunk);
            for neighbor in chunk.cardinal_neighbors() {
                self.enqueue_column(neighbor);
            }
        }
        Some(outcome)
    }
}

/// Neighbor order for the horizontal split (east, west, south, north).
const HORIZONTAL: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

struct CellRef {
    chunk: ChunkPos,
    x: usize,
    y: i64,
    z: usize,
}

fn cell_block(
    columns: &std::collections::HashMap<ChunkPos, ChunkColumn>,
    cell: &CellRef,
) -> Option<BlockId> {
    columns
        .get(&cell.chunk)
        .map(|column| column.block_at(cell.x, cell.y, cell.z))
}

fn write_water(
    columns: &mut std::collections::HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    cell: &CellRef,
    level: u8,
    outcome: &mut LiquidTickOutcome,
) {
    let Some(column) = columns.get_mut(&cell.chunk) else {
        return;
    };
    let id = water_block(level);
    if column.set_block_at(cell.x, cell.y, cell.z, id) {
        column.note_liquid_cell(cell.x, cell.y, cell.z, registry.is_liquid(id));
        outcome.cells_changed += 1;
        if let Some((sub_y, _)) = world_y_to_sub(cell.y) {
            let key = (cell.chunk, sub_y as u8);
            if !outcome.touched_subs.contains(&key) {
                outcome.touched_subs.push(key);
            }
        }
    }
}

/// Offset a cell horizontally, hopping columns at chunk borders.
fn horizontal_neighbor(cell: &CellRef, dx: i64, dz: i64) -> CellRef {
    let mut chunk = cell.chunk;
    let mut x = cell.x as i64 + dx;
    let mut z = cell.z as i64 + dz;
    if x < 0 {
        chunk.x -= 1;
        x += SX as i64;
    } else if x >= SX as i64 {
        chunk.x += 1;
        x -= SX as i64;
    }
    if z < 0 {
        chunk.z -= 1;
        z += SZ as i64;
    } else if z >= SZ as i64 {
        chunk.z += 1;
        z -= SZ as i64;
    }
    CellRef {
        chunk,
        x: x as usize,
        y: cell.y,
        z: z as usize,
    }
}

/// Run the cellular rule over one column's liquid index.
pub fn tick_column(
    columns: &mut std::collections::HashMap<ChunkPos, ChunkColumn>,
    registry: &BlockRegistry,
    chunk: ChunkPos,
) -> LiquidTickOutcome {
    let mut outcome = LiquidTickOutcome {
        chunk,
        ..Default::default()
    };

    // Snapshot the index sorted top-down so falling water settles in one
    // tick instead of leapfrogging itself.
    let mut cells: Vec<LiquidCell> = match columns.get_mut(&chunk) {
        Some(column) => column.liquid_cells(registry).to_vec(),
        None => return outcome,
    };
    cells.sort_by(|a, b| b.y.cmp(&a.y));

    for cell in cells {
        let here = CellRef {
            chunk,
            x: cell.x as usize,
            y: cell.y as i64,
            z: cell.z as usize,
        };
        let Some(id) = cell_block(columns, &here) else {
            continue;
        };
        let Some(mut level) = water_level(id) else {
            // Index entry no longer holds water: drop it silently.
            if let Some(column) = columns.get_mut(&chunk) {
                column.drop_liquid_cell(cell);
            }
            continue;
        };

        // Downward first.
        if here.y > 0 {
            let below = CellRef {
                chunk,
                x: here.x,
                y: here.y - 1,
                z: here.z,
            };
            if let Some(below_id) = cell_block(columns, &below) {
                if below_id == BLOCK_AIR {
                    write_water(columns, registry, &below, level, &mut outcome);
                    write_water(columns, registry, &here, 0, &mut outcome);
                    continue;
                }
                if let Some(below_level) = water_level(below_id) {
                    if below_level < LEVEL_FULL {
                        let total = below_level + level;
                        let new_below = total.min(LEVEL_FULL);
                        let remainder = total - new_below;
                        write_water(columns, registry, &below, new_below, &mut outcome);
                        write_water(columns, registry, &here, remainder, &mut outcome);
                        if remainder == 0 {
                            continue;
                        }
                        level = remainder;
                    }
                }
            }
        }

        // Horizontal even split across strictly lower neighbors.
        let mut targets: Vec<(CellRef, u8)> = Vec::new();
        for (dx, dz) in HORIZONTAL {
            let neighbor = horizontal_neighbor(&here, dx, dz);
            let Some(neighbor_id) = cell_block(columns, &neighbor) else {
                continue;
            };
            let neighbor_level = if neighbor_id == BLOCK_AIR {
                0
            } else {
                match water_level(neighbor_id) {
                    Some(l) if l < level => l,
                    _ => continue,
                }
            };
            if neighbor_level < level {
                targets.push((neighbor, neighbor_level));
            }
        }
        if targets.is_empty() {
            continue;
        }

        let total: u8 = level + targets.iter().map(|(_, l)| l).sum::<u8>();
        let cell_count = 1 + targets.len() as u8;
        let base = total / cell_count;
        let mut remainder = total % cell_count;

        // Remainder units go to self first, then to targets in order.
        let mut self_share = base;
        if remainder > 0 {
            self_share += 1;
            remainder -= 1;
        }
        if self_share == level {
            continue; // No flow if the split leaves self unchanged.
        }

        write_water(columns, registry, &here, self_share, &mut outcome);
        for (target, _) in targets {
            let mut share = base;
            if remainder > 0 {
                share += 1;
                remainder -= 1;
            }
            write_water(columns, registry, &target, share, &mut outcome);
        }
    }

    outcome
}
