//! The world manager: column map ownership, chunk lifecycle, the single
//! block-write entry point, and the per-frame update loop.
//!
//! One logical tick thread owns everything here. Heavy pure jobs
//! (generation, meshing, full-column re-light) run on the worker pool;
//! their results are reconciled when replies drain at the start of each
//! update. Sub-chunks flow Empty → Generating → Generated → (lighting) →
//! Meshing → Ready, and any edit pushes the affected sub-chunks back to
//! Dirty.

use crate::column::ChunkColumn;
use crate::config::WorldConfig;
use crate::coords::{
    world_y_to_sub, ChunkPos, SubChunkPos, WorldPos, COL_H, SUB_COUNT, SUB_H, SX, SZ,
};
use crate::lighting::{
    apply_cross_updates, on_block_changed, seed_column_blocklight, seed_column_skylight,
    stitch_column, LightChannel,
};
use crate::liquid::LiquidEngine;
use crate::persist::{decode_sub_chunk, encode_sub_chunk, WorldMeta};
use crate::raycast::{raycast, RaycastHit};
use crate::relight::{apply_column_relight, ColumnBlockSnapshot};
use crate::scheduler::{Scheduler, TaskContext, TaskPriority, TaskRun};
use crate::store::ChunkStore;
use crate::subchunk::{DirtyFlags, SubChunk, SubChunkState};
use crate::terrain::WorldGenerator;
use crate::worker::{RequestId, WorkerPool, WorkerReply, WorkerRequest};
use glam::DVec3;
use slopworld_core::{BlockId, BlockRegistry, Face, BLOCK_AIR, BLOCK_DIRT, BLOCK_GRASS};
use slopworld_mesh::{BoundarySlab, MeshBuffers, MeshInput};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// A finished mesh waiting for the renderer to pick it up.
pub struct ReadyMesh {
    pub pos: SubChunkPos,
    pub mesh: MeshBuffers,
}

/// The world subsystem facade.
pub struct World {
    config: WorldConfig,
    registry: Arc<BlockRegistry>,
    generator: Arc<WorldGenerator>,
    columns: HashMap<ChunkPos, ChunkColumn>,
    workers: WorkerPool,
    scheduler: Option<Scheduler<World>>,
    liquid: LiquidEngine,
    store: Option<Box<dyn ChunkStore>>,

    /// Sub-chunks wanting generation, nearest (with vertical weight) first.
    gen_queue: VecDeque<SubChunkPos>,
    /// Gate against double in-flight generation of one sub-chunk.
    gen_in_flight: HashSet<SubChunkPos>,
    gen_jobs: HashMap<RequestId, SubChunkPos>,
    /// In-flight mesh job per sub-chunk; a light or block update after
    /// dispatch invalidates the result on arrival.
    mesh_jobs: HashMap<RequestId, SubChunkPos>,
    mesh_in_flight: HashSet<SubChunkPos>,
    relight_queue: VecDeque<ChunkPos>,
    relight_jobs: HashMap<RequestId, ChunkPos>,
    relight_in_flight: HashSet<ChunkPos>,
    /// Heightmap samples to recompute, produced by block edits.
    heightmap_queue: VecDeque<(ChunkPos, usize, usize)>,
    /// Memoized terrain-top sub-chunk per column (pure in seed + chunk).
    terrain_top_cache: HashMap<ChunkPos, usize>,
    ready_meshes: Vec<ReadyMesh>,

    player_pos: DVec3,
    clock_ms: f64,
    /// Round-robin cursor for the low-priority block-tick sweep.
    tick_cursor: usize,
}

impl World {
    pub fn new(
        seed: u64,
        config: WorldConfig,
        registry: Arc<BlockRegistry>,
        store: Option<Box<dyn ChunkStore>>,
    ) -> Self {
        let generator = Arc::new(WorldGenerator::new(seed, config.sea_level));
        let workers = WorkerPool::new(config.worker_threads, generator.clone(), registry.clone());
        let mut scheduler = Scheduler::new(config.frame_budget());
        Self::register_builtin_tasks(&mut scheduler);

        Self {
            liquid: LiquidEngine::new(config.liquid_interval_ms),
            config,
            registry,
            generator,
            columns: HashMap::new(),
            workers,
            scheduler: Some(scheduler),
            store,
            gen_queue: VecDeque::new(),
            gen_in_flight: HashSet::new(),
            gen_jobs: HashMap::new(),
            mesh_jobs: HashMap::new(),
            mesh_in_flight: HashSet::new(),
            relight_queue: VecDeque::new(),
            relight_jobs: HashMap::new(),
            relight_in_flight: HashSet::new(),
            heightmap_queue: VecDeque::new(),
            terrain_top_cache: HashMap::new(),
            ready_meshes: Vec::new(),
            player_pos: DVec3::ZERO,
            clock_ms: 0.0,
            tick_cursor: 0,
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn generator(&self) -> &Arc<WorldGenerator> {
        &self.generator
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.generator.world_seed()
    }

    pub fn loaded_column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, chunk: ChunkPos) -> Option<&ChunkColumn> {
        self.columns.get(&chunk)
    }

    /// Register an external task alongside the built-ins.
    pub fn register_task(
        &mut self,
        id: impl Into<String>,
        priority: TaskPriority,
        run: impl FnMut(&mut World, &TaskContext) -> TaskRun + 'static,
    ) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.register_task(id, priority, run);
        }
    }

    /// Meshes completed since the last call, for the renderer to upload.
    pub fn take_ready_meshes(&mut self) -> Vec<ReadyMesh> {
        std::mem::take(&mut self.ready_meshes)
    }

    // -----------------------------------------------------------------
    // Frame update
    // -----------------------------------------------------------------

    /// Advance the world one frame.
    pub fn update(&mut self, delta_time_ms: f64, player_pos: DVec3) {
        self.clock_ms += delta_time_ms;
        self.player_pos = player_pos;
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.report_frame(delta_time_ms);
        }

        self.drain_replies();
        self.rebuild_gen_queue();
        self.unload_pass();

        // Take/put-back so the scheduler can borrow the world mutably.
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.run_frame(self, delta_time_ms);
            self.scheduler = Some(scheduler);
        }
    }

    fn register_builtin_tasks(scheduler: &mut Scheduler<World>) {
        scheduler.register_task("mesh_dispatch", TaskPriority::High, |world, ctx| {
            world.pump_meshing(ctx)
        });
        scheduler.register_task("generation", TaskPriority::Normal, |world, ctx| {
            world.pump_generation(ctx)
        });
        scheduler.register_task("background_relight", TaskPriority::Normal, |world, ctx| {
            world.pump_relight(ctx)
        });
        scheduler.register_task("liquid", TaskPriority::Normal, |world, ctx| {
            world.pump_liquid(ctx)
        });
        scheduler.register_task("heightmap_maintenance", TaskPriority::Normal, |world, ctx| {
            world.pump_heightmaps(ctx)
        });
        scheduler.register_task("block_tick", TaskPriority::Low, |world, _ctx| {
            world.pump_block_ticks()
        });
    }

    fn player_chunk(&self) -> ChunkPos {
        ChunkPos::new(
            crate::coords::world_to_chunk_axis(self.player_pos.x.floor() as i64),
            crate::coords::world_to_chunk_axis(self.player_pos.z.floor() as i64),
        )
    }

    fn player_sub_y(&self) -> i64 {
        (self.player_pos.y.floor() as i64).clamp(0, COL_H as i64 - 1) / SUB_H as i64
    }

    /// Unweighted distance of a sub-chunk from the player's sub-chunk, in
    /// chunk units; membership in the 3D interest sphere.
    fn interest_distance(&self, pos: SubChunkPos) -> f64 {
        let player = self.player_chunk();
        let dx = (pos.chunk.x - player.x) as f64;
        let dz = (pos.chunk.z - player.z) as f64;
        // A sub-chunk is two chunks tall.
        let dy = (pos.sub_y as i64 - self.player_sub_y()) as f64 * 2.0;
        (dx * dx + dz * dz + dy * dy).sqrt()
    }

    /// Weighted priority distance; the vertical component counts extra so
    /// near-eye-level sub-chunks come first.
    fn priority_distance(&self, pos: SubChunkPos) -> f64 {
        let player = self.player_chunk();
        let dx = (pos.chunk.x - player.x) as f64;
        let dz = (pos.chunk.z - player.z) as f64;
        let dy = (pos.sub_y as i64 - self.player_sub_y()) as f64 * 2.0;
        let dy = dy * self.config.vertical_weight;
        (dx * dx + dz * dz + dy * dy).sqrt()
    }

    fn terrain_top_sub(&mut self, chunk: ChunkPos) -> usize {
        if let Some(&top) = self.terrain_top_cache.get(&chunk) {
            return top;
        }
        let top = self.generator.terrain_top_sub(chunk);
        self.terrain_top_cache.insert(chunk, top);
        top
    }

    /// Rebuild the generation queue: an XZ spiral (center first) clipped to
    /// the 3D interest sphere, ordered by weighted distance. Columns that
    /// already started generating also queue their missing below-terrain
    /// sub-chunks, so every started column can reach a consistent state.
    fn rebuild_gen_queue(&mut self) {
        let view = self.config.view_distance as i64;
        let player = self.player_chunk();
        let mut wanted: Vec<SubChunkPos> = Vec::new();

        for ring in 0..=view {
            for (dx, dz) in ring_offsets(ring) {
                let chunk = player.offset(dx, dz);
                for sub_y in 0..SUB_COUNT {
                    let pos = SubChunkPos::new(chunk, sub_y as u8);
                    if self.interest_distance(pos) > view as f64 {
                        continue;
                    }
                    if self.needs_generation(pos) {
                        wanted.push(pos);
                    }
                }
            }
        }

        // Completion pass for partially generated columns.
        let unfinalized: Vec<ChunkPos> = self
            .columns
            .iter()
            .filter(|(_, column)| !column.finalized)
            .map(|(&chunk, _)| chunk)
            .collect();
        for chunk in unfinalized {
            let top_sub = self.terrain_top_sub(chunk);
            let Some(column) = self.columns.get(&chunk) else {
                continue;
            };
            for sub_y in 0..=top_sub {
                if column.sub(sub_y).is_none() {
                    let pos = SubChunkPos::new(chunk, sub_y as u8);
                    if !self.gen_in_flight.contains(&pos) && !wanted.contains(&pos) {
                        wanted.push(pos);
                    }
                }
            }
        }

        wanted.sort_by(|a, b| {
            self.priority_distance(*a)
                .total_cmp(&self.priority_distance(*b))
        });
        self.gen_queue = wanted.into();
    }

    fn needs_generation(&self, pos: SubChunkPos) -> bool {
        if self.gen_in_flight.contains(&pos) {
            return false;
        }
        match self.columns.get(&pos.chunk) {
            Some(column) => match column.sub(pos.sub_y as usize) {
                Some(sub) => matches!(sub.state(), SubChunkState::Empty),
                None => true,
            },
            None => true,
        }
    }

    /// Unload far columns (saving them first) and drop sub-chunks outside
    /// the interest sphere.
    fn unload_pass(&mut self) {
        let player = self.player_chunk();
        let unload_distance = self.config.unload_distance();
        let to_unload: Vec<ChunkPos> = self
            .columns
            .keys()
            .filter(|chunk| chunk.distance_to(player) > unload_distance)
            .copied()
            .collect();
        for chunk in to_unload {
            self.unload_chunk(chunk);
        }

        // Partial unload: drop above-terrain (pure air) sub-chunk slots well
        // outside the sphere, keeping a margin so the boundary does not
        // thrash. Terrain-bearing slots stay until the column itself goes;
        // dropping them would fight the completion pass.
        let margin = self.config.view_distance as f64 * self.config.unload_factor;
        let loaded: Vec<ChunkPos> = self.columns.keys().copied().collect();
        let mut dropped: Vec<SubChunkPos> = Vec::new();
        for chunk in loaded {
            let top_sub = self.terrain_top_sub(chunk);
            let Some(column) = self.columns.get(&chunk) else {
                continue;
            };
            for sub_y in (top_sub + 1)..SUB_COUNT {
                let pos = SubChunkPos::new(chunk, sub_y as u8);
                if column.sub(sub_y).is_some() && self.interest_distance(pos) > margin {
                    dropped.push(pos);
                }
            }
        }
        for pos in dropped {
            self.save_sub_chunk(pos);
            if let Some(column) = self.columns.get_mut(&pos.chunk) {
                column.remove_sub(pos.sub_y as usize);
            }
        }
    }

    // -----------------------------------------------------------------
    // Worker reply reconciliation
    // -----------------------------------------------------------------

    fn drain_replies(&mut self) {
        while let Some(reply) = self.workers.try_recv() {
            match reply {
                WorkerReply::SubGenerated { id, pos, sub } => {
                    self.gen_jobs.remove(&id);
                    self.gen_in_flight.remove(&pos);
                    self.integrate_generated(pos, sub);
                }
                WorkerReply::MeshBuilt { id, pos, mesh } => {
                    self.mesh_jobs.remove(&id);
                    self.mesh_in_flight.remove(&pos);
                    self.integrate_mesh(pos, mesh);
                }
                WorkerReply::ColumnRelit { id, result } => {
                    self.relight_jobs.remove(&id);
                    self.relight_in_flight.remove(&result.chunk);
                    let changed =
                        apply_column_relight(&mut self.columns, &self.registry, &result);
                    if !changed.is_empty() {
                        debug!(chunk = %result.chunk, subs = ?changed, "background re-light corrected");
                    }
                }
                WorkerReply::Failed { id, what } => {
                    warn!(id, what = %what, "worker job failed");
                    if let Some(pos) = self.gen_jobs.remove(&id) {
                        // Re-queued by the next rebuild.
                        self.gen_in_flight.remove(&pos);
                    }
                    if let Some(pos) = self.mesh_jobs.remove(&id) {
                        self.mesh_in_flight.remove(&pos);
                        if let Some(sub) = self.sub_mut(pos) {
                            sub.mark_dirty(DirtyFlags::MESH);
                        }
                    }
                    if let Some(chunk) = self.relight_jobs.remove(&id) {
                        self.relight_in_flight.remove(&chunk);
                        self.relight_queue.push_back(chunk);
                    }
                }
            }
        }
    }

    fn sub_mut(&mut self, pos: SubChunkPos) -> Option<&mut SubChunk> {
        self.columns
            .get_mut(&pos.chunk)
            .and_then(|column| column.sub_mut(pos.sub_y as usize))
    }

    fn integrate_generated(&mut self, pos: SubChunkPos, sub: Box<SubChunk>) {
        let column = self
            .columns
            .entry(pos.chunk)
            .or_insert_with(|| ChunkColumn::new(pos.chunk));
        column.insert_sub(pos.sub_y as usize, sub);
        self.speculative_light_seed(pos.chunk);
        self.finalize_if_complete(pos.chunk);
    }

    /// Re-run the skylight seed over whatever the column holds so far.
    ///
    /// Missing sub-chunks read as air, so buried cave air can briefly earn
    /// sky light it should not have; the background re-light erases that
    /// once the column settles. Seeding early is what lets sub-chunks mesh
    /// before their whole column exists.
    fn speculative_light_seed(&mut self, chunk: ChunkPos) {
        let mut cross = Vec::new();
        if let Some(column) = self.columns.get_mut(&chunk) {
            if column.finalized {
                return; // Finalized columns are maintained incrementally.
            }
            let (_, sky_cross) = seed_column_skylight(column, &self.registry);
            cross = sky_cross;
            column.light_seeded = true;
        }
        apply_cross_updates(&mut self.columns, &self.registry, cross);
    }

    /// Column-level finalize once the terrain-covering stack is generated.
    /// Slots above `terrain_top_sub` hold nothing but air and may stream in
    /// later without blocking entrances, decorations, or the heightmap.
    fn finalize_if_complete(&mut self, chunk: ChunkPos) {
        let top_sub = self.terrain_top_sub(chunk);
        let ready = self
            .columns
            .get(&chunk)
            .is_some_and(|column| column.is_generated_through(top_sub) && !column.finalized);
        if !ready {
            return;
        }

        let mut cross = Vec::new();
        if let Some(column) = self.columns.get_mut(&chunk) {
            if column.loaded_from_store {
                // Entrance outputs are persisted with the blocks; never
                // re-attempt them on a loaded column.
                column.entrances_generated = true;
            }
            self.generator.finalize_column(column);
            let (_, sky_cross) = seed_column_skylight(column, &self.registry);
            let (_, block_cross) = seed_column_blocklight(column, &self.registry);
            cross.extend(sky_cross);
            cross.extend(block_cross);
            for sub_y in 0..SUB_COUNT {
                if let Some(sub) = column.sub_mut(sub_y) {
                    sub.mark_dirty(DirtyFlags::MESH);
                }
            }
            column.finalized = true;
            column.light_seeded = true;
        }

        apply_cross_updates(&mut self.columns, &self.registry, cross);
        stitch_column(&mut self.columns, &self.registry, chunk, LightChannel::Sky);
        stitch_column(&mut self.columns, &self.registry, chunk, LightChannel::Block);

        self.relight_queue.push_back(chunk);
        self.liquid.enqueue_column(chunk);
        debug!(chunk = %chunk, "column finalized");
    }

    fn integrate_mesh(&mut self, pos: SubChunkPos, mesh: MeshBuffers) {
        let Some(sub) = self.sub_mut(pos) else {
            return; // Column unloaded while meshing; buffers discarded.
        };
        // An edit or light update since dispatch invalidates the buffers.
        if sub.state() != SubChunkState::Meshing
            || sub.dirty_flags().contains(DirtyFlags::MESH)
        {
            sub.mark_dirty(DirtyFlags::MESH);
            if sub.state() == SubChunkState::Meshing {
                sub.set_state(SubChunkState::Dirty);
            }
            return;
        }
        sub.set_state(SubChunkState::Ready);
        self.ready_meshes.push(ReadyMesh { pos, mesh });
    }

    // -----------------------------------------------------------------
    // Scheduled pumps
    // -----------------------------------------------------------------

    fn pump_generation(&mut self, ctx: &TaskContext) -> TaskRun {
        let started = std::time::Instant::now();
        let mut units = 0u32;
        while let Some(pos) = self.gen_queue.pop_front() {
            if !self.needs_generation(pos) {
                continue;
            }
            if !self.try_load_from_store(pos) {
                self.gen_in_flight.insert(pos);
                if let Some(column) = self.columns.get_mut(&pos.chunk) {
                    if let Some(sub) = column.sub_mut(pos.sub_y as usize) {
                        sub.set_state(SubChunkState::Generating);
                    }
                }
                let id = self
                    .workers
                    .submit(|id| WorkerRequest::GenerateSub { id, pos });
                self.gen_jobs.insert(id, pos);
            }
            units += 1;
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            if elapsed >= ctx.remaining_budget_ms || units >= 64 {
                return TaskRun::units(units, false);
            }
        }
        TaskRun::units(units, true)
    }

    /// Load a persisted sub-chunk if the backend has it. Returns false when
    /// procedural generation should run instead (including on load errors).
    fn try_load_from_store(&mut self, pos: SubChunkPos) -> bool {
        let Some(store) = self.store.as_mut() else {
            return false;
        };
        let bytes = match store.load_sub_chunk(pos) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(err) => {
                warn!(pos = %pos, error = %err, "chunk load failed; regenerating");
                return false;
            }
        };
        let payload = match decode_sub_chunk(&bytes) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(pos = %pos, error = %err, "chunk decode failed; regenerating");
                return false;
            }
        };
        let Some(mut sub) = SubChunk::from_parts(payload.blocks, payload.light) else {
            warn!(pos = %pos, "persisted sub-chunk has wrong volume; regenerating");
            return false;
        };
        let fully_opaque = sub.compute_fully_opaque(&self.registry);
        sub.set_fully_opaque(fully_opaque);

        let column = self
            .columns
            .entry(pos.chunk)
            .or_insert_with(|| ChunkColumn::new(pos.chunk));
        column.loaded_from_store = true;
        column.insert_sub(pos.sub_y as usize, Box::new(sub));
        column.invalidate_liquid_index();
        self.speculative_light_seed(pos.chunk);
        self.finalize_if_complete(pos.chunk);
        true
    }

    fn pump_meshing(&mut self, ctx: &TaskContext) -> TaskRun {
        let started = std::time::Instant::now();

        // Collect dirty, lit sub-chunks nearest first.
        let mut candidates: Vec<SubChunkPos> = Vec::new();
        for (&chunk, column) in &self.columns {
            if !column.light_seeded {
                continue;
            }
            for sub_y in 0..SUB_COUNT {
                let Some(sub) = column.sub(sub_y) else { continue };
                let pos = SubChunkPos::new(chunk, sub_y as u8);
                if self.mesh_in_flight.contains(&pos) {
                    continue;
                }
                let wants_mesh = match sub.state() {
                    SubChunkState::Generated | SubChunkState::Dirty => true,
                    SubChunkState::Ready => sub.dirty_flags().contains(DirtyFlags::MESH),
                    _ => false,
                };
                if wants_mesh {
                    candidates.push(pos);
                }
            }
        }
        candidates.sort_by(|a, b| {
            self.priority_distance(*a)
                .total_cmp(&self.priority_distance(*b))
        });

        let mut units = 0u32;
        for pos in candidates {
            let Some(input) = self.mesh_input_for(pos) else {
                continue;
            };
            if let Some(sub) = self.sub_mut(pos) {
                sub.clear_dirty(DirtyFlags::MESH);
                sub.set_state(SubChunkState::Meshing);
            }
            let id = self
                .workers
                .submit(|id| WorkerRequest::MeshSub { id, pos, input });
            self.mesh_jobs.insert(id, pos);
            self.mesh_in_flight.insert(pos);
            units += 1;

            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            if elapsed >= ctx.remaining_budget_ms || units >= 32 {
                return TaskRun::units(units, false);
            }
        }
        TaskRun::units(units, true)
    }

    /// Snapshot a sub-chunk and its six boundary slabs for the mesher.
    fn mesh_input_for(&self, pos: SubChunkPos) -> Option<MeshInput> {
        let column = self.columns.get(&pos.chunk)?;
        let sub = column.sub(pos.sub_y as usize)?;
        let sub_y = pos.sub_y as usize;

        let mut neighbors: [Option<BoundarySlab>; 6] = [None, None, None, None, None, None];
        for face in Face::ALL {
            let slab = match face {
                Face::East | Face::West => {
                    let chunk = if face == Face::East {
                        pos.chunk.offset(1, 0)
                    } else {
                        pos.chunk.offset(-1, 0)
                    };
                    let x = if face == Face::East { 0 } else { SX - 1 };
                    self.columns
                        .get(&chunk)
                        .and_then(|c| c.sub(sub_y))
                        .map(|neighbor| {
                            let mut blocks = vec![BLOCK_AIR; SUB_H * SZ];
                            let mut light = vec![0u8; SUB_H * SZ];
                            for y in 0..SUB_H {
                                for z in 0..SZ {
                                    blocks[y * SZ + z] = neighbor.block(x, y, z);
                                    light[y * SZ + z] = (neighbor.sky_light(x, y, z) << 4)
                                        | neighbor.block_light(x, y, z);
                                }
                            }
                            BoundarySlab { blocks, light }
                        })
                }
                Face::South | Face::North => {
                    let chunk = if face == Face::South {
                        pos.chunk.offset(0, 1)
                    } else {
                        pos.chunk.offset(0, -1)
                    };
                    let z = if face == Face::South { 0 } else { SZ - 1 };
                    self.columns
                        .get(&chunk)
                        .and_then(|c| c.sub(sub_y))
                        .map(|neighbor| {
                            let mut blocks = vec![BLOCK_AIR; SUB_H * SX];
                            let mut light = vec![0u8; SUB_H * SX];
                            for y in 0..SUB_H {
                                for x in 0..SX {
                                    blocks[y * SX + x] = neighbor.block(x, y, z);
                                    light[y * SX + x] = (neighbor.sky_light(x, y, z) << 4)
                                        | neighbor.block_light(x, y, z);
                                }
                            }
                            BoundarySlab { blocks, light }
                        })
                }
                Face::Up | Face::Down => {
                    let other = if face == Face::Up {
                        sub_y.checked_add(1).filter(|&s| s < SUB_COUNT)
                    } else {
                        sub_y.checked_sub(1)
                    };
                    let y = if face == Face::Up { 0 } else { SUB_H - 1 };
                    other.and_then(|other| column.sub(other)).map(|neighbor| {
                        let mut blocks = vec![BLOCK_AIR; SZ * SX];
                        let mut light = vec![0u8; SZ * SX];
                        for z in 0..SZ {
                            for x in 0..SX {
                                blocks[z * SX + x] = neighbor.block(x, y, z);
                                light[z * SX + x] = (neighbor.sky_light(x, y, z) << 4)
                                    | neighbor.block_light(x, y, z);
                            }
                        }
                        BoundarySlab { blocks, light }
                    })
                }
            };
            neighbors[face.index()] = slab;
        }

        Some(MeshInput {
            blocks: sub.blocks().to_vec(),
            light: sub.light().to_vec(),
            fully_opaque: sub.fully_opaque(),
            neighbors,
        })
    }

    fn pump_relight(&mut self, ctx: &TaskContext) -> TaskRun {
        let mut units = 0u32;
        let started = std::time::Instant::now();
        // Columns with a pass already in flight wait for the next frame
        // instead of being dropped.
        let mut deferred: Vec<ChunkPos> = Vec::new();
        let mut exhausted = false;

        while let Some(chunk) = self.relight_queue.pop_front() {
            if self.relight_in_flight.contains(&chunk) {
                if !deferred.contains(&chunk) {
                    deferred.push(chunk);
                }
                continue;
            }
            let Some(column) = self.columns.get(&chunk) else {
                continue;
            };
            if !column.finalized {
                continue;
            }
            let snapshot = ColumnBlockSnapshot::capture(column);
            let id = self
                .workers
                .submit(|id| WorkerRequest::RelightColumn { id, snapshot });
            self.relight_jobs.insert(id, chunk);
            self.relight_in_flight.insert(chunk);
            units += 1;

            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            if elapsed >= ctx.remaining_budget_ms || units >= 4 {
                exhausted = true;
                break;
            }
        }

        self.relight_queue.extend(deferred);
        TaskRun::units(units, !exhausted)
    }

    fn pump_liquid(&mut self, ctx: &TaskContext) -> TaskRun {
        let now_ms = self.clock_ms as u64;
        let player_chunk = self.player_chunk();
        let started = std::time::Instant::now();
        let mut units = 0u32;
        loop {
            let Some(outcome) =
                self.liquid
                    .process_next(&mut self.columns, &self.registry, now_ms, player_chunk)
            else {
                return TaskRun::units(units, true);
            };
            units += 1;
            // One invalidation batch per column tick.
            for (chunk, sub_y) in &outcome.touched_subs {
                let pos = SubChunkPos::new(*chunk, *sub_y);
                if let Some(sub) = self.sub_mut(pos) {
                    sub.mark_dirty(DirtyFlags::MESH | DirtyFlags::LIGHT);
                }
                self.relight_queue.push_back(*chunk);
            }
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            if elapsed >= ctx.remaining_budget_ms {
                return TaskRun::units(units, false);
            }
        }
    }

    fn pump_heightmaps(&mut self, ctx: &TaskContext) -> TaskRun {
        let started = std::time::Instant::now();
        let mut units = 0u32;
        while let Some((chunk, sample_x, sample_z)) = self.heightmap_queue.pop_front() {
            if let Some(column) = self.columns.get_mut(&chunk) {
                column.recompute_height_sample(sample_x, sample_z);
                units += 1;
            }
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            if elapsed >= ctx.remaining_budget_ms {
                return TaskRun::units(units, false);
            }
        }
        TaskRun::units(units, true)
    }

    /// Low-priority sweep: one column per call, converting buried grass to
    /// dirt under opaque cover.
    fn pump_block_ticks(&mut self) -> TaskRun {
        let mut chunks: Vec<ChunkPos> = self.columns.keys().copied().collect();
        if chunks.is_empty() {
            return TaskRun::idle();
        }
        chunks.sort();
        self.tick_cursor = (self.tick_cursor + 1) % chunks.len();
        let chunk = chunks[self.tick_cursor];

        let mut conversions: Vec<WorldPos> = Vec::new();
        if let Some(column) = self.columns.get(&chunk) {
            if !column.finalized {
                return TaskRun::idle();
            }
            let (origin_x, origin_z) = chunk.origin();
            for z in 0..SZ {
                for x in 0..SX {
                    let surface = column.surface_height_scan(x, z);
                    if surface <= 0 {
                        continue;
                    }
                    let below = surface as i64 - 1;
                    if column.block_at(x, below, z) == BLOCK_GRASS
                        && self
                            .registry
                            .is_opaque(column.block_at(x, surface as i64, z))
                    {
                        conversions.push(WorldPos::new(
                            origin_x + x as i64,
                            below,
                            origin_z + z as i64,
                        ));
                    }
                }
            }
        }
        let units = conversions.len() as u32;
        for pos in conversions {
            self.set_block(pos, BLOCK_DIRT);
        }
        TaskRun::units(units, true)
    }

    // -----------------------------------------------------------------
    // Block access and edits
    // -----------------------------------------------------------------

    pub fn get_block(&self, pos: WorldPos) -> BlockId {
        if !pos.in_world_height() {
            return BLOCK_AIR;
        }
        self.columns
            .get(&pos.chunk())
            .map_or(BLOCK_AIR, |column| {
                column.block_at(pos.local_x(), pos.y, pos.local_z())
            })
    }

    /// The single write entry point: updates the block, the liquid index,
    /// lighting, meshing dirt, the heightmap queue, and the liquid queue.
    pub fn set_block(&mut self, pos: WorldPos, id: BlockId) -> bool {
        if !pos.in_world_height() {
            return false;
        }
        let chunk = pos.chunk();
        let (x, z) = (pos.local_x(), pos.local_z());
        let old = match self.columns.get_mut(&chunk) {
            Some(column) => {
                let old = column.block_at(x, pos.y, z);
                if old == id || !column.set_block_at(x, pos.y, z, id) {
                    return false;
                }
                column.note_liquid_cell(x, pos.y, z, self.registry.is_liquid(id));
                old
            }
            None => return false,
        };

        // A no-longer-opaque cell breaks any fully-opaque claim.
        if let Some((sub_y, _)) = world_y_to_sub(pos.y) {
            if !self.registry.is_opaque(id) {
                if let Some(sub) = self.sub_mut(SubChunkPos::new(chunk, sub_y as u8)) {
                    sub.set_fully_opaque(false);
                }
            }
        }

        // Incremental lighting, immediately and across borders.
        on_block_changed(&mut self.columns, &self.registry, pos, old, id);

        // A background re-light computed from pre-edit blocks is stale now;
        // cancel it and queue a fresh pass.
        if self.relight_in_flight.remove(&chunk) {
            let stale: Vec<RequestId> = self
                .relight_jobs
                .iter()
                .filter(|(_, pending)| **pending == chunk)
                .map(|(&id, _)| id)
                .collect();
            for id in stale {
                self.relight_jobs.remove(&id);
                self.workers.cancel(id);
            }
            self.relight_queue.push_back(chunk);
        }

        self.mark_mesh_dirty_around(pos);
        self.heightmap_queue.push_back((
            chunk,
            x / crate::column::HEIGHT_SAMPLE,
            z / crate::column::HEIGHT_SAMPLE,
        ));
        self.liquid.enqueue_column(chunk);
        true
    }

    /// Dirty the containing sub-chunk plus the neighbors sharing an edited
    /// boundary face.
    fn mark_mesh_dirty_around(&mut self, pos: WorldPos) {
        let Some((sub_y, local_y)) = world_y_to_sub(pos.y) else {
            return;
        };
        let chunk = pos.chunk();
        let (x, z) = (pos.local_x(), pos.local_z());

        let mut touched: Vec<SubChunkPos> = vec![SubChunkPos::new(chunk, sub_y as u8)];
        if x == 0 {
            touched.push(SubChunkPos::new(chunk.offset(-1, 0), sub_y as u8));
        }
        if x == SX - 1 {
            touched.push(SubChunkPos::new(chunk.offset(1, 0), sub_y as u8));
        }
        if z == 0 {
            touched.push(SubChunkPos::new(chunk.offset(0, -1), sub_y as u8));
        }
        if z == SZ - 1 {
            touched.push(SubChunkPos::new(chunk.offset(0, 1), sub_y as u8));
        }
        if local_y == 0 && sub_y > 0 {
            touched.push(SubChunkPos::new(chunk, sub_y as u8 - 1));
        }
        if local_y == SUB_H - 1 && sub_y + 1 < SUB_COUNT {
            touched.push(SubChunkPos::new(chunk, sub_y as u8 + 1));
        }

        for pos in touched {
            if let Some(sub) = self.sub_mut(pos) {
                sub.mark_dirty(DirtyFlags::MESH | DirtyFlags::LIGHT);
            }
        }
    }

    /// Cast a ray against solid blocks.
    pub fn raycast(&self, origin: DVec3, direction: DVec3, max_distance: f64) -> Option<RaycastHit> {
        raycast(origin, direction, max_distance, |pos| {
            self.registry.is_solid(self.get_block(pos))
        })
    }

    /// Ask the liquid engine to revisit a column.
    pub fn queue_column_for_liquid(&mut self, chunk: ChunkPos) {
        self.liquid.enqueue_column(chunk);
    }

    // -----------------------------------------------------------------
    // Chunk lifecycle
    // -----------------------------------------------------------------

    /// Force a column onto the generation queue ahead of the spiral.
    pub fn load_chunk(&mut self, chunk: ChunkPos) {
        for sub_y in (0..SUB_COUNT).rev() {
            let pos = SubChunkPos::new(chunk, sub_y as u8);
            if self.needs_generation(pos) {
                self.gen_queue.push_front(pos);
            }
        }
    }

    /// Save and drop a column, cancelling its in-flight jobs.
    pub fn unload_chunk(&mut self, chunk: ChunkPos) {
        for sub_y in 0..SUB_COUNT {
            self.save_sub_chunk(SubChunkPos::new(chunk, sub_y as u8));
        }

        let gen_ids: Vec<RequestId> = self
            .gen_jobs
            .iter()
            .filter(|(_, pos)| pos.chunk == chunk)
            .map(|(&id, _)| id)
            .collect();
        for id in gen_ids {
            if let Some(pos) = self.gen_jobs.remove(&id) {
                self.gen_in_flight.remove(&pos);
            }
            self.workers.cancel(id);
        }
        let mesh_ids: Vec<RequestId> = self
            .mesh_jobs
            .iter()
            .filter(|(_, pos)| pos.chunk == chunk)
            .map(|(&id, _)| id)
            .collect();
        for id in mesh_ids {
            if let Some(pos) = self.mesh_jobs.remove(&id) {
                self.mesh_in_flight.remove(&pos);
            }
            self.workers.cancel(id);
        }
        let relight_ids: Vec<RequestId> = self
            .relight_jobs
            .iter()
            .filter(|(_, pending)| **pending == chunk)
            .map(|(&id, _)| id)
            .collect();
        for id in relight_ids {
            self.relight_jobs.remove(&id);
            self.workers.cancel(id);
        }
        self.relight_in_flight.remove(&chunk);
        self.terrain_top_cache.remove(&chunk);
        self.columns.remove(&chunk);
    }

    fn save_sub_chunk(&mut self, pos: SubChunkPos) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(column) = self.columns.get(&pos.chunk) else {
            return;
        };
        let Some(sub) = column.sub(pos.sub_y as usize) else {
            return;
        };
        if matches!(sub.state(), SubChunkState::Empty | SubChunkState::Generating) {
            return;
        }
        let bytes = encode_sub_chunk(sub.blocks(), Some(sub.light()));
        if let Err(err) = store.save_sub_chunk(pos, &bytes) {
            // Retried on the next snapshot.
            warn!(pos = %pos, error = %err, "sub-chunk save failed");
        }
    }

    /// Persist every loaded sub-chunk plus the world metadata.
    pub fn save_all(&mut self) {
        let positions: Vec<SubChunkPos> = self
            .columns
            .iter()
            .flat_map(|(&chunk, column)| {
                (0..SUB_COUNT)
                    .filter(move |&sub_y| column.sub(sub_y).is_some())
                    .map(move |sub_y| SubChunkPos::new(chunk, sub_y as u8))
            })
            .collect();
        for pos in positions {
            self.save_sub_chunk(pos);
        }
        if let Some(store) = self.store.as_mut() {
            let mut meta = match store.load_meta() {
                Ok(Some(meta)) => meta,
                _ => WorldMeta::new(self.generator.world_seed()),
            };
            meta.touch_saved();
            meta.player_position = Some([self.player_pos.x, self.player_pos.y, self.player_pos.z]);
            if let Err(err) = store.save_meta(&meta) {
                warn!(error = %err, "world metadata save failed");
            }
        }
    }
}

/// Offsets of the ring at Chebyshev radius `ring`, starting at the center.
fn ring_offsets(ring: i64) -> Vec<(i64, i64)> {
    if ring == 0 {
        return vec![(0, 0)];
    }
    let mut offsets = Vec::with_capacity((ring as usize) * 8);
    for dx in -ring..=ring {
        offsets.push((dx, -ring));
        offsets.push((dx, ring));
    }
    for dz in (-ring + 1)..ring {
        offsets.push((-ring, dz));
        offsets.push((ring, dz));
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_offsets_cover_the_square_shell() {
        assert_eq!(ring_offsets(0), vec![(0, 0)]);
        let ring1 = ring_offsets(1);
        assert_eq!(ring1.len(), 8);
        for &(dx, dz) in &ring1 {
            assert_eq!(dx.abs().max(dz.abs()), 1);
        }
        let ring3 = ring_offsets(3);
        assert_eq!(ring3.len(), 24);
    }

    #[test]
    fn player_chunk_handles_negative_positions() {
        let mut world = World::new(
            1,
            WorldConfig::default(),
            Arc::new(BlockRegistry::with_defaults()),
            None,
        );
        world.player_pos = DVec3::new(-0.5, 300.0, -33.0);
        assert_eq!(world.player_chunk(), ChunkPos::new(-1, -2));
    }

    #[test]
    fn set_block_requires_a_loaded_column() {
        let mut world = World::new(
            1,
            WorldConfig::default(),
            Arc::new(BlockRegistry::with_defaults()),
            None,
        );
        assert!(!world.set_block(WorldPos::new(0, 100, 0), slopworld_core::BLOCK_STONE));
        assert!(!world.set_block(WorldPos::new(0, -1, 0), slopworld_core::BLOCK_STONE));
        assert!(!world.set_block(
            WorldPos::new(0, COL_H as i64, 0),
            slopworld_core::BLOCK_STONE
        ));
    }
}
