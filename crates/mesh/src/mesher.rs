//! The face-exposure mesher.
//!
//! Enumerates every non-air cell whose faces are visible against their
//! neighbors and emits quads into two buffer sets: one for opaque geometry,
//! one for the transparent pass (water, glass, foliage). Vertices carry
//! position, normal, atlas UV, the adjacent cell's light, and the fixed
//! per-face shade factor.

use crate::atlas::{tile_for, uv_rect};
use blake3::Hasher;
use bytemuck::{Pod, Zeroable};
use slopworld_core::{
    water_level, BlockDef, BlockId, BlockRegistry, Face, RenderShape, BLOCK_AIR, SUB_H,
    SUB_VOLUME, SX, SZ,
};

/// Fixed face shading factors, applied to the vertex color after light.
pub const fn face_shade(face: Face) -> f32 {
    match face {
        Face::Up => 1.0,
        Face::Down => 0.5,
        Face::East | Face::West => 0.9,
        Face::South | Face::North => 0.8,
    }
}

/// Packed vertex layout produced by the mesher.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Position in sub-chunk-local coordinates.
    pub position: [f32; 3],
    /// Face normal (unit length).
    pub normal: [f32; 3],
    /// Texture-atlas coordinates.
    pub uv: [f32; 2],
    /// Light at the adjacent cell: max(sky, block), 0-15.
    pub light: u8,
    /// Face shade factor in fixed point (255 = 1.0).
    pub shade: u8,
    _padding: [u8; 2],
}

/// One index/vertex buffer pair.
#[derive(Debug, Clone, Default)]
pub struct GeometryBuffers {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl GeometryBuffers {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    fn push_quad(
        &mut self,
        corners: [[f32; 3]; 4],
        normal: [f32; 3],
        uv: [f32; 4],
        light: u8,
        shade: f32,
    ) {
        let base = self.vertices.len() as u32;
        let uv_corners = [
            [uv[0], uv[1]],
            [uv[0], uv[3]],
            [uv[2], uv[3]],
            [uv[2], uv[1]],
        ];
        for (corner, uv) in corners.iter().zip(uv_corners.iter()) {
            self.vertices.push(MeshVertex {
                position: *corner,
                normal,
                uv: *uv,
                light,
                shade: (shade * 255.0) as u8,
                _padding: [0; 2],
            });
        }
        for idx in [0u32, 1, 2, 0, 2, 3] {
            self.indices.push(base + idx);
        }
    }
}

/// Stable hash of the combined buffers for renderer-side caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshHash(pub [u8; 32]);

/// Output of meshing one sub-chunk: opaque and transparent passes are kept
/// as separate index/vertex buffers so the renderer draws them in order.
#[derive(Debug, Clone)]
pub struct MeshBuffers {
    pub opaque: GeometryBuffers,
    pub transparent: GeometryBuffers,
    pub hash: MeshHash,
}

impl MeshBuffers {
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}

/// Boundary slab of a neighboring sub-chunk: the single block/light layer
/// pressed against the shared face.
///
/// Indexing: ±X faces use `y * SZ + z`, ±Z faces use `y * SX + x`, and
/// ±Y faces use `z * SX + x`.
#[derive(Debug, Clone)]
pub struct BoundarySlab {
    pub blocks: Vec<BlockId>,
    pub light: Vec<u8>,
}

/// Everything the mesher needs, copied out of the world so the job can run
/// on a worker without holding any references.
pub struct MeshInput {
    pub blocks: Vec<BlockId>,
    pub light: Vec<u8>,
    pub fully_opaque: bool,
    /// Neighbor slabs in `Face::index()` order; None means the neighbor is
    /// not loaded and its cells read as air under full light.
    pub neighbors: [Option<BoundarySlab>; 6],
}

#[inline]
fn cell_index(x: usize, y: usize, z: usize) -> usize {
    y * SX * SZ + z * SX + x
}

/// Max of the two packed light nibbles.
#[inline]
fn resolve_light(packed: u8) -> u8 {
    (packed >> 4).max(packed & 0x0F)
}

struct NeighborSample {
    id: Option<BlockId>,
    light: u8,
}

impl MeshInput {
    fn neighbor_sample(&self, x: usize, y: usize, z: usize, face: Face) -> NeighborSample {
        let (dx, dy, dz) = face.offset();
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        let nz = z as i64 + dz;
        if (0..SX as i64).contains(&nx)
            && (0..SUB_H as i64).contains(&ny)
            && (0..SZ as i64).contains(&nz)
        {
            let idx = cell_index(nx as usize, ny as usize, nz as usize);
            return NeighborSample {
                id: Some(self.blocks[idx]),
                light: resolve_light(self.light[idx]),
            };
        }

        let slab_idx = match face {
            Face::East | Face::West => y * SZ + z,
            Face::South | Face::North => y * SX + x,
            Face::Up | Face::Down => z * SX + x,
        };
        match &self.neighbors[face.index()] {
            Some(slab) => NeighborSample {
                id: Some(slab.blocks[slab_idx]),
                light: resolve_light(slab.light[slab_idx]),
            },
            // Not loaded (or above the world top): air, fully lit.
            None => NeighborSample { id: None, light: 15 },
        }
    }
}

/// Whether a fully opaque sub-chunk still exposes at least one face.
fn has_exposed_face(input: &MeshInput, registry: &BlockRegistry) -> bool {
    for slab in &input.neighbors {
        match slab {
            // Missing neighbor reads as air, so the face is exposed. This
            // includes the world-top face of the highest sub-chunk.
            None => return true,
            Some(slab) => {
                if slab.blocks.iter().any(|&id| !registry.is_opaque(id)) {
                    return true;
                }
            }
        }
    }
    false
}

/// Corner tables per face, as offsets from the cell origin. `h` scales the
/// top edge for partial liquid cells.
fn face_corners(face: Face, x: f32, y: f32, z: f32, h: f32) -> [[f32; 3]; 4] {
    match face {
        Face::Up => [
            [x, y + h, z],
            [x, y + h, z + 1.0],
            [x + 1.0, y + h, z + 1.0],
            [x + 1.0, y + h, z],
        ],
        Face::Down => [
            [x, y, z],
            [x + 1.0, y, z],
            [x + 1.0, y, z + 1.0],
            [x, y, z + 1.0],
        ],
        Face::East => [
            [x + 1.0, y, z],
            [x + 1.0, y + h, z],
            [x + 1.0, y + h, z + 1.0],
            [x + 1.0, y, z + 1.0],
        ],
        Face::West => [
            [x, y, z],
            [x, y, z + 1.0],
            [x, y + h, z + 1.0],
            [x, y + h, z],
        ],
        Face::South => [
            [x, y, z + 1.0],
            [x + 1.0, y, z + 1.0],
            [x + 1.0, y + h, z + 1.0],
            [x, y + h, z + 1.0],
        ],
        Face::North => [
            [x, y, z],
            [x, y + h, z],
            [x + 1.0, y + h, z],
            [x + 1.0, y, z],
        ],
    }
}

const CROSS_NORMAL_A: [f32; 3] = [std::f32::consts::FRAC_1_SQRT_2, 0.0, -std::f32::consts::FRAC_1_SQRT_2];
const CROSS_NORMAL_B: [f32; 3] = [std::f32::consts::FRAC_1_SQRT_2, 0.0, std::f32::consts::FRAC_1_SQRT_2];

fn emit_cross(buffers: &mut GeometryBuffers, id: BlockId, x: f32, y: f32, z: f32, light: u8) {
    let uv = uv_rect(tile_for(id, Face::East));
    buffers.push_quad(
        [
            [x, y, z],
            [x + 1.0, y, z + 1.0],
            [x + 1.0, y + 1.0, z + 1.0],
            [x, y + 1.0, z],
        ],
        CROSS_NORMAL_A,
        uv,
        light,
        1.0,
    );
    buffers.push_quad(
        [
            [x + 1.0, y, z],
            [x, y, z + 1.0],
            [x, y + 1.0, z + 1.0],
            [x + 1.0, y + 1.0, z],
        ],
        CROSS_NORMAL_B,
        uv,
        light,
        1.0,
    );
}

/// Mesh one sub-chunk.
pub fn mesh_sub_chunk(input: &MeshInput, registry: &BlockRegistry) -> MeshBuffers {
    debug_assert_eq!(input.blocks.len(), SUB_VOLUME);
    debug_assert_eq!(input.light.len(), SUB_VOLUME);

    let mut opaque = GeometryBuffers::default();
    let mut transparent = GeometryBuffers::default();

    // A solid-rock sub-chunk with no exposed face produces no geometry.
    if input.fully_opaque && !has_exposed_face(input, registry) {
        return finish(opaque, transparent);
    }

    for y in 0..SUB_H {
        for z in 0..SZ {
            for x in 0..SX {
                let id = input.blocks[cell_index(x, y, z)];
                if id == BLOCK_AIR {
                    continue;
                }
                let def = registry.get(id);
                let (fx, fy, fz) = (x as f32, y as f32, z as f32);

                match def.shape {
                    RenderShape::CrossFoliage | RenderShape::CustomGeometry => {
                        let light = resolve_light(input.light[cell_index(x, y, z)]);
                        emit_cross(&mut transparent, id, fx, fy, fz, light);
                    }
                    RenderShape::Liquid => {
                        let height = water_level(id).unwrap_or(4) as f32 / 4.0;
                        emit_cube_faces(
                            input,
                            registry,
                            def,
                            &mut transparent,
                            (x, y, z),
                            height,
                        );
                    }
                    RenderShape::SolidOpaque | RenderShape::TransparentCube => {
                        let buffers = if def.is_opaque {
                            &mut opaque
                        } else {
                            &mut transparent
                        };
                        emit_cube_faces(input, registry, def, buffers, (x, y, z), 1.0);
                    }
                }
            }
        }
    }

    finish(opaque, transparent)
}

fn emit_cube_faces(
    input: &MeshInput,
    registry: &BlockRegistry,
    def: &BlockDef,
    buffers: &mut GeometryBuffers,
    (x, y, z): (usize, usize, usize),
    height: f32,
) {
    for face in Face::ALL {
        let sample = input.neighbor_sample(x, y, z, face);
        let neighbor_def = sample.id.map(|id| registry.get(id));
        if !def.should_render_face(neighbor_def) {
            continue;
        }
        let corners = face_corners(face, x as f32, y as f32, z as f32, height);
        buffers.push_quad(
            corners,
            face.normal(),
            uv_rect(tile_for(def.id, face)),
            sample.light,
            face_shade(face),
        );
    }
}

fn finish(opaque: GeometryBuffers, transparent: GeometryBuffers) -> MeshBuffers {
    let mut hasher = Hasher::new();
    for buffers in [&opaque, &transparent] {
        hasher.update(bytemuck::cast_slice(&buffers.vertices));
        hasher.update(bytemuck::cast_slice(&buffers.indices));
    }
    MeshBuffers {
        opaque,
        transparent,
        hash: MeshHash(*hasher.finalize().as_bytes()),
    }
}
