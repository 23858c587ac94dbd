use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::core::format::{Bound, PRIMITIVES_PER_CHUNK, VERTICES_PER_CHUNK};
use crate::core::shared::Vec3;
use super::bounds::{compute_cluster_bounds, position_adapter};

/// Per-chunk capacity limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkCaps {
    pub max_vertices: usize,
    pub max_primitives: usize,
}

impl ChunkCaps {
    /// the limits the container format is built around.
    pub const FORMAT: ChunkCaps = ChunkCaps {
        max_vertices: VERTICES_PER_CHUNK,
        max_primitives: PRIMITIVES_PER_CHUNK,
    };
}

/// The smallest clustering unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// triangles as indices into `vertex_remap`.
    pub local_indices: Vec<[u8; 3]>,
    /// mesh-global vertex index of every local vertex.
    pub vertex_remap: Vec<u32>,
    pub bound: Bound,
}

impl Chunk {
    pub fn primitive_count(&self) -> usize {
        self.local_indices.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_remap.len()
    }

    /// the chunk's triangles in mesh-global indices.
    pub fn global_triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.local_indices.iter()
            .map(move |tri| tri.map(|i| self.vertex_remap[i as usize]))
    }
}

/// Partitions a triangle list into chunks.
///
/// Implementations must put every triangle into exactly one chunk, respect both caps,
/// and keep every chunk's vertex remap injective. `validate_chunks` checks these.
pub trait Clusterer {
    fn partition(&self, positions: &[Vec3], indices: &[u32], caps: ChunkCaps) -> Result<Vec<Chunk>, Err>;
}

/// Clusters with meshoptimizer's greedy meshlet builder.
#[derive(Clone, Copy, Debug)]
pub struct MeshoptClusterer {
    pub cone_weight: f32,
}

impl Clusterer for MeshoptClusterer {
    fn partition(&self, positions: &[Vec3], indices: &[u32], caps: ChunkCaps) -> Result<Vec<Chunk>, Err> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let vertices = position_adapter(positions)
            .map_err(|e| Err::Backend(format!("{:?}", e)))?;

        let meshlets = meshopt::build_meshlets(
            indices,
            &vertices,
            caps.max_vertices,
            caps.max_primitives,
            self.cone_weight,
        );

        let chunks = meshlets.iter()
            .map(|m| {
                let local_indices: Vec<[u8; 3]> = m.triangles
                    .chunks_exact(3)
                    .map(|t| [t[0], t[1], t[2]])
                    .collect();
                let vertex_remap = m.vertices.to_vec();
                let global: Vec<[u32; 3]> = local_indices.iter()
                    .map(|t| t.map(|i| vertex_remap[i as usize]))
                    .collect();
                Chunk {
                    bound: compute_cluster_bounds(&global, &vertices),
                    local_indices,
                    vertex_remap,
                }
            })
            .collect::<Vec<_>>();

        debug!("Built {} chunks from {} triangles.", chunks.len(), indices.len() / 3);
        Ok(chunks)
    }
}

/// canonical rotation of a triangle, preserving its winding.
fn canonical(tri: [u32; 3]) -> [u32; 3] {
    let mut t = tri;
    let min = (0..3).min_by_key(|&k| tri[k]).unwrap_or(0);
    t.rotate_left(min);
    t
}

fn is_degenerate(t: [u32; 3]) -> bool {
    t[0] == t[1] || t[1] == t[2] || t[0] == t[2]
}

/// Checks the clustering contract against the triangle list it was built from.
/// Degenerate triangles are left out of the coverage comparison, since a clusterer may drop them.
pub fn validate_chunks(chunks: &[Chunk], indices: &[u32], vertex_count: usize, caps: ChunkCaps) -> Result<(), Err> {
    if chunks.is_empty() && !indices.is_empty() {
        return Err(Err::NoChunks);
    }

    let mut coverage: HashMap<[u32; 3], i64> = HashMap::new();
    for t in indices.chunks_exact(3) {
        let t = [t[0], t[1], t[2]];
        if !is_degenerate(t) {
            *coverage.entry(canonical(t)).or_default() += 1;
        }
    }

    for (c, chunk) in chunks.iter().enumerate() {
        if chunk.vertex_count() > caps.max_vertices || chunk.primitive_count() > caps.max_primitives {
            return Err(Err::CapExceeded {
                chunk: c,
                vertices: chunk.vertex_count(),
                primitives: chunk.primitive_count(),
            });
        }

        if let Some(&index) = chunk.local_indices.iter()
            .flatten()
            .find(|&&i| i as usize >= chunk.vertex_count())
        {
            return Err(Err::LocalIndexOutOfRange { chunk: c, index });
        }

        let mut seen = HashMap::with_capacity(chunk.vertex_count());
        for &v in &chunk.vertex_remap {
            if v as usize >= vertex_count {
                return Err(Err::RemapOutOfRange { chunk: c, index: v });
            }
            if seen.insert(v, ()).is_some() {
                return Err(Err::RemapNotInjective { chunk: c, index: v });
            }
        }

        for t in chunk.global_triangles().filter(|&t| !is_degenerate(t)) {
            *coverage.entry(canonical(t)).or_default() -= 1;
        }
    }

    if coverage.values().any(|&n| n != 0) {
        return Err(Err::CoverageMismatch);
    }
    Ok(())
}


#[remain::sorted]
#[derive(Error, Debug)]
pub enum Err {
    #[error("Clustering backend failed: {0}")]
    Backend(String),

    #[error("Chunk {chunk} exceeds the caps with {vertices} vertices and {primitives} primitives.")]
    CapExceeded { chunk: usize, vertices: usize, primitives: usize },

    #[error("The chunks do not cover every triangle exactly once.")]
    CoverageMismatch,

    #[error("Chunk {chunk} has local index {index} beyond its vertex count.")]
    LocalIndexOutOfRange { chunk: usize, index: u8 },

    #[error("No chunks were produced for a non-empty mesh.")]
    NoChunks,

    #[error("Chunk {chunk} maps two local vertices to vertex {index}.")]
    RemapNotInjective { chunk: usize, index: u32 },

    #[error("Chunk {chunk} refers to vertex {index}, which does not exist.")]
    RemapOutOfRange { chunk: usize, index: u32 },
}
