use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use crate::core::mesh::{IndexBuffer, Mesh, Topology};
use crate::core::shared::ConfigType;

const RESTART_INDEX: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// try converting the optimized list into a strip, keeping it only if it is shorter.
    pub stripify: bool,
}

impl ConfigType for Config {
    fn default() -> Self {
        Self { stripify: false }
    }
}

#[remain::sorted]
#[derive(Error, Debug)]
pub enum Err {
    #[error("The attribute buffer holds {} bytes, but {} vertices of stride {} need {}.", .len, .vertices, .stride, .vertices * .stride)]
    BufferTooShort { len: usize, vertices: usize, stride: usize },

    #[error("Index {0} is out of range for a mesh with {1} vertices.")]
    IndexOutOfRange(u32, usize),

    #[error("Topology {:?} cannot be optimized; only triangle lists are supported.", .0)]
    UnsupportedTopology(Topology),
}

/// For every source vertex, the unique vertex it maps to,
/// and for every unique vertex, the source vertex it came from.
struct IndexRemap {
    index_remap: Vec<u32>,
    unique_to_source: Vec<u32>,
}

fn build_index_remap(mesh: &Mesh) -> IndexRemap {
    let num_vertices = mesh.vertex_count();
    let mut seen: HashMap<(&[u8], &[u8]), u32> = HashMap::with_capacity(num_vertices);
    let mut index_remap = Vec::with_capacity(num_vertices);
    let mut unique_to_source = Vec::new();

    for i in 0..num_vertices {
        let key = (mesh.position_bytes(i), mesh.attribute_bytes(i));
        let next = unique_to_source.len() as u32;
        let id = *seen.entry(key).or_insert_with(|| {
            unique_to_source.push(i as u32);
            next
        });
        index_remap.push(id);
    }

    IndexRemap { index_remap, unique_to_source }
}

/// the first `count` indices of the mesh, rewritten through 'remap'.
fn build_canonical_index_buffer(mesh: &Mesh, remap: &[u32]) -> Result<Vec<u32>, Err> {
    let mut out = mesh.indices_u32();
    out.truncate(mesh.count as usize);
    for idx in out.iter_mut() {
        *idx = *remap.get(*idx as usize)
            .ok_or(Err::IndexOutOfRange(*idx, remap.len()))?;
    }
    Ok(out)
}

/// copies source vertex `order[i]` into slot 'i' of both vertex buffers.
fn gather_vertices(mesh: &Mesh, order: &[u32]) -> (Vec<u8>, Vec<u8>) {
    let mut positions = Vec::with_capacity(order.len() * mesh.position_stride);
    let mut attributes = Vec::with_capacity(order.len() * mesh.attribute_stride);
    for &src in order {
        positions.extend_from_slice(mesh.position_bytes(src as usize));
        attributes.extend_from_slice(mesh.attribute_bytes(src as usize));
    }
    (positions, attributes)
}

/// copies vertex 'i' into slot `remap[i]` of both vertex buffers.
fn scatter_vertices(mesh: &Mesh, remap: &[u32]) -> (Vec<u8>, Vec<u8>) {
    let mut positions = vec![0; mesh.positions.len()];
    let mut attributes = vec![0; mesh.attributes.len()];
    let (ps, as_) = (mesh.position_stride, mesh.attribute_stride);
    for (src, &dst) in remap.iter().enumerate() {
        let dst = dst as usize;
        positions[dst * ps..(dst + 1) * ps].copy_from_slice(mesh.position_bytes(src));
        if as_ > 0 {
            attributes[dst * as_..(dst + 1) * as_].copy_from_slice(mesh.attribute_bytes(src));
        }
    }
    (positions, attributes)
}

/// the attribute buffer must cover every vertex the position buffer defines.
fn check_buffers(mesh: &Mesh) -> Result<(), Err> {
    let vertices = mesh.vertex_count();
    let stride = mesh.attribute_stride;
    if mesh.attributes.len() < vertices * stride {
        return Err(Err::BufferTooShort { len: mesh.attributes.len(), vertices, stride });
    }
    Ok(())
}

/// Merges byte-identical vertices (position and attribute bytes) and rewrites the
/// index buffer as a 32-bit canonical list. Unique vertices keep their first-occurrence order.
pub fn deduplicate_vertices(mesh: &mut Mesh) -> Result<(), Err> {
    check_buffers(mesh)?;
    let remap = build_index_remap(mesh);
    let indices = build_canonical_index_buffer(mesh, &remap.index_remap)?;
    let (positions, attributes) = gather_vertices(mesh, &remap.unique_to_source);

    debug!(
        "Deduplicated {} vertices into {}.",
        remap.index_remap.len(),
        remap.unique_to_source.len()
    );

    mesh.positions = positions;
    mesh.attributes = attributes;
    mesh.count = indices.len() as u32;
    mesh.indices = IndexBuffer::U32(indices);
    Ok(())
}

/// Returns an optimized copy of a triangle-list mesh: deduplicated, with triangles
/// ordered for the post-transform vertex cache, vertices ordered by first fetch,
/// and the narrowest index type that fits.
pub fn optimize_index_buffer(mesh: &Mesh, cfg: &Config) -> Result<Mesh, Err> {
    if mesh.topology != Topology::TriangleList {
        return Err(Err::UnsupportedTopology(mesh.topology));
    }

    let mut optimized = mesh.clone();
    deduplicate_vertices(&mut optimized)?;
    let mut index_buffer = optimized.indices_u32();

    if index_buffer.len() % 3 != 0 {
        warn!("Index count {} is not a multiple of 3; dropping the trailing indices.", index_buffer.len());
        index_buffer.truncate(index_buffer.len() / 3 * 3);
    }

    // the fetch remap only covers referenced vertices
    drop_unreferenced_vertices(&mut optimized, &mut index_buffer);
    let vertex_count = optimized.vertex_count();

    if !index_buffer.is_empty() {
        index_buffer = meshopt::optimize_vertex_cache(&index_buffer, vertex_count);

        let remap = meshopt::optimize_vertex_fetch_remap(&index_buffer, vertex_count);
        if remap.len() == vertex_count && remap.iter().all(|&r| (r as usize) < vertex_count) {
            for idx in index_buffer.iter_mut() {
                *idx = remap[*idx as usize];
            }
            let (positions, attributes) = scatter_vertices(&optimized, &remap);
            optimized.positions = positions;
            optimized.attributes = attributes;
        } else {
            warn!("Vertex fetch remap is not a permutation; keeping the vertex order.");
        }
    }

    optimized.topology = Topology::TriangleList;
    optimized.primitive_restart = false;

    if cfg.stripify && !index_buffer.is_empty() {
        match meshopt::stripify(&index_buffer, vertex_count, RESTART_INDEX) {
            Ok(strip) if strip.len() < index_buffer.len() => {
                debug!("Stripified {} indices into {}.", index_buffer.len(), strip.len());
                index_buffer = strip;
                optimized.topology = Topology::TriangleStrip;
                optimized.primitive_restart = true;
            }
            Ok(_) => {}
            Err(e) => warn!("Strip conversion failed, keeping the triangle list: {:?}", e),
        }
    }

    optimized.count = index_buffer.len() as u32;
    optimized.indices = narrow_indices(index_buffer);
    Ok(optimized)
}

/// removes vertices no index refers to, keeping the relative order of the rest.
fn drop_unreferenced_vertices(mesh: &mut Mesh, indices: &mut [u32]) {
    let num_vertices = mesh.vertex_count();
    let mut referenced = vec![false; num_vertices];
    for &i in indices.iter() {
        referenced[i as usize] = true;
    }
    if referenced.iter().all(|&r| r) {
        return;
    }

    let mut remap = vec![u32::MAX; num_vertices];
    let mut kept = Vec::new();
    for (v, _) in referenced.iter().enumerate().filter(|&(_, &r)| r) {
        remap[v] = kept.len() as u32;
        kept.push(v as u32);
    }
    debug!("Dropping {} unreferenced vertices.", num_vertices - kept.len());

    for i in indices.iter_mut() {
        *i = remap[*i as usize];
    }
    let (positions, attributes) = gather_vertices(mesh, &kept);
    mesh.positions = positions;
    mesh.attributes = attributes;
}

/// stores 16-bit indices when every real index fits below the restart marker.
fn narrow_indices(indices: Vec<u32>) -> IndexBuffer {
    let has_restart = indices.contains(&RESTART_INDEX);
    let max_index = indices.iter()
        .copied()
        .filter(|&i| i != RESTART_INDEX)
        .max()
        .unwrap_or(0);

    let fits = if has_restart { max_index < 0xFFFF } else { max_index <= 0xFFFF };
    if fits {
        IndexBuffer::U16(
            indices.into_iter()
                .map(|i| if i == RESTART_INDEX { 0xFFFF } else { i as u16 })
                .collect()
        )
    } else {
        IndexBuffer::U32(indices)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::builder::MeshBuilder;
    use crate::core::mesh::MeshAttribute;

    fn quad_with_duplicates() -> Mesh {
        // two triangles, the shared edge vertices repeated
        MeshBuilder::new()
            .set_positions(vec![
                [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
            ])
            .add_attribute(MeshAttribute::UV, vec![
                [0.0_f32, 0.0], [1.0, 0.0], [1.0, 1.0],
                [0.0, 0.0], [1.0, 1.0], [0.0, 1.0],
            ])
            .build()
            .unwrap()
    }

    fn triangles_by_position(mesh: &Mesh) -> Vec<[[u32; 3]; 3]> {
        let idx = mesh.indices_u32();
        let mut tris: Vec<_> = idx.chunks_exact(3)
            .map(|t| {
                let p = |i: u32| mesh.read_f32s::<3>(MeshAttribute::Position, i as usize).map(f32::to_bits);
                let mut tri = [p(t[0]), p(t[1]), p(t[2])];
                // canonical rotation keeps the winding
                let min = (0..3).min_by_key(|&k| tri[k]).unwrap_or(0);
                tri.rotate_left(min);
                tri
            })
            .collect();
        tris.sort();
        tris
    }

    #[test]
    fn dedup_merges_identical_vertices() {
        let mut mesh = quad_with_duplicates();
        deduplicate_vertices(&mut mesh).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, IndexBuffer::U32(vec![0, 1, 2, 0, 2, 3]));
        assert_eq!(mesh.count, 6);
        assert_eq!(mesh.read_f32s::<3>(MeshAttribute::Position, 3), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn dedup_keeps_vertices_that_differ_in_attributes() {
        let mut mesh = MeshBuilder::new()
            .set_positions(vec![[0.0; 3]; 3])
            .add_attribute(MeshAttribute::UV, vec![[0.0_f32, 0.0], [0.5, 0.0], [0.0, 0.0]])
            .build()
            .unwrap();
        deduplicate_vertices(&mut mesh).unwrap();
        assert_eq!(mesh.vertex_count(), 2);
        assert_eq!(mesh.indices, IndexBuffer::U32(vec![0, 1, 0]));
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut once = quad_with_duplicates();
        deduplicate_vertices(&mut once).unwrap();
        let mut twice = once.clone();
        deduplicate_vertices(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_non_list_topology() {
        let mut mesh = quad_with_duplicates();
        mesh.topology = Topology::TriangleStrip;
        assert!(matches!(
            optimize_index_buffer(&mesh, &Config::default()),
            Err(Err::UnsupportedTopology(Topology::TriangleStrip))
        ));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut mesh = quad_with_duplicates();
        mesh.indices = IndexBuffer::U32(vec![0, 1, 9]);
        mesh.count = 3;
        assert!(matches!(deduplicate_vertices(&mut mesh), Err(Err::IndexOutOfRange(9, 6))));
    }

    #[test]
    fn optimize_preserves_triangles() {
        let mesh = quad_with_duplicates();
        let optimized = optimize_index_buffer(&mesh, &Config::default()).unwrap();
        assert_eq!(optimized.vertex_count(), 4);
        assert_eq!(optimized.indices.index_type(), Some(crate::core::mesh::IndexType::U16));
        assert_eq!(optimized.topology, Topology::TriangleList);
        assert_eq!(triangles_by_position(&optimized), triangles_by_position(&mesh));
    }

    #[test]
    fn optimize_drops_unreferenced_vertices() {
        let mesh = MeshBuilder::new()
            .set_positions(vec![[9.0; 3], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .set_triangles(&[[1, 2, 3]])
            .build()
            .unwrap();
        let optimized = optimize_index_buffer(&mesh, &Config::default()).unwrap();
        assert_eq!(optimized.vertex_count(), 3);
        assert_eq!(triangles_by_position(&optimized), triangles_by_position(&mesh));
    }

    #[test]
    fn strip_kept_only_when_shorter() {
        let single = MeshBuilder::new()
            .set_positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .build()
            .unwrap();
        let cfg = Config { stripify: true };
        let out = optimize_index_buffer(&single, &cfg).unwrap();
        assert_eq!(out.topology, Topology::TriangleList);
        assert_eq!(out.count, 3);

        let out = optimize_index_buffer(&quad_with_duplicates(), &cfg).unwrap();
        assert_eq!(out.topology, Topology::TriangleStrip);
        assert!(out.primitive_restart);
        assert!(out.count < 6);
    }

    #[test]
    fn index_width_selection() {
        assert_eq!(narrow_indices(vec![0, 0xFFFF]).index_type(), Some(crate::core::mesh::IndexType::U16));
        assert_eq!(narrow_indices(vec![0, 0x10000]).index_type(), Some(crate::core::mesh::IndexType::U32));
        assert_eq!(
            narrow_indices(vec![0, 1, 2, RESTART_INDEX, 3]),
            IndexBuffer::U16(vec![0, 1, 2, 0xFFFF, 3])
        );
        assert_eq!(
            narrow_indices(vec![0xFFFF, RESTART_INDEX]).index_type(),
            Some(crate::core::mesh::IndexType::U32)
        );
    }

    #[test]
    fn short_attribute_buffer_is_rejected() {
        let mut mesh = quad_with_duplicates();
        mesh.attributes.truncate(8);
        assert!(matches!(
            deduplicate_vertices(&mut mesh.clone()),
            Err(Err::BufferTooShort { len: 8, vertices: 6, stride: 8 })
        ));
        assert!(matches!(
            optimize_index_buffer(&mesh, &Config::default()),
            Err(Err::BufferTooShort { .. })
        ));
    }
}
