pub mod bitplane;
pub mod bounds;
pub mod cluster;
pub(crate) mod header;
pub mod meshlet;
pub mod preprocess;
pub mod quantize;

use std::path::Path;

use log::{debug, info};
use thiserror::Error;

use crate::core::format::{EncodedMesh, MeshStyle};
use crate::core::mesh::{AttributeFormat, Mesh, MeshAttribute, Topology};
use crate::core::shared::ConfigType;
use cluster::{ChunkCaps, Clusterer, MeshoptClusterer};
use meshlet::{AttributeStreams, EncodeStats};

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// weight of the normal cone in the clusterer's triangle scoring.
    pub cone_weight: f32,
    /// upper bound of the position scale; keeps small meshes from amplifying float noise.
    pub max_position_scale_log2: i32,
}

impl ConfigType for Config {
    fn default() -> Self {
        Self {
            cone_weight: 0.5,
            max_position_scale_log2: 12,
        }
    }
}

#[remain::sorted]
#[derive(Error, Debug)]
pub enum Err {
    #[error("Clustering failed: {0}")]
    ClusteringFailure(#[from] cluster::Err),

    #[error("{:?} is stored as {:?}, which is not supported.", .attribute, .format)]
    FormatUnsupported { attribute: MeshAttribute, format: AttributeFormat },

    #[error("Failed to write the container: {0}")]
    IOFailure(#[from] std::io::Error),

    #[error("Malformed mesh: {0}")]
    MalformedMesh(String),

    #[error("{:?} is required by the mesh style but absent.", .0)]
    MissingAttribute(MeshAttribute),

    #[error("Mesh style {:?} cannot be encoded.", .0)]
    UnsupportedStyle(MeshStyle),

    #[error("Topology {:?} is not supported; the mesh must be a triangle list.", .0)]
    UnsupportedTopology(Topology),
}

impl From<quantize::Err> for Err {
    fn from(err: quantize::Err) -> Self {
        match err {
            quantize::Err::FormatUnsupported { attribute, format } => Err::FormatUnsupported { attribute, format },
            quantize::Err::InvalidLayout(attribute) => {
                Err::MalformedMesh(format!("{:?} does not fit in the vertex layout", attribute))
            }
            quantize::Err::MissingAttribute(attribute) => Err::MissingAttribute(attribute),
        }
    }
}

impl From<preprocess::Err> for Err {
    fn from(err: preprocess::Err) -> Self {
        match err {
            preprocess::Err::UnsupportedTopology(topology) => Err::UnsupportedTopology(topology),
            e @ (preprocess::Err::BufferTooShort { .. } | preprocess::Err::IndexOutOfRange(..)) => {
                Err::MalformedMesh(e.to_string())
            }
        }
    }
}

/// Encodes 'mesh' into the meshlet container with the default clusterer.
pub fn encode(mesh: &Mesh, style: MeshStyle, cfg: &Config) -> Result<EncodedMesh, Err> {
    let clusterer = MeshoptClusterer { cone_weight: cfg.cone_weight };
    encode_with_clusterer(mesh, style, cfg, &clusterer).map(|(encoded, _)| encoded)
}

/// Encodes 'mesh' with the given clusterer and reports statistics.
pub fn encode_with_clusterer<C>(
    mesh: &Mesh,
    style: MeshStyle,
    cfg: &Config,
    clusterer: &C,
) -> Result<(EncodedMesh, EncodeStats), Err>
where
    C: Clusterer + ?Sized,
{
    if style == MeshStyle::Skinned {
        return Err(Err::UnsupportedStyle(style));
    }

    // clustering needs a triangle list, so never stripify here
    let mesh = preprocess::optimize_index_buffer(mesh, &preprocess::Config::default())?;

    let (uv, normal_tangent) = match style {
        MeshStyle::Textured => (
            Some(quantize::quantize_uvs(&mesh)?),
            Some(quantize::quantize_normal_tangents(&mesh)?),
        ),
        _ => (None, None),
    };
    let position = quantize::quantize_positions(&mesh, cfg.max_position_scale_log2)?;

    // cluster on the positions a decoder will reconstruct
    let decoded_positions: Vec<[f32; 3]> = position.values.iter()
        .map(|&p| quantize::decode_snorm_exp(p, position.exp))
        .collect();

    let indices = mesh.indices_u32();
    let chunks = clusterer.partition(&decoded_positions, &indices, ChunkCaps::FORMAT)?;
    cluster::validate_chunks(&chunks, &indices, mesh.vertex_count(), ChunkCaps::FORMAT)?;
    debug!("Clustered {} triangles into {} chunks.", indices.len() / 3, chunks.len());

    let streams = AttributeStreams { position, normal_tangent, uv };
    let mut stats = EncodeStats {
        position_exponent: streams.position.exp,
        uv_exponent: streams.uv.as_ref().map(|uv| uv.exp),
        source_index_count: mesh.count as usize,
        source_attribute_count: mesh.vertex_count(),
        uncompressed_bytes: mesh.uncompressed_size(style != MeshStyle::Wireframe),
        ..Default::default()
    };

    let vertices = bounds::position_adapter(&decoded_positions)
        .map_err(|e| Err::MalformedMesh(format!("{:?}", e)))?;
    let mut payload = Vec::new();
    let meshlets = meshlet::encode_meshlets(&chunks, &streams, style, &vertices, &mut payload, &mut stats);

    info!("Encoded meshlet mesh:");
    info!("  {} meshlets", stats.meshlet_count);
    info!("  {} payload bytes", stats.payload_bytes);
    info!("  {} total indices", stats.source_index_count);
    info!("  {} total attributes", stats.source_attribute_count);
    info!("  {} uncompressed bytes", stats.uncompressed_bytes);

    Ok((EncodedMesh { style, meshlets, payload }, stats))
}

/// Encodes 'mesh' and writes the container to 'path'.
/// Nothing is written unless encoding succeeds, and the file only appears complete.
pub fn export_mesh_to_meshlet<P: AsRef<Path>>(
    path: P,
    mesh: &Mesh,
    style: MeshStyle,
    cfg: &Config,
) -> Result<EncodeStats, Err> {
    let clusterer = MeshoptClusterer { cone_weight: cfg.cone_weight };
    let (encoded, stats) = encode_with_clusterer(mesh, style, cfg, &clusterer)?;

    let bytes = encoded.to_bytes();
    debug_assert_eq!(bytes.len(), encoded.required_size());
    crate::io::write_atomic(path, &bytes)?;
    Ok(stats)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::builder::MeshBuilder;

    fn triangle() -> Mesh {
        MeshBuilder::new()
            .set_positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .build()
            .unwrap()
    }

    #[test]
    fn skinned_is_rejected() {
        assert!(matches!(
            encode(&triangle(), MeshStyle::Skinned, &Config::default()),
            Err(Err::UnsupportedStyle(MeshStyle::Skinned))
        ));
    }

    #[test]
    fn strip_input_is_rejected() {
        let mut mesh = triangle();
        mesh.topology = Topology::TriangleStrip;
        assert!(matches!(
            encode(&mesh, MeshStyle::Wireframe, &Config::default()),
            Err(Err::UnsupportedTopology(Topology::TriangleStrip))
        ));
    }

    #[test]
    fn textured_needs_uvs_and_a_direction() {
        assert!(matches!(
            encode(&triangle(), MeshStyle::Textured, &Config::default()),
            Err(Err::MissingAttribute(MeshAttribute::UV))
        ));

        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .add_attribute(MeshAttribute::UV, vec![[0.0_f32, 0.0]; 3])
            .build()
            .unwrap();
        assert!(matches!(
            encode(&mesh, MeshStyle::Textured, &Config::default()),
            Err(Err::MissingAttribute(MeshAttribute::Normal))
        ));
    }

    struct NoChunks;

    impl Clusterer for NoChunks {
        fn partition(&self, _: &[[f32; 3]], _: &[u32], _: ChunkCaps) -> Result<Vec<cluster::Chunk>, cluster::Err> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn empty_clustering_of_a_non_empty_mesh_fails() {
        let r = encode_with_clusterer(&triangle(), MeshStyle::Wireframe, &Config::default(), &NoChunks);
        assert!(matches!(r, Err(Err::ClusteringFailure(cluster::Err::NoChunks))));
    }

    #[test]
    fn mesh_without_triangles_encodes_to_an_empty_container() {
        let mut mesh = triangle();
        mesh.indices = crate::core::mesh::IndexBuffer::U32(Vec::new());
        mesh.count = 0;
        let (encoded, stats) = encode_with_clusterer(
            &mesh, MeshStyle::Wireframe, &Config::default(), &NoChunks
        ).unwrap();
        assert!(encoded.meshlets.is_empty());
        assert!(encoded.payload.is_empty());
        assert_eq!(stats.meshlet_count, 0);
        assert_eq!(encoded.to_bytes().len(), 8 + 16 + 4);
    }

    #[test]
    fn truncated_attribute_buffer_is_malformed() {
        let mut mesh = MeshBuilder::new()
            .set_positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .add_attribute(MeshAttribute::Normal, vec![[0.0_f32, 0.0, 1.0]; 3])
            .add_attribute(MeshAttribute::UV, vec![[0.0_f32, 0.0], [1.0, 0.0], [0.0, 1.0]])
            .build()
            .unwrap();
        mesh.attributes.truncate(8);
        assert!(matches!(
            encode(&mesh, MeshStyle::Textured, &Config::default()),
            Err(Err::MalformedMesh(_))
        ));
    }
}
