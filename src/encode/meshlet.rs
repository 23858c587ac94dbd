use log::info;
use meshopt::VertexDataAdapter;
use serde::Serialize;

use crate::core::buffer::PayloadWord;
use crate::core::format::{
    ChunkOffsets,
    Header,
    Meshlet,
    MeshStyle,
    Stream,
    StreamBase,
    StreamType,
    MAX_ELEMENTS_PRIM,
    MAX_ELEMENTS_VERT,
    MAX_STREAMS,
    NUM_CHUNKS,
    STREAM_BASE_WORDS,
};
use super::bitplane::{encode_attribute_chunk, encode_normal_tangent_chunk, encode_primitive_chunk, widen_i16};
use super::bounds::compute_cluster_bounds;
use super::cluster::Chunk;
use super::quantize::{NormalTangent, Quantized};

/// Quantized per-vertex data of the attribute streams, indexed by mesh vertex.
pub struct AttributeStreams {
    pub position: Quantized<3>,
    pub normal_tangent: Option<Vec<NormalTangent>>,
    pub uv: Option<Quantized<2>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StreamBytes {
    pub stream: StreamType,
    pub bytes: usize,
}

/// Summary of one encode.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EncodeStats {
    pub meshlet_count: usize,
    pub chunk_count: usize,
    pub total_primitives: usize,
    pub total_vertices: usize,
    pub payload_bytes: usize,
    pub stream_bytes: Vec<StreamBytes>,
    /// primitives over the primitive capacity of all meshlets.
    pub ibo_fill_ratio: f64,
    /// vertices over the vertex capacity of all meshlets.
    pub vbo_fill_ratio: f64,
    pub position_exponent: i32,
    pub uv_exponent: Option<i32>,
    pub source_index_count: usize,
    pub source_attribute_count: usize,
    pub uncompressed_bytes: usize,
}

impl EncodeStats {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Groups consecutive chunks into meshlets of up to `NUM_CHUNKS` and appends their
/// streams to 'payload'. For every meshlet the primitive stream comes first, then the
/// attribute streams in `StreamType` order, each covering all chunks of the meshlet.
pub fn encode_meshlets(
    chunks: &[Chunk],
    streams: &AttributeStreams,
    style: MeshStyle,
    vertices: &VertexDataAdapter<'_>,
    payload: &mut Vec<PayloadWord>,
    stats: &mut EncodeStats,
) -> Vec<Meshlet> {
    let mut meshlets = Vec::with_capacity(chunks.len().div_ceil(NUM_CHUNKS));
    let mut stream_words = [0_usize; MAX_STREAMS];
    let mut base_vertex_offset = 0_u32;
    let mut total_primitives = 0;

    for group in chunks.chunks(NUM_CHUNKS) {
        let mut meshlet_streams = Vec::with_capacity(style.stream_count());

        let start = payload.len();
        let (prim_stream, num_primitives, num_vertices) = encode_primitive_stream(group, payload);
        stream_words[StreamType::Primitive as usize] += payload.len() - start;
        meshlet_streams.push(prim_stream);

        for &ty in &style.stream_types()[1..] {
            let start = payload.len();
            meshlet_streams.push(encode_stream(ty, group, streams, payload));
            stream_words[ty as usize] += payload.len() - start;
        }

        let triangles: Vec<[u32; 3]> = group.iter()
            .flat_map(|c| c.global_triangles())
            .collect();

        meshlets.push(Meshlet {
            header: Header {
                base_vertex_offset,
                num_chunks: group.len() as u32,
            },
            bound: compute_cluster_bounds(&triangles, vertices),
            streams: meshlet_streams,
        });

        base_vertex_offset += num_vertices;
        total_primitives += num_primitives as usize;
    }

    stats.meshlet_count = meshlets.len();
    stats.chunk_count = chunks.len();
    stats.total_primitives = total_primitives;
    stats.total_vertices = base_vertex_offset as usize;
    stats.payload_bytes = payload.len() * std::mem::size_of::<PayloadWord>();
    stats.stream_bytes = style.stream_types().iter()
        .map(|&ty| StreamBytes {
            stream: ty,
            bytes: stream_words[ty as usize] * std::mem::size_of::<PayloadWord>(),
        })
        .collect();
    if !meshlets.is_empty() {
        stats.ibo_fill_ratio = total_primitives as f64 / (meshlets.len() * MAX_ELEMENTS_PRIM) as f64;
        stats.vbo_fill_ratio = base_vertex_offset as f64 / (meshlets.len() * MAX_ELEMENTS_VERT) as f64;
    }

    for s in stats.stream_bytes.iter().filter(|s| s.bytes > 0) {
        info!("Stream {:?}: {} bytes.", s.stream, s.bytes);
    }
    info!("Total primitives: {}", stats.total_primitives);
    info!("Total vertices: {}", stats.total_vertices);
    info!("IBO fill ratio: {:.3} %", 100.0 * stats.ibo_fill_ratio);
    info!("VBO fill ratio: {:.3} %", 100.0 * stats.vbo_fill_ratio);

    meshlets
}

/// Returns the stream with running offsets, and the primitive and vertex totals of the meshlet.
fn encode_primitive_stream(group: &[Chunk], payload: &mut Vec<PayloadWord>) -> (Stream, u32, u32) {
    let mut stream = Stream::new(StreamType::Primitive);
    let mut offsets = [ChunkOffsets::default(); STREAM_BASE_WORDS];
    let mut num_primitives = 0_u32;
    let mut num_vertices = 0_u32;

    for (chunk_index, chunk) in group.iter().enumerate() {
        stream.offsets_in_words[chunk_index] = payload.len() as u32;
        offsets[chunk_index] = ChunkOffsets {
            prim_offset: num_primitives as u16,
            attr_offset: num_vertices as u16,
        };

        encode_primitive_chunk(payload, &chunk.local_indices);

        num_primitives += chunk.primitive_count() as u32;
        num_vertices += chunk.vertex_count() as u32;
    }

    // trailing entries, up to and including NUM_CHUNKS, hold the totals
    for o in offsets.iter_mut().take(NUM_CHUNKS + 1).skip(group.len()) {
        *o = ChunkOffsets {
            prim_offset: num_primitives as u16,
            attr_offset: num_vertices as u16,
        };
    }
    stream.base = StreamBase::Offsets(offsets);

    (stream, num_primitives, num_vertices)
}

fn encode_stream(ty: StreamType, group: &[Chunk], streams: &AttributeStreams, payload: &mut Vec<PayloadWord>) -> Stream {
    let mut stream = Stream::new(ty);
    stream.aux = match ty {
        StreamType::Position => streams.position.exp,
        StreamType::UV => streams.uv.as_ref().map_or(0, |uv| uv.exp),
        _ => 0,
    };

    for (chunk_index, chunk) in group.iter().enumerate() {
        stream.offsets_in_words[chunk_index] = payload.len() as u32;
        let remap = &chunk.vertex_remap;

        match ty {
            StreamType::Position => {
                let values: Vec<[u32; 3]> = remap.iter()
                    .map(|&v| widen_i16(streams.position.values[v as usize]))
                    .collect();
                encode_attribute_chunk(payload, &mut stream, &values, 16, chunk_index);
            }
            StreamType::UV => {
                if let Some(uv) = &streams.uv {
                    let values: Vec<[u32; 2]> = remap.iter()
                        .map(|&v| widen_i16(uv.values[v as usize]))
                        .collect();
                    encode_attribute_chunk(payload, &mut stream, &values, 16, chunk_index);
                }
            }
            StreamType::NormalTangentOct8 => {
                if let Some(nt) = &streams.normal_tangent {
                    let values: Vec<NormalTangent> = remap.iter()
                        .map(|&v| nt[v as usize])
                        .collect();
                    encode_normal_tangent_chunk(payload, &mut stream, &values, chunk_index);
                }
            }
            StreamType::Primitive | StreamType::BoneIndices | StreamType::BoneWeights => {}
        }
    }

    stream
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::Bound;
    use crate::encode::bounds::position_adapter;

    fn chunk(tris: usize, verts: u32, first_vertex: u32) -> Chunk {
        Chunk {
            local_indices: (0..tris).map(|t| [0, (t % 2 + 1) as u8, 2]).collect(),
            vertex_remap: (first_vertex..first_vertex + verts).collect(),
            bound: Bound::default(),
        }
    }

    fn streams(num_vertices: usize) -> AttributeStreams {
        AttributeStreams {
            position: Quantized {
                values: (0..num_vertices).map(|i| [i as i16, 0, -(i as i16)]).collect(),
                exp: -3,
            },
            normal_tangent: None,
            uv: None,
        }
    }

    #[test]
    fn groups_chunks_and_tracks_offsets() {
        let chunks: Vec<Chunk> = (0..6).map(|c| chunk(2, 3, 3 * c)).collect();
        let positions = vec![[0.0, 0.0, 0.0]; 18];
        let vertices = position_adapter(&positions).unwrap();
        let mut payload = Vec::new();
        let mut stats = EncodeStats::default();
        let meshlets = encode_meshlets(&chunks, &streams(18), MeshStyle::Wireframe, &vertices, &mut payload, &mut stats);

        assert_eq!(meshlets.len(), 2);
        assert_eq!(meshlets[0].header, Header { base_vertex_offset: 0, num_chunks: 4 });
        assert_eq!(meshlets[1].header, Header { base_vertex_offset: 12, num_chunks: 2 });
        assert_eq!(meshlets[0].streams.len(), 2);

        let prim = &meshlets[1].streams[0];
        assert_eq!(prim.chunk_offsets(1), Some(ChunkOffsets { prim_offset: 2, attr_offset: 3 }));
        assert_eq!(prim.chunk_offsets(2), Some(ChunkOffsets { prim_offset: 4, attr_offset: 6 }));
        assert_eq!(prim.chunk_offsets(4), Some(ChunkOffsets { prim_offset: 4, attr_offset: 6 }));
        assert_eq!(prim.chunk_offsets(5), Some(ChunkOffsets::default()));
        assert_eq!(prim.bits_per_chunk, 0);
        assert_eq!(prim.aux, 0);

        let pos = &meshlets[0].streams[1];
        assert_eq!(pos.aux, -3);

        assert_eq!(stats.meshlet_count, 2);
        assert_eq!(stats.chunk_count, 6);
        assert_eq!(stats.total_primitives, 12);
        assert_eq!(stats.total_vertices, 18);
        assert_eq!(stats.ibo_fill_ratio, 12.0 / 512.0);
        assert_eq!(stats.payload_bytes, payload.len() * 4);
    }

    #[test]
    fn payload_order_is_primitive_then_attributes_per_meshlet() {
        let chunks: Vec<Chunk> = (0..5).map(|c| chunk(3, 3, 3 * c)).collect();
        let positions = vec![[0.0, 0.0, 0.0]; 15];
        let vertices = position_adapter(&positions).unwrap();
        let mut payload = Vec::new();
        let meshlets = encode_meshlets(&chunks, &streams(15), MeshStyle::Wireframe, &vertices, &mut payload, &mut EncodeStats::default());

        let mut last = 0;
        for m in &meshlets {
            for s in &m.streams {
                for c in 0..m.header.num_chunks as usize {
                    assert!(s.offsets_in_words[c] >= last);
                    last = s.offsets_in_words[c];
                }
            }
        }
        // 3 triangles take 45 bits
        assert_eq!(meshlets[0].streams[0].offsets_in_words, [0, 2, 4, 6]);
        assert_eq!(meshlets[0].streams[1].offsets_in_words[0], 8);
    }

    #[test]
    fn no_chunks_no_meshlets() {
        let mut payload = Vec::new();
        let mut stats = EncodeStats::default();
        let positions = [[0.0, 0.0, 0.0]];
        let vertices = position_adapter(&positions).unwrap();
        let meshlets = encode_meshlets(&[], &streams(0), MeshStyle::Textured, &vertices, &mut payload, &mut stats);
        assert!(meshlets.is_empty());
        assert!(payload.is_empty());
        assert_eq!(stats.ibo_fill_ratio, 0.0);
        assert!(stats.to_json().unwrap().contains("\"meshlet_count\": 0"));
    }
}
