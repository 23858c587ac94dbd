//! In-memory form of the meshlet container and its byte-exact serialization.
//!
//! Layout, all integers little-endian:
//! magic, `FormatHeader`, one `Header` per meshlet, one `Bound` per meshlet,
//! `stream_count` `Stream`s per meshlet (meshlet-major), the payload words and one zero pad word.

use serde::Serialize;

use crate::core::bit_coder::ByteWriter;
use crate::core::buffer::PayloadWord;

pub const MAGIC: [u8; 8] = *b"MESHLET3";

pub const MAX_STREAMS: usize = 8;
pub const NUM_CHUNKS: usize = 4;
pub const PRIMITIVES_PER_CHUNK: usize = 64;
pub const IBO_BITS: u32 = 5;
pub const VERTICES_PER_CHUNK: usize = 1 << IBO_BITS;
pub const MAX_ELEMENTS_PRIM: usize = PRIMITIVES_PER_CHUNK * NUM_CHUNKS;
pub const MAX_ELEMENTS_VERT: usize = VERTICES_PER_CHUNK * NUM_CHUNKS;

pub const FORMAT_HEADER_SIZE: usize = 16;
pub const HEADER_SIZE: usize = 8;
pub const BOUND_SIZE: usize = 32;
pub const STREAM_SIZE: usize = 48;

/// number of 32-bit words in a stream's base-value union.
pub const STREAM_BASE_WORDS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum StreamType {
    /// three 5-bit local indices per triangle, base fixed to zero.
    Primitive = 0,
    /// 3 x 16-bit signed, scaled by 2^aux.
    Position,
    /// octahedral normal in the first two 8-bit components, tangent in the last two.
    NormalTangentOct8,
    /// 2 x 16-bit signed, decoded as 0.5 * (v * 2^aux) + 0.5.
    UV,
    BoneIndices,
    BoneWeights,
}

impl StreamType {
    pub const ALL: [StreamType; 6] = [
        StreamType::Primitive,
        StreamType::Position,
        StreamType::NormalTangentOct8,
        StreamType::UV,
        StreamType::BoneIndices,
        StreamType::BoneWeights,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// components per element.
    pub fn components(self) -> usize {
        match self {
            StreamType::Primitive | StreamType::Position => 3,
            StreamType::UV => 2,
            StreamType::NormalTangentOct8 | StreamType::BoneIndices | StreamType::BoneWeights => 4,
        }
    }

    /// width of one component in bits, before bitplane packing.
    pub fn component_bits(self) -> u32 {
        match self {
            StreamType::Primitive => IBO_BITS,
            StreamType::Position | StreamType::UV => 16,
            StreamType::NormalTangentOct8 | StreamType::BoneIndices | StreamType::BoneWeights => 8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum MeshStyle {
    /// primitive and position streams.
    Wireframe = 0,
    /// wireframe plus normal/tangent and UV.
    Textured,
    /// textured plus bone streams. Not encodable.
    Skinned,
}

impl MeshStyle {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(MeshStyle::Wireframe),
            1 => Some(MeshStyle::Textured),
            2 => Some(MeshStyle::Skinned),
            _ => None,
        }
    }

    pub fn stream_count(self) -> usize {
        match self {
            MeshStyle::Wireframe => 2,
            MeshStyle::Textured => 4,
            MeshStyle::Skinned => 6,
        }
    }

    /// the streams of this style, in payload order.
    pub fn stream_types(self) -> &'static [StreamType] {
        &StreamType::ALL[..self.stream_count()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatHeader {
    pub style: MeshStyle,
    pub stream_count: u32,
    pub meshlet_count: u32,
    pub payload_size_words: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub base_vertex_offset: u32,
    pub num_chunks: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Bound {
    pub center: [f32; 3],
    pub radius: f32,
    /// cone axis in xyz, cutoff in w.
    pub cone_axis_cutoff: [f32; 4],
}

/// Running primitive and vertex counts before a chunk, within its meshlet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkOffsets {
    pub prim_offset: u16,
    pub attr_offset: u16,
}

/// The 24-byte head of a stream.
/// Attribute streams store per-chunk base values there, bit-packed at
/// `chunk * components * component_bits`. The primitive stream stores
/// `ChunkOffsets` instead, with entry `NUM_CHUNKS` holding the meshlet totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamBase {
    Values([u32; STREAM_BASE_WORDS]),
    Offsets([ChunkOffsets; STREAM_BASE_WORDS]),
}

impl StreamBase {
    pub fn to_words(&self) -> [u32; STREAM_BASE_WORDS] {
        match self {
            StreamBase::Values(words) => *words,
            StreamBase::Offsets(offsets) => {
                offsets.map(|o| o.prim_offset as u32 | (o.attr_offset as u32) << 16)
            }
        }
    }

    pub fn from_words(ty: StreamType, words: [u32; STREAM_BASE_WORDS]) -> Self {
        if ty == StreamType::Primitive {
            StreamBase::Offsets(words.map(|w| ChunkOffsets {
                prim_offset: w as u16,
                attr_offset: (w >> 16) as u16,
            }))
        } else {
            StreamBase::Values(words)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stream {
    pub base: StreamBase,
    /// one byte of bit width per chunk.
    pub bits_per_chunk: u32,
    /// exponent for position and UV, 2-bit sign classes per chunk for normal/tangent.
    pub aux: i32,
    pub offsets_in_words: [u32; NUM_CHUNKS],
}

impl Stream {
    pub fn new(ty: StreamType) -> Self {
        let base = if ty == StreamType::Primitive {
            StreamBase::Offsets([ChunkOffsets::default(); STREAM_BASE_WORDS])
        } else {
            StreamBase::Values([0; STREAM_BASE_WORDS])
        };
        Self {
            base,
            bits_per_chunk: 0,
            aux: 0,
            offsets_in_words: [0; NUM_CHUNKS],
        }
    }

    /// bit width of 'chunk'.
    #[inline]
    pub fn bits(&self, chunk: usize) -> u32 {
        (self.bits_per_chunk >> (8 * chunk)) & 0xFF
    }

    pub fn chunk_offsets(&self, chunk: usize) -> Option<ChunkOffsets> {
        match &self.base {
            StreamBase::Offsets(o) => o.get(chunk).copied(),
            StreamBase::Values(_) => None,
        }
    }

    fn write_to<W: ByteWriter>(&self, writer: &mut W) {
        for w in self.base.to_words() {
            writer.write_u32(w);
        }
        writer.write_u32(self.bits_per_chunk);
        writer.write_i32(self.aux);
        for w in self.offsets_in_words {
            writer.write_u32(w);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Meshlet {
    pub header: Header,
    pub bound: Bound,
    /// one entry per stream of the mesh style, indexed by `StreamType`.
    pub streams: Vec<Stream>,
}

/// A fully encoded mesh, ready to serialize.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedMesh {
    pub style: MeshStyle,
    pub meshlets: Vec<Meshlet>,
    pub payload: Vec<PayloadWord>,
}

impl EncodedMesh {
    pub fn stream_count(&self) -> usize {
        self.style.stream_count()
    }

    pub fn format_header(&self) -> FormatHeader {
        FormatHeader {
            style: self.style,
            stream_count: self.stream_count() as u32,
            meshlet_count: self.meshlets.len() as u32,
            payload_size_words: self.payload.len() as u32,
        }
    }

    /// exact size of the serialized container in bytes, including the pad word.
    pub fn required_size(&self) -> usize {
        let n = self.meshlets.len();
        MAGIC.len()
            + FORMAT_HEADER_SIZE
            + n * HEADER_SIZE
            + n * BOUND_SIZE
            + n * self.stream_count() * STREAM_SIZE
            + (self.payload.len() + 1) * std::mem::size_of::<PayloadWord>()
    }

    pub fn write_to<W: ByteWriter>(&self, writer: &mut W) {
        crate::encode::header::write_header(writer, &self.format_header());

        for m in &self.meshlets {
            writer.write_u32(m.header.base_vertex_offset);
            writer.write_u32(m.header.num_chunks);
        }

        for m in &self.meshlets {
            for c in m.bound.center {
                writer.write_f32(c);
            }
            writer.write_f32(m.bound.radius);
            for c in m.bound.cone_axis_cutoff {
                writer.write_f32(c);
            }
        }

        for m in &self.meshlets {
            for s in &m.streams {
                s.write_to(writer);
            }
        }

        for &w in &self.payload {
            writer.write_u32(w);
        }
        writer.write_u32(0);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.required_size());
        self.write_to(&mut out);
        out
    }
}
