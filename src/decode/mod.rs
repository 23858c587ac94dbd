//! Reads a meshlet container back into per-vertex attributes and triangles.
//! Mirrors what a runtime decoder does with the streams, so it is the
//! reference for round-trip checks.

use thiserror::Error;

use crate::core::bit_coder::{ByteReader, ReaderErr};
use crate::core::buffer::{BitReader, PayloadWord, WORD_BITS};
use crate::core::format::{
    Bound,
    ChunkOffsets,
    FormatHeader,
    Header,
    MeshStyle,
    Stream,
    StreamBase,
    StreamType,
    IBO_BITS,
    MAGIC,
    NUM_CHUNKS,
    STREAM_BASE_WORDS,
};
use crate::core::shared::{ldexp, low_mask, sign_extend, Vec3};
use crate::encode::bitplane::SignClass;
use crate::encode::quantize::octahedral::decode_oct8;

#[remain::sorted]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Err {
    #[error("The data does not start with the meshlet magic tag.")]
    InvalidMagic,

    #[error("Stream {:?} of meshlet {} has an invalid offset or bit width at chunk {}.", .stream, .meshlet, .chunk)]
    OutOfRange { meshlet: usize, stream: StreamType, chunk: usize },

    #[error("Style expects {} streams, but the header says {}.", .expected, .found)]
    StreamCountMismatch { expected: usize, found: u32 },

    #[error("The container is truncated.")]
    Truncated,

    #[error("Unknown mesh style {}.", .0)]
    UnknownStyle(u32),
}

impl From<ReaderErr> for Err {
    fn from(_: ReaderErr) -> Self {
        Err::Truncated
    }
}

/// Decoded normal and tangent of one vertex. The tangent's w is the handedness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalTangentValue {
    pub normal: Vec3,
    pub tangent: [f32; 4],
}

/// All vertices and triangles of one meshlet. Triangle indices are local to the meshlet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedMeshlet {
    pub positions: Vec<Vec3>,
    pub normal_tangents: Option<Vec<NormalTangentValue>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub triangles: Vec<[u32; 3]>,
}

/// A parsed container. Borrows nothing; the payload is copied out once.
#[derive(Clone, Debug)]
pub struct MeshView {
    header: FormatHeader,
    headers: Vec<Header>,
    bounds: Vec<Bound>,
    streams: Vec<Stream>,
    payload: Vec<PayloadWord>,
}

impl MeshView {
    pub fn parse(bytes: &[u8]) -> Result<Self, Err> {
        if bytes.len() < MAGIC.len() {
            return Err(Err::Truncated);
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(Err::InvalidMagic);
        }
        let mut reader = bytes[MAGIC.len()..].iter();

        let style_raw = reader.read_u32()?;
        let style = MeshStyle::from_u32(style_raw).ok_or(Err::UnknownStyle(style_raw))?;
        let stream_count = reader.read_u32()?;
        if stream_count as usize != style.stream_count() {
            return Err(Err::StreamCountMismatch { expected: style.stream_count(), found: stream_count });
        }
        let meshlet_count = reader.read_u32()?;
        let payload_size_words = reader.read_u32()?;
        let header = FormatHeader { style, stream_count, meshlet_count, payload_size_words };

        // each meshlet takes at least a header and a bound, reject absurd counts early
        let remaining = reader.as_slice().len();
        if (meshlet_count as usize).saturating_mul(40) > remaining
            || (payload_size_words as usize).saturating_mul(4) > remaining
        {
            return Err(Err::Truncated);
        }

        let headers = (0..meshlet_count)
            .map(|_| -> Result<Header, Err> {
                Ok(Header {
                    base_vertex_offset: reader.read_u32()?,
                    num_chunks: reader.read_u32()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let bounds = (0..meshlet_count)
            .map(|_| -> Result<Bound, Err> { read_bound(&mut reader) })
            .collect::<Result<Vec<_>, _>>()?;

        let mut streams = Vec::with_capacity(meshlet_count as usize * style.stream_count());
        for _ in 0..meshlet_count {
            for &ty in style.stream_types() {
                streams.push(read_stream(&mut reader, ty)?);
            }
        }

        let payload = (0..payload_size_words)
            .map(|_| reader.read_u32())
            .collect::<Result<Vec<_>, _>>()?;
        // pad word
        reader.read_u32()?;

        let view = Self { header, headers, bounds, streams, payload };
        view.check_ranges()?;
        Ok(view)
    }

    fn check_ranges(&self) -> Result<(), Err> {
        let style = self.header.style;
        for (meshlet, h) in self.headers.iter().enumerate() {
            for &stream in style.stream_types() {
                let s = self.stream(meshlet, stream);
                for chunk in 0..NUM_CHUNKS {
                    let out_of_range = chunk < h.num_chunks as usize
                        && (s.offsets_in_words[chunk] as usize > self.payload.len()
                            || s.bits(chunk) > stream.component_bits());
                    if out_of_range || h.num_chunks as usize > NUM_CHUNKS {
                        return Err(Err::OutOfRange { meshlet, stream, chunk });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn format_header(&self) -> &FormatHeader {
        &self.header
    }

    pub fn style(&self) -> MeshStyle {
        self.header.style
    }

    pub fn meshlet_count(&self) -> usize {
        self.headers.len()
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    pub fn payload(&self) -> &[PayloadWord] {
        &self.payload
    }

    /// the stream of type 'ty' of 'meshlet'.
    /// Panics if the meshlet is out of range or the style has no such stream.
    pub fn stream(&self, meshlet: usize, ty: StreamType) -> &Stream {
        &self.streams[meshlet * self.header.stream_count as usize + ty as usize]
    }

    fn chunk_offsets(&self, meshlet: usize, chunk: usize) -> ChunkOffsets {
        self.stream(meshlet, StreamType::Primitive)
            .chunk_offsets(chunk)
            .unwrap_or_default()
    }

    pub fn chunk_primitive_count(&self, meshlet: usize, chunk: usize) -> usize {
        let (a, b) = (self.chunk_offsets(meshlet, chunk), self.chunk_offsets(meshlet, chunk + 1));
        b.prim_offset.saturating_sub(a.prim_offset) as usize
    }

    pub fn chunk_vertex_count(&self, meshlet: usize, chunk: usize) -> usize {
        let (a, b) = (self.chunk_offsets(meshlet, chunk), self.chunk_offsets(meshlet, chunk + 1));
        b.attr_offset.saturating_sub(a.attr_offset) as usize
    }

    pub fn meshlet_primitive_count(&self, meshlet: usize) -> usize {
        let n = self.headers[meshlet].num_chunks as usize;
        self.chunk_offsets(meshlet, n).prim_offset as usize
    }

    pub fn meshlet_vertex_count(&self, meshlet: usize) -> usize {
        let n = self.headers[meshlet].num_chunks as usize;
        self.chunk_offsets(meshlet, n).attr_offset as usize
    }

    pub fn total_primitives(&self) -> usize {
        (0..self.meshlet_count()).map(|m| self.meshlet_primitive_count(m)).sum()
    }

    pub fn total_vertices(&self) -> usize {
        (0..self.meshlet_count()).map(|m| self.meshlet_vertex_count(m)).sum()
    }

    /// local indices of triangle 'index' of a chunk.
    pub fn primitive(&self, meshlet: usize, chunk: usize, index: usize) -> [u8; 3] {
        let s = self.stream(meshlet, StreamType::Primitive);
        let mut reader = BitReader::new(&self.payload);
        reader.seek(s.offsets_in_words[chunk] as usize * WORD_BITS + index * 3 * IBO_BITS as usize);
        [0; 3].map(|_| reader.read(IBO_BITS) as u8)
    }

    /// raw components of element 'index' of a chunk, base added back.
    pub fn element<const N: usize>(&self, meshlet: usize, ty: StreamType, chunk: usize, index: usize) -> [u32; N] {
        debug_assert_eq!(N, ty.components());
        let s = self.stream(meshlet, ty);
        let component_bits = ty.component_bits();
        let mask = low_mask(component_bits);

        let StreamBase::Values(words) = &s.base else {
            return [0; N];
        };
        let mut base_reader = BitReader::new(words);
        base_reader.seek(chunk * N * component_bits as usize);
        let base = [0; N].map(|_| base_reader.read(component_bits));

        let bits = s.bits(chunk);
        let mut reader = BitReader::new(&self.payload);
        reader.seek(s.offsets_in_words[chunk] as usize * WORD_BITS + index * N * bits as usize);
        base.map(|b| b.wrapping_add(reader.read(bits)) & mask)
    }

    pub fn position(&self, meshlet: usize, chunk: usize, index: usize) -> Vec3 {
        let exp = self.stream(meshlet, StreamType::Position).aux;
        self.element::<3>(meshlet, StreamType::Position, chunk, index)
            .map(|c| ldexp(sign_extend(c, 16) as f32, exp))
    }

    pub fn uv(&self, meshlet: usize, chunk: usize, index: usize) -> [f32; 2] {
        let exp = self.stream(meshlet, StreamType::UV).aux;
        self.element::<2>(meshlet, StreamType::UV, chunk, index)
            .map(|c| 0.5 * ldexp(sign_extend(c, 16) as f32, exp) + 0.5)
    }

    pub fn normal_tangent(&self, meshlet: usize, chunk: usize, index: usize) -> NormalTangentValue {
        let s = self.stream(meshlet, StreamType::NormalTangentOct8);
        let c = self.element::<4>(meshlet, StreamType::NormalTangentOct8, chunk, index)
            .map(|c| c as u8 as i8);

        let negative = match SignClass::from_aux(s.aux, chunk) {
            Some(SignClass::AllNegative) => true,
            Some(SignClass::Mixed) => c[3] & 1 == 1,
            Some(SignClass::AllPositive) | None => false,
        };
        let [tx, ty, tz] = decode_oct8([c[2], c[3]]);
        NormalTangentValue {
            normal: decode_oct8([c[0], c[1]]),
            tangent: [tx, ty, tz, if negative { -1.0 } else { 1.0 }],
        }
    }

    pub fn decode_meshlet(&self, meshlet: usize) -> DecodedMeshlet {
        let style = self.style();
        let num_chunks = self.headers[meshlet].num_chunks as usize;
        let textured = style != MeshStyle::Wireframe;

        let mut out = DecodedMeshlet {
            normal_tangents: textured.then(Vec::new),
            uvs: textured.then(Vec::new),
            ..Default::default()
        };

        for chunk in 0..num_chunks {
            let first_vertex = self.chunk_offsets(meshlet, chunk).attr_offset as u32;
            for i in 0..self.chunk_primitive_count(meshlet, chunk) {
                out.triangles.push(self.primitive(meshlet, chunk, i).map(|v| first_vertex + v as u32));
            }
            for i in 0..self.chunk_vertex_count(meshlet, chunk) {
                out.positions.push(self.position(meshlet, chunk, i));
                if let Some(nts) = &mut out.normal_tangents {
                    nts.push(self.normal_tangent(meshlet, chunk, i));
                }
                if let Some(uvs) = &mut out.uvs {
                    uvs.push(self.uv(meshlet, chunk, i));
                }
            }
        }
        out
    }

    /// Decodes every meshlet into one vertex list, with triangles indexing into it.
    pub fn decode_all(&self) -> DecodedMeshlet {
        let textured = self.style() != MeshStyle::Wireframe;
        let mut out = DecodedMeshlet {
            normal_tangents: textured.then(Vec::new),
            uvs: textured.then(Vec::new),
            ..Default::default()
        };
        for m in 0..self.meshlet_count() {
            let decoded = self.decode_meshlet(m);
            let base = self.headers[m].base_vertex_offset;
            out.triangles.extend(decoded.triangles.iter().map(|t| t.map(|v| v + base)));
            out.positions.extend(decoded.positions);
            if let (Some(dst), Some(src)) = (&mut out.normal_tangents, decoded.normal_tangents) {
                dst.extend(src);
            }
            if let (Some(dst), Some(src)) = (&mut out.uvs, decoded.uvs) {
                dst.extend(src);
            }
        }
        out
    }
}

fn read_bound<R: ByteReader>(reader: &mut R) -> Result<Bound, Err> {
    let mut bound = Bound::default();
    for c in &mut bound.center {
        *c = reader.read_f32()?;
    }
    bound.radius = reader.read_f32()?;
    for c in &mut bound.cone_axis_cutoff {
        *c = reader.read_f32()?;
    }
    Ok(bound)
}

fn read_stream<R: ByteReader>(reader: &mut R, ty: StreamType) -> Result<Stream, Err> {
    let mut words = [0; STREAM_BASE_WORDS];
    for w in &mut words {
        *w = reader.read_u32()?;
    }
    let bits_per_chunk = reader.read_u32()?;
    let aux = reader.read_i32()?;
    let mut offsets_in_words = [0; NUM_CHUNKS];
    for o in &mut offsets_in_words {
        *o = reader.read_u32()?;
    }
    Ok(Stream {
        base: StreamBase::from_words(ty, words),
        bits_per_chunk,
        aux,
        offsets_in_words,
    })
}
