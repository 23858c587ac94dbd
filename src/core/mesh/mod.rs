pub mod builder;

use serde::Serialize;

/// Semantic channels a mesh can carry. Position lives in its own buffer,
/// everything else is interleaved in the attribute buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MeshAttribute {
    Position = 0,
    UV,
    Normal,
    Tangent,
    BoneIndex,
    BoneWeights,
    VertexColor,
}

impl MeshAttribute {
    pub const COUNT: usize = 7;

    pub const ALL: [MeshAttribute; Self::COUNT] = [
        MeshAttribute::Position,
        MeshAttribute::UV,
        MeshAttribute::Normal,
        MeshAttribute::Tangent,
        MeshAttribute::BoneIndex,
        MeshAttribute::BoneWeights,
        MeshAttribute::VertexColor,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-vertex storage format of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum AttributeFormat {
    #[default]
    Undefined,
    R32G32B32A32Sfloat,
    R32G32B32Sfloat,
    R32G32Sfloat,
    R16G16Unorm,
    R8G8B8A8Unorm,
    R16G16B16A16Uint,
}

impl AttributeFormat {
    /// size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            AttributeFormat::Undefined => 0,
            AttributeFormat::R32G32B32A32Sfloat => 16,
            AttributeFormat::R32G32B32Sfloat => 12,
            AttributeFormat::R32G32Sfloat => 8,
            AttributeFormat::R16G16Unorm => 4,
            AttributeFormat::R8G8B8A8Unorm => 4,
            AttributeFormat::R16G16B16A16Uint => 8,
        }
    }

    /// the float format with 'n' components, if there is one.
    pub fn float_with_components(n: usize) -> Option<Self> {
        match n {
            2 => Some(AttributeFormat::R32G32Sfloat),
            3 => Some(AttributeFormat::R32G32B32Sfloat),
            4 => Some(AttributeFormat::R32G32B32A32Sfloat),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttributeLayout {
    pub format: AttributeFormat,
    /// byte offset of the channel within one vertex of its buffer.
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IndexType {
    U16,
    U32,
}

/// Index buffer of a mesh. `None` means the vertex order itself defines the primitives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexBuffer {
    #[default]
    None,
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::None => 0,
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_type(&self) -> Option<IndexType> {
        match self {
            IndexBuffer::None => None,
            IndexBuffer::U16(_) => Some(IndexType::U16),
            IndexBuffer::U32(_) => Some(IndexType::U32),
        }
    }

    /// returns the i'th index widened to 32 bits.
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexBuffer::None => None,
            IndexBuffer::U16(v) => v.get(i).map(|&x| x as u32),
            IndexBuffer::U32(v) => v.get(i).copied(),
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match self {
            IndexBuffer::None => 0,
            IndexBuffer::U16(v) => v.len() * 2,
            IndexBuffer::U32(v) => v.len() * 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Topology {
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineList,
    LineStrip,
    PointList,
}

/// Raw input mesh.
/// Positions and the other channels live in two separately strided byte buffers,
/// described by `attribute_layout`. All multi-byte values are little-endian.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<u8>,
    pub position_stride: usize,

    pub attributes: Vec<u8>,
    pub attribute_stride: usize,

    pub attribute_layout: [AttributeLayout; MeshAttribute::COUNT],

    pub indices: IndexBuffer,

    /// number of indices, or of vertices when the mesh is not indexed.
    pub count: u32,
    pub topology: Topology,
    pub primitive_restart: bool,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        if self.position_stride == 0 {
            0
        } else {
            self.positions.len() / self.position_stride
        }
    }

    pub fn get_layout(&self, attr: MeshAttribute) -> AttributeLayout {
        self.attribute_layout[attr.index()]
    }

    pub fn has_attribute(&self, attr: MeshAttribute) -> bool {
        self.get_layout(attr).format != AttributeFormat::Undefined
    }

    /// raw bytes of vertex 'i' in the position buffer.
    pub fn position_bytes(&self, i: usize) -> &[u8] {
        &self.positions[i * self.position_stride..(i + 1) * self.position_stride]
    }

    /// raw bytes of vertex 'i' in the attribute buffer. Empty when the mesh has no attribute buffer.
    pub fn attribute_bytes(&self, i: usize) -> &[u8] {
        if self.attribute_stride == 0 {
            return &[];
        }
        &self.attributes[i * self.attribute_stride..(i + 1) * self.attribute_stride]
    }

    /// reads 'N' consecutive little-endian f32 values of channel 'attr' of vertex 'i'.
    pub(crate) fn read_f32s<const N: usize>(&self, attr: MeshAttribute, i: usize) -> [f32; N] {
        let layout = self.get_layout(attr);
        let bytes = if attr == MeshAttribute::Position {
            self.position_bytes(i)
        } else {
            self.attribute_bytes(i)
        };
        let mut out = [0.0; N];
        for (c, val) in out.iter_mut().enumerate() {
            let o = layout.offset as usize + 4 * c;
            *val = f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
        }
        out
    }

    /// reads 'N' consecutive little-endian u16 values of channel 'attr' of vertex 'i'.
    pub(crate) fn read_u16s<const N: usize>(&self, attr: MeshAttribute, i: usize) -> [u16; N] {
        let layout = self.get_layout(attr);
        let bytes = self.attribute_bytes(i);
        let mut out = [0; N];
        for (c, val) in out.iter_mut().enumerate() {
            let o = layout.offset as usize + 2 * c;
            *val = u16::from_le_bytes([bytes[o], bytes[o + 1]]);
        }
        out
    }

    /// the index buffer as 32-bit indices, or the implicit sequence when the mesh is not indexed.
    pub fn indices_u32(&self) -> Vec<u32> {
        match &self.indices {
            IndexBuffer::None => (0..self.count).collect(),
            IndexBuffer::U16(v) => v.iter().map(|&i| i as u32).collect(),
            IndexBuffer::U32(v) => v.clone(),
        }
    }

    pub fn uncompressed_size(&self, include_attributes: bool) -> usize {
        let mut size = self.indices.size_in_bytes() + self.positions.len();
        if include_attributes {
            size += self.attributes.len();
        }
        size
    }
}
