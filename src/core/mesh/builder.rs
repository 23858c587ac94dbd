use thiserror::Error;

use super::{
    AttributeFormat,
    AttributeLayout,
    IndexBuffer,
    Mesh,
    MeshAttribute,
    Topology,
};

struct Channel {
    attribute: MeshAttribute,
    format: AttributeFormat,
    data: Vec<u8>,
}

/// Builds a `Mesh` from typed per-vertex data.
/// Channels other than positions are interleaved in the order they were added.
pub struct MeshBuilder {
    positions: Option<Vec<[f32; 3]>>,
    channels: Vec<Channel>,
    indices: IndexBuffer,
    topology: Topology,
    primitive_restart: bool,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self {
            positions: None,
            channels: Vec::new(),
            indices: IndexBuffer::None,
            topology: Topology::TriangleList,
            primitive_restart: false,
        }
    }

    pub fn set_positions(&mut self, data: Vec<[f32; 3]>) -> &mut Self {
        self.positions = Some(data);
        self
    }

    /// adds a float channel with 'N' components. Adding the same channel twice replaces it.
    pub fn add_attribute<const N: usize>(&mut self, attribute: MeshAttribute, data: Vec<[f32; N]>) -> &mut Self {
        let format = AttributeFormat::float_with_components(N).unwrap_or(AttributeFormat::Undefined);
        let data = data.iter()
            .flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes()))
            .collect();
        self.add_raw_attribute(attribute, format, data)
    }

    /// adds a channel whose bytes are already packed in 'format', one element per vertex.
    pub fn add_raw_attribute(&mut self, attribute: MeshAttribute, format: AttributeFormat, data: Vec<u8>) -> &mut Self {
        self.channels.retain(|c| c.attribute != attribute);
        self.channels.push(Channel { attribute, format, data });
        self
    }

    pub fn set_indices(&mut self, indices: IndexBuffer) -> &mut Self {
        self.indices = indices;
        self
    }

    pub fn set_triangles(&mut self, faces: &[[u32; 3]]) -> &mut Self {
        self.indices = IndexBuffer::U32(faces.iter().flatten().copied().collect());
        self
    }

    pub fn set_topology(&mut self, topology: Topology) -> &mut Self {
        self.topology = topology;
        self
    }

    pub fn set_primitive_restart(&mut self, primitive_restart: bool) -> &mut Self {
        self.primitive_restart = primitive_restart;
        self
    }

    pub fn build(&mut self) -> Result<Mesh, Err> {
        let positions = self.positions.take().ok_or(Err::MissingPositions)?;
        let num_vertices = positions.len();

        let mut attribute_layout = [AttributeLayout::default(); MeshAttribute::COUNT];
        attribute_layout[MeshAttribute::Position.index()] = AttributeLayout {
            format: AttributeFormat::R32G32B32Sfloat,
            offset: 0,
        };

        let mut attribute_stride = 0;
        for c in &self.channels {
            if c.attribute == MeshAttribute::Position || c.format == AttributeFormat::Undefined {
                return Err(Err::InvalidRawAttribute(c.attribute, c.format));
            }
            let expected = num_vertices * c.format.size();
            if c.data.len() != expected {
                return Err(Err::AttributeCountMismatch(c.attribute, expected, c.data.len()));
            }
            attribute_layout[c.attribute.index()] = AttributeLayout {
                format: c.format,
                offset: attribute_stride as u32,
            };
            attribute_stride += c.format.size();
        }

        let mut attributes = vec![0_u8; attribute_stride * num_vertices];
        if attribute_stride > 0 {
            for (v, dst) in attributes.chunks_exact_mut(attribute_stride).enumerate() {
                let mut o = 0;
                for c in &self.channels {
                    let size = c.format.size();
                    dst[o..o + size].copy_from_slice(&c.data[v * size..(v + 1) * size]);
                    o += size;
                }
            }
        }

        let restart = match self.indices {
            IndexBuffer::U16(_) => 0xFFFF,
            _ => u32::MAX,
        };
        for i in 0..self.indices.len() {
            let idx = self.indices.get(i).unwrap_or(0);
            if self.primitive_restart && idx == restart {
                continue;
            }
            if idx as usize >= num_vertices {
                return Err(Err::IndexOutOfRange(idx, num_vertices));
            }
        }

        let indices = std::mem::take(&mut self.indices);
        let count = match indices {
            IndexBuffer::None => num_vertices as u32,
            _ => indices.len() as u32,
        };

        Ok(Mesh {
            positions: positions.iter().flat_map(|p| p.iter().flat_map(|c| c.to_le_bytes())).collect(),
            position_stride: 12,
            attributes,
            attribute_stride,
            attribute_layout,
            indices,
            count,
            topology: self.topology,
            primitive_restart: self.primitive_restart,
        })
    }
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::new()
    }
}


#[remain::sorted]
#[derive(Error, Debug)]
pub enum Err {
    #[error("Attribute {:?} has the wrong size; expected {} bytes, found {}.", .0, .1, .2)]
    AttributeCountMismatch(MeshAttribute, usize, usize),

    #[error("Index {0} is out of range for a mesh with {1} vertices.")]
    IndexOutOfRange(u32, usize),

    #[error("Attribute {:?} cannot be stored as {:?}.", .0, .1)]
    InvalidRawAttribute(MeshAttribute, AttributeFormat),

    #[error("The mesh has no positions.")]
    MissingPositions,
}
