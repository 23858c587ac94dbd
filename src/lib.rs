// lib.rs

/// Contains the interface between obj files and the 'Mesh' object.
pub mod io;

/// Defines the meshlet encoder.
pub mod encode;

/// Reads encoded containers back.
pub mod decode;

/// Contains the shared definitions, native objects, the container format, and the buffers.
pub mod core;

pub mod prelude {
    pub use crate::core::mesh::{AttributeFormat, IndexBuffer, Mesh, MeshAttribute, Topology, builder::MeshBuilder};
    pub use crate::core::shared::ConfigType;
    pub use crate::core::bit_coder::{ByteReader, ByteWriter};
    pub use crate::core::format::{EncodedMesh, MeshStyle, StreamType};
    pub use crate::encode::{self, encode, export_mesh_to_meshlet};
    pub use crate::decode::MeshView;
}
