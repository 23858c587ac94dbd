// use tobj to load the obj file and convert it to our internal mesh representation
use std::fmt::Debug;
use std::path::Path;

use log::{debug, warn};

use crate::core::mesh::builder::MeshBuilder;
use crate::core::mesh::{Mesh, MeshAttribute};

#[remain::sorted]
#[derive(Debug, thiserror::Error)]
pub enum Err {
    #[error("OBJ load error: {0}")]
    LoadError(#[from] tobj::LoadError),

    #[error("Mesh Builder Error: {0}")]
    MeshBuilderError(#[from] crate::core::mesh::builder::Err),
}

/// Loads every model of an OBJ file into one triangle-list mesh.
/// Normals and UVs are kept only when every model has them.
pub fn load_obj<P: AsRef<Path> + Debug>(path: P) -> Result<Mesh, Err> {
    let op = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };

    let (models, _materials) = tobj::load_obj(path.as_ref(), &op)?;

    let has_normals = !models.is_empty() && models.iter().all(|m| !m.mesh.normals.is_empty());
    let has_tex_coords = !models.is_empty() && models.iter().all(|m| !m.mesh.texcoords.is_empty());
    if !has_normals && models.iter().any(|m| !m.mesh.normals.is_empty()) {
        warn!("Dropping normals of {:?}: not every model has them.", path);
    }
    if !has_tex_coords && models.iter().any(|m| !m.mesh.texcoords.is_empty()) {
        warn!("Dropping texture coordinates of {:?}: not every model has them.", path);
    }

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut tex_coords = Vec::new();
    let mut indices = Vec::new();

    for model in &models {
        let base = positions.len() as u32;
        let mesh = &model.mesh;
        positions.extend(mesh.positions.chunks_exact(3).map(|x| [x[0], x[1], x[2]]));
        if has_normals {
            normals.extend(mesh.normals.chunks_exact(3).map(|x| [x[0], x[1], x[2]]));
        }
        if has_tex_coords {
            tex_coords.extend(mesh.texcoords.chunks_exact(2).map(|x| [x[0], x[1]]));
        }
        indices.extend(mesh.indices.iter().map(|&i| i + base));
    }
    debug!(
        "Loaded {} models with {} vertices and {} triangles.",
        models.len(),
        positions.len(),
        indices.len() / 3
    );

    let mut builder = MeshBuilder::new();
    builder.set_positions(positions);
    if has_normals {
        builder.add_attribute(MeshAttribute::Normal, normals);
    }
    if has_tex_coords {
        builder.add_attribute(MeshAttribute::UV, tex_coords);
    }
    builder.set_indices(crate::core::mesh::IndexBuffer::U32(indices));

    Ok(builder.build()?)
}
