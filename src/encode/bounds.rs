use meshopt::VertexDataAdapter;

use crate::core::format::Bound;
use crate::core::shared::Vec3;

/// Views tightly packed positions as meshoptimizer vertex data.
pub fn position_adapter(positions: &[Vec3]) -> Result<VertexDataAdapter<'_>, meshopt::Error> {
    VertexDataAdapter::new(bytemuck::cast_slice(positions), std::mem::size_of::<Vec3>(), 0)
}

/// Bounding sphere and backface cone of a triangle set, as meshoptimizer computes them.
/// Cones that cannot bound the normals come back with axis zero and cutoff one.
pub fn compute_cluster_bounds(triangles: &[[u32; 3]], vertices: &VertexDataAdapter<'_>) -> Bound {
    if triangles.is_empty() {
        return Bound::default();
    }
    let indices: &[u32] = bytemuck::cast_slice(triangles);
    let b = meshopt::compute_cluster_bounds(indices, vertices);

    Bound {
        center: b.center,
        radius: b.radius,
        cone_axis_cutoff: [b.cone_axis[0], b.cone_axis[1], b.cone_axis[2], b.cone_cutoff],
    }
}
