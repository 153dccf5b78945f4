use navbake_recast::RC_MESH_NULL_IDX;

use crate::{ExtractError, PolyMeshView};

/// Height added to every extracted vertex so the render mesh does not z-fight with the level. `[Units: wu]`
pub const VERTICAL_CLEARANCE: f32 = 0.1;

/// A polygon mesh flattened into world space vertex and index buffers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedMesh {
    /// Four floats per vertex: x, y, z and a padding component that is always 0.
    pub vertices: Vec<f32>,
    /// Three vertex indices per triangle.
    pub triangles: Vec<u32>,
}

impl ExtractedMesh {
    /// The number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 4
    }

    /// The number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    /// The position of vertex `index`.
    pub fn position(&self, index: usize) -> [f32; 3] {
        let vertex = &self.vertices[index * 4..][..3];
        [vertex[0], vertex[1], vertex[2]]
    }
}

/// Flattens `mesh` into render buffers.
///
/// Vertices are converted from cell units to world space and lifted by one cell plus
/// [`VERTICAL_CLEARANCE`]. Every polygon is fanned from its first vertex.
///
/// # Errors
///
/// Returns an error if either buffer could not be allocated.
pub fn extract_mesh(mesh: &impl PolyMeshView) -> Result<ExtractedMesh, ExtractError> {
    let vertex_count = mesh.vertices().len();
    let triangle_count: usize = (0..mesh.polygon_count())
        .map(|i| polygon_vertex_count(mesh.polygon_vertices(i)).saturating_sub(2))
        .sum();

    let mut vertices = Vec::new();
    vertices
        .try_reserve_exact(vertex_count * 4)
        .map_err(|_| ExtractError::OutOfMemory {
            buffer: "vertex",
            len: vertex_count * 4,
        })?;
    let mut triangles = Vec::new();
    triangles
        .try_reserve_exact(triangle_count * 3)
        .map_err(|_| ExtractError::OutOfMemory {
            buffer: "triangle",
            len: triangle_count * 3,
        })?;

    let origin = mesh.aabb().min;
    let cs = mesh.cell_size();
    let ch = mesh.cell_height();
    for vertex in mesh.vertices() {
        vertices.extend([
            origin.x + vertex.x as f32 * cs,
            origin.y + (vertex.y as f32 + 1.0) * ch + VERTICAL_CLEARANCE,
            origin.z + vertex.z as f32 * cs,
            0.0,
        ]);
    }

    for i in 0..mesh.polygon_count() {
        let polygon = mesh.polygon_vertices(i);
        let count = polygon_vertex_count(polygon);
        for j in 2..count {
            triangles.extend([
                polygon[0] as u32,
                polygon[j - 1] as u32,
                polygon[j] as u32,
            ]);
        }
    }
    debug_assert_eq!(triangles.len(), triangle_count * 3);

    Ok(ExtractedMesh {
        vertices,
        triangles,
    })
}

fn polygon_vertex_count(polygon: &[u16]) -> usize {
    polygon
        .iter()
        .position(|&v| v == RC_MESH_NULL_IDX)
        .unwrap_or(polygon.len())
}
