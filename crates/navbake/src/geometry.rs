use glam::{UVec3, Vec3};
use navbake_recast::{Aabb3d, compute_aabb};
use thiserror::Error;

/// A borrowed triangle soup to bake.
///
/// Triangles are wound so that their normal, `(b - a) × (c - a)`, points up for walkable floors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputGeometry<'a> {
    vertices: &'a [Vec3],
    triangles: &'a [UVec3],
}

impl<'a> InputGeometry<'a> {
    /// Wraps the given vertices and triangles after checking that every index points at a vertex.
    ///
    /// # Errors
    ///
    /// Returns an error for the first triangle that references a missing vertex.
    pub fn new(vertices: &'a [Vec3], triangles: &'a [UVec3]) -> Result<Self, GeometryError> {
        for (triangle, indices) in triangles.iter().enumerate() {
            if let Some(&index) = indices
                .to_array()
                .iter()
                .find(|&&index| index as usize >= vertices.len())
            {
                return Err(GeometryError::VertexIndexOutOfBounds {
                    triangle,
                    index,
                    vertex_count: vertices.len(),
                });
            }
        }
        Ok(Self {
            vertices,
            triangles,
        })
    }

    /// Wraps the given vertices and triangles without validating the indices.
    ///
    /// A bake over geometry with out of range indices fails during rasterization.
    pub fn new_unchecked(vertices: &'a [Vec3], triangles: &'a [UVec3]) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// The vertices of the soup.
    #[inline]
    pub fn vertices(&self) -> &'a [Vec3] {
        self.vertices
    }

    /// The vertex indices of each triangle.
    #[inline]
    pub fn triangles(&self) -> &'a [UVec3] {
        self.triangles
    }

    /// Whether there is nothing to rasterize.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Computes the bounds of all vertices, or `None` if there are none.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        compute_aabb(self.vertices)
    }
}

/// Errors that can occur when wrapping geometry in an [`InputGeometry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// A triangle references a vertex that does not exist.
    #[error("Triangle {triangle} references vertex {index}, but there are only {vertex_count} vertices")]
    VertexIndexOutOfBounds {
        /// The index of the offending triangle
        triangle: usize,
        /// The offending vertex index
        index: u32,
        /// The number of vertices
        vertex_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec3, vec3};

    use super::*;

    #[test]
    fn rejects_out_of_range_indices() {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let triangles = [uvec3(0, 1, 2), uvec3(0, 2, 3)];
        assert_eq!(
            InputGeometry::new(&vertices, &triangles),
            Err(GeometryError::VertexIndexOutOfBounds {
                triangle: 1,
                index: 3,
                vertex_count: 3,
            })
        );
    }

    #[test]
    fn computes_bounds() {
        let vertices = [vec3(-1.0, 2.0, 0.0), vec3(3.0, -4.0, 5.0), Vec3::ZERO];
        let triangles = [uvec3(0, 1, 2)];
        let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
        let aabb = geometry.compute_aabb().unwrap();
        assert_relative_eq!(aabb.min.x, -1.0);
        assert_relative_eq!(aabb.min.y, -4.0);
        assert_relative_eq!(aabb.max.z, 5.0);
    }

    #[test]
    fn empty_geometry_has_no_bounds() {
        let geometry = InputGeometry::default();
        assert!(geometry.is_empty());
        assert_eq!(geometry.compute_aabb(), None);
    }
}
