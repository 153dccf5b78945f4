use glam::{Vec3A, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    CompactHeightfield, PolygonMesh,
    poly_mesh::RC_MESH_NULL_IDX,
    region::RegionId,
};

/// Contains triangle meshes that represent detailed height data associated
/// with the polygons in its associated polygon mesh object.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailPolygonMesh {
    /// The sub-mesh data, one per polygon of the source mesh
    pub meshes: Vec<SubMesh>,
    /// The mesh vertices in world space
    pub vertices: Vec<Vec3A>,
    /// The mesh triangles, indexed relative to their sub-mesh
    pub triangles: Vec<DetailTriangle>,
}

/// The range of vertices and triangles in a [`DetailPolygonMesh`] that belong to one polygon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMesh {
    /// Index of the first vertex of the sub-mesh
    pub base_vertex_index: u32,
    /// Number of vertices in the sub-mesh
    pub vertex_count: u32,
    /// Index of the first triangle of the sub-mesh
    pub base_triangle_index: u32,
    /// Number of triangles in the sub-mesh
    pub triangle_count: u32,
}

/// A triangle of a detail sub-mesh.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailTriangle {
    /// Vertex indices, relative to [`SubMesh::base_vertex_index`]
    pub indices: [u8; 3],
    /// Two bits per edge, in the order `(0, 1)`, `(1, 2)`, `(2, 0)`.
    /// [`DetailTriangle::EDGE_BOUNDARY`] marks edges lying on the polygon boundary.
    pub edge_flags: u8,
}

impl DetailTriangle {
    /// The edge lies on the boundary of its source polygon.
    pub const EDGE_BOUNDARY: u8 = 1;

    /// Returns whether edge `edge` (0, 1 or 2) lies on the boundary of the source polygon.
    #[inline]
    pub fn is_boundary_edge(&self, edge: u8) -> bool {
        (self.edge_flags >> (edge * 2)) & 0x3 == Self::EDGE_BOUNDARY
    }
}

impl DetailPolygonMesh {
    /// Builds a detail mesh from the provided polygon mesh.
    ///
    /// Every polygon is triangulated from its own vertices. When `sample_distance` is positive,
    /// the heightfield is sampled below the polygon's centroid and, if the surface there deviates
    /// from the polygon by more than `sample_max_error` world units, the sample is added as an
    /// extra vertex that the polygon is fanned around.
    ///
    /// # Errors
    ///
    /// Returns an error if a polygon has fewer than 3 vertices or more than a triangle can index.
    pub fn from_poly_mesh(
        mesh: &PolygonMesh,
        heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> Result<Self, DetailMeshError> {
        let mut dmesh = DetailPolygonMesh::default();
        if mesh.vertices.is_empty() || mesh.polygon_count() == 0 {
            return Ok(dmesh);
        }
        let cs = mesh.cell_size;
        let ch = mesh.cell_height;
        let orig = mesh.aabb.min;
        let to_world = |v: Vec3A| orig + v * Vec3A::new(cs, ch, cs) + Vec3A::new(0.0, ch, 0.0);

        dmesh.meshes.reserve(mesh.polygon_count());
        let mut poly: Vec<Vec3A> = Vec::with_capacity(mesh.vertices_per_polygon);

        for i in 0..mesh.polygon_count() {
            // Store polygon vertices for processing.
            poly.clear();
            poly.extend(
                mesh.polygon_vertices(i)
                    .iter()
                    .take_while(|&&v| v != RC_MESH_NULL_IDX)
                    .map(|&v| mesh.vertices[v as usize].as_vec3a()),
            );
            let npoly = poly.len();
            if npoly < 3 {
                return Err(DetailMeshError::DegeneratePolygon {
                    polygon: i,
                    vertex_count: npoly,
                });
            }
            if npoly >= u8::MAX as usize {
                return Err(DetailMeshError::TooManyVertices {
                    polygon: i,
                    vertex_count: npoly,
                });
            }

            let poly_height = poly.iter().map(|v| v.y).sum::<f32>() / npoly as f32;
            let center = if sample_distance > 0.0 {
                heightfield.sample_center(&poly, mesh.regions[i])
            } else {
                None
            }
            .filter(|sample| (sample.y - poly_height).abs() * ch > sample_max_error);

            let base_vertex_index = dmesh.vertices.len() as u32;
            let base_triangle_index = dmesh.triangles.len() as u32;
            dmesh.vertices.extend(poly.iter().map(|&v| to_world(v)));
            match center {
                Some(center) => {
                    // Fan around the sample, only the outer edge of each triangle is on the boundary.
                    let c = npoly as u8;
                    dmesh.vertices.push(to_world(center));
                    for j in 0..npoly {
                        dmesh.triangles.push(DetailTriangle {
                            indices: [c, j as u8, ((j + 1) % npoly) as u8],
                            edge_flags: DetailTriangle::EDGE_BOUNDARY << 2,
                        });
                    }
                }
                None => {
                    for j in 2..npoly {
                        let mut edge_flags = DetailTriangle::EDGE_BOUNDARY << 2;
                        if j == 2 {
                            edge_flags |= DetailTriangle::EDGE_BOUNDARY;
                        }
                        if j == npoly - 1 {
                            edge_flags |= DetailTriangle::EDGE_BOUNDARY << 4;
                        }
                        dmesh.triangles.push(DetailTriangle {
                            indices: [0, (j - 1) as u8, j as u8],
                            edge_flags,
                        });
                    }
                }
            }

            dmesh.meshes.push(SubMesh {
                base_vertex_index,
                vertex_count: dmesh.vertices.len() as u32 - base_vertex_index,
                base_triangle_index,
                triangle_count: dmesh.triangles.len() as u32 - base_triangle_index,
            });
        }

        Ok(dmesh)
    }
}

impl CompactHeightfield {
    /// Samples the walkable surface below the centroid of `poly` (in cell units).
    /// Prefers spans of `region`, falling back to the span closest to the polygon's height.
    fn sample_center(&self, poly: &[Vec3A], region: RegionId) -> Option<Vec3A> {
        let centroid = poly.iter().copied().sum::<Vec3A>() / poly.len() as f32;
        let cell = centroid.xz().floor();
        if cell.x < 0.0 || cell.y < 0.0 {
            return None;
        }
        let cell_span_indices = self.get_cell_at(cell.x as u16, cell.y as u16)?.index_range();
        let spans = || {
            cell_span_indices
                .clone()
                .filter(|&i| self.areas[i].is_walkable())
        };
        let in_region = spans().find(|&i| self.spans[i].region == region);
        let best = in_region.or_else(|| {
            spans().min_by(|&a, &b| {
                let da = (self.spans[a].y as f32 - centroid.y).abs();
                let db = (self.spans[b].y as f32 - centroid.y).abs();
                da.total_cmp(&db)
            })
        })?;
        Some(Vec3A::new(centroid.x, self.spans[best].y as f32, centroid.z))
    }
}

/// Errors that can occur when building a [`DetailPolygonMesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetailMeshError {
    /// A polygon has fewer than 3 vertices.
    #[error("Polygon {polygon} has only {vertex_count} vertices")]
    DegeneratePolygon {
        /// The index of the polygon
        polygon: usize,
        /// The number of vertices of the polygon
        vertex_count: usize,
    },
    /// A polygon has more vertices than a detail triangle can index.
    #[error("Polygon {polygon} has {vertex_count} vertices, which is too many for a detail mesh")]
    TooManyVertices {
        /// The index of the polygon
        polygon: usize,
        /// The number of vertices of the polygon
        vertex_count: usize,
    },
}
