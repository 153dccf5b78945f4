use navbake_recast::{DT_VERTS_PER_POLYGON, NavmeshCreateParams, NavmeshDataError, NavmeshTile};
use tracing::{debug, trace};

use crate::{AgentParams, BakeOutput, BakePipeline, BlobError, DetailMeshView, PolyMeshView, RecastBackend};

/// A serialized navmesh tile, ready to be handed to a path query engine.
///
/// Empty when the baked mesh had no polygons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavmeshBlob {
    bytes: Vec<u8>,
}

impl NavmeshBlob {
    /// The serialized tile.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the blob, returning the serialized tile.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The size of the serialized tile in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the baked mesh had nothing to serialize.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes the tile.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is empty or was not produced by [`NativeBackend`](crate::NativeBackend).
    pub fn decode(&self) -> Result<NavmeshTile, NavmeshDataError> {
        NavmeshTile::from_bytes(&self.bytes)
    }
}

/// Assigns the user flags of every polygon before a tile is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonFlagging {
    /// Every polygon gets the same flags.
    Uniform(u16),
}

impl PolygonFlagging {
    /// Marks a polygon as traversable by the default query filter.
    pub const TRAVERSABLE: u16 = 1;

    /// The flags of `polygon_count` polygons.
    pub fn flags_for(self, polygon_count: usize) -> Vec<u16> {
        match self {
            PolygonFlagging::Uniform(flags) => vec![flags; polygon_count],
        }
    }

    /// Writes the flags into `mesh`.
    pub fn apply(self, mesh: &mut impl PolyMeshView) {
        match self {
            PolygonFlagging::Uniform(flags) => mesh.flags_mut().fill(flags),
        }
    }
}

impl Default for PolygonFlagging {
    fn default() -> Self {
        PolygonFlagging::Uniform(Self::TRAVERSABLE)
    }
}

impl<B: RecastBackend> BakePipeline<B> {
    /// Serializes a baked mesh into a navmesh tile for an agent.
    ///
    /// The polygon flags stored in the tile come from `flagging`, the mesh in `output` is not modified.
    /// A mesh without polygons yields an empty blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh was baked with more vertices per polygon than a tile supports,
    /// or if the backend could not serialize the mesh.
    pub fn build_blob(
        &mut self,
        output: &BakeOutput<B>,
        agent: &AgentParams,
        flagging: PolygonFlagging,
    ) -> Result<NavmeshBlob, BlobError> {
        if output.max_vertices_per_polygon as usize > DT_VERTS_PER_POLYGON {
            return Err(BlobError::VerticesExceeded {
                vertices_per_polygon: output.max_vertices_per_polygon,
                max: DT_VERTS_PER_POLYGON,
            });
        }
        let mesh = output.poly_mesh();
        if mesh.vertices().is_empty() || mesh.polygon_count() == 0 {
            debug!("Navmesh has no polygons, skipping tile creation");
            return Ok(NavmeshBlob::default());
        }
        let detail = output.detail_mesh();
        let flags = flagging.flags_for(mesh.polygon_count());

        let params = NavmeshCreateParams {
            vertices: mesh.vertices(),
            polygons: mesh.polygons(),
            flags: &flags,
            areas: mesh.areas(),
            vertices_per_polygon: mesh.vertices_per_polygon(),
            detail_meshes: detail.meshes(),
            detail_vertices: detail.vertices(),
            detail_triangles: detail.triangles(),
            walkable_height: agent.height,
            walkable_radius: agent.radius,
            walkable_climb: agent.max_climb,
            aabb: mesh.aabb(),
            cell_size: output.cell_size,
            cell_height: output.cell_height,
            build_bv_tree: true,
        };
        let bytes = self
            .backend_mut()
            .create_navmesh_data(&params)
            .map_err(|err| BlobError::BuildNavmesh(err.into()))?;
        trace!(bytes = bytes.len(), "Built navmesh tile");
        Ok(NavmeshBlob { bytes })
    }
}

#[cfg(test)]
mod tests {
    use glam::{uvec3, vec3};
    use navbake_recast::{Aabb3d, NAVMESH_MAGIC};

    use crate::{BakeConfig, BakeConfigBuilder, BakeOptions, InputGeometry};

    use super::*;

    fn bake(config: &BakeConfig) -> (BakePipeline, BakeOutput) {
        let vertices = [
            vec3(0.0, 0.0, 0.0),
            vec3(10.0, 0.0, 0.0),
            vec3(10.0, 0.0, 10.0),
            vec3(0.0, 0.0, 10.0),
        ];
        let triangles = [uvec3(0, 3, 2), uvec3(0, 2, 1)];
        let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
        let mut pipeline = BakePipeline::new();
        let output = pipeline
            .bake(config, BakeOptions::default(), &geometry)
            .unwrap();
        (pipeline, output)
    }

    fn builder() -> BakeConfigBuilder {
        BakeConfigBuilder {
            aabb: Aabb3d::new([-1.0, -1.0, -1.0], [11.0, 1.0, 11.0]),
            cell_size: 0.5,
            agent_radius: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn tile_stores_uniform_flags_and_agent() {
        let builder = builder();
        let (mut pipeline, output) = bake(&builder.build());
        let blob = pipeline
            .build_blob(&output, &builder.agent(), PolygonFlagging::default())
            .unwrap();
        assert!(!blob.is_empty());

        let tile = blob.decode().unwrap();
        assert_eq!(tile.header.magic, NAVMESH_MAGIC);
        assert_eq!(tile.polys.len(), 1);
        assert!(tile.polys.iter().all(|poly| poly.flags == PolygonFlagging::TRAVERSABLE));
        assert_eq!(tile.header.walkable_radius, 0.5);
        // The baked mesh keeps its own flags.
        assert!(output.poly_mesh().flags().iter().all(|&flags| flags == 0));
    }

    #[test]
    fn too_many_vertices_per_polygon_is_rejected() {
        let builder = BakeConfigBuilder {
            verts_per_poly: 8,
            ..builder()
        };
        let (mut pipeline, output) = bake(&builder.build());
        let err = pipeline
            .build_blob(&output, &builder.agent(), PolygonFlagging::default())
            .unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn empty_mesh_yields_empty_blob() {
        let builder = builder();
        let mut pipeline = BakePipeline::new();
        let output = pipeline
            .bake(&builder.build(), BakeOptions::default(), &InputGeometry::default())
            .unwrap();
        let blob = pipeline
            .build_blob(&output, &builder.agent(), PolygonFlagging::default())
            .unwrap();
        assert!(blob.is_empty());
        assert_eq!(blob.len(), 0);
    }

    #[test]
    fn flagging_can_be_applied_in_place() {
        let (_, mut output) = bake(&builder().build());
        PolygonFlagging::Uniform(7).apply(output.poly_mesh_mut());
        assert!(output.poly_mesh().flags().iter().all(|&flags| flags == 7));
    }
}
