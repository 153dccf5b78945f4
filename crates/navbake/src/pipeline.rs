use navbake_recast::AreaType;
use tracing::{debug_span, trace, warn};

use crate::{
    BakeConfig, BakeError, BakeOptions, ExtractError, ExtractedMesh, InputGeometry,
    NativeBackend, PartitionStrategy, PolyMeshView as _, RecastBackend, Stage, StageResource,
    extract::extract_mesh,
};

/// Bakes triangle soups into polygon meshes by driving a [`RecastBackend`] through every stage.
///
/// A pipeline holds no state between bakes apart from its backend, so independent bakes can run
/// in parallel on separate pipelines.
#[derive(Debug, Clone, Default)]
pub struct BakePipeline<B = NativeBackend> {
    backend: B,
}

impl BakePipeline {
    /// Creates a pipeline backed by [`NativeBackend`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: RecastBackend> BakePipeline<B> {
    /// Creates a pipeline that drives `backend`.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// The backend driven by this pipeline.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend driven by this pipeline.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the pipeline, returning its backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Bakes `geometry` into a polygon mesh and its detail mesh.
    ///
    /// The stages run in order: heightfield, rasterization, the filters enabled in `options`,
    /// compact heightfield, erosion, the partition selected in `options`, contours, polygon mesh
    /// and detail mesh. The heightfield is released as soon as it has been compacted, the compact
    /// heightfield and the contours once the detail mesh is built.
    ///
    /// # Errors
    ///
    /// Returns the first stage that failed. Every intermediate structure is released before returning.
    pub fn bake(
        &mut self,
        config: &BakeConfig,
        options: impl Into<BakeOptions>,
        geometry: &InputGeometry,
    ) -> Result<BakeOutput<B>, BakeError> {
        let options = options.into();
        let _span = debug_span!(
            "bake",
            triangles = geometry.triangles().len(),
            partition = ?options.partition
        )
        .entered();
        let backend = &mut self.backend;

        let mut heightfield = StageResource::new(
            Stage::Heightfield,
            backend
                .alloc_heightfield()
                .map_err(|err| BakeError::memory(Stage::Heightfield, err))?,
        );
        backend
            .create_heightfield(
                &mut heightfield,
                config.aabb,
                config.cell_size,
                config.cell_height,
            )
            .map_err(|err| BakeError::CreateHeightfield(err.into()))?;

        let triangle_count = geometry.triangles().len();
        let mut areas = Vec::new();
        areas
            .try_reserve_exact(triangle_count)
            .map_err(|err| BakeError::memory(Stage::TriangleAreas, err))?;
        areas.resize(triangle_count, AreaType::NOT_WALKABLE);
        backend.mark_walkable_triangles(config.walkable_slope_angle, geometry, &mut areas);
        backend
            .rasterize_triangles(&mut heightfield, geometry, &areas, config.walkable_climb)
            .map_err(|err| BakeError::Rasterize(err.into()))?;
        drop(areas);
        trace!("Rasterized {triangle_count} triangles");

        if options.filter_low_hanging_obstacles {
            backend.filter_low_hanging_walkable_obstacles(&mut heightfield, config.walkable_climb);
        }
        if options.filter_ledge_spans {
            backend.filter_ledge_spans(
                &mut heightfield,
                config.walkable_height,
                config.walkable_climb,
            );
        }
        if options.filter_walkable_low_height_spans {
            backend.filter_walkable_low_height_spans(&mut heightfield, config.walkable_height);
        }

        let mut compact_heightfield = StageResource::new(
            Stage::CompactHeightfield,
            backend
                .alloc_compact_heightfield()
                .map_err(|err| BakeError::memory(Stage::CompactHeightfield, err))?,
        );
        backend
            .build_compact_heightfield(
                config.walkable_height,
                config.walkable_climb,
                &heightfield,
                &mut compact_heightfield,
            )
            .map_err(|err| BakeError::BuildCompactHeightfield(err.into()))?;
        drop(heightfield);

        backend.erode_walkable_area(config.walkable_radius, &mut compact_heightfield);

        match options.partition {
            PartitionStrategy::Layer => backend
                .build_layer_regions(&mut compact_heightfield, config.min_region_area)
                .map_err(|err| BakeError::BuildLayerRegions(err.into()))?,
            PartitionStrategy::Monotone => backend
                .build_regions_monotone(
                    &mut compact_heightfield,
                    config.min_region_area,
                    config.merge_region_area,
                )
                .map_err(|err| BakeError::BuildRegionsMonotone(err.into()))?,
            PartitionStrategy::Watershed => {
                backend
                    .build_distance_field(&mut compact_heightfield)
                    .map_err(|err| BakeError::BuildDistanceField(err.into()))?;
                backend
                    .build_regions(
                        &mut compact_heightfield,
                        config.min_region_area,
                        config.merge_region_area,
                    )
                    .map_err(|err| BakeError::BuildRegions(err.into()))?;
            }
        }
        trace!("Built regions");

        let mut contour_set = StageResource::new(
            Stage::ContourSet,
            backend
                .alloc_contour_set()
                .map_err(|err| BakeError::AllocContourSet(err.into()))?,
        );
        backend
            .build_contours(
                &compact_heightfield,
                config.max_simplification_error,
                config.max_edge_len,
                config.contour_flags,
                &mut contour_set,
            )
            .map_err(|err| BakeError::BuildContours(err.into()))?;

        let mut poly_mesh = StageResource::new(
            Stage::PolyMesh,
            backend
                .alloc_poly_mesh()
                .map_err(|err| BakeError::AllocPolyMesh(err.into()))?,
        );
        backend
            .build_poly_mesh(
                &contour_set,
                config.max_vertices_per_polygon,
                &mut poly_mesh,
            )
            .map_err(|err| BakeError::BuildPolyMesh(err.into()))?;

        let mut detail_mesh = StageResource::new(
            Stage::DetailMesh,
            backend
                .alloc_detail_mesh()
                .map_err(|err| BakeError::AllocDetailMesh(err.into()))?,
        );
        backend
            .build_detail_mesh(
                &poly_mesh,
                &compact_heightfield,
                config.detail_sample_dist,
                config.detail_sample_max_error,
                &mut detail_mesh,
            )
            .map_err(|err| BakeError::BuildDetailMesh(err.into()))?;

        drop(compact_heightfield);
        drop(contour_set);

        if poly_mesh.vertices().is_empty() {
            warn!("Baked navmesh has no vertices");
        }
        trace!(
            polygons = poly_mesh.polygon_count(),
            vertices = poly_mesh.vertices().len(),
            "Bake finished"
        );

        Ok(BakeOutput {
            poly_mesh,
            detail_mesh,
            cell_size: config.cell_size,
            cell_height: config.cell_height,
            max_vertices_per_polygon: config.max_vertices_per_polygon,
        })
    }
}

/// The result of a successful [`BakePipeline::bake`].
///
/// Owns the polygon mesh and the detail mesh, both are released when this is dropped.
pub struct BakeOutput<B: RecastBackend = NativeBackend> {
    poly_mesh: StageResource<B::PolyMesh>,
    detail_mesh: StageResource<B::DetailMesh>,
    /// The xz-plane cell size the mesh was baked with. `[Units: wu]`
    pub cell_size: f32,
    /// The y-axis cell height the mesh was baked with. `[Units: wu]`
    pub cell_height: f32,
    /// The maximum number of vertices per polygon the mesh was baked with.
    pub max_vertices_per_polygon: u16,
}

impl<B: RecastBackend> BakeOutput<B> {
    /// The polygon mesh.
    pub fn poly_mesh(&self) -> &B::PolyMesh {
        &self.poly_mesh
    }

    /// Mutable access to the polygon mesh, e.g. to assign polygon flags.
    pub fn poly_mesh_mut(&mut self) -> &mut B::PolyMesh {
        &mut self.poly_mesh
    }

    /// The detail mesh.
    pub fn detail_mesh(&self) -> &B::DetailMesh {
        &self.detail_mesh
    }

    /// Flattens the polygon mesh into render buffers, see [`extract_mesh`](crate::extract_mesh).
    ///
    /// # Errors
    ///
    /// Returns an error if the buffers could not be allocated.
    pub fn extract_mesh(&self) -> Result<ExtractedMesh, ExtractError> {
        extract_mesh(self.poly_mesh())
    }
}

impl<B> std::fmt::Debug for BakeOutput<B>
where
    B: RecastBackend,
    B::PolyMesh: std::fmt::Debug,
    B::DetailMesh: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BakeOutput")
            .field("poly_mesh", &self.poly_mesh)
            .field("detail_mesh", &self.detail_mesh)
            .field("cell_size", &self.cell_size)
            .field("cell_height", &self.cell_height)
            .field("max_vertices_per_polygon", &self.max_vertices_per_polygon)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3, uvec3, vec3};
    use navbake_recast::Aabb3d;

    use crate::{BakeConfigBuilder, BakeFlags, DetailMeshView as _};

    use super::*;

    fn floor() -> (Vec<Vec3>, Vec<UVec3>) {
        (
            vec![
                vec3(0.0, 0.0, 0.0),
                vec3(10.0, 0.0, 0.0),
                vec3(10.0, 0.0, 10.0),
                vec3(0.0, 0.0, 10.0),
            ],
            vec![uvec3(0, 3, 2), uvec3(0, 2, 1)],
        )
    }

    fn config() -> BakeConfig {
        BakeConfigBuilder {
            aabb: Aabb3d::new([-1.0, -1.0, -1.0], [11.0, 1.0, 11.0]),
            cell_size: 0.5,
            cell_height: 0.2,
            agent_radius: 0.5,
            ..Default::default()
        }
        .build()
    }

    #[test]
    fn bakes_a_floor_with_every_partition() {
        let (vertices, triangles) = floor();
        let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
        for partition in [
            PartitionStrategy::Layer,
            PartitionStrategy::Watershed,
            PartitionStrategy::Monotone,
        ] {
            let output = BakePipeline::new()
                .bake(&config(), partition, &geometry)
                .unwrap();
            assert_eq!(output.poly_mesh().polygon_count(), 1, "{partition:?}");
            assert_eq!(output.poly_mesh().vertices().len(), 4, "{partition:?}");
            assert_eq!(output.detail_mesh().meshes().len(), 1, "{partition:?}");
        }
    }

    #[test]
    fn output_keeps_bake_parameters() {
        let (vertices, triangles) = floor();
        let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
        let output = BakePipeline::new()
            .bake(&config(), BakeFlags::default(), &geometry)
            .unwrap();
        assert_eq!(output.cell_size, 0.5);
        assert_eq!(output.cell_height, 0.2);
        assert_eq!(output.max_vertices_per_polygon, 6);
    }

    #[test]
    fn empty_geometry_bakes_an_empty_mesh() {
        let output = BakePipeline::new()
            .bake(&config(), BakeOptions::default(), &InputGeometry::default())
            .unwrap();
        assert!(output.poly_mesh().vertices().is_empty());
        assert_eq!(output.poly_mesh().polygon_count(), 0);
    }

    #[test]
    fn invalid_cell_size_fails_heightfield_creation() {
        let (vertices, triangles) = floor();
        let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
        let config = BakeConfig {
            cell_size: 0.0,
            ..config()
        };
        let err = BakePipeline::new()
            .bake(&config, BakeOptions::default(), &geometry)
            .unwrap_err();
        assert!(matches!(err, BakeError::CreateHeightfield(_)), "{err}");
    }

    #[test]
    fn out_of_range_indices_fail_rasterization() {
        let (vertices, _) = floor();
        let triangles = [uvec3(0, 1, 7)];
        let geometry = InputGeometry::new_unchecked(&vertices, &triangles);
        let err = BakePipeline::new()
            .bake(&config(), BakeOptions::default(), &geometry)
            .unwrap_err();
        assert!(matches!(err, BakeError::Rasterize(_)), "{err}");
    }
}
