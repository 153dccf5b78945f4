//! The contract between [`BakePipeline`](crate::BakePipeline) and the stage functions it drives.

use std::{
    fmt,
    ops::{Deref, DerefMut},
};

use glam::{U16Vec3, Vec3A};
use navbake_recast::{
    Aabb3d, AreaType, BuildContoursFlags, DetailTriangle, NavmeshCreateParams, SubMesh,
};
use tracing::trace;

use crate::InputGeometry;

/// Implements the stages of a bake.
///
/// Each intermediate structure is allocated empty by an `alloc_*` method and filled in by the
/// matching `build_*` method. Dropping a structure releases it.
/// The pipeline never touches the structures directly, apart from the read access that
/// [`PolyMeshView`] and [`DetailMeshView`] grant on its results.
pub trait RecastBackend {
    /// The voxel field triangles are rasterized into.
    type Heightfield;
    /// The open-space field regions are built on.
    type CompactHeightfield;
    /// The traced region outlines.
    type ContourSet;
    /// The convex polygon mesh.
    type PolyMesh: PolyMeshView;
    /// The per-polygon height detail.
    type DetailMesh: DetailMeshView;
    /// The error every fallible stage reports.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Allocates an empty heightfield.
    fn alloc_heightfield(&mut self) -> Result<Self::Heightfield, Self::Error>;

    /// Initializes `heightfield` with a grid covering `aabb`.
    fn create_heightfield(
        &mut self,
        heightfield: &mut Self::Heightfield,
        aabb: Aabb3d,
        cell_size: f32,
        cell_height: f32,
    ) -> Result<(), Self::Error>;

    /// Marks the triangles flatter than `walkable_slope_angle` as walkable in `areas`.
    fn mark_walkable_triangles(
        &mut self,
        walkable_slope_angle: f32,
        geometry: &InputGeometry,
        areas: &mut [AreaType],
    );

    /// Rasterizes every triangle of `geometry` with its area into `heightfield`.
    fn rasterize_triangles(
        &mut self,
        heightfield: &mut Self::Heightfield,
        geometry: &InputGeometry,
        areas: &[AreaType],
        flag_merge_threshold: u16,
    ) -> Result<(), Self::Error>;

    /// Marks non-walkable spans as walkable if they sit at most `walkable_climb` below a walkable span.
    fn filter_low_hanging_walkable_obstacles(
        &mut self,
        heightfield: &mut Self::Heightfield,
        walkable_climb: u16,
    );

    /// Marks spans that are ledges as not walkable.
    fn filter_ledge_spans(
        &mut self,
        heightfield: &mut Self::Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    );

    /// Marks walkable spans with too little clearance above them as not walkable.
    fn filter_walkable_low_height_spans(
        &mut self,
        heightfield: &mut Self::Heightfield,
        walkable_height: u16,
    );

    /// Allocates an empty compact heightfield.
    fn alloc_compact_heightfield(&mut self) -> Result<Self::CompactHeightfield, Self::Error>;

    /// Fills `compact_heightfield` with the walkable spans of `heightfield`.
    fn build_compact_heightfield(
        &mut self,
        walkable_height: u16,
        walkable_climb: u16,
        heightfield: &Self::Heightfield,
        compact_heightfield: &mut Self::CompactHeightfield,
    ) -> Result<(), Self::Error>;

    /// Shrinks the walkable area by `walkable_radius`.
    fn erode_walkable_area(
        &mut self,
        walkable_radius: u16,
        compact_heightfield: &mut Self::CompactHeightfield,
    );

    /// Partitions into non-overlapping layers.
    fn build_layer_regions(
        &mut self,
        compact_heightfield: &mut Self::CompactHeightfield,
        min_region_area: u16,
    ) -> Result<(), Self::Error>;

    /// Partitions into monotone regions.
    fn build_regions_monotone(
        &mut self,
        compact_heightfield: &mut Self::CompactHeightfield,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), Self::Error>;

    /// Computes the distance of every span to the nearest boundary.
    fn build_distance_field(
        &mut self,
        compact_heightfield: &mut Self::CompactHeightfield,
    ) -> Result<(), Self::Error>;

    /// Partitions with watershed flooding. Requires [`RecastBackend::build_distance_field`] to have run.
    fn build_regions(
        &mut self,
        compact_heightfield: &mut Self::CompactHeightfield,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), Self::Error>;

    /// Allocates an empty contour set.
    fn alloc_contour_set(&mut self) -> Result<Self::ContourSet, Self::Error>;

    /// Traces and simplifies the outline of every region.
    fn build_contours(
        &mut self,
        compact_heightfield: &Self::CompactHeightfield,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
        contour_set: &mut Self::ContourSet,
    ) -> Result<(), Self::Error>;

    /// Allocates an empty polygon mesh.
    fn alloc_poly_mesh(&mut self) -> Result<Self::PolyMesh, Self::Error>;

    /// Builds convex polygons with at most `max_vertices_per_polygon` vertices from the contours.
    fn build_poly_mesh(
        &mut self,
        contour_set: &Self::ContourSet,
        max_vertices_per_polygon: u16,
        poly_mesh: &mut Self::PolyMesh,
    ) -> Result<(), Self::Error>;

    /// Allocates an empty detail mesh.
    fn alloc_detail_mesh(&mut self) -> Result<Self::DetailMesh, Self::Error>;

    /// Builds the height detail of every polygon.
    fn build_detail_mesh(
        &mut self,
        poly_mesh: &Self::PolyMesh,
        compact_heightfield: &Self::CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
        detail_mesh: &mut Self::DetailMesh,
    ) -> Result<(), Self::Error>;

    /// Serializes a navmesh tile.
    fn create_navmesh_data(&mut self, params: &NavmeshCreateParams)
    -> Result<Vec<u8>, Self::Error>;
}

/// Read access to a polygon mesh.
pub trait PolyMeshView {
    /// The vertices in cell units, relative to [`PolyMeshView::aabb`].
    fn vertices(&self) -> &[U16Vec3];
    /// Vertex indices and neighbour links, `2 * vertices_per_polygon` entries per polygon.
    /// Unused slots hold [`navbake_recast::RC_MESH_NULL_IDX`].
    fn polygons(&self) -> &[u16];
    /// The area of each polygon.
    fn areas(&self) -> &[AreaType];
    /// The user flags of each polygon.
    fn flags(&self) -> &[u16];
    /// Mutable access to the user flags of each polygon.
    fn flags_mut(&mut self) -> &mut [u16];
    /// The number of vertex slots per polygon.
    fn vertices_per_polygon(&self) -> usize;
    /// The bounds of the mesh in world space.
    fn aabb(&self) -> Aabb3d;
    /// The xz-plane cell size. `[Units: wu]`
    fn cell_size(&self) -> f32;
    /// The y-axis cell height. `[Units: wu]`
    fn cell_height(&self) -> f32;

    /// The number of polygons.
    fn polygon_count(&self) -> usize {
        self.areas().len()
    }

    /// The vertex slots of polygon `index`.
    fn polygon_vertices(&self, index: usize) -> &[u16] {
        let nvp = self.vertices_per_polygon();
        &self.polygons()[index * 2 * nvp..][..nvp]
    }
}

/// Read access to a detail mesh.
pub trait DetailMeshView {
    /// One sub-mesh per polygon.
    fn meshes(&self) -> &[SubMesh];
    /// The vertices in world space.
    fn vertices(&self) -> &[Vec3A];
    /// The triangles, indexed relative to their sub-mesh.
    fn triangles(&self) -> &[DetailTriangle];
}

/// Names the intermediate structures of a bake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The per-triangle area buffer.
    TriangleAreas,
    /// See [`RecastBackend::Heightfield`].
    Heightfield,
    /// See [`RecastBackend::CompactHeightfield`].
    CompactHeightfield,
    /// See [`RecastBackend::ContourSet`].
    ContourSet,
    /// See [`RecastBackend::PolyMesh`].
    PolyMesh,
    /// See [`RecastBackend::DetailMesh`].
    DetailMesh,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::TriangleAreas => "triangle areas",
            Stage::Heightfield => "heightfield",
            Stage::CompactHeightfield => "compact heightfield",
            Stage::ContourSet => "contour set",
            Stage::PolyMesh => "polygon mesh",
            Stage::DetailMesh => "detail mesh",
        })
    }
}

/// A structure held by the pipeline, released when dropped.
pub struct StageResource<T> {
    stage: Stage,
    resource: T,
}

impl<T> StageResource<T> {
    pub(crate) fn new(stage: Stage, resource: T) -> Self {
        trace!(%stage, "Allocated");
        Self { stage, resource }
    }

    /// The stage this resource belongs to.
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

impl<T> Deref for StageResource<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T> DerefMut for StageResource<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.resource
    }
}

impl<T> Drop for StageResource<T> {
    fn drop(&mut self) {
        trace!(stage = %self.stage, "Released");
    }
}

impl<T: fmt::Debug> fmt::Debug for StageResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageResource")
            .field("stage", &self.stage)
            .field("resource", &self.resource)
            .finish()
    }
}
