use glam::{U16Vec3, Vec3A};
use navbake_recast::{
    Aabb3d, AreaType, BuildContoursFlags, CompactHeightfield, CompactHeightfieldError,
    ContourError, ContourSet, DetailMeshError, DetailPolygonMesh, DetailTriangle, Heightfield,
    HeightfieldBuilder, HeightfieldBuilderError, NavmeshCreateParams, NavmeshDataError,
    PolyMeshError, PolygonMesh, RasterizationError, RegionError, SubMesh,
};
use thiserror::Error;

use crate::{DetailMeshView, InputGeometry, PolyMeshView, RecastBackend};

/// The [`RecastBackend`] implemented by [`navbake_recast`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

/// Errors reported by [`NativeBackend`].
#[derive(Error, Debug)]
pub enum NativeError {
    /// See [`HeightfieldBuilderError`].
    #[error(transparent)]
    Heightfield(#[from] HeightfieldBuilderError),
    /// See [`RasterizationError`].
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),
    /// See [`CompactHeightfieldError`].
    #[error(transparent)]
    CompactHeightfield(#[from] CompactHeightfieldError),
    /// See [`RegionError`].
    #[error(transparent)]
    Region(#[from] RegionError),
    /// See [`ContourError`].
    #[error(transparent)]
    Contour(#[from] ContourError),
    /// See [`PolyMeshError`].
    #[error(transparent)]
    PolyMesh(#[from] PolyMeshError),
    /// See [`DetailMeshError`].
    #[error(transparent)]
    DetailMesh(#[from] DetailMeshError),
    /// See [`NavmeshDataError`].
    #[error(transparent)]
    NavmeshData(#[from] NavmeshDataError),
}

impl RecastBackend for NativeBackend {
    type Heightfield = Heightfield;
    type CompactHeightfield = CompactHeightfield;
    type ContourSet = ContourSet;
    type PolyMesh = PolygonMesh;
    type DetailMesh = DetailPolygonMesh;
    type Error = NativeError;

    fn alloc_heightfield(&mut self) -> Result<Heightfield, NativeError> {
        Ok(Heightfield::default())
    }

    fn create_heightfield(
        &mut self,
        heightfield: &mut Heightfield,
        aabb: Aabb3d,
        cell_size: f32,
        cell_height: f32,
    ) -> Result<(), NativeError> {
        *heightfield = HeightfieldBuilder {
            aabb,
            cell_size,
            cell_height,
        }
        .build()?;
        Ok(())
    }

    fn mark_walkable_triangles(
        &mut self,
        walkable_slope_angle: f32,
        geometry: &InputGeometry,
        areas: &mut [AreaType],
    ) {
        navbake_recast::mark_walkable_triangles(
            walkable_slope_angle,
            geometry.vertices(),
            geometry.triangles(),
            areas,
        );
    }

    fn rasterize_triangles(
        &mut self,
        heightfield: &mut Heightfield,
        geometry: &InputGeometry,
        areas: &[AreaType],
        flag_merge_threshold: u16,
    ) -> Result<(), NativeError> {
        heightfield.rasterize_triangles(
            geometry.vertices(),
            geometry.triangles(),
            areas,
            flag_merge_threshold,
        )?;
        Ok(())
    }

    fn filter_low_hanging_walkable_obstacles(
        &mut self,
        heightfield: &mut Heightfield,
        walkable_climb: u16,
    ) {
        heightfield.filter_low_hanging_walkable_obstacles(walkable_climb);
    }

    fn filter_ledge_spans(
        &mut self,
        heightfield: &mut Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    ) {
        heightfield.filter_ledge_spans(walkable_height, walkable_climb);
    }

    fn filter_walkable_low_height_spans(
        &mut self,
        heightfield: &mut Heightfield,
        walkable_height: u16,
    ) {
        heightfield.filter_walkable_low_height_spans(walkable_height);
    }

    fn alloc_compact_heightfield(&mut self) -> Result<CompactHeightfield, NativeError> {
        Ok(CompactHeightfield::default())
    }

    fn build_compact_heightfield(
        &mut self,
        walkable_height: u16,
        walkable_climb: u16,
        heightfield: &Heightfield,
        compact_heightfield: &mut CompactHeightfield,
    ) -> Result<(), NativeError> {
        *compact_heightfield =
            CompactHeightfield::from_heightfield(heightfield, walkable_height, walkable_climb)?;
        Ok(())
    }

    fn erode_walkable_area(
        &mut self,
        walkable_radius: u16,
        compact_heightfield: &mut CompactHeightfield,
    ) {
        compact_heightfield.erode_walkable_area(walkable_radius);
    }

    fn build_layer_regions(
        &mut self,
        compact_heightfield: &mut CompactHeightfield,
        min_region_area: u16,
    ) -> Result<(), NativeError> {
        compact_heightfield.build_layer_regions(min_region_area)?;
        Ok(())
    }

    fn build_regions_monotone(
        &mut self,
        compact_heightfield: &mut CompactHeightfield,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), NativeError> {
        compact_heightfield.build_regions_monotone(min_region_area, merge_region_area)?;
        Ok(())
    }

    fn build_distance_field(
        &mut self,
        compact_heightfield: &mut CompactHeightfield,
    ) -> Result<(), NativeError> {
        compact_heightfield.build_distance_field();
        Ok(())
    }

    fn build_regions(
        &mut self,
        compact_heightfield: &mut CompactHeightfield,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), NativeError> {
        compact_heightfield.build_regions(min_region_area, merge_region_area)?;
        Ok(())
    }

    fn alloc_contour_set(&mut self) -> Result<ContourSet, NativeError> {
        Ok(ContourSet::default())
    }

    fn build_contours(
        &mut self,
        compact_heightfield: &CompactHeightfield,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
        contour_set: &mut ContourSet,
    ) -> Result<(), NativeError> {
        *contour_set = compact_heightfield.build_contours(max_error, max_edge_len, build_flags)?;
        Ok(())
    }

    fn alloc_poly_mesh(&mut self) -> Result<PolygonMesh, NativeError> {
        Ok(PolygonMesh::default())
    }

    fn build_poly_mesh(
        &mut self,
        contour_set: &ContourSet,
        max_vertices_per_polygon: u16,
        poly_mesh: &mut PolygonMesh,
    ) -> Result<(), NativeError> {
        *poly_mesh = PolygonMesh::from_contours(contour_set, max_vertices_per_polygon as usize)?;
        Ok(())
    }

    fn alloc_detail_mesh(&mut self) -> Result<DetailPolygonMesh, NativeError> {
        Ok(DetailPolygonMesh::default())
    }

    fn build_detail_mesh(
        &mut self,
        poly_mesh: &PolygonMesh,
        compact_heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
        detail_mesh: &mut DetailPolygonMesh,
    ) -> Result<(), NativeError> {
        *detail_mesh = DetailPolygonMesh::from_poly_mesh(
            poly_mesh,
            compact_heightfield,
            sample_distance,
            sample_max_error,
        )?;
        Ok(())
    }

    fn create_navmesh_data(&mut self, params: &NavmeshCreateParams) -> Result<Vec<u8>, NativeError> {
        Ok(navbake_recast::create_navmesh_data(params)?)
    }
}

impl PolyMeshView for PolygonMesh {
    fn vertices(&self) -> &[U16Vec3] {
        &self.vertices
    }

    fn polygons(&self) -> &[u16] {
        &self.polygons
    }

    fn areas(&self) -> &[AreaType] {
        &self.areas
    }

    fn flags(&self) -> &[u16] {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut [u16] {
        &mut self.flags
    }

    fn vertices_per_polygon(&self) -> usize {
        self.vertices_per_polygon
    }

    fn aabb(&self) -> Aabb3d {
        self.aabb
    }

    fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn cell_height(&self) -> f32 {
        self.cell_height
    }
}

impl DetailMeshView for DetailPolygonMesh {
    fn meshes(&self) -> &[SubMesh] {
        &self.meshes
    }

    fn vertices(&self) -> &[Vec3A] {
        &self.vertices
    }

    fn triangles(&self) -> &[DetailTriangle] {
        &self.triangles
    }
}
