#![doc = include_str!("../../../readme.md")]

mod compact_cell;
mod compact_heightfield;
mod compact_span;
mod contours;
mod detail_mesh;
mod distance_field;
mod erosion;
mod heightfield;
pub(crate) mod math;
mod navmesh_data;
mod poly_mesh;
mod pre_filter;
mod rasterize;
mod region;
mod span;
mod sweep_regions;
mod trimesh;
mod watershed;

pub use compact_cell::CompactCell;
pub use compact_heightfield::{CompactHeightfield, CompactHeightfieldError};
pub use compact_span::CompactSpan;
pub use contours::{
    BuildContoursFlags, Contour, ContourError, ContourSet, ContourVertex, RegionVertexId,
};
pub use detail_mesh::{DetailMeshError, DetailPolygonMesh, DetailTriangle, SubMesh};
pub use heightfield::{Heightfield, HeightfieldBuilder, HeightfieldBuilderError};
pub use math::Aabb3d;
pub use navmesh_data::{
    BvNode, DT_VERTS_PER_POLYGON, NAVMESH_MAGIC, NAVMESH_VERSION, NavmeshCreateParams,
    NavmeshDataError, NavmeshTile, PolyDetail, TileHeader, TilePoly, create_navmesh_data,
};
pub use poly_mesh::{PolyMeshError, PolygonMesh, RC_MESH_NULL_IDX};
pub use rasterize::RasterizationError;
pub use region::{RegionError, RegionId};
pub use span::{AreaType, Span, SpanKey, Spans};
pub use trimesh::{compute_aabb, mark_walkable_triangles};
