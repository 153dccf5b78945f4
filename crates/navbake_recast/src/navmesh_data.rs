//! Serialization of a polygon mesh and its detail mesh into a self-contained navmesh tile
//! that a path query engine can load.

use glam::{U16Vec3, Vec3A};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Aabb3d,
    detail_mesh::{DetailTriangle, SubMesh},
    poly_mesh::RC_MESH_NULL_IDX,
    span::AreaType,
};

/// The maximum number of vertices per navigation polygon the query engine supports.
pub const DT_VERTS_PER_POLYGON: usize = 6;

/// The magic number at the start of every navmesh tile. The bytes `DNAV`.
pub const NAVMESH_MAGIC: u32 = u32::from_be_bytes(*b"DNAV");

/// The version of the navmesh tile layout.
pub const NAVMESH_VERSION: u32 = 1;

/// Everything needed to build a navmesh tile.
///
/// The arrays are borrowed from a [`PolygonMesh`](crate::PolygonMesh) and its
/// [`DetailPolygonMesh`](crate::DetailPolygonMesh). The detail arrays may be empty,
/// in which case every polygon is fan-triangulated.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Detour/Include/DetourNavMeshBuilder.h#L32>
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NavmeshCreateParams<'a> {
    /// The polygon mesh vertices in cell units.
    pub vertices: &'a [U16Vec3],
    /// Polygon and neighbour data, `2 * vertices_per_polygon` entries per polygon.
    pub polygons: &'a [u16],
    /// The user defined flags of each polygon.
    pub flags: &'a [u16],
    /// The area of each polygon.
    pub areas: &'a [AreaType],
    /// The number of vertex slots per polygon.
    pub vertices_per_polygon: usize,
    /// The detail sub-meshes, one per polygon.
    pub detail_meshes: &'a [SubMesh],
    /// The detail vertices in world space.
    pub detail_vertices: &'a [Vec3A],
    /// The detail triangles.
    pub detail_triangles: &'a [DetailTriangle],
    /// The agent height. `[Units: wu]`
    pub walkable_height: f32,
    /// The agent radius. `[Units: wu]`
    pub walkable_radius: f32,
    /// The agent maximum traversable ledge. `[Units: wu]`
    pub walkable_climb: f32,
    /// The bounds of the tile in world space.
    pub aabb: Aabb3d,
    /// The xz-plane cell size of the polygon mesh. `[Units: wu]`
    pub cell_size: f32,
    /// The y-axis cell height of the polygon mesh. `[Units: wu]`
    pub cell_height: f32,
    /// Whether a bounding volume tree should be built for the tile.
    pub build_bv_tree: bool,
}

/// A decoded navmesh tile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavmeshTile {
    /// The tile header
    pub header: TileHeader,
    /// The polygon vertices in world space
    pub vertices: Vec<[f32; 3]>,
    /// The polygons
    pub polys: Vec<TilePoly>,
    /// The detail sub-mesh of each polygon
    pub detail_meshes: Vec<PolyDetail>,
    /// The detail vertices that are not also polygon vertices, in world space
    pub detail_vertices: Vec<[f32; 3]>,
    /// The detail triangles as `[a, b, c, edge_flags]`.
    /// Indices below the polygon's vertex count refer to polygon vertices.
    pub detail_triangles: Vec<[u8; 4]>,
    /// The bounding volume tree, empty if none was requested
    pub bv_tree: Vec<BvNode>,
}

/// Describes a [`NavmeshTile`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileHeader {
    /// Always [`NAVMESH_MAGIC`]
    pub magic: u32,
    /// Always [`NAVMESH_VERSION`]
    pub version: u32,
    /// Number of polygons
    pub poly_count: u32,
    /// Number of polygon vertices
    pub vert_count: u32,
    /// Number of detail sub-meshes
    pub detail_mesh_count: u32,
    /// Number of unique detail vertices
    pub detail_vert_count: u32,
    /// Number of detail triangles
    pub detail_tri_count: u32,
    /// Number of bounding volume nodes
    pub bv_node_count: u32,
    /// The agent height
    pub walkable_height: f32,
    /// The agent radius
    pub walkable_radius: f32,
    /// The agent maximum climb
    pub walkable_climb: f32,
    /// The minimum bounds of the tile
    pub bmin: [f32; 3],
    /// The maximum bounds of the tile
    pub bmax: [f32; 3],
    /// The factor that converts world units to bounding volume quantized units
    pub bv_quant_factor: f32,
}

/// A polygon of a [`NavmeshTile`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TilePoly {
    /// Indices into [`NavmeshTile::vertices`], only the first `vertex_count` are valid
    pub vertices: [u16; DT_VERTS_PER_POLYGON],
    /// One plus the index of the polygon across each edge, 0 if the edge is solid
    pub neighbours: [u16; DT_VERTS_PER_POLYGON],
    /// The user defined flags
    pub flags: u16,
    /// The number of vertices
    pub vertex_count: u8,
    /// The area id
    pub area: u8,
}

/// The detail sub-mesh of a [`TilePoly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolyDetail {
    /// Index of the first unique vertex in [`NavmeshTile::detail_vertices`]
    pub vert_base: u32,
    /// Index of the first triangle in [`NavmeshTile::detail_triangles`]
    pub tri_base: u32,
    /// Number of unique vertices
    pub vert_count: u8,
    /// Number of triangles
    pub tri_count: u8,
}

/// A node of the bounding volume tree of a [`NavmeshTile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BvNode {
    /// Minimum quantized bounds
    pub bmin: [u16; 3],
    /// Maximum quantized bounds
    pub bmax: [u16; 3],
    /// The polygon index for leaves, the negated escape offset for internal nodes
    pub i: i32,
}

impl NavmeshTile {
    /// Decodes a tile produced by [`create_navmesh_data`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a tile of the supported version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NavmeshDataError> {
        let (tile, _): (NavmeshTile, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if tile.header.magic != NAVMESH_MAGIC {
            return Err(NavmeshDataError::WrongMagic(tile.header.magic));
        }
        if tile.header.version != NAVMESH_VERSION {
            return Err(NavmeshDataError::WrongVersion(tile.header.version));
        }
        Ok(tile)
    }

    /// Encodes the tile.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NavmeshDataError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }
}

/// Builds navmesh tile data from the provided parameters.
///
/// # Errors
///
/// Returns an error if the polygons have more than [`DT_VERTS_PER_POLYGON`] vertex slots,
/// the mesh is empty or has too many vertices, or encoding fails.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Detour/Source/DetourNavMeshBuilder.cpp#L251>
pub fn create_navmesh_data(params: &NavmeshCreateParams) -> Result<Vec<u8>, NavmeshDataError> {
    let nvp = params.vertices_per_polygon;
    if nvp > DT_VERTS_PER_POLYGON {
        return Err(NavmeshDataError::TooManyVerticesPerPolygon {
            vertices_per_polygon: nvp,
            max: DT_VERTS_PER_POLYGON,
        });
    }
    if params.vertices.len() >= RC_MESH_NULL_IDX as usize {
        return Err(NavmeshDataError::TooManyVertices(params.vertices.len()));
    }
    if params.vertices.is_empty() {
        return Err(NavmeshDataError::NoVertices);
    }
    let poly_count = params.areas.len();
    if poly_count == 0 || params.polygons.len() < poly_count * 2 * nvp {
        return Err(NavmeshDataError::NoPolygons);
    }
    let has_detail = !params.detail_meshes.is_empty();
    if has_detail && params.detail_meshes.len() != poly_count {
        return Err(NavmeshDataError::DetailMeshMismatch {
            poly_count,
            detail_mesh_count: params.detail_meshes.len(),
        });
    }

    let orig = params.aabb.min;
    let scale = Vec3A::new(params.cell_size, params.cell_height, params.cell_size);
    let vertices: Vec<[f32; 3]> = params
        .vertices
        .iter()
        .map(|v| (orig + Vec3A::from(v.as_vec3()) * scale).to_array())
        .collect();

    let polys: Vec<TilePoly> = (0..poly_count)
        .map(|i| {
            let src = &params.polygons[i * 2 * nvp..(i + 1) * 2 * nvp];
            let mut poly = TilePoly {
                flags: params.flags.get(i).copied().unwrap_or_default(),
                area: params.areas[i].0,
                ..Default::default()
            };
            for (j, &vertex) in src[..nvp].iter().enumerate() {
                if vertex == RC_MESH_NULL_IDX {
                    break;
                }
                poly.vertices[j] = vertex;
                poly.neighbours[j] = match src[nvp + j] {
                    RC_MESH_NULL_IDX => 0,
                    neighbour => neighbour + 1,
                };
                poly.vertex_count += 1;
            }
            poly
        })
        .collect();

    let mut detail_meshes = Vec::with_capacity(poly_count);
    let mut detail_vertices = Vec::new();
    let mut detail_triangles = Vec::new();
    for (i, poly) in polys.iter().enumerate() {
        let nv = poly.vertex_count as u32;
        let vert_base = detail_vertices.len() as u32;
        let tri_base = detail_triangles.len() as u32;
        if has_detail {
            let sub = params.detail_meshes[i];
            // The polygon vertices are stored once, only keep the extra detail vertices.
            let extra = sub.base_vertex_index + nv..sub.base_vertex_index + sub.vertex_count;
            detail_vertices.extend(
                params.detail_vertices[extra.start as usize..extra.end as usize]
                    .iter()
                    .map(|v| v.to_array()),
            );
            let tris = sub.base_triangle_index..sub.base_triangle_index + sub.triangle_count;
            detail_triangles.extend(
                params.detail_triangles[tris.start as usize..tris.end as usize]
                    .iter()
                    .map(|t| [t.indices[0], t.indices[1], t.indices[2], t.edge_flags]),
            );
        } else {
            // Create dummy detail mesh by triangulating polys.
            let nv = nv as u8;
            for j in 2..nv {
                let mut edge_flags = DetailTriangle::EDGE_BOUNDARY << 2;
                if j == 2 {
                    edge_flags |= DetailTriangle::EDGE_BOUNDARY;
                }
                if j == nv - 1 {
                    edge_flags |= DetailTriangle::EDGE_BOUNDARY << 4;
                }
                detail_triangles.push([0, j - 1, j, edge_flags]);
            }
        }
        detail_meshes.push(PolyDetail {
            vert_base,
            tri_base,
            vert_count: (detail_vertices.len() as u32 - vert_base) as u8,
            tri_count: (detail_triangles.len() as u32 - tri_base) as u8,
        });
    }

    let bv_tree = if params.build_bv_tree {
        build_bv_tree(params, &polys)
    } else {
        Vec::new()
    };

    let tile = NavmeshTile {
        header: TileHeader {
            magic: NAVMESH_MAGIC,
            version: NAVMESH_VERSION,
            poly_count: polys.len() as u32,
            vert_count: vertices.len() as u32,
            detail_mesh_count: detail_meshes.len() as u32,
            detail_vert_count: detail_vertices.len() as u32,
            detail_tri_count: detail_triangles.len() as u32,
            bv_node_count: bv_tree.len() as u32,
            walkable_height: params.walkable_height,
            walkable_radius: params.walkable_radius,
            walkable_climb: params.walkable_climb,
            bmin: params.aabb.min.to_array(),
            bmax: params.aabb.max.to_array(),
            bv_quant_factor: 1.0 / params.cell_size,
        },
        vertices,
        polys,
        detail_meshes,
        detail_vertices,
        detail_triangles,
        bv_tree,
    };
    tile.to_bytes()
}

#[derive(Debug, Clone, Copy)]
struct BvItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    i: i32,
}

fn build_bv_tree(params: &NavmeshCreateParams, polys: &[TilePoly]) -> Vec<BvNode> {
    let quant_factor = 1.0 / params.cell_size;
    let quantize = |value: f32, origin: f32| ((value - origin) * quant_factor).clamp(0.0, 65535.0) as u16;

    let mut items: Vec<BvItem> = polys
        .iter()
        .enumerate()
        .map(|(i, poly)| {
            // Calc polygon bounds. Use detail meshes if available.
            if let Some(sub) = params.detail_meshes.get(i) {
                let start = sub.base_vertex_index as usize;
                let verts = &params.detail_vertices[start..start + sub.vertex_count as usize];
                let min = verts.iter().copied().fold(Vec3A::MAX, Vec3A::min);
                let max = verts.iter().copied().fold(Vec3A::MIN, Vec3A::max);
                // BV-tree uses cs for all dimensions
                let origin = params.aabb.min;
                BvItem {
                    bmin: [0, 1, 2].map(|axis| quantize(min[axis], origin[axis])),
                    bmax: [0, 1, 2].map(|axis| quantize(max[axis], origin[axis])),
                    i: i as i32,
                }
            } else {
                let verts = || {
                    poly.vertices[..poly.vertex_count as usize]
                        .iter()
                        .map(|&v| params.vertices[v as usize])
                };
                let min = verts().fold(U16Vec3::MAX, U16Vec3::min);
                let max = verts().fold(U16Vec3::MIN, U16Vec3::max);
                // Remap y
                let remap = params.cell_height / params.cell_size;
                BvItem {
                    bmin: [min.x, (min.y as f32 * remap).floor() as u16, min.z],
                    bmax: [max.x, (max.y as f32 * remap).ceil() as u16, max.z],
                    i: i as i32,
                }
            }
        })
        .collect();

    let mut nodes = Vec::with_capacity(items.len() * 2);
    let item_count = items.len();
    subdivide(&mut items, 0, item_count, &mut nodes);
    nodes
}

fn subdivide(items: &mut [BvItem], imin: usize, imax: usize, nodes: &mut Vec<BvNode>) {
    let inum = imax - imin;
    let icur = nodes.len();
    nodes.push(BvNode::default());

    if inum == 1 {
        // Leaf
        let item = items[imin];
        nodes[icur] = BvNode {
            bmin: item.bmin,
            bmax: item.bmax,
            i: item.i,
        };
        return;
    }

    // Split
    let range = &mut items[imin..imax];
    let mut bmin = range[0].bmin;
    let mut bmax = range[0].bmax;
    for item in range.iter().skip(1) {
        for axis in 0..3 {
            bmin[axis] = bmin[axis].min(item.bmin[axis]);
            bmax[axis] = bmax[axis].max(item.bmax[axis]);
        }
    }
    let extent = [0, 1, 2].map(|axis| bmax[axis] - bmin[axis]);
    let mut axis = 0;
    if extent[1] > extent[axis] {
        axis = 1;
    }
    if extent[2] > extent[axis] {
        axis = 2;
    }
    range.sort_by_key(|item| item.bmin[axis]);

    let isplit = imin + inum / 2;
    // Left
    subdivide(items, imin, isplit, nodes);
    // Right
    subdivide(items, isplit, imax, nodes);

    // Negative index means escape.
    let iescape = (nodes.len() - icur) as i32;
    nodes[icur] = BvNode {
        bmin,
        bmax,
        i: -iescape,
    };
}

/// Errors that can occur when building or decoding navmesh tile data.
#[derive(Error, Debug)]
pub enum NavmeshDataError {
    /// The polygons have more vertex slots than the query engine supports.
    #[error("Polygons have {vertices_per_polygon} vertices, but at most {max} are supported")]
    TooManyVerticesPerPolygon {
        /// The number of vertex slots per polygon
        vertices_per_polygon: usize,
        /// The supported maximum
        max: usize,
    },
    /// The mesh has more vertices than a `u16` index can address.
    #[error("Too many vertices: {0}")]
    TooManyVertices(usize),
    /// The mesh has no vertices.
    #[error("The mesh has no vertices")]
    NoVertices,
    /// The mesh has no polygons.
    #[error("The mesh has no polygons")]
    NoPolygons,
    /// The number of detail sub-meshes does not match the number of polygons.
    #[error("Expected {poly_count} detail meshes, got {detail_mesh_count}")]
    DetailMeshMismatch {
        /// The number of polygons
        poly_count: usize,
        /// The number of detail sub-meshes
        detail_mesh_count: usize,
    },
    /// Encoding the tile failed.
    #[error("Failed to encode navmesh tile: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// Decoding the tile failed.
    #[error("Failed to decode navmesh tile: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    /// The data does not start with [`NAVMESH_MAGIC`].
    #[error("Wrong navmesh magic number: {0:#x}")]
    WrongMagic(u32),
    /// The data has an unsupported version.
    #[error("Unsupported navmesh version: {0}")]
    WrongVersion(u32),
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::u16vec3;

    use super::*;

    const NULL: u16 = RC_MESH_NULL_IDX;

    struct Fixture {
        vertices: Vec<U16Vec3>,
        polygons: Vec<u16>,
        flags: Vec<u16>,
        areas: Vec<AreaType>,
    }

    /// Two quads side by side, sharing the edge at x = 4.
    fn fixture() -> Fixture {
        Fixture {
            vertices: vec![
                u16vec3(0, 0, 0),
                u16vec3(0, 0, 4),
                u16vec3(4, 0, 4),
                u16vec3(4, 0, 0),
                u16vec3(8, 0, 4),
                u16vec3(8, 0, 0),
            ],
            polygons: vec![
                0, 1, 2, 3, NULL, NULL, NULL, NULL, 1, NULL, NULL, NULL, //
                3, 2, 4, 5, NULL, NULL, 0, NULL, NULL, NULL, NULL, NULL,
            ],
            flags: vec![1, 1],
            areas: vec![AreaType::DEFAULT_WALKABLE; 2],
        }
    }

    fn params(fixture: &Fixture) -> NavmeshCreateParams<'_> {
        NavmeshCreateParams {
            vertices: &fixture.vertices,
            polygons: &fixture.polygons,
            flags: &fixture.flags,
            areas: &fixture.areas,
            vertices_per_polygon: 6,
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.4,
            aabb: Aabb3d::new([-1.0, -1.0, -1.0], [3.0, 1.0, 1.0]),
            cell_size: 0.5,
            cell_height: 0.2,
            build_bv_tree: true,
            ..Default::default()
        }
    }

    #[test]
    fn tile_decodes_to_the_input_mesh() {
        let fixture = fixture();
        let bytes = create_navmesh_data(&params(&fixture)).unwrap();
        let tile = NavmeshTile::from_bytes(&bytes).unwrap();

        assert_eq!(tile.header.magic, NAVMESH_MAGIC);
        assert_eq!(tile.header.poly_count, 2);
        assert_eq!(tile.header.vert_count, 6);
        assert_relative_eq!(tile.header.walkable_climb, 0.4);
        assert_relative_eq!(tile.header.bv_quant_factor, 2.0);
        assert_eq!(tile.vertices[2], [1.0, -1.0, 1.0]);

        assert_eq!(tile.polys[0].vertex_count, 4);
        assert_eq!(tile.polys[0].vertices[..4], [0, 1, 2, 3]);
        // Neighbour indices are stored off by one, zero means solid.
        assert_eq!(tile.polys[0].neighbours[..4], [0, 0, 2, 0]);
        assert_eq!(tile.polys[1].neighbours[..4], [1, 0, 0, 0]);
        assert_eq!(tile.polys[1].flags, 1);
        assert_eq!(tile.polys[1].area, AreaType::DEFAULT_WALKABLE.0);
    }

    #[test]
    fn missing_detail_meshes_are_fanned() {
        let fixture = fixture();
        let tile = NavmeshTile::from_bytes(&create_navmesh_data(&params(&fixture)).unwrap()).unwrap();
        assert_eq!(tile.detail_meshes.len(), 2);
        assert!(tile.detail_vertices.is_empty());
        assert_eq!(tile.detail_triangles.len(), 4);
        assert_eq!(tile.detail_meshes[1].tri_base, 2);
        assert_eq!(tile.detail_triangles[0], [0, 1, 2, 0b0101]);
        assert_eq!(tile.detail_triangles[1], [0, 2, 3, 0b01_0100]);
    }

    #[test]
    fn bv_tree_has_one_leaf_per_polygon() {
        let fixture = fixture();
        let tile = NavmeshTile::from_bytes(&create_navmesh_data(&params(&fixture)).unwrap()).unwrap();
        assert_eq!(tile.bv_tree.len(), 3);
        // The root escapes past the whole tree.
        assert_eq!(tile.bv_tree[0].i, -3);
        let mut leaves: Vec<_> = tile.bv_tree[1..].iter().map(|node| node.i).collect();
        leaves.sort();
        assert_eq!(leaves, vec![0, 1]);
        assert_eq!(tile.bv_tree[0].bmin, [0, 0, 0]);
        assert_eq!(tile.bv_tree[0].bmax, [8, 0, 4]);
    }

    #[test]
    fn rejects_too_many_vertices_per_polygon() {
        let fixture = fixture();
        let params = NavmeshCreateParams {
            vertices_per_polygon: 8,
            ..params(&fixture)
        };
        assert!(matches!(
            create_navmesh_data(&params),
            Err(NavmeshDataError::TooManyVerticesPerPolygon { vertices_per_polygon: 8, max: 6 })
        ));
    }

    #[test]
    fn rejects_empty_meshes() {
        assert!(matches!(
            create_navmesh_data(&NavmeshCreateParams::default()),
            Err(NavmeshDataError::NoVertices)
        ));
    }

    #[test]
    fn rejects_foreign_bytes() {
        let tile = NavmeshTile {
            header: TileHeader {
                magic: 0xdead_beef,
                version: NAVMESH_VERSION,
                ..Default::default()
            },
            ..Default::default()
        };
        let bytes = tile.to_bytes().unwrap();
        assert!(matches!(
            NavmeshTile::from_bytes(&bytes),
            Err(NavmeshDataError::WrongMagic(0xdead_beef))
        ));
    }
}
