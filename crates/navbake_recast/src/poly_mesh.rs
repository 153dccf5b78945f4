use std::collections::HashMap;

use glam::{IVec3, U16Vec3};
use thiserror::Error;
use tracing::warn;

use crate::{
    Aabb3d,
    contours::{ContourSet, ContourVertex},
    math::{intersect, intersect_prop, left, left_on, next, prev, vequal},
    region::RegionId,
    span::AreaType,
};

/// The value used to mark unused polygon vertex slots and missing neighbours.
pub const RC_MESH_NULL_IDX: u16 = u16::MAX;

/// Represents a polygon mesh suitable for use in building a navigation mesh.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Include/Recast.h#L618>
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolygonMesh {
    /// The mesh vertices in cell units.
    pub vertices: Vec<U16Vec3>,
    /// Polygon and neighbor data. [Length: `polygon_count() * 2 * vertices_per_polygon`]
    ///
    /// Each polygon occupies `2 * vertices_per_polygon` slots: first the vertex indices,
    /// padded with [`RC_MESH_NULL_IDX`], then the index of the neighbouring polygon across each edge.
    pub polygons: Vec<u16>,
    /// The region id assigned to each polygon.
    pub regions: Vec<RegionId>,
    /// The flags assigned to each polygon.
    pub flags: Vec<u16>,
    /// The area id assigned to each polygon.
    pub areas: Vec<AreaType>,
    /// The maximum number of vertices per polygon
    pub vertices_per_polygon: usize,
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The AABB border size used to generate the source data from which the mesh was derived.
    pub border_size: u16,
    /// The max error of the polygon edges in the mesh.
    pub max_edge_error: f32,
}

impl PolygonMesh {
    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.areas.len()
    }

    /// The vertex index slots of polygon `index`, including trailing [`RC_MESH_NULL_IDX`] entries.
    #[inline]
    pub fn polygon_vertices(&self, index: usize) -> &[u16] {
        let start = index * 2 * self.vertices_per_polygon;
        &self.polygons[start..start + self.vertices_per_polygon]
    }

    /// The neighbour slots of polygon `index`, one per edge.
    #[inline]
    pub fn polygon_neighbors(&self, index: usize) -> &[u16] {
        let start = (index * 2 + 1) * self.vertices_per_polygon;
        &self.polygons[start..start + self.vertices_per_polygon]
    }

    /// Builds a polygon mesh from the provided contours.
    ///
    /// Contours are triangulated and the triangles are greedily merged into convex polygons
    /// of at most `max_vertices_per_polygon` vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_vertices_per_polygon` is less than 3 or the mesh would contain
    /// more vertices or polygons than a `u16` index can address.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastMesh.cpp#L994>
    pub fn from_contours(
        contours: &ContourSet,
        max_vertices_per_polygon: usize,
    ) -> Result<Self, PolyMeshError> {
        let nvp = max_vertices_per_polygon;
        if nvp < 3 {
            return Err(PolyMeshError::InvalidVerticesPerPolygon(nvp));
        }
        let mut mesh = PolygonMesh {
            vertices_per_polygon: nvp,
            aabb: contours.aabb,
            cell_size: contours.cell_size,
            cell_height: contours.cell_height,
            border_size: contours.border_size,
            max_edge_error: contours.max_error,
            ..Default::default()
        };

        let usable = || contours.contours.iter().filter(|c| c.vertices.len() >= 3);
        let max_vertices: usize = usable().map(|c| c.vertices.len()).sum();
        let max_triangles: usize = usable().map(|c| c.vertices.len() - 2).sum();
        if max_vertices >= 0xfffe {
            return Err(PolyMeshError::TooManyVertices(max_vertices));
        }

        mesh.vertices.reserve(max_vertices);
        mesh.polygons.reserve(max_triangles * nvp * 2);
        let mut vertex_buckets: HashMap<(u16, u16), Vec<u16>> = HashMap::new();
        let mut triangles = Vec::new();
        let mut polys: Vec<Vec<u16>> = Vec::new();

        for (contour_index, contour) in usable().enumerate() {
            // Triangulate contour
            if !triangulate(&contour.vertices, &mut triangles) {
                // Bad triangulation, should not happen.
                warn!("Bad triangulation of contour {contour_index}.");
            }

            // Add and merge vertices.
            let indices: Vec<u16> = contour
                .vertices
                .iter()
                .map(|v| add_vertex(v.position, &mut mesh.vertices, &mut vertex_buckets))
                .collect();

            // Build initial polygons.
            polys.clear();
            for &t in &triangles {
                let [a, b, c] = t.map(|i| indices[i]);
                if a != b && a != c && b != c {
                    polys.push(vec![a, b, c]);
                }
            }
            if polys.is_empty() {
                continue;
            }

            // Merge polygons.
            if nvp > 3 {
                merge_polygons(&mut polys, &mesh.vertices, nvp);
            }

            // Store polygons.
            for poly in &polys {
                mesh.polygons.extend(poly.iter().copied());
                mesh.polygons
                    .extend(std::iter::repeat_n(RC_MESH_NULL_IDX, 2 * nvp - poly.len()));
                mesh.regions.push(contour.region);
                mesh.areas.push(contour.area);
                if mesh.areas.len() > max_triangles {
                    return Err(PolyMeshError::TooManyPolygons {
                        count: mesh.areas.len(),
                        max: max_triangles,
                    });
                }
            }
        }

        // Calculate adjacency.
        build_mesh_adjacency(&mut mesh.polygons, mesh.vertices.len(), nvp);

        // Just allocate the mesh flags array. The user is responsible to fill it.
        mesh.flags = vec![0; mesh.polygon_count()];

        if mesh.polygon_count() > RC_MESH_NULL_IDX as usize {
            return Err(PolyMeshError::TooManyPolygons {
                count: mesh.polygon_count(),
                max: RC_MESH_NULL_IDX as usize,
            });
        }
        Ok(mesh)
    }
}

/// Errors that can occur when building a [`PolygonMesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolyMeshError {
    /// Polygons need at least 3 vertices.
    #[error("Polygons need at least 3 vertices, but {0} were requested")]
    InvalidVerticesPerPolygon(usize),
    /// The contours contain more vertices than a `u16` index can address.
    #[error("Too many vertices: {0}")]
    TooManyVertices(usize),
    /// More polygons were generated than can be stored.
    #[error("Too many polygons: {count} (max: {max})")]
    TooManyPolygons {
        /// The number of polygons generated
        count: usize,
        /// The maximum number of polygons
        max: usize,
    },
}

/// Welds vertices that share an xz-position and lie within two cells of each other vertically.
fn add_vertex(
    position: IVec3,
    vertices: &mut Vec<U16Vec3>,
    buckets: &mut HashMap<(u16, u16), Vec<u16>>,
) -> u16 {
    let position = position.as_u16vec3();
    let bucket = buckets.entry((position.x, position.z)).or_default();
    if let Some(&existing) = bucket
        .iter()
        .find(|&&i| vertices[i as usize].y.abs_diff(position.y) <= 2)
    {
        return existing;
    }
    let index = vertices.len() as u16;
    vertices.push(position);
    bucket.push(index);
    index
}

/// Ear-clips the contour into triangles of contour vertex indices.
/// Returns `false` if the contour is too messed up to be triangulated completely.
fn triangulate(verts: &[ContourVertex], triangles: &mut Vec<[usize; 3]>) -> bool {
    triangles.clear();
    let pos = |i: usize| verts[i].position;
    let mut indices: Vec<usize> = (0..verts.len()).collect();
    let mut removable = vec![false; verts.len()];

    // Flag the vertices that can be removed by clipping the ear they form.
    let n = indices.len();
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, &indices, verts) {
            removable[i1] = true;
        }
    }

    while indices.len() > 3 {
        let n = indices.len();
        let shortest = |candidates: &dyn Fn(usize) -> bool| {
            (0..n)
                .filter(|&i| candidates(i))
                .min_by_key(|&i| {
                    let p0 = pos(indices[i]);
                    let p2 = pos(indices[next(next(i, n), n)]);
                    let d = p2 - p0;
                    d.x as i64 * d.x as i64 + d.z as i64 * d.z as i64
                })
        };

        let mini = shortest(&|i| removable[next(i, n)]).or_else(|| {
            // We might get here because the contour has overlapping segments.
            // Try to recover by loosening up the in-cone test a bit so that a diagonal
            // can be found and we can continue.
            shortest(&|i| diagonal_loose(i, next(next(i, n), n), &indices, verts))
        });
        let Some(i) = mini else {
            // The contour is messed up. This sometimes happens
            // if the contour simplification is too aggressive.
            return false;
        };

        let i1 = next(i, n);
        let i2 = next(i1, n);
        triangles.push([indices[i], indices[i1], indices[i2]]);

        // Removes P[i1] by copying P[i+1]...P[n-1] left one index.
        indices.remove(i1);
        removable.remove(i1);
        let n = indices.len();
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);

        // Update diagonal flags.
        removable[i] = diagonal(prev(i, n), i1, &indices, verts);
        removable[i1] = diagonal(i, next(i1, n), &indices, verts);
    }

    // Append the remaining triangle.
    if let [a, b, c] = indices[..] {
        triangles.push([a, b, c]);
    }
    true
}

fn diagonal(i: usize, j: usize, indices: &[usize], verts: &[ContourVertex]) -> bool {
    in_cone(i, j, indices, verts, false) && diagonalie(i, j, indices, verts, false)
}

fn diagonal_loose(i: usize, j: usize, indices: &[usize], verts: &[ContourVertex]) -> bool {
    in_cone(i, j, indices, verts, true) && diagonalie(i, j, indices, verts, true)
}

/// Returns whether the diagonal `(i, j)` lies strictly inside the polygon in the neighbourhood of `i`.
fn in_cone(i: usize, j: usize, indices: &[usize], verts: &[ContourVertex], loose: bool) -> bool {
    let n = indices.len();
    let pos = |k: usize| verts[indices[k]].position;
    let pi = pos(i);
    let pj = pos(j);
    let pi1 = pos(next(i, n));
    let pin1 = pos(prev(i, n));

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return if loose {
            left_on(pi, pj, pin1) && left_on(pj, pi, pi1)
        } else {
            left(pi, pj, pin1) && left(pj, pi, pi1)
        };
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Returns whether `(i, j)` is a proper internal or external diagonal of the polygon,
/// ignoring edges incident to either end.
fn diagonalie(i: usize, j: usize, indices: &[usize], verts: &[ContourVertex], loose: bool) -> bool {
    let n = indices.len();
    let pos = |k: usize| verts[indices[k]].position;
    let d0 = pos(i);
    let d1 = pos(j);

    // For each edge (k,k+1) of P
    !(0..n).any(|k| {
        let k1 = next(k, n);
        // Skip edges incident to i or j
        if k == i || k1 == i || k == j || k1 == j {
            return false;
        }
        let p0 = pos(k);
        let p1 = pos(k1);
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            return false;
        }
        if loose {
            intersect_prop(d0, d1, p0, p1)
        } else {
            intersect(d0, d1, p0, p1)
        }
    })
}

/// Repeatedly merges the pair of polygons sharing the longest edge while the result stays convex.
fn merge_polygons(polys: &mut Vec<Vec<u16>>, vertices: &[U16Vec3], nvp: usize) {
    loop {
        // Find best polygons to merge.
        let mut best: Option<(i64, usize, usize, usize, usize)> = None;
        for j in 0..polys.len().saturating_sub(1) {
            for k in j + 1..polys.len() {
                let Some((value, ea, eb)) = poly_merge_value(&polys[j], &polys[k], vertices, nvp)
                else {
                    continue;
                };
                if value > best.map_or(0, |(best_value, ..)| best_value) {
                    best = Some((value, j, k, ea, eb));
                }
            }
        }
        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        // Found best, merge.
        let merged = merge_poly_verts(&polys[pa], &polys[pb], ea, eb);
        polys[pa] = merged;
        polys.swap_remove(pb);
    }
}

/// Returns the squared length of the shared edge and the edge indices in `pa` and `pb`
/// if the two polygons can be merged into a convex polygon of at most `nvp` vertices.
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    vertices: &[U16Vec3],
    nvp: usize,
) -> Option<(i64, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();

    // If the merged polygon would be too big, do not merge.
    if na + nb - 2 > nvp {
        return None;
    }

    // Check if the polygons share an edge.
    let sorted = |a: u16, b: u16| if a > b { (b, a) } else { (a, b) };
    let (ea, eb) = (0..na).find_map(|i| {
        let edge_a = sorted(pa[i], pa[(i + 1) % na]);
        (0..nb)
            .find(|&j| sorted(pb[j], pb[(j + 1) % nb]) == edge_a)
            .map(|j| (i, j))
    })?;

    // Check to see if the merged polygon would be convex.
    let vert = |i: u16| vertices[i as usize].as_ivec3();
    if !left(vert(pa[(ea + na - 1) % na]), vert(pa[ea]), vert(pb[(eb + 2) % nb])) {
        return None;
    }
    if !left(vert(pb[(eb + nb - 1) % nb]), vert(pb[eb]), vert(pa[(ea + 2) % na])) {
        return None;
    }

    let d = vert(pa[ea]) - vert(pa[(ea + 1) % na]);
    Some((d.x as i64 * d.x as i64 + d.z as i64 * d.z as i64, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = pa.len();
    let nb = pb.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    // Add pa
    merged.extend((0..na - 1).map(|i| pa[(ea + 1 + i) % na]));
    // Add pb
    merged.extend((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]));
    merged
}

/// Fills the neighbour half of every polygon with the index of the polygon sharing each edge.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastMesh.cpp#L40>
fn build_mesh_adjacency(polygons: &mut [u16], vertex_count: usize, nvp: usize) {
    struct Edge {
        vert: [u16; 2],
        poly: [usize; 2],
        poly_edge: [usize; 2],
    }

    let polygon_count = polygons.len() / (2 * nvp);
    let edge_of = |polygons: &[u16], i: usize, j: usize| -> Option<(u16, u16)> {
        let t = &polygons[i * nvp * 2..i * nvp * 2 + nvp];
        if t[j] == RC_MESH_NULL_IDX {
            return None;
        }
        let v1 = if j + 1 >= nvp || t[j + 1] == RC_MESH_NULL_IDX {
            t[0]
        } else {
            t[j + 1]
        };
        Some((t[j], v1))
    };

    let mut edges: Vec<Edge> = Vec::new();
    let mut edges_by_vertex: Vec<Vec<usize>> = (0..vertex_count).map(|_| Vec::new()).collect();
    for i in 0..polygon_count {
        for j in 0..nvp {
            let Some((v0, v1)) = edge_of(polygons, i, j) else {
                break;
            };
            if v0 < v1 {
                edges_by_vertex[v0 as usize].push(edges.len());
                edges.push(Edge {
                    vert: [v0, v1],
                    poly: [i, i],
                    poly_edge: [j, 0],
                });
            }
        }
    }

    for i in 0..polygon_count {
        for j in 0..nvp {
            let Some((v0, v1)) = edge_of(polygons, i, j) else {
                break;
            };
            if v0 > v1 {
                if let Some(&e) = edges_by_vertex[v1 as usize].iter().find(|&&e| {
                    let edge = &edges[e];
                    edge.vert[1] == v0 && edge.poly[0] == edge.poly[1]
                }) {
                    edges[e].poly[1] = i;
                    edges[e].poly_edge[1] = j;
                }
            }
        }
    }

    // Store adjacency
    for edge in edges.iter().filter(|e| e.poly[0] != e.poly[1]) {
        polygons[edge.poly[0] * nvp * 2 + nvp + edge.poly_edge[0]] = edge.poly[1] as u16;
        polygons[edge.poly[1] * nvp * 2 + nvp + edge.poly_edge[1]] = edge.poly[0] as u16;
    }
}

#[cfg(test)]
mod tests {
    use glam::ivec3;

    use crate::contours::{BuildContoursFlags, Contour, RegionVertexId};
    use crate::compact_heightfield::tests::flat_compact_heightfield;

    use super::*;

    fn contour(points: &[(i32, i32)]) -> Contour {
        Contour {
            vertices: points
                .iter()
                .map(|&(x, z)| ContourVertex {
                    position: ivec3(x, 1, z),
                    flags: RegionVertexId::empty(),
                })
                .collect(),
            region: RegionId(1),
            area: AreaType::DEFAULT_WALKABLE,
            ..Default::default()
        }
    }

    fn contour_set(contours: Vec<Contour>) -> ContourSet {
        ContourSet {
            contours,
            cell_size: 0.5,
            cell_height: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn square_becomes_a_single_quad() {
        let cset = contour_set(vec![contour(&[(0, 0), (0, 4), (4, 4), (4, 0)])]);
        let mesh = PolygonMesh::from_contours(&cset, 6).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.polygons.len(), 12);
        let verts = mesh.polygon_vertices(0);
        assert_eq!(
            verts.iter().filter(|&&v| v != RC_MESH_NULL_IDX).count(),
            4
        );
        assert!(
            mesh.polygon_neighbors(0)
                .iter()
                .all(|&n| n == RC_MESH_NULL_IDX)
        );
        assert_eq!(mesh.flags, vec![0]);
        assert_eq!(mesh.regions, vec![RegionId(1)]);
    }

    #[test]
    fn triangles_only_when_merging_is_disabled() {
        let cset = contour_set(vec![contour(&[(0, 0), (0, 4), (4, 4), (4, 0)])]);
        let mesh = PolygonMesh::from_contours(&cset, 3).unwrap();
        assert_eq!(mesh.polygon_count(), 2);
        // The two triangles share the diagonal.
        assert_eq!(mesh.polygon_neighbors(0).iter().filter(|&&n| n == 1).count(), 1);
        assert_eq!(mesh.polygon_neighbors(1).iter().filter(|&&n| n == 0).count(), 1);
    }

    #[test]
    fn concave_outline_is_split_into_convex_polygons() {
        // An L shape cannot be a single convex polygon.
        let cset = contour_set(vec![contour(&[
            (0, 0),
            (0, 4),
            (2, 4),
            (2, 2),
            (4, 2),
            (4, 0),
        ])]);
        let mesh = PolygonMesh::from_contours(&cset, 6).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.polygon_count(), 2);
    }

    #[test]
    fn shared_vertices_are_welded() {
        let cset = contour_set(vec![
            contour(&[(0, 0), (0, 4), (4, 4), (4, 0)]),
            contour(&[(4, 0), (4, 4), (8, 4), (8, 0)]),
        ]);
        let mesh = PolygonMesh::from_contours(&cset, 6).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.polygon_count(), 2);
        assert!(mesh.polygon_neighbors(0).contains(&1));
        assert!(mesh.polygon_neighbors(1).contains(&0));
    }

    #[test]
    fn rejects_too_few_vertices_per_polygon() {
        assert_eq!(
            PolygonMesh::from_contours(&ContourSet::default(), 2),
            Err(PolyMeshError::InvalidVerticesPerPolygon(2))
        );
    }

    #[test]
    fn empty_contours_give_an_empty_mesh() {
        let mesh = PolygonMesh::from_contours(&ContourSet::default(), 6).unwrap();
        assert!(mesh.vertices.is_empty());
        assert_eq!(mesh.polygon_count(), 0);
    }

    #[test]
    fn builds_from_traced_contours() {
        let mut chf = flat_compact_heightfield(6);
        chf.build_regions_monotone(0, 0).unwrap();
        let cset = chf
            .build_contours(1.3, 0, BuildContoursFlags::DEFAULT)
            .unwrap();
        let mesh = PolygonMesh::from_contours(&cset, 6).unwrap();
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.vertices.len(), 4);
    }
}
