//! Tracing and simplification of region outlines into [`Contour`]s.

use glam::IVec3;
use thiserror::Error;
use tracing::warn;

use crate::{
    Aabb3d, CompactHeightfield,
    math::{distance_squared_point_segment_2d, intersect, left, left_on, next, prev, vequal},
    region::RegionId,
    span::AreaType,
};

impl CompactHeightfield {
    /// Builds a contour set from the region outlines in the heightfield.
    ///
    /// The raw contours will match the region outlines exactly. The `max_error` and `max_edge_len`
    /// parameters control how closely the simplified contours will match the raw contours.
    ///
    /// Simplified contours are generated such that the vertices for portals between areas match up.
    /// (They are considered mandatory vertices.)
    ///
    /// Setting `max_edge_len` to zero will disable the edge length feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the outline of a region cannot be traced back to its start.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastContour.cpp#L816>
    pub fn build_contours(
        &self,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
    ) -> Result<ContourSet, ContourError> {
        let mut cset = ContourSet {
            contours: Vec::with_capacity((self.max_region.0 as usize).max(8)),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width.saturating_sub(self.border_size * 2),
            height: self.height.saturating_sub(self.border_size * 2),
            border_size: self.border_size,
            max_error,
        };
        if self.border_size > 0 {
            // If the heightfield was built with border_size, remove the offset
            let pad = self.border_size as f32 * self.cell_size;
            cset.aabb.min.x += pad;
            cset.aabb.min.z += pad;
            cset.aabb.max.x -= pad;
            cset.aabb.max.z -= pad;
        }

        let mut flags = vec![0_u8; self.spans.len()];

        // Mark boundaries
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let span = &self.spans[i];
                    if span.region == RegionId::NONE || span.region.is_border() {
                        flags[i] = 0;
                        continue;
                    }
                    let mut res = 0;
                    for dir in 0..4 {
                        let mut r = RegionId::NONE;
                        if let Some(con) = span.con(dir) {
                            let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                            r = self.spans[a_i].region;
                        }
                        if r == span.region {
                            res |= 1 << dir;
                        }
                    }
                    // Inverse, mark non connected edges.
                    flags[i] = res ^ 0xf;
                }
            }
        }

        let mut verts = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);

        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let region = self.spans[i].region;
                    if region == RegionId::NONE || region.is_border() {
                        continue;
                    }
                    let area = self.areas[i];

                    verts.clear();
                    simplified.clear();

                    self.walk_contour(x, z, i, &mut flags, &mut verts)?;
                    simplify_contour(&verts, &mut simplified, max_error, max_edge_len, build_flags);
                    remove_degenerate_segments(&mut simplified);

                    // Create contour.
                    if simplified.len() >= 3 {
                        let border = IVec3::new(self.border_size as i32, 0, self.border_size as i32);
                        cset.contours.push(Contour {
                            vertices: simplified
                                .iter()
                                .map(|v| ContourVertex {
                                    position: v.position - border,
                                    flags: v.flags,
                                })
                                .collect(),
                            raw_vertices: verts
                                .iter()
                                .map(|v| ContourVertex {
                                    position: v.position - border,
                                    flags: v.flags,
                                })
                                .collect(),
                            region,
                            area,
                        });
                    }
                }
            }
        }

        // Merge holes if needed.
        merge_holes(&mut cset.contours, self.max_region);
        Ok(cset)
    }

    fn walk_contour(
        &self,
        mut x: u16,
        mut z: u16,
        mut i: usize,
        flags: &mut [u8],
        points: &mut Vec<ContourVertex>,
    ) -> Result<(), ContourError> {
        const MAX_ITERATIONS: usize = 40_000;

        // Choose the first non-connected edge
        let mut dir = 0_u8;
        while flags[i] & (1 << dir) == 0 {
            dir += 1;
        }

        let start_dir = dir;
        let start_i = i;
        let area = self.areas[i];

        for _ in 0..MAX_ITERATIONS {
            if flags[i] & (1 << dir) != 0 {
                // Choose the edge corner
                let (p_y, is_border_vertex) = self.get_corner_height(x, z, i, dir);
                let (p_x, p_z) = match dir {
                    0 => (x, z + 1),
                    1 => (x + 1, z + 1),
                    2 => (x + 1, z),
                    _ => (x, z),
                };
                let mut r = RegionVertexId::empty();
                let span = &self.spans[i];
                if let Some(con) = span.con(dir) {
                    let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                    r = RegionVertexId::from(self.spans[a_i].region);
                    if area != self.areas[a_i] {
                        r |= RegionVertexId::AREA_BORDER;
                    }
                }
                if is_border_vertex {
                    r |= RegionVertexId::BORDER_VERTEX;
                }
                points.push(ContourVertex {
                    position: IVec3::new(p_x as i32, p_y as i32, p_z as i32),
                    flags: r,
                });

                // Remove visited edges
                flags[i] &= !(1 << dir);
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some(con) = self.spans[i].con(dir) else {
                    return Err(ContourError::BrokenWalk { x, z });
                };
                let (n_x, n_z, n_i) = self.con_indices(x as i32, z as i32, dir, con);
                x = n_x as u16;
                z = n_z as u16;
                i = n_i;
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }
            if start_i == i && start_dir == dir {
                return Ok(());
            }
        }
        Err(ContourError::UnclosedContour {
            max_iterations: MAX_ITERATIONS,
        })
    }

    fn get_corner_height(&self, x: u16, z: u16, i: usize, dir: u8) -> (u16, bool) {
        let span = &self.spans[i];
        let mut ch = span.y;
        let dir_p = (dir + 1) & 0x3;

        // Combine region and area codes in order to prevent
        // border vertices which are in between two areas to be removed.
        let get_reg = |i: usize| self.spans[i].region.0 as u32 | ((self.areas[i].0 as u32) << 16);
        let mut regs = [0_u32; 4];
        regs[0] = get_reg(i);

        if let Some(con) = span.con(dir) {
            let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
            let a_span = &self.spans[a_i];
            ch = ch.max(a_span.y);
            regs[1] = get_reg(a_i);
            if let Some(con) = a_span.con(dir_p) {
                let (_, _, b_i) = self.con_indices(a_x, a_z, dir_p, con);
                ch = ch.max(self.spans[b_i].y);
                regs[2] = get_reg(b_i);
            }
        }
        if let Some(con) = span.con(dir_p) {
            let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir_p, con);
            let a_span = &self.spans[a_i];
            ch = ch.max(a_span.y);
            regs[3] = get_reg(a_i);
            if let Some(con) = a_span.con(dir) {
                let (_, _, b_i) = self.con_indices(a_x, a_z, dir, con);
                ch = ch.max(self.spans[b_i].y);
                regs[2] = get_reg(b_i);
            }
        }

        // Check if the vertex is special edge vertex, these vertices will be removed later.
        let border = RegionId::BORDER_REGION.0 as u32;
        let is_border_vertex = (0..4).any(|j| {
            let a = j;
            let b = (j + 1) & 0x3;
            let c = (j + 2) & 0x3;
            let d = (j + 3) & 0x3;

            // The vertex is a border vertex there are two same exterior cells in a row,
            // followed by two interior cells and none of the regions are out of bounds.
            let two_same_exts = regs[a] & regs[b] & border != 0 && regs[a] == regs[b];
            let two_ints = (regs[c] | regs[d]) & border == 0;
            let ints_same_area = (regs[c] >> 16) == (regs[d] >> 16);
            let no_zeros = regs.iter().all(|r| *r != 0);
            two_same_exts && two_ints && ints_same_area && no_zeros
        });
        (ch, is_border_vertex)
    }
}

/// A simplified vertex that remembers which raw vertex it came from.
#[derive(Debug, Clone, Copy)]
struct SimplifiedVertex {
    position: IVec3,
    raw_index: usize,
    flags: RegionVertexId,
}

impl SimplifiedVertex {
    fn new(raw: &[ContourVertex], raw_index: usize) -> Self {
        Self {
            position: raw[raw_index].position,
            raw_index,
            flags: RegionVertexId::empty(),
        }
    }
}

fn simplify_contour(
    points: &[ContourVertex],
    simplified: &mut Vec<SimplifiedVertex>,
    max_error: f32,
    max_edge_len: u16,
    build_flags: BuildContoursFlags,
) {
    let pn = points.len();

    // Add initial points.
    let has_connections = points
        .iter()
        .any(|p| p.flags.intersects(RegionVertexId::REGION_MASK));
    if has_connections {
        // The contour has some portals to other regions.
        // Add a new point to every location where the region changes.
        for (i, point) in points.iter().enumerate() {
            let next_point = &points[(i + 1) % pn];
            let different_regs = point.flags.region() != next_point.flags.region();
            let area_borders = point.flags.contains(RegionVertexId::AREA_BORDER)
                != next_point.flags.contains(RegionVertexId::AREA_BORDER);
            if different_regs || area_borders {
                simplified.push(SimplifiedVertex::new(points, i));
            }
        }
    }

    if simplified.is_empty() {
        // If there is no connections at all,
        // create some initial points for the simplification process.
        // Find lower-left and upper-right vertices of the contour.
        let mut lower_left = 0;
        let mut upper_right = 0;
        for (i, point) in points.iter().enumerate() {
            let (x, z) = (point.position.x, point.position.z);
            let ll = points[lower_left].position;
            if x < ll.x || (x == ll.x && z < ll.z) {
                lower_left = i;
            }
            let ur = points[upper_right].position;
            if x > ur.x || (x == ur.x && z > ur.z) {
                upper_right = i;
            }
        }
        simplified.push(SimplifiedVertex::new(points, lower_left));
        simplified.push(SimplifiedVertex::new(points, upper_right));
    }

    // Add points until all raw points are within
    // error tolerance to the simplified shape.
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();

        let mut a = simplified[i].position;
        let a_i = simplified[i].raw_index;
        let mut b = simplified[ii].position;
        let b_i = simplified[ii].raw_index;

        // Find maximum deviation from the segment.
        let mut max_d = 0.0;
        let mut max_i = None;

        // Traverse the segment in lexilogical order so that the
        // max deviation is calculated similarly when traversing
        // opposite segments.
        let (mut c_i, c_inc, end_i) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            ((a_i + 1) % pn, 1, b_i)
        } else {
            std::mem::swap(&mut a, &mut b);
            ((b_i + pn - 1) % pn, pn - 1, a_i)
        };

        // Tessellate only outer edges or edges between areas.
        let flags = points[c_i].flags;
        if !flags.intersects(RegionVertexId::REGION_MASK)
            || flags.contains(RegionVertexId::AREA_BORDER)
        {
            while c_i != end_i {
                let p = points[c_i].position;
                let d = distance_squared_point_segment_2d(
                    (p.x as f32, p.z as f32),
                    (a.x as f32, a.z as f32),
                    (b.x as f32, b.z as f32),
                );
                if d > max_d {
                    max_d = d;
                    max_i = Some(c_i);
                }
                c_i = (c_i + c_inc) % pn;
            }
        }

        // If the max deviation is larger than accepted error,
        // add new point, else continue to next segment.
        match max_i {
            Some(max_i) if max_d > max_error * max_error => {
                simplified.insert(i + 1, SimplifiedVertex::new(points, max_i));
            }
            _ => i += 1,
        }
    }

    // Split too long edges.
    let tessellate_walls = build_flags.contains(BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES);
    let tessellate_areas = build_flags.contains(BuildContoursFlags::TESSELLATE_AREA_EDGES);
    if max_edge_len > 0 && (tessellate_walls || tessellate_areas) {
        let max_edge_len = max_edge_len as i32;
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let a = simplified[i].position;
            let a_i = simplified[i].raw_index;
            let b = simplified[ii].position;
            let b_i = simplified[ii].raw_index;

            // Find maximum deviation from the segment.
            let mut max_i = None;
            let c_i = (a_i + 1) % pn;

            // Tessellate only outer edges or edges between areas.
            let flags = points[c_i].flags;
            let tessellate = (tessellate_walls && !flags.intersects(RegionVertexId::REGION_MASK))
                || (tessellate_areas && flags.contains(RegionVertexId::AREA_BORDER));

            if tessellate {
                let dx = b.x - a.x;
                let dz = b.z - a.z;
                if dx * dx + dz * dz > max_edge_len * max_edge_len {
                    // Round based on the segments in lexilogical order so that the
                    // max tesselation is consistent regardless in which direction
                    // segments are traversed.
                    let n = if b_i < a_i { b_i + pn - a_i } else { b_i - a_i };
                    if n > 1 {
                        max_i = Some(if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            (a_i + n / 2) % pn
                        } else {
                            (a_i + n.div_ceil(2)) % pn
                        });
                    }
                }
            }

            match max_i {
                Some(max_i) => simplified.insert(i + 1, SimplifiedVertex::new(points, max_i)),
                None => i += 1,
            }
        }
    }

    for vertex in simplified.iter_mut() {
        // The edge vertex flag is take from the current raw point,
        // and the neighbour region is take from the next raw point.
        let a_i = (vertex.raw_index + 1) % pn;
        let b_i = vertex.raw_index;
        vertex.flags = (points[a_i].flags
            & (RegionVertexId::REGION_MASK | RegionVertexId::AREA_BORDER))
            | (points[b_i].flags & RegionVertexId::BORDER_VERTEX);
    }
}

/// Removes adjacent vertices which are equal on the xz-plane, or else the triangulator will get confused.
fn remove_degenerate_segments(simplified: &mut Vec<SimplifiedVertex>) {
    let mut i = 0;
    while i < simplified.len() {
        let ni = next(i, simplified.len());
        if simplified.len() > 1 && vequal(simplified[i].position, simplified[ni].position) {
            // Degenerate segment, remove.
            simplified.remove(i);
        }
        i += 1;
    }
}

/// Twice the signed area of the polygon on the xz-plane, halved and rounded.
/// Holes are wound backwards and have a negative area.
fn calc_area_of_polygon_2d(verts: &[ContourVertex]) -> i64 {
    let n = verts.len();
    let area: i64 = (0..n)
        .map(|i| {
            let vi = verts[i].position;
            let vj = verts[prev(i, n)].position;
            vi.x as i64 * vj.z as i64 - vj.x as i64 * vi.z as i64
        })
        .sum();
    (area + 1) / 2
}

struct ContourHole {
    contour: usize,
    min_x: i32,
    min_z: i32,
    leftmost: usize,
}

fn merge_holes(contours: &mut Vec<Contour>, max_region: RegionId) {
    if contours.is_empty() {
        return;
    }
    // Calculate winding of all polygons.
    let is_hole: Vec<bool> = contours
        .iter()
        .map(|contour| calc_area_of_polygon_2d(&contour.vertices) < 0)
        .collect();
    if !is_hole.iter().any(|hole| *hole) {
        return;
    }

    // Collect outline contour and holes contours per region.
    // We assume that there is one outline and multiple holes.
    let region_count = max_region.0 as usize + 1;
    let mut outlines: Vec<Option<usize>> = vec![None; region_count];
    let mut holes: Vec<Vec<ContourHole>> = (0..region_count).map(|_| Vec::new()).collect();
    for (i, contour) in contours.iter().enumerate() {
        let region = contour.region.0 as usize;
        if region >= region_count {
            continue;
        }
        // Positively wound contours are outlines, negative holes.
        if is_hole[i] {
            let (min_x, min_z, leftmost) = find_left_most_vertex(&contour.vertices);
            holes[region].push(ContourHole {
                contour: i,
                min_x,
                min_z,
                leftmost,
            });
        } else {
            if outlines[region].is_some() {
                warn!("Multiple outlines for region {region}.");
            }
            outlines[region] = Some(i);
        }
    }

    // Finally merge each regions holes into the outline.
    for (region, region_holes) in holes.iter_mut().enumerate() {
        if region_holes.is_empty() {
            continue;
        }
        let Some(outline) = outlines[region] else {
            warn!(
                "Bad outline for region {region}, contour simplification is likely too aggressive."
            );
            continue;
        };
        merge_region_holes(contours, outline, region_holes);
    }

    contours.retain(|contour| !contour.vertices.is_empty());
}

fn find_left_most_vertex(verts: &[ContourVertex]) -> (i32, i32, usize) {
    let mut min_x = verts[0].position.x;
    let mut min_z = verts[0].position.z;
    let mut leftmost = 0;
    for (i, vert) in verts.iter().enumerate().skip(1) {
        let (x, z) = (vert.position.x, vert.position.z);
        if x < min_x || (x == min_x && z < min_z) {
            min_x = x;
            min_z = z;
            leftmost = i;
        }
    }
    (min_x, min_z, leftmost)
}

fn merge_region_holes(contours: &mut [Contour], outline: usize, holes: &mut [ContourHole]) {
    // Sort holes from left to right.
    holes.sort_by_key(|hole| (hole.min_x, hole.min_z));

    let mut diagonals: Vec<(usize, i64)> = Vec::new();
    for i in 0..holes.len() {
        let hole = holes[i].contour;
        let hole_len = contours[hole].vertices.len();
        let mut index = None;
        let mut best_vertex = holes[i].leftmost;
        for _ in 0..hole_len {
            // Find potential diagonals.
            // The 'best' vertex must be in the cone described by 3 consecutive vertices of the outline.
            // ..o j-1
            //   |
            //   |   * best
            //   |
            // j o-----o j+1
            //         :
            let corner = contours[hole].vertices[best_vertex].position;
            let outline_verts = &contours[outline].vertices;
            diagonals.clear();
            for j in 0..outline_verts.len() {
                if in_cone(j, outline_verts, corner) {
                    let d = outline_verts[j].position - corner;
                    diagonals.push((j, d.x as i64 * d.x as i64 + d.z as i64 * d.z as i64));
                }
            }
            // Sort potential diagonals by distance, we want to make the connection as short as possible.
            diagonals.sort_by_key(|(_, dist)| *dist);

            // Find a diagonal that is not intersecting the outline nor the remaining holes.
            index = diagonals.iter().map(|(j, _)| *j).find(|&j| {
                let pt = outline_verts[j].position;
                !intersect_seg_contour(pt, corner, Some(j), outline_verts)
                    && !holes[i..].iter().any(|other| {
                        intersect_seg_contour(pt, corner, None, &contours[other.contour].vertices)
                    })
            });
            // If found non-intersecting diagonal, stop looking.
            if index.is_some() {
                break;
            }
            // All the potential diagonals for the current vertex were intersecting, try next vertex.
            best_vertex = (best_vertex + 1) % hole_len;
        }

        let Some(index) = index else {
            warn!(
                "Failed to find merge points for outline of region {} and one of its holes.",
                contours[outline].region.0
            );
            continue;
        };
        let hole_verts = std::mem::take(&mut contours[hole].vertices);
        merge_contours(&mut contours[outline].vertices, &hole_verts, index, best_vertex);
    }
}

fn in_cone(i: usize, verts: &[ContourVertex], pj: IVec3) -> bool {
    let n = verts.len();
    let pi = verts[i].position;
    let pi1 = verts[next(i, n)].position;
    let pin1 = verts[prev(i, n)].position;

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn intersect_seg_contour(d0: IVec3, d1: IVec3, i: Option<usize>, verts: &[ContourVertex]) -> bool {
    let n = verts.len();
    // For each edge (k,k+1) of P
    (0..n).any(|k| {
        let k1 = next(k, n);
        // Skip edges incident to i.
        if i == Some(k) || i == Some(k1) {
            return false;
        }
        let p0 = verts[k].position;
        let p1 = verts[k1].position;
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            return false;
        }
        intersect(d0, d1, p0, p1)
    })
}

fn merge_contours(
    outline: &mut Vec<ContourVertex>,
    hole: &[ContourVertex],
    outline_index: usize,
    hole_index: usize,
) {
    let mut merged = Vec::with_capacity(outline.len() + hole.len() + 2);
    // Copy contour A.
    for i in 0..=outline.len() {
        merged.push(outline[(outline_index + i) % outline.len()]);
    }
    // Copy contour B
    for i in 0..=hole.len() {
        merged.push(hole[(hole_index + i) % hole.len()]);
    }
    *outline = merged;
}

/// Errors that can occur when building a [`ContourSet`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContourError {
    /// The walk around a region outline stepped onto a span without a connection.
    #[error("Contour walk lost its way at cell ({x}, {z})")]
    BrokenWalk {
        /// The x-coordinate of the cell where the walk failed
        x: u16,
        /// The z-coordinate of the cell where the walk failed
        z: u16,
    },
    /// The walk around a region outline did not return to its start.
    #[error("Contour walk did not close after {max_iterations} steps")]
    UnclosedContour {
        /// The number of steps taken
        max_iterations: usize,
    },
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContourSet {
    /// An array of the contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB in world space
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The width of the set. (Along the x-axis in cell units.)
    pub width: u16,
    /// The height of the set. (Along the z-axis in cell units.)
    pub height: u16,
    /// The AABB border size used to generate the source data from which the contours were derived.
    pub border_size: u16,
    /// The max edge error that this contour set was simplified with.
    pub max_error: f32,
}

bitflags::bitflags! {
    /// The region id of the neighbour across a contour edge, plus flags about the vertex.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct RegionVertexId: u32 {
        /// Applied to the region id field of contour vertices in order to extract the region id.
        /// The region id field of a vertex may have several flags applied to it.  So the
        /// fields value can't be used directly.
        const REGION_MASK = 0xffff;

        /// Border vertex flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// a tile border. If a contour vertex's region ID has this bit set, the
        /// vertex will later be removed in order to match the segments and vertices
        /// at tile boundaries.
        const BORDER_VERTEX = 0x10_000;

        /// Area border flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// the border of an area.
        const AREA_BORDER = 0x20_000;
    }
}

impl RegionVertexId {
    /// The region id of the neighbour, without any flags.
    #[inline]
    pub fn region(self) -> RegionId {
        RegionId((self.bits() & Self::REGION_MASK.bits()) as u16)
    }
}

impl From<RegionId> for RegionVertexId {
    fn from(region_id: RegionId) -> Self {
        RegionVertexId::from_bits_retain(region_id.0 as u32)
    }
}

/// A vertex of a [`Contour`] in field space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// The position of the vertex in cell units.
    pub position: IVec3,
    /// The neighbouring region and vertex flags.
    pub flags: RegionVertexId,
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    /// Simplified contour vertex and connection data.
    pub vertices: Vec<ContourVertex>,
    /// Raw contour vertex and connection data.
    pub raw_vertices: Vec<ContourVertex>,
    /// Region ID of the contour.
    pub region: RegionId,
    /// Area type of the contour.
    pub area: AreaType,
}

bitflags::bitflags! {
    /// Contour build flags used in [`CompactHeightfield::build_contours`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct BuildContoursFlags: u8 {
        /// Tessellate solid (impassable) edges during contour simplification.
        const TESSELLATE_SOLID_WALL_EDGES = 1;
        /// Tessellate edges between areas during contour simplification.
        const TESSELLATE_AREA_EDGES = 2;

        /// Default flags for building contours.
        const DEFAULT = Self::TESSELLATE_SOLID_WALL_EDGES.bits();
    }
}

impl Default for BuildContoursFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use glam::ivec3;

    use crate::compact_heightfield::tests::flat_compact_heightfield;

    use super::*;

    fn vertex(x: i32, z: i32) -> ContourVertex {
        ContourVertex {
            position: ivec3(x, 0, z),
            flags: RegionVertexId::empty(),
        }
    }

    fn single_region_field(size: u16) -> CompactHeightfield {
        let mut chf = flat_compact_heightfield(size);
        chf.build_regions_monotone(0, 0).unwrap();
        chf
    }

    #[test]
    fn square_region_simplifies_to_four_corners() {
        let chf = single_region_field(6);
        let cset = chf
            .build_contours(1.3, 0, BuildContoursFlags::DEFAULT)
            .unwrap();
        assert_eq!(cset.contours.len(), 1);
        let contour = &cset.contours[0];
        assert_eq!(contour.region, RegionId(1));
        assert_eq!(contour.area, AreaType::DEFAULT_WALKABLE);
        assert_eq!(contour.vertices.len(), 4);
        // One raw vertex per boundary edge.
        assert_eq!(contour.raw_vertices.len(), 24);

        let mut corners: Vec<_> = contour
            .vertices
            .iter()
            .map(|v| (v.position.x, v.position.z))
            .collect();
        corners.sort();
        assert_eq!(corners, vec![(0, 0), (0, 6), (6, 0), (6, 6)]);
        assert!(contour.vertices.iter().all(|v| v.position.y == 1));
    }

    #[test]
    fn outline_is_wound_positively() {
        let chf = single_region_field(4);
        let cset = chf
            .build_contours(1.3, 0, BuildContoursFlags::DEFAULT)
            .unwrap();
        assert!(calc_area_of_polygon_2d(&cset.contours[0].vertices) > 0);
    }

    #[test]
    fn long_edges_are_split() {
        let chf = single_region_field(8);
        let cset = chf
            .build_contours(1.3, 2, BuildContoursFlags::DEFAULT)
            .unwrap();
        let contour = &cset.contours[0];
        assert!(contour.vertices.len() > 4);
        let n = contour.vertices.len();
        for i in 0..n {
            let a = contour.vertices[i].position;
            let b = contour.vertices[(i + 1) % n].position;
            let d = b - a;
            assert!(d.x * d.x + d.z * d.z <= 4, "edge {a} -> {b} is too long");
        }
    }

    #[test]
    fn no_regions_means_no_contours() {
        let chf = flat_compact_heightfield(4);
        let cset = chf
            .build_contours(1.3, 0, BuildContoursFlags::DEFAULT)
            .unwrap();
        assert!(cset.contours.is_empty());
    }

    #[test]
    fn degenerate_segments_are_removed() {
        let raw = [vertex(0, 0), vertex(0, 0), vertex(2, 0), vertex(2, 2)];
        let mut simplified: Vec<_> = (0..raw.len())
            .map(|i| SimplifiedVertex::new(&raw, i))
            .collect();
        remove_degenerate_segments(&mut simplified);
        assert_eq!(simplified.len(), 3);
    }

    #[test]
    fn hole_is_merged_into_outline() {
        // Outline wound counterclockwise in xz (positive area), hole wound the other way.
        let mut contours = vec![
            Contour {
                vertices: vec![vertex(0, 0), vertex(0, 10), vertex(10, 10), vertex(10, 0)],
                region: RegionId(1),
                ..Default::default()
            },
            Contour {
                vertices: vec![vertex(4, 4), vertex(6, 4), vertex(6, 6), vertex(4, 6)],
                region: RegionId(1),
                ..Default::default()
            },
        ];
        assert!(calc_area_of_polygon_2d(&contours[0].vertices) > 0);
        assert!(calc_area_of_polygon_2d(&contours[1].vertices) < 0);

        merge_holes(&mut contours, RegionId(1));
        assert_eq!(contours.len(), 1);
        // Both loops plus the two duplicated bridge vertices.
        assert_eq!(contours[0].vertices.len(), 10);
    }
}
