//! Conservative voxelization of triangles into a [`Heightfield`].

use glam::{UVec3, Vec3, Vec3A};
use thiserror::Error;

use crate::{
    Aabb3d,
    heightfield::{Heightfield, SpanInsertion, SpanInsertionError},
    span::{AreaType, SPAN_MAX_HEIGHT, SpanBuilder},
};

impl Heightfield {
    /// Rasterizes a triangle soup into the heightfield.
    ///
    /// Every triangle is rasterized with its area from `areas`, including unwalkable ones, so that they obstruct
    /// walkable spans below them.
    ///
    /// # Arguments
    ///
    /// - `vertices`: The vertices of the triangle soup.
    /// - `triangles`: The vertex indices of each triangle.
    /// - `areas`: The area of each triangle.
    /// - `flag_merge_threshold`: The distance where the walkable flag is favored over the non-walkable flag. `[Limit: >= 0] [Units: vx]`
    ///
    /// # Errors
    ///
    /// Returns an error if `areas` does not match `triangles`, a triangle references a missing vertex,
    /// or a span could not be inserted.
    pub fn rasterize_triangles(
        &mut self,
        vertices: &[Vec3],
        triangles: &[UVec3],
        areas: &[AreaType],
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        if areas.len() != triangles.len() {
            return Err(RasterizationError::AreaCountMismatch {
                triangles: triangles.len(),
                areas: areas.len(),
            });
        }
        for (i, (triangle, area)) in triangles.iter().zip(areas).enumerate() {
            let mut corners = [Vec3A::ZERO; 3];
            for (corner, index) in corners.iter_mut().zip(triangle.to_array()) {
                let Some(vertex) = vertices.get(index as usize) else {
                    return Err(RasterizationError::VertexIndexOutOfBounds {
                        triangle: i,
                        index,
                        vertex_count: vertices.len(),
                    });
                };
                *corner = Vec3A::from(*vertex);
            }
            self.rasterize_triangle(corners, *area, flag_merge_threshold)?;
        }
        Ok(())
    }

    /// <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRasterization.cpp#L236>
    pub(crate) fn rasterize_triangle(
        &mut self,
        triangle: [Vec3A; 3],
        area: AreaType,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        let [a, b, c] = triangle;
        let triangle_aabb = Aabb3d {
            min: a.min(b).min(c),
            max: a.max(b).max(c),
        };
        // If the triangle does not touch the bounding box of the heightfield, skip the triangle.
        if !triangle_aabb.intersects(&self.aabb) {
            return Ok(());
        }

        let width = self.width as i32;
        let height = self.height as i32;
        let inverse_cell_size = 1.0 / self.cell_size;
        let inverse_cell_height = 1.0 / self.cell_height;
        let min = self.aabb.min;
        let by = self.aabb.max.y - min.y;

        // Calculate the footprint of the triangle on the grid's z-axis
        let z0 = ((triangle_aabb.min.z - min.z) * inverse_cell_size) as i32;
        let z1 = ((triangle_aabb.max.z - min.z) * inverse_cell_size) as i32;
        // use -1 rather than 0 to cut the polygon properly at the start of the tile
        let z0 = z0.clamp(-1, height - 1);
        let z1 = z1.clamp(0, height - 1);

        let mut remaining = ClipPolygon::from_slice(&triangle);
        for z in z0..=z1 {
            // Clip polygon to row. Store the remaining polygon as well
            let cell_z = min.z + z as f32 * self.cell_size;
            let (row, rest) = remaining.divide(cell_z + self.cell_size, Axis::Z);
            remaining = rest;
            if row.len < 3 || z < 0 {
                continue;
            }

            // find X-axis bounds of the row
            let (min_x, max_x) = row
                .verts()
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.x), hi.max(v.x)));
            let x0 = ((min_x - min.x) * inverse_cell_size) as i32;
            let x1 = ((max_x - min.x) * inverse_cell_size) as i32;
            if x1 < 0 || x0 >= width {
                continue;
            }
            let x0 = x0.clamp(-1, width - 1);
            let x1 = x1.clamp(0, width - 1);

            let mut row_remaining = row;
            for x in x0..=x1 {
                // Clip polygon to column. Store the remaining polygon as well
                let cell_x = min.x + x as f32 * self.cell_size;
                let (cell, rest) = row_remaining.divide(cell_x + self.cell_size, Axis::X);
                row_remaining = rest;
                if cell.len < 3 || x < 0 {
                    continue;
                }

                // Calculate min and max of the span.
                let (span_min, span_max) = cell
                    .verts()
                    .iter()
                    .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));
                let span_min = span_min - min.y;
                let span_max = span_max - min.y;
                // Skip the span if it's completely outside the heightfield bounding box
                if span_max < 0.0 || span_min > by {
                    continue;
                }
                // Clamp the span to the heightfield bounding box.
                let span_min = span_min.max(0.0);
                let span_max = span_max.min(by);

                // Snap the span to the heightfield height grid.
                let span_min_cell = ((span_min * inverse_cell_height).floor() as i32)
                    .clamp(0, SPAN_MAX_HEIGHT as i32) as u16;
                let span_max_cell = ((span_max * inverse_cell_height).ceil() as i32)
                    .clamp(span_min_cell as i32 + 1, SPAN_MAX_HEIGHT as i32)
                    as u16;

                self.add_span(SpanInsertion {
                    x: x as u16,
                    z: z as u16,
                    flag_merge_threshold,
                    span: SpanBuilder {
                        min: span_min_cell,
                        max: span_max_cell,
                        area,
                        next: None,
                    }
                    .build(),
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Z,
}

/// A convex polygon produced by clipping a triangle against grid lines.
/// Clipping a triangle against two axis-aligned lines yields at most 7 vertices.
#[derive(Debug, Clone, Copy)]
struct ClipPolygon {
    verts: [Vec3A; 12],
    len: usize,
}

impl ClipPolygon {
    fn from_slice(verts: &[Vec3A]) -> Self {
        let mut polygon = Self {
            verts: [Vec3A::ZERO; 12],
            len: verts.len(),
        };
        polygon.verts[..verts.len()].copy_from_slice(verts);
        polygon
    }

    fn verts(&self) -> &[Vec3A] {
        &self.verts[..self.len]
    }

    fn push(&mut self, vert: Vec3A) {
        self.verts[self.len] = vert;
        self.len += 1;
    }

    /// Divides the polygon into the part below `axis_offset` and the part above it.
    ///
    /// <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRasterization.cpp#L175>
    fn divide(&self, axis_offset: f32, axis: Axis) -> (ClipPolygon, ClipPolygon) {
        let coordinate = |v: Vec3A| match axis {
            Axis::X => v.x,
            Axis::Z => v.z,
        };
        let mut below = ClipPolygon {
            verts: [Vec3A::ZERO; 12],
            len: 0,
        };
        let mut above = below;
        if self.len == 0 {
            return (below, above);
        }

        // How far positive or negative away from the separating axis is each vertex.
        let mut delta = [0.0_f32; 12];
        for (d, v) in delta.iter_mut().zip(self.verts()) {
            *d = axis_offset - coordinate(*v);
        }

        let mut vert_b = self.len - 1;
        for vert_a in 0..self.len {
            let same_side = (delta[vert_a] >= 0.0) == (delta[vert_b] >= 0.0);
            if !same_side {
                let s = delta[vert_b] / (delta[vert_b] - delta[vert_a]);
                let intersection = self.verts[vert_b] + (self.verts[vert_a] - self.verts[vert_b]) * s;
                below.push(intersection);
                above.push(intersection);
                // Points on the dividing line were already added above.
                if delta[vert_a] > 0.0 {
                    below.push(self.verts[vert_a]);
                } else if delta[vert_a] < 0.0 {
                    above.push(self.verts[vert_a]);
                }
            } else {
                // Points on the dividing line go into both polygons.
                if delta[vert_a] >= 0.0 {
                    below.push(self.verts[vert_a]);
                    if delta[vert_a] != 0.0 {
                        vert_b = vert_a;
                        continue;
                    }
                }
                above.push(self.verts[vert_a]);
            }
            vert_b = vert_a;
        }
        (below, above)
    }
}

/// Errors that can occur when rasterizing triangles into a [`Heightfield`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterizationError {
    /// Happens when the number of areas does not match the number of triangles.
    #[error("Got {areas} triangle areas for {triangles} triangles")]
    AreaCountMismatch {
        /// The number of triangles
        triangles: usize,
        /// The number of areas
        areas: usize,
    },
    /// Happens when a triangle references a vertex that does not exist.
    #[error("Triangle {triangle} references vertex {index}, but there are only {vertex_count} vertices")]
    VertexIndexOutOfBounds {
        /// The index of the offending triangle
        triangle: usize,
        /// The offending vertex index
        index: u32,
        /// The number of vertices
        vertex_count: usize,
    },
    /// Happens when a span could not be inserted into the heightfield.
    #[error(transparent)]
    SpanInsertion(#[from] SpanInsertionError),
}
