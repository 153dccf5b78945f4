use thiserror::Error;

use crate::{
    Aabb3d,
    compact_cell::CompactCell,
    compact_span::CompactSpan,
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    region::RegionId,
    span::AreaType,
};

/// A packed representation of the walkable spans of a [`Heightfield`], with links between neighbouring spans.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Include/Recast.h#L353>
#[derive(Debug, Clone, Default)]
pub struct CompactHeightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The walkable height used during the build of the field
    pub walkable_height: u16,
    /// The walkable climb used during the build of the field.
    pub walkable_climb: u16,
    /// The AABB border size used during the build of the field.
    pub border_size: u16,
    /// The maximum distance value of any span within the field.
    pub max_distance: u16,
    /// The maximum region id of any span within the field.
    pub max_region: RegionId,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The cells in the heightfield [Size: `width * height`]
    pub cells: Vec<CompactCell>,
    /// All walkable spans in the heightfield
    pub spans: Vec<CompactSpan>,
    /// Vector containing border distance data. [Size: `spans.len()`], empty until a distance field is built.
    pub dist: Vec<u16>,
    /// Vector containing area type data. [Size: `spans.len()`]
    pub areas: Vec<AreaType>,
}

impl CompactHeightfield {
    const MAX_HEIGHT: u16 = u16::MAX;
    /// The highest layer index a connection can encode.
    pub(crate) const MAX_LAYERS: u8 = CompactSpan::NOT_CONNECTED - 1;

    /// Builds a compact heightfield from the walkable spans of a heightfield.
    ///
    /// # Arguments
    ///
    /// - `heightfield`: The heightfield to compact.
    /// - `walkable_height`: Minimum floor to 'ceiling' height that will still allow the floor area to be considered walkable. `[Limit: >= 3] [Units: vx]`
    /// - `walkable_climb`: Maximum ledge height that is considered to still be traversable. `[Limit: >=0] [Units: vx]`
    ///
    /// # Errors
    ///
    /// Returns an error if a column has more spans than a connection can address.
    pub fn from_heightfield(
        heightfield: &Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<Self, CompactHeightfieldError> {
        let walkable_span_count = heightfield
            .spans
            .values()
            .filter(|span| span.area().is_walkable())
            .count();

        let mut compact_heightfield = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_region: RegionId::NONE,
            aabb: heightfield.aabb,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: vec![CompactCell::default(); heightfield.columns.len()],
            spans: vec![CompactSpan::default(); walkable_span_count],
            dist: Vec::new(),
            areas: vec![AreaType::NOT_WALKABLE; walkable_span_count],
        };
        compact_heightfield.aabb.max.y += walkable_height as f32 * heightfield.cell_height;

        let mut span_index = 0_usize;
        // Fill in cells and spans
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let column_index = heightfield.column_index(x, z);
                let cell = &mut compact_heightfield.cells[column_index];
                // If there are no spans at this cell, just leave the data to index=0, count=0.
                cell.set_index(span_index as u32);

                for span_key in heightfield.column_keys(x, z) {
                    let span = heightfield.span(span_key);
                    if !span.area().is_walkable() {
                        continue;
                    }
                    if cell.count() > Self::MAX_LAYERS {
                        return Err(CompactHeightfieldError::TooManyLayers {
                            max_layer_index: Self::MAX_LAYERS,
                            layer_index: cell.count() as u32,
                        });
                    }
                    let bot = span.max();
                    let top = span
                        .next()
                        .map_or(Self::MAX_HEIGHT, |next| heightfield.span(next).min());
                    let compact_span = &mut compact_heightfield.spans[span_index];
                    compact_span.y = bot;
                    compact_span.set_height(top.saturating_sub(bot).min(u8::MAX as u16) as u8);
                    compact_heightfield.areas[span_index] = span.area();
                    span_index += 1;
                    cell.inc_count();
                }
            }
        }

        // Find neighbour connections
        let mut too_high_neighbour = 0_u32;
        for z in 0..compact_heightfield.height {
            for x in 0..compact_heightfield.width {
                let cell = *compact_heightfield.cell_at(x, z);
                for i in cell.index_range() {
                    let span = compact_heightfield.spans[i];
                    for dir in 0..4_u8 {
                        compact_heightfield.spans[i].set_con(dir, None);
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                        // First check that the neighbour cell is in bounds.
                        if !heightfield.contains(neighbor_x, neighbor_z) {
                            continue;
                        }

                        // Iterate over all neighbour spans and check if any of them is
                        // accessible from current cell.
                        let neighbor_cell =
                            *compact_heightfield.cell_at(neighbor_x as u16, neighbor_z as u16);
                        for k in neighbor_cell.index_range() {
                            let neighbor_span = &compact_heightfield.spans[k];
                            let bot = span.y.max(neighbor_span.y) as i32;
                            let top = (span.y as i32 + span.height() as i32)
                                .min(neighbor_span.y as i32 + neighbor_span.height() as i32);

                            // Check that the gap between the spans is walkable,
                            // and that the climb height between the gaps is not too high.
                            let is_walkable = top - bot >= walkable_height as i32;
                            let is_climbable = (neighbor_span.y as i32 - span.y as i32).abs()
                                <= walkable_climb as i32;
                            if !is_walkable || !is_climbable {
                                continue;
                            }
                            // Mark direction as walkable.
                            let layer_index = k - neighbor_cell.index() as usize;
                            if layer_index > Self::MAX_LAYERS as usize {
                                too_high_neighbour = too_high_neighbour.max(layer_index as u32);
                                continue;
                            }
                            compact_heightfield.spans[i].set_con(dir, Some(layer_index as u8));
                            break;
                        }
                    }
                }
            }
        }

        if too_high_neighbour > Self::MAX_LAYERS as u32 {
            return Err(CompactHeightfieldError::TooManyLayers {
                max_layer_index: Self::MAX_LAYERS,
                layer_index: too_high_neighbour,
            });
        }
        Ok(compact_heightfield)
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    /// Returns the cell at the given coordinates. Returns `None` if the coordinates are invalid.
    #[inline]
    pub fn get_cell_at(&self, x: u16, z: u16) -> Option<&CompactCell> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.cells.get(self.column_index(x, z))
    }

    /// Returns the cell at the given coordinates.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are invalid.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &CompactCell {
        &self.cells[self.column_index(x, z)]
    }

    /// Follows the connection `con` of the span in cell `(x, z)` towards `dir`.
    /// Returns the neighbour cell's coordinates and the index of the connected span.
    #[inline]
    pub(crate) fn con_indices(&self, x: i32, z: i32, dir: u8, con: u8) -> (i32, i32, usize) {
        let a_x = x + dir_offset_x(dir) as i32;
        let a_z = z + dir_offset_z(dir) as i32;
        let a_i = self.cells[a_x as usize + a_z as usize * self.width as usize].index() as usize
            + con as usize;
        (a_x, a_z, a_i)
    }

    /// Returns the number of regions, which is one more than the highest region id.
    #[inline]
    pub fn region_count(&self) -> usize {
        self.max_region.0 as usize + 1
    }
}

/// Errors that can occur when building a compact heightfield.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompactHeightfieldError {
    /// The heightfield has too many layers.
    #[error(
        "Heightfield has too many layers. Max layer index is {max_layer_index}, but got {layer_index}"
    )]
    TooManyLayers {
        /// The maximum layer index.
        max_layer_index: u8,
        /// The layer index that caused the error.
        layer_index: u32,
    },
}

#[cfg(test)]
pub(crate) mod tests {
    use glam::Vec3A;

    use crate::{
        heightfield::{HeightfieldBuilder, SpanInsertion},
        span::SpanBuilder,
    };

    use super::*;

    /// A flat `size`×`size` floor of walkable spans with a single step-free layer.
    pub(crate) fn flat_heightfield(size: u16) -> Heightfield {
        let mut heightfield = HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, [size as f32, 10.0, size as f32]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                heightfield
                    .add_span(SpanInsertion {
                        x,
                        z,
                        flag_merge_threshold: 1,
                        span: SpanBuilder {
                            min: 0,
                            max: 1,
                            area: AreaType::DEFAULT_WALKABLE,
                            next: None,
                        }
                        .build(),
                    })
                    .unwrap();
            }
        }
        heightfield
    }

    pub(crate) fn flat_compact_heightfield(size: u16) -> CompactHeightfield {
        CompactHeightfield::from_heightfield(&flat_heightfield(size), 2, 1).unwrap()
    }

    #[test]
    fn compacts_every_walkable_span() {
        let compact = flat_compact_heightfield(4);
        assert_eq!(compact.spans.len(), 16);
        assert_eq!(compact.cells.len(), 16);
        assert!(compact.cells.iter().all(|cell| cell.count() == 1));
        assert!(compact.spans.iter().all(|span| span.y == 1));
        // Raised by the walkable height.
        assert_eq!(compact.aabb.max.y, 12.0);
    }

    #[test]
    fn interior_spans_connect_in_all_directions() {
        let compact = flat_compact_heightfield(3);
        let center = compact.cell_at(1, 1).index() as usize;
        for dir in 0..4 {
            assert_eq!(compact.spans[center].con(dir), Some(0));
        }
        let corner = compact.cell_at(0, 0).index() as usize;
        // Direction 0 is -x and direction 3 is -z, both outside the grid.
        assert_eq!(compact.spans[corner].con(0), None);
        assert_eq!(compact.spans[corner].con(3), None);
        assert_eq!(compact.spans[corner].con(1), Some(0));
        assert_eq!(compact.spans[corner].con(2), Some(0));
    }

    #[test]
    fn unwalkable_spans_are_dropped() {
        let mut heightfield = flat_heightfield(2);
        let key = heightfield.span_key_at(0, 0).unwrap();
        heightfield.span_mut(key).set_area(AreaType::NOT_WALKABLE);
        let compact = CompactHeightfield::from_heightfield(&heightfield, 2, 1).unwrap();
        assert_eq!(compact.spans.len(), 3);
        assert_eq!(compact.cell_at(0, 0).count(), 0);
    }

    #[test]
    fn con_indices_follow_connection() {
        let compact = flat_compact_heightfield(3);
        let (x, z, i) = compact.con_indices(1, 1, 2, 0);
        assert_eq!((x, z), (2, 1));
        assert_eq!(i, compact.cell_at(2, 1).index() as usize);
    }
}
