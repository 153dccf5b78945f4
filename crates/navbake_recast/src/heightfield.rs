//! The heightfield module contains the types and functions for working with [`Heightfield`]s.
//!
//! A heightfield is a 3D grid of [`Span`]s, where each column contains 0, 1, or more spans.

use thiserror::Error;

use crate::{
    Aabb3d,
    span::{Span, SpanKey, Spans},
};

/// A dynamic heightfield representing obstructed space.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Include/Recast.h#L312>
/// Build with [`HeightfieldBuilder`]. The [`Default`] value is an empty grid
/// without any columns, which is what a freshly allocated heightfield looks like before it is initialized.
#[derive(Debug, Clone, Default)]
pub struct Heightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The keys to the lowest span of each column in width*height order
    pub columns: Vec<Option<SpanKey>>,
    /// All spans in the heightfield
    pub spans: Spans,
}

impl Heightfield {
    /// <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRasterization.cpp#L105>
    pub(crate) fn add_span(&mut self, insertion: SpanInsertion) -> Result<(), SpanInsertionError> {
        if insertion.x >= self.width || insertion.z >= self.height {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds {
                x: insertion.x,
                z: insertion.z,
            });
        }
        let column_index = self.column_index(insertion.x, insertion.z);

        let mut new_span = insertion.span;
        let mut previous_span_key = None;
        let mut current_span_key_iter = self.columns[column_index];
        // Insert the new span, possibly merging it with existing spans.
        while let Some(current_span_key) = current_span_key_iter {
            let current_span = self.span(current_span_key).clone();
            if current_span.min() > new_span.max() {
                // Current span is completely above the new span, break.
                break;
            }
            if current_span.max() < new_span.min() {
                // Current span is completely below the new span. Keep going.
                previous_span_key = Some(current_span_key);
                current_span_key_iter = current_span.next();
                continue;
            }
            // The new span overlaps with an existing span. Merge them.
            if current_span.min() < new_span.min() {
                new_span.set_min(current_span.min());
            }
            if current_span.max() > new_span.max() {
                new_span.set_max(current_span.max());
            }

            // Merge flags.
            if (new_span.max() as i32 - current_span.max() as i32).unsigned_abs()
                <= insertion.flag_merge_threshold as u32
            {
                // Higher area ID numbers indicate higher resolution priority.
                new_span.set_area(new_span.area().max(current_span.area()));
            }

            // Remove the current span since it's now merged with the new span.
            // Keep going because there might be other overlapping spans that also need to be merged.
            let next_key = current_span.next();
            self.spans.remove(current_span_key);
            if let Some(previous_span_key) = previous_span_key {
                self.span_mut(previous_span_key).set_next(next_key);
            } else {
                self.columns[column_index] = next_key;
            }
            current_span_key_iter = next_key;
        }

        if let Some(previous_span_key) = previous_span_key {
            // Insert new span after prev
            new_span.set_next(self.span(previous_span_key).next());
            let new_span_key = self.spans.insert(new_span);
            self.span_mut(previous_span_key).set_next(new_span_key);
        } else {
            // This span should go before the others in the list
            new_span.set_next(self.columns[column_index]);
            let new_span_key = self.spans.insert(new_span);
            self.columns[column_index] = Some(new_span_key);
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// Returns the key of the lowest span in the column at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_key_at(&self, x: u16, z: u16) -> Option<SpanKey> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.columns[self.column_index(x, z)]
    }

    /// Returns the lowest span at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_at(&self, x: u16, z: u16) -> Option<&Span> {
        self.span_key_at(x, z).map(|key| self.span(key))
    }

    /// Returns a reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.spans[key]
    }

    /// Returns a mutable reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.spans[key]
    }

    /// Iterates over the keys of all spans in the column at the given coordinates, from bottom to top.
    pub fn column_keys(&self, x: u16, z: u16) -> impl Iterator<Item = SpanKey> + '_ {
        std::iter::successors(self.span_key_at(x, z), |key| self.span(*key).next())
    }
}

/// A builder for [`Heightfield`]s.
#[derive(Debug, Clone, Copy)]
pub struct HeightfieldBuilder {
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Builds the heightfield.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell dimensions are not positive or the grid does not fit into `u16` columns and rows.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        if !(self.cell_size > 0.0 && self.cell_height > 0.0) {
            return Err(HeightfieldBuilderError::InvalidCellSize {
                cell_size: self.cell_size,
                cell_height: self.cell_height,
            });
        }
        let width = ((self.aabb.max.x - self.aabb.min.x) / self.cell_size + 0.5).max(0.0);
        let height = ((self.aabb.max.z - self.aabb.min.z) / self.cell_size + 0.5).max(0.0);
        if width > u16::MAX as f32 || height > u16::MAX as f32 {
            return Err(HeightfieldBuilderError::ColumnCountTooLarge { width, height });
        }
        let width = width as u16;
        let height = height as u16;
        let column_count = width as usize * height as usize;
        Ok(Heightfield {
            width,
            height,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            columns: vec![None; column_count],
            spans: Spans::with_min_capacity(column_count),
        })
    }
}

/// Errors that can occur when building a [`Heightfield`] with [`HeightfieldBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeightfieldBuilderError {
    /// Happens when the grid is too large along either axis.
    #[error(
        "Grid size is too large, got {width}*{height} cells but each axis is limited to {max}",
        max = u16::MAX
    )]
    ColumnCountTooLarge {
        /// The width of the heightfield along the x-axis in cell units
        width: f32,
        /// The height of the heightfield along the z-axis in cell units
        height: f32,
    },
    /// Happens when a cell dimension is zero, negative or NaN.
    #[error("Cell dimensions must be positive, got cell_size={cell_size} and cell_height={cell_height}")]
    InvalidCellSize {
        /// The requested size of each cell on the xz-plane
        cell_size: f32,
        /// The requested size of each cell along the y-axis
        cell_height: f32,
    },
}

/// Errors that can occur when inserting a span into a [`Heightfield`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpanInsertionError {
    /// Happens when the column index is out of bounds.
    #[error("column index out of bounds: x={x}, z={z}")]
    ColumnIndexOutOfBounds {
        /// The x-coordinate of the span
        x: u16,
        /// The z-coordinate of the span
        z: u16,
    },
}

pub(crate) struct SpanInsertion {
    /// The x-coordinate of the span
    pub(crate) x: u16,
    /// The z-coordinate of the span
    pub(crate) z: u16,
    /// Maximum difference between the ceilings of two spans to merge area type IDs
    pub(crate) flag_merge_threshold: u16,
    /// The span to insert
    pub(crate) span: Span,
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use crate::span::{AreaType, SpanBuilder};

    use super::*;

    fn height_field() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, [5.0, 5.0, 5.0]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn span(min: u16, max: u16, area: u8) -> Span {
        SpanBuilder {
            min,
            max,
            area: AreaType(area),
            next: None,
        }
        .build()
    }

    fn insert(heightfield: &mut Heightfield, x: u16, z: u16, threshold: u16, span: Span) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: threshold,
                span,
            })
            .unwrap();
    }

    #[test]
    fn grid_size_rounds_to_nearest_cell() {
        let heightfield = height_field();
        assert_eq!(heightfield.width, 5);
        assert_eq!(heightfield.height, 5);
        assert_eq!(heightfield.columns.len(), 25);
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let result = HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, [5.0, 5.0, 5.0]),
            cell_size: 0.0,
            cell_height: 1.0,
        }
        .build();
        assert!(matches!(
            result,
            Err(HeightfieldBuilderError::InvalidCellSize { .. })
        ));
    }

    #[test]
    fn rejects_out_of_bounds_insertion() {
        let mut heightfield = height_field();
        let result = heightfield.add_span(SpanInsertion {
            x: 5,
            z: 0,
            flag_merge_threshold: 0,
            span: span(0, 1, 1),
        });
        assert_eq!(
            result,
            Err(SpanInsertionError::ColumnIndexOutOfBounds { x: 5, z: 0 })
        );
    }

    #[test]
    fn can_add_span() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 1, 3, 0, span(2, 4, 2));
        assert_eq!(heightfield.span_at(1, 3), Some(&span(2, 4, 2)));
        assert_eq!(heightfield.span_at(3, 1), None);
    }

    #[test]
    fn keeps_disjoint_spans_sorted_in_column() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 1, 3, 0, span(7, 10, 2));
        insert(&mut heightfield, 1, 3, 0, span(2, 4, 2));

        let spans: Vec<_> = heightfield
            .column_keys(1, 3)
            .map(|key| (heightfield.span(key).min(), heightfield.span(key).max()))
            .collect();
        assert_eq!(spans, vec![(2, 4), (7, 10)]);
    }

    #[test]
    fn merges_overlapping_spans() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 1, 3, 0, span(2, 4, 2));
        insert(&mut heightfield, 1, 3, 0, span(4, 7, 2));
        assert_eq!(heightfield.span_at(1, 3), Some(&span(2, 7, 2)));
        assert_eq!(heightfield.spans.len(), 1);
    }

    #[test]
    fn merge_keeps_higher_area_within_threshold() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 0, 0, 1, span(0, 5, 9));
        insert(&mut heightfield, 0, 0, 1, span(0, 4, 3));
        assert_eq!(heightfield.span_at(0, 0).unwrap().area(), AreaType(9));

        insert(&mut heightfield, 1, 0, 1, span(0, 4, 9));
        insert(&mut heightfield, 1, 0, 1, span(0, 10, 3));
        // The new ceiling is far above the existing one, so the new area is kept.
        assert_eq!(heightfield.span_at(1, 0).unwrap().area(), AreaType(3));
    }

    #[test]
    fn merging_bridges_multiple_spans() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 2, 2, 0, span(0, 2, 1));
        insert(&mut heightfield, 2, 2, 0, span(5, 6, 1));
        insert(&mut heightfield, 2, 2, 0, span(1, 5, 1));
        assert_eq!(heightfield.span_at(2, 2), Some(&span(0, 6, 1)));
        assert_eq!(heightfield.spans.len(), 1);
    }
}
