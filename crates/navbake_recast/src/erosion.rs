use crate::{CompactHeightfield, span::AreaType};

impl CompactHeightfield {
    /// Erode the walkable area by agent radius.
    ///
    /// Every walkable span closer than `walkable_radius` cells to a boundary is marked as not walkable.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastArea.cpp#L34>
    pub fn erode_walkable_area(&mut self, walkable_radius: u16) {
        let mut distance_to_boundary = vec![u8::MAX as u16; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for span_index in self.cell_at(x, z).index_range() {
                    if !self.areas[span_index].is_walkable() {
                        distance_to_boundary[span_index] = 0;
                        continue;
                    }
                    let span = &self.spans[span_index];
                    // Check that there is a non-null adjacent span in each of the 4 cardinal directions.
                    let neighbor_count = (0..4)
                        .filter(|&direction| {
                            span.con(direction).is_some_and(|con| {
                                let (_, _, neighbor_index) =
                                    self.con_indices(x as i32, z as i32, direction, con);
                                self.areas[neighbor_index].is_walkable()
                            })
                        })
                        .count();

                    // At least one missing neighbour, so this is a boundary cell.
                    if neighbor_count != 4 {
                        distance_to_boundary[span_index] = 0;
                    }
                }
            }
        }

        self.chamfer_distance(&mut distance_to_boundary);

        let threshold = (walkable_radius * 2).min(u8::MAX as u16);
        for (area, distance) in self.areas.iter_mut().zip(&distance_to_boundary) {
            if *distance < threshold {
                *area = AreaType::NOT_WALKABLE;
            }
        }
    }
}
