//! Filters that run on a [`Heightfield`] after rasterization and before compaction.

use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::AreaType,
};

const MAX_HEIGHT: i32 = 0xffff;

impl Heightfield {
    /// Marks non-walkable spans as walkable if their maximum is within `walkable_climb_height` of the span below them.
    ///
    /// This removes small obstacles and rasterization artifacts that the agent would be able to walk over,
    /// such as curbs. It also allows agents to move up terraced structures like stairs.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastFilter.cpp#L27>
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb_height: u16) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut previous_max: Option<u16> = None;
                let mut previous_was_walkable = false;
                let mut previous_area = AreaType::NOT_WALKABLE;

                let mut span_key = self.span_key_at(x, z);
                while let Some(key) = span_key {
                    let span = self.span_mut(key);
                    let walkable = span.area().is_walkable();

                    // If current span is not walkable, but there is walkable span just below it and the height difference
                    // is small enough for the agent to walk over, mark the current span as walkable too.
                    if let Some(previous_max) = previous_max {
                        if !walkable
                            && previous_was_walkable
                            && span.max() as i32 - previous_max as i32
                                <= walkable_climb_height as i32
                        {
                            span.set_area(previous_area);
                        }
                    }

                    // Copy the original walkable value regardless of whether we changed it.
                    // This prevents multiple consecutive non-walkable spans from being erroneously marked as walkable.
                    previous_max = Some(span.max());
                    previous_was_walkable = walkable;
                    previous_area = span.area();
                    span_key = span.next();
                }
            }
        }
    }

    /// Marks spans that are ledges as not-walkable.
    ///
    /// A ledge is a span with one or more neighbors whose maximum is further away than `walkable_climb`
    /// from the current span's maximum. This filter also marks spans on steep slopes as not-walkable.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastFilter.cpp#L69>
    pub fn filter_ledge_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        let walkable_height = walkable_height as i32;
        let walkable_climb = walkable_climb as i32;
        for z in 0..self.height {
            for x in 0..self.width {
                let mut span_key = self.span_key_at(x, z);
                while let Some(key) = span_key {
                    let span = self.span(key);
                    span_key = span.next();
                    if !span.area().is_walkable() {
                        continue;
                    }
                    let floor = span.max() as i32;
                    let ceiling = span
                        .next()
                        .map_or(MAX_HEIGHT, |next| self.span(next).min() as i32);
                    if self.is_ledge(x, z, floor, ceiling, walkable_height, walkable_climb) {
                        self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
                    }
                }
            }
        }
    }

    fn is_ledge(
        &self,
        x: u16,
        z: u16,
        floor: i32,
        ceiling: i32,
        walkable_height: i32,
        walkable_climb: i32,
    ) -> bool {
        // The difference between this walkable area and the lowest neighbor walkable area.
        let mut lowest_neighbor_floor_difference = MAX_HEIGHT;
        // Min and max height of accessible neighbours.
        let mut lowest_traversable_neighbor_floor = floor;
        let mut highest_traversable_neighbor_floor = floor;

        for direction in 0..4 {
            let neighbor_x = x as i32 + dir_offset_x(direction) as i32;
            let neighbor_z = z as i32 + dir_offset_z(direction) as i32;
            // Out of bounds neighbours count as a drop.
            if !self.contains(neighbor_x, neighbor_z) {
                return true;
            }
            let mut neighbor_key = self.span_key_at(neighbor_x as u16, neighbor_z as u16);

            // The most we can step down to the neighbor is the walkable_climb distance.
            // Start with the area under the neighbor span
            let neighbor_ceiling = neighbor_key.map_or(MAX_HEIGHT, |key| self.span(key).min() as i32);
            // A gap under the neighbor column that fits the agent is a drop.
            if ceiling.min(neighbor_ceiling) - floor >= walkable_height {
                return true;
            }

            while let Some(key) = neighbor_key {
                let neighbor = self.span(key);
                neighbor_key = neighbor.next();
                let neighbor_floor = neighbor.max() as i32;
                let neighbor_ceiling = neighbor
                    .next()
                    .map_or(MAX_HEIGHT, |next| self.span(next).min() as i32);

                // Only consider neighboring areas that have enough overlap to be potentially traversable.
                if ceiling.min(neighbor_ceiling) - floor.max(neighbor_floor) < walkable_height {
                    continue;
                }

                let neighbor_floor_difference = neighbor_floor - floor;
                lowest_neighbor_floor_difference =
                    lowest_neighbor_floor_difference.min(neighbor_floor_difference);

                // Find min/max accessible neighbor height.
                // Only consider neighbors that are at most walkable_climb away.
                if neighbor_floor_difference.abs() <= walkable_climb {
                    lowest_traversable_neighbor_floor =
                        lowest_traversable_neighbor_floor.min(neighbor_floor);
                    highest_traversable_neighbor_floor =
                        highest_traversable_neighbor_floor.max(neighbor_floor);
                } else if neighbor_floor_difference < -walkable_climb {
                    // We already know this will be considered a ledge span so we can early-out
                    break;
                }
            }
        }

        // The current span is close to a ledge if the magnitude of the drop to any neighbour span
        // is greater than the walkable_climb distance. If the difference between all neighbor
        // floors is too large, this is a steep slope.
        lowest_neighbor_floor_difference < -walkable_climb
            || highest_traversable_neighbor_floor - lowest_traversable_neighbor_floor
                > walkable_climb
    }

    /// Marks walkable spans as not walkable if the clearance above the span is less than the specified `walkable_height`.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastFilter.cpp#L178>
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: u16) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut span_key = self.span_key_at(x, z);
                while let Some(key) = span_key {
                    let span = self.span(key);
                    span_key = span.next();
                    let floor = span.max() as i32;
                    let ceiling = span
                        .next()
                        .map_or(MAX_HEIGHT, |next| self.span(next).min() as i32);
                    if ceiling - floor < walkable_height as i32 {
                        self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use crate::{
        Aabb3d,
        heightfield::{HeightfieldBuilder, SpanInsertion},
        span::SpanBuilder,
    };

    use super::*;

    fn heightfield(size: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, [size, 10.0, size]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn insert(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, area: AreaType) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    area,
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    fn areas(heightfield: &Heightfield, x: u16, z: u16) -> Vec<AreaType> {
        heightfield
            .column_keys(x, z)
            .map(|key| heightfield.span(key).area())
            .collect()
    }

    #[test]
    fn low_obstacle_on_walkable_span_becomes_walkable() {
        let mut heightfield = heightfield(1.0);
        insert(&mut heightfield, 0, 0, 0, 2, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 0, 0, 3, 4, AreaType::NOT_WALKABLE);
        insert(&mut heightfield, 0, 0, 5, 6, AreaType::NOT_WALKABLE);
        heightfield.filter_low_hanging_walkable_obstacles(2);
        assert_eq!(
            areas(&heightfield, 0, 0),
            vec![
                AreaType::DEFAULT_WALKABLE,
                AreaType::DEFAULT_WALKABLE,
                AreaType::NOT_WALKABLE
            ]
        );
    }

    #[test]
    fn low_ceiling_makes_span_unwalkable() {
        let mut heightfield = heightfield(1.0);
        insert(&mut heightfield, 0, 0, 0, 2, AreaType::DEFAULT_WALKABLE);
        insert(&mut heightfield, 0, 0, 4, 5, AreaType::DEFAULT_WALKABLE);
        heightfield.filter_walkable_low_height_spans(3);
        assert_eq!(
            areas(&heightfield, 0, 0),
            vec![AreaType::NOT_WALKABLE, AreaType::DEFAULT_WALKABLE]
        );
    }

    #[test]
    fn border_spans_are_ledges() {
        let mut heightfield = heightfield(3.0);
        for z in 0..3 {
            for x in 0..3 {
                insert(&mut heightfield, x, z, 0, 1, AreaType::DEFAULT_WALKABLE);
            }
        }
        heightfield.filter_ledge_spans(2, 1);
        assert_eq!(areas(&heightfield, 1, 1), vec![AreaType::DEFAULT_WALKABLE]);
        assert_eq!(areas(&heightfield, 0, 1), vec![AreaType::NOT_WALKABLE]);
        assert_eq!(areas(&heightfield, 2, 2), vec![AreaType::NOT_WALKABLE]);
    }

    #[test]
    fn steep_drop_next_to_span_is_a_ledge() {
        let mut heightfield = heightfield(3.0);
        for z in 0..3 {
            for x in 0..3 {
                insert(&mut heightfield, x, z, 0, 1, AreaType::DEFAULT_WALKABLE);
            }
        }
        // Raise the center column so that its neighbours are a drop of 4 cells.
        insert(&mut heightfield, 1, 1, 1, 5, AreaType::DEFAULT_WALKABLE);
        heightfield.filter_ledge_spans(2, 1);
        assert_eq!(areas(&heightfield, 1, 1), vec![AreaType::NOT_WALKABLE]);
    }
}
