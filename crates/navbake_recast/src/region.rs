use std::ops::{BitAnd, BitOr};

use thiserror::Error;

use crate::{CompactHeightfield, span::AreaType};

/// The id of a region in a [`CompactHeightfield`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RegionId(pub u16);

impl From<u16> for RegionId {
    fn from(value: u16) -> Self {
        RegionId(value)
    }
}

impl BitOr for RegionId {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for RegionId {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl RegionId {
    /// The id of spans that are not in a region, i.e. not walkable.
    pub const NONE: Self = Self(0);

    /// Heightfield border flag.
    /// If a heightfield region ID has this bit set, then the region is a border
    /// region and its spans are considered un-walkable.
    pub const BORDER_REGION: Self = Self(0x8000);

    /// The highest id a partitioner may hand out before ids would collide with [`Self::BORDER_REGION`].
    pub(crate) const MAX: u16 = Self::BORDER_REGION.0 - 1;

    /// Returns whether the [`Self::BORDER_REGION`] flag is set.
    #[inline]
    pub fn is_border(self) -> bool {
        self.0 & Self::BORDER_REGION.0 != 0
    }
}

/// Errors that can occur when partitioning a [`CompactHeightfield`] into regions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// More regions were generated than a [`RegionId`] can address.
    #[error("Region id overflow, more than {max} regions were generated", max = RegionId::MAX)]
    TooManyRegions,
    /// Regions were requested before the distance field was built.
    #[error("The distance field must be built before building watershed regions")]
    MissingDistanceField,
}

#[derive(Debug, Clone)]
struct Region {
    span_count: usize,
    id: u16,
    area: AreaType,
    remap: bool,
    visited: bool,
    overlap: bool,
    connects_to_border: bool,
    connects_to_null: bool,
    connections: Vec<u16>,
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area: AreaType::NOT_WALKABLE,
            remap: false,
            visited: false,
            overlap: false,
            connects_to_border: false,
            connects_to_null: false,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.id != 0 && self.id & RegionId::BORDER_REGION.0 == 0
    }

    fn add_unique_connection(&mut self, id: u16) {
        if !self.connections.contains(&id) {
            self.connections.push(id);
        }
    }

    fn add_unique_floor(&mut self, id: u16) {
        if !self.floors.contains(&id) {
            self.floors.push(id);
        }
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        self.area == other.area && !self.floors.contains(&other.id)
    }

    fn replace_neighbour(&mut self, old_id: u16, new_id: u16) {
        let own_id = self.id;
        for list in [&mut self.connections, &mut self.floors] {
            let mut replaced = false;
            for id in list.iter_mut() {
                if *id == old_id {
                    *id = new_id;
                    replaced = true;
                }
            }
            if replaced {
                let mut seen = Vec::with_capacity(list.len());
                list.retain(|id| {
                    let keep = *id != own_id && !seen.contains(id);
                    seen.push(*id);
                    keep
                });
            }
        }
    }
}

impl CompactHeightfield {
    /// Gathers per-region span counts, neighbours and overlapping floors from `src_reg`.
    fn collect_regions(&self, region_count: usize, src_reg: &[RegionId]) -> Vec<Region> {
        let mut regions: Vec<Region> = (0..region_count).map(|i| Region::new(i as u16)).collect();
        let mut column_regions = Vec::with_capacity(32);

        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell_at(x, z);
                column_regions.clear();
                for i in cell.index_range() {
                    let r = src_reg[i].0 as usize;
                    if r == 0 || r >= region_count {
                        continue;
                    }
                    column_regions.push(r as u16);
                    let span = self.spans[i];
                    let region = &mut regions[r];
                    region.span_count += 1;
                    region.area = self.areas[i];

                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            region.connects_to_null = true;
                            continue;
                        };
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        let neighbor = src_reg[a_i];
                        if neighbor == RegionId::NONE {
                            region.connects_to_null = true;
                        } else if neighbor.is_border() {
                            region.connects_to_border = true;
                        } else if neighbor.0 as usize != r && (neighbor.0 as usize) < region_count
                        {
                            region.add_unique_connection(neighbor.0);
                        }
                    }
                }

                // Update overlapping regions.
                for (a, &ri) in column_regions.iter().enumerate() {
                    for &rj in &column_regions[a + 1..] {
                        if ri == rj {
                            regions[ri as usize].overlap = true;
                        } else {
                            regions[ri as usize].add_unique_floor(rj);
                            regions[rj as usize].add_unique_floor(ri);
                        }
                    }
                }
            }
        }
        regions
    }

    /// Removes regions too small to be useful and merges small regions into their neighbours.
    ///
    /// Returns the new highest region id.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRegion.cpp#L1026>
    pub(crate) fn merge_and_filter_regions(
        &self,
        min_region_area: u16,
        merge_region_size: u16,
        max_region_id: u16,
        src_reg: &mut [RegionId],
    ) -> u16 {
        let region_count = max_region_id as usize + 1;
        let mut regions = self.collect_regions(region_count, src_reg);

        // Remove too small regions.
        let mut stack = Vec::with_capacity(32);
        let mut trace = Vec::with_capacity(32);
        for i in 0..region_count {
            let region = &regions[i];
            if !region.is_live() || region.span_count == 0 || region.visited {
                continue;
            }

            // Count the total size of all the connected regions.
            // Also keep track of the regions connects to a tile border.
            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();

            regions[i].visited = true;
            stack.push(i);
            while let Some(ri) = stack.pop() {
                let current = &regions[ri];
                span_count += current.span_count;
                connects_to_border |= current.connects_to_border;
                trace.push(ri);
                let connections = current.connections.clone();
                for neighbor in connections {
                    let neighbor = &mut regions[neighbor as usize];
                    if neighbor.visited || !neighbor.is_live() {
                        continue;
                    }
                    neighbor.visited = true;
                    stack.push(neighbor.id as usize);
                }
            }

            // If the accumulated regions size is too small, remove it.
            // Do not remove areas which connect to tiles though.
            if span_count < min_region_area as usize && !connects_to_border {
                for &ri in &trace {
                    regions[ri].span_count = 0;
                    regions[ri].id = 0;
                }
            }
        }

        // Merge too small regions to neighbour regions.
        loop {
            let mut merge_count = 0;
            for i in 0..region_count {
                let region = &regions[i];
                if !region.is_live() || region.overlap || region.span_count == 0 {
                    continue;
                }
                // Check to see if the region should be merged.
                if region.span_count > merge_region_size as usize && region.connects_to_null {
                    continue;
                }

                // Small region with more than 1 connection.
                // Or region which is not connected to a border at all.
                // Find smallest neighbour region that connects to this one.
                let mut smallest = usize::MAX;
                let mut merge_id = region.id;
                for &neighbor in &region.connections {
                    let candidate = &regions[neighbor as usize];
                    if !candidate.is_live() || candidate.overlap {
                        continue;
                    }
                    if candidate.span_count < smallest
                        && region.can_merge_with(candidate)
                        && candidate.can_merge_with(region)
                    {
                        smallest = candidate.span_count;
                        merge_id = candidate.id;
                    }
                }

                // Found new id.
                if merge_id != region.id {
                    let old_id = region.id;
                    let merged = std::mem::replace(&mut regions[i], Region::new(old_id));
                    regions[i].area = merged.area;
                    let target = &mut regions[merge_id as usize];
                    target.span_count += merged.span_count;
                    target.connects_to_border |= merged.connects_to_border;
                    target.connects_to_null |= merged.connects_to_null;
                    for connection in merged.connections {
                        if connection != merge_id {
                            target.add_unique_connection(connection);
                        }
                    }
                    for floor in merged.floors {
                        target.add_unique_floor(floor);
                    }

                    // Fixup regions pointing to current region.
                    for other in regions.iter_mut() {
                        if !other.is_live() {
                            continue;
                        }
                        // If another region was already merged into current region
                        // change the nid of the previous region too.
                        if other.id == old_id {
                            other.id = merge_id;
                        }
                        // Replace the current region with the new one if the current regions is neighbour.
                        other.replace_neighbour(old_id, merge_id);
                    }
                    merge_count += 1;
                }
            }
            if merge_count == 0 {
                break;
            }
        }

        compress_region_ids(&mut regions, src_reg)
    }

    /// Merges monotone regions into non-overlapping layers and removes layers that are too small.
    ///
    /// Returns the new highest region id.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRegion.cpp#L1246>
    pub(crate) fn merge_and_filter_layer_regions(
        &self,
        min_region_area: u16,
        max_region_id: u16,
        src_reg: &mut [RegionId],
    ) -> u16 {
        let region_count = max_region_id as usize + 1;
        let mut regions = self.collect_regions(region_count, src_reg);

        // Create 2D layers from regions.
        for region in regions.iter_mut() {
            region.id = 0;
        }
        let mut layer_id = 1_u16;
        let mut queue = std::collections::VecDeque::with_capacity(32);
        for i in 1..region_count {
            // Skip already visited.
            if regions[i].id != 0 {
                continue;
            }
            // Start search.
            regions[i].id = layer_id;
            queue.clear();
            queue.push_back(i);

            while let Some(ri) = queue.pop_front() {
                let connections = regions[ri].connections.clone();
                let area = regions[ri].area;
                for neighbor in connections {
                    let neighbor = neighbor as usize;
                    let candidate = &regions[neighbor];
                    // Skip already visited.
                    if candidate.id != 0 {
                        continue;
                    }
                    // Skip if different area type, do not connect regions with different area type.
                    if candidate.area != area {
                        continue;
                    }
                    // Skip if the neighbour is overlapping root region.
                    if regions[i].floors.contains(&(neighbor as u16)) {
                        continue;
                    }

                    // Deepen
                    queue.push_back(neighbor);
                    // Mark layer id
                    regions[neighbor].id = layer_id;
                    // Merge current layers to root.
                    let floors = std::mem::take(&mut regions[neighbor].floors);
                    let span_count = std::mem::take(&mut regions[neighbor].span_count);
                    let connects_to_border = regions[neighbor].connects_to_border;
                    let root = &mut regions[i];
                    for floor in floors {
                        root.add_unique_floor(floor);
                    }
                    root.span_count += span_count;
                    root.connects_to_border |= connects_to_border;
                }
            }
            layer_id += 1;
        }

        // Remove small regions
        for i in 0..region_count {
            let region = &regions[i];
            if region.span_count > 0
                && region.span_count < min_region_area as usize
                && !region.connects_to_border
            {
                let id = region.id;
                for other in regions.iter_mut() {
                    if other.id == id {
                        other.id = 0;
                    }
                }
            }
        }

        compress_region_ids(&mut regions, src_reg)
    }
}

/// Renumbers the surviving regions to `1..=n`, writes them back to `src_reg` and returns `n`.
///
/// An id survives only if a region holding spans carries it.
fn compress_region_ids(regions: &mut [Region], src_reg: &mut [RegionId]) -> u16 {
    let mut owns_spans = vec![false; regions.len()];
    for region in regions.iter() {
        if region.is_live() && region.span_count > 0 {
            if let Some(owned) = owns_spans.get_mut(region.id as usize) {
                *owned = true;
            }
        }
    }
    for region in regions.iter_mut() {
        region.remap = region.is_live();
        if region.remap && !owns_spans.get(region.id as usize).copied().unwrap_or(false) {
            region.id = 0;
            region.remap = false;
        }
    }
    let mut region_id_gen = 0_u16;
    for i in 0..regions.len() {
        if !regions[i].remap {
            continue;
        }
        let old_id = regions[i].id;
        region_id_gen += 1;
        for region in regions[i..].iter_mut() {
            if region.id == old_id {
                region.id = region_id_gen;
                region.remap = false;
            }
        }
    }

    // Remap regions.
    for region in src_reg.iter_mut() {
        if !region.is_border() {
            *region = RegionId(regions[region.0 as usize].id);
        }
    }
    region_id_gen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact_heightfield::tests::flat_compact_heightfield;

    #[test]
    fn border_flag_is_detected() {
        assert!(RegionId::BORDER_REGION.is_border());
        assert!((RegionId(3) | RegionId::BORDER_REGION).is_border());
        assert!(!RegionId(3).is_border());
        assert_eq!(
            (RegionId(3) | RegionId::BORDER_REGION) & RegionId(0x7fff),
            RegionId(3)
        );
    }

    /// Splits a flat field into two halves along x.
    fn halves(chf: &CompactHeightfield) -> Vec<RegionId> {
        let mut src_reg = vec![RegionId::NONE; chf.spans.len()];
        for z in 0..chf.height {
            for x in 0..chf.width {
                for i in chf.cell_at(x, z).index_range() {
                    src_reg[i] = if x < chf.width / 2 {
                        RegionId(1)
                    } else {
                        RegionId(2)
                    };
                }
            }
        }
        src_reg
    }

    #[test]
    fn small_neighbours_are_merged() {
        let chf = flat_compact_heightfield(4);
        let mut src_reg = halves(&chf);
        let max = chf.merge_and_filter_regions(0, 20, 2, &mut src_reg);
        assert_eq!(max, 1);
        assert!(src_reg.iter().all(|r| *r == RegionId(1)));
    }

    #[test]
    fn large_regions_are_kept_apart() {
        let chf = flat_compact_heightfield(4);
        let mut src_reg = halves(&chf);
        let max = chf.merge_and_filter_regions(0, 2, 2, &mut src_reg);
        assert_eq!(max, 2);
        assert!(src_reg.contains(&RegionId(1)));
        assert!(src_reg.contains(&RegionId(2)));
    }

    #[test]
    fn tiny_islands_are_removed() {
        let chf = flat_compact_heightfield(2);
        let mut src_reg = vec![RegionId(1); chf.spans.len()];
        let max = chf.merge_and_filter_regions(8, 0, 1, &mut src_reg);
        assert_eq!(max, 0);
        assert!(src_reg.iter().all(|r| *r == RegionId::NONE));
    }

    #[test]
    fn unused_ids_are_not_counted() {
        let chf = flat_compact_heightfield(4);
        let mut src_reg = vec![RegionId(1); chf.spans.len()];
        // Row sweeps pass the next unused id as the upper bound.
        let max = chf.merge_and_filter_regions(0, 0, 3, &mut src_reg);
        assert_eq!(max, 1);
        assert!(src_reg.iter().all(|r| *r == RegionId(1)));
    }

    #[test]
    fn unused_ids_do_not_become_layers() {
        let chf = flat_compact_heightfield(4);
        let mut src_reg = vec![RegionId(1); chf.spans.len()];
        let max = chf.merge_and_filter_layer_regions(0, 2, &mut src_reg);
        assert_eq!(max, 1);
        assert!(src_reg.iter().all(|r| *r == RegionId(1)));
    }

    #[test]
    fn layers_join_adjacent_regions() {
        let chf = flat_compact_heightfield(4);
        let mut src_reg = halves(&chf);
        let max = chf.merge_and_filter_layer_regions(0, 2, &mut src_reg);
        assert_eq!(max, 1);
        assert!(src_reg.iter().all(|r| *r == RegionId(1)));
    }
}
