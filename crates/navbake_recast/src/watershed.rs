//! Watershed partitioning
//!   - the classic Recast partitioning
//!   - creates the nicest tessellation
//!   - usually slowest
//!   - partitions the heightfield into nice regions without holes or overlaps
//!   - the are some corner cases where this method creates produces holes and overlaps
//!      - holes may appear when a small obstacles is close to large open area (triangulation can handle this)
//!      - overlaps may occur if you have narrow spiral corridors (i.e stairs), this make triangulation to fail
//!   * generally the best choice if you precompute the navmesh, use this if you have large open areas

use crate::{
    CompactHeightfield,
    region::{RegionError, RegionId},
};

impl CompactHeightfield {
    /// Builds region data for the heightfield using watershed partitioning.
    ///
    /// Non-null regions will consist of connected, non-overlapping walkable spans that form a single contour.
    /// Contours will form simple polygons.
    ///
    /// If multiple regions form an area that is smaller than `min_region_area`, then all spans will be
    /// re-assigned to [`RegionId::NONE`].
    ///
    /// Watershed partitioning can result in smaller than necessary regions, especially in diagonal corridors.
    /// `merge_region_area` helps reduce unnecessarily small regions.
    ///
    /// The distance field must be created using [`CompactHeightfield::build_distance_field`] before attempting to build regions.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance field is missing or too many regions were generated.
    pub fn build_regions(
        &mut self,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionError> {
        if self.dist.len() != self.spans.len() {
            return Err(RegionError::MissingDistanceField);
        }

        const LOG_NB_STACKS: usize = 3;
        const NB_STACKS: usize = 1 << LOG_NB_STACKS;
        let mut level_stacks: [Vec<LevelStackEntry>; NB_STACKS] = [const { Vec::new() }; NB_STACKS];
        for stack in &mut level_stacks {
            stack.reserve(256);
        }
        let mut stack: Vec<LevelStackEntry> = Vec::with_capacity(256);

        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut src_dist = vec![0_u16; self.spans.len()];

        let mut region_id = 1_u16;
        let mut level = (self.max_distance + 1) & !1;

        // TODO: Figure better formula, expand_iters defines how much the
        // watershed "overflows" and simplifies the regions. Tying it to
        // agent radius was usually good indication how greedy it could be.
        let expand_iters = 8;

        let mut s_id = -1_i32;
        while level > 0 {
            level = level.saturating_sub(2);
            s_id = (s_id + 1) & (NB_STACKS as i32 - 1);

            if s_id == 0 {
                self.sort_cells_by_level(level, &src_reg, &mut level_stacks, 1);
            } else {
                // copy left overs from last level
                let (src, dst) = level_stacks.split_at_mut(s_id as usize);
                append_stacks(&src[s_id as usize - 1], &mut dst[0], &src_reg);
            }

            let current = &mut level_stacks[s_id as usize];
            self.expand_regions(
                expand_iters,
                level,
                &mut src_reg,
                &mut src_dist,
                current,
                false,
            );

            // Mark new regions with IDs.
            for j in 0..current.len() {
                let entry = current[j].clone();
                let Some(i) = entry.index else {
                    continue;
                };
                if src_reg[i] != RegionId::NONE {
                    continue;
                }
                if self.flood_region(
                    entry,
                    level,
                    RegionId(region_id),
                    &mut src_reg,
                    &mut src_dist,
                    &mut stack,
                ) {
                    if region_id >= RegionId::MAX {
                        return Err(RegionError::TooManyRegions);
                    }
                    region_id += 1;
                }
            }
        }

        // Expand current regions until no empty connected cells found.
        self.expand_regions(
            expand_iters * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut stack,
            true,
        );

        // Merge regions and filter out small regions.
        self.max_region = RegionId(self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            region_id,
            &mut src_reg,
        ));

        // Write the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }

    fn sort_cells_by_level(
        &self,
        start_level: u16,
        src_reg: &[RegionId],
        stacks: &mut [Vec<LevelStackEntry>],
        log_levels_per_stack: u16,
    ) {
        let start_level = start_level >> log_levels_per_stack;
        for stack in stacks.iter_mut() {
            stack.clear();
        }

        // put all cells in the level range into the appropriate stacks
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() || src_reg[i] != RegionId::NONE {
                        continue;
                    }
                    let level = self.dist[i] >> log_levels_per_stack;
                    let s_id = start_level.saturating_sub(level) as usize;
                    if s_id >= stacks.len() {
                        continue;
                    }
                    stacks[s_id].push(LevelStackEntry {
                        x,
                        z,
                        index: Some(i),
                    });
                }
            }
        }
    }

    fn expand_regions(
        &self,
        max_iter: u16,
        level: u16,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
        fill_stack: bool,
    ) {
        if fill_stack {
            // Find cells revealed by the raised level.
            stack.clear();
            for z in 0..self.height {
                for x in 0..self.width {
                    for i in self.cell_at(x, z).index_range() {
                        if self.dist[i] >= level
                            && src_reg[i] == RegionId::NONE
                            && self.areas[i].is_walkable()
                        {
                            stack.push(LevelStackEntry {
                                x,
                                z,
                                index: Some(i),
                            });
                        }
                    }
                }
            }
        } else {
            // use cells in the input stack
            // mark all cells which already have a region
            for entry in stack.iter_mut() {
                if entry.index.is_some_and(|i| src_reg[i] != RegionId::NONE) {
                    entry.index = None;
                }
            }
        }

        let mut dirty_entries = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            dirty_entries.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };

                let mut r = src_reg[i];
                let mut d2 = u16::MAX;
                let area = self.areas[i];
                let span = &self.spans[i];
                for dir in 0..4 {
                    let Some(con) = span.con(dir) else {
                        continue;
                    };
                    let (_, _, a_index) = self.con_indices(entry.x as i32, entry.z as i32, dir, con);
                    if self.areas[a_index] != area {
                        continue;
                    }
                    let a_region = src_reg[a_index];
                    let a_dist = src_dist[a_index].saturating_add(2);
                    if a_region != RegionId::NONE && !a_region.is_border() && a_dist < d2 {
                        r = a_region;
                        d2 = a_dist;
                    }
                }
                if r != RegionId::NONE {
                    // Mark as used
                    entry.index = None;
                    dirty_entries.push(DirtyEntry {
                        index: i,
                        region: r,
                        distance2: d2,
                    });
                } else {
                    failed += 1;
                }
            }

            // Copy entries that differ between src and dst to keep them in sync.
            for dirty_entry in &dirty_entries {
                src_reg[dirty_entry.index] = dirty_entry.region;
                src_dist[dirty_entry.index] = dirty_entry.distance2;
            }

            if failed == stack.len() {
                break;
            }

            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    /// Flood fills a new region from `entry`, stopping at cells below `level - 2`
    /// and backing off where another region is adjacent.
    /// Returns whether any cell was claimed.
    fn flood_region(
        &self,
        entry: LevelStackEntry,
        level: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) -> bool {
        let Some(start) = entry.index else {
            return false;
        };
        let area = self.areas[start];

        // Flood fill mark region.
        stack.clear();
        stack.push(entry);
        src_reg[start] = region;
        src_dist[start] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some(LevelStackEntry {
            x: c_x,
            z: c_z,
            index: Some(c_i),
        }) = stack.pop()
        {
            let span = self.spans[c_i];

            // Check if any of the neighbours already have a valid region set.
            let mut adjacent_region = RegionId::NONE;
            'dirs: for dir in 0..4 {
                // 8 connected
                let Some(con) = span.con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = self.con_indices(c_x as i32, c_z as i32, dir, con);
                if self.areas[a_i] != area {
                    continue;
                }
                let neighbor_region = src_reg[a_i];
                // Do not take borders into account.
                if neighbor_region.is_border() {
                    continue;
                }
                if neighbor_region != RegionId::NONE && neighbor_region != region {
                    adjacent_region = neighbor_region;
                    break 'dirs;
                }

                let dir2 = (dir + 1) & 0x3;
                if let Some(a_con) = self.spans[a_i].con(dir2) {
                    let (_, _, a_i2) = self.con_indices(a_x, a_z, dir2, a_con);
                    if self.areas[a_i2] != area {
                        continue;
                    }
                    let neighbor_region2 = src_reg[a_i2];
                    if neighbor_region2 != RegionId::NONE && neighbor_region2 != region {
                        adjacent_region = neighbor_region2;
                        break 'dirs;
                    }
                }
            }
            if adjacent_region != RegionId::NONE {
                src_reg[c_i] = RegionId::NONE;
                continue;
            }

            count += 1;

            // Expand neighbours.
            for dir in 0..4 {
                let Some(con) = span.con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = self.con_indices(c_x as i32, c_z as i32, dir, con);
                if self.areas[a_i] != area {
                    continue;
                }
                if self.dist[a_i] >= lev && src_reg[a_i] == RegionId::NONE {
                    src_reg[a_i] = region;
                    src_dist[a_i] = 0;
                    stack.push(LevelStackEntry {
                        x: a_x as u16,
                        z: a_z as u16,
                        index: Some(a_i),
                    });
                }
            }
        }

        count > 0
    }
}

fn append_stacks(
    src_stack: &[LevelStackEntry],
    dst_stack: &mut Vec<LevelStackEntry>,
    src_reg: &[RegionId],
) {
    for entry in src_stack {
        let Some(i) = entry.index else {
            continue;
        };
        if src_reg[i] != RegionId::NONE {
            continue;
        }
        dst_stack.push(entry.clone());
    }
}

#[derive(Clone, Debug)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    index: Option<usize>,
}

#[derive(Clone, Debug)]
struct DirtyEntry {
    index: usize,
    region: RegionId,
    distance2: u16,
}

#[cfg(test)]
mod tests {
    use crate::compact_heightfield::tests::flat_compact_heightfield;

    use super::*;

    #[test]
    fn requires_distance_field() {
        let mut chf = flat_compact_heightfield(4);
        assert_eq!(
            chf.build_regions(0, 0),
            Err(RegionError::MissingDistanceField)
        );
    }

    #[test]
    fn open_floor_becomes_a_single_region() {
        let mut chf = flat_compact_heightfield(8);
        chf.build_distance_field();
        chf.build_regions(4, 400).unwrap();
        assert_eq!(chf.max_region, RegionId(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId(1)));
    }

    #[test]
    fn floor_smaller_than_min_area_is_removed() {
        let mut chf = flat_compact_heightfield(3);
        chf.build_distance_field();
        chf.build_regions(64, 400).unwrap();
        assert_eq!(chf.max_region, RegionId::NONE);
        assert!(chf.spans.iter().all(|span| span.region == RegionId::NONE));
    }
}
