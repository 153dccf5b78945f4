//! Monotone and layer partitioning.
//!
//! Both partition the heightfield by sweeping it row by row and joining each row's runs
//! with the unique run they touch in the previous row.
//!
//! Monotone partitioning
//!   - fastest
//!   - partitions the heightfield into regions without holes and overlaps (guaranteed)
//!   - creates long thin polygons, which sometimes causes paths with detours
//!   * use this if you want fast navmesh generation
//!
//! Layer partitioning
//!   - quite fast
//!   - partitions the heightfield into non-overlapping regions
//!   - relies on the triangulation code to cope with holes (thus slower than monotone partitioning)
//!   - produces better triangles than monotone partitioning
//!   - does not have the corner cases of watershed partitioning
//!   * good choice to use for tiled navmesh with medium and small sized tiles

use crate::{
    CompactHeightfield,
    region::{RegionError, RegionId},
};

const NULL_NEIGHBOR: u16 = 0xffff;

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// Row id
    row_id: u16,
    /// Region id
    id: u16,
    /// Number of samples
    samples: u16,
    /// Neighbour id
    neighbor: u16,
}

impl CompactHeightfield {
    /// Builds region data for the heightfield using simple monotone partitioning.
    ///
    /// Non-null regions will consist of connected, non-overlapping walkable spans that form a single contour.
    /// Contours will form simple polygons.
    ///
    /// If multiple regions form an area that is smaller than `min_region_area`, then all spans will be
    /// re-assigned to [`RegionId::NONE`].
    ///
    /// Partitioning can result in smaller than necessary regions. `merge_region_area` helps
    /// reduce unnecessarily small regions.
    ///
    /// # Errors
    ///
    /// Returns an error if too many regions were generated.
    pub fn build_regions_monotone(
        &mut self,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionError> {
        let (mut src_reg, max_region_id) = self.sweep_rows()?;
        self.max_region = RegionId(self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            max_region_id,
            &mut src_reg,
        ));
        self.store_regions(src_reg);
        Ok(())
    }

    /// Builds region data for the heightfield by partitioning it into non-overlapping layers.
    ///
    /// Layers smaller than `min_region_area` that do not touch a border are re-assigned to [`RegionId::NONE`].
    ///
    /// # Errors
    ///
    /// Returns an error if too many regions were generated.
    pub fn build_layer_regions(&mut self, min_region_area: u16) -> Result<(), RegionError> {
        let (mut src_reg, max_region_id) = self.sweep_rows()?;
        self.max_region = RegionId(self.merge_and_filter_layer_regions(
            min_region_area,
            max_region_id,
            &mut src_reg,
        ));
        self.store_regions(src_reg);
        Ok(())
    }

    fn store_regions(&mut self, src_reg: Vec<RegionId>) {
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
    }

    /// Assigns monotone region ids row by row.
    /// Returns the region of every span and the next unused region id.
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRegion.cpp#L1499>
    fn sweep_rows(&self) -> Result<(Vec<RegionId>, u16), RegionError> {
        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut id = 1_u16;
        let mut sweeps: Vec<SweepSpan> = Vec::with_capacity(self.width.max(self.height) as usize + 1);
        let mut prev: Vec<u16> = Vec::with_capacity(256);

        // Sweep one line at a time.
        for z in 0..self.height {
            // Collect spans from this row.
            prev.clear();
            prev.resize(id as usize + 1, 0);
            sweeps.clear();
            sweeps.push(SweepSpan::default());
            let mut row_id = 1_u16;

            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() {
                        continue;
                    }
                    let span = self.spans[i];

                    // -x
                    let mut previous_id = 0;
                    if let Some(con) = span.con(0) {
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, 0, con);
                        if !src_reg[a_i].is_border() && self.areas[i] == self.areas[a_i] {
                            previous_id = src_reg[a_i].0;
                        }
                    }

                    if previous_id == 0 {
                        previous_id = row_id;
                        row_id += 1;
                        sweeps.push(SweepSpan {
                            row_id: previous_id,
                            ..Default::default()
                        });
                    }

                    // -z
                    if let Some(con) = span.con(3) {
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, 3, con);
                        let neighbor_region = src_reg[a_i];
                        if neighbor_region != RegionId::NONE
                            && !neighbor_region.is_border()
                            && self.areas[i] == self.areas[a_i]
                        {
                            let sweep = &mut sweeps[previous_id as usize];
                            if sweep.neighbor == 0 || sweep.neighbor == neighbor_region.0 {
                                sweep.neighbor = neighbor_region.0;
                                sweep.samples += 1;
                                prev[neighbor_region.0 as usize] += 1;
                            } else {
                                sweep.neighbor = NULL_NEIGHBOR;
                            }
                        }
                    }

                    src_reg[i] = RegionId(previous_id);
                }
            }

            // Create unique ID.
            for sweep in sweeps.iter_mut().skip(1) {
                if sweep.neighbor != NULL_NEIGHBOR
                    && sweep.neighbor != 0
                    && prev[sweep.neighbor as usize] == sweep.samples
                {
                    sweep.id = sweep.neighbor;
                } else {
                    if id >= RegionId::MAX {
                        return Err(RegionError::TooManyRegions);
                    }
                    sweep.id = id;
                    id += 1;
                }
            }

            // Remap IDs
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let row_region = src_reg[i].0;
                    if row_region > 0 && row_region < row_id {
                        debug_assert_eq!(sweeps[row_region as usize].row_id, row_region);
                        src_reg[i] = RegionId(sweeps[row_region as usize].id);
                    }
                }
            }
        }

        Ok((src_reg, id))
    }
}

#[cfg(test)]
mod tests {
    use crate::{compact_heightfield::tests::flat_compact_heightfield, span::AreaType};

    use super::*;

    #[test]
    fn monotone_open_floor_is_one_region() {
        let mut chf = flat_compact_heightfield(6);
        chf.build_regions_monotone(4, 400).unwrap();
        assert_eq!(chf.max_region, RegionId(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId(1)));
    }

    #[test]
    fn layers_open_floor_is_one_region() {
        let mut chf = flat_compact_heightfield(6);
        chf.build_layer_regions(4).unwrap();
        assert_eq!(chf.max_region, RegionId(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId(1)));
    }

    #[test]
    fn wall_splits_monotone_regions() {
        let mut chf = flat_compact_heightfield(6);
        // Block the column x = 2 completely.
        for z in 0..chf.height {
            for i in chf.cell_at(2, z).index_range() {
                chf.areas[i] = AreaType::NOT_WALKABLE;
            }
        }
        chf.build_regions_monotone(1, 0).unwrap();
        assert_eq!(chf.max_region, RegionId(2));
        let left = chf.spans[chf.cell_at(0, 0).index() as usize].region;
        let right = chf.spans[chf.cell_at(5, 5).index() as usize].region;
        assert_ne!(left, right);
        assert_ne!(left, RegionId::NONE);
        assert_ne!(right, RegionId::NONE);
    }

    #[test]
    fn small_layers_are_removed() {
        let mut chf = flat_compact_heightfield(2);
        chf.build_layer_regions(16).unwrap();
        assert_eq!(chf.max_region, RegionId::NONE);
        assert!(chf.spans.iter().all(|span| span.region == RegionId::NONE));
    }
}
