//! Distance-to-boundary fields over a [`CompactHeightfield`], used by erosion and watershed partitioning.

use crate::CompactHeightfield;

impl CompactHeightfield {
    /// Prepare for region partitioning, by calculating distance field along the walkable surface.
    ///
    /// The result is stored in [`CompactHeightfield::dist`] and [`CompactHeightfield::max_distance`].
    ///
    /// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Source/RecastRegion.cpp#L1664>
    pub fn build_distance_field(&mut self) {
        let mut src = vec![u16::MAX; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let span = self.spans[i];
                    let area = self.areas[i];
                    let neighbor_count = (0..4)
                        .filter(|&dir| {
                            span.con(dir).is_some_and(|con| {
                                let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                                self.areas[a_i] == area
                            })
                        })
                        .count();
                    if neighbor_count != 4 {
                        src[i] = 0;
                    }
                }
            }
        }

        self.chamfer_distance(&mut src);
        self.max_distance = src.iter().copied().max().unwrap_or(0);
        self.dist = self.box_blur(1, &src);
    }

    /// Propagates boundary distances with a two-pass chamfer: orthogonal steps cost 2, diagonal steps cost 3.
    pub(crate) fn chamfer_distance(&self, dist: &mut [u16]) {
        let relax = |dist: &mut [u16], i: usize, a_i: usize, cost: u16| {
            let candidate = dist[a_i].saturating_add(cost);
            if candidate < dist[i] {
                dist[i] = candidate;
            }
        };

        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let span = self.spans[i];
                    // (-1,0) then (-1,-1), followed by (0,-1) then (1,-1)
                    for (dir, diagonal_dir) in [(0, 3), (3, 2)] {
                        let Some(con) = span.con(dir) else {
                            continue;
                        };
                        let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        relax(dist, i, a_i, 2);
                        if let Some(a_con) = self.spans[a_i].con(diagonal_dir) {
                            let (_, _, aa_i) = self.con_indices(a_x, a_z, diagonal_dir, a_con);
                            relax(dist, i, aa_i, 3);
                        }
                    }
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                for i in self.cell_at(x, z).index_range() {
                    let span = self.spans[i];
                    // (1,0) then (1,1), followed by (0,1) then (-1,1)
                    for (dir, diagonal_dir) in [(2, 1), (1, 0)] {
                        let Some(con) = span.con(dir) else {
                            continue;
                        };
                        let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        relax(dist, i, a_i, 2);
                        if let Some(a_con) = self.spans[a_i].con(diagonal_dir) {
                            let (_, _, aa_i) = self.con_indices(a_x, a_z, diagonal_dir, a_con);
                            relax(dist, i, aa_i, 3);
                        }
                    }
                }
            }
        }
    }

    fn box_blur(&self, threshold: u16, src: &[u16]) -> Vec<u16> {
        let threshold = threshold * 2;
        let mut dst = vec![0_u16; src.len()];
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let span = self.spans[i];
                    let cd = src[i];
                    if cd <= threshold {
                        dst[i] = cd;
                        continue;
                    }

                    let mut d = cd as u32;
                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            d += cd as u32 * 2;
                            continue;
                        };
                        let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        d += src[a_i] as u32;

                        let dir2 = (dir + 1) & 0x3;
                        if let Some(a_con) = self.spans[a_i].con(dir2) {
                            let (_, _, aa_i) = self.con_indices(a_x, a_z, dir2, a_con);
                            d += src[aa_i] as u32;
                        } else {
                            d += cd as u32;
                        }
                    }
                    dst[i] = ((d + 5) / 9) as u16;
                }
            }
        }
        dst
    }
}
