/// Provides information on the content of a cell column in a [`CompactHeightfield`](crate::CompactHeightfield).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactCell {
    // original: 24 bits
    /// Index to the first span in the column.
    index: u32,
    // original: 8 bits
    /// Number of spans in the column.
    count: u8,
}

impl CompactCell {
    /// Index to the first span in the column.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Number of spans in the column.
    #[inline]
    pub fn count(&self) -> u8 {
        self.count
    }

    /// The range of span indices belonging to this column.
    #[inline]
    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.index as usize..self.index as usize + self.count as usize
    }

    #[inline]
    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    #[inline]
    pub(crate) fn inc_count(&mut self) {
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_range_covers_column() {
        let mut cell = CompactCell::default();
        assert!(cell.index_range().is_empty());
        cell.set_index(4);
        cell.inc_count();
        cell.inc_count();
        assert_eq!(cell.index_range(), 4..6);
    }
}
