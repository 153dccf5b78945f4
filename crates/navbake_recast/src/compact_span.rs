use crate::region::RegionId;

/// A span in a [`CompactHeightfield`](crate::CompactHeightfield).
/// Packed for memory efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactSpan {
    /// The lower extent of the span. (Measured from the heightfield's base.)
    pub y: u16,
    /// The id of the region the span belongs to. (Or [`RegionId::NONE`] if not in a region.)
    pub region: RegionId,
    /// 24 bits: packed neighbor connection data
    /// 8 bits: the height of the span
    data: u32,
}

impl CompactSpan {
    pub(crate) const NOT_CONNECTED: u8 = 0x3f;

    /// Sets the neighbor connection data for the given direction.
    /// `None` if the neighbor is not connected.
    #[inline]
    pub fn set_con(&mut self, direction: u8, neighbor: impl Into<Option<u8>>) {
        let shift = (direction as u32) * 6;
        let value =
            neighbor.into().unwrap_or(Self::NOT_CONNECTED) as u32 & Self::NOT_CONNECTED as u32;
        self.data = (self.data & !(0x3f << shift)) | (value << shift);
    }

    /// Returns the layer index of the connected neighbor in the given direction.
    /// `None` if the neighbor is not connected.
    #[inline]
    pub fn con(&self, direction: u8) -> Option<u8> {
        let shift = (direction as u32) * 6;
        let value = ((self.data >> shift) & Self::NOT_CONNECTED as u32) as u8;
        (value != Self::NOT_CONNECTED).then_some(value)
    }

    /// Returns the height of the span.
    #[inline]
    pub fn height(&self) -> u8 {
        (self.data >> 24) as u8
    }

    /// Sets the height of the span.
    #[inline]
    pub fn set_height(&mut self, height: u8) {
        self.data = (self.data & 0x00FF_FFFF) | ((height as u32) << 24);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_does_not_clobber_connections() {
        let mut span = CompactSpan::default();
        span.set_con(3, Some(7));
        span.set_height(10);
        assert_eq!(span.height(), 10);
        assert_eq!(span.con(3), Some(7));
    }

    #[test]
    fn connections_are_independent_per_direction() {
        let mut span = CompactSpan::default();
        span.set_con(0, Some(1));
        span.set_con(1, Some(3));
        span.set_con(2, Some(5));
        span.set_con(3, None);
        assert_eq!(span.con(0), Some(1));
        assert_eq!(span.con(1), Some(3));
        assert_eq!(span.con(2), Some(5));
        assert_eq!(span.con(3), None);

        span.set_con(0, Some(2));
        span.set_con(1, None);
        assert_eq!(span.con(0), Some(2));
        assert_eq!(span.con(1), None);
        assert_eq!(span.con(2), Some(5));
    }
}
