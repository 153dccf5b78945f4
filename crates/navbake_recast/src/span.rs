use std::ops::{Deref, DerefMut};

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// A key for a span in [`Spans`].
    pub struct SpanKey;
}

/// A container for all spans of a [`Heightfield`](crate::Heightfield).
#[derive(Debug, Clone, Default)]
pub struct Spans(SlotMap<SpanKey, Span>);

impl Deref for Spans {
    type Target = SlotMap<SpanKey, Span>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Spans {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Spans {
    const DEFAULT_CAPACITY: usize = 1024;

    pub(crate) fn with_min_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(Self::DEFAULT_CAPACITY);
        Self(SlotMap::with_capacity_and_key(capacity))
    }
}

/// The maximum height of a span, in cell units.
pub(crate) const SPAN_MAX_HEIGHT: u16 = (1 << 13) - 1;

pub(crate) struct SpanBuilder {
    pub(crate) min: u16,
    pub(crate) max: u16,
    pub(crate) area: AreaType,
    pub(crate) next: Option<SpanKey>,
}

impl SpanBuilder {
    pub(crate) fn build(self) -> Span {
        Span {
            min: self.min,
            max: self.max,
            area: self.area,
            next: self.next,
        }
    }
}

impl From<SpanBuilder> for Span {
    fn from(builder: SpanBuilder) -> Self {
        builder.build()
    }
}

/// A run of solid voxels in a single heightfield column.
///
/// Corresponds to <https://github.com/recastnavigation/recastnavigation/blob/bd98d84c274ee06842bf51a4088ca82ac71f8c2d/Recast/Include/Recast.h#L294>
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Span {
    /// Height of the floor.
    min: u16,
    /// Height of the ceiling.
    max: u16,
    /// Area type ID.
    area: AreaType,
    /// The key of the next-higher span in the column
    next: Option<SpanKey>,
}

impl Span {
    /// The lower limit of the span, in cell units.
    #[inline]
    pub fn min(&self) -> u16 {
        self.min
    }

    #[inline]
    pub(crate) fn set_min(&mut self, min: u16) {
        self.min = min;
    }

    /// The upper limit of the span, in cell units.
    #[inline]
    pub fn max(&self) -> u16 {
        self.max
    }

    #[inline]
    pub(crate) fn set_max(&mut self, max: u16) {
        self.max = max;
    }

    /// The area type of the span.
    #[inline]
    pub fn area(&self) -> AreaType {
        self.area
    }

    #[inline]
    pub(crate) fn set_area(&mut self, area: impl Into<AreaType>) {
        self.area = area.into();
    }

    /// The key of the next-higher span in the column.
    #[inline]
    pub fn next(&self) -> Option<SpanKey> {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: impl Into<Option<SpanKey>>) {
        self.next = next.into();
    }
}

/// An area type. `0` means the area cannot be walked on, higher values take precedence when spans merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct AreaType(pub u8);

impl From<u8> for AreaType {
    fn from(value: u8) -> Self {
        AreaType(value)
    }
}

impl From<AreaType> for u8 {
    fn from(value: AreaType) -> Self {
        value.0
    }
}

impl AreaType {
    /// The area type 0. Triangles with this area type are not walkable.
    pub const NOT_WALKABLE: Self = Self(0);
    /// The area type assigned to triangles whose slope is walkable.
    pub const DEFAULT_WALKABLE: Self = Self(63);

    /// Returns whether this area type can be walked on.
    #[inline]
    pub fn is_walkable(self) -> bool {
        self != Self::NOT_WALKABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        SpanBuilder {
            min: 2,
            max: 10,
            area: AreaType(4),
            next: None,
        }
        .build()
    }

    #[test]
    fn can_retrieve_span_data_after_building() {
        let span = span();
        assert_eq!(span.min(), 2);
        assert_eq!(span.max(), 10);
        assert_eq!(span.area(), AreaType(4));
        assert_eq!(span.next(), None);
    }

    #[test]
    fn setters_overwrite_span_data() {
        let mut span = span();
        let mut spans = Spans::with_min_capacity(1);
        let span_key = spans.insert(span.clone());

        span.set_min(1);
        span.set_max(4);
        span.set_area(3);
        span.set_next(span_key);

        assert_eq!(span.min(), 1);
        assert_eq!(span.max(), 4);
        assert_eq!(span.area(), AreaType(3));
        assert_eq!(span.next(), Some(span_key));
    }

    #[test]
    fn only_area_zero_is_unwalkable() {
        assert!(!AreaType::NOT_WALKABLE.is_walkable());
        assert!(AreaType::DEFAULT_WALKABLE.is_walkable());
        assert!(AreaType(1).is_walkable());
    }
}
