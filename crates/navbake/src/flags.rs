use bitflags::bitflags;

bitflags! {
    /// The option mask a host passes to [`BakePipeline::bake`](crate::BakePipeline::bake).
    ///
    /// Bits 0 to 2 toggle the span filters, bits 3 and 4 select the [`PartitionStrategy`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct BakeFlags: u32 {
        /// Run [`Heightfield::filter_low_hanging_walkable_obstacles`](navbake_recast::Heightfield::filter_low_hanging_walkable_obstacles).
        const FILTER_LOW_HANGING_OBSTACLES = 1;
        /// Run [`Heightfield::filter_ledge_spans`](navbake_recast::Heightfield::filter_ledge_spans).
        const FILTER_LEDGE_SPANS = 2;
        /// Run [`Heightfield::filter_walkable_low_height_spans`](navbake_recast::Heightfield::filter_walkable_low_height_spans).
        const FILTER_WALKABLE_LOW_HEIGHT_SPANS = 4;
        /// Partition with [`PartitionStrategy::Watershed`].
        const PARTITION_WATERSHED = 8;
        /// Partition with [`PartitionStrategy::Monotone`].
        const PARTITION_MONOTONE = 16;
        /// The bits that select the partition strategy.
        const PARTITION_MASK = Self::PARTITION_WATERSHED.bits() | Self::PARTITION_MONOTONE.bits();
    }
}

impl Default for BakeFlags {
    fn default() -> Self {
        BakeOptions::default().into()
    }
}

/// The algorithm used to divide the walkable surface into regions.
///
/// - Watershed generates the nicest tessellation but is the slowest, and can leave holes or overlaps
///   on sloped or overhanging geometry.
/// - Monotone is the fastest and never overlaps, but produces long thin polygons.
/// - Layer sits in between and is the best choice for tiles with small obstacles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionStrategy {
    /// Sweep rows into non-overlapping layers.
    #[default]
    Layer,
    /// Flood the distance field from its peaks.
    Watershed,
    /// Sweep rows into monotone regions.
    Monotone,
}

impl PartitionStrategy {
    /// Resolves the strategy from the partition bits of `flags`.
    ///
    /// No partition bit selects [`PartitionStrategy::Layer`] and the monotone bit wins over the watershed bit.
    pub fn from_flags(flags: BakeFlags) -> Self {
        if flags.contains(BakeFlags::PARTITION_MONOTONE) {
            Self::Monotone
        } else if flags.contains(BakeFlags::PARTITION_WATERSHED) {
            Self::Watershed
        } else {
            Self::Layer
        }
    }

    /// The partition bits selecting this strategy.
    pub fn to_flags(self) -> BakeFlags {
        match self {
            Self::Layer => BakeFlags::empty(),
            Self::Watershed => BakeFlags::PARTITION_WATERSHED,
            Self::Monotone => BakeFlags::PARTITION_MONOTONE,
        }
    }

    /// Resolves a host selector: 0 is layer, 1 is watershed, 2 is monotone.
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0 => Some(Self::Layer),
            1 => Some(Self::Watershed),
            2 => Some(Self::Monotone),
            _ => None,
        }
    }

    /// The host selector of this strategy, see [`PartitionStrategy::from_selector`].
    pub fn selector(self) -> u8 {
        (self.to_flags().bits() >> 3) as u8
    }
}

/// The typed form of [`BakeFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BakeOptions {
    /// Lets agents step up onto walkable spans that sit just above non-walkable ones, e.g. curbs.
    pub filter_low_hanging_obstacles: bool,
    /// Removes spans with a drop on any side that is higher than the agent can climb.
    pub filter_ledge_spans: bool,
    /// Removes spans with less clearance above them than the agent is tall.
    pub filter_walkable_low_height_spans: bool,
    /// How the walkable surface is divided into regions.
    pub partition: PartitionStrategy,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            filter_low_hanging_obstacles: true,
            filter_ledge_spans: true,
            filter_walkable_low_height_spans: true,
            partition: PartitionStrategy::default(),
        }
    }
}

impl From<BakeFlags> for BakeOptions {
    fn from(flags: BakeFlags) -> Self {
        Self {
            filter_low_hanging_obstacles: flags.contains(BakeFlags::FILTER_LOW_HANGING_OBSTACLES),
            filter_ledge_spans: flags.contains(BakeFlags::FILTER_LEDGE_SPANS),
            filter_walkable_low_height_spans: flags
                .contains(BakeFlags::FILTER_WALKABLE_LOW_HEIGHT_SPANS),
            partition: PartitionStrategy::from_flags(flags),
        }
    }
}

impl From<BakeOptions> for BakeFlags {
    fn from(options: BakeOptions) -> Self {
        let mut flags = options.partition.to_flags();
        flags.set(
            BakeFlags::FILTER_LOW_HANGING_OBSTACLES,
            options.filter_low_hanging_obstacles,
        );
        flags.set(BakeFlags::FILTER_LEDGE_SPANS, options.filter_ledge_spans);
        flags.set(
            BakeFlags::FILTER_WALKABLE_LOW_HEIGHT_SPANS,
            options.filter_walkable_low_height_spans,
        );
        flags
    }
}

impl From<PartitionStrategy> for BakeOptions {
    fn from(partition: PartitionStrategy) -> Self {
        Self {
            partition,
            ..Default::default()
        }
    }
}
