use glam::{IVec3, UVec3, Vec3, Vec3A};

/// An axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner
    pub min: Vec3A,
    /// The maximum corner
    pub max: Vec3A,
}

impl Aabb3d {
    /// Creates a new AABB from its minimum and maximum corners.
    pub fn new(min: impl Into<Vec3A>, max: impl Into<Vec3A>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Computes the AABB enclosing all given vertices.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let mut iter = verts.iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), vert| {
            (min.min(*vert), max.max(*vert))
        });
        Some(Self { min, max })
    }

    /// Returns whether the two AABBs overlap. Touching boxes count as overlapping.
    #[inline]
    pub fn intersects(&self, other: &Aabb3d) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }
}

pub(crate) trait TriangleIndices {
    /// Returns `None` if any index is out of bounds.
    fn normal(&self, vertices: &[Vec3]) -> Option<Vec3>;
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn normal(&self, vertices: &[Vec3]) -> Option<Vec3> {
        let a = *vertices.get(self.x as usize)?;
        let b = *vertices.get(self.y as usize)?;
        let c = *vertices.get(self.z as usize)?;
        let ab = b - a;
        let ac = c - a;
        Some(ab.cross(ac).normalize_or_zero())
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The width offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard height (z-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The height offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_z(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 < n { i + 1 } else { 0 }
}

#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i >= 1 { i - 1 } else { n - 1 }
}

// The predicates below work on the xz-plane of grid coordinates.
// Widened to i64 so that products of u16 coordinates cannot overflow.

#[inline]
pub(crate) fn area2(a: IVec3, b: IVec3, c: IVec3) -> i64 {
    (b.x as i64 - a.x as i64) * (c.z as i64 - a.z as i64)
        - (c.x as i64 - a.x as i64) * (b.z as i64 - a.z as i64)
}

/// Returns true iff `c` is strictly to the left of the directed line through `a` to `b`.
#[inline]
pub(crate) fn left(a: IVec3, b: IVec3, c: IVec3) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: IVec3, b: IVec3, c: IVec3) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
pub(crate) fn collinear(a: IVec3, b: IVec3, c: IVec3) -> bool {
    area2(a, b, c) == 0
}

/// Returns true iff `ab` properly intersects `cd`: they share a point interior to both segments.
pub(crate) fn intersect_prop(a: IVec3, b: IVec3, c: IVec3, d: IVec3) -> bool {
    // Eliminate improper cases.
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Returns true iff `(a, b, c)` are collinear and point `c` lies on the closed segment `ab`.
pub(crate) fn between(a: IVec3, b: IVec3, c: IVec3) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    // If ab not vertical, check betweenness on x; else on z.
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
    }
}

/// Returns true iff segments `ab` and `cd` intersect, properly or improperly.
pub(crate) fn intersect(a: IVec3, b: IVec3, c: IVec3, d: IVec3) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

#[inline]
pub(crate) fn vequal(a: IVec3, b: IVec3) -> bool {
    a.x == b.x && a.z == b.z
}

/// Squared distance between a point and a segment on the xz-plane.
pub(crate) fn distance_squared_point_segment_2d(
    (x, z): (f32, f32),
    (px, pz): (f32, f32),
    (qx, qz): (f32, f32),
) -> f32 {
    let pqx = qx - px;
    let pqz = qz - pz;
    let mut dx = x - px;
    let mut dz = z - pz;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    dx = px + t * pqx - x;
    dz = pz + t * pqz - z;
    dx * dx + dz * dz
}
