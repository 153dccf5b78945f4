//! Helpers for triangle soups given as vertex and index slices.

use glam::{UVec3, Vec3, Vec3A};

use crate::{Aabb3d, math::TriangleIndices as _, span::AreaType};

/// Marks every triangle whose slope is walkable with [`AreaType::DEFAULT_WALKABLE`].
///
/// A triangle is walkable when the angle between its normal and the up axis is below `walkable_slope_angle`.
/// Triangles that are too steep keep whatever area they already had,
/// as do triangles referencing a vertex out of bounds. The rasterizer reports those.
///
/// # Arguments
///
/// - `walkable_slope_angle`: The maximum slope that is considered walkable. `[Limits: 0 <= value < 0.5*π] [Units: Radians]`
/// - `vertices`: The vertices of the triangle soup.
/// - `triangles`: The vertex indices of each triangle.
/// - `areas`: The area of each triangle, `areas.len()` must equal `triangles.len()`.
///
/// # Panics
///
/// Panics if `areas` is shorter than `triangles`.
pub fn mark_walkable_triangles(
    walkable_slope_angle: f32,
    vertices: &[Vec3],
    triangles: &[UVec3],
    areas: &mut [AreaType],
) {
    let threshold_cos = walkable_slope_angle.cos();
    for (i, triangle) in triangles.iter().enumerate() {
        let Some(normal) = triangle.normal(vertices) else {
            continue;
        };
        if normal.y > threshold_cos {
            areas[i] = AreaType::DEFAULT_WALKABLE;
        }
    }
}

/// Computes the AABB of a set of vertices.
/// Returns `None` if `vertices` is empty.
pub fn compute_aabb(vertices: &[Vec3]) -> Option<Aabb3d> {
    let mut iter = vertices.iter().copied().map(Vec3A::from);
    let first = iter.next()?;
    let (min, max) = iter.fold((first, first), |(prev_min, prev_max), point| {
        (point.min(prev_min), point.max(prev_max))
    });
    Some(Aabb3d { min, max })
}

#[cfg(test)]
mod tests {
    use glam::{uvec3, vec3};

    use super::*;

    #[test]
    fn flat_triangle_facing_up_is_walkable() {
        let vertices = [vec3(0.0, 0.0, 0.0), vec3(0.0, 0.0, 1.0), vec3(1.0, 0.0, 0.0)];
        let triangles = [uvec3(0, 1, 2)];
        let mut areas = [AreaType::NOT_WALKABLE];
        mark_walkable_triangles(45.0_f32.to_radians(), &vertices, &triangles, &mut areas);
        assert_eq!(areas, [AreaType::DEFAULT_WALKABLE]);
    }

    #[test]
    fn flat_triangle_facing_down_is_not_walkable() {
        let vertices = [vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 0.0, 1.0)];
        let triangles = [uvec3(0, 1, 2)];
        let mut areas = [AreaType::NOT_WALKABLE];
        mark_walkable_triangles(45.0_f32.to_radians(), &vertices, &triangles, &mut areas);
        assert_eq!(areas, [AreaType::NOT_WALKABLE]);
    }

    #[test]
    fn steep_triangle_keeps_its_area() {
        let vertices = [vec3(0.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0), vec3(1.0, 0.0, 0.0)];
        let triangles = [uvec3(0, 1, 2)];
        let mut areas = [AreaType(7)];
        mark_walkable_triangles(45.0_f32.to_radians(), &vertices, &triangles, &mut areas);
        assert_eq!(areas, [AreaType(7)]);
    }

    #[test]
    fn out_of_bounds_triangle_is_skipped() {
        let vertices = [vec3(0.0, 0.0, 0.0), vec3(0.0, 0.0, 1.0), vec3(1.0, 0.0, 0.0)];
        let triangles = [uvec3(0, 1, 7), uvec3(0, 1, 2)];
        let mut areas = [AreaType::NOT_WALKABLE; 2];
        mark_walkable_triangles(45.0_f32.to_radians(), &vertices, &triangles, &mut areas);
        assert_eq!(areas, [AreaType::NOT_WALKABLE, AreaType::DEFAULT_WALKABLE]);
    }

    #[test]
    fn aabb_of_empty_soup_is_none() {
        assert_eq!(compute_aabb(&[]), None);
        let aabb = compute_aabb(&[vec3(1.0, 2.0, 3.0), vec3(-1.0, 0.0, 5.0)]).unwrap();
        assert_eq!(aabb.min, Vec3A::new(-1.0, 0.0, 3.0));
        assert_eq!(aabb.max, Vec3A::new(1.0, 2.0, 5.0));
    }
}
