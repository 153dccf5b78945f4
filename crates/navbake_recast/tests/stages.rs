//! Run every stage by hand on a floor with a pillar in the middle.

use glam::{UVec3, Vec3, uvec3, vec3};
use navbake_recast::{
    AreaType, BuildContoursFlags, CompactHeightfield, DetailPolygonMesh, HeightfieldBuilder,
    NavmeshCreateParams, NavmeshTile, PolygonMesh, RC_MESH_NULL_IDX, compute_aabb,
    create_navmesh_data, mark_walkable_triangles,
};

/// A 10×10 floor with a 2×2 pillar rising 3 units from its center.
fn floor_with_pillar() -> (Vec<Vec3>, Vec<UVec3>) {
    let vertices = vec![
        // Floor
        vec3(0.0, 0.0, 0.0),
        vec3(10.0, 0.0, 0.0),
        vec3(10.0, 0.0, 10.0),
        vec3(0.0, 0.0, 10.0),
        // Pillar bottom
        vec3(4.0, 0.0, 4.0),
        vec3(6.0, 0.0, 4.0),
        vec3(6.0, 0.0, 6.0),
        vec3(4.0, 0.0, 6.0),
        // Pillar top
        vec3(4.0, 3.0, 4.0),
        vec3(6.0, 3.0, 4.0),
        vec3(6.0, 3.0, 6.0),
        vec3(4.0, 3.0, 6.0),
    ];
    let mut triangles = vec![uvec3(0, 3, 2), uvec3(0, 2, 1), uvec3(8, 11, 10), uvec3(8, 10, 9)];
    for side in 0..4 {
        let (a, b) = (4 + side, 4 + (side + 1) % 4);
        triangles.push(uvec3(a, b, b + 4));
        triangles.push(uvec3(a, b + 4, a + 4));
    }
    (vertices, triangles)
}

fn bake() -> (CompactHeightfield, PolygonMesh, DetailPolygonMesh) {
    let (vertices, triangles) = floor_with_pillar();
    let cell_size = 0.25;
    let cell_height = 0.2;
    let walkable_height = 10;
    let walkable_climb = 4;

    let mut areas = vec![AreaType::NOT_WALKABLE; triangles.len()];
    mark_walkable_triangles(45.0_f32.to_radians(), &vertices, &triangles, &mut areas);
    assert_eq!(
        areas.iter().filter(|area| area.is_walkable()).count(),
        4,
        "floor and pillar top are walkable, the sides are not"
    );

    let mut aabb = compute_aabb(&vertices).unwrap();
    aabb.min -= 1.0;
    aabb.max += 1.0;
    let mut heightfield = HeightfieldBuilder {
        aabb,
        cell_size,
        cell_height,
    }
    .build()
    .unwrap();
    heightfield
        .rasterize_triangles(&vertices, &triangles, &areas, walkable_climb)
        .unwrap();
    heightfield.filter_low_hanging_walkable_obstacles(walkable_climb);
    heightfield.filter_ledge_spans(walkable_height, walkable_climb);
    heightfield.filter_walkable_low_height_spans(walkable_height);

    let mut chf =
        CompactHeightfield::from_heightfield(&heightfield, walkable_height, walkable_climb)
            .unwrap();
    chf.erode_walkable_area(2);
    chf.build_distance_field();
    chf.build_regions(64, 400).unwrap();

    let contours = chf
        .build_contours(1.3, 48, BuildContoursFlags::default())
        .unwrap();
    assert!(!contours.contours.is_empty());
    assert!(contours.contours.iter().all(|c| c.vertices.len() >= 3));

    let mesh = PolygonMesh::from_contours(&contours, 6).unwrap();
    let detail = DetailPolygonMesh::from_poly_mesh(&mesh, &chf, 1.5, 0.2).unwrap();
    (chf, mesh, detail)
}

#[test]
fn pillar_cuts_a_hole_into_the_floor() {
    let (chf, mesh, _) = bake();
    assert!(chf.region_count() >= 1);
    // A floor with a hole cannot be a single convex polygon.
    assert!(mesh.polygon_count() >= 2, "{}", mesh.polygon_count());

    let cs = mesh.cell_size;
    let origin = mesh.aabb.min;
    for vertex in &mesh.vertices {
        let x = origin.x + vertex.x as f32 * cs;
        let z = origin.z + vertex.z as f32 * cs;
        let inside_pillar = x > 4.0 && x < 6.0 && z > 4.0 && z < 6.0;
        assert!(!inside_pillar, "vertex ({x}, {z}) is inside the pillar");
    }
}

#[test]
fn polygons_are_linked_both_ways() {
    let (_, mesh, _) = bake();
    for i in 0..mesh.polygon_count() {
        let vertices = mesh.polygon_vertices(i);
        let count = vertices
            .iter()
            .take_while(|&&v| v != RC_MESH_NULL_IDX)
            .count();
        assert!(count >= 3);
        assert!(
            vertices[..count]
                .iter()
                .all(|&v| (v as usize) < mesh.vertices.len())
        );
        for &neighbour in &mesh.polygon_neighbors(i)[..count] {
            if neighbour == RC_MESH_NULL_IDX {
                continue;
            }
            assert!(
                mesh.polygon_neighbors(neighbour as usize)
                    .contains(&(i as u16)),
                "polygon {neighbour} does not link back to {i}"
            );
        }
    }
}

#[test]
fn detail_mesh_covers_every_polygon() {
    let (_, mesh, detail) = bake();
    assert_eq!(detail.meshes.len(), mesh.polygon_count());
    for sub_mesh in &detail.meshes {
        assert!(sub_mesh.triangle_count >= 1);
        let end = (sub_mesh.base_triangle_index + sub_mesh.triangle_count) as usize;
        for triangle in &detail.triangles[sub_mesh.base_triangle_index as usize..end] {
            assert!(
                triangle
                    .indices
                    .iter()
                    .all(|&i| (i as u32) < sub_mesh.vertex_count)
            );
        }
    }
}

#[test]
fn tile_keeps_every_polygon() {
    let (_, mesh, detail) = bake();
    let flags = vec![1; mesh.polygon_count()];
    let bytes = create_navmesh_data(&NavmeshCreateParams {
        vertices: &mesh.vertices,
        polygons: &mesh.polygons,
        flags: &flags,
        areas: &mesh.areas,
        vertices_per_polygon: mesh.vertices_per_polygon,
        detail_meshes: &detail.meshes,
        detail_vertices: &detail.vertices,
        detail_triangles: &detail.triangles,
        walkable_height: 2.0,
        walkable_radius: 0.5,
        walkable_climb: 0.8,
        aabb: mesh.aabb,
        cell_size: mesh.cell_size,
        cell_height: mesh.cell_height,
        build_bv_tree: true,
    })
    .unwrap();
    let tile = NavmeshTile::from_bytes(&bytes).unwrap();
    assert_eq!(tile.polys.len(), mesh.polygon_count());
    assert_eq!(tile.vertices.len(), mesh.vertices.len());
    assert!(tile.polys.iter().all(|poly| poly.flags == 1));
}
