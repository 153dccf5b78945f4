//! Bake real geometry end to end with the native backend.

use std::thread;

use approx::assert_relative_eq;
use glam::{UVec3, Vec3, uvec3, vec3};
use navbake::{
    BakeConfigBuilder, BakeFlags, BakeOptions, BakePipeline, BakeStatus, BlobError,
    DetailMeshView as _, InputGeometry, PartitionStrategy, PolyMeshView as _, PolygonFlagging,
    VERTICAL_CLEARANCE, recast::Aabb3d,
};

fn floor(size: f32) -> (Vec<Vec3>, Vec<UVec3>) {
    (
        vec![
            vec3(0.0, 0.0, 0.0),
            vec3(size, 0.0, 0.0),
            vec3(size, 0.0, size),
            vec3(0.0, 0.0, size),
        ],
        vec![uvec3(0, 3, 2), uvec3(0, 2, 1)],
    )
}

fn builder() -> BakeConfigBuilder {
    BakeConfigBuilder {
        aabb: Aabb3d::new([-1.0, -1.0, -1.0], [11.0, 1.0, 11.0]),
        cell_size: 0.5,
        cell_height: 0.2,
        agent_radius: 0.5,
        ..Default::default()
    }
}

#[test]
fn floor_bakes_into_a_single_quad() {
    let (vertices, triangles) = floor(10.0);
    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
    let result = BakePipeline::new().bake(&builder().build(), BakeFlags::default(), &geometry);
    assert_eq!(BakeStatus::of(&result), BakeStatus::Ok);
    let output = result.unwrap();

    let poly_mesh = output.poly_mesh();
    assert_eq!(poly_mesh.polygon_count(), 1);
    assert_eq!(poly_mesh.vertices().len(), 4);
    assert_eq!(output.detail_mesh().triangles().len(), 2);

    let mesh = output.extract_mesh().unwrap();
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.vertices.len(), 16);
    for vertex in mesh.vertices.chunks_exact(4) {
        assert!((0.0..=10.0).contains(&vertex[0]), "{vertex:?}");
        assert!((0.0..=10.0).contains(&vertex[2]), "{vertex:?}");
        // Floor span top plus one cell plus clearance.
        assert_relative_eq!(vertex[1], -1.0 + 7.0 * 0.2 + VERTICAL_CLEARANCE, epsilon = 1e-5);
        assert_eq!(vertex[3], 0.0);
    }
    assert!(mesh.triangles.iter().all(|&i| i < 4));
}

#[test]
fn agent_radius_keeps_the_mesh_off_the_edges() {
    let (vertices, triangles) = floor(10.0);
    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
    let output = BakePipeline::new()
        .bake(&builder().build(), BakeOptions::default(), &geometry)
        .unwrap();
    let mesh = output.extract_mesh().unwrap();
    for vertex in mesh.vertices.chunks_exact(4) {
        assert!(vertex[0] >= 0.5 && vertex[0] <= 9.5, "{vertex:?}");
        assert!(vertex[2] >= 0.5 && vertex[2] <= 9.5, "{vertex:?}");
    }
}

#[test]
fn every_partition_strategy_covers_the_floor() {
    let (vertices, triangles) = floor(10.0);
    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
    for selector in 0..3 {
        let partition = PartitionStrategy::from_selector(selector).unwrap();
        let flags = BakeFlags::FILTER_LOW_HANGING_OBSTACLES
            | BakeFlags::FILTER_LEDGE_SPANS
            | BakeFlags::FILTER_WALKABLE_LOW_HEIGHT_SPANS
            | partition.to_flags();
        let output = BakePipeline::new()
            .bake(&builder().build(), flags, &geometry)
            .unwrap();
        assert!(output.poly_mesh().polygon_count() >= 1, "{partition:?}");
        assert!(output.poly_mesh().vertices().len() >= 4, "{partition:?}");
    }
}

#[test]
fn steep_geometry_bakes_an_empty_mesh() {
    // A wall facing along the x-axis has no walkable triangles.
    let vertices = [
        vec3(5.0, -1.0, 0.0),
        vec3(5.0, -1.0, 10.0),
        vec3(5.0, 1.0, 10.0),
        vec3(5.0, 1.0, 0.0),
    ];
    let triangles = [uvec3(0, 1, 2), uvec3(0, 2, 3)];
    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
    let builder = builder();
    let mut pipeline = BakePipeline::new();
    let output = pipeline
        .bake(&builder.build(), BakeOptions::default(), &geometry)
        .unwrap();
    assert!(output.poly_mesh().vertices().is_empty());

    let mesh = output.extract_mesh().unwrap();
    assert!(mesh.vertices.is_empty());
    assert!(mesh.triangles.is_empty());

    let blob = pipeline
        .build_blob(&output, &builder.agent(), PolygonFlagging::default())
        .unwrap();
    assert!(blob.is_empty());
}

#[test]
fn blob_round_trips_through_the_tile_decoder() {
    let (vertices, triangles) = floor(10.0);
    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
    let builder = builder();
    let mut pipeline = BakePipeline::new();
    let output = pipeline
        .bake(&builder.build(), BakeOptions::default(), &geometry)
        .unwrap();
    let blob = pipeline
        .build_blob(&output, &builder.agent(), PolygonFlagging::default())
        .unwrap();

    let tile = blob.decode().unwrap();
    assert_eq!(tile.header.poly_count, 1);
    assert_eq!(tile.header.vert_count, 4);
    assert_eq!(tile.polys[0].vertex_count, 4);
    assert_eq!(tile.polys[0].flags, PolygonFlagging::TRAVERSABLE);
    assert_relative_eq!(tile.header.walkable_height, 2.0);
    assert_relative_eq!(tile.header.walkable_climb, 0.9);
    assert!(!tile.bv_tree.is_empty());
}

#[test]
fn tiles_reject_more_than_six_vertices_per_polygon() {
    let (vertices, triangles) = floor(10.0);
    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
    let builder = BakeConfigBuilder {
        verts_per_poly: 8,
        ..builder()
    };
    let mut pipeline = BakePipeline::new();
    let output = pipeline
        .bake(&builder.build(), BakeOptions::default(), &geometry)
        .unwrap();
    let err = pipeline
        .build_blob(&output, &builder.agent(), PolygonFlagging::default())
        .unwrap_err();
    assert!(matches!(
        err,
        BlobError::VerticesExceeded {
            vertices_per_polygon: 8,
            max: 6
        }
    ));
}

#[test]
fn bakes_run_in_parallel() {
    let sizes = [8.0, 9.0, 10.0];
    let polygon_counts = thread::scope(|scope| {
        let handles: Vec<_> = sizes
            .iter()
            .map(|&size| {
                scope.spawn(move || {
                    let (vertices, triangles) = floor(size);
                    let geometry = InputGeometry::new(&vertices, &triangles).unwrap();
                    let output = BakePipeline::new()
                        .bake(&builder().build(), BakeOptions::default(), &geometry)
                        .unwrap();
                    output.poly_mesh().polygon_count()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(polygon_counts, vec![1; sizes.len()]);
}
