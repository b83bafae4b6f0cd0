//! Integration tests for meshlod-simplification
//!
//! These tests drive the session boundary, the decimator and the
//! `MeshSimplifier` entry point on small meshes with known outcomes.

use meshlod_core::{Error, Point3d, Point3f, TriangleMesh, VertexAttributes};
use meshlod_simplification::*;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Closed unit cube, 8 vertices and 12 triangles
fn create_cube() -> TriangleMesh {
    let vertices = vec![
        Point3f::new(0.0, 0.0, 0.0),
        Point3f::new(1.0, 0.0, 0.0),
        Point3f::new(1.0, 1.0, 0.0),
        Point3f::new(0.0, 1.0, 0.0),
        Point3f::new(0.0, 0.0, 1.0),
        Point3f::new(1.0, 0.0, 1.0),
        Point3f::new(1.0, 1.0, 1.0),
        Point3f::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
        [0, 2, 1], [0, 3, 2],
        [4, 5, 6], [4, 6, 7],
        [0, 1, 5], [0, 5, 4],
        [2, 3, 7], [2, 7, 6],
        [0, 4, 7], [0, 7, 3],
        [1, 2, 6], [1, 6, 5],
    ];
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

/// Unit square split along its diagonal into two coplanar triangles
fn create_flat_quad() -> TriangleMesh {
    TriangleMesh::from_vertices_and_faces(
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    )
}

fn create_flat_grid(n: usize) -> TriangleMesh {
    let w = n + 1;
    let mut vertices = Vec::new();
    for y in 0..w {
        for x in 0..w {
            vertices.push(Point3f::new(x as f32, y as f32, 0.0));
        }
    }
    let mut faces = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = y * w + x;
            faces.push([i, i + 1, i + w + 1]);
            faces.push([i, i + w + 1, i + w]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn session_from_mesh(mesh: &TriangleMesh, flags: SimplifyFlags) -> Session {
    let mut session = Session::new(mesh.vertex_count(), mesh.face_count(), flags);
    let coords: Vec<f32> = mesh.vertices.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
    session.set_vertex_array(&coords, 3, 0).unwrap();
    let indices: Vec<u32> = mesh.faces.iter().flatten().map(|&i| i as u32).collect();
    session.set_index_array(&indices).unwrap();
    session
}

fn assert_closed_references(model: &MeshModel) {
    for (_, face) in model.valid_faces() {
        for v in face.vertices() {
            assert!(model.vertex_is_valid(v), "face references removed vertex {v}");
        }
    }
}

#[test]
fn test_cube_scenario() {
    init_tracing();
    let params = SlimParams::default()
        .with_weighting(WeightingPolicy::Uniform)
        .with_placement(PlacementPolicy::Optimal);
    let model = MeshModel::from_triangle_mesh(&create_cube()).unwrap();
    let mut decimator = Decimator::new(model, CollapseStrategy::Edge, params);

    let faces = decimator.decimate(4).unwrap();
    assert!(faces <= 4);
    assert_eq!(decimator.state(), SchedulerState::Done);
    assert_closed_references(decimator.model());

    // Every popped candidate is either applied or counted as rejected
    let stats = decimator.stats();
    assert_eq!(stats.original_vertices - stats.final_vertices, stats.collapses_performed);
    assert_eq!(stats.original_faces, 12);
}

#[test]
fn test_cube_through_session() {
    init_tracing();
    let params = SlimParams::default().with_weighting(WeightingPolicy::Uniform);
    let mut session = session_from_mesh(&create_cube(), SimplifyFlags::EDGE).with_params(params);
    let triangles = session.simplify(4).unwrap();
    assert!(triangles <= 4);
    assert_eq!(session.triangle_count(), triangles);
    for i in 0..triangles {
        let [a, b, c] = session.triangle(i).unwrap();
        assert!(a != b && b != c && a != c);
        assert!(a.max(b).max(c) < session.vertex_count());
    }
}

#[test]
fn test_singular_quadric_scenario() {
    init_tracing();
    let quad = create_flat_quad();

    // The shared diagonal's combined quadric is rank deficient
    let mut decimator = Decimator::new(
        MeshModel::from_triangle_mesh(&quad).unwrap(),
        CollapseStrategy::Edge,
        SlimParams::default().with_boundary_weight(0.0),
    );
    decimator.initialize().unwrap();
    let plane = Quadric3::from_plane(&nalgebra::Vector3::z(), 0.0, 0.5);
    let combined = plane + plane;
    let placed = place(
        &combined,
        &nalgebra::Vector3::new(0.0, 0.0, 0.0),
        &nalgebra::Vector3::new(1.0, 1.0, 0.0),
        PlacementPolicy::Optimal,
    );
    assert_eq!(placed.policy_used, PlacementPolicy::EndpointOrMidpoint);

    // simplify(1) is below the minimum objective: rejected, nothing changes
    assert_eq!(decimator.decimate(1), Err(Error::InvalidObjective(1)));
    assert_eq!(decimator.model().valid_face_count(), 2);
    assert_eq!(decimator.model().valid_vertex_count(), 4);

    // A legal objective on a flat grid runs through fallbacks and reports
    // the count it actually reached
    let mut session = session_from_mesh(&create_flat_grid(4), SimplifyFlags::EDGE)
        .with_params(SlimParams::default().with_boundary_weight(0.0));
    let reached = session.simplify(3).unwrap();
    assert_eq!(reached, session.triangle_count());
    assert!(reached < 32);
    assert!(session.stats().unwrap().placement_fallbacks > 0);
    for i in 0..session.vertex_count() {
        assert!(session.vertex(i).unwrap().z.abs() < 1e-6);
    }
}

#[test]
fn test_invalid_objective_scenario() {
    for mesh in [create_cube(), create_flat_quad(), create_flat_grid(3)] {
        let mut session = session_from_mesh(&mesh, SimplifyFlags::EDGE);
        assert_eq!(session.simplify(2), Err(Error::InvalidObjective(2)));
        assert_eq!(session.vertex_count(), mesh.vertex_count());
        assert_eq!(session.triangle_count(), mesh.face_count());

        let mut decimator = Decimator::new(
            MeshModel::from_triangle_mesh(&mesh).unwrap(),
            CollapseStrategy::Edge,
            SlimParams::default(),
        );
        assert!(decimator.decimate(2).is_err());
        assert_eq!(decimator.model().valid_face_count(), mesh.face_count());
        assert_eq!(decimator.model().valid_vertex_count(), mesh.vertex_count());
    }
}

#[test]
fn test_all_strategies_on_grid() {
    init_tracing();
    let mesh = create_flat_grid(6);
    for flags in [
        SimplifyFlags::EDGE,
        SimplifyFlags::FACE,
        SimplifyFlags::COLOR | SimplifyFlags::NORMAL,
    ] {
        let mut session = Session::new(mesh.vertex_count(), mesh.face_count(), flags);
        for p in &mesh.vertices {
            session.add_vertex(p.x, p.y, p.z).unwrap();
            if flags.contains(SimplifyFlags::COLOR) {
                session.add_color(p.x / 6.0, p.y / 6.0, 0.0, 1.0).unwrap();
            }
            if flags.contains(SimplifyFlags::NORMAL) {
                session.add_normal(0.0, 0.0, 1.0).unwrap();
            }
        }
        for f in &mesh.faces {
            session.add_triangle(f[0], f[1], f[2]).unwrap();
        }
        let triangles = session.simplify(24).unwrap();
        assert!(triangles <= mesh.face_count());
        assert!(session.vertex_count() <= mesh.vertex_count());
        let out = session.mesh().unwrap();
        assert!(out.validate().is_ok());
    }
}

#[test]
fn test_mesh_simplifier_trait_object() {
    let simplifiers: Vec<Box<dyn MeshSimplifier>> = vec![
        Box::new(QuadricErrorSimplifier::new()),
        Box::new(QuadricErrorSimplifier::with_params(CollapseStrategy::Property, SlimParams::fast())),
    ];
    let mesh = create_flat_grid(5);
    for simplifier in &simplifiers {
        let out = simplifier.simplify(&mesh, 0.5).unwrap();
        assert!(out.face_count() < mesh.face_count());
        assert!(out.validate().is_ok());
    }
}

#[test]
fn test_model_contraction_by_hand() {
    let mut model = MeshModel::from_triangle_mesh(&create_flat_quad()).unwrap();
    let result = model
        .contract(0, 2, Point3d::new(0.5, 0.5, 0.0), VertexAttributes::default())
        .unwrap();
    assert_eq!(result.dead_faces.len(), 2);
    assert_eq!(model.valid_face_count(), 0);
    // Vertices left without faces stay valid
    assert_eq!(model.valid_vertex_count(), 3);
    assert!(model.vertex_is_valid(1));
}
