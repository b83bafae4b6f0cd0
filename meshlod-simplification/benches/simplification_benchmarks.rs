//! Benchmarks for quadric decimation across collapse strategies

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshlod_core::{Point3f, TriangleMesh};
use meshlod_simplification::{
    CollapseStrategy, MeshSimplifier, QuadricErrorSimplifier, Session, SimplifyFlags, SlimParams,
};

fn generate_grid_mesh(size: usize) -> TriangleMesh {
    let mut vertices = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
            let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
            vertices.push(Point3f::new(x as f32, y as f32, (fx.sin() * fy.sin()) * 2.0));
        }
    }
    let mut faces = Vec::with_capacity((size - 1) * (size - 1) * 2);
    for y in 0..(size - 1) {
        for x in 0..(size - 1) {
            let tl = y * size + x;
            let tr = tl + 1;
            let bl = (y + 1) * size + x;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn bench_strategies(c: &mut Criterion) {
    let sizes = [10, 20, 40];
    let ratios = [0.3, 0.5, 0.7];
    let strategies = [CollapseStrategy::Edge, CollapseStrategy::Face, CollapseStrategy::Property];

    let mut group = c.benchmark_group("simplification");

    for &size in &sizes {
        let mesh = generate_grid_mesh(size);
        let face_count = mesh.face_count();

        for &ratio in &ratios {
            for strategy in strategies {
                group.bench_with_input(
                    BenchmarkId::new(
                        strategy.to_string(),
                        format!("{}f_r{}", face_count, (ratio * 100.0) as u32),
                    ),
                    &(&mesh, ratio),
                    |b, &(mesh, ratio)| {
                        let simplifier = QuadricErrorSimplifier::with_params(strategy, SlimParams::default());
                        b.iter(|| {
                            let result = simplifier.simplify(black_box(mesh), ratio).unwrap();
                            black_box(result);
                        });
                    },
                );
            }
        }
    }

    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let mesh = generate_grid_mesh(40);
    let coords: Vec<f32> = mesh.vertices.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
    let indices: Vec<u32> = mesh.faces.iter().flatten().map(|&i| i as u32).collect();
    let target = mesh.face_count() / 4;

    c.bench_function("session_build_and_simplify", |b| {
        b.iter(|| {
            let mut session = Session::new(mesh.vertex_count(), mesh.face_count(), SimplifyFlags::EDGE);
            session.set_vertex_array(black_box(&coords), 3, 0).unwrap();
            session.set_index_array(black_box(&indices)).unwrap();
            let triangles = session.simplify(target).unwrap();
            black_box(session.vertex_buffer());
            black_box(triangles);
        });
    });
}

criterion_group!(benches, bench_strategies, bench_session);
criterion_main!(benches);
