//! Builds a chain of levels of detail for a wavy height field
//!
//! Each level halves the triangle count of the previous one and reports the
//! decimation statistics along the way.

use meshlod::prelude::*;

fn wavy_grid(size: usize) -> TriangleMesh {
    let mut mesh = TriangleMesh::new();
    for y in 0..size {
        for x in 0..size {
            let h = (x as f32 * 0.4).sin() * (y as f32 * 0.3).cos();
            mesh.add_vertex(Point3f::new(x as f32, y as f32, h));
        }
    }
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let i = y * size + x;
            mesh.add_face([i, i + 1, i + size + 1]);
            mesh.add_face([i, i + size + 1, i + size]);
        }
    }
    mesh
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mesh = wavy_grid(48);
    println!("Input: {} vertices, {} triangles", mesh.vertex_count(), mesh.face_count());

    let simplifier = QuadricErrorSimplifier::with_params(CollapseStrategy::Edge, SlimParams::high_quality());
    let mut level = mesh;
    for lod in 1..=4 {
        let target = (level.face_count() / 2).max(MIN_TARGET_FACES);
        let (next, stats) = simplifier.simplify_to(&level, target)?;
        println!("LOD{lod}: {stats}");
        level = next;
    }

    let mut session = Session::new(level.vertex_count(), level.face_count(), SimplifyFlags::EDGE);
    let coords: Vec<f32> = level.vertices.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
    session.set_vertex_array(&coords, 3, 0)?;
    let indices: Vec<u32> = level.faces.iter().flatten().map(|&i| i as u32).collect();
    session.set_index_array(&indices)?;
    let triangles = session.simplify(MIN_TARGET_FACES.max(level.face_count() / 4))?;

    let vertices = session.vertex_buffer();
    let indices = session.index_buffer_u16()?;
    println!(
        "GPU buffers: {} vertices ({} bytes), {} triangles ({} indices)",
        vertices.len(),
        bytemuck::cast_slice::<GpuVertex, u8>(&vertices).len(),
        triangles,
        indices.len()
    );
    Ok(())
}
