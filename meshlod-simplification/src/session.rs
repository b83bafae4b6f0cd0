//! Builder / extractor around a decimation run
//!
//! A [`Session`] collects vertex data (one item at a time or from strided
//! arrays), runs the decimator once per [`Session::simplify`] call and exposes
//! the surviving geometry through bounds-checked queries or GPU-ready buffers.
//!
//! When no triangle is supplied the session works in flat mode: sequential
//! vertex triples are read as triangles, and the output repeats vertices per
//! triangle corner without an index list.

use crate::decimate::{AttributeLayout, Decimator, MIN_TARGET_FACES};
use crate::model::MeshModel;
use crate::params::{CollapseStrategy, SlimParams};
use crate::result::DecimationStats;
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use meshlod_core::{Color, Error, Point3f, Result, TexCoord, TriangleMesh, Vector3f, VertexAttributes};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

bitflags! {
    /// Attribute channels and collapse strategy of a session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SimplifyFlags: u32 {
        const COLOR = 1;
        const NORMAL = 2;
        const TEXCOORD = 4;
        const EDGE = 8;
        const FACE = 16;
    }
}

impl SimplifyFlags {
    /// Parse a raw bitmask, dropping unknown bits with a warning.
    pub fn from_raw(bits: u32) -> Self {
        let flags = Self::from_bits_truncate(bits);
        if flags.bits() != bits {
            warn!(
                flags = format_args!("{bits:#x}"),
                unknown = format_args!("{:#x}", bits & !Self::all().bits()),
                "Ignoring unknown simplification flags"
            );
        }
        flags
    }

    /// `FACE` wins over `EDGE`; neither selects property preservation.
    pub fn strategy(self) -> CollapseStrategy {
        if self.contains(Self::FACE) {
            CollapseStrategy::Face
        } else if self.contains(Self::EDGE) {
            CollapseStrategy::Edge
        } else {
            CollapseStrategy::Property
        }
    }

    pub fn layout(self) -> AttributeLayout {
        AttributeLayout {
            color: self.contains(Self::COLOR),
            tex_coord: self.contains(Self::TEXCOORD),
            normal: self.contains(Self::NORMAL),
        }
    }
}

/// Interleaved vertex record for upload to a GPU vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
    pub tex_coord: [f32; 2],
}

#[derive(Debug, Clone)]
enum Output {
    /// Nothing simplified yet; queries read the input
    Input,
    Simplified { mesh: TriangleMesh, flat: bool },
    Failed,
}

/// Borrowed view of whatever the queries currently answer from
struct View<'a> {
    positions: &'a [Point3f],
    colors: &'a [Color],
    normals: &'a [Vector3f],
    tex_coords: &'a [TexCoord],
    /// `None` in flat mode
    triangles: Option<&'a [[usize; 3]]>,
}

#[derive(Debug, Clone)]
pub struct Session {
    num_vertices: usize,
    num_triangles: usize,
    flags: SimplifyFlags,
    params: SlimParams,

    positions: Vec<Point3f>,
    colors: Vec<Color>,
    normals: Vec<Vector3f>,
    tex_coords: Vec<TexCoord>,
    triangles: Vec<[usize; 3]>,

    output: Output,
    stats: Option<DecimationStats>,
}

impl Session {
    /// Declare the input sizes and flags. Counts are upper bounds for the
    /// data added afterwards.
    pub fn new(num_vertices: usize, num_triangles: usize, flags: SimplifyFlags) -> Self {
        debug!(
            vertices = num_vertices,
            triangles = num_triangles,
            flags = format_args!("{:#x}", flags.bits()),
            "New simplification session"
        );
        Self {
            num_vertices,
            num_triangles,
            flags,
            params: SlimParams::default(),
            positions: Vec::new(),
            colors: Vec::new(),
            normals: Vec::new(),
            tex_coords: Vec::new(),
            triangles: Vec::new(),
            output: Output::Input,
            stats: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: SlimParams) -> Self {
        self.params = params;
        self
    }

    pub fn flags(&self) -> SimplifyFlags {
        self.flags
    }

    pub fn params(&self) -> &SlimParams {
        &self.params
    }

    /// Statistics of the last successful run
    pub fn stats(&self) -> Option<&DecimationStats> {
        self.stats.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.output, Output::Failed)
    }

    /// True when no triangle has been supplied
    pub fn is_flat(&self) -> bool {
        self.triangles.is_empty()
    }

    // ============================================================
    // Input
    // ============================================================

    pub fn add_vertex(&mut self, x: f32, y: f32, z: f32) -> Result<usize> {
        trace!(x, y, z, "add vertex");
        push_bounded(&mut self.positions, Point3f::new(x, y, z), self.num_vertices, "vertex")
    }

    pub fn add_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<usize> {
        self.require(SimplifyFlags::COLOR, "color")?;
        push_bounded(&mut self.colors, Color::new(r, g, b, a), self.num_vertices, "color")
    }

    pub fn add_normal(&mut self, x: f32, y: f32, z: f32) -> Result<usize> {
        self.require(SimplifyFlags::NORMAL, "normal")?;
        push_bounded(&mut self.normals, Vector3f::new(x, y, z), self.num_vertices, "normal")
    }

    pub fn add_tex_coord(&mut self, u: f32, v: f32) -> Result<usize> {
        self.require(SimplifyFlags::TEXCOORD, "texture coordinate")?;
        push_bounded(&mut self.tex_coords, TexCoord::new(u, v), self.num_vertices, "tex_coord")
    }

    pub fn add_triangle(&mut self, a: usize, b: usize, c: usize) -> Result<usize> {
        trace!(a, b, c, "add triangle");
        for index in [a, b, c] {
            if index >= self.num_vertices {
                return Err(Error::out_of_range("vertex", index, self.num_vertices));
            }
        }
        push_bounded(&mut self.triangles, [a, b, c], self.num_triangles, "triangle")
    }

    /// Replace all positions with `num_vertices` records of `size` (3 or 4,
    /// the fourth component is ignored) floats, `stride` floats apart.
    /// A zero stride means tightly packed.
    pub fn set_vertex_array(&mut self, data: &[f32], size: usize, stride: usize) -> Result<()> {
        check_size("vertex", size, 3..=4)?;
        self.positions = read_strided(data, size, stride, self.num_vertices, "vertex")?
            .map(|r| Point3f::new(r[0], r[1], r[2]))
            .collect();
        Ok(())
    }

    /// Colors of 3 (opaque) or 4 components.
    pub fn set_color_array(&mut self, data: &[f32], size: usize, stride: usize) -> Result<()> {
        self.require(SimplifyFlags::COLOR, "color")?;
        check_size("color", size, 3..=4)?;
        self.colors = read_strided(data, size, stride, self.num_vertices, "color")?
            .map(|r| Color::new(r[0], r[1], r[2], r.get(3).copied().unwrap_or(1.0)))
            .collect();
        Ok(())
    }

    pub fn set_normal_array(&mut self, data: &[f32], stride: usize) -> Result<()> {
        self.require(SimplifyFlags::NORMAL, "normal")?;
        self.normals = read_strided(data, 3, stride, self.num_vertices, "normal")?
            .map(|r| Vector3f::new(r[0], r[1], r[2]))
            .collect();
        Ok(())
    }

    /// Texture coordinates of 2 to 4 components; only the first two are used.
    pub fn set_tex_coord_array(&mut self, data: &[f32], size: usize, stride: usize) -> Result<()> {
        self.require(SimplifyFlags::TEXCOORD, "texture coordinate")?;
        check_size("tex_coord", size, 2..=4)?;
        self.tex_coords = read_strided(data, size, stride, self.num_vertices, "tex_coord")?
            .map(|r| TexCoord::new(r[0], r[1]))
            .collect();
        Ok(())
    }

    /// Replace all triangles with consecutive index triples.
    pub fn set_index_array<I>(&mut self, indices: &[I]) -> Result<()>
    where
        I: Copy + TryInto<usize>,
    {
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "index array length {} is not a multiple of 3",
                indices.len()
            )));
        }
        if indices.len() / 3 > self.num_triangles {
            return Err(Error::InvalidData(format!(
                "{} triangles supplied, {} declared",
                indices.len() / 3,
                self.num_triangles
            )));
        }
        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for chunk in indices.chunks_exact(3) {
            let mut tri = [0usize; 3];
            for (slot, &index) in tri.iter_mut().zip(chunk) {
                let index: usize = index
                    .try_into()
                    .map_err(|_| Error::InvalidData("index does not fit in usize".into()))?;
                if index >= self.num_vertices {
                    return Err(Error::out_of_range("vertex", index, self.num_vertices));
                }
                *slot = index;
            }
            triangles.push(tri);
        }
        self.triangles = triangles;
        Ok(())
    }

    // ============================================================
    // Simplification
    // ============================================================

    /// Decimate the input down to at most `target` triangles and return the
    /// number of triangles produced.
    ///
    /// Every call starts from the input data. On error the input is left
    /// untouched; an invalid target does not fail the session.
    pub fn simplify(&mut self, target: usize) -> Result<usize> {
        if target < MIN_TARGET_FACES {
            warn!(target, "Simplification objective too low");
            return Err(Error::InvalidObjective(target));
        }
        if self.is_failed() {
            return Err(Error::InvalidState("session has failed".into()));
        }

        let flat = self.is_flat();
        let model = match self.build_model() {
            Ok(model) => model,
            Err(e) => {
                error!(error = %e, "Invalid simplification input");
                return Err(e);
            }
        };

        let strategy = self.flags.strategy();
        let mut decimator =
            Decimator::new(model, strategy, self.params.clone()).with_layout(self.flags.layout());
        if let Err(e) = decimator.decimate(target) {
            return Err(self.fail(e));
        }
        let stats = decimator.stats().clone();
        let compact = decimator.into_model().to_triangle_mesh();
        let mesh = if flat { flatten(&compact) } else { compact };

        let vertices = mesh.vertex_count();
        let triangles = mesh.face_count();
        if vertices > self.num_vertices
            || triangles > stats.original_faces
            || (flat && triangles * 3 > self.num_vertices)
        {
            return Err(self.fail(Error::Algorithm(format!(
                "simplified mesh has {vertices} vertices and {triangles} triangles, input had {} and {}",
                self.num_vertices, self.num_triangles
            ))));
        }

        info!(
            from_vertices = self.num_vertices,
            from_triangles = stats.original_faces,
            to_vertices = vertices,
            to_triangles = triangles,
            "Simplified"
        );
        self.stats = Some(stats);
        self.output = Output::Simplified { mesh, flat };
        Ok(triangles)
    }

    fn fail(&mut self, e: Error) -> Error {
        error!(error = %e, "Simplification failed");
        self.output = Output::Failed;
        self.stats = None;
        e
    }

    fn build_model(&self) -> Result<MeshModel> {
        if self.positions.len() != self.num_vertices {
            return Err(Error::InvalidData(format!(
                "{} vertices supplied, {} declared",
                self.positions.len(),
                self.num_vertices
            )));
        }
        let channels = [
            (SimplifyFlags::COLOR, "colors", self.colors.len()),
            (SimplifyFlags::NORMAL, "normals", self.normals.len()),
            (SimplifyFlags::TEXCOORD, "texture coordinates", self.tex_coords.len()),
        ];
        for (flag, name, len) in channels {
            if self.flags.contains(flag) && len != self.num_vertices {
                return Err(Error::InvalidData(format!(
                    "{len} {name} supplied, {} declared",
                    self.num_vertices
                )));
            }
        }

        let mut model = MeshModel::with_capacity(self.num_vertices, self.triangles.len());
        for (i, p) in self.positions.iter().enumerate() {
            let attributes = VertexAttributes {
                color: self.colors.get(i).copied(),
                normal: self.normals.get(i).copied(),
                tex_coord: self.tex_coords.get(i).copied(),
            };
            model.add_vertex(p.cast::<f64>(), attributes)?;
        }
        for &[a, b, c] in &self.triangles {
            model.add_face(a, b, c)?;
        }
        Ok(model)
    }

    fn require(&self, flag: SimplifyFlags, what: &str) -> Result<()> {
        if self.flags.contains(flag) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!("{what} channel is not enabled")))
        }
    }

    // ============================================================
    // Output
    // ============================================================

    /// Vertices of the input before simplification, of the result after.
    pub fn vertex_count(&self) -> usize {
        match &self.output {
            Output::Input => self.num_vertices,
            Output::Simplified { mesh, .. } => mesh.vertex_count(),
            Output::Failed => 0,
        }
    }

    pub fn triangle_count(&self) -> usize {
        match &self.output {
            Output::Input => self.num_triangles,
            Output::Simplified { mesh, .. } => mesh.face_count(),
            Output::Failed => 0,
        }
    }

    pub fn vertex(&self, index: usize) -> Result<Point3f> {
        lookup(self.view().positions, index, "vertex")
    }

    pub fn color(&self, index: usize) -> Result<Color> {
        self.require(SimplifyFlags::COLOR, "color")?;
        lookup(self.view().colors, index, "color")
    }

    pub fn normal(&self, index: usize) -> Result<Vector3f> {
        self.require(SimplifyFlags::NORMAL, "normal")?;
        lookup(self.view().normals, index, "normal")
    }

    pub fn tex_coord(&self, index: usize) -> Result<TexCoord> {
        self.require(SimplifyFlags::TEXCOORD, "texture coordinate")?;
        lookup(self.view().tex_coords, index, "tex_coord")
    }

    /// Corner indices of triangle `index`; unavailable in flat mode.
    pub fn triangle(&self, index: usize) -> Result<[usize; 3]> {
        let Some(triangles) = self.view().triangles else {
            return Err(Error::Unsupported("flat output has no triangle indices".into()));
        };
        lookup(triangles, index, "triangle")
    }

    /// Copy of the current geometry as a mesh. Flat output is indexed
    /// sequentially.
    pub fn mesh(&self) -> Result<TriangleMesh> {
        match &self.output {
            Output::Simplified { mesh, .. } => Ok(mesh.clone()),
            Output::Failed => Err(Error::InvalidState("session has failed".into())),
            Output::Input => {
                let mut mesh = TriangleMesh::from_vertices_and_faces(self.positions.clone(), self.triangles.clone());
                if self.flags.contains(SimplifyFlags::COLOR) {
                    mesh.set_colors(self.colors.clone());
                }
                if self.flags.contains(SimplifyFlags::NORMAL) {
                    mesh.set_normals(self.normals.clone());
                }
                if self.flags.contains(SimplifyFlags::TEXCOORD) {
                    mesh.set_tex_coords(self.tex_coords.clone());
                }
                Ok(mesh)
            }
        }
    }

    pub fn into_mesh(self) -> Result<TriangleMesh> {
        match self.output {
            Output::Simplified { mesh, .. } => Ok(mesh),
            _ => self.mesh(),
        }
    }

    /// Interleaved vertex records. Channels that are not enabled are filled
    /// with a zero normal, opaque white and a zero texture coordinate.
    pub fn vertex_buffer(&self) -> Vec<GpuVertex> {
        let view = self.view();
        view.positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let n = view.normals.get(i).copied().unwrap_or_else(Vector3f::zeros);
                let c = view.colors.get(i).copied().unwrap_or_default();
                let t = view.tex_coords.get(i).copied().unwrap_or_default();
                GpuVertex {
                    position: [p.x, p.y, p.z],
                    normal: [n.x, n.y, n.z],
                    color: [c.r, c.g, c.b, c.a],
                    tex_coord: [t.u, t.v],
                }
            })
            .collect()
    }

    pub fn index_buffer_u32(&self) -> Result<Vec<u32>> {
        self.index_buffer()
    }

    /// Errors if an index exceeds `u16::MAX`.
    pub fn index_buffer_u16(&self) -> Result<Vec<u16>> {
        self.index_buffer()
    }

    fn index_buffer<I: TryFrom<usize>>(&self) -> Result<Vec<I>> {
        let Some(triangles) = self.view().triangles else {
            return Err(Error::Unsupported("flat output has no triangle indices".into()));
        };
        triangles
            .iter()
            .flatten()
            .map(|&i| {
                I::try_from(i).map_err(|_| {
                    Error::InvalidData(format!("index {i} does not fit the index type"))
                })
            })
            .collect()
    }

    fn view(&self) -> View<'_> {
        match &self.output {
            Output::Input => View {
                positions: &self.positions,
                colors: &self.colors,
                normals: &self.normals,
                tex_coords: &self.tex_coords,
                triangles: (!self.triangles.is_empty()).then_some(self.triangles.as_slice()),
            },
            Output::Simplified { mesh, flat } => View {
                positions: &mesh.vertices,
                colors: mesh.colors.as_deref().unwrap_or_default(),
                normals: mesh.normals.as_deref().unwrap_or_default(),
                tex_coords: mesh.tex_coords.as_deref().unwrap_or_default(),
                triangles: (!flat).then_some(mesh.faces.as_slice()),
            },
            Output::Failed => View {
                positions: &[],
                colors: &[],
                normals: &[],
                tex_coords: &[],
                triangles: Some(&[]),
            },
        }
    }
}

/// Repeat every corner of every face, dropping the shared indices.
fn flatten(mesh: &TriangleMesh) -> TriangleMesh {
    let corners: Vec<usize> = mesh.faces.iter().flatten().copied().collect();
    let mut out = TriangleMesh::from_vertices_and_faces(
        corners.iter().map(|&i| mesh.vertices[i]).collect(),
        (0..mesh.faces.len()).map(|f| [3 * f, 3 * f + 1, 3 * f + 2]).collect(),
    );
    if let Some(colors) = &mesh.colors {
        out.set_colors(corners.iter().map(|&i| colors[i]).collect());
    }
    if let Some(normals) = &mesh.normals {
        out.set_normals(corners.iter().map(|&i| normals[i]).collect());
    }
    if let Some(tex_coords) = &mesh.tex_coords {
        out.set_tex_coords(corners.iter().map(|&i| tex_coords[i]).collect());
    }
    out
}

fn push_bounded<T>(items: &mut Vec<T>, item: T, limit: usize, what: &'static str) -> Result<usize> {
    if items.len() >= limit {
        return Err(Error::out_of_range(what, items.len(), limit));
    }
    items.push(item);
    Ok(items.len() - 1)
}

fn lookup<T: Copy>(items: &[T], index: usize, what: &'static str) -> Result<T> {
    if index >= items.len() {
        return Err(Error::out_of_range(what, index, items.len()));
    }
    Ok(items[index])
}

fn check_size(what: &str, size: usize, allowed: std::ops::RangeInclusive<usize>) -> Result<()> {
    if allowed.contains(&size) {
        Ok(())
    } else {
        Err(Error::InvalidData(format!(
            "{what} size {size} outside {}..={}",
            allowed.start(),
            allowed.end()
        )))
    }
}

/// `count` records of `size` floats, `stride` floats apart (0 = packed)
fn read_strided<'a>(
    data: &'a [f32],
    size: usize,
    stride: usize,
    count: usize,
    what: &str,
) -> Result<impl Iterator<Item = &'a [f32]> + 'a> {
    let stride = if stride == 0 { size } else { stride };
    if stride < size {
        return Err(Error::InvalidData(format!(
            "{what} stride {stride} is smaller than the record size {size}"
        )));
    }
    let needed = match count.checked_sub(1) {
        None => 0,
        Some(last) => last
            .checked_mul(stride)
            .and_then(|offset| offset.checked_add(size))
            .ok_or_else(|| {
                Error::InvalidData(format!("{what} stride {stride} overflows for {count} records"))
            })?,
    };
    if data.len() < needed {
        return Err(Error::InvalidData(format!(
            "{what} array holds {} floats, {needed} needed",
            data.len()
        )));
    }
    Ok((0..count).map(move |i| &data[i * stride..i * stride + size]))
}
