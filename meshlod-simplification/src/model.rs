//! Arena mesh model
//!
//! Vertices and faces live in flat index-addressed storage whose capacity is
//! fixed when the model is created. Removal only clears a validity flag, so a
//! handle is never reused during a run and a stale handle is detected by
//! [`MeshModel::vertex_is_valid`] / [`MeshModel::face_is_valid`].

use meshlod_core::{Error, Point3d, Point3f, Result, TriangleMesh, Vector3d, Vector3f, VertexAttributes};

pub type VertexId = usize;
pub type FaceId = usize;

/// Area below which a face is flagged degenerate
const DEGENERATE_AREA: f64 = 1e-14;

// ============================================================
// Records
// ============================================================

#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Point3d,
    pub attributes: VertexAttributes,
    valid: bool,
    /// Valid incident faces
    faces: Vec<FaceId>,
}

impl Vertex {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn faces(&self) -> &[FaceId] {
        &self.faces
    }

    pub fn degree(&self) -> usize {
        self.faces.len()
    }
}

#[derive(Debug, Clone)]
pub struct Face {
    vertices: [VertexId; 3],
    normal: Vector3d,
    area: f64,
    valid: bool,
    degenerate: bool,
}

impl Face {
    pub fn vertices(&self) -> [VertexId; 3] {
        self.vertices
    }

    /// Unit normal, zero for a degenerate face
    pub fn normal(&self) -> &Vector3d {
        &self.normal
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }

    /// The two corners other than `v`, in winding order starting after `v`
    pub fn opposite(&self, v: VertexId) -> Option<(VertexId, VertexId)> {
        let i = self.vertices.iter().position(|&x| x == v)?;
        Some((self.vertices[(i + 1) % 3], self.vertices[(i + 2) % 3]))
    }
}

/// Bookkeeping returned by [`MeshModel::contract`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contraction {
    /// Faces that contained both endpoints and were invalidated
    pub dead_faces: Vec<FaceId>,
    /// Surviving faces around the merged vertex, whose geometry changed
    pub changed_faces: Vec<FaceId>,
    /// Vertices adjacent to the merged vertex afterwards
    pub one_ring: Vec<VertexId>,
}

// ============================================================
// Model
// ============================================================

#[derive(Debug, Clone)]
pub struct MeshModel {
    vertices: Vec<Vertex>,
    faces: Vec<Face>,
    vertex_capacity: usize,
    face_capacity: usize,
    valid_vertices: usize,
    valid_faces: usize,
}

impl MeshModel {
    pub fn with_capacity(vertex_capacity: usize, face_capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_capacity),
            faces: Vec::with_capacity(face_capacity),
            vertex_capacity,
            face_capacity,
            valid_vertices: 0,
            valid_faces: 0,
        }
    }

    /// Build a model holding every vertex, attribute and face of `mesh`.
    pub fn from_triangle_mesh(mesh: &TriangleMesh) -> Result<Self> {
        mesh.validate()?;
        let mut model = Self::with_capacity(mesh.vertex_count(), mesh.face_count());
        for (i, p) in mesh.vertices.iter().enumerate() {
            model.add_vertex(p.cast::<f64>(), mesh.attributes(i))?;
        }
        for face in &mesh.faces {
            model.add_face(face[0], face[1], face[2])?;
        }
        Ok(model)
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn face_capacity(&self) -> usize {
        self.face_capacity
    }

    /// Vertices created so far, valid or not
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Faces created so far, valid or not
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn valid_vertex_count(&self) -> usize {
        self.valid_vertices
    }

    pub fn valid_face_count(&self) -> usize {
        self.valid_faces
    }

    pub fn add_vertex(&mut self, position: Point3d, attributes: VertexAttributes) -> Result<VertexId> {
        if self.vertices.len() >= self.vertex_capacity {
            return Err(Error::InvalidData(format!(
                "vertex capacity {} exceeded",
                self.vertex_capacity
            )));
        }
        let id = self.vertices.len();
        self.vertices.push(Vertex {
            position,
            attributes,
            valid: true,
            faces: Vec::new(),
        });
        self.valid_vertices += 1;
        Ok(id)
    }

    /// Add the triangle `(a, b, c)`.
    ///
    /// Zero-area triangles are accepted and flagged degenerate; a triangle
    /// naming the same vertex twice is rejected.
    pub fn add_face(&mut self, a: VertexId, b: VertexId, c: VertexId) -> Result<FaceId> {
        if self.faces.len() >= self.face_capacity {
            return Err(Error::InvalidData(format!(
                "face capacity {} exceeded",
                self.face_capacity
            )));
        }
        for v in [a, b, c] {
            if v >= self.vertices.len() {
                return Err(Error::out_of_range("vertex", v, self.vertices.len()));
            }
            if !self.vertices[v].valid {
                return Err(Error::InvalidData(format!("vertex {v} has been removed")));
            }
        }
        if a == b || b == c || a == c {
            return Err(Error::InvalidData(format!(
                "face ({a}, {b}, {c}) repeats a vertex"
            )));
        }

        let id = self.faces.len();
        let (normal, area) = self.plane_of([a, b, c]);
        self.faces.push(Face {
            vertices: [a, b, c],
            normal,
            area,
            valid: true,
            degenerate: area <= DEGENERATE_AREA,
        });
        for v in [a, b, c] {
            self.vertices[v].faces.push(id);
        }
        self.valid_faces += 1;
        Ok(id)
    }

    /// Read sequential vertex triples as triangles, for input without
    /// connectivity. Only allowed before any face exists. Returns the number
    /// of faces created.
    pub fn synthesize_flat_faces(&mut self) -> Result<usize> {
        if !self.faces.is_empty() {
            return Err(Error::InvalidState(
                "flat faces requested on a model that already has faces".into(),
            ));
        }
        let count = self.vertices.len() / 3;
        self.face_capacity = self.face_capacity.max(count);
        self.faces.reserve(count);
        for i in 0..count {
            self.add_face(3 * i, 3 * i + 1, 3 * i + 2)?;
        }
        Ok(count)
    }

    pub fn vertex(&self, v: VertexId) -> Option<&Vertex> {
        self.vertices.get(v)
    }

    pub fn face(&self, f: FaceId) -> Option<&Face> {
        self.faces.get(f)
    }

    pub fn vertex_is_valid(&self, v: VertexId) -> bool {
        self.vertices.get(v).is_some_and(|x| x.valid)
    }

    pub fn face_is_valid(&self, f: FaceId) -> bool {
        self.faces.get(f).is_some_and(|x| x.valid)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter().enumerate()
    }

    pub fn valid_faces(&self) -> impl Iterator<Item = (FaceId, &Face)> {
        self.faces.iter().enumerate().filter(|(_, f)| f.valid)
    }

    // Unchecked accessors for handles already known to be in range. Callers
    // outside the crate go through `vertex` and `face`.

    pub(crate) fn position(&self, v: VertexId) -> &Point3d {
        &self.vertices[v].position
    }

    pub(crate) fn attributes(&self, v: VertexId) -> &VertexAttributes {
        &self.vertices[v].attributes
    }

    /// Corner positions of face `f`
    pub(crate) fn corners(&self, f: FaceId) -> [Point3d; 3] {
        let [a, b, c] = self.faces[f].vertices;
        [self.vertices[a].position, self.vertices[b].position, self.vertices[c].position]
    }

    /// Un-normalized normal `(p1 - p0) x (p2 - p0)`
    pub(crate) fn raw_normal(&self, f: FaceId) -> Vector3d {
        let [p0, p1, p2] = self.corners(f);
        (p1 - p0).cross(&(p2 - p0))
    }

    /// Valid faces containing both `a` and `b`
    pub fn shared_faces(&self, a: VertexId, b: VertexId) -> Vec<FaceId> {
        self.incident(a).filter(|&f| self.faces[f].contains(b)).collect()
    }

    /// Number of valid faces on the edge `(a, b)`
    pub fn edge_face_count(&self, a: VertexId, b: VertexId) -> usize {
        self.incident(a).filter(|&f| self.faces[f].contains(b)).count()
    }

    pub fn is_boundary_edge(&self, a: VertexId, b: VertexId) -> bool {
        self.edge_face_count(a, b) == 1
    }

    /// Vertices sharing a valid face with `v`, sorted
    pub fn neighbors(&self, v: VertexId) -> Vec<VertexId> {
        let mut ring: Vec<VertexId> = self
            .incident(v)
            .flat_map(|f| self.faces[f].vertices)
            .filter(|&u| u != v)
            .collect();
        ring.sort_unstable();
        ring.dedup();
        ring
    }

    /// Incident faces of `v`; empty for an out-of-range handle
    fn incident(&self, v: VertexId) -> impl Iterator<Item = FaceId> + '_ {
        self.vertices.get(v).map(|x| x.faces.as_slice()).unwrap_or_default().iter().copied()
    }

    /// Move a vertex and refresh the geometry of its faces.
    pub(crate) fn set_position(&mut self, v: VertexId, position: Point3d) {
        self.vertices[v].position = position;
        let faces = self.vertices[v].faces.clone();
        for f in faces {
            self.refresh_face(f);
        }
    }

    /// Merge `removed` into `surviving`, placing the result at `position`.
    ///
    /// Faces holding both vertices are invalidated; every other face of
    /// `removed` is re-pointed at `surviving`. `removed` becomes invalid.
    /// Vertices left without faces stay valid.
    pub fn contract(
        &mut self,
        surviving: VertexId,
        removed: VertexId,
        position: Point3d,
        attributes: VertexAttributes,
    ) -> Result<Contraction> {
        if surviving == removed {
            return Err(Error::InvalidState(format!(
                "cannot contract vertex {surviving} with itself"
            )));
        }
        for v in [surviving, removed] {
            if !self.vertex_is_valid(v) {
                return Err(Error::InvalidState(format!("vertex {v} is not valid")));
            }
        }

        let mut dead_faces = Vec::new();
        let removed_faces = std::mem::take(&mut self.vertices[removed].faces);
        for f in removed_faces {
            if self.faces[f].contains(surviving) {
                self.faces[f].valid = false;
                for u in self.faces[f].vertices {
                    if u != removed {
                        self.vertices[u].faces.retain(|&g| g != f);
                    }
                }
                dead_faces.push(f);
            } else {
                for slot in self.faces[f].vertices.iter_mut() {
                    if *slot == removed {
                        *slot = surviving;
                    }
                }
                self.vertices[surviving].faces.push(f);
            }
        }

        self.vertices[removed].valid = false;
        self.valid_vertices -= 1;
        self.valid_faces -= dead_faces.len();

        let keeper = &mut self.vertices[surviving];
        keeper.attributes = attributes;
        self.set_position(surviving, position);

        Ok(Contraction {
            dead_faces,
            changed_faces: self.vertices[surviving].faces.clone(),
            one_ring: self.neighbors(surviving),
        })
    }

    /// Compact copy of the valid part of the model.
    ///
    /// Attribute channels are emitted when at least one kept vertex carries
    /// them; vertices lacking a channel get its default.
    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut mesh = TriangleMesh::new();
        let kept: Vec<&Vertex> = self.vertices.iter().filter(|v| v.valid).collect();

        for (old, v) in self.vertices.iter().enumerate() {
            if v.valid {
                remap[old] = mesh.add_vertex(Point3f::new(
                    v.position.x as f32,
                    v.position.y as f32,
                    v.position.z as f32,
                ));
            }
        }
        for (_, face) in self.valid_faces() {
            let [a, b, c] = face.vertices;
            mesh.add_face([remap[a], remap[b], remap[c]]);
        }

        if kept.iter().any(|v| v.attributes.normal.is_some()) {
            mesh.set_normals(kept.iter().map(|v| v.attributes.normal.unwrap_or_else(Vector3f::zeros)).collect());
        }
        if kept.iter().any(|v| v.attributes.color.is_some()) {
            mesh.set_colors(kept.iter().map(|v| v.attributes.color.unwrap_or_default()).collect());
        }
        if kept.iter().any(|v| v.attributes.tex_coord.is_some()) {
            mesh.set_tex_coords(kept.iter().map(|v| v.attributes.tex_coord.unwrap_or_default()).collect());
        }
        mesh
    }

    fn plane_of(&self, [a, b, c]: [VertexId; 3]) -> (Vector3d, f64) {
        let p0 = self.vertices[a].position;
        let n = (self.vertices[b].position - p0).cross(&(self.vertices[c].position - p0));
        let len = n.norm();
        let area = 0.5 * len;
        if area <= DEGENERATE_AREA || !len.is_finite() {
            (Vector3d::zeros(), area)
        } else {
            (n / len, area)
        }
    }

    fn refresh_face(&mut self, f: FaceId) {
        let (normal, area) = self.plane_of(self.faces[f].vertices);
        let face = &mut self.faces[f];
        face.normal = normal;
        face.area = area;
        face.degenerate = area <= DEGENERATE_AREA;
    }
}
