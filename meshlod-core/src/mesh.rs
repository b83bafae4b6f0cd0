//! Triangle mesh container exchanged with the simplification engine

use crate::error::Error;
use crate::point::*;
use crate::Result;
use serde::{Deserialize, Serialize};

/// An indexed triangle mesh with optional per-vertex attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<Color>>,
    pub tex_coords: Option<Vec<TexCoord>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
            tex_coords: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
            tex_coords: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Attributes of vertex `index`, `None` for channels the mesh does not carry
    pub fn attributes(&self, index: usize) -> VertexAttributes {
        VertexAttributes {
            color: self.colors.as_ref().and_then(|c| c.get(index).copied()),
            normal: self.normals.as_ref().and_then(|n| n.get(index).copied()),
            tex_coord: self.tex_coords.as_ref().and_then(|t| t.get(index).copied()),
        }
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Total surface area
    pub fn surface_area(&self) -> f32 {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let e1 = self.vertices[face[1]] - v0;
                let e2 = self.vertices[face[2]] - v0;
                e1.cross(&e2).norm() * 0.5
            })
            .sum()
    }

    /// Axis aligned bounds, `None` for a mesh without vertices
    pub fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(mut min, mut max), p| {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
            (min, max)
        }))
    }

    /// Check face indices and attribute lengths
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        for (fi, face) in self.faces.iter().enumerate() {
            if let Some(&bad) = face.iter().find(|&&v| v >= n) {
                return Err(Error::InvalidData(format!(
                    "face {fi} references vertex {bad} but the mesh has {n} vertices"
                )));
            }
        }
        let lengths = [
            ("normals", self.normals.as_ref().map(Vec::len)),
            ("colors", self.colors.as_ref().map(Vec::len)),
            ("tex_coords", self.tex_coords.as_ref().map(Vec::len)),
        ];
        for (name, len) in lengths {
            if let Some(len) = len {
                if len != n {
                    return Err(Error::InvalidData(format!(
                        "{name} has {len} entries, expected {n}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<Color>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Set vertex texture coordinates
    pub fn set_tex_coords(&mut self, tex_coords: Vec<TexCoord>) {
        if tex_coords.len() == self.vertices.len() {
            self.tex_coords = Some(tex_coords);
        }
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.normals = None;
        self.colors = None;
        self.tex_coords = None;
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}
