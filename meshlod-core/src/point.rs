//! Point and per-vertex attribute types

use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// Linear RGBA color with components nominally in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from three channels
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Linear interpolation, `t = 0` yields `self`
    pub fn lerp(&self, other: &Color, t: f32) -> Color {
        Color {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    /// Clamp every channel into `[0, 1]`
    pub fn clamped(&self) -> Color {
        Color {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::rgb(1.0, 1.0, 1.0)
    }
}

/// 2D texture coordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct TexCoord {
    pub u: f32,
    pub v: f32,
}

impl TexCoord {
    pub const fn new(u: f32, v: f32) -> Self {
        Self { u, v }
    }

    /// Linear interpolation, `t = 0` yields `self`
    pub fn lerp(&self, other: &TexCoord, t: f32) -> TexCoord {
        TexCoord {
            u: self.u + (other.u - self.u) * t,
            v: self.v + (other.v - self.v) * t,
        }
    }
}

/// Optional attributes carried by a single vertex
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexAttributes {
    pub color: Option<Color>,
    pub normal: Option<Vector3f>,
    pub tex_coord: Option<TexCoord>,
}

impl VertexAttributes {
    /// Interpolate every attribute present on both sides.
    ///
    /// Normals are re-normalized; a degenerate blend keeps `self`'s normal.
    pub fn lerp(&self, other: &VertexAttributes, t: f32) -> VertexAttributes {
        let color = match (self.color, other.color) {
            (Some(a), Some(b)) => Some(a.lerp(&b, t)),
            (a, b) => a.or(b),
        };
        let normal = match (self.normal, other.normal) {
            (Some(a), Some(b)) => {
                let blended = a + (b - a) * t;
                let n = blended.normalize();
                if n.iter().all(|x| x.is_finite()) {
                    Some(n)
                } else {
                    Some(a)
                }
            }
            (a, b) => a.or(b),
        };
        let tex_coord = match (self.tex_coord, other.tex_coord) {
            (Some(a), Some(b)) => Some(a.lerp(&b, t)),
            (a, b) => a.or(b),
        };
        VertexAttributes {
            color,
            normal,
            tex_coord,
        }
    }
}
