//! Core data structures for meshlod
//!
//! This crate provides the types shared by the simplification engine and its
//! callers: points, per-vertex attributes, the indexed triangle mesh and the
//! error type.

pub mod point;
pub mod mesh;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
