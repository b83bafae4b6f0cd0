//! Mesh simplification by quadric error metrics
//!
//! This crate reduces the triangle count of a mesh while keeping it close to
//! the original surface:
//! - Quadric error metrics, geometric and attribute extended
//! - An arena mesh model with incremental vertex contraction
//! - A greedy decimation scheduler over an indexed candidate heap, with edge,
//!   virtual pair (face) and property preserving strategies
//! - A builder / extractor session for buffer based callers

pub mod quadric;
pub mod heap;
pub mod params;
pub mod placement;
pub mod model;
pub mod result;
pub mod decimate;
pub mod session;
pub mod quadric_error;

pub use quadric::{Quadric, Quadric3, SINGULARITY_EPSILON};
pub use heap::{Heapable, IndexedHeap};
pub use params::*;
pub use placement::{place, Placement, PlacementMetric};
pub use model::{Contraction, Face, FaceId, MeshModel, Vertex, VertexId};
pub use result::DecimationStats;
pub use decimate::{AttributeLayout, Decimator, SchedulerState, Step, MIN_TARGET_FACES};
pub use session::{GpuVertex, Session, SimplifyFlags};
pub use quadric_error::*;

use meshlod_core::{TriangleMesh, Result};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
