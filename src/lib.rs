//! # meshlod
//!
//! Level-of-detail generation for triangle meshes through quadric error
//! simplification.
//!
//! This is the umbrella crate. It re-exports the core data types and, behind
//! the `simplification` feature, the decimation engine.
//!
//! ## Quick Start
//!
//! ```rust
//! use meshlod::prelude::*;
//!
//! let mut session = Session::new(4, 2, SimplifyFlags::EDGE);
//! for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
//!     session.add_vertex(x, y, 0.0).unwrap();
//! }
//! session.add_triangle(0, 1, 2).unwrap();
//! session.add_triangle(0, 2, 3).unwrap();
//!
//! // Already at or below the objective: nothing to do
//! assert_eq!(session.simplify(3).unwrap(), 2);
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables simplification
//! - `simplification`: Quadric error decimation, sessions and GPU buffers

// Re-export core functionality
pub use meshlod_core::*;

#[cfg(feature = "simplification")]
pub use meshlod_simplification as simplification;

/// Convenient imports for common use cases
pub mod prelude {
    pub use meshlod_core::*;

    #[cfg(feature = "simplification")]
    pub use meshlod_simplification::*;
}
