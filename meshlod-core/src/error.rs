//! Error types for meshlod

use thiserror::Error;

/// Main error type for meshlod operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invalid objective: {0} triangles requested, at least 3 required")]
    InvalidObjective(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl Error {
    /// Shorthand for an [`Error::OutOfRange`] on the given collection.
    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Error::OutOfRange { what, index, len }
    }
}

/// Result type alias for meshlod operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidObjective(2);
        assert!(format!("{err}").contains("at least 3"));

        let err = Error::out_of_range("vertex", 12, 8);
        assert_eq!(format!("{err}"), "vertex index 12 out of range (len 8)");
    }
}
