//! Statistics reported by a decimation run.

// Face counts don't overflow f64 mantissas in practice
#![allow(clippy::cast_precision_loss)]

/// Counters collected while a scheduler drains its heap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecimationStats {
    /// Valid faces before the run
    pub original_faces: usize,

    /// Valid vertices before the run
    pub original_vertices: usize,

    /// Valid faces after the run
    pub final_faces: usize,

    /// Valid vertices after the run
    pub final_vertices: usize,

    /// Contractions applied to the model
    pub collapses_performed: usize,

    /// Candidates popped and discarded by validation
    pub collapses_rejected: usize,

    /// Placements that fell back from a singular solve
    pub placement_fallbacks: usize,

    /// Largest cost among applied contractions
    pub max_cost: f64,
}

impl DecimationStats {
    /// Final over original face count.
    #[must_use]
    pub fn reduction_ratio(&self) -> f64 {
        if self.original_faces == 0 {
            1.0
        } else {
            self.final_faces as f64 / self.original_faces as f64
        }
    }

    #[must_use]
    pub fn reduction_percent(&self) -> f64 {
        (1.0 - self.reduction_ratio()) * 100.0
    }

    #[must_use]
    pub const fn was_decimated(&self) -> bool {
        self.collapses_performed > 0
    }
}

impl std::fmt::Display for DecimationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Decimation: {} → {} faces, {} → {} vertices ({:.1}% reduction, {} collapses, {} rejected)",
            self.original_faces,
            self.final_faces,
            self.original_vertices,
            self.final_vertices,
            self.reduction_percent(),
            self.collapses_performed,
            self.collapses_rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DecimationStats {
        DecimationStats {
            original_faces: 1000,
            original_vertices: 502,
            final_faces: 500,
            final_vertices: 252,
            collapses_performed: 250,
            collapses_rejected: 10,
            placement_fallbacks: 3,
            max_cost: 0.25,
        }
    }

    #[test]
    fn test_reduction_ratio() {
        let stats = sample();
        assert!((stats.reduction_ratio() - 0.5).abs() < 0.001);
        assert!((stats.reduction_percent() - 50.0).abs() < 0.1);
        assert_eq!(DecimationStats::default().reduction_ratio(), 1.0);
    }

    #[test]
    fn test_was_decimated() {
        assert!(sample().was_decimated());
        assert!(!DecimationStats::default().was_decimated());
    }

    #[test]
    fn test_display() {
        let display = format!("{}", sample());
        assert!(display.contains("1000"));
        assert!(display.contains("252"));
        assert!(display.contains("50.0%"));
        assert!(display.contains("10 rejected"));
    }
}
