//! Parameters for quadric simplification.

use serde::{Deserialize, Serialize};

/// Candidate universe and quadric dimensionality of a decimation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollapseStrategy {
    /// Mesh edges only, geometric quadrics.
    Edge,
    /// Mesh edges plus virtual pairs of nearby vertices, geometric quadrics.
    /// Allows gaps to close and topology to change.
    Face,
    /// Mesh edges scored with quadrics extended by the enabled vertex
    /// attributes (color, normal, texture coordinate).
    Property,
}

impl std::fmt::Display for CollapseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CollapseStrategy::Edge => "edge",
            CollapseStrategy::Face => "face",
            CollapseStrategy::Property => "property",
        };
        f.write_str(name)
    }
}

/// Rule choosing the position of the vertex produced by a contraction,
/// ordered by increasing cost and fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlacementPolicy {
    /// The cheaper of the two endpoints
    Endpoints,
    /// The cheapest of both endpoints and the midpoint
    EndpointOrMidpoint,
    /// The minimum along the segment between the endpoints
    Line,
    /// The unconstrained minimum of the combined quadric
    Optimal,
}

/// How face quadrics are weighted before being folded into vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightingPolicy {
    /// Every face counts the same
    Uniform,
    /// Faces weighted by their area
    Area,
    /// Each corner receives the face quadric weighted by its corner angle
    Angle,
    /// Area weighting, with collapse costs divided by the accumulated area
    AreaAverage,
    /// Area weighting scaled up by the sharpest dihedral angle around the
    /// face: `area * (1 + angle_weight * angle / PI)`
    Dihedral { angle_weight: f64 },
    /// Plane quadrics built from the un-normalized face normal
    RawNormals,
}

/// Parameters shared by every collapse strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlimParams {
    /// Target position rule. Default: optimal
    pub placement: PlacementPolicy,

    /// Face quadric weighting. Default: area
    pub weighting: WeightingPolicy,

    /// Weight of the penalty planes erected along boundary edges.
    /// Zero disables boundary constraints. Default: 1000.0
    pub boundary_weight: f64,

    /// Minimum triangle compactness below which collapses are penalized.
    /// Zero disables the check. Default: 0.0
    pub compactness_ratio: f64,

    /// Cost added per failed local validity test. Default: 1.0
    pub meshing_penalty: f64,

    /// Fraction of the original distance to the opposite edge a moved vertex
    /// must keep; 0.0 rejects only inverted faces. Default: 0.0
    pub local_validity_threshold: f64,

    /// Largest valence a contraction may push a vertex to. Default: 24
    pub vertex_degree_limit: usize,

    /// Only perform contractions that remove no faces. Default: false
    pub will_join_only: bool,

    /// Distance below which two unconnected vertices form a virtual pair
    /// (face strategy). `None` uses 1% of the bounding box diagonal.
    pub pair_tolerance: Option<f64>,

    /// Stop once the cheapest candidate costs more than this. Default: None
    pub max_error: Option<f64>,
}

impl Default for SlimParams {
    fn default() -> Self {
        Self {
            placement: PlacementPolicy::Optimal,
            weighting: WeightingPolicy::Area,
            boundary_weight: 1000.0,
            compactness_ratio: 0.0,
            meshing_penalty: 1.0,
            local_validity_threshold: 0.0,
            vertex_degree_limit: 24,
            will_join_only: false,
            pair_tolerance: None,
            max_error: None,
        }
    }
}

impl SlimParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap placement and no boundary protection, for previews.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            placement: PlacementPolicy::EndpointOrMidpoint,
            weighting: WeightingPolicy::Uniform,
            boundary_weight: 0.0,
            ..Default::default()
        }
    }

    /// Stricter meshing: compactness checks and a conservative validity
    /// threshold on top of the defaults.
    #[must_use]
    pub fn high_quality() -> Self {
        Self {
            compactness_ratio: 0.2,
            local_validity_threshold: 0.05,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_placement(mut self, placement: PlacementPolicy) -> Self {
        self.placement = placement;
        self
    }

    #[must_use]
    pub const fn with_weighting(mut self, weighting: WeightingPolicy) -> Self {
        self.weighting = weighting;
        self
    }

    #[must_use]
    pub const fn with_boundary_weight(mut self, weight: f64) -> Self {
        self.boundary_weight = weight;
        self
    }

    #[must_use]
    pub const fn with_compactness_ratio(mut self, ratio: f64) -> Self {
        self.compactness_ratio = ratio;
        self
    }

    #[must_use]
    pub const fn with_meshing_penalty(mut self, penalty: f64) -> Self {
        self.meshing_penalty = penalty;
        self
    }

    #[must_use]
    pub const fn with_local_validity_threshold(mut self, threshold: f64) -> Self {
        self.local_validity_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_vertex_degree_limit(mut self, limit: usize) -> Self {
        self.vertex_degree_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_join_only(mut self, join_only: bool) -> Self {
        self.will_join_only = join_only;
        self
    }

    #[must_use]
    pub const fn with_pair_tolerance(mut self, tolerance: f64) -> Self {
        self.pair_tolerance = Some(tolerance);
        self
    }

    #[must_use]
    pub const fn with_max_error(mut self, max_error: f64) -> Self {
        self.max_error = Some(max_error);
        self
    }
}
