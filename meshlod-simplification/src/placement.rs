//! Contraction target placement
//!
//! Given the combined quadric of a vertex pair, choose where the merged vertex
//! goes. Policies that need a linear solve fall back to
//! [`PlacementPolicy::EndpointOrMidpoint`] when the system is singular, so a
//! placement always succeeds.

use crate::params::PlacementPolicy;
use crate::quadric::{Quadric, Quadric3};
use nalgebra::{DVector, Vector3};

/// A quadric that can be minimized over its own vector space.
pub trait PlacementMetric {
    type Vector: Clone;

    fn evaluate(&self, v: &Self::Vector) -> f64;
    fn optimize(&self) -> Option<Self::Vector>;
    fn optimize_on_segment(&self, v1: &Self::Vector, v2: &Self::Vector) -> Option<Self::Vector>;
    fn midpoint(v1: &Self::Vector, v2: &Self::Vector) -> Self::Vector;
}

impl PlacementMetric for Quadric3 {
    type Vector = Vector3<f64>;

    fn evaluate(&self, v: &Vector3<f64>) -> f64 {
        Quadric3::evaluate(self, v)
    }

    fn optimize(&self) -> Option<Vector3<f64>> {
        Quadric3::optimize(self).filter(|v| v.iter().all(|x| x.is_finite()))
    }

    fn optimize_on_segment(&self, v1: &Vector3<f64>, v2: &Vector3<f64>) -> Option<Vector3<f64>> {
        Quadric3::optimize_on_segment(self, v1, v2)
    }

    fn midpoint(v1: &Vector3<f64>, v2: &Vector3<f64>) -> Vector3<f64> {
        (v1 + v2) * 0.5
    }
}

impl PlacementMetric for Quadric {
    type Vector = DVector<f64>;

    fn evaluate(&self, v: &DVector<f64>) -> f64 {
        Quadric::evaluate(self, v)
    }

    fn optimize(&self) -> Option<DVector<f64>> {
        Quadric::optimize(self).filter(|v| v.iter().all(|x| x.is_finite()))
    }

    fn optimize_on_segment(&self, v1: &DVector<f64>, v2: &DVector<f64>) -> Option<DVector<f64>> {
        Quadric::optimize_on_segment(self, v1, v2)
    }

    fn midpoint(v1: &DVector<f64>, v2: &DVector<f64>) -> DVector<f64> {
        (v1 + v2) * 0.5
    }
}

/// Result of placing a contraction target.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement<V> {
    pub position: V,
    pub cost: f64,
    /// Policy that actually produced `position`; differs from the requested
    /// one after a singular fallback.
    pub policy_used: PlacementPolicy,
}

impl<V> Placement<V> {
    pub fn fell_back(&self, requested: PlacementPolicy) -> bool {
        self.policy_used != requested
    }
}

/// Place the merged vertex of the pair `(v1, v2)` under `policy`.
///
/// Ties between candidates go to `v1`; the midpoint only wins when strictly
/// cheaper than both endpoints.
pub fn place<Q: PlacementMetric>(
    q: &Q,
    v1: &Q::Vector,
    v2: &Q::Vector,
    policy: PlacementPolicy,
) -> Placement<Q::Vector> {
    match policy {
        PlacementPolicy::Endpoints => best_endpoint(q, v1, v2),
        PlacementPolicy::EndpointOrMidpoint => endpoint_or_midpoint(q, v1, v2),
        PlacementPolicy::Line => match q.optimize_on_segment(v1, v2) {
            Some(position) => Placement {
                cost: q.evaluate(&position),
                position,
                policy_used: PlacementPolicy::Line,
            },
            None => endpoint_or_midpoint(q, v1, v2),
        },
        PlacementPolicy::Optimal => match q.optimize() {
            Some(position) => Placement {
                cost: q.evaluate(&position),
                position,
                policy_used: PlacementPolicy::Optimal,
            },
            None => endpoint_or_midpoint(q, v1, v2),
        },
    }
}

fn best_endpoint<Q: PlacementMetric>(q: &Q, v1: &Q::Vector, v2: &Q::Vector) -> Placement<Q::Vector> {
    let c1 = q.evaluate(v1);
    let c2 = q.evaluate(v2);
    let (position, cost) = if c2 < c1 { (v2.clone(), c2) } else { (v1.clone(), c1) };
    Placement {
        position,
        cost,
        policy_used: PlacementPolicy::Endpoints,
    }
}

fn endpoint_or_midpoint<Q: PlacementMetric>(
    q: &Q,
    v1: &Q::Vector,
    v2: &Q::Vector,
) -> Placement<Q::Vector> {
    let mut best = best_endpoint(q, v1, v2);
    best.policy_used = PlacementPolicy::EndpointOrMidpoint;
    let mid = Q::midpoint(v1, v2);
    let cm = q.evaluate(&mid);
    if cm < best.cost {
        best.position = mid;
        best.cost = cm;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corner_quadric() -> Quadric3 {
        // Three orthogonal planes meeting at (1, 2, 3)
        let mut q = Quadric3::from_plane(&Vector3::x(), -1.0, 1.0);
        q += Quadric3::from_plane(&Vector3::y(), -2.0, 1.0);
        q += Quadric3::from_plane(&Vector3::z(), -3.0, 1.0);
        q
    }

    fn flat_quadric() -> Quadric3 {
        // Two coplanar triangles in z = 0: rank one tensor
        let mut q = Quadric3::from_plane(&Vector3::z(), 0.0, 0.5);
        q += Quadric3::from_plane(&Vector3::z(), 0.0, 0.5);
        q
    }

    #[test]
    fn test_optimal_finds_corner() {
        let q = corner_quadric();
        let p = place(&q, &Vector3::zeros(), &Vector3::new(2.0, 2.0, 2.0), PlacementPolicy::Optimal);
        assert_eq!(p.policy_used, PlacementPolicy::Optimal);
        assert_relative_eq!(p.position, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-9);
        assert_relative_eq!(p.cost, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_optimal_falls_back() {
        let q = flat_quadric();
        let v1 = Vector3::new(0.0, 0.0, 0.0);
        let v2 = Vector3::new(1.0, 1.0, 0.0);
        let p = place(&q, &v1, &v2, PlacementPolicy::Optimal);
        assert_eq!(p.policy_used, PlacementPolicy::EndpointOrMidpoint);
        assert!(p.fell_back(PlacementPolicy::Optimal));
        // Everything on the plane costs zero; the tie goes to v1
        assert_eq!(p.position, v1);
        assert_relative_eq!(p.cost, 0.0);
    }

    #[test]
    fn test_endpoints_prefers_cheaper() {
        let q = Quadric3::from_plane(&Vector3::z(), 0.0, 1.0);
        let v1 = Vector3::new(0.0, 0.0, 2.0);
        let v2 = Vector3::new(0.0, 0.0, 1.0);
        let p = place(&q, &v1, &v2, PlacementPolicy::Endpoints);
        assert_eq!(p.position, v2);
        assert_relative_eq!(p.cost, 1.0);
    }

    #[test]
    fn test_midpoint_wins_only_when_strictly_cheaper() {
        let q = Quadric3::from_plane(&Vector3::z(), 0.0, 1.0);
        let v1 = Vector3::new(0.0, 0.0, 1.0);
        let v2 = Vector3::new(0.0, 0.0, -1.0);
        let p = place(&q, &v1, &v2, PlacementPolicy::EndpointOrMidpoint);
        assert_relative_eq!(p.position, Vector3::zeros());
        assert_relative_eq!(p.cost, 0.0);

        let v2 = Vector3::new(1.0, 0.0, 1.0);
        let p = place(&q, &v1, &v2, PlacementPolicy::EndpointOrMidpoint);
        assert_eq!(p.position, v1);
    }

    #[test]
    fn test_line_clamps_to_segment() {
        let q = Quadric3::from_plane(&Vector3::z(), 0.0, 1.0);
        let v1 = Vector3::new(0.0, 0.0, 3.0);
        let v2 = Vector3::new(0.0, 0.0, 1.0);
        let p = place(&q, &v1, &v2, PlacementPolicy::Line);
        assert_eq!(p.policy_used, PlacementPolicy::Line);
        assert_relative_eq!(p.position, v2);
        assert_relative_eq!(p.cost, 1.0);
    }

    #[test]
    fn test_line_parallel_to_plane_falls_back() {
        let q = flat_quadric();
        let p = place(
            &q,
            &Vector3::new(0.0, 0.0, 1.0),
            &Vector3::new(1.0, 0.0, 1.0),
            PlacementPolicy::Line,
        );
        assert_eq!(p.policy_used, PlacementPolicy::EndpointOrMidpoint);
    }

    #[test]
    fn test_optimal_never_worse_than_endpoints() {
        let q = corner_quadric();
        let v1 = Vector3::new(0.5, 1.0, 4.0);
        let v2 = Vector3::new(2.0, 2.5, 2.0);
        let opt = place(&q, &v1, &v2, PlacementPolicy::Optimal);
        let ends = place(&q, &v1, &v2, PlacementPolicy::Endpoints);
        assert!(opt.cost <= ends.cost);
    }

    #[test]
    fn test_extended_quadric_placement() {
        let p1 = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0]);
        let p2 = DVector::from_vec(vec![1.0, 0.0, 0.0, 1.0]);
        let p3 = DVector::from_vec(vec![0.0, 1.0, 0.0, 0.0]);
        let q = Quadric::from_points(&p1, &p2, &p3, 0.5);

        // A single hyperplane is rank deficient in 4D
        let p = place(&q, &p1, &p2, PlacementPolicy::Optimal);
        assert_eq!(p.policy_used, PlacementPolicy::EndpointOrMidpoint);
        assert_relative_eq!(p.cost, 0.0, epsilon = 1e-12);
    }
}
