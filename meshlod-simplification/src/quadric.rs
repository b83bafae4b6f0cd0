//! Quadric error metrics
//!
//! A quadric is the quadratic form `Q(v) = v·A·v + 2·b·v + c` together with
//! the area `r` it was accumulated over. Summing the quadrics of a set of
//! planes yields the sum of squared distances to those planes, which makes
//! quadrics cheap to accumulate when vertices merge.
//!
//! [`Quadric3`] is the fixed-size geometric metric. [`Quadric`] is the
//! attribute-extended variant whose dimension is `3 + k` for `k` tracked
//! scalar attributes.

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, RowVector4, Vector3};
use std::ops::{Add, AddAssign, MulAssign};

/// Determinant (or line denominator) magnitude below which a system is singular
pub const SINGULARITY_EPSILON: f64 = 1e-12;

/// Geometric quadric over 3D positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric3 {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    c: f64,
    area: f64,
}

impl Default for Quadric3 {
    fn default() -> Self {
        Self::zeros()
    }
}

impl Quadric3 {
    pub fn zeros() -> Self {
        Self {
            a: Matrix3::zeros(),
            b: Vector3::zeros(),
            c: 0.0,
            area: 0.0,
        }
    }

    /// Squared distance to the plane `n·x + d = 0`; `normal` must be unit length
    /// for the metric to measure true distances.
    pub fn from_plane(normal: &Vector3<f64>, d: f64, area: f64) -> Self {
        Self {
            a: normal * normal.transpose(),
            b: normal * d,
            c: d * d,
            area,
        }
    }

    pub fn tensor(&self) -> &Matrix3<f64> {
        &self.a
    }

    pub fn vector(&self) -> &Vector3<f64> {
        &self.b
    }

    pub fn offset(&self) -> f64 {
        self.c
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn set_area(&mut self, area: f64) {
        self.area = area;
    }

    /// The symmetric 4x4 matrix acting on homogeneous points `[x y z 1]`.
    pub fn homogeneous(&self) -> Matrix4<f64> {
        let mut h = Matrix4::zeros();
        h.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.a);
        h.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.b);
        h.fixed_view_mut::<1, 3>(3, 0).copy_from(&self.b.transpose());
        h[(3, 3)] = self.c;
        h
    }

    pub fn evaluate(&self, v: &Vector3<f64>) -> f64 {
        v.dot(&(self.a * v)) + 2.0 * self.b.dot(v) + self.c
    }

    /// Position minimizing the quadric, `None` when the system is singular.
    ///
    /// Solves the homogeneous system whose last row is replaced by
    /// `[0 0 0 1]`, pinning the affine coordinate to one.
    pub fn optimize(&self) -> Option<Vector3<f64>> {
        let mut h = self.homogeneous();
        h.set_row(3, &RowVector4::new(0.0, 0.0, 0.0, 1.0));
        if h.determinant().abs() < SINGULARITY_EPSILON {
            return None;
        }
        let inv = h.try_inverse()?;
        let v = inv.column(3);
        let w = v[3];
        Some(Vector3::new(v[0] / w, v[1] / w, v[2] / w))
    }

    /// Minimum along the segment `v1`–`v2`, `None` when the quadric is flat
    /// along the segment direction.
    pub fn optimize_on_segment(&self, v1: &Vector3<f64>, v2: &Vector3<f64>) -> Option<Vector3<f64>> {
        let d = v1 - v2;
        let ad = self.a * d;
        let denom = d.dot(&ad);
        if denom.abs() < SINGULARITY_EPSILON {
            return None;
        }
        let t = -(self.b.dot(&d) + d.dot(&(self.a * v2))) / denom;
        Some(v2 + d * t.clamp(0.0, 1.0))
    }
}

impl AddAssign<&Quadric3> for Quadric3 {
    fn add_assign(&mut self, other: &Quadric3) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
        self.area += other.area;
    }
}

impl AddAssign for Quadric3 {
    fn add_assign(&mut self, other: Quadric3) {
        *self += &other;
    }
}

impl Add for Quadric3 {
    type Output = Quadric3;

    fn add(mut self, other: Quadric3) -> Quadric3 {
        self += &other;
        self
    }
}

/// Scales the coefficients; the accumulated area is left untouched.
impl MulAssign<f64> for Quadric3 {
    fn mul_assign(&mut self, s: f64) {
        self.a *= s;
        self.b *= s;
        self.c *= s;
    }
}

/// Quadric over `3 + k` dimensional (position + attribute) vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadric {
    a: DMatrix<f64>,
    b: DVector<f64>,
    c: f64,
    area: f64,
}

impl Quadric {
    pub fn zeros(dim: usize) -> Self {
        Self {
            a: DMatrix::zeros(dim, dim),
            b: DVector::zeros(dim),
            c: 0.0,
            area: 0.0,
        }
    }

    /// Squared distance to the 2-plane through three lifted points.
    ///
    /// A triangle whose lifted edges are degenerate yields the zero quadric
    /// (still carrying `area`).
    pub fn from_points(p1: &DVector<f64>, p2: &DVector<f64>, p3: &DVector<f64>, area: f64) -> Self {
        let dim = p1.len();
        debug_assert!(p2.len() == dim && p3.len() == dim);

        let mut e1 = p2 - p1;
        let n1 = e1.norm();
        if n1 <= f64::EPSILON {
            return Self { area, ..Self::zeros(dim) };
        }
        e1 /= n1;

        let mut e2 = p3 - p1;
        let along = e1.dot(&e2);
        e2.axpy(-along, &e1, 1.0);
        let n2 = e2.norm();
        if n2 <= f64::EPSILON {
            return Self { area, ..Self::zeros(dim) };
        }
        e2 /= n2;

        let p1e1 = p1.dot(&e1);
        let p1e2 = p1.dot(&e2);

        let a = DMatrix::identity(dim, dim) - &e1 * e1.transpose() - &e2 * e2.transpose();
        let b = &e1 * p1e1 + &e2 * p1e2 - p1;
        let c = p1.dot(p1) - p1e1 * p1e1 - p1e2 * p1e2;

        Self { a, b, c, area }
    }

    /// Embed a geometric quadric into the leading 3x3 block of a `dim`-D one.
    pub fn from_quadric3(q: &Quadric3, dim: usize) -> Self {
        debug_assert!(dim >= 3);
        let mut out = Self::zeros(dim);
        out.a.view_mut((0, 0), (3, 3)).copy_from(q.tensor());
        out.b.rows_mut(0, 3).copy_from(q.vector());
        out.c = q.offset();
        out.area = q.area();
        out
    }

    pub fn dim(&self) -> usize {
        self.b.len()
    }

    pub fn tensor(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn vector(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn offset(&self) -> f64 {
        self.c
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn evaluate(&self, v: &DVector<f64>) -> f64 {
        v.dot(&(&self.a * v)) + 2.0 * self.b.dot(v) + self.c
    }

    /// Stationary point `-A⁻¹·b`, `None` when `A` is singular.
    pub fn optimize(&self) -> Option<DVector<f64>> {
        if self.a.determinant().abs() < SINGULARITY_EPSILON {
            return None;
        }
        let inv = self.a.clone().try_inverse()?;
        Some(-(inv * &self.b))
    }

    pub fn optimize_on_segment(&self, v1: &DVector<f64>, v2: &DVector<f64>) -> Option<DVector<f64>> {
        let d = v1 - v2;
        let ad = &self.a * &d;
        let denom = d.dot(&ad);
        if denom.abs() < SINGULARITY_EPSILON {
            return None;
        }
        let t = -(self.b.dot(&d) + d.dot(&(&self.a * v2))) / denom;
        Some(v2 + d * t.clamp(0.0, 1.0))
    }
}

impl AddAssign<&Quadric> for Quadric {
    fn add_assign(&mut self, other: &Quadric) {
        debug_assert_eq!(self.dim(), other.dim());
        self.a += &other.a;
        self.b += &other.b;
        self.c += other.c;
        self.area += other.area;
    }
}

impl Add<&Quadric> for &Quadric {
    type Output = Quadric;

    fn add(self, other: &Quadric) -> Quadric {
        let mut out = self.clone();
        out += other;
        out
    }
}

impl MulAssign<f64> for Quadric {
    fn mul_assign(&mut self, s: f64) {
        self.a *= s;
        self.b *= s;
        self.c *= s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle_plane() -> Quadric3 {
        // Triangle lying in z = 2
        let n = Vector3::new(0.0, 0.0, 1.0);
        Quadric3::from_plane(&n, -2.0, 0.5)
    }

    #[test]
    fn test_zero_quadric() {
        let q = Quadric3::default();
        assert_eq!(q.evaluate(&Vector3::new(1.0, 2.0, 3.0)), 0.0);
        assert!(q.optimize().is_none());
    }

    #[test]
    fn test_plane_quadric_measures_squared_distance() {
        let q = triangle_plane();
        assert_relative_eq!(q.evaluate(&Vector3::new(5.0, -3.0, 2.0)), 0.0);
        assert_relative_eq!(q.evaluate(&Vector3::new(0.0, 0.0, 3.0)), 1.0);
        assert_relative_eq!(q.evaluate(&Vector3::new(0.0, 0.0, -1.0)), 9.0);
        assert_eq!(q.area(), 0.5);
    }

    #[test]
    fn test_homogeneous_matches_evaluate() {
        let n = Vector3::new(1.0, 2.0, 2.0) / 3.0;
        let q = Quadric3::from_plane(&n, 0.7, 1.0);
        let v = Vector3::new(0.3, -1.2, 4.0);
        let vh = v.push(1.0);
        let h = q.homogeneous();
        assert_relative_eq!((vh.transpose() * h * vh)[0], q.evaluate(&v), epsilon = 1e-12);
    }

    #[test]
    fn test_addition_is_commutative_and_associative() {
        let q1 = Quadric3::from_plane(&Vector3::new(1.0, 0.0, 0.0), -1.0, 1.0);
        let q2 = Quadric3::from_plane(&Vector3::new(0.0, 1.0, 0.0), 0.5, 2.0);
        let q3 = Quadric3::from_plane(&Vector3::new(0.0, 0.6, 0.8), 3.0, 0.25);

        let left = (q1 + q2) + q3;
        let right = q1 + (q2 + q3);
        assert_relative_eq!(left.tensor(), right.tensor(), epsilon = 1e-12);
        assert_relative_eq!(left.vector(), right.vector(), epsilon = 1e-12);
        assert_relative_eq!(left.offset(), right.offset(), epsilon = 1e-12);
        assert_relative_eq!(left.area(), right.area(), epsilon = 1e-12);

        let ab = q1 + q2;
        let ba = q2 + q1;
        assert_relative_eq!(ab.tensor(), ba.tensor());
        assert_relative_eq!(ab.offset(), ba.offset());
    }

    #[test]
    fn test_scaling_keeps_area() {
        let mut q = triangle_plane();
        q *= 4.0;
        assert_relative_eq!(q.evaluate(&Vector3::new(0.0, 0.0, 3.0)), 4.0);
        assert_eq!(q.area(), 0.5);
    }

    #[test]
    fn test_optimize_three_planes() {
        let mut q = Quadric3::from_plane(&Vector3::new(1.0, 0.0, 0.0), -1.0, 1.0);
        q += Quadric3::from_plane(&Vector3::new(0.0, 1.0, 0.0), -2.0, 1.0);
        q += Quadric3::from_plane(&Vector3::new(0.0, 0.0, 1.0), -3.0, 1.0);

        let v = q.optimize().unwrap();
        assert_relative_eq!(v, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-10);
        assert_relative_eq!(q.evaluate(&v), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_optimize_single_plane_is_singular() {
        assert!(triangle_plane().optimize().is_none());
    }

    #[test]
    fn test_optimize_on_segment() {
        // Planes x = 0.25 and y = 0: minimum along the x axis at 0.25
        let mut q = Quadric3::from_plane(&Vector3::new(1.0, 0.0, 0.0), -0.25, 1.0);
        q += Quadric3::from_plane(&Vector3::new(0.0, 1.0, 0.0), 0.0, 1.0);
        let v1 = Vector3::new(0.0, 0.0, 0.0);
        let v2 = Vector3::new(1.0, 0.0, 0.0);
        let v = q.optimize_on_segment(&v1, &v2).unwrap();
        assert_relative_eq!(v.x, 0.25, epsilon = 1e-12);

        // Minimum outside of the segment is clamped to the nearest endpoint
        let far = Quadric3::from_plane(&Vector3::new(1.0, 0.0, 0.0), -5.0, 1.0);
        let v = far.optimize_on_segment(&v1, &v2).unwrap();
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-12);

        // Direction lying inside the plane leaves the quadric flat
        let flat = Quadric3::from_plane(&Vector3::new(0.0, 0.0, 1.0), 0.0, 1.0);
        assert!(flat.optimize_on_segment(&v1, &v2).is_none());
    }

    #[test]
    fn test_nd_from_points_vanishes_on_plane() {
        let p1 = DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        let p2 = DVector::from_vec(vec![1.0, 0.0, 0.0, 1.0]);
        let p3 = DVector::from_vec(vec![0.0, 1.0, 0.0, 0.0]);
        let q = Quadric::from_points(&p1, &p2, &p3, 0.5);

        assert_eq!(q.dim(), 4);
        assert_relative_eq!(q.evaluate(&p1), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.evaluate(&p2), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.evaluate(&p3), 0.0, epsilon = 1e-12);

        // Affine combinations stay on the 2-plane
        let mid = (&p1 + &p2 + &p3) / 3.0;
        assert_relative_eq!(q.evaluate(&mid), 0.0, epsilon = 1e-12);

        // Lifting off the plane along z costs the squared offset
        let off = DVector::from_vec(vec![0.0, 0.0, 2.0, 1.0]);
        assert_relative_eq!(q.evaluate(&off), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nd_matches_geometric_in_three_dimensions() {
        let p1 = DVector::from_vec(vec![0.0, 0.0, 1.0]);
        let p2 = DVector::from_vec(vec![2.0, 0.0, 1.0]);
        let p3 = DVector::from_vec(vec![0.0, 3.0, 1.0]);
        let nd = Quadric::from_points(&p1, &p2, &p3, 3.0);
        let geo = Quadric::from_quadric3(
            &Quadric3::from_plane(&Vector3::new(0.0, 0.0, 1.0), -1.0, 3.0),
            3,
        );
        assert_relative_eq!(nd.tensor(), geo.tensor(), epsilon = 1e-12);
        assert_relative_eq!(nd.vector(), geo.vector(), epsilon = 1e-12);
        assert_relative_eq!(nd.offset(), geo.offset(), epsilon = 1e-12);
    }

    #[test]
    fn test_nd_degenerate_triangle_is_zero() {
        let p = DVector::from_vec(vec![1.0, 1.0, 1.0, 0.5]);
        let q = Quadric::from_points(&p, &p, &p, 0.0);
        assert_eq!(q, Quadric::zeros(4));
    }

    #[test]
    fn test_nd_embedding_and_optimize() {
        let mut q3 = Quadric3::from_plane(&Vector3::new(1.0, 0.0, 0.0), -1.0, 1.0);
        q3 += Quadric3::from_plane(&Vector3::new(0.0, 1.0, 0.0), -1.0, 1.0);
        q3 += Quadric3::from_plane(&Vector3::new(0.0, 0.0, 1.0), -1.0, 1.0);
        let embedded = Quadric::from_quadric3(&q3, 5);
        assert_eq!(embedded.dim(), 5);
        // Attribute block is empty, so the full system is singular
        assert!(embedded.optimize().is_none());

        let three = Quadric::from_quadric3(&q3, 3);
        let v = three.optimize().unwrap();
        assert_relative_eq!(v, DVector::from_vec(vec![1.0, 1.0, 1.0]), epsilon = 1e-10);
    }

    #[test]
    fn test_nd_addition() {
        let p1 = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.2]);
        let p2 = DVector::from_vec(vec![1.0, 0.0, 0.0, 0.4]);
        let p3 = DVector::from_vec(vec![0.0, 1.0, 0.0, 0.6]);
        let p4 = DVector::from_vec(vec![0.0, 0.0, 1.0, 0.1]);
        let a = Quadric::from_points(&p1, &p2, &p3, 1.0);
        let b = Quadric::from_points(&p1, &p2, &p4, 2.0);
        let c = Quadric::from_points(&p2, &p3, &p4, 0.5);

        let left = &(&a + &b) + &c;
        let right = &a + &(&b + &c);
        assert_relative_eq!(left.tensor(), right.tensor(), epsilon = 1e-12);
        assert_relative_eq!(left.area(), 3.5);
        assert_relative_eq!((&a + &b).tensor(), (&b + &a).tensor(), epsilon = 1e-12);
    }
}
