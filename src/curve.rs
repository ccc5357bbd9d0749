//! Rational Bezier curves and polyline flattening (§4.6).
//!
//! Grounded in the teacher's `geometry::primitives::Box::to_mesh`, whose
//! deterministic corner/winding construction is the template this module
//! follows for `point_at`/`tangent_at` evaluation, and in
//! `geometry::geometry::apply_transform_to_point`, generalized here from a
//! single Euler-angle rotation to the quaternion transforms
//! `crate::entity::NormalParams` already carries.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::units::Tolerances;

/// A rational Bezier curve of degree `control_points.len() - 1` (1 to 3).
/// Weights default to 1.0 for a plain polynomial Bezier; a weight pattern
/// of `(1, w, 1)` with `w = cos(theta/2)` represents a circular arc
/// exactly, which is how `is_circle` recognizes one.
#[derive(Debug, Clone, PartialEq)]
pub struct SBezier {
    pub control_points: Vec<Point3<f64>>,
    pub weights: Vec<f64>,
}

impl SBezier {
    pub fn new(control_points: Vec<Point3<f64>>, weights: Vec<f64>) -> Self {
        assert_eq!(control_points.len(), weights.len(), "control points and weights must pair up");
        SBezier { control_points, weights }
    }

    pub fn line(a: Point3<f64>, b: Point3<f64>) -> Self {
        SBezier::new(vec![a, b], vec![1.0, 1.0])
    }

    pub fn degree(&self) -> usize {
        self.control_points.len() - 1
    }

    /// Rational de Casteljau evaluation at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        let n = self.degree();
        let mut numerator = Vector3::zeros();
        let mut denominator = 0.0;
        for i in 0..=n {
            let b = bernstein(n, i, t) * self.weights[i];
            numerator += self.control_points[i].coords * b;
            denominator += b;
        }
        Point3::from(numerator / denominator)
    }

    /// The rational curve's weight function `W(t) = sum_i B_i(t) w_i`,
    /// i.e. the denominator of `point_at` before division -- what a
    /// tensor-product surface needs to reduce a control-net row to a
    /// single weighted column point without losing its weight.
    pub fn weight_at(&self, t: f64) -> f64 {
        let n = self.degree();
        (0..=n).map(|i| bernstein(n, i, t) * self.weights[i]).sum()
    }

    /// Numeric tangent via a symmetric finite difference; exact for the
    /// polynomial (unweighted) case and accurate to O(h^2) for rational
    /// curves, which is sufficient for the chord-tolerance flattening
    /// `make_pwl` performs below.
    pub fn tangent_at(&self, t: f64) -> Vector3<f64> {
        let h = 1e-6;
        let t0 = (t - h).clamp(0.0, 1.0);
        let t1 = (t + h).clamp(0.0, 1.0);
        if (t1 - t0).abs() < 1e-12 {
            return Vector3::zeros();
        }
        (self.point_at(t1) - self.point_at(t0)) / (t1 - t0)
    }

    /// Splits the curve at parameter `t`, returning two Beziers covering
    /// `[0, t]` and `[t, 1]`, via rational de Casteljau subdivision.
    pub fn split_at(&self, t: f64) -> (SBezier, SBezier) {
        let n = self.degree();
        // Work in homogeneous (weighted) coordinates so subdivision of the
        // rational curve reduces to subdivision of a polynomial one.
        let mut homog: Vec<(Vector3<f64>, f64)> =
            (0..=n).map(|i| (self.control_points[i].coords * self.weights[i], self.weights[i])).collect();

        let mut left = vec![homog[0]];
        let mut right = vec![homog[n]];

        for level in 1..=n {
            let mut next = Vec::with_capacity(homog.len() - 1);
            for i in 0..homog.len() - 1 {
                let p = homog[i].0 * (1.0 - t) + homog[i + 1].0 * t;
                let w = homog[i].1 * (1.0 - t) + homog[i + 1].1 * t;
                next.push((p, w));
            }
            left.push(next[0]);
            right.push(next[next.len() - 1]);
            homog = next;
            let _ = level;
        }
        right.reverse();

        let unhomog = |pts: Vec<(Vector3<f64>, f64)>| -> (Vec<Point3<f64>>, Vec<f64>) {
            let mut cps = Vec::with_capacity(pts.len());
            let mut ws = Vec::with_capacity(pts.len());
            for (p, w) in pts {
                cps.push(Point3::from(p / w));
                ws.push(w);
            }
            (cps, ws)
        };
        let (lc, lw) = unhomog(left);
        let (rc, rw) = unhomog(right);
        (SBezier::new(lc, lw), SBezier::new(rc, rw))
    }

    /// Nearest point on the curve to `target`, via ternary search over the
    /// unimodal-enough distance function for typical sketch curves,
    /// refined with a handful of Newton corrections.
    pub fn closest_point_to(&self, target: Point3<f64>) -> f64 {
        let samples = 33;
        let mut best_t = 0.0;
        let mut best_d = f64::INFINITY;
        for i in 0..=samples {
            let t = i as f64 / samples as f64;
            let d = (self.point_at(t) - target).norm_squared();
            if d < best_d {
                best_d = d;
                best_t = t;
            }
        }
        let mut t = best_t;
        for _ in 0..8 {
            let p = self.point_at(t);
            let tangent = self.tangent_at(t);
            let denom = tangent.norm_squared();
            if denom < 1e-14 {
                break;
            }
            let step = (p - target).dot(&tangent) / denom;
            t = (t - step).clamp(0.0, 1.0);
        }
        t
    }

    /// True if every point of the curve lies within `tol` of a common
    /// plane defined by `origin`/`normal`.
    pub fn is_in_plane(&self, origin: Point3<f64>, normal: Vector3<f64>, tol: f64) -> bool {
        let n = normal.normalize();
        self.control_points.iter().all(|p| (p - origin).dot(&n).abs() < tol)
    }

    pub fn is_rational(&self) -> bool {
        self.weights.iter().any(|w| (w - 1.0).abs() > 1e-12)
    }

    /// Recognizes a 3-control-point rational Bezier of the canonical
    /// `(1, cos(theta/2), 1)` weight form as an exact circular arc,
    /// returning `(center, radius)` when it is one.
    pub fn is_circle(&self, tol: f64) -> Option<(Point3<f64>, f64)> {
        if self.control_points.len() != 3 {
            return None;
        }
        let (p0, p2) = (self.control_points[0], self.control_points[2]);
        let center = circumcenter(p0, self.control_points[1], p2)?;
        let r0 = (p0 - center).norm();
        let r2 = (p2 - center).norm();
        if (r0 - r2).abs() < tol { Some((center, r0)) } else { None }
    }

    pub fn transformed_by(&self, rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> SBezier {
        SBezier::new(
            self.control_points.iter().map(|p| Point3::from(rotation * p.coords + translation)).collect(),
            self.weights.clone(),
        )
    }

    /// Flattens the curve to a polyline whose maximum chord deviation from
    /// the true curve is at most `tol.chord_tol`, recursively bisecting at
    /// the parametric midpoint while points are sampled no more than
    /// `tol.max_segments` times (§4.6, §9 "determinism" contract: same
    /// curve + same tolerances always yields the same polyline).
    pub fn make_pwl(&self, tol: &Tolerances) -> Vec<Point3<f64>> {
        let mut out = vec![self.point_at(0.0)];
        self.subdivide(0.0, 1.0, self.point_at(0.0), self.point_at(1.0), tol, &mut out, 0);
        out
    }

    fn subdivide(
        &self,
        t0: f64,
        t1: f64,
        p0: Point3<f64>,
        p1: Point3<f64>,
        tol: &Tolerances,
        out: &mut Vec<Point3<f64>>,
        depth: usize,
    ) {
        if out.len() >= tol.max_segments {
            out.push(p1);
            return;
        }
        let tm = 0.5 * (t0 + t1);
        let pm = self.point_at(tm);
        let chord_deviation = distance_point_to_segment(pm, p0, p1);
        if chord_deviation <= tol.chord_tol || depth > 24 {
            out.push(p1);
        } else {
            self.subdivide(t0, tm, p0, pm, tol, out, depth + 1);
            self.subdivide(tm, t1, pm, p1, tol, out, depth + 1);
        }
    }
}

fn distance_point_to_segment(p: Point3<f64>, a: Point3<f64>, b: Point3<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-18 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (p - closest).norm()
}

fn circumcenter(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Option<Point3<f64>> {
    let normal = (b - a).cross(&(c - a));
    if normal.norm_squared() < 1e-18 {
        return None;
    }
    // Solve in the plane of a, b, c using barycentric circumcenter formula.
    let ab = b - a;
    let ac = c - a;
    let ab2 = ab.norm_squared();
    let ac2 = ac.norm_squared();
    let denom = 2.0 * normal.norm_squared();
    let numerator = ab2 * ac.cross(&normal) + ac2 * normal.cross(&ab);
    Some(a + numerator / denom)
}

pub(crate) fn bernstein(n: usize, i: usize, t: f64) -> f64 {
    binomial(n, i) as f64 * t.powi(i as i32) * (1.0 - t).powi((n - i) as i32)
}

fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result = 1u64;
    for i in 0..k {
        result = result * (n - i) as u64 / (i + 1) as u64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_point_at_interpolates_linearly() {
        let line = SBezier::line(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
        let mid = line.point_at(0.5);
        assert!((mid.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn split_at_midpoint_endpoints_match_evaluation() {
        let curve = SBezier::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 5.0, 0.0), Point3::new(10.0, 0.0, 0.0)],
            vec![1.0, 1.0, 1.0],
        );
        let (left, right) = curve.split_at(0.5);
        let expected_mid = curve.point_at(0.5);
        assert!((left.control_points.last().unwrap() - expected_mid).norm() < 1e-9);
        assert!((right.control_points.first().unwrap() - expected_mid).norm() < 1e-9);
        assert!((left.control_points[0] - curve.control_points[0]).norm() < 1e-9);
        assert!((right.control_points.last().unwrap() - curve.control_points.last().unwrap()).norm() < 1e-9);
    }

    #[test]
    fn make_pwl_respects_chord_tolerance() {
        let curve = SBezier::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 10.0, 0.0), Point3::new(10.0, 0.0, 0.0)],
            vec![1.0, 1.0, 1.0],
        );
        let tol = Tolerances::default().with_chord_tol(0.05);
        let pwl = curve.make_pwl(&tol);
        for window in pwl.windows(2) {
            // sample the curve densely between consecutive polyline points
            // and check no interior sample strays past tolerance from the chord
            let a = window[0];
            let b = window[1];
            for i in 1..10 {
                let t = i as f64 / 10.0;
                let p = Point3::from(a.coords * (1.0 - t) + b.coords * t);
                assert!(distance_point_to_segment(p, a, b) < tol.chord_tol + 1e-9);
            }
        }
    }

    #[test]
    fn closest_point_to_finds_nearest_parameter() {
        let line = SBezier::line(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
        let t = line.closest_point_to(Point3::new(3.0, 1.0, 0.0));
        assert!((t - 0.3).abs() < 1e-3);
    }

    #[test]
    fn is_in_plane_detects_planar_curve() {
        let curve = SBezier::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            vec![1.0, 1.0, 1.0],
        );
        assert!(curve.is_in_plane(Point3::origin(), Vector3::z(), 1e-9));
        assert!(!curve.is_in_plane(Point3::origin(), Vector3::x(), 1e-9));
    }

    #[test]
    fn binomial_matches_known_values() {
        assert_eq!(binomial(4, 2), 6);
        assert_eq!(binomial(3, 0), 1);
        assert_eq!(binomial(3, 3), 1);
    }
}
