//! Rational Bezier surfaces: the shell engine's face geometry (§4.6).
//!
//! `SSurface` generalizes `crate::curve::SBezier` from a curve (one
//! parameter) to a tensor-product patch (two parameters `u, v`), the same
//! way the teacher's `geometry::topology::face::Face` sits above
//! `geometry::topology::edge::Edge` -- a face is a bounded region of a
//! continuous surface, just as an edge is a bounded region of a curve.
//! Triangulation for display reuses `crate::mesh::Triangle`.

use nalgebra::{Point3, Unit, Vector3};

use crate::curve::SBezier;
use crate::mesh::{Mesh, Triangle};
use crate::units::Tolerances;

/// A rational tensor-product Bezier patch with an `nu x nv` control net.
#[derive(Debug, Clone, PartialEq)]
pub struct SSurface {
    pub degree_u: usize,
    pub degree_v: usize,
    /// Row-major control net, `(degree_u + 1) * (degree_v + 1)` points.
    pub control_points: Vec<Point3<f64>>,
    pub weights: Vec<f64>,
}

impl SSurface {
    pub fn new(degree_u: usize, degree_v: usize, control_points: Vec<Point3<f64>>, weights: Vec<f64>) -> Self {
        let expected = (degree_u + 1) * (degree_v + 1);
        assert_eq!(control_points.len(), expected, "control net size mismatch");
        assert_eq!(weights.len(), expected);
        SSurface { degree_u, degree_v, control_points, weights }
    }

    /// A flat rectangular patch spanning `origin + u*du + v*dv` for
    /// `u, v` in `[0, 1]`, the degenerate case every planar face reduces to.
    pub fn plane(origin: Point3<f64>, du: Vector3<f64>, dv: Vector3<f64>) -> Self {
        let pts = vec![origin, origin + du, origin + dv, origin + du + dv];
        SSurface::new(1, 1, pts, vec![1.0; 4])
    }

    fn index(&self, i: usize, j: usize) -> usize {
        i * (self.degree_v + 1) + j
    }

    /// Extracts the isoparametric curve running along `v` at fixed row `i`.
    fn row_curve(&self, i: usize) -> SBezier {
        let start = self.index(i, 0);
        let end = self.index(i, self.degree_v);
        SBezier::new(self.control_points[start..=end].to_vec(), self.weights[start..=end].to_vec())
    }

    /// Rational de Casteljau evaluation: reduce each control-net row to a
    /// single (weighted) point at parameter `v`, tracking the row's
    /// collapsed weight alongside it, then reduce that column of points
    /// at parameter `u`.
    pub fn point_at(&self, u: f64, v: f64) -> Point3<f64> {
        let mut col_points = Vec::with_capacity(self.degree_u + 1);
        let mut col_weights = Vec::with_capacity(self.degree_u + 1);
        for i in 0..=self.degree_u {
            let row = self.row_curve(i);
            col_points.push(row.point_at(v));
            col_weights.push(row.weight_at(v));
        }
        let u_curve = SBezier::new(col_points, col_weights);
        u_curve.point_at(u)
    }

    pub fn tangents_at(&self, u: f64, v: f64) -> (Vector3<f64>, Vector3<f64>) {
        let h = 1e-6;
        let du = (self.point_at((u + h).min(1.0), v) - self.point_at((u - h).max(0.0), v))
            / ((u + h).min(1.0) - (u - h).max(0.0)).max(1e-9);
        let dv = (self.point_at(u, (v + h).min(1.0)) - self.point_at(u, (v - h).max(0.0)))
            / ((v + h).min(1.0) - (v - h).max(0.0)).max(1e-9);
        (du, dv)
    }

    pub fn normal_at(&self, u: f64, v: f64) -> Vector3<f64> {
        let (tu, tv) = self.tangents_at(u, v);
        let n = tu.cross(&tv);
        if n.norm_squared() < 1e-18 {
            Vector3::z()
        } else {
            n.normalize()
        }
    }

    /// Nearest `(u, v)` to `target`, via a coarse grid search refined by a
    /// few gradient-descent steps along the surface's tangent plane.
    pub fn closest_point_to(&self, target: Point3<f64>) -> (f64, f64) {
        let grid = 9;
        let mut best = (0.0, 0.0);
        let mut best_d = f64::INFINITY;
        for i in 0..=grid {
            for j in 0..=grid {
                let u = i as f64 / grid as f64;
                let v = j as f64 / grid as f64;
                let d = (self.point_at(u, v) - target).norm_squared();
                if d < best_d {
                    best_d = d;
                    best = (u, v);
                }
            }
        }
        let (mut u, mut v) = best;
        for _ in 0..12 {
            let (tu, tv) = self.tangents_at(u, v);
            let p = self.point_at(u, v);
            let diff = p - target;
            let step_u = diff.dot(&tu) / tu.norm_squared().max(1e-12);
            let step_v = diff.dot(&tv) / tv.norm_squared().max(1e-12);
            u = (u - step_u * 0.5).clamp(0.0, 1.0);
            v = (v - step_v * 0.5).clamp(0.0, 1.0);
        }
        (u, v)
    }

    /// True if every control point lies within `tol` of a common plane, in
    /// which case the shell engine can treat this patch as a plane for
    /// trimming purposes rather than a general NURBS intersection.
    pub fn is_planar(&self, tol: f64) -> bool {
        if self.control_points.len() < 3 {
            return true;
        }
        let origin = self.control_points[0];
        let normal = (self.control_points[1] - origin).cross(&(self.control_points[2] - origin));
        if normal.norm_squared() < 1e-18 {
            return true;
        }
        let n = normal.normalize();
        self.control_points.iter().all(|p| (p - origin).dot(&n).abs() < tol)
    }

    /// Flattens the patch into a triangle mesh with `subdivisions` samples
    /// per parametric axis, the display/manufacturing mesh spec.md's
    /// regenerator hands off after solving each group (§4.9).
    pub fn triangulate_into(&self, subdivisions: usize, mesh: &mut Mesh) {
        let n = subdivisions.max(1);
        let mut grid = vec![vec![Point3::origin(); n + 1]; n + 1];
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let u = i as f64 / n as f64;
                let v = j as f64 / n as f64;
                *cell = self.point_at(u, v);
            }
        }
        let mut triangles = Vec::with_capacity(n * n * 2);
        for i in 0..n {
            for j in 0..n {
                let p00 = grid[i][j];
                let p10 = grid[i + 1][j];
                let p11 = grid[i + 1][j + 1];
                let p01 = grid[i][j + 1];
                triangles.push(Triangle::new(p00, p10, p11));
                triangles.push(Triangle::new(p00, p11, p01));
            }
        }
        let fresh = Mesh::from_triangle_soup(&triangles, 1e-9);
        let offset = mesh.vertices.len() as u32;
        mesh.vertices.extend(fresh.vertices);
        mesh.triangles.extend(fresh.triangles.into_iter().map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]));
    }

    /// If this patch is a linear (`degree_u == 1`) sweep of its `v=const`
    /// row curve along one constant direction -- the shape `Extrude`
    /// produces for every side wall -- returns that sweep direction.
    pub fn is_extrusion(&self, tol: f64) -> Option<Vector3<f64>> {
        if self.degree_u != 1 {
            return None;
        }
        let cols = self.degree_v + 1;
        let mut dir: Option<Vector3<f64>> = None;
        for j in 0..cols {
            let bottom = self.control_points[self.index(0, j)];
            let top = self.control_points[self.index(1, j)];
            let d = top - bottom;
            match dir {
                None => dir = Some(d),
                Some(existing) => {
                    if (d - existing).norm() > tol {
                        return None;
                    }
                }
            }
        }
        dir.filter(|d| d.norm() > tol)
    }

    /// If this patch is a cylindrical side wall -- a circular row curve
    /// swept along its own normal axis -- returns `(axis point, axis
    /// direction, radius)`.
    pub fn is_cylinder(&self, tol: f64) -> Option<(Point3<f64>, Vector3<f64>, f64)> {
        let sweep = self.is_extrusion(tol)?;
        let (center, radius) = self.row_curve(0).is_circle(tol)?;
        let axis = Unit::new_normalize(sweep).into_inner();
        Some((center, axis, radius))
    }

    /// True if every control point lies within `tol` of the plane through
    /// `origin` with unit `normal`.
    pub fn coincident_with_plane(&self, origin: Point3<f64>, normal: Vector3<f64>, tol: f64) -> bool {
        self.control_points.iter().all(|p| (p - origin).dot(&normal).abs() < tol)
    }

    /// True if `self` and `other` are both planar patches lying in the same
    /// plane, used by the shell engine to merge coplanar caps instead of
    /// treating them as two distinct faces (§4.8). When `same_normal` is
    /// set, the two planes' normals must point the same way rather than
    /// merely be parallel.
    pub fn coincident_with(&self, other: &SSurface, same_normal: bool, tol: f64) -> bool {
        if !self.is_planar(tol) || !other.is_planar(tol) {
            return false;
        }
        let origin = self.control_points[0];
        let normal = self.normal_at(0.5, 0.5);
        if !other.coincident_with_plane(origin, normal, tol) {
            return false;
        }
        let other_normal = other.normal_at(0.5, 0.5);
        let aligned = (normal - other_normal).norm() < tol;
        let opposed = (normal + other_normal).norm() < tol;
        if same_normal {
            aligned
        } else {
            aligned || opposed
        }
    }
}

/// Dispatch used by the shell boolean engine to pick an intersection
/// strategy appropriate to each pair of surface kinds (§4.8); analytic
/// plane/plane and plane/non-planar cases are cheaper and more robust than
/// the fully general numeric marching used for two non-planar patches.
pub fn point_on_surfaces(a: &SSurface, b: &SSurface, tol: &Tolerances) -> Option<Point3<f64>> {
    let grid = 9;
    let mut best: Option<(Point3<f64>, f64)> = None;
    for i in 0..=grid {
        for j in 0..=grid {
            let u = i as f64 / grid as f64;
            let v = j as f64 / grid as f64;
            let pa = a.point_at(u, v);
            let (u2, v2) = b.closest_point_to(pa);
            let pb = b.point_at(u2, v2);
            let d = (pa - pb).norm();
            if best.as_ref().map(|(_, bd)| d < *bd).unwrap_or(true) {
                best = Some((Point3::from((pa.coords + pb.coords) / 2.0), d));
            }
        }
    }
    best.filter(|(_, d)| *d < tol.chord_tol * 10.0).map(|(p, _)| p)
}
