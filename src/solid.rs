//! Sketch-profile extraction and the solid-generating group kinds
//! (Extrude, Lathe, Translate, Rotate -- §4.5's "the group itself emits
//! derived entities: transformed copies, extrusion skeleton").
//!
//! Grounded in `crate::shell`'s documented choice to run every boolean on
//! the faceted `crate::mesh::Mesh` rather than an exact analytic shell:
//! derived solids here are built the same way, straight from a sketch's
//! assembled 2d profile to a triangle-mesh sweep, instead of through
//! intermediate `SSurface` patches and a trimmed shell. A sketch's
//! profile lives in the sketch's own XY plane, the same global-axis
//! simplification `crate::constraint`'s Horizontal/Vertical already make
//! (no per-workplane uvn basis is tracked on entities themselves).

use nalgebra::{Point2, Point3, Rotation3, Unit, Vector3};

use crate::curve::SBezier;
use crate::entity::{Entity, EntityKind};
use crate::handle::{EntityHandle, ParamHandle};
use crate::mesh::{Mesh, Triangle};
use crate::polygon::{SEdge2d, SEdgeList, SPolygon};
use crate::units::Tolerances;

const CIRCLE_SEGMENTS: usize = 32;

/// Assembles every line-segment, circle, arc and cubic-spline entity owned
/// by a sketch group into one or more closed contours in the XY plane, then
/// sorts them into one outer contour (largest absolute area) plus holes.
pub fn profile_from_group<'a>(
    entities: impl Iterator<Item = &'a Entity>,
    lookup: impl Fn(EntityHandle) -> &'a Entity,
    value_of: &impl Fn(ParamHandle) -> f64,
    tol: &Tolerances,
) -> Result<SPolygon, String> {
    let mut edges = SEdgeList::new();
    for e in entities {
        match &e.kind {
            EntityKind::Line(l) => {
                let a = lookup(l.p0).point_position(value_of).ok_or("line endpoint is not a point")?;
                let b = lookup(l.p1).point_position(value_of).ok_or("line endpoint is not a point")?;
                edges.push(SEdge2d::new(Point2::new(a.x, a.y), Point2::new(b.x, b.y)));
            }
            EntityKind::Circle(c) => {
                let center = lookup(c.center).point_position(value_of).ok_or("circle center is not a point")?;
                let normal = lookup(c.normal).normal_direction(value_of).unwrap_or(Vector3::z());
                let radius = match &lookup(c.radius).kind {
                    EntityKind::Distance(d) => value_of(d.d),
                    _ => return Err("circle radius entity is not a distance".to_string()),
                };
                let (u, v) = perpendicular_basis(normal);
                let mut points = Vec::with_capacity(CIRCLE_SEGMENTS);
                for i in 0..CIRCLE_SEGMENTS {
                    let theta = 2.0 * std::f64::consts::PI * i as f64 / CIRCLE_SEGMENTS as f64;
                    let p = center + radius * (theta.cos() * u + theta.sin() * v);
                    points.push(Point2::new(p.x, p.y));
                }
                for i in 0..points.len() {
                    edges.push(SEdge2d::new(points[i], points[(i + 1) % points.len()]));
                }
            }
            EntityKind::Arc(a) => {
                let center = lookup(a.center).point_position(value_of).ok_or("arc center is not a point")?;
                let start = lookup(a.start).point_position(value_of).ok_or("arc start is not a point")?;
                let end = lookup(a.end).point_position(value_of).ok_or("arc end is not a point")?;
                let normal = lookup(a.normal).normal_direction(value_of).unwrap_or(Vector3::z());
                let pts: Vec<Point2<f64>> = arc_polyline(center, start, end, normal).into_iter().map(|p| Point2::new(p.x, p.y)).collect();
                for window in pts.windows(2) {
                    edges.push(SEdge2d::new(window[0], window[1]));
                }
            }
            EntityKind::Cubic(c) => {
                let mut control_points = Vec::with_capacity(c.control_points.len());
                for &ch in &c.control_points {
                    control_points.push(lookup(ch).point_position(value_of).ok_or("cubic control point is not a point")?);
                }
                let weights: Vec<f64> = c.weights.iter().map(|&w| value_of(w)).collect();
                let bez = SBezier::new(control_points, weights);
                let pts: Vec<Point2<f64>> = bez.make_pwl(tol).into_iter().map(|p| Point2::new(p.x, p.y)).collect();
                for window in pts.windows(2) {
                    edges.push(SEdge2d::new(window[0], window[1]));
                }
            }
            _ => {}
        }
    }
    if edges.edges.is_empty() {
        return Err("sketch has no line or circle geometry to form a profile".to_string());
    }
    edges.cull_duplicates(tol);
    let mut contours = edges.assemble_polygon(tol)?;
    contours.sort_by(|a, b| crate::polygon::signed_area(b).abs().partial_cmp(&crate::polygon::signed_area(a).abs()).unwrap());
    let outer = contours.remove(0);
    let mut poly = SPolygon::new(outer, contours);
    poly.fix_contour_directions();
    Ok(poly)
}

/// Flattens an arc (center/start/end swept counterclockwise about `normal`,
/// matching the convention `crate::constraint`'s circle/arc equations
/// already assume) into a polyline of `CIRCLE_SEGMENTS` scaled by the
/// fraction of the full turn actually swept.
fn arc_polyline(center: Point3<f64>, start: Point3<f64>, end: Point3<f64>, normal: Vector3<f64>) -> Vec<Point3<f64>> {
    let (u, v) = perpendicular_basis(normal);
    let radius = (start - center).norm();
    let angle_of = |p: Point3<f64>| -> f64 {
        let d = p - center;
        d.dot(&v).atan2(d.dot(&u))
    };
    let theta_start = angle_of(start);
    let mut theta_end = angle_of(end);
    let two_pi = 2.0 * std::f64::consts::PI;
    if theta_end <= theta_start {
        theta_end += two_pi;
    }
    let sweep = theta_end - theta_start;
    let segments = (1.max((CIRCLE_SEGMENTS as f64 * sweep / two_pi).round() as usize)).max(1);
    let mut points = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let theta = theta_start + sweep * i as f64 / segments as f64;
        points.push(center + radius * (theta.cos() * u + theta.sin() * v));
    }
    points
}

fn perpendicular_basis(n: Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let n = if n.norm_squared() < 1e-18 { Vector3::z() } else { n.normalize() };
    let helper = if n.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let u = n.cross(&helper).normalize();
    let v = n.cross(&u);
    (u, v)
}

fn to3(p: Point2<f64>) -> Point3<f64> {
    Point3::new(p.x, p.y, 0.0)
}

/// Sweeps `profile` from the identity pose to `profile` translated by
/// `distance` along `direction`, walling in every contour edge and capping
/// both ends (§4.5's "extrusion skeleton").
pub fn extrude(profile: &SPolygon, direction: Vector3<f64>, distance: f64, tol: &Tolerances) -> Mesh {
    let dir = if direction.norm_squared() < 1e-18 { Vector3::z() } else { direction.normalize() };
    let offset = dir * distance;
    sweep(profile, &[identity_pose(), translated_pose(offset)], false, tol)
}

/// Revolves `profile` about the axis through `axis_point` along
/// `axis_dir` by `angle_degrees`, producing a closed ring mesh when the
/// angle is a full turn and a capped wedge otherwise.
pub fn lathe(profile: &SPolygon, axis_point: Point3<f64>, axis_dir: Vector3<f64>, angle_degrees: f64, tol: &Tolerances) -> Mesh {
    let axis = if axis_dir.norm_squared() < 1e-18 { Vector3::z() } else { axis_dir.normalize() };
    let full_turn = (angle_degrees - 360.0).abs() < 1e-6;
    let steps = 24.max((angle_degrees.abs() / 15.0).ceil() as usize);
    let n = if full_turn { steps } else { steps + 1 };
    let mut poses = Vec::with_capacity(n);
    for i in 0..n {
        let theta = angle_degrees.to_radians() * i as f64 / steps as f64;
        poses.push(Pose { rotation: Rotation3::from_axis_angle(&Unit::new_unchecked(axis), theta), pivot: axis_point, translate: Vector3::zeros() });
    }
    sweep(profile, &poses, full_turn, tol)
}

/// One rigid placement of the swept profile: rotate about `pivot` by
/// `rotation`, then add `translate`.
struct Pose {
    rotation: Rotation3<f64>,
    pivot: Point3<f64>,
    translate: Vector3<f64>,
}

impl Pose {
    fn apply(&self, p: Point3<f64>) -> Point3<f64> {
        self.pivot + self.rotation * (p - self.pivot) + self.translate
    }
}

fn identity_pose() -> Pose {
    Pose { rotation: Rotation3::identity(), pivot: Point3::origin(), translate: Vector3::zeros() }
}

fn translated_pose(offset: Vector3<f64>) -> Pose {
    Pose { rotation: Rotation3::identity(), pivot: Point3::origin(), translate: offset }
}

fn sweep(profile: &SPolygon, poses: &[Pose], closed_loop: bool, tol: &Tolerances) -> Mesh {
    let mut triangles = Vec::new();
    let contours: Vec<&Vec<Point2<f64>>> = std::iter::once(&profile.outer).chain(profile.holes.iter()).collect();
    let n = poses.len();
    let step_pairs: Vec<(usize, usize)> =
        if closed_loop { (0..n).map(|i| (i, (i + 1) % n)).collect() } else { (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect() };

    for contour in contours {
        let m = contour.len();
        for &(i, j) in &step_pairs {
            for k in 0..m {
                let k2 = (k + 1) % m;
                let a = to3(contour[k]);
                let b = to3(contour[k2]);
                let pia = poses[i].apply(a);
                let pib = poses[i].apply(b);
                let pja = poses[j].apply(a);
                let pjb = poses[j].apply(b);
                triangles.push(Triangle::new(pia, pib, pjb));
                triangles.push(Triangle::new(pia, pjb, pja));
            }
        }
    }

    if !closed_loop && !poses.is_empty() {
        for t in profile.triangulate_into(tol) {
            let p0 = poses[0].apply(to3(t[0]));
            let p1 = poses[0].apply(to3(t[1]));
            let p2 = poses[0].apply(to3(t[2]));
            triangles.push(Triangle::new(p0, p2, p1));
        }
        let last = &poses[n - 1];
        for t in profile.triangulate_into(tol) {
            let p0 = last.apply(to3(t[0]));
            let p1 = last.apply(to3(t[1]));
            let p2 = last.apply(to3(t[2]));
            triangles.push(Triangle::new(p0, p1, p2));
        }
    }

    Mesh::from_triangle_soup(&triangles, tol.length_eps)
}
