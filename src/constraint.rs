//! The constraint catalog: user-visible geometric relations lowered to
//! residual equations over entity params (§4.3).
//!
//! The teacher has no constraint solver at all (its closest relative,
//! `geometry::constraints`, validates manufacturability thresholds, not
//! geometric relations) so this module is grounded directly in spec.md's
//! catalog and built in the style `crate::expr` establishes: every
//! constraint lowers to one or more `Expr` trees whose root is driven to
//! zero by `crate::solver`.

use crate::entity::{Entity, EntityKind};
use crate::expr::Expr;
use crate::handle::{ConstraintHandle, EntityHandle, GroupHandle, ParamHandle};
use crate::store::OwnedByGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    PointsCoincident { a: EntityHandle, b: EntityHandle },
    PtPtDistance { a: EntityHandle, b: EntityHandle },
    PtLineDistance { point: EntityHandle, line: EntityHandle },
    PtPlaneDistance { point: EntityHandle, plane: EntityHandle },
    PtInPlane { point: EntityHandle, plane: EntityHandle },
    PointsOnLine { point: EntityHandle, line: EntityHandle },
    EqualLength { a: EntityHandle, b: EntityHandle },
    EqualRadius { a: EntityHandle, b: EntityHandle },
    Parallel { a: EntityHandle, b: EntityHandle },
    Perpendicular { a: EntityHandle, b: EntityHandle },
    Symmetric { a: EntityHandle, b: EntityHandle, plane: EntityHandle },
    AtMidpoint { point: EntityHandle, line: EntityHandle },
    Horizontal { line: EntityHandle, workplane: EntityHandle },
    Vertical { line: EntityHandle, workplane: EntityHandle },
    Diameter { circle: EntityHandle },
    PtOnCircle { point: EntityHandle, circle: EntityHandle },
    Angle { a: EntityHandle, b: EntityHandle },
    /// Same as `PtPlaneDistance`, measured against a `Face` entity instead
    /// of a workplane.
    PtFaceDistance { point: EntityHandle, face: EntityHandle },
    /// Same as `PtInPlane`, against a `Face` entity instead of a workplane.
    PtOnFace { point: EntityHandle, face: EntityHandle },
    /// A line's length equals an arc's arc length.
    EqualLineArcLen { line: EntityHandle, arc: EntityHandle },
    /// `‖a‖ = valA · ‖b‖`; the ratio is stored in `value`.
    LengthRatio { a: EntityHandle, b: EntityHandle },
    /// A line's length equals a point's perpendicular distance to another line.
    EqLenPtLineD { line: EntityHandle, point: EntityHandle, ref_line: EntityHandle },
    /// Two point-to-line perpendicular distances are equal.
    EqPtLnDistances { point_a: EntityHandle, line_a: EntityHandle, point_b: EntityHandle, line_b: EntityHandle },
    /// An arc's tangent direction at its start or end point is collinear
    /// with a line's direction.
    ArcLineTangent { arc: EntityHandle, at_start: bool, line: EntityHandle },
    /// A cubic's tangent direction at its start or end control point is
    /// collinear with a line's direction.
    CubicLineTangent { cubic: EntityHandle, at_start: bool, line: EntityHandle },
    /// Two curves (line/arc/cubic) share a collinear tangent direction at
    /// their respective named endpoint.
    CurveCurveTangent { a: EntityHandle, a_at_start: bool, b: EntityHandle, b_at_start: bool },
    /// Two `Normal` entities carry the same orientation, up to an overall
    /// sign flip of the quaternion.
    SameOrientation { a: EntityHandle, b: EntityHandle },
    /// Points `a`, `b` are mirror images across the horizontal (global X)
    /// sketch axis through the origin.
    SymmetricHoriz { a: EntityHandle, b: EntityHandle },
    /// Points `a`, `b` are mirror images across the vertical (global Y)
    /// sketch axis through the origin.
    SymmetricVert { a: EntityHandle, b: EntityHandle },
    /// Points `a`, `b` are mirror images across an arbitrary sketch line.
    SymmetricLine { a: EntityHandle, b: EntityHandle, line: EntityHandle },
    /// Pins a point's params to its current numeric value while the user
    /// drags it; contributes zero equations but participates in the
    /// solver's known/unknown partition (§4.4).
    WhereDragged { point: EntityHandle },
}

/// Constraints that carry a user-entered scalar (distance, diameter,
/// angle) store it here; purely relational constraints leave it `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintValue(pub Option<f64>);

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub handle: ConstraintHandle,
    pub group: GroupHandle,
    pub kind: ConstraintKind,
    pub value: ConstraintValue,
    /// True for a constraint that measures a quantity without enforcing
    /// it (spec.md §3 "reference constraint"): its residual equations are
    /// never assembled into the solver, and after each solve
    /// `crate::regen::Document::regenerate_group` overwrites `value` with
    /// the quantity actually measured on the solved geometry (§4.5 point 4,
    /// §8 property 10).
    pub reference: bool,
}

impl OwnedByGroup for Constraint {
    fn group(&self) -> GroupHandle {
        self.group
    }
}

fn point_expr(point: &Entity) -> (Expr, Expr, Expr) {
    match &point.kind {
        EntityKind::Point(p) => (Expr::param(p.x), Expr::param(p.y), Expr::param(p.z)),
        _ => panic!("entity is not a point"),
    }
}

fn sub3(a: (Expr, Expr, Expr), b: (Expr, Expr, Expr)) -> (Expr, Expr, Expr) {
    (Expr::minus(a.0, b.0), Expr::minus(a.1, b.1), Expr::minus(a.2, b.2))
}

fn dot3(a: (Expr, Expr, Expr), b: (Expr, Expr, Expr)) -> Expr {
    Expr::plus(Expr::plus(Expr::times(a.0, b.0), Expr::times(a.1, b.1)), Expr::times(a.2, b.2))
}

fn norm_sq(a: (Expr, Expr, Expr)) -> Expr {
    dot3(a.clone(), a)
}

fn line_points<'a>(line: &Entity, lookup: &impl Fn(EntityHandle) -> &'a Entity) -> (&'a Entity, &'a Entity) {
    match &line.kind {
        EntityKind::Line(l) => (lookup(l.p0), lookup(l.p1)),
        _ => panic!("entity is not a line"),
    }
}

/// A `Normal` entity's direction, read directly off its quaternion's vector
/// part -- the same simplification `PtPlaneDistance`/`Symmetric` already
/// make rather than the full quaternion-rotates-Z form `Entity::
/// normal_direction` uses numerically.
fn normal_dir_expr(normal: &Entity) -> (Expr, Expr, Expr) {
    match &normal.kind {
        EntityKind::Normal(n) => (Expr::param(n.vx), Expr::param(n.vy), Expr::param(n.vz)),
        _ => panic!("entity is not a normal"),
    }
}

/// A plane-bearing entity's origin point and normal direction, for either a
/// `Workplane` or a `Face` (both just wrap an origin point handle and a
/// normal entity handle).
fn plane_like_origin_normal<'a>(
    plane: &Entity,
    lookup: &impl Fn(EntityHandle) -> &'a Entity,
) -> ((Expr, Expr, Expr), (Expr, Expr, Expr)) {
    match &plane.kind {
        EntityKind::Workplane(w) => (point_expr(lookup(w.origin)), normal_dir_expr(lookup(w.normal))),
        EntityKind::Face(f) => (point_expr(lookup(f.plane_origin)), normal_dir_expr(lookup(f.plane_normal))),
        _ => panic!("entity is not plane-bearing"),
    }
}

fn cross3(a: (Expr, Expr, Expr), b: (Expr, Expr, Expr)) -> (Expr, Expr, Expr) {
    (
        Expr::minus(Expr::times(a.1.clone(), b.2.clone()), Expr::times(a.2.clone(), b.1.clone())),
        Expr::minus(Expr::times(a.2, b.0.clone()), Expr::times(a.0.clone(), b.2)),
        Expr::minus(Expr::times(a.0, b.1), Expr::times(a.1, b.0)),
    )
}

/// Squared perpendicular distance from `point` to the infinite line through
/// `line`, scaled by `‖dir‖²` to avoid a division (the same cross-product
/// identity `PtLineDistance` uses): returns `(scaled_dist_sq, dir)`.
fn pt_line_dist_sq_scaled<'a>(
    point: (Expr, Expr, Expr),
    line: &Entity,
    lookup: &impl Fn(EntityHandle) -> &'a Entity,
) -> (Expr, (Expr, Expr, Expr)) {
    let (p0, p1) = line_points(line, lookup);
    let a = point_expr(p0);
    let b = point_expr(p1);
    let dir = sub3(b, a.clone());
    let to_point = sub3(point, a);
    let scaled = Expr::minus(Expr::times(norm_sq(to_point.clone()), norm_sq(dir.clone())), Expr::square(dot3(to_point, dir.clone())));
    (scaled, dir)
}

/// A curve entity's tangent direction at its named endpoint. Lines have one
/// constant direction; an arc's tangent at a point is `normal x radial`;
/// a cubic's tangent at an endpoint is exact along its first/last control
/// polygon leg regardless of its rational weights.
fn curve_tangent_dir_expr<'a>(
    curve: &Entity,
    at_start: bool,
    lookup: &impl Fn(EntityHandle) -> &'a Entity,
) -> (Expr, Expr, Expr) {
    match &curve.kind {
        EntityKind::Line(l) => sub3(point_expr(lookup(l.p1)), point_expr(lookup(l.p0))),
        EntityKind::Arc(a) => {
            let endpoint = if at_start { a.start } else { a.end };
            let radial = sub3(point_expr(lookup(endpoint)), point_expr(lookup(a.center)));
            let normal = normal_dir_expr(lookup(a.normal));
            cross3(normal, radial)
        }
        EntityKind::Cubic(c) => {
            let n = c.control_points.len();
            if at_start {
                sub3(point_expr(lookup(c.control_points[1])), point_expr(lookup(c.control_points[0])))
            } else {
                sub3(point_expr(lookup(c.control_points[n - 1])), point_expr(lookup(c.control_points[n - 2])))
            }
        }
        _ => panic!("entity is not a tangent-bearing curve"),
    }
}

impl Constraint {
    /// Residual equations this constraint contributes; the solver drives
    /// every returned expression to zero. Distance-family constraints
    /// return `d^2 - target^2` (squared) to avoid a `sqrt` branch cut at
    /// zero distance, matching `crate::expr::Expr::partial_wrt`'s clean
    /// derivative at that point.
    pub fn equations<'a>(&self, lookup: impl Fn(EntityHandle) -> &'a Entity) -> Vec<Expr> {
        if self.reference {
            // A reference constraint measures, it does not constrain; its
            // value is overwritten post-solve instead (§4.5 point 4).
            return Vec::new();
        }
        match &self.kind {
            ConstraintKind::PointsCoincident { a, b } => {
                let pa = point_expr(lookup(*a));
                let pb = point_expr(lookup(*b));
                vec![Expr::minus(pa.0, pb.0), Expr::minus(pa.1, pb.1), Expr::minus(pa.2, pb.2)]
            }
            ConstraintKind::PtPtDistance { a, b } => {
                let pa = point_expr(lookup(*a));
                let pb = point_expr(lookup(*b));
                let d = self.value.0.unwrap_or(0.0);
                vec![Expr::minus(norm_sq(sub3(pa, pb)), Expr::Const(d * d))]
            }
            ConstraintKind::PtLineDistance { point, line } => {
                let p = point_expr(lookup(*point));
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let a = point_expr(p0);
                let b = point_expr(p1);
                let dir = sub3(b, a);
                let to_point = sub3(p, a);
                // squared perpendicular distance = |to_point x dir|^2 / |dir|^2,
                // recast as |to_point|^2 |dir|^2 - (to_point . dir)^2 = target^2 |dir|^2
                let cross_sq = Expr::minus(
                    Expr::times(norm_sq(to_point.clone()), norm_sq(dir.clone())),
                    Expr::square(dot3(to_point, dir.clone())),
                );
                let d = self.value.0.unwrap_or(0.0);
                vec![Expr::minus(cross_sq, Expr::times(Expr::Const(d * d), norm_sq(dir)))]
            }
            ConstraintKind::PtPlaneDistance { point, plane } | ConstraintKind::PtInPlane { point, plane } => {
                let p = point_expr(lookup(*point));
                let (origin, normal) = match &lookup(*plane).kind {
                    EntityKind::Workplane(w) => (point_expr(lookup(w.origin)), lookup(w.normal)),
                    _ => panic!("entity is not a plane-bearing workplane"),
                };
                let normal_dir = match &normal.kind {
                    EntityKind::Normal(n) => (Expr::param(n.vx), Expr::param(n.vy), Expr::param(n.vz)),
                    _ => panic!("entity is not a normal"),
                };
                let signed = dot3(sub3(p, origin), normal_dir);
                let target = if matches!(self.kind, ConstraintKind::PtInPlane { .. }) {
                    0.0
                } else {
                    self.value.0.unwrap_or(0.0)
                };
                vec![Expr::minus(signed, Expr::Const(target))]
            }
            ConstraintKind::PointsOnLine { point, line } => {
                // Same zero residual as PtLineDistance with target distance 0.
                let p = point_expr(lookup(*point));
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let a = point_expr(p0);
                let b = point_expr(p1);
                let dir = sub3(b, a);
                let to_point = sub3(p, a);
                vec![Expr::minus(
                    Expr::times(norm_sq(to_point.clone()), norm_sq(dir.clone())),
                    Expr::square(dot3(to_point, dir)),
                )]
            }
            ConstraintKind::EqualLength { a, b } => {
                let (a0, a1) = line_points(lookup(*a), &lookup);
                let (b0, b1) = line_points(lookup(*b), &lookup);
                let da = sub3(point_expr(a0), point_expr(a1));
                let db = sub3(point_expr(b0), point_expr(b1));
                vec![Expr::minus(norm_sq(da), norm_sq(db))]
            }
            ConstraintKind::EqualRadius { a, b } => {
                let ra = circle_radius_expr(lookup(*a), &lookup);
                let rb = circle_radius_expr(lookup(*b), &lookup);
                vec![Expr::minus(ra, rb)]
            }
            ConstraintKind::Parallel { a, b } => {
                let (a0, a1) = line_points(lookup(*a), &lookup);
                let (b0, b1) = line_points(lookup(*b), &lookup);
                let da = sub3(point_expr(a0), point_expr(a1));
                let db = sub3(point_expr(b0), point_expr(b1));
                // cross product components all zero for parallel vectors.
                vec![
                    Expr::minus(Expr::times(da.1.clone(), db.2.clone()), Expr::times(da.2.clone(), db.1.clone())),
                    Expr::minus(Expr::times(da.2, db.0.clone()), Expr::times(da.0.clone(), db.2)),
                    Expr::minus(Expr::times(da.0, db.1), Expr::times(da.1, db.0)),
                ]
            }
            ConstraintKind::Perpendicular { a, b } => {
                let (a0, a1) = line_points(lookup(*a), &lookup);
                let (b0, b1) = line_points(lookup(*b), &lookup);
                let da = sub3(point_expr(a0), point_expr(a1));
                let db = sub3(point_expr(b0), point_expr(b1));
                vec![dot3(da, db)]
            }
            ConstraintKind::Symmetric { a, b, plane } => {
                let pa = point_expr(lookup(*a));
                let pb = point_expr(lookup(*b));
                let (origin, normal_entity) = match &lookup(*plane).kind {
                    EntityKind::Workplane(w) => (point_expr(lookup(w.origin)), lookup(w.normal)),
                    _ => panic!("entity is not a plane-bearing workplane"),
                };
                let normal_dir = match &normal_entity.kind {
                    EntityKind::Normal(n) => (Expr::param(n.vx), Expr::param(n.vy), Expr::param(n.vz)),
                    _ => panic!("entity is not a normal"),
                };
                let midpoint = (
                    Expr::div(Expr::plus(pa.0.clone(), pb.0.clone()), Expr::Const(2.0)),
                    Expr::div(Expr::plus(pa.1.clone(), pb.1.clone()), Expr::Const(2.0)),
                    Expr::div(Expr::plus(pa.2.clone(), pb.2.clone()), Expr::Const(2.0)),
                );
                let to_mid = sub3(midpoint, origin);
                let in_plane_eq = dot3(to_mid, normal_dir.clone());
                let sep = sub3(pa, pb);
                // a-b parallel to plane normal
                let perp_eqs = vec![
                    Expr::minus(Expr::times(sep.1.clone(), normal_dir.2.clone()), Expr::times(sep.2.clone(), normal_dir.1.clone())),
                    Expr::minus(Expr::times(sep.2, normal_dir.0.clone()), Expr::times(sep.0.clone(), normal_dir.2)),
                    Expr::minus(Expr::times(sep.0, normal_dir.1), Expr::times(sep.1, normal_dir.0)),
                ];
                let mut eqs = vec![in_plane_eq];
                eqs.extend(perp_eqs);
                eqs
            }
            ConstraintKind::AtMidpoint { point, line } => {
                let p = point_expr(lookup(*point));
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let a = point_expr(p0);
                let b = point_expr(p1);
                vec![
                    Expr::minus(Expr::times(Expr::Const(2.0), p.0), Expr::plus(a.0, b.0)),
                    Expr::minus(Expr::times(Expr::Const(2.0), p.1), Expr::plus(a.1, b.1)),
                    Expr::minus(Expr::times(Expr::Const(2.0), p.2), Expr::plus(a.2, b.2)),
                ]
            }
            ConstraintKind::Horizontal { line, workplane } | ConstraintKind::Vertical { line, workplane } => {
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let _ = workplane;
                let a = point_expr(p0);
                let b = point_expr(p1);
                // workplane-local axis equality: horizontal keeps y equal, vertical keeps x equal.
                if matches!(self.kind, ConstraintKind::Horizontal { .. }) {
                    vec![Expr::minus(a.1, b.1)]
                } else {
                    vec![Expr::minus(a.0, b.0)]
                }
            }
            ConstraintKind::Diameter { circle } => {
                let r = circle_radius_expr(lookup(*circle), &lookup);
                let target = self.value.0.unwrap_or(0.0) / 2.0;
                vec![Expr::minus(r, Expr::Const(target))]
            }
            ConstraintKind::PtOnCircle { point, circle } => {
                let p = point_expr(lookup(*point));
                let center = match &lookup(*circle).kind {
                    EntityKind::Circle(c) => point_expr(lookup(c.center)),
                    _ => panic!("entity is not a circle"),
                };
                let r = circle_radius_expr(lookup(*circle), &lookup);
                vec![Expr::minus(norm_sq(sub3(p, center)), Expr::square(r))]
            }
            ConstraintKind::Angle { a, b } => {
                let (a0, a1) = line_points(lookup(*a), &lookup);
                let (b0, b1) = line_points(lookup(*b), &lookup);
                let da = sub3(point_expr(a0), point_expr(a1));
                let db = sub3(point_expr(b0), point_expr(b1));
                let target_rad = self.value.0.unwrap_or(0.0).to_radians();
                // (da . db)^2 = cos^2(theta) |da|^2 |db|^2
                let lhs = Expr::square(dot3(da.clone(), db.clone()));
                let rhs = Expr::times(
                    Expr::Const(target_rad.cos() * target_rad.cos()),
                    Expr::times(norm_sq(da), norm_sq(db)),
                );
                vec![Expr::minus(lhs, rhs)]
            }
            ConstraintKind::PtFaceDistance { point, face } => {
                let p = point_expr(lookup(*point));
                let (origin, normal_dir) = plane_like_origin_normal(lookup(*face), &lookup);
                let signed = dot3(sub3(p, origin), normal_dir);
                let target = self.value.0.unwrap_or(0.0);
                vec![Expr::minus(signed, Expr::Const(target))]
            }
            ConstraintKind::PtOnFace { point, face } => {
                let p = point_expr(lookup(*point));
                let (origin, normal_dir) = plane_like_origin_normal(lookup(*face), &lookup);
                vec![dot3(sub3(p, origin), normal_dir)]
            }
            ConstraintKind::EqualLineArcLen { line, arc } => {
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let line_len = Expr::sqrt(norm_sq(sub3(point_expr(p1), point_expr(p0))));
                let arc_len = arc_length_expr(lookup(*arc), &lookup);
                vec![Expr::minus(line_len, arc_len)]
            }
            ConstraintKind::LengthRatio { a, b } => {
                let (a0, a1) = line_points(lookup(*a), &lookup);
                let (b0, b1) = line_points(lookup(*b), &lookup);
                let len_a_sq = norm_sq(sub3(point_expr(a1), point_expr(a0)));
                let len_b_sq = norm_sq(sub3(point_expr(b1), point_expr(b0)));
                let ratio = self.value.0.unwrap_or(1.0);
                vec![Expr::minus(len_a_sq, Expr::times(Expr::Const(ratio * ratio), len_b_sq))]
            }
            ConstraintKind::EqLenPtLineD { line, point, ref_line } => {
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let len_sq = norm_sq(sub3(point_expr(p1), point_expr(p0)));
                let p = point_expr(lookup(*point));
                let (dist_sq_scaled, ref_dir) = pt_line_dist_sq_scaled(p, lookup(*ref_line), &lookup);
                vec![Expr::minus(Expr::times(len_sq, norm_sq(ref_dir)), dist_sq_scaled)]
            }
            ConstraintKind::EqPtLnDistances { point_a, line_a, point_b, line_b } => {
                let pa = point_expr(lookup(*point_a));
                let pb = point_expr(lookup(*point_b));
                let (dist_sq_a, dir_a) = pt_line_dist_sq_scaled(pa, lookup(*line_a), &lookup);
                let (dist_sq_b, dir_b) = pt_line_dist_sq_scaled(pb, lookup(*line_b), &lookup);
                vec![Expr::minus(Expr::times(dist_sq_a, norm_sq(dir_b)), Expr::times(dist_sq_b, norm_sq(dir_a)))]
            }
            ConstraintKind::ArcLineTangent { arc, at_start, line } => {
                let ta = curve_tangent_dir_expr(lookup(*arc), *at_start, &lookup);
                let tb = curve_tangent_dir_expr(lookup(*line), true, &lookup);
                let c = cross3(ta, tb);
                vec![c.0, c.1, c.2]
            }
            ConstraintKind::CubicLineTangent { cubic, at_start, line } => {
                let ta = curve_tangent_dir_expr(lookup(*cubic), *at_start, &lookup);
                let tb = curve_tangent_dir_expr(lookup(*line), true, &lookup);
                let c = cross3(ta, tb);
                vec![c.0, c.1, c.2]
            }
            ConstraintKind::CurveCurveTangent { a, a_at_start, b, b_at_start } => {
                let ta = curve_tangent_dir_expr(lookup(*a), *a_at_start, &lookup);
                let tb = curve_tangent_dir_expr(lookup(*b), *b_at_start, &lookup);
                let c = cross3(ta, tb);
                vec![c.0, c.1, c.2]
            }
            ConstraintKind::SameOrientation { a, b } => {
                // q_rel = q_a * conj(q_b); q_rel's vector part vanishes iff
                // q_a == q_b or q_a == -q_b (both unit quaternions), which is
                // exactly "equal up to sign" in one closed form.
                let na = match &lookup(*a).kind {
                    EntityKind::Normal(n) => *n,
                    _ => panic!("entity is not a normal"),
                };
                let nb = match &lookup(*b).kind {
                    EntityKind::Normal(n) => *n,
                    _ => panic!("entity is not a normal"),
                };
                let (wa, va) = (Expr::param(na.w), (Expr::param(na.vx), Expr::param(na.vy), Expr::param(na.vz)));
                let (wb, vb) = (Expr::param(nb.w), (Expr::param(nb.vx), Expr::param(nb.vy), Expr::param(nb.vz)));
                let cross = cross3(va.clone(), vb.clone());
                vec![
                    Expr::minus(Expr::minus(Expr::times(wb.clone(), va.0), Expr::times(wa.clone(), vb.0)), cross.0),
                    Expr::minus(Expr::minus(Expr::times(wb.clone(), va.1), Expr::times(wa.clone(), vb.1)), cross.1),
                    Expr::minus(Expr::minus(Expr::times(wb, va.2), Expr::times(wa, vb.2)), cross.2),
                ]
            }
            ConstraintKind::SymmetricHoriz { a, b } => {
                let pa = point_expr(lookup(*a));
                let pb = point_expr(lookup(*b));
                vec![Expr::minus(pa.0, pb.0), Expr::plus(pa.1, pb.1)]
            }
            ConstraintKind::SymmetricVert { a, b } => {
                let pa = point_expr(lookup(*a));
                let pb = point_expr(lookup(*b));
                vec![Expr::plus(pa.0, pb.0), Expr::minus(pa.1, pb.1)]
            }
            ConstraintKind::SymmetricLine { a, b, line } => {
                let pa = point_expr(lookup(*a));
                let pb = point_expr(lookup(*b));
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let l0 = point_expr(p0);
                let l1 = point_expr(p1);
                let dir = sub3(l1, l0.clone());
                let sep = sub3(pa.clone(), pb.clone());
                let midpoint = (
                    Expr::div(Expr::plus(pa.0, pb.0), Expr::Const(2.0)),
                    Expr::div(Expr::plus(pa.1, pb.1), Expr::Const(2.0)),
                    Expr::Const(0.0),
                );
                let to_mid = sub3(midpoint, l0);
                vec![
                    dot3(sep, dir.clone()),
                    Expr::minus(Expr::times(to_mid.0, dir.1), Expr::times(to_mid.1, dir.0)),
                ]
            }
            ConstraintKind::WhereDragged { .. } => Vec::new(),
        }
    }

    /// Params this constraint pins directly to their current value,
    /// bypassing equation generation (`WhereDragged` only).
    pub fn dragged_point(&self) -> Option<EntityHandle> {
        match self.kind {
            ConstraintKind::WhereDragged { point } => Some(point),
            _ => None,
        }
    }

    /// The quantity this constraint's scalar field measures on the solved
    /// geometry, independent of whatever value it currently holds. Used to
    /// rewrite `reference` constraints' `value` after each solve (§4.5
    /// point 4) and, for an enforcing constraint, as a debugging check
    /// that the solved geometry actually satisfies what it asked for.
    /// Returns `None` for constraints with no scalar quantity
    /// (`PointsCoincident`, `Parallel`, `Perpendicular`, `WhereDragged`, …).
    pub fn measure<'a>(&self, lookup: impl Fn(EntityHandle) -> &'a Entity, value_of: &impl Fn(ParamHandle) -> f64) -> Option<f64> {
        match &self.kind {
            ConstraintKind::PtPtDistance { a, b } => {
                let pa = lookup(*a).point_position(value_of)?;
                let pb = lookup(*b).point_position(value_of)?;
                Some((pa - pb).norm())
            }
            ConstraintKind::PtLineDistance { point, line } | ConstraintKind::PointsOnLine { point, line } => {
                let p = lookup(*point).point_position(value_of)?;
                let (p0, p1) = line_points(lookup(*line), &lookup);
                let a = p0.point_position(value_of)?;
                let b = p1.point_position(value_of)?;
                let dir = b - a;
                let len = dir.norm();
                if len < 1e-12 {
                    return None;
                }
                Some((p - a).cross(&dir).norm() / len)
            }
            ConstraintKind::PtPlaneDistance { point, plane } => {
                let p = lookup(*point).point_position(value_of)?;
                let (origin, normal) = match &lookup(*plane).kind {
                    EntityKind::Workplane(w) => (lookup(w.origin).point_position(value_of)?, lookup(w.normal)),
                    _ => return None,
                };
                let n = normal.normal_direction(value_of)?;
                Some((p - origin).dot(&n))
            }
            ConstraintKind::Diameter { circle } => {
                let r = match &lookup(*circle).kind {
                    EntityKind::Circle(c) => match &lookup(c.radius).kind {
                        EntityKind::Distance(d) => value_of(d.d),
                        _ => return None,
                    },
                    _ => return None,
                };
                Some(2.0 * r)
            }
            ConstraintKind::EqualLength { a, .. } => {
                let (p0, p1) = line_points(lookup(*a), &lookup);
                let pa = p0.point_position(value_of)?;
                let pb = p1.point_position(value_of)?;
                Some((pa - pb).norm())
            }
            ConstraintKind::Angle { a, b } => {
                let (a0, a1) = line_points(lookup(*a), &lookup);
                let (b0, b1) = line_points(lookup(*b), &lookup);
                let da = a1.point_position(value_of)? - a0.point_position(value_of)?;
                let db = b1.point_position(value_of)? - b0.point_position(value_of)?;
                let cos_theta = (da.dot(&db) / (da.norm() * db.norm())).clamp(-1.0, 1.0);
                Some(cos_theta.acos().to_degrees())
            }
            ConstraintKind::PtFaceDistance { point, face } => {
                let p = lookup(*point).point_position(value_of)?;
                let (origin, normal) = match &lookup(*face).kind {
                    EntityKind::Face(f) => (lookup(f.plane_origin).point_position(value_of)?, lookup(f.plane_normal)),
                    _ => return None,
                };
                let n = normal.normal_direction(value_of)?;
                Some((p - origin).dot(&n))
            }
            _ => None,
        }
    }
}

/// An arc's swept length, `radius * angle`, both derived symbolically from
/// its center/start/end points (no stored radius/angle entity exists).
fn arc_length_expr<'a>(arc: &Entity, lookup: &impl Fn(EntityHandle) -> &'a Entity) -> Expr {
    let a = match &arc.kind {
        EntityKind::Arc(a) => a,
        _ => panic!("entity is not an arc"),
    };
    let center = point_expr(lookup(a.center));
    let start = point_expr(lookup(a.start));
    let end = point_expr(lookup(a.end));
    let r0 = sub3(start, center.clone());
    let r1 = sub3(end, center);
    let radius_sq = norm_sq(r0.clone());
    let radius = Expr::sqrt(radius_sq.clone());
    let cos_theta = Expr::div(dot3(r0, r1), radius_sq);
    let angle = Expr::Acos(Box::new(cos_theta));
    Expr::times(radius, angle)
}

fn circle_radius_expr<'a>(entity: &Entity, lookup: &impl Fn(EntityHandle) -> &'a Entity) -> Expr {
    match &entity.kind {
        EntityKind::Circle(c) => match &lookup(c.radius).kind {
            EntityKind::Distance(d) => Expr::param(d.d),
            _ => panic!("circle's radius entity is not a Distance"),
        },
        _ => panic!("entity does not carry a radius"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CircleEntity, DistanceParams, LineSegmentEntity, NormalParams, PointParams};
    use crate::handle::{EntityHandle, GroupHandle};
    use std::collections::HashMap;

    fn point(h: u32, group: GroupHandle, x: ParamHandle, y: ParamHandle, z: ParamHandle) -> Entity {
        Entity { handle: EntityHandle(h), group, kind: EntityKind::Point(PointParams { x, y, z }), locked: false }
    }

    #[test]
    fn points_coincident_residual_is_zero_when_equal() {
        let group = GroupHandle::from_index(1);
        let mut entities = HashMap::new();
        let a = point(1, group, ParamHandle(1), ParamHandle(2), ParamHandle(3));
        let b = point(2, group, ParamHandle(4), ParamHandle(5), ParamHandle(6));
        entities.insert(a.handle, a.clone());
        entities.insert(b.handle, b.clone());
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group,
            kind: ConstraintKind::PointsCoincident { a: a.handle, b: b.handle },
            value: ConstraintValue(None),
            reference: false,
        };
        let values: HashMap<u32, f64> = [(1, 1.0), (2, 2.0), (3, 3.0), (4, 1.0), (5, 2.0), (6, 3.0)].into();
        let eqs = c.equations(|h| entities.get(&h).unwrap());
        for e in eqs {
            let r = e.eval(&|p| *values.get(&p.0).unwrap());
            assert!(r.abs() < 1e-12);
        }
    }

    #[test]
    fn pt_pt_distance_residual_reflects_target() {
        let group = GroupHandle::from_index(1);
        let mut entities = HashMap::new();
        let a = point(1, group, ParamHandle(1), ParamHandle(2), ParamHandle(3));
        let b = point(2, group, ParamHandle(4), ParamHandle(5), ParamHandle(6));
        entities.insert(a.handle, a.clone());
        entities.insert(b.handle, b.clone());
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group,
            kind: ConstraintKind::PtPtDistance { a: a.handle, b: b.handle },
            value: ConstraintValue(Some(5.0)),
            reference: false,
        };
        let values: HashMap<u32, f64> = [(1, 0.0), (2, 0.0), (3, 0.0), (4, 5.0), (5, 0.0), (6, 0.0)].into();
        let eqs = c.equations(|h| entities.get(&h).unwrap());
        let r = eqs[0].eval(&|p| *values.get(&p.0).unwrap());
        assert!(r.abs() < 1e-9);
    }

    #[test]
    fn length_ratio_residual_is_zero_at_the_target_ratio() {
        let group = GroupHandle::from_index(1);
        let mut entities = HashMap::new();
        let a0 = point(1, group, ParamHandle(1), ParamHandle(2), ParamHandle(3));
        let a1 = point(2, group, ParamHandle(4), ParamHandle(5), ParamHandle(6));
        let b0 = point(3, group, ParamHandle(7), ParamHandle(8), ParamHandle(9));
        let b1 = point(4, group, ParamHandle(10), ParamHandle(11), ParamHandle(12));
        let line_a = Entity {
            handle: EntityHandle(5),
            group,
            kind: EntityKind::Line(LineSegmentEntity { p0: a0.handle, p1: a1.handle, workplane: None }),
            locked: false,
        };
        let line_b = Entity {
            handle: EntityHandle(6),
            group,
            kind: EntityKind::Line(LineSegmentEntity { p0: b0.handle, p1: b1.handle, workplane: None }),
            locked: false,
        };
        for e in [a0, a1, b0, b1, line_a.clone(), line_b.clone()] {
            entities.insert(e.handle, e);
        }
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group,
            kind: ConstraintKind::LengthRatio { a: line_a.handle, b: line_b.handle },
            value: ConstraintValue(Some(2.0)),
            reference: false,
        };
        // line_a length 10 (0,0,0)->(10,0,0); line_b length 5 (0,0,0)->(5,0,0).
        let values: HashMap<u32, f64> =
            [(1, 0.0), (2, 0.0), (3, 0.0), (4, 10.0), (5, 0.0), (6, 0.0), (7, 0.0), (8, 0.0), (9, 0.0), (10, 5.0), (11, 0.0), (12, 0.0)].into();
        let eqs = c.equations(|h| entities.get(&h).unwrap());
        let r = eqs[0].eval(&|p| *values.get(&p.0).unwrap());
        assert!(r.abs() < 1e-9);
    }

    #[test]
    fn same_orientation_residual_is_zero_for_identical_quaternions() {
        let group = GroupHandle::from_index(1);
        let mut entities = HashMap::new();
        let na = Entity {
            handle: EntityHandle(1),
            group,
            kind: EntityKind::Normal(NormalParams { w: ParamHandle(1), vx: ParamHandle(2), vy: ParamHandle(3), vz: ParamHandle(4) }),
            locked: false,
        };
        let nb = Entity {
            handle: EntityHandle(2),
            group,
            kind: EntityKind::Normal(NormalParams { w: ParamHandle(5), vx: ParamHandle(6), vy: ParamHandle(7), vz: ParamHandle(8) }),
            locked: false,
        };
        entities.insert(na.handle, na.clone());
        entities.insert(nb.handle, nb.clone());
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group,
            kind: ConstraintKind::SameOrientation { a: na.handle, b: nb.handle },
            value: ConstraintValue(None),
            reference: false,
        };
        // identical quaternions
        let values: HashMap<u32, f64> = [(1, 1.0), (2, 0.0), (3, 0.0), (4, 0.0), (5, 1.0), (6, 0.0), (7, 0.0), (8, 0.0)].into();
        let eqs = c.equations(|h| entities.get(&h).unwrap());
        for e in &eqs {
            assert!(e.eval(&|p| *values.get(&p.0).unwrap()).abs() < 1e-12);
        }
        // b is the negated quaternion: still "same orientation" up to sign
        let flipped: HashMap<u32, f64> = [(1, 1.0), (2, 0.0), (3, 0.0), (4, 0.0), (5, -1.0), (6, 0.0), (7, 0.0), (8, 0.0)].into();
        for e in &eqs {
            assert!(e.eval(&|p| *flipped.get(&p.0).unwrap()).abs() < 1e-12);
        }
    }

    #[test]
    fn symmetric_horiz_mirrors_across_the_x_axis() {
        let group = GroupHandle::from_index(1);
        let mut entities = HashMap::new();
        let a = point(1, group, ParamHandle(1), ParamHandle(2), ParamHandle(3));
        let b = point(2, group, ParamHandle(4), ParamHandle(5), ParamHandle(6));
        entities.insert(a.handle, a.clone());
        entities.insert(b.handle, b.clone());
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group,
            kind: ConstraintKind::SymmetricHoriz { a: a.handle, b: b.handle },
            value: ConstraintValue(None),
            reference: false,
        };
        let values: HashMap<u32, f64> = [(1, 3.0), (2, 4.0), (3, 0.0), (4, 3.0), (5, -4.0), (6, 0.0)].into();
        let eqs = c.equations(|h| entities.get(&h).unwrap());
        for e in eqs {
            assert!(e.eval(&|p| *values.get(&p.0).unwrap()).abs() < 1e-12);
        }
    }

    #[test]
    fn where_dragged_has_no_equations() {
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group: GroupHandle::from_index(1),
            kind: ConstraintKind::WhereDragged { point: EntityHandle(1) },
            value: ConstraintValue(None),
            reference: false,
        };
        assert!(c.equations(|_| unreachable!()).is_empty());
        assert_eq!(c.dragged_point(), Some(EntityHandle(1)));
    }
}
