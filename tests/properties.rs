//! Property-based checks of spec.md §8's testable invariants, using
//! `proptest` the way `freddiehaddad-oxidized`'s render-scheduler crate
//! drives its own scheduler properties -- generate many inputs, assert an
//! invariant holds for every one, rather than a handful of literal cases.

use std::collections::HashMap;

use approx::assert_relative_eq;
use nalgebra::Point3;
use proptest::prelude::*;

use solvespace_kernel::constraint::{Constraint, ConstraintKind, ConstraintValue};
use solvespace_kernel::curve::SBezier;
use solvespace_kernel::entity::{Entity, EntityKind, PointParams};
use solvespace_kernel::expr::Expr;
use solvespace_kernel::group::{Group, GroupKind};
use solvespace_kernel::handle::{ConstraintHandle, EntityHandle, GroupHandle, ParamHandle, RequestHandle};
use solvespace_kernel::polygon::SPolygon;
use solvespace_kernel::request::{Request, RequestType};
use solvespace_kernel::solver::Solver;
use solvespace_kernel::{Document, Tolerances};

/// Same chord-deviation measurement `SBezier::make_pwl`'s own tests use
/// internally, reimplemented here since it is a private free function.
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

fn finite_coord() -> impl Strategy<Value = f64> {
    -50.0..50.0f64
}

proptest! {
    /// **§8 property**: `SBezier::make_pwl`'s output never deviates from the
    /// true curve by more than `tol.chord_tol`, for any quadratic Bezier and
    /// any chord tolerance in a sane range.
    #[test]
    fn make_pwl_never_exceeds_chord_tolerance(
        p0 in proptest::collection::vec(finite_coord(), 2),
        p1 in proptest::collection::vec(finite_coord(), 2),
        p2 in proptest::collection::vec(finite_coord(), 2),
        chord_tol in 0.01..5.0f64,
    ) {
        let curve = SBezier::new(
            vec![
                Point3::new(p0[0], p0[1], 0.0),
                Point3::new(p1[0], p1[1], 0.0),
                Point3::new(p2[0], p2[1], 0.0),
            ],
            vec![1.0, 1.0, 1.0],
        );
        let tol = Tolerances::default().with_chord_tol(chord_tol);
        let pwl = curve.make_pwl(&tol);

        prop_assert!(pwl.len() >= 2);
        for window in pwl.windows(2) {
            let (a, b) = (window[0], window[1]);
            // Sample the true curve between the two chord endpoints' own
            // best-fit parameters and check no sample strays past the
            // tolerance the flattening promised, with slack for the
            // depth-24 bailout on pathological inputs.
            let ta = curve.closest_point_to(a);
            let tb = curve.closest_point_to(b);
            let (lo, hi) = if ta <= tb { (ta, tb) } else { (tb, ta) };
            for i in 1..8 {
                let t = lo + (hi - lo) * (i as f64 / 8.0);
                let sample = curve.point_at(t);
                prop_assert!(distance_point_to_segment(sample, a, b) <= chord_tol + 1e-6);
            }
        }
    }

    /// **§8 property**: `SPolygon::triangulate_into`'s ear-clip triangles
    /// cover exactly the input polygon's area, for any convex polygon (built
    /// by sampling points on a circle and sorting by angle, which is always
    /// a simple, convex contour regardless of sample order).
    #[test]
    fn triangulate_convex_polygon_covers_its_full_area(
        mut angles in proptest::collection::vec(0.0..std::f64::consts::TAU, 4..10),
        radius in 1.0..20.0f64,
    ) {
        angles.sort_by(|a, b| a.partial_cmp(b).unwrap());
        angles.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
        prop_assume!(angles.len() >= 3);

        let outer: Vec<nalgebra::Point2<f64>> =
            angles.iter().map(|&a| nalgebra::Point2::new(radius * a.cos(), radius * a.sin())).collect();
        let shoelace: f64 = {
            let n = outer.len();
            let mut sum = 0.0;
            for i in 0..n {
                let a = outer[i];
                let b = outer[(i + 1) % n];
                sum += a.x * b.y - b.x * a.y;
            }
            (sum / 2.0).abs()
        };
        prop_assume!(shoelace > 1e-3);

        let mut poly = SPolygon::new(outer, vec![]);
        poly.fix_contour_directions();
        let tol = Tolerances::default();
        let triangles = poly.triangulate_into(&tol);

        let covered: f64 = triangles
            .iter()
            .map(|t| {
                let (a, b, c) = (t[0], t[1], t[2]);
                ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() / 2.0
            })
            .sum();
        prop_assert!((covered - shoelace).abs() < shoelace * 1e-6 + 1e-9);
    }

    /// **§8 property**: the Newton solver is deterministic -- solving the
    /// same equations from the same starting values twice yields
    /// bit-for-bit identical converged values (§9's determinism contract).
    #[test]
    fn solver_is_deterministic_given_identical_inputs(
        start in -20.0..20.0f64,
        target in -20.0..20.0f64,
    ) {
        let p = ParamHandle(1);
        let eq = Expr::square(Expr::minus(Expr::param(p), Expr::Const(target)));
        let tol = Tolerances::default();

        let mut values_a = HashMap::new();
        values_a.insert(p, start);
        let mut solver_a = Solver::new(values_a);
        let outcome_a = solver_a.solve(&[eq.clone()], &[p], &[ConstraintHandle::from_index(1)], &tol);

        let mut values_b = HashMap::new();
        values_b.insert(p, start);
        let mut solver_b = Solver::new(values_b);
        let outcome_b = solver_b.solve(&[eq], &[p], &[ConstraintHandle::from_index(1)], &tol);

        prop_assert_eq!(outcome_a, outcome_b);
        prop_assert_eq!(solver_a.value(p).to_bits(), solver_b.value(p).to_bits());
    }

    /// **§8 property**: a `reference: true` constraint never contributes
    /// equations (so it cannot change whether the group solves) and, after
    /// a successful solve, its `value` is overwritten with the actual
    /// measured distance between the two points (`regen.rs`'s "rewrite
    /// reference constraints' value after each solve", §4.5 point 4).
    #[test]
    fn reference_distance_constraint_reports_the_measured_value(
        dx in 1.0..40.0f64,
        dy in 1.0..40.0f64,
    ) {
        let group_handle = GroupHandle::from_index(1);
        let mut doc = Document::new();
        doc.groups.push(Group::new(group_handle, 0, GroupKind::Drawing3d));
        doc.requests.push(Request::new(RequestHandle::from_index(1), group_handle, RequestType::Point3d, None));
        doc.requests.push(Request::new(RequestHandle::from_index(2), group_handle, RequestType::Point3d, None));
        doc.regenerate_all();

        let mut points: Vec<EntityHandle> =
            doc.entities.values().filter(|e| e.group == group_handle && e.is_point()).map(|e| e.handle).collect();
        points.sort();
        prop_assert_eq!(points.len(), 2);
        let (a, b) = (points[0], points[1]);

        doc.constraints.insert(
            ConstraintHandle::from_index(1),
            Constraint {
                handle: ConstraintHandle::from_index(1),
                group: group_handle,
                kind: ConstraintKind::WhereDragged { point: a },
                value: ConstraintValue(None),
                reference: false,
            },
        );
        doc.constraints.insert(
            ConstraintHandle::from_index(2),
            Constraint {
                handle: ConstraintHandle::from_index(2),
                group: group_handle,
                kind: ConstraintKind::WhereDragged { point: b },
                value: ConstraintValue(None),
                reference: false,
            },
        );
        // Pin b relative to a along both axes so the 3d point is fully
        // determined (z stays at its regenerated default of 0 for both).
        doc.constraints.insert(
            ConstraintHandle::from_index(3),
            Constraint {
                handle: ConstraintHandle::from_index(3),
                group: group_handle,
                kind: ConstraintKind::PtPtDistance { a, b },
                value: ConstraintValue(Some((dx * dx + dy * dy).sqrt())),
                reference: false,
            },
        );
        // A reference measurement of the same distance, with an initial
        // bogus value that the solve must overwrite.
        doc.constraints.insert(
            ConstraintHandle::from_index(4),
            Constraint {
                handle: ConstraintHandle::from_index(4),
                group: group_handle,
                kind: ConstraintKind::PtPtDistance { a, b },
                value: ConstraintValue(Some(-999.0)),
                reference: true,
            },
        );

        if let Some(g) = doc.groups.iter_mut().find(|g| g.handle == group_handle) {
            g.mark_dirty();
        }
        let report = doc.regenerate_all();
        prop_assert!(report.group_outcomes.last().unwrap().1.is_okay());

        let value_of = |p: ParamHandle| doc.params.get(p).map(|r| r.value).unwrap_or(0.0);
        let pa = doc.entities.get(a).unwrap().point_position(&value_of).unwrap();
        let pb = doc.entities.get(b).unwrap().point_position(&value_of).unwrap();
        let measured = (pa - pb).norm();

        let reference = doc.constraints.get(ConstraintHandle::from_index(4)).unwrap();
        let ConstraintValue(Some(recorded)) = reference.value else {
            panic!("reference constraint's value was never measured");
        };
        prop_assert!((recorded - measured).abs() < 1e-6);
        prop_assert!(recorded > 0.0);
    }
}

/// Smoke test that `own_params`/`point_position` agree on a freshly built
/// `Entity::Point`, used as a sanity anchor for the property tests above
/// that lean on both.
#[test]
fn point_entity_position_matches_its_own_params() {
    let x = ParamHandle(1);
    let y = ParamHandle(2);
    let z = ParamHandle(3);
    let entity = Entity {
        handle: EntityHandle(1),
        group: GroupHandle::from_index(1),
        kind: EntityKind::Point(PointParams { x, y, z }),
        locked: false,
    };
    let values: HashMap<ParamHandle, f64> = [(x, 1.0), (y, 2.0), (z, 3.0)].into_iter().collect();
    let pos = entity.point_position(&|h| *values.get(&h).unwrap()).unwrap();
    assert_relative_eq!(pos.x, 1.0);
    assert_relative_eq!(pos.y, 2.0);
    assert_relative_eq!(pos.z, 3.0);
}
