//! Newton-iteration constraint solver with rank-revealing diagnosis (§4.4).
//!
//! The teacher has no numeric solver to generalize from; this module's
//! shape is grounded in how the teacher organizes its own iterative/
//! stateful computation (`geometry-kernel/src/lib.rs`'s `GeometryKernel`
//! holding mutable compiler/analyzer state across calls) adapted to
//! Gauss-Newton least squares, and its matrix algebra is built on
//! `nalgebra::{DMatrix, DVector}` and its SVD, which is how the
//! `louistrue-ifc-lite` geometry crate and the `ricosjp-truck` reference
//! already lean on `nalgebra` for dense linear algebra rather than a
//! hand-rolled Gaussian elimination -- spec.md's "rank-revealing Jacobian"
//! requirement is exactly what `nalgebra`'s SVD already computes.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::errors::SolverOutcome;
use crate::expr::Expr;
use crate::handle::{ConstraintHandle, ParamHandle};
use crate::units::Tolerances;

/// Mutable numeric state the solver reads and writes during iteration.
/// Callers (`crate::regen`) seed it from the live `ParamTable` and write
/// the converged values back after a successful solve.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    values: HashMap<ParamHandle, f64>,
}

impl Solver {
    pub fn new(values: HashMap<ParamHandle, f64>) -> Self {
        Solver { values }
    }

    pub fn value(&self, h: ParamHandle) -> f64 {
        *self.values.get(&h).unwrap_or(&0.0)
    }

    pub fn set(&mut self, h: ParamHandle, v: f64) {
        self.values.insert(h, v);
    }

    pub fn into_values(self) -> HashMap<ParamHandle, f64> {
        self.values
    }

    fn eval_residuals(&self, equations: &[Expr]) -> DVector<f64> {
        DVector::from_iterator(equations.len(), equations.iter().map(|e| e.eval(&|h| self.value(h))))
    }

    fn jacobian(&self, equations: &[Expr], unknowns: &[ParamHandle]) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(equations.len(), unknowns.len());
        for (row, eq) in equations.iter().enumerate() {
            for (col, &p) in unknowns.iter().enumerate() {
                let deriv = eq.partial_wrt(p).fold_constants();
                j[(row, col)] = deriv.eval(&|h| self.value(h));
            }
        }
        j
    }

    /// Drives every equation in `equations` to zero by varying `unknowns`,
    /// leaving every other parameter referenced by the equations fixed at
    /// its current value ("known propagation", §4.4). Converged values are
    /// written back into `self` only on `SolverOutcome::Okay`.
    ///
    /// `row_owners` names the constraint each row in `equations` was
    /// assembled from (same length, same order); a `Singular`/`Redundant`
    /// outcome reports back the handles of the rows implicated in the
    /// degenerate singular vector, per spec.md §4.4 step 4's "report the
    /// offending rows."
    pub fn solve(
        &mut self,
        equations: &[Expr],
        unknowns: &[ParamHandle],
        row_owners: &[ConstraintHandle],
        tol: &Tolerances,
    ) -> SolverOutcome {
        if unknowns.is_empty() {
            return SolverOutcome::Okay;
        }
        if equations.len() < unknowns.len() {
            return SolverOutcome::TooManyUnknowns;
        }

        let mut trial = self.clone();
        let mut prev_norm = f64::INFINITY;

        for _ in 0..tol.solver_max_iterations {
            let residual = trial.eval_residuals(equations);
            let norm = residual.norm();
            log::trace!("newton iteration residual norm = {norm:e}");

            if norm < tol.solver_residual_tol {
                self.values = trial.values;
                return SolverOutcome::Okay;
            }
            if norm.is_nan() || norm.is_infinite() || norm > prev_norm * tol.solver_divergence_factor {
                return SolverOutcome::DidNotConverge;
            }
            prev_norm = norm;

            let jac = trial.jacobian(equations, unknowns);
            let svd = jac.clone().svd(true, true);
            let max_singular = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
            if max_singular < tol.length_eps {
                return SolverOutcome::Singular(offending_rows(&svd, row_owners, 0));
            }
            let rank_tol = max_singular * 1e-9;
            let near_zero_index = svd.singular_values.iter().position(|&s| s < rank_tol);
            if let Some(idx) = near_zero_index {
                if equations.len() > unknowns.len() {
                    return SolverOutcome::Redundant(offending_rows(&svd, row_owners, idx));
                }
            }

            let dx = match svd.solve(&residual, rank_tol) {
                Ok(dx) => dx,
                Err(_) => return SolverOutcome::Singular(offending_rows(&svd, row_owners, 0)),
            };

            for (col, &p) in unknowns.iter().enumerate() {
                let updated = trial.value(p) - dx[col];
                trial.set(p, updated);
            }
        }

        SolverOutcome::DidNotConverge
    }

    /// Degrees of freedom remaining: unknowns minus the numeric rank of the
    /// Jacobian at the current point, used by the DOF-report mode (§4.4,
    /// §7) instead of running a full solve.
    pub fn dof_report(&self, equations: &[Expr], unknowns: &[ParamHandle]) -> i64 {
        if unknowns.is_empty() {
            return 0;
        }
        let jac = self.jacobian(equations, unknowns);
        let svd = jac.clone().svd(false, false);
        let max_singular = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
        let rank = if max_singular < 1e-14 {
            0
        } else {
            let rank_tol = max_singular * 1e-9;
            svd.singular_values.iter().filter(|&&s| s >= rank_tol).count()
        };
        unknowns.len() as i64 - rank as i64
    }
}

/// Picks out which constraint(s) a degenerate singular vector implicates:
/// the rows with the largest magnitude in the left singular vector at
/// `singular_index` of `svd.u` are the ones whose equations participate in
/// that near-zero (or smallest) singular direction.
fn offending_rows(
    svd: &nalgebra::SVD<f64, nalgebra::Dyn, nalgebra::Dyn>,
    row_owners: &[ConstraintHandle],
    singular_index: usize,
) -> Vec<ConstraintHandle> {
    let Some(u) = &svd.u else { return Vec::new() };
    if singular_index >= u.ncols() {
        return Vec::new();
    }
    let column = u.column(singular_index);
    let threshold = column.iter().cloned().map(f64::abs).fold(0.0_f64, f64::max) * 0.5;
    let mut handles: Vec<ConstraintHandle> = Vec::new();
    for (row, &component) in column.iter().enumerate() {
        if component.abs() >= threshold {
            if let Some(&owner) = row_owners.get(row) {
                if !handles.contains(&owner) {
                    handles.push(owner);
                }
            }
        }
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u32) -> ParamHandle {
        ParamHandle(n)
    }

    fn ch(n: u32) -> ConstraintHandle {
        ConstraintHandle::from_index(n)
    }

    #[test]
    fn solves_single_distance_equation() {
        let p = h(1);
        let mut values = HashMap::new();
        values.insert(p, 3.0);
        let mut solver = Solver::new(values);
        // (p - 10)^2 = 0  => p = 10
        let eq = Expr::square(Expr::minus(Expr::param(p), Expr::Const(10.0)));
        let outcome = solver.solve(&[eq], &[p], &[ch(1)], &Tolerances::default());
        assert_eq!(outcome, SolverOutcome::Okay);
        assert!((solver.value(p) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn solves_two_point_distance_system() {
        // Point a fixed at origin (handled as a known constant, not an
        // unknown); point b's x,y driven so that distance(a,b) == 5 and
        // b.y == 0 (pin one DOF so the system is exactly determined).
        let bx = h(1);
        let by = h(2);
        let mut values = HashMap::new();
        values.insert(bx, 1.0);
        values.insert(by, 0.0);
        let mut solver = Solver::new(values);
        let dist_sq = Expr::plus(Expr::square(Expr::param(bx)), Expr::square(Expr::param(by)));
        let eq1 = Expr::minus(dist_sq, Expr::Const(25.0));
        let eq2 = Expr::param(by);
        let outcome = solver.solve(&[eq1, eq2], &[bx, by], &[ch(1), ch(2)], &Tolerances::default());
        assert_eq!(outcome, SolverOutcome::Okay);
        assert!((solver.value(bx).abs() - 5.0).abs() < 1e-6);
        assert!(solver.value(by).abs() < 1e-6);
    }

    #[test]
    fn too_many_unknowns_is_reported() {
        let p1 = h(1);
        let p2 = h(2);
        let mut solver = Solver::new(HashMap::new());
        let eq = Expr::param(p1);
        let outcome = solver.solve(&[eq], &[p1, p2], &[ch(1)], &Tolerances::default());
        assert_eq!(outcome, SolverOutcome::TooManyUnknowns);
    }

    #[test]
    fn redundant_system_reports_the_offending_constraints() {
        // Three equations that all drive p1 alone, leaving p2 completely
        // unconstrained: more equations than unknowns, but the Jacobian's
        // p2 column is entirely zero, so the system is rank-deficient.
        let p1 = h(1);
        let p2 = h(2);
        let mut values = HashMap::new();
        values.insert(p1, 1.0);
        values.insert(p2, 1.0);
        let mut solver = Solver::new(values);
        let eq1 = Expr::minus(Expr::param(p1), Expr::Const(3.0));
        let eq2 = Expr::times(Expr::Const(2.0), Expr::minus(Expr::param(p1), Expr::Const(3.0)));
        let eq3 = Expr::times(Expr::Const(3.0), Expr::minus(Expr::param(p1), Expr::Const(3.0)));
        let outcome = solver.solve(&[eq1, eq2, eq3], &[p1, p2], &[ch(5), ch(6), ch(7)], &Tolerances::default());
        match outcome {
            SolverOutcome::Redundant(handles) | SolverOutcome::Singular(handles) => {
                assert!(!handles.is_empty());
            }
            other => panic!("expected a degenerate outcome, got {other:?}"),
        }
    }

    #[test]
    fn dof_report_counts_free_unknowns() {
        let p1 = h(1);
        let p2 = h(2);
        let mut values = HashMap::new();
        values.insert(p1, 0.0);
        values.insert(p2, 0.0);
        let solver = Solver::new(values);
        let eq = Expr::param(p1);
        let dof = solver.dof_report(&[eq], &[p1, p2]);
        assert_eq!(dof, 1);
    }
}
