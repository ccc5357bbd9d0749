//! Engineering units and numeric tolerance configuration (§3, SPEC_FULL §4.12).
//!
//! Grounded in the teacher's `geometry::constants` module (`EPSILON`,
//! `DEFAULT_SUBDIVISIONS`, `DEFAULT_CIRCLE_SEGMENTS`), generalized from a
//! handful of bare `const`s into a `Tolerances` struct so the CLI/tests can
//! override them without editing source, matching the "explicit threaded
//! configuration, not globals" design decision in spec.md §9.

/// Millimeters or inches; conversion lives at the file-format/CLI boundary
/// per SPEC_FULL §6, never inside the solver or geometry kernel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Mm,
    Inch,
}

const MM_PER_INCH: f64 = 25.4;

impl Units {
    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            Units::Mm => value,
            Units::Inch => value * MM_PER_INCH,
        }
    }

    pub fn from_mm(self, value_mm: f64) -> f64 {
        match self {
            Units::Mm => value_mm,
            Units::Inch => value_mm / MM_PER_INCH,
        }
    }
}

/// Numeric contract shared by the solver, regenerator, and curve/surface
/// code (spec.md §3 "Numeric tolerances").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Two lengths closer than this are considered coincident.
    pub length_eps: f64,
    /// Sentinel for "larger than any legitimate coordinate," used to seed
    /// bounding-box reductions and to flag divergent solves.
    pub very_positive: f64,
    pub very_negative: f64,
    /// Maximum chord deviation allowed when flattening a curve to a
    /// polyline (`SBezier::make_pwl`, §4.6).
    pub chord_tol: f64,
    /// Hard cap on the number of segments `make_pwl` may emit for one
    /// curve, independent of `chord_tol`, to bound worst-case output size.
    pub max_segments: usize,
    /// Residual norm below which the Newton solver declares convergence.
    pub solver_residual_tol: f64,
    pub solver_max_iterations: usize,
    /// If the residual norm grows by more than this factor between two
    /// consecutive iterations, the solver gives up rather than diverging
    /// further (`SolverOutcome::DidNotConverge`).
    pub solver_divergence_factor: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            length_eps: 1e-6,
            very_positive: 1e10,
            very_negative: -1e10,
            chord_tol: 2.0,
            max_segments: 10,
            solver_residual_tol: 1e-10,
            solver_max_iterations: 50,
            solver_divergence_factor: 1e6,
        }
    }
}

impl Tolerances {
    pub fn with_length_eps(mut self, eps: f64) -> Self {
        self.length_eps = eps;
        self
    }

    pub fn with_chord_tol(mut self, tol: f64) -> Self {
        self.chord_tol = tol;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inch_roundtrips_through_mm() {
        let v = Units::Inch.from_mm(Units::Inch.to_mm(2.5));
        assert!((v - 2.5).abs() < 1e-12);
    }

    #[test]
    fn mm_is_identity() {
        assert_eq!(Units::Mm.to_mm(7.0), 7.0);
        assert_eq!(Units::Mm.from_mm(7.0), 7.0);
    }

    #[test]
    fn default_tolerances_are_sane() {
        let t = Tolerances::default();
        assert!(t.length_eps > 0.0);
        assert!(t.very_positive > 0.0 && t.very_negative < 0.0);
        assert!(t.chord_tol > 0.0);
    }
}
