//! Error taxonomy for the geometric kernel.
//!
//! Every public entry point returns a `Result`; nothing in the core panics
//! except on invariant violation (`KernelError::Internal`), reserved for
//! "cannot happen" states and never used for data errors. Partial recovery
//! is explicit: a failed boolean yields the disjoint union, a failed solve
//! leaves a group unsolved rather than aborting regeneration.

use thiserror::Error;

use crate::handle::ConstraintHandle;
use crate::mesh::EdgeKey;

/// Outcome of a solver run over one group's equation system (§4.4, §7).
#[derive(Debug, Clone, PartialEq)]
pub enum SolverOutcome {
    Okay,
    DidNotConverge,
    Singular(Vec<ConstraintHandle>),
    Redundant(Vec<ConstraintHandle>),
    TooManyUnknowns,
}

impl SolverOutcome {
    pub fn is_okay(&self) -> bool {
        matches!(self, SolverOutcome::Okay)
    }
}

/// Outcome of a shell/mesh boolean operation (§4.8, §7).
#[derive(Debug, Clone, PartialEq)]
pub enum BooleanOutcome {
    Ok,
    BooleanFailed(String),
    OpenContour(String),
    MeshSelfIntersects(Vec<EdgeKey>),
    MeshHasNakedEdges(Vec<EdgeKey>),
}

impl BooleanOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, BooleanOutcome::Ok)
    }
}

/// Top-level error type returned from every public entry point.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("solver did not reach OKAY: {0:?}")]
    Solver(SolverOutcome),

    #[error("regeneration removed {requests} orphaned requests and {constraints} orphaned constraints")]
    OrphansRemoved { requests: usize, constraints: usize },

    #[error("boolean/shell operation failed: {0:?}")]
    Boolean(BooleanOutcome),

    #[error("failed to parse expression '{text}': {reason}")]
    BadExpression { text: String, reason: String },

    #[error("I/O error reading/writing persisted file: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted file has bad magic header")]
    BadMagic,

    #[error("unknown marker line {line}: '{text}'")]
    UnknownMarker { line: usize, text: String },

    #[error("truncated record before line {line}")]
    TruncatedRecord { line: usize },

    #[error("invariant violation (bug): {0}")]
    Internal(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    pub fn internal(msg: impl Into<String>) -> Self {
        KernelError::Internal(msg.into())
    }

    pub fn bad_expression(text: impl Into<String>, reason: impl Into<String>) -> Self {
        KernelError::BadExpression {
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub fn orphans_removed(requests: usize, constraints: usize) -> Self {
        KernelError::OrphansRemoved { requests, constraints }
    }
}
