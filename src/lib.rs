//! Parametric 2D/3D constraint solver and boundary-representation
//! geometry kernel.
//!
//! Three subsystems, each owning one module cluster:
//! - the symbolic/numeric constraint solver (`expr`, `constraint`, `solver`)
//! - the group-DAG regeneration pipeline (`group`, `request`, `entity`, `regen`)
//! - the curve/surface boolean engine (`curve`, `surface`, `polygon`, `solid`, `mesh`)
//!
//! `regen::Document` is the one stateful entry point, generalized from the
//! teacher's `GeometryKernel` (`geometry-kernel/src/lib.rs`): a single
//! struct holding every live table, built and driven through ordinary
//! method calls rather than a `wasm_bindgen` boundary -- this crate has no
//! browser surface, so state is threaded explicitly instead of exported
//! as a JS-visible object.

#![allow(clippy::too_many_arguments)]

pub mod constraint;
pub mod curve;
pub mod entity;
pub mod errors;
pub mod expr;
pub mod fileformat;
pub mod group;
pub mod handle;
pub mod hashing;
pub mod mesh;
pub mod polygon;
pub mod regen;
pub mod request;
pub mod solid;
pub mod solver;
pub mod store;
pub mod surface;
pub mod units;

pub use errors::{BooleanOutcome, KernelError, KernelResult, SolverOutcome};
pub use regen::{Document, RegenReport};
pub use units::{Tolerances, Units};

/// Loads a persisted document from its on-disk text representation,
/// regenerating every dirty group before returning it -- the single
/// operation `src/bin/solvecore.rs`'s `load` subcommand drives (§6).
pub fn load_and_regenerate(text: &str, tolerances: Tolerances) -> KernelResult<(Document, RegenReport)> {
    let records = fileformat::read_document(text)?;
    let mut doc = Document {
        groups: records.groups,
        requests: records.requests,
        params: store::Table::new(),
        entities: store::Table::new(),
        constraints: records.constraints,
        tolerances,
        ..Default::default()
    }
    .with_params(records.params);
    for g in &mut doc.groups {
        g.mark_dirty();
    }
    let report = doc.regenerate_all();
    Ok((doc, report))
}

impl Document {
    fn with_params(mut self, params: Vec<(handle::ParamHandle, f64)>) -> Self {
        for (h, v) in params {
            // Loaded params have no group until their owning group's next
            // regeneration re-derives and re-tags them; seed with group 0
            // (never a real handle, see `handle::GroupHandle::NONE`) so the
            // very first `regenerate_all` pass overwrites them cleanly.
            self.params.insert(h, regen::ParamRecord { group: handle::GroupHandle::NONE, value: v });
        }
        self
    }
}
