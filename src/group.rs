//! Groups: the regeneration DAG's nodes (§3, §4.5).
//!
//! The teacher's closest analogue is `compiler::csg_tree::CsgNode`, a
//! recursive `Primitive`/`Union`/`Subtract`/`Intersect` enum evaluated
//! bottom-up by `IntentParser::parse`. Groups generalize that shape from a
//! binary tree to a general DAG (a group may depend on more than two
//! predecessors, e.g. a `Loft` spanning several profile groups), and from
//! "recompute everything every time" to the incremental, order-stamped,
//! cacheable regeneration spec.md §4.5 requires.

use crate::handle::{EntityHandle, GroupHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKind {
    /// Freestanding 3d sketch entities with no workplane.
    Drawing3d,
    /// A 2d sketch living on a workplane entity.
    DrawingWorkplane { workplane: EntityHandle },
    /// Extrudes the active sketch's closed profile(s) along a distance
    /// normal to the workplane.
    Extrude { source: GroupHandle, distance: f64 },
    /// Revolves the active sketch's profile about an axis.
    Lathe { source: GroupHandle, axis_point: EntityHandle, axis_dir: EntityHandle, angle_degrees: f64 },
    /// Rigid translation of a prior group's solid.
    Translate { source: GroupHandle, dx: f64, dy: f64, dz: f64 },
    /// Rigid rotation of a prior group's solid about an axis through a point.
    Rotate { source: GroupHandle, axis_point: EntityHandle, axis_dir: EntityHandle, angle_degrees: f64 },
    /// References another document's top-level group, imported by value.
    Linked { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanKind {
    Union,
    Difference,
    Assembly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub handle: GroupHandle,
    pub kind: GroupKind,
    /// Position in the linear regeneration order; groups regenerate in
    /// ascending order, and a group may only reference entities of groups
    /// with a strictly smaller order (spec.md's acyclic-by-construction
    /// invariant -- there is no cycle-detection pass because the UI only
    /// ever appends new groups at the end).
    pub order: u32,
    /// How this group's solid combines with the running assembly.
    pub boolean: BooleanKind,
    pub suppressed: bool,
    /// Set once regeneration has produced entities/params for this group
    /// from its requests; cleared whenever an upstream param the group
    /// depends on changes, so the regenerator knows to redo it (§4.5).
    pub dirty: bool,
}

impl Group {
    pub fn new(handle: GroupHandle, order: u32, kind: GroupKind) -> Self {
        Group { handle, kind, order, boolean: BooleanKind::Union, suppressed: false, dirty: true }
    }

    /// Groups this group's geometry is directly derived from; the
    /// regenerator topologically walks these before regenerating `self`.
    pub fn direct_dependencies(&self) -> Vec<GroupHandle> {
        match &self.kind {
            GroupKind::Drawing3d | GroupKind::DrawingWorkplane { .. } | GroupKind::Linked { .. } => Vec::new(),
            GroupKind::Extrude { source, .. }
            | GroupKind::Lathe { source, .. }
            | GroupKind::Translate { source, .. }
            | GroupKind::Rotate { source, .. } => vec![*source],
        }
    }

    pub fn is_sketch(&self) -> bool {
        matches!(self.kind, GroupKind::Drawing3d | GroupKind::DrawingWorkplane { .. })
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// Topologically orders groups by `order` ascending, which is valid
/// because groups may only depend on strictly earlier groups (no cycle
/// check is needed, matching spec.md's append-only group list invariant).
pub fn regeneration_order(groups: &[Group]) -> Vec<GroupHandle> {
    let mut sorted: Vec<&Group> = groups.iter().filter(|g| !g.suppressed).collect();
    sorted.sort_by_key(|g| g.order);
    sorted.into_iter().map(|g| g.handle).collect()
}
