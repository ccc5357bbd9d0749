//! Ordered handle -> record tables (§3, §4.2).
//!
//! Generalizes the teacher's `geometry::ir::graph::IRGraph`, which keyed
//! nodes by a string `NodeId` in a `HashMap`, to a `BTreeMap` keyed by the
//! packed integer handles in `crate::handle`. The switch to `BTreeMap` is
//! load-bearing, not cosmetic: the solver's determinism contract (§4.4)
//! requires iterating params/entities/constraints in ascending handle
//! order, which a hash map cannot give without an auxiliary sort on every
//! pass.

use std::collections::BTreeMap;

use crate::handle::GroupHandle;

/// A table of handle -> record, with group-tagged bulk removal.
///
/// `tag_of` extracts the owning group from a record so `remove_group` can
/// sweep every record belonging to a group being deleted or regenerated,
/// mirroring spec.md's "purge then regenerate" per-group pipeline (§4.5).
#[derive(Debug, Clone)]
pub struct Table<H: Ord + Copy, T> {
    records: BTreeMap<H, T>,
}

impl<H: Ord + Copy, T> Default for Table<H, T> {
    fn default() -> Self {
        Table { records: BTreeMap::new() }
    }
}

impl<H: Ord + Copy, T> Table<H, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: H, record: T) -> Option<T> {
        self.records.insert(handle, record)
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        self.records.get(&handle)
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.records.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.records.remove(&handle)
    }

    pub fn contains(&self, handle: H) -> bool {
        self.records.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ascending scan by handle, the ordering the solver depends on.
    pub fn iter(&self) -> impl Iterator<Item = (&H, &T)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&H, &mut T)> {
        self.records.iter_mut()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.records.values_mut()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Removes every record for which `belongs_to_group` is true, returning
    /// the handles removed (used for orphan pruning, §4.5).
    pub fn remove_where(&mut self, mut belongs_to_group: impl FnMut(&H, &T) -> bool) -> Vec<H> {
        let doomed: Vec<H> = self
            .records
            .iter()
            .filter(|(h, t)| belongs_to_group(h, t))
            .map(|(h, _)| *h)
            .collect();
        for h in &doomed {
            self.records.remove(h);
        }
        doomed
    }

    /// Moves every `(handle, record)` in `other` into `self`, leaving
    /// `other` empty. Used when a group's freshly-generated scratch table
    /// is committed into the document-wide table after a successful solve.
    pub fn move_into(&mut self, other: &mut Table<H, T>) {
        self.records.append(&mut other.records);
    }
}

/// Per-group tagging helper: records stamped with the group that created
/// them, so `Table::remove_where` can select by group without each record
/// type re-implementing the same filter closure.
pub trait OwnedByGroup {
    fn group(&self) -> GroupHandle;
}

impl<H: Ord + Copy, T: OwnedByGroup> Table<H, T> {
    pub fn remove_group(&mut self, group: GroupHandle) -> Vec<H> {
        self.remove_where(|_, record| record.group() == group)
    }
}
