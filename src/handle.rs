//! Packed 32-bit handles: the core's substitute for pointers (§3).
//!
//! Every persistent object — param, entity, request, constraint, group —
//! is addressed by a small `Copy` handle instead of a reference. Handles
//! are stable across a save/reload round trip and order ascending by
//! owner, which is what lets `ParamTable`/`EntityTable`/`ConstraintTable`
//! (see `crate::store`) use a plain `BTreeMap` for O(log n) lookup and
//! O(n) ascending scan instead of needing an explicit index.
//!
//! `Request`/`Entity`/`Param` handles generalize the teacher's string
//! content-hash identifiers (`geometry::ir::node::NodeId`,
//! `geometry::topology::{ShellId, SolidId}`) to packed integers, because
//! spec.md requires handles to be plain ints that round-trip through the
//! text file format (§6) and order by ascending value for solver
//! determinism (§4.4).
//!
//! Bit layout shared by `EntityHandle` and `ParamHandle`:
//!
//! ```text
//! bit 31        : 1 if owned directly by a Group, 0 if owned by a Request
//! bits 30..16   : owner index (Group or Request), 1-based, 0 reserved
//! bits 15..0    : local ordinal within the owner, 0-based
//! ```
//!
//! `RequestHandle` and `GroupHandle` are flat 1-based indices; `0` is the
//! sentinel "none" in every handle type.

use serde::{Deserialize, Serialize};
use std::fmt;

const OWNER_IS_GROUP_BIT: u32 = 1 << 31;
const OWNER_SHIFT: u32 = 16;
const OWNER_MASK: u32 = 0x7FFF;
const LOCAL_MASK: u32 = 0xFFFF;

/// Marker for whether a packed handle's owner is a `Group` or a `Request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Request(u32),
    Group(u32),
}

macro_rules! flat_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub const NONE: $name = $name(0);

            pub fn is_none(self) -> bool {
                self.0 == 0
            }

            pub fn from_index(index_1based: u32) -> Self {
                $name(index_1based)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::NONE
            }
        }
    };
}

flat_handle!(RequestHandle);
flat_handle!(GroupHandle);
flat_handle!(ConstraintHandle);

macro_rules! packed_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub const NONE: $name = $name(0);

            pub fn is_none(self) -> bool {
                self.0 == 0
            }

            pub fn of_request(request: RequestHandle, local: u32) -> Self {
                debug_assert!(!request.is_none(), "handle must have a concrete owner");
                debug_assert!(local <= LOCAL_MASK, "local ordinal overflowed 16 bits");
                $name(((request.0 & OWNER_MASK) << OWNER_SHIFT) | (local & LOCAL_MASK))
            }

            pub fn of_group(group: GroupHandle, local: u32) -> Self {
                debug_assert!(!group.is_none(), "handle must have a concrete owner");
                debug_assert!(local <= LOCAL_MASK, "local ordinal overflowed 16 bits");
                $name(OWNER_IS_GROUP_BIT | ((group.0 & OWNER_MASK) << OWNER_SHIFT) | (local & LOCAL_MASK))
            }

            pub fn owner(self) -> Owner {
                let owner_index = (self.0 >> OWNER_SHIFT) & OWNER_MASK;
                if self.0 & OWNER_IS_GROUP_BIT != 0 {
                    Owner::Group(owner_index)
                } else {
                    Owner::Request(owner_index)
                }
            }

            pub fn local(self) -> u32 {
                self.0 & LOCAL_MASK
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::NONE
            }
        }
    };
}

packed_handle!(EntityHandle);
packed_handle!(ParamHandle);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_zero() {
        assert!(RequestHandle::NONE.is_none());
        assert!(EntityHandle::NONE.is_none());
        assert_eq!(RequestHandle::NONE.0, 0);
    }

    #[test]
    fn entity_handle_roundtrips_request_owner() {
        let req = RequestHandle::from_index(7);
        let e = EntityHandle::of_request(req, 3);
        assert_eq!(e.owner(), Owner::Request(7));
        assert_eq!(e.local(), 3);
        assert!(!e.is_none());
    }

    #[test]
    fn entity_handle_roundtrips_group_owner() {
        let grp = GroupHandle::from_index(42);
        let e = EntityHandle::of_group(grp, 1000);
        assert_eq!(e.owner(), Owner::Group(42));
        assert_eq!(e.local(), 1000);
    }

    #[test]
    fn handles_order_ascending_by_owner_then_local() {
        let req = RequestHandle::from_index(1);
        let a = ParamHandle::of_request(req, 0);
        let b = ParamHandle::of_request(req, 1);
        let c = ParamHandle::of_request(RequestHandle::from_index(2), 0);
        assert!(a < b);
        assert!(b < c);
    }
}
