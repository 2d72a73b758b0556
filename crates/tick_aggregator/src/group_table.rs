//! # Group Table
//!
//! One table per phase. Each table holds one [`Group`] per concrete entity
//! type, so a pass walks same-type entities contiguously:
//!
//! ```text
//! GroupTable[PostPhysics]
//!   groups: [ Group(Turret) [e0, e4, e9] | Group(Drone) [e2, e3] ]
//!   index:  { Turret -> 0, Drone -> 1 }
//!
//! compact() -> [e0, e4, e9, e2, e3]
//! ```
//!
//! Groups are created lazily on the first insert of a type. Empty groups stay
//! allocated unless the table was built with reclaiming enabled.

use std::collections::HashMap;

use crate::entity::{EntityHandle, GroupKey, TypeKey};
use crate::phase::Phase;

/// All currently registered entities sharing one `(type, phase)` key.
#[derive(Debug)]
pub struct Group {
    key: GroupKey,
    entities: Vec<EntityHandle>,
}

impl Group {
    fn new(key: GroupKey) -> Self {
        Self {
            key,
            entities: Vec::new(),
        }
    }

    /// The group's key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> GroupKey {
        self.key
    }

    /// Members in insertion order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the group has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `handle` is a member.
    #[must_use]
    pub fn contains(&self, handle: &EntityHandle) -> bool {
        self.entities.contains(handle)
    }
}

/// The groups of a single phase, keyed by concrete type.
#[derive(Debug)]
pub struct GroupTable {
    phase: Phase,
    groups: Vec<Group>,
    /// Type -> position in `groups`.
    index: HashMap<TypeKey, usize>,
    /// Total members across all groups.
    len: usize,
    reclaim_empty_groups: bool,
}

impl GroupTable {
    /// Creates an empty table for `phase` that keeps empty groups allocated.
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self::with_reclaim(phase, false)
    }

    /// Creates an empty table, choosing whether empty groups are dropped.
    #[must_use]
    pub fn with_reclaim(phase: Phase, reclaim_empty_groups: bool) -> Self {
        Self {
            phase,
            groups: Vec::new(),
            index: HashMap::new(),
            len: 0,
            reclaim_empty_groups,
        }
    }

    /// The phase this table serves.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Total members across all groups.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no entity is registered in this phase.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated groups, empty ones included.
    #[inline]
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Looks up the group for a concrete type.
    #[must_use]
    pub fn group(&self, type_key: TypeKey) -> Option<&Group> {
        self.index.get(&type_key).map(|&slot| &self.groups[slot])
    }

    /// Iterates groups in compaction order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Appends `handle` to the group for its type, creating the group if needed.
    ///
    /// Does not de-duplicate: the caller guarantees single registration.
    pub fn insert(&mut self, handle: EntityHandle) {
        debug_assert_eq!(
            handle.phase(),
            self.phase,
            "entity routed to the wrong phase table"
        );

        let type_key = handle.type_key();
        let slot = match self.index.get(&type_key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(Group::new(handle.key()));
                let slot = self.groups.len() - 1;
                self.index.insert(type_key, slot);
                slot
            }
        };

        self.groups[slot].entities.push(handle);
        self.len += 1;
    }

    /// Removes every occurrence of `handle` from its type's group.
    ///
    /// A handle whose type has no group here is a no-op. Returns the number of
    /// entries removed.
    pub fn remove(&mut self, handle: &EntityHandle) -> usize {
        let Some(&slot) = self.index.get(&handle.type_key()) else {
            return 0;
        };

        let group = &mut self.groups[slot];
        let before = group.entities.len();
        group.entities.retain(|member| member != handle);
        let removed = before - group.entities.len();
        self.len -= removed;

        if self.reclaim_empty_groups && group.entities.is_empty() {
            self.drop_group(slot);
        }

        removed
    }

    /// Whether `handle` is registered here. Only its own type's group is scanned.
    #[must_use]
    pub fn contains(&self, handle: &EntityHandle) -> bool {
        self.group(handle.type_key())
            .is_some_and(|group| group.contains(handle))
    }

    /// Flattens all groups into a freshly allocated pass order.
    ///
    /// Each group's members stay contiguous; the order between groups is the
    /// table's group order and carries no meaning.
    #[must_use]
    pub fn compact(&self) -> Vec<EntityHandle> {
        let mut output = Vec::with_capacity(self.len);
        for group in &self.groups {
            output.extend(group.entities.iter().cloned());
        }
        output
    }

    /// Drops every group and member.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.index.clear();
        self.len = 0;
    }

    fn drop_group(&mut self, slot: usize) {
        let removed = self.groups.swap_remove(slot);
        self.index.remove(&removed.key.type_key);

        // The former last group now lives in `slot`.
        if let Some(moved) = self.groups.get(slot) {
            self.index.insert(moved.key.type_key, slot);
        }
    }
}
