//! Route groups
//!
//! A route belongs to at most one group. Groups that share solo make a
//! solo change on one member apply to every member; the propagator is
//! then told the group was already accounted for so members are not
//! processed against each other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use rf_core::GroupId;

// ═══════════════════════════════════════════════════════════════════════════════
// DISPOSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// How a control change relates to the route's group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupControlDisposition {
    /// Only this route
    #[default]
    NoGroup,
    /// Apply to the group if it is active and shares this control
    UseGroup,
    /// Apply to the group only if it does NOT share this control
    InverseGroup,
    /// This change is one member of a group-wide change
    ForGroup,
}

impl GroupControlDisposition {
    /// Should a solo change fan out to the rest of `group`?
    pub fn applies_to(self, group: &RouteGroup) -> bool {
        let shared = group.is_active() && group.shares_solo();
        match self {
            Self::UseGroup => shared,
            Self::InverseGroup => !shared,
            Self::NoGroup | Self::ForGroup => false,
        }
    }

    /// The caller already handled the other members of the group
    #[inline]
    pub fn group_already_accounted_for(self) -> bool {
        self == Self::ForGroup
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTE GROUP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteGroup {
    id: GroupId,
    name: String,
    active: bool,
    shares_solo: bool,
}

impl RouteGroup {
    pub fn new(id: GroupId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            active: true,
            shares_solo: true,
        }
    }

    #[inline]
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    #[inline]
    pub fn shares_solo(&self) -> bool {
        self.shares_solo
    }

    pub fn set_shares_solo(&mut self, shares: bool) {
        self.shares_solo = shares;
    }
}

/// Group registry; membership itself lives on the routes
#[derive(Debug)]
pub struct RouteGroups {
    groups: HashMap<GroupId, RouteGroup>,
    next_id: u64,
}

impl Default for RouteGroups {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGroups {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn create(&mut self, name: &str) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.groups.insert(id, RouteGroup::new(id, name));
        id
    }

    pub fn remove(&mut self, id: GroupId) -> Option<RouteGroup> {
        self.groups.remove(&id)
    }

    pub fn get(&self, id: GroupId) -> Option<&RouteGroup> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut RouteGroup> {
        self.groups.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_group_requires_active_shared_solo() {
        let mut group = RouteGroup::new(GroupId(1), "Drums");
        assert!(GroupControlDisposition::UseGroup.applies_to(&group));
        assert!(!GroupControlDisposition::InverseGroup.applies_to(&group));

        group.set_shares_solo(false);
        assert!(!GroupControlDisposition::UseGroup.applies_to(&group));
        assert!(GroupControlDisposition::InverseGroup.applies_to(&group));

        group.set_shares_solo(true);
        group.set_active(false);
        assert!(!GroupControlDisposition::UseGroup.applies_to(&group));
    }

    #[test]
    fn test_no_group_and_for_group_never_fan_out() {
        let group = RouteGroup::new(GroupId(1), "Vox");
        assert!(!GroupControlDisposition::NoGroup.applies_to(&group));
        assert!(!GroupControlDisposition::ForGroup.applies_to(&group));
        assert!(GroupControlDisposition::ForGroup.group_already_accounted_for());
        assert!(!GroupControlDisposition::UseGroup.group_already_accounted_for());
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let mut groups = RouteGroups::new();
        let a = groups.create("A");
        let b = groups.create("B");
        assert_ne!(a, b);
        assert_eq!(groups.get(a).map(|g| g.name()), Some("A"));
        assert!(groups.remove(a).is_some());
        assert!(groups.get(a).is_none());
        assert_eq!(groups.len(), 1);
    }
}
