use std::collections::HashMap;
use std::fmt;

use crate::resource::{FloatingIp, Group, Identified, Server};

/// The difference between two snapshots of an identified resource type.
///
/// Ordering within the three lists is not meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub updated: Vec<T>,
}

impl<T> Default for Changeset<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> Changeset<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

impl<T: Identified + PartialEq + Clone> Changeset<T> {
    /// Diff two snapshots by id: present only in `new` is added, present only
    /// in `old` is removed, present in both with any field difference is
    /// updated.
    pub fn diff(old: &[T], new: &[T]) -> Self {
        let old_by_id: HashMap<&str, &T> = old.iter().map(|r| (r.id(), r)).collect();
        let new_by_id: HashMap<&str, &T> = new.iter().map(|r| (r.id(), r)).collect();

        let mut changeset = Changeset::default();

        for resource in old {
            if !new_by_id.contains_key(resource.id()) {
                changeset.removed.push(resource.clone());
            }
        }

        for resource in new {
            match old_by_id.get(resource.id()) {
                None => changeset.added.push(resource.clone()),
                Some(previous) if *previous != resource => {
                    changeset.updated.push(resource.clone());
                }
                Some(_) => {}
            }
        }

        changeset
    }
}

impl<T: Identified> fmt::Display for Changeset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |list: &[T]| {
            list.iter()
                .map(|r| format!("{} ({})", r.name(), r.id()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "added: [{}], removed: [{}], updated: [{}]",
            names(&self.added),
            names(&self.removed),
            names(&self.updated)
        )
    }
}

/// Changes between two [`Group`] snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupChangeset {
    pub servers: Changeset<Server>,
    pub floating_ips: Changeset<FloatingIp>,
}

impl GroupChangeset {
    pub fn diff(old: &Group, new: &Group) -> Self {
        Self {
            servers: Changeset::diff(&old.servers, &new.servers),
            floating_ips: Changeset::diff(&old.floating_ips, &new.floating_ips),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.floating_ips.is_empty()
    }

    /// True when group membership did not change: no resource was added or
    /// removed on either side, only fields changed in place.
    pub fn is_updates_only(&self) -> bool {
        self.servers.added.is_empty()
            && self.servers.removed.is_empty()
            && self.floating_ips.added.is_empty()
            && self.floating_ips.removed.is_empty()
    }
}

impl fmt::Display for GroupChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "servers: {{{}}}, floating IPs: {{{}}}",
            self.servers, self.floating_ips
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_floating_ip, mock_server};

    #[test]
    fn diff_of_identical_snapshots_is_empty() {
        let group = Group {
            servers: vec![mock_server("1", "srv-1", "nbg1", "eu-central", 1)],
            floating_ips: vec![mock_floating_ip("10", "fip-10", "nbg1", "eu-central")],
        };

        let changeset = GroupChangeset::diff(&group, &group.clone());
        assert!(changeset.is_empty());
        assert!(changeset.is_updates_only());
    }

    #[test]
    fn diff_detects_added_removed_and_updated() {
        let old = Group {
            servers: vec![
                mock_server("1", "srv-1", "nbg1", "eu-central", 1),
                mock_server("2", "srv-2", "nbg1", "eu-central", 2),
            ],
            floating_ips: vec![],
        };

        let mut renamed = mock_server("1", "srv-1-renamed", "nbg1", "eu-central", 1);
        renamed.resource_index = 7;
        let new = Group {
            servers: vec![renamed, mock_server("3", "srv-3", "fsn1", "eu-central", 3)],
            floating_ips: vec![],
        };

        let changeset = GroupChangeset::diff(&old, &new);
        assert_eq!(changeset.servers.added.len(), 1);
        assert_eq!(changeset.servers.added[0].id, "3");
        assert_eq!(changeset.servers.removed.len(), 1);
        assert_eq!(changeset.servers.removed[0].id, "2");
        assert_eq!(changeset.servers.updated.len(), 1);
        assert_eq!(changeset.servers.updated[0].id, "1");
        assert!(!changeset.is_updates_only());
    }

    #[test]
    fn in_place_field_change_is_updates_only() {
        let old = Group {
            servers: vec![],
            floating_ips: vec![mock_floating_ip("10", "fip-10", "nbg1", "eu-central")],
        };
        let mut moved = old.clone();
        moved.floating_ips[0].current_target = Some("1".into());

        let changeset = GroupChangeset::diff(&old, &moved);
        assert!(!changeset.is_empty());
        assert!(changeset.is_updates_only());
        assert_eq!(changeset.floating_ips.updated.len(), 1);
    }
}
