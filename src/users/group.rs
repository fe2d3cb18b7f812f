//! Groups: named permission tiers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::users::UserError;

pub const MIN_PERMISSION: u8 = 0;
pub const MAX_PERMISSION: u8 = u8::MAX;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    name: String,
    permission: u8,
}

impl Group {
    pub fn new(name: impl Into<String>, permission: u8) -> Self {
        Self {
            name: name.into(),
            permission,
        }
    }

    /// The group anonymous visitors belong to.
    pub fn empty() -> Self {
        Group::new("anon", MIN_PERMISSION)
    }

    pub fn admin() -> Self {
        Group::new("admin", MAX_PERMISSION)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permission(&self) -> u8 {
        self.permission
    }

    pub fn compare(&self, other: &Group) -> Ordering {
        self.permission
            .cmp(&other.permission)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// The registry of known groups, fixed at startup.
#[derive(Clone, Debug)]
pub struct Groups {
    by_name: HashMap<String, Group>,
    sorted: Vec<Group>,
}

impl Groups {
    /// Builds the registry from the configured custom groups, or the default
    /// tier ladder when none are configured. The fixed `anon` and `admin`
    /// groups always keep their permission levels.
    pub fn from_config(custom: &BTreeMap<String, u8>) -> Self {
        let mut groups: Vec<Group> = if custom.is_empty() {
            vec![
                Group::empty(),
                Group::new("reader", 0),
                Group::new("editor", 1),
                Group::new("trusted", 2),
                Group::new("moderator", 3),
                Group::admin(),
            ]
        } else {
            let mut merged = custom.clone();
            for fixed in [Group::empty(), Group::admin()] {
                if let Some(&p) = merged.get(fixed.name()) {
                    if p != fixed.permission() {
                        tracing::warn!(
                            group = fixed.name(),
                            configured = p,
                            fixed = fixed.permission(),
                            "fixed group permission reset"
                        );
                    }
                }
                merged.insert(fixed.name().to_string(), fixed.permission());
            }
            merged
                .into_iter()
                .map(|(name, permission)| Group::new(name, permission))
                .collect()
        };
        groups.sort_by(Group::compare);
        let by_name = groups
            .iter()
            .map(|g| (g.name().to_string(), g.clone()))
            .collect();
        tracing::info!(n = groups.len(), "indexed groups");
        Self {
            by_name,
            sorted: groups,
        }
    }

    pub fn by_name(&self, name: &str) -> Result<Group, UserError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| UserError::UnknownGroup {
                group: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All groups, ordered by permission then name.
    pub fn all(&self) -> &[Group] {
        &self.sorted
    }
}
