//! The route ACL: each route is annotated with the permission level it
//! requires. Lookup walks from the specific route up through its path
//! parents, so `interwiki/add-entry` can be stricter than `interwiki`.

use std::collections::{BTreeMap, HashMap};

use crate::users::{Groups, MAX_PERMISSION, UserError};

/// Default route permission table. More is more privileged.
const DEFAULT_ROUTE_PERMISSIONS: &[(&str, u8)] = &[
    ("about", 0),
    ("backlinks", 0),
    ("binary", 0),
    ("category", 0),
    ("help", 0),
    ("history", 0),
    ("hypha", 0),
    ("interwiki", 0),
    ("list", 0),
    ("orphans", 0),
    ("page", 0),
    ("primitive-diff", 0),
    ("random", 0),
    ("recent-changes", 0),
    ("rev", 0),
    ("rev-text", 0),
    ("rev-binary", 0),
    ("subhyphae", 0),
    ("title-search", 0),
    ("text", 0),
    ("text-search", 0),
    ("user-list", 0),
    ("add-to-category", 1),
    ("edit", 1),
    ("edit-category", 1),
    ("media", 1),
    ("remove-from-category", 1),
    ("rename", 1),
    ("upload-binary", 1),
    ("upload-text", 1),
    ("remove-media", 2),
    ("delete", 3),
    ("revert", 3),
    ("update-header-links", 3),
    ("admin", 4),
    ("interwiki/add-entry", 4),
    ("interwiki/modify-entry", 4),
    ("reindex", 4),
];

#[derive(Clone, Debug)]
pub struct RouteAcl {
    permissions: HashMap<String, u8>,
}

impl RouteAcl {
    /// The default table with the configured per-route group overrides
    /// applied. Overriding an unknown route or naming an unknown group is a
    /// startup error.
    pub fn from_config(
        custom_permissions: &BTreeMap<String, String>,
        groups: &Groups,
    ) -> Result<Self, UserError> {
        let mut acl = RouteAcl {
            permissions: DEFAULT_ROUTE_PERMISSIONS
                .iter()
                .map(|(route, p)| (route.to_string(), *p))
                .collect(),
        };
        let mut custom = 0;
        for (route, group_name) in custom_permissions {
            acl.set_route_permission(route, group_name, groups)?;
            custom += 1;
        }
        tracing::info!(custom, total = acl.permissions.len(), "indexed permissions");
        Ok(acl)
    }

    pub fn set_route_permission(
        &mut self,
        route: &str,
        group_name: &str,
        groups: &Groups,
    ) -> Result<(), UserError> {
        let route = route.trim_matches('/');
        if self.permission_for(route).is_none() {
            return Err(UserError::PermissionDenied {
                route: route.to_string(),
            });
        }
        let group = groups.by_name(group_name)?;
        self.permissions
            .insert(route.to_string(), group.permission());
        Ok(())
    }

    /// The permission level required for the route, resolved from specific
    /// to generic. `None` means the route is unknown.
    pub fn permission_for(&self, route: &str) -> Option<u8> {
        let mut route = route.trim_matches('/');
        loop {
            if let Some(&p) = self.permissions.get(route) {
                return Some(p);
            }
            match route.rsplit_once('/') {
                Some((parent, _)) => route = parent,
                None => return None,
            }
        }
    }

    /// The required level, with unknown routes locked down entirely.
    pub fn required_permission(&self, route: &str) -> u8 {
        self.permission_for(route).unwrap_or(MAX_PERMISSION)
    }
}
