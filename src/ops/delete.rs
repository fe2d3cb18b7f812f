//! Hypha deletion, optionally recursive over the subtree.

use crate::hyphae::Hypha;
use crate::ops::OpsError;
use crate::users::User;
use crate::wiki::Wiki;

/// Deletes the hypha (and, recursively, its subhyphae) and commits a
/// revision about it. Deleted hyphae leave all their categories.
pub fn delete(wiki: &Wiki, u: &User, h: &Hypha, recursive: bool) -> Result<(), OpsError> {
    let mut hop = wiki.history.operation();
    hop.with_user(u);
    let mut iop = wiki.index.operation();

    let mut candidates = Vec::new();
    if let Some(existing) = h.as_existing() {
        candidates.push(existing.clone());
    }
    if recursive {
        candidates.extend(iop.subhyphae(h.canonical_name()));
    }

    let mut names = Vec::new();
    let mut files = Vec::new();
    for hypha in candidates {
        let text = match hypha.text(&hop) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(hypha = hypha.canonical_name(), err = %e, "failed to read hypha text");
                hop.abort();
                iop.abort();
                return Err(e.into());
            }
        };
        names.push(hypha.canonical_name().to_string());
        files.extend(hypha.file_paths());
        iop.with_hypha_deleted(hypha, &text);
    }
    if names.is_empty() {
        iop.abort();
        hop.abort();
        return Err(OpsError::EmptyOperation);
    }

    let target = h.canonical_name();
    let msg = if names.len() > 1 || names[0] != target {
        format!("Delete ‘{target}’ recursively")
    } else {
        format!("Delete ‘{target}’")
    };
    hop.with_msg(&msg).with_files_removed(&files);
    if let Err(e) = hop.apply() {
        iop.abort();
        return Err(e.into());
    }
    wiki.categories.remove_hyphae_from_all_categories(&names);
    iop.apply();
    Ok(())
}
