//! Renaming hyphae, optionally recursively, optionally leaving redirection
//! hyphae behind.

use std::path::PathBuf;

use crate::hyphae::{ExistingHypha, Hypha, beautiful_name, canonical_name, is_valid_name};
use crate::ops::OpsError;
use crate::users::User;
use crate::wiki::Wiki;

/// The body of a redirection hypha left at the old name: a rocket link to
/// the new name and a full transclusion of it.
fn redirection_body(new_name: &str) -> String {
    format!(
        "=> {new_name} | 👁️➡️ {}\n<= {new_name} | full\n",
        beautiful_name(new_name)
    )
}

/// Renames the hypha (and, recursively, its subhyphae) to the new name and
/// commits a revision about it. Category mentions are rewritten after the
/// commit; with `leave_redirections`, each old name gets a redirection hypha
/// and joins the configured redirection category.
pub fn rename(
    wiki: &Wiki,
    old_hypha: &Hypha,
    new_name: &str,
    recursive: bool,
    leave_redirections: bool,
    u: &User,
) -> Result<(), OpsError> {
    let old_name = old_hypha.canonical_name().to_string();
    let new_name = canonical_name(new_name);
    if new_name.is_empty() {
        return Err(OpsError::RenameNoName);
    }
    if !is_valid_name(&new_name) {
        return Err(OpsError::InvalidName { name: new_name });
    }
    if new_name == old_name {
        return Ok(());
    }
    let hyphae_dir = wiki.history.hyphae_dir().to_path_buf();

    let mut hop = wiki.history.operation();
    hop.with_user(u);
    let mut iop = wiki.index.operation();

    let mut pairs: Vec<(ExistingHypha, ExistingHypha)> = Vec::new();
    if let Some(existing) = old_hypha.as_existing() {
        pairs.push((existing.clone(), existing.with_name(&hyphae_dir, &new_name)));
    }
    if recursive {
        for sub in iop.subhyphae(&old_name) {
            let sub_new_name = sub.canonical_name().replacen(&old_name, &new_name, 1);
            let renamed = sub.with_name(&hyphae_dir, &sub_new_name);
            pairs.push((sub, renamed));
        }
    }

    let mut names: Vec<(String, String)> = Vec::new();
    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (from, to) in &pairs {
        if iop.exists(to.canonical_name()) {
            hop.abort();
            iop.abort();
            return Err(OpsError::NameTaken {
                name: to.canonical_name().to_string(),
            });
        }
        let text = match from.text(&hop) {
            Ok(text) => text,
            Err(e) => {
                hop.abort();
                iop.abort();
                return Err(e.into());
            }
        };
        iop.with_hypha_renamed_pair(from.clone(), to.clone(), &text);
        names.push((
            from.canonical_name().to_string(),
            to.canonical_name().to_string(),
        ));
        files.extend(from.file_paths().into_iter().zip(to.file_paths()));
    }
    if names.is_empty() {
        hop.abort();
        iop.abort();
        return Err(OpsError::EmptyOperation);
    }

    let msg = if names.len() > 1 || names[0].0 != old_name {
        format!("Rename ‘{old_name}’ to ‘{new_name}’ recursively")
    } else {
        format!("Rename ‘{old_name}’ to ‘{new_name}’")
    };
    hop.with_msg(&msg).with_files_renamed(&files);

    if leave_redirections {
        let mut redirections = Vec::with_capacity(names.len());
        for (from_name, to_name) in &names {
            let body = redirection_body(to_name);
            let redirection = ExistingHypha::new_textual(&hyphae_dir, from_name.clone());
            let path = redirection.text_file_path(&hyphae_dir);
            if let Err(e) = hop.write_file(&path, body.as_bytes()) {
                hop.abort();
                iop.abort();
                return Err(e.into());
            }
            iop.with_hypha_created(redirection, &body);
            redirections.push(path);
        }
        hop.with_files(&redirections);
    }

    match hop.apply() {
        Ok(()) => {}
        Err(e) => {
            iop.abort();
            return Err(e.into());
        }
    }
    wiki.categories
        .rename_hyphae_in_all_categories(leave_redirections, &names);
    iop.apply();
    Ok(())
}
