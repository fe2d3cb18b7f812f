//! The category store: a many-to-many hypha↔category map.
//!
//! Categories are not hyphae and live outside the revision store: the whole
//! map is mirrored to a JSON file, saved asynchronously after every
//! mutation. A category exists exactly while it has at least one member.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::process::Lifecycle;
use crate::util::{self, pathographic_compare};

fn name_compare(a: &String, b: &String) -> std::cmp::Ordering {
    pathographic_compare(a, b)
}

#[derive(Default)]
struct CategoryMaps {
    /// Category name to sorted unique hypha names.
    hyphae_by_category: HashMap<String, Vec<String>>,
    /// Hypha name to sorted category names.
    categories_by_hypha: HashMap<String, Vec<String>>,
}

impl CategoryMaps {
    fn add(&mut self, cat_name: &str, hypha_name: &str) {
        let cats = self
            .categories_by_hypha
            .entry(hypha_name.to_string())
            .or_default();
        util::insert_sorted(cats, name_compare, std::slice::from_ref(&cat_name.to_string()));
        let hyphae = self
            .hyphae_by_category
            .entry(cat_name.to_string())
            .or_default();
        util::insert_sorted(
            hyphae,
            name_compare,
            std::slice::from_ref(&hypha_name.to_string()),
        );
    }

    fn remove(&mut self, cat_name: &str, hypha_name: &str) {
        if let Some(cats) = self.categories_by_hypha.get_mut(hypha_name) {
            util::delete_sorted(cats, name_compare, std::slice::from_ref(&cat_name.to_string()));
            if cats.is_empty() {
                self.categories_by_hypha.remove(hypha_name);
            }
        }
        if let Some(hyphae) = self.hyphae_by_category.get_mut(cat_name) {
            util::delete_sorted(
                hyphae,
                name_compare,
                std::slice::from_ref(&hypha_name.to_string()),
            );
            if hyphae.is_empty() {
                self.hyphae_by_category.remove(cat_name);
            }
        }
    }
}

/// One category in the on-disk snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct CategoryRecord {
    name: String,
    hyphae: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CategoriesFile {
    categories: Vec<CategoryRecord>,
}

pub struct CategoryStore {
    maps: RwLock<CategoryMaps>,
    path: PathBuf,
    process: Arc<Lifecycle>,
    /// Renamed-away names go here when redirections are requested.
    redirection_category: String,
}

impl CategoryStore {
    pub fn new(
        path: PathBuf,
        process: Arc<Lifecycle>,
        redirection_category: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            maps: RwLock::new(CategoryMaps::default()),
            path,
            process,
            redirection_category: redirection_category.into(),
        })
    }

    /// Loads the snapshot from disk; a missing file means no categories.
    pub fn load(&self) -> std::io::Result<()> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let file: CategoriesFile = serde_json::from_slice(&contents)
            .map_err(|e| std::io::Error::other(format!("bad categories snapshot: {e}")))?;
        let mut maps = CategoryMaps::default();
        for record in file.categories {
            for hypha in record.hyphae {
                maps.add(&record.name, &hypha);
            }
        }
        let n = maps.hyphae_by_category.len();
        *self.maps.write().expect("category lock poisoned") = maps;
        tracing::info!(n, "indexed categories");
        Ok(())
    }

    /// Unsorted names of all categories.
    pub fn list_of_categories(&self) -> Vec<String> {
        let maps = self.maps.read().expect("category lock poisoned");
        maps.hyphae_by_category.keys().cloned().collect()
    }

    /// The categories the hypha belongs to. Pass canonical names.
    pub fn categories_with_hypha(&self, hypha_name: &str) -> Vec<String> {
        let maps = self.maps.read().expect("category lock poisoned");
        maps.categories_by_hypha
            .get(hypha_name)
            .cloned()
            .unwrap_or_default()
    }

    /// The hyphae in the category. Empty means the category does not exist.
    pub fn hyphae_in_category(&self, cat_name: &str) -> Vec<String> {
        let maps = self.maps.read().expect("category lock poisoned");
        maps.hyphae_by_category
            .get(cat_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_hyphae_to_category(self: &Arc<Self>, cat_name: &str, hypha_names: &[String]) {
        {
            let mut maps = self.maps.write().expect("category lock poisoned");
            for hypha_name in hypha_names {
                maps.add(cat_name, hypha_name);
            }
        }
        self.save_async();
    }

    pub fn remove_hyphae_from_category(self: &Arc<Self>, cat_name: &str, hypha_names: &[String]) {
        {
            let mut maps = self.maps.write().expect("category lock poisoned");
            for hypha_name in hypha_names {
                maps.remove(cat_name, hypha_name);
            }
        }
        self.save_async();
    }

    pub fn remove_hyphae_from_all_categories(self: &Arc<Self>, hypha_names: &[String]) {
        {
            let mut maps = self.maps.write().expect("category lock poisoned");
            for hypha_name in hypha_names {
                let cats = maps
                    .categories_by_hypha
                    .get(hypha_name)
                    .cloned()
                    .unwrap_or_default();
                for cat in cats {
                    maps.remove(&cat, hypha_name);
                }
            }
        }
        self.save_async();
    }

    /// Rewrites every mention of each old name to the new name. With
    /// `leave_redirections`, each old name is additionally bound to the
    /// configured redirection category.
    pub fn rename_hyphae_in_all_categories(
        self: &Arc<Self>,
        leave_redirections: bool,
        pairs: &[(String, String)],
    ) {
        {
            let mut maps = self.maps.write().expect("category lock poisoned");
            for (old_name, new_name) in pairs {
                let cats = maps
                    .categories_by_hypha
                    .get(old_name)
                    .cloned()
                    .unwrap_or_default();
                for cat in cats {
                    maps.remove(&cat, old_name);
                    maps.add(&cat, new_name);
                }
                if leave_redirections {
                    maps.add(&self.redirection_category, old_name);
                }
            }
        }
        self.save_async();
    }

    /// Enqueues a snapshot save on the shared task pool, so mutations never
    /// wait on disk. Failures are logged and the next mutation retries.
    fn save_async(self: &Arc<Self>) {
        let store = Arc::clone(self);
        self.process.go(move || {
            if let Err(e) = store.save() {
                tracing::error!(path = %store.path.display(), err = %e, "failed to save categories");
            }
        });
    }

    /// Writes the full snapshot, overwriting atomically.
    pub fn save(&self) -> std::io::Result<()> {
        let file = {
            let maps = self.maps.read().expect("category lock poisoned");
            let mut categories: Vec<CategoryRecord> = maps
                .hyphae_by_category
                .iter()
                .map(|(name, hyphae)| CategoryRecord {
                    name: name.clone(),
                    hyphae: hyphae.clone(),
                })
                .collect();
            categories.sort_by(|a, b| name_compare(&a.name, &b.name));
            CategoriesFile { categories }
        };
        let blob = serde_json::to_vec_pretty(&file)
            .map_err(|e| std::io::Error::other(format!("failed to render categories: {e}")))?;
        util::atomic_write(&self.path, &blob)
    }
}

// Mutations take the write lock only for the in-memory maps; the async save
// runs entirely outside it.

#[cfg(test)]
mod tests {
    use super::*;

    fn new_store(dir: &std::path::Path) -> Arc<CategoryStore> {
        CategoryStore::new(
            dir.join("categories.json"),
            Arc::new(Lifecycle::new()),
            "redirection",
        )
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn membership_is_mirrored_both_ways() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("fungi", &names(&["amanita", "boletus"]));
        assert_eq!(store.hyphae_in_category("fungi"), names(&["amanita", "boletus"]));
        assert_eq!(store.categories_with_hypha("amanita"), names(&["fungi"]));
        assert_eq!(store.list_of_categories(), names(&["fungi"]));
    }

    #[test]
    fn empty_categories_disappear() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("c", &names(&["h"]));
        store.remove_hyphae_from_category("c", &names(&["h"]));
        assert!(store.list_of_categories().is_empty());
        assert!(store.categories_with_hypha("h").is_empty());
    }

    #[test]
    fn adding_twice_keeps_membership_unique() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("c", &names(&["h"]));
        store.add_hyphae_to_category("c", &names(&["h"]));
        assert_eq!(store.hyphae_in_category("c"), names(&["h"]));
    }

    #[test]
    fn removal_from_all_categories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("a", &names(&["h", "other"]));
        store.add_hyphae_to_category("b", &names(&["h"]));
        store.remove_hyphae_from_all_categories(&names(&["h"]));
        assert!(store.categories_with_hypha("h").is_empty());
        assert_eq!(store.hyphae_in_category("a"), names(&["other"]));
        assert!(store.hyphae_in_category("b").is_empty());
    }

    #[test]
    fn rename_rewrites_mentions() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("c", &names(&["old"]));
        store.rename_hyphae_in_all_categories(false, &[("old".to_string(), "new".to_string())]);
        assert_eq!(store.hyphae_in_category("c"), names(&["new"]));
        assert!(store.categories_with_hypha("old").is_empty());
    }

    #[test]
    fn rename_with_redirections_binds_old_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("c", &names(&["old"]));
        store.rename_hyphae_in_all_categories(true, &[("old".to_string(), "new".to_string())]);
        assert_eq!(store.hyphae_in_category("redirection"), names(&["old"]));
        assert_eq!(store.hyphae_in_category("c"), names(&["new"]));
    }

    #[test]
    fn snapshot_roundtrip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = new_store(tmp.path());
        store.add_hyphae_to_category("fungi", &names(&["amanita"]));
        store.add_hyphae_to_category("trees", &names(&["birch", "aspen"]));
        store.save().expect("save");

        let reloaded = new_store(tmp.path());
        reloaded.load().expect("load");
        assert_eq!(reloaded.hyphae_in_category("fungi"), names(&["amanita"]));
        assert_eq!(reloaded.categories_with_hypha("birch"), names(&["trees"]));
    }
}
