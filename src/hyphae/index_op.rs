//! Index transactions.
//!
//! An [`IndexOp`] accumulates pending inserts, removals, renames, backlink
//! edits and a header-links override while holding the index write lock.
//! Nothing is visible to readers until `apply`; `abort` releases the lock
//! without mutating. Both are consuming, so a finished transaction cannot be
//! reused.

use std::collections::{HashMap, HashSet};
use std::sync::RwLockWriteGuard;

use crate::headers::HeaderLink;
use crate::hyphae::index::{IndexInner, backlink_compare, delete_hypha, insert_hypha};
use crate::hyphae::{ExistingHypha, HyphaIndex};
use crate::links;
use crate::util::{delete_sorted, insert_sorted};

/// A recorded backlink-graph edit. Computed when the mutation is recorded,
/// replayed in recording order at apply time.
enum BacklinkOp {
    Edit {
        name: String,
        old_links: Vec<String>,
        new_links: Vec<String>,
    },
    Delete {
        name: String,
        links: Vec<String>,
    },
    Rename {
        old_name: String,
        new_name: String,
        links: Vec<String>,
    },
}

impl BacklinkOp {
    fn apply(&self, backlinks: &mut HashMap<String, Vec<String>>) {
        match self {
            BacklinkOp::Edit {
                name,
                old_links,
                new_links,
            } => {
                let old: HashSet<&String> = old_links.iter().collect();
                let new: HashSet<&String> = new_links.iter().collect();
                for target in old.difference(&new) {
                    if let Some(set) = backlinks.get_mut(*target) {
                        delete_sorted(set, backlink_compare, std::slice::from_ref(name));
                    }
                }
                for target in new.difference(&old) {
                    let set = backlinks.entry((*target).clone()).or_default();
                    insert_sorted(set, backlink_compare, std::slice::from_ref(name));
                }
            }
            BacklinkOp::Delete { name, links } => {
                for target in links {
                    if let Some(set) = backlinks.get_mut(target) {
                        delete_sorted(set, backlink_compare, std::slice::from_ref(name));
                    }
                }
            }
            BacklinkOp::Rename {
                old_name,
                new_name,
                links,
            } => {
                for target in links {
                    if let Some(set) = backlinks.get_mut(target) {
                        delete_sorted(set, backlink_compare, std::slice::from_ref(old_name));
                        insert_sorted(set, backlink_compare, std::slice::from_ref(new_name));
                    }
                }
            }
        }
    }
}

/// A write transaction on the hypha index.
pub struct IndexOp<'a> {
    index: &'a HyphaIndex,
    guard: RwLockWriteGuard<'a, IndexInner>,
    remove: Vec<ExistingHypha>,
    insert: Vec<ExistingHypha>,
    rename: Vec<(ExistingHypha, ExistingHypha)>,
    backlink: Vec<BacklinkOp>,
    header_links: Option<Vec<HeaderLink>>,
}

impl<'a> IndexOp<'a> {
    pub(crate) fn new(index: &'a HyphaIndex, guard: RwLockWriteGuard<'a, IndexInner>) -> Self {
        Self {
            index,
            guard,
            remove: Vec::new(),
            insert: Vec::new(),
            rename: Vec::new(),
            backlink: Vec::new(),
            header_links: None,
        }
    }

    /// Peeks at the current index under the held write lock.
    pub fn exists(&self, hypha_name: &str) -> bool {
        self.guard.by_name.contains_key(hypha_name)
    }

    /// Subhyphae of `hypha_name` as currently indexed, under the held lock.
    pub fn subhyphae(&self, hypha_name: &str) -> Vec<ExistingHypha> {
        self.guard.subhyphae_of(hypha_name)
    }

    pub fn with_hypha_created(&mut self, h: ExistingHypha, text: &str) -> &mut Self {
        if !text.is_empty() {
            self.backlink.push(BacklinkOp::Edit {
                name: h.canonical_name().to_string(),
                old_links: Vec::new(),
                new_links: links::extract_links(h.canonical_name(), text),
            });
        }
        if h.canonical_name() == self.index.header_links_hypha {
            self.header_links = Some(self.index.headers.parse(text));
        }
        self.insert.push(h);
        self
    }

    pub fn with_hypha_deleted(&mut self, h: ExistingHypha, text: &str) -> &mut Self {
        if !text.is_empty() {
            self.backlink.push(BacklinkOp::Delete {
                name: h.canonical_name().to_string(),
                links: links::extract_links(h.canonical_name(), text),
            });
        }
        if h.canonical_name() == self.index.header_links_hypha && self.header_links.is_none() {
            self.header_links = Some(self.index.headers.default_links());
        }
        self.remove.push(h);
        self
    }

    pub fn with_hypha_renamed_pair(
        &mut self,
        old: ExistingHypha,
        new: ExistingHypha,
        text: &str,
    ) -> &mut Self {
        let old_name = old.canonical_name().to_string();
        let new_name = new.canonical_name().to_string();
        self.backlink.push(BacklinkOp::Rename {
            old_name: old_name.clone(),
            new_name: new_name.clone(),
            links: links::extract_links(&new_name, text),
        });
        if new_name == self.index.header_links_hypha {
            self.header_links = Some(self.index.headers.parse(text));
        } else if old_name == self.index.header_links_hypha {
            self.header_links = Some(self.index.headers.default_links());
        }
        self.rename.push((old, new));
        self
    }

    pub fn with_hypha_text_changed(
        &mut self,
        old: ExistingHypha,
        old_text: &str,
        new: ExistingHypha,
        new_text: &str,
    ) -> &mut Self {
        if old_text != new_text {
            self.backlink.push(BacklinkOp::Edit {
                name: old.canonical_name().to_string(),
                old_links: links::extract_links(old.canonical_name(), old_text),
                new_links: links::extract_links(old.canonical_name(), new_text),
            });
        }
        if old.canonical_name() != new.canonical_name() {
            return self.with_hypha_renamed_pair(old, new, new_text);
        }
        if new.canonical_name() == self.index.header_links_hypha {
            self.header_links = Some(self.index.headers.parse(new_text));
        }
        self.insert.push(new);
        self
    }

    pub fn with_hypha_media_changed(
        &mut self,
        _old: &ExistingHypha,
        new: ExistingHypha,
    ) -> &mut Self {
        self.insert.push(new);
        self
    }

    /// Applies removals, renames and inserts in that order, replays the
    /// backlink edits in recording order, installs the header-links override
    /// and releases the lock.
    pub fn apply(mut self) {
        let mut delta = 0isize;
        let inner = &mut *self.guard;
        for h in &self.remove {
            delta += delete_hypha(inner, h);
        }
        for (old, new) in &self.rename {
            delta += delete_hypha(inner, old);
            delta += insert_hypha(inner, new);
        }
        for h in &self.insert {
            delta += insert_hypha(inner, h);
        }
        for op in &self.backlink {
            op.apply(&mut inner.backlinks);
        }
        if let Some(links) = self.header_links.take() {
            self.index.headers.set(links);
        }
        self.index.add_count(delta);
    }

    /// Releases the lock without touching the index.
    pub fn abort(self) {}
}
