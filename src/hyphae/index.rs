//! The in-memory hypha index: a pathographically sorted view of every
//! existing hypha plus the backlink graph.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::headers::HeaderStore;
use crate::hyphae::index_op::IndexOp;
use crate::hyphae::{ExistingHypha, Hypha};
use crate::util::pathographic_compare;

pub(crate) struct IndexInner {
    /// Sorted by pathographic order, strictly increasing by name.
    pub(crate) hyphae: Vec<ExistingHypha>,
    pub(crate) by_name: HashMap<String, ExistingHypha>,
    /// Hypha name to the sorted names of hyphae whose bodies link to it.
    /// Keys may be dangling: the target need not exist.
    pub(crate) backlinks: HashMap<String, Vec<String>>,
}

impl IndexInner {
    pub(crate) fn subhyphae_of(&self, name: &str) -> Vec<ExistingHypha> {
        let prefix = format!("{name}/");
        let mut i = match self.hyphae.binary_search_by(|h| h.compare_name(name)) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        let mut result = Vec::new();
        while i < self.hyphae.len() && self.hyphae[i].canonical_name().starts_with(&prefix) {
            result.push(self.hyphae[i].clone());
            i += 1;
        }
        result
    }

    /// The direct child of `parent_prefix` that contains the hypha at slice
    /// position `i`, or "" when there is none.
    fn child_at_index(&self, parent_prefix: &str, i: Option<usize>) -> String {
        let Some(i) = i else {
            return String::new();
        };
        let Some(h) = self.hyphae.get(i) else {
            return String::new();
        };
        let name = h.canonical_name();
        let Some(rest) = name.strip_prefix(parent_prefix) else {
            return String::new();
        };
        let child = match rest.find('/') {
            Some(j) => &rest[..j],
            None => rest,
        };
        format!("{parent_prefix}{child}")
    }
}

/// The index. One per wiki; every read-side query takes the read lock, every
/// mutation goes through an [`IndexOp`].
pub struct HyphaIndex {
    pub(crate) inner: RwLock<IndexInner>,
    count: AtomicIsize,
    pub(crate) headers: Arc<HeaderStore>,
    pub(crate) header_links_hypha: String,
}

impl HyphaIndex {
    pub fn new(headers: Arc<HeaderStore>, header_links_hypha: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                hyphae: Vec::new(),
                by_name: HashMap::new(),
                backlinks: HashMap::new(),
            }),
            count: AtomicIsize::new(0),
            headers,
            header_links_hypha: header_links_hypha.into(),
        }
    }

    /// Begins an index transaction, taking the write lock until the
    /// transaction is applied or aborted.
    pub fn operation(&self) -> IndexOp<'_> {
        IndexOp::new(self, self.inner.write().expect("index lock poisoned"))
    }

    /// Looks a hypha up by canonical name. Unknown names come back as the
    /// `Empty` variant; this is the only source of empty hyphae.
    pub fn by_name(&self, hypha_name: &str) -> Hypha {
        let inner = self.inner.read().expect("index lock poisoned");
        match inner.by_name.get(hypha_name) {
            Some(h) => Hypha::Existing(h.clone()),
            None => Hypha::empty(hypha_name),
        }
    }

    /// A uniformly random existing hypha.
    pub fn random(&self) -> Option<ExistingHypha> {
        let inner = self.inner.read().expect("index lock poisoned");
        if inner.hyphae.is_empty() {
            return None;
        }
        let i = rand::thread_rng().gen_range(0..inner.hyphae.len());
        Some(inner.hyphae[i].clone())
    }

    /// Checks that none of the names is taken; returns the first taken name
    /// otherwise.
    pub fn first_taken_name(&self, hypha_names: &[String]) -> Option<String> {
        let inner = self.inner.read().expect("index lock poisoned");
        hypha_names
            .iter()
            .find(|n| inner.by_name.contains_key(n.as_str()))
            .cloned()
    }

    /// O(1): the count is maintained by index transactions and the bulk scan.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst).max(0) as usize
    }

    pub(crate) fn add_count(&self, delta: isize) {
        self.count.fetch_add(delta, Ordering::SeqCst);
    }

    pub(crate) fn set_count(&self, value: usize) {
        self.count.store(value as isize, Ordering::SeqCst);
    }

    pub fn backlinks_count(&self, hypha_name: &str) -> usize {
        let inner = self.inner.read().expect("index lock poisoned");
        inner.backlinks.get(hypha_name).map_or(0, Vec::len)
    }

    /// Names of the hyphae linking to `hypha_name`, pathographically sorted.
    pub fn backlinks_for(&self, hypha_name: &str) -> Vec<String> {
        let name = super::canonical_name(hypha_name);
        let inner = self.inner.read().expect("index lock poisoned");
        inner.backlinks.get(&name).cloned().unwrap_or_default()
    }

    /// Names of existing hyphae nothing links to, in pathographic order.
    pub fn orphans(&self) -> Vec<String> {
        let inner = self.inner.read().expect("index lock poisoned");
        inner
            .hyphae
            .iter()
            .map(ExistingHypha::canonical_name)
            .filter(|name| inner.backlinks.get(*name).is_none_or(Vec::is_empty))
            .map(str::to_string)
            .collect()
    }

    /// A snapshot of every existing hypha, in pathographic order.
    pub fn existing_hyphae(&self) -> Vec<ExistingHypha> {
        self.inner.read().expect("index lock poisoned").hyphae.clone()
    }

    /// Hypha names containing `query`, in pathographic order.
    pub fn names_containing(&self, query: &str) -> Vec<String> {
        let inner = self.inner.read().expect("index lock poisoned");
        inner
            .hyphae
            .iter()
            .map(ExistingHypha::canonical_name)
            .filter(|name| name.contains(query))
            .map(str::to_string)
            .collect()
    }

    /// Every hypha strictly under `hypha`, found by binary search for the
    /// parent and a scan while the `name/` prefix holds.
    pub fn subhyphae(&self, hypha: &Hypha) -> Vec<ExistingHypha> {
        let inner = self.inner.read().expect("index lock poisoned");
        inner.subhyphae_of(hypha.canonical_name())
    }

    /// Like [`HyphaIndex::subhyphae`], and also reports the hypha's previous
    /// and next siblings under its parent ("" when absent), for tree
    /// navigation.
    pub fn subhyphae_with_siblings(&self, hypha: &Hypha) -> (Vec<ExistingHypha>, String, String) {
        let name = hypha.canonical_name();
        let parent_prefix = match name.rsplit_once('/') {
            Some((parent, _)) => format!("{parent}/"),
            None => String::new(),
        };
        let inner = self.inner.read().expect("index lock poisoned");
        let (mut i, found) = match inner.hyphae.binary_search_by(|h| h.compare_name(name)) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        };
        let prev = inner.child_at_index(&parent_prefix, i.checked_sub(1));
        if found {
            i += 1;
        }
        let prefix = format!("{name}/");
        let mut subs = Vec::new();
        while i < inner.hyphae.len() && inner.hyphae[i].canonical_name().starts_with(&prefix) {
            subs.push(inner.hyphae[i].clone());
            i += 1;
        }
        let next = inner.child_at_index(&parent_prefix, Some(i));
        (subs, prev, next)
    }

    /// Swaps in a freshly scanned state. Used by the bulk rebuild only.
    pub(crate) fn replace_all(
        &self,
        mut hyphae: Vec<ExistingHypha>,
        by_name: HashMap<String, ExistingHypha>,
        backlinks: HashMap<String, Vec<String>>,
    ) {
        hyphae.sort_by(ExistingHypha::compare);
        let count = hyphae.len();
        let mut inner = self.inner.write().expect("index lock poisoned");
        inner.hyphae = hyphae;
        inner.by_name = by_name;
        inner.backlinks = backlinks;
        drop(inner);
        self.set_count(count);
    }
}

pub(crate) fn insert_hypha(inner: &mut IndexInner, h: &ExistingHypha) -> isize {
    let fresh = inner
        .by_name
        .insert(h.canonical_name().to_string(), h.clone())
        .is_none();
    crate::util::insert_sorted(&mut inner.hyphae, ExistingHypha::compare, std::slice::from_ref(h));
    if fresh { 1 } else { 0 }
}

pub(crate) fn delete_hypha(inner: &mut IndexInner, h: &ExistingHypha) -> isize {
    let existed = inner.by_name.remove(h.canonical_name()).is_some();
    crate::util::delete_sorted(&mut inner.hyphae, ExistingHypha::compare, std::slice::from_ref(h));
    if existed { -1 } else { 0 }
}

pub(crate) fn backlink_compare(a: &String, b: &String) -> std::cmp::Ordering {
    pathographic_compare(a, b)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::headers::HeaderStore;

    fn index_with(names: &[&str]) -> HyphaIndex {
        let index = HyphaIndex::new(Arc::new(HeaderStore::new("/")), "header_links");
        let dir = Path::new("/w/wiki.git");
        let mut op = index.operation();
        for name in names {
            op.with_hypha_created(ExistingHypha::new_textual(dir, *name), "");
        }
        op.apply();
        index
    }

    #[test]
    fn by_name_returns_empty_for_unknown() {
        let index = index_with(&["a"]);
        assert!(index.by_name("missing").is_empty());
        assert!(!index.by_name("a").is_empty());
    }

    #[test]
    fn index_stays_sorted_and_counted() {
        let index = index_with(&["b", "a/c", "a", "a2"]);
        let names: Vec<_> = index
            .existing_hyphae()
            .iter()
            .map(|h| h.canonical_name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "a/c", "a2", "b"]);
        assert_eq!(index.count(), 4);
    }

    #[test]
    fn subhyphae_streams_the_prefix_range() {
        let index = index_with(&["a", "a/b", "a/b/c", "a2", "ab"]);
        let subs: Vec<_> = index
            .subhyphae(&index.by_name("a"))
            .iter()
            .map(|h| h.canonical_name().to_string())
            .collect();
        assert_eq!(subs, vec!["a/b", "a/b/c"]);
    }

    #[test]
    fn siblings_are_reported_around_the_hypha() {
        let index = index_with(&["t/a", "t/b", "t/b/x", "t/c"]);
        let (subs, prev, next) = index.subhyphae_with_siblings(&index.by_name("t/b"));
        let subs: Vec<_> = subs.iter().map(|h| h.canonical_name().to_string()).collect();
        assert_eq!(subs, vec!["t/b/x"]);
        assert_eq!(prev, "t/a");
        assert_eq!(next, "t/c");
    }

    #[test]
    fn random_on_empty_index_is_none() {
        let index = index_with(&[]);
        assert!(index.random().is_none());
        let index = index_with(&["only"]);
        assert_eq!(index.random().unwrap().canonical_name(), "only");
    }

    #[test]
    fn first_taken_name_reports_collisions() {
        let index = index_with(&["a", "b"]);
        assert_eq!(
            index.first_taken_name(&["x".to_string(), "b".to_string()]),
            Some("b".to_string())
        );
        assert_eq!(index.first_taken_name(&["x".to_string()]), None);
    }
}
