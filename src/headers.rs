//! Header links: the navigation bar derived from a designated hypha.
//!
//! The derived list is cached here and swapped atomically when an index
//! transaction touches the header-links hypha.

use std::sync::RwLock;

use crate::hyphae::canonical_name;
use crate::links;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderLink {
    pub href: String,
    pub display: String,
}

impl HeaderLink {
    pub fn new(href: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            display: display.into(),
        }
    }
}

/// Cache of the current header links.
pub struct HeaderStore {
    root: String,
    links: RwLock<Vec<HeaderLink>>,
}

impl HeaderStore {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let links = RwLock::new(default_header_links(&root));
        Self { root, links }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn links(&self) -> Vec<HeaderLink> {
        self.links.read().expect("header links lock poisoned").clone()
    }

    pub fn set(&self, links: Vec<HeaderLink>) {
        *self.links.write().expect("header links lock poisoned") = links;
    }

    pub fn default_links(&self) -> Vec<HeaderLink> {
        default_header_links(&self.root)
    }

    /// Re-derives the header links from the designated hypha's text. Empty
    /// text falls back to the defaults.
    pub fn parse(&self, text: &str) -> Vec<HeaderLink> {
        if text.is_empty() {
            return self.default_links();
        }
        parse_header_links(&self.root, text)
    }
}

/// The default set: recent changes, the hypha list, a random hypha, help and
/// categories.
pub fn default_header_links(root: &str) -> Vec<HeaderLink> {
    vec![
        HeaderLink::new(format!("{root}recent-changes"), "Recent changes"),
        HeaderLink::new(format!("{root}list"), "All hyphae"),
        HeaderLink::new(format!("{root}random"), "Random"),
        HeaderLink::new(format!("{root}help"), "Help"),
        HeaderLink::new(format!("{root}category"), "Categories"),
    ]
}

/// Turns every rocket link of the text into a header link. Local targets
/// point into the wiki; external ones keep their address.
pub fn parse_header_links(root: &str, text: &str) -> Vec<HeaderLink> {
    links::extract_rockets(text)
        .into_iter()
        .map(|rocket| {
            let href = if links::is_external(&rocket.target) {
                rocket.target.clone()
            } else {
                format!(
                    "{root}hypha/{}",
                    canonical_name(rocket.target.trim_start_matches('/'))
                )
            };
            HeaderLink::new(href, rocket.display)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_until_set() {
        let store = HeaderStore::new("/");
        assert_eq!(store.links(), default_header_links("/"));
    }

    #[test]
    fn parse_mixes_local_and_external_targets() {
        let store = HeaderStore::new("/");
        let parsed = store.parse("=> Home Page | Home\n=> https://example.org | Example\n");
        assert_eq!(
            parsed,
            vec![
                HeaderLink::new("/hypha/home_page", "Home"),
                HeaderLink::new("https://example.org", "Example"),
            ]
        );
    }

    #[test]
    fn empty_text_falls_back_to_defaults() {
        let store = HeaderStore::new("/");
        assert_eq!(store.parse(""), store.default_links());
    }

    #[test]
    fn set_swaps_the_cache() {
        let store = HeaderStore::new("/");
        store.set(vec![HeaderLink::new("/hypha/a", "A")]);
        assert_eq!(store.links(), vec![HeaderLink::new("/hypha/a", "A")]);
    }
}
