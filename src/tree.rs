//! HTML renderer for the subhypha tree shown under a hypha.
//!
//! Names cannot contain `<`, `>`, `"` or `'` (the canonical-name rules
//! forbid them), so they are written into the markup verbatim.

use crate::hyphae::{Hypha, HyphaIndex, beautiful_name};

/// Rendering caps; zero disables a cap.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

/// Renders the tree of `hypha`'s subhyphae and reports its previous and
/// next siblings for navigation.
pub fn tree(
    index: &HyphaIndex,
    hypha: &Hypha,
    root: &str,
    limits: TreeLimits,
) -> (String, String, String) {
    let (subs, prev, next) = index.subhyphae_with_siblings(hypha);
    let mut tb = TreeBuilder::new(hypha.canonical_name(), root, limits);
    let mut nodes = 0;
    for sub in &subs {
        if limits.max_nodes > 0 && nodes == limits.max_nodes {
            tb.truncate_all(sub.canonical_name());
            break;
        }
        tb.append(sub.canonical_name());
        nodes += 1;
    }
    tb.close();
    (tb.buf, prev, next)
}

struct Node {
    name: String,
    has_list: bool,
    truncated: bool,
}

struct TreeBuilder {
    buf: String,
    stack: Vec<Node>,
    parent: String,
    root: String,
    limits: TreeLimits,
}

impl TreeBuilder {
    fn new(parent: &str, root: &str, limits: TreeLimits) -> Self {
        Self {
            buf: String::new(),
            stack: Vec::new(),
            parent: parent.to_string(),
            root: root.to_string(),
            limits,
        }
    }

    fn append(&mut self, name: &str) {
        let mut i = self.parent.len() + 1;
        let mut level = 0;
        while i < name.len() {
            if self.limits.max_depth > 0 && level == self.limits.max_depth {
                self.truncate();
                return;
            }
            let (part_end, last) = match name[i..].find('/') {
                None => (name.len(), true),
                Some(j) => (i + j, false),
            };
            let part = &name[i..part_end];
            if level == self.stack.len() || self.stack[level].name != part {
                self.push(level, last, part, &name[..part_end]);
            }
            i = part_end + 1;
            level += 1;
        }
    }

    fn close(&mut self) {
        self.pop(self.stack.len());
    }

    fn write_truncation(&mut self) {
        self.buf.push_str("<li class=\"subhyphae__truncated\">⋯</li>\n");
    }

    fn create_list(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            if !top.has_list {
                top.has_list = true;
                self.buf.push_str("<ul>\n");
            }
        }
    }

    fn truncate(&mut self) {
        let needs_mark = self
            .stack
            .last()
            .map(|top| !top.truncated)
            .unwrap_or(false);
        if needs_mark {
            if let Some(top) = self.stack.last_mut() {
                top.truncated = true;
            }
            self.create_list();
            self.write_truncation();
        }
    }

    /// Called when the node cap hits: closes everything not shared with the
    /// next pending name and marks each closed level as truncated.
    fn truncate_all(&mut self, next: &str) {
        let rest = &next[(self.parent.len() + 1).min(next.len())..];
        let mut level = 0;
        for part in rest.split('/') {
            if level == self.stack.len() || self.stack[level].name != part {
                break;
            }
            level += 1;
        }
        self.pop(self.stack.len() - level);
        while !self.stack.is_empty() {
            self.truncate();
            self.pop(1);
        }
        self.write_truncation();
    }

    fn push(&mut self, level: usize, last: bool, name: &str, path: &str) {
        if level < self.stack.len() {
            self.pop(self.stack.len() - level);
        }
        self.create_list();
        self.buf
            .push_str("<li class=\"subhyphae__entry\">\n<a class=\"subhyphae__link");
        if !last {
            // Intermediate levels have no hypha of their own yet.
            self.buf.push_str(" wikilink_new");
        }
        self.buf.push_str("\" href=\"");
        self.buf.push_str(&self.root);
        self.buf.push_str("hypha/");
        self.buf.push_str(path);
        self.buf.push_str("\">");
        self.buf.push_str(&beautiful_name(name));
        self.buf.push_str("</a>\n");
        self.stack.push(Node {
            name: name.to_string(),
            has_list: false,
            truncated: false,
        });
    }

    fn pop(&mut self, count: usize) {
        for _ in 0..count {
            let node = self.stack.pop().expect("pop beyond the stack");
            if node.has_list {
                self.buf.push_str("</ul>\n");
            }
            self.buf.push_str("</li>\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::headers::HeaderStore;
    use crate::hyphae::ExistingHypha;

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
    fn renders_nested_subhyphae() {
        let index = index_with(&["t", "t/a", "t/a/x", "t/b"]);
        let (html, prev, next) = tree(
            &index,
            &index.by_name("t"),
            "/",
            TreeLimits::default(),
        );
        assert!(html.contains("href=\"/hypha/t/a\""));
        assert!(html.contains("href=\"/hypha/t/a/x\""));
        assert!(html.contains("href=\"/hypha/t/b\""));
        assert!(html.contains(">A</a>"));
        assert_eq!(html.matches("<ul>").count(), html.matches("</ul>").count());
        assert!(prev.is_empty());
        assert!(next.is_empty());
    }

    #[test]
    fn intermediate_levels_are_marked_new() {
        // t/ghost has no hypha of its own, only t/ghost/leaf exists.
        let index = index_with(&["t", "t/ghost/leaf"]);
        let (html, _, _) = tree(&index, &index.by_name("t"), "/", TreeLimits::default());
        assert!(html.contains("subhyphae__link wikilink_new\" href=\"/hypha/t/ghost\""));
        assert!(!html.contains("wikilink_new\" href=\"/hypha/t/ghost/leaf\""));
    }

    #[test]
    fn node_cap_truncates_the_tree() {
        let index = index_with(&["t", "t/a", "t/b", "t/c", "t/d"]);
        let (html, _, _) = tree(
            &index,
            &index.by_name("t"),
            "/",
            TreeLimits {
                max_depth: 0,
                max_nodes: 2,
            },
        );
        assert!(html.contains("subhyphae__truncated"));
        assert!(html.contains("/hypha/t/a"));
        assert!(!html.contains("/hypha/t/d"));
    }

    #[test]
    fn depth_cap_truncates_deep_branches() {
        let index = index_with(&["t", "t/a", "t/a/b", "t/a/b/c"]);
        let (html, _, _) = tree(
            &index,
            &index.by_name("t"),
            "/",
            TreeLimits {
                max_depth: 2,
                max_nodes: 0,
            },
        );
        assert!(html.contains("/hypha/t/a/b"));
        assert!(!html.contains("/hypha/t/a/b/c"));
        assert!(html.contains("subhyphae__truncated"));
    }

    #[test]
    fn empty_tree_renders_nothing() {
        let index = index_with(&["t"]);
        let (html, _, _) = tree(&index, &index.by_name("t"), "/", TreeLimits::default());
        assert!(html.is_empty());
    }
}
