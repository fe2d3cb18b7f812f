//! Outbound-link extraction from hypha bodies.
//!
//! Understands the markup shapes that can reference another hypha: rocket
//! links (`=> target | display`), transclusions (`<= target | opts`) and
//! inline links (`[[target]]`, `[[target | display]]`). Everything else in
//! the body is ignored; rendering is not this module's business.

use crate::hyphae::canonical_name;

/// A rocket link as written: raw address plus the text to display for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RocketLink {
    pub target: String,
    pub display: String,
}

/// Whether the address points outside the wiki.
pub fn is_external(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:") || target.contains('>')
}

/// Resolves a link address against the hypha it was written in and returns
/// the canonical target name, or `None` for external addresses.
pub fn resolve_local(hypha_name: &str, target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() || is_external(target) {
        return None;
    }
    // Anchors point inside a page; the page itself is the link target.
    let target = target.split('#').next().unwrap_or(target);
    let resolved = if let Some(rest) = target.strip_prefix("./") {
        format!("{hypha_name}/{rest}")
    } else if let Some(rest) = target.strip_prefix("../") {
        match hypha_name.rsplit_once('/') {
            Some((parent, _)) => format!("{parent}/{rest}"),
            None => rest.to_string(),
        }
    } else {
        target.trim_start_matches('/').to_string()
    };
    let resolved = canonical_name(&resolved);
    if resolved.is_empty() {
        None
    } else {
        Some(resolved)
    }
}

/// Extracts the canonical names of all local hyphae the text links to.
/// Duplicates are preserved; callers working with sets deduplicate.
pub fn extract_links(hypha_name: &str, text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("=>") {
            if let Some(target) = resolve_local(hypha_name, address_of(rest)) {
                found.push(target);
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("<=") {
            if let Some(target) = resolve_local(hypha_name, address_of(rest)) {
                found.push(target);
            }
            continue;
        }
        extract_inline_links(hypha_name, trimmed, &mut found);
    }
    found
}

/// Extracts the rocket links of the text in order, with their display text.
/// Used for deriving the header links from the designated hypha.
pub fn extract_rockets(text: &str) -> Vec<RocketLink> {
    let mut rockets = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim_start().strip_prefix("=>") else {
            continue;
        };
        let (address, display) = split_address_display(rest);
        if address.is_empty() {
            continue;
        }
        rockets.push(RocketLink {
            target: address.to_string(),
            display: if display.is_empty() {
                address.to_string()
            } else {
                display.to_string()
            },
        });
    }
    rockets
}

fn address_of(rest: &str) -> &str {
    split_address_display(rest).0
}

fn split_address_display(rest: &str) -> (&str, &str) {
    match rest.split_once('|') {
        Some((address, display)) => (address.trim(), display.trim()),
        None => (rest.trim(), ""),
    }
}

fn extract_inline_links(hypha_name: &str, line: &str, found: &mut Vec<String>) {
    let mut rest = line;
    while let Some(start) = rest.find("[[") {
        let tail = &rest[start + 2..];
        let Some(end) = tail.find("]]") else {
            return;
        };
        let inner = &tail[..end];
        let (address, _) = split_address_display(inner);
        if let Some(target) = resolve_local(hypha_name, address) {
            found.push(target);
        }
        rest = &tail[end + 2..];
    }
}
