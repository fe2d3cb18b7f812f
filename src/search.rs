//! Search result aggregation and title search.
//!
//! A full-text match line arrives split at highlight boundaries: fragments
//! at even positions are context, fragments at odd positions are matches.
//! Truncation keeps as many whole fragments as fit the character budget and
//! prefers matches over left context.

use thiserror::Error;

use crate::history::HistoryError;
use crate::hyphae::HyphaIndex;
use crate::util::{truncate, truncate_left};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SearchError {
    #[error("full text search is disabled")]
    Disabled,

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// One match line, split at highlight boundaries.
pub type SearchResultLine = Vec<String>;

/// The matches of a single hypha.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub hypha: String,
    pub lines: Vec<SearchResultLine>,
}

/// All hyphae with matches, in backend output order.
#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    pub hyphae: Vec<SearchResult>,
    /// False when a cap or deadline cut the search short.
    pub complete: bool,
}

impl SearchResults {
    pub fn new() -> Self {
        Self {
            hyphae: Vec::new(),
            complete: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hyphae.is_empty()
    }

    /// Adds a match line under the hypha, starting a new group when the
    /// hypha changed. Returns false when the group is full.
    pub fn append(
        &mut self,
        hypha: &str,
        line: SearchResultLine,
        line_length: i64,
        line_limit: u64,
    ) -> bool {
        let needs_group = self.hyphae.last().is_none_or(|last| last.hypha != hypha);
        if needs_group {
            let lines = match truncate_line(line, line_length) {
                Some(line) => vec![line],
                None => Vec::new(),
            };
            self.hyphae.push(SearchResult {
                hypha: hypha.to_string(),
                lines,
            });
            return true;
        }
        let last = self.hyphae.last_mut().expect("group exists");
        if line_limit == 0 || (last.lines.len() as u64) < line_limit {
            if let Some(line) = truncate_line(line, line_length) {
                last.lines.push(line);
            }
            return true;
        }
        false
    }

    /// Caps the number of hypha groups. Returns false once the cap is hit,
    /// marking the results incomplete.
    pub fn limit(&mut self, limit: usize) -> bool {
        if self.hyphae.len() > limit {
            self.hyphae.truncate(limit);
            self.complete = false;
            return false;
        }
        true
    }
}

/// Fits the fragments into `max_length` characters. Context bordering the
/// kept window is ellipsized; a match that would overflow steals budget from
/// the left context rather than being dropped.
fn truncate_line(mut line: SearchResultLine, max_length: i64) -> Option<SearchResultLine> {
    if max_length == 0 {
        return None;
    }
    if max_length < 0 || line.is_empty() {
        return Some(line);
    }
    let max_length = max_length as usize;
    let mut left_length = max_length.min(line[0].chars().count());
    let mut right = 0usize;
    let mut right_length = 0usize;
    let mut length = left_length;
    for i in 1..line.len() {
        let l = line[i].chars().count();
        if length + l <= max_length {
            right = i;
            right_length = l;
            length += l;
        } else if i % 2 == 0 {
            right = i;
            right_length = max_length - length;
            break;
        } else if length - left_length + l <= max_length {
            right = i;
            right_length = l;
            left_length = max_length - (length - left_length + l);
            length = max_length;
        } else {
            break;
        }
    }
    let (truncated_text, was_cut) = truncate_left(&line[0], left_length);
    line[0] = truncated_text;
    if was_cut {
        line[0] = format!("…{}", line[0]);
    }
    if right > 0 {
        let (truncated_text, was_cut) = truncate(&line[right], right_length);
        line[right] = truncated_text;
        if was_cut || right < line.len() - 1 {
            line[right] = format!("{}…", line[right]);
        }
    }
    line.truncate(right + 1);
    Some(line)
}

/// Trims and lowercases a search query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Hypha names containing the normalized query, in pathographic order.
pub fn title_search(index: &HyphaIndex, query: &str) -> Vec<String> {
    index.names_containing(&normalize_query(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frags(parts: &[&str]) -> SearchResultLine {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn append_groups_by_hypha() {
        let mut res = SearchResults::new();
        res.append("a", frags(&["x"]), -1, 0);
        res.append("a", frags(&["y"]), -1, 0);
        res.append("b", frags(&["z"]), -1, 0);
        assert_eq!(res.hyphae.len(), 2);
        assert_eq!(res.hyphae[0].lines.len(), 2);
        assert!(res.complete);
    }

    #[test]
    fn per_hypha_line_cap() {
        let mut res = SearchResults::new();
        res.append("a", frags(&["1"]), -1, 2);
        res.append("a", frags(&["2"]), -1, 2);
        assert!(!res.append("a", frags(&["3"]), -1, 2));
        assert_eq!(res.hyphae[0].lines.len(), 2);
    }

    #[test]
    fn limit_marks_incomplete() {
        let mut res = SearchResults::new();
        res.append("a", frags(&["x"]), -1, 0);
        res.append("b", frags(&["x"]), -1, 0);
        assert!(res.limit(2));
        assert!(res.complete);
        res.append("c", frags(&["x"]), -1, 0);
        assert!(!res.limit(2));
        assert!(!res.complete);
        assert_eq!(res.hyphae.len(), 2);
    }

    #[test]
    fn truncation_keeps_the_match() {
        // context, match, context; budget forces the left context to shrink.
        let line = truncate_line(frags(&["aaaaaaaaaa", "match", "bbbb"]), 12).unwrap();
        assert_eq!(line[1], "match");
        assert!(line[0].starts_with('…'));
    }

    #[test]
    fn zero_budget_hides_lines() {
        assert_eq!(truncate_line(frags(&["abc"]), 0), None);
        let mut res = SearchResults::new();
        res.append("a", frags(&["abc"]), 0, 0);
        assert!(res.hyphae[0].lines.is_empty());
    }

    #[test]
    fn negative_budget_disables_truncation() {
        let line = truncate_line(frags(&[&"a".repeat(500)]), -1).unwrap();
        assert_eq!(line[0].chars().count(), 500);
    }

    #[test]
    fn short_lines_pass_through() {
        let line = truncate_line(frags(&["ab", "cd", "ef"]), 100).unwrap();
        assert_eq!(line, frags(&["ab", "cd", "ef"]));
    }

    #[test]
    fn query_normalization() {
        assert_eq!(normalize_query("  Apple Pie "), "apple pie");
    }
}
