//! Bounded full-text search over the working tree with `git grep`.
//!
//! Concurrency is capped by an atomic counter, the store read lock is held
//! for the whole query, and a per-query deadline turns long searches into
//! partial results rather than errors.

use std::path::Path;
use std::sync::atomic::Ordering;

use crate::history::{History, HistoryError, PipeOutcome};
use crate::mime;
use crate::search::SearchResults;

/// Decrements the concurrent-grep counter even on early returns, so a
/// timeout or cancellation never leaks a slot.
struct GrepSlot<'a>(&'a History);

impl Drop for GrepSlot<'_> {
    fn drop(&mut self) {
        self.0.grep_count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl History {
    fn grep_slot(&self) -> Result<Option<GrepSlot<'_>>, HistoryError> {
        let cap = self.grep_cfg.process_limit;
        if cap == 0 {
            return Ok(None);
        }
        loop {
            let count = self.grep_count.load(Ordering::SeqCst);
            if count >= cap {
                return Err(HistoryError::GrepLimit);
            }
            if self
                .grep_count
                .compare_exchange(count, count + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(Some(GrepSlot(self)));
            }
        }
    }

    /// Case-insensitive fixed-string search over hypha texts. At most
    /// `limit` hypha groups are returned; zero asks for nothing and gets
    /// empty results.
    pub fn grep(&self, query: &str, limit: usize) -> Result<SearchResults, HistoryError> {
        if limit == 0 {
            return Ok(SearchResults::new());
        }
        let _slot = self.grep_slot()?;
        let _read = self.lock.read().expect("history lock poisoned");

        let per_hypha = if self.grep_cfg.match_limit_per_hypha > 0 {
            self.grep_cfg.match_limit_per_hypha.to_string()
        } else {
            "-1".to_string()
        };
        let pathspec = if self.grep_cfg.ignore_media {
            "*.myco"
        } else {
            "*"
        };
        let args = [
            "grep",
            "-i",
            "-I",
            "-F",
            "--color",
            "-m",
            per_hypha.as_str(),
            "-e",
            query,
            "--",
            ":!.*",
            pathspec,
        ];

        let mut results = SearchResults::new();
        let mut limited = false;
        let line_length = self.grep_line_length;
        let per_hypha_cap = self.grep_cfg.match_limit_per_hypha;
        let outcome = self.git_pipe(&args, self.grep_cfg.timeout(), |line| {
            parse_grep_line(line, &mut results, line_length, per_hypha_cap)?;
            if !results.limit(limit) {
                limited = true;
                return Ok(false);
            }
            Ok(true)
        })?;

        match outcome {
            PipeOutcome::Stopped => {
                debug_assert!(limited);
            }
            PipeOutcome::TimedOut => {
                tracing::info!(query, "grep timeout");
                results.complete = false;
            }
            PipeOutcome::Completed(status) => {
                // Exit code 1 just means no matches.
                if !status.success() && status.code() != Some(1) {
                    tracing::error!(query, code = ?status.code(), "grep exited with error");
                    return Err(HistoryError::Backend {
                        args: args.iter().map(|s| s.to_string()).collect(),
                        code: status.code(),
                        output: String::new(),
                    });
                }
            }
        }
        Ok(results)
    }
}

/// Splits a line at ANSI color escapes, keeping the fragments between them
/// (including empty ones), like a regex split on the escape pattern.
fn split_ansi(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'[' {
            let mut j = i + 2;
            while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b';') {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'm' {
                parts.push(std::mem::take(&mut current));
                i = j + 1;
                continue;
            }
        }
        let ch_len = line[i..].chars().next().map_or(1, char::len_utf8);
        current.push_str(&line[i..i + ch_len]);
        i += ch_len;
    }
    parts.push(current);
    parts
}

/// Parses one colorized grep line. The required shape is
/// `<color>file<reset><color>:<reset>fragments…`: five parts with an empty
/// head, an empty separator part and a literal `:` between them.
fn parse_grep_line(
    line: &str,
    results: &mut SearchResults,
    line_length: i64,
    per_hypha_cap: u64,
) -> Result<(), HistoryError> {
    if line.is_empty() {
        return Ok(());
    }
    let parts = split_ansi(line);
    if parts.len() < 5 || !parts[0].is_empty() || !parts[2].is_empty() || parts[3] != ":" {
        tracing::error!(line, "failed to parse grep output");
        return Err(HistoryError::GrepParse {
            line: line.to_string(),
        });
    }
    let fname = &parts[1];
    let fragments = parts[4..].to_vec();
    let Some(file) = mime::data_from_filename(Path::new(fname)) else {
        return Ok(());
    };
    if !file.is_text {
        // Media files match bytes, not prose; skip them.
        return Ok(());
    }
    results.append(&file.name, fragments, line_length, per_hypha_cap);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::config::GrepConfig;
    use crate::process::Lifecycle;

    fn history_with(dir: &Path, grep_cfg: GrepConfig) -> History {
        let hist = History::start(dir, Arc::new(Lifecycle::new()), grep_cfg, 256)
            .expect("git must be installed for history tests");
        hist.init_repo().expect("init repo");
        hist
    }

    fn commit_file(hist: &History, path: PathBuf, data: &[u8]) {
        let mut op = hist.operation();
        op.with_user_name("tester").with_msg("seed");
        op.write_file(&path, data).expect("write");
        op.with_files(&[path]);
        op.apply().expect("commit");
    }

    #[test]
    fn split_ansi_mirrors_a_regex_split() {
        let line = "\x1b[35mfile.myco\x1b[m\x1b[36m:\x1b[mcontext \x1b[1;31mhit\x1b[m tail";
        let parts = split_ansi(line);
        assert_eq!(
            parts,
            vec!["", "file.myco", "", ":", "context ", "hit", " tail"]
        );
    }

    #[test]
    fn split_ansi_without_escapes_is_one_part() {
        assert_eq!(split_ansi("plain"), vec!["plain"]);
    }

    #[test]
    fn malformed_lines_are_a_parse_error() {
        let mut results = SearchResults::new();
        let err = parse_grep_line("not colorized at all", &mut results, -1, 0).unwrap_err();
        assert!(matches!(err, HistoryError::GrepParse { .. }));
    }

    #[test]
    fn media_hits_are_skipped() {
        let mut results = SearchResults::new();
        let line = "\x1b[35mpic.png\x1b[m\x1b[36m:\x1b[mgarbage \x1b[1;31mfoo\x1b[m";
        parse_grep_line(line, &mut results, -1, 0).expect("parsed");
        assert!(results.is_empty());
    }

    #[test]
    fn grep_finds_matches_across_hyphae() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history_with(tmp.path(), GrepConfig::default());
        commit_file(&hist, tmp.path().join("a.myco"), b"nothing here\n");
        commit_file(&hist, tmp.path().join("b.myco"), b"foo lives here\n");
        commit_file(&hist, tmp.path().join("c.myco"), b"foo again\nand foo\n");

        let results = hist.grep("foo", 10).expect("grep");
        assert!(results.complete);
        let names: Vec<_> = results.hyphae.iter().map(|h| h.hypha.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn grep_zero_limit_is_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history_with(tmp.path(), GrepConfig::default());
        let results = hist.grep("anything", 0).expect("grep");
        assert!(results.is_empty());
        assert!(results.complete);
    }

    #[test]
    fn grep_no_matches_is_not_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history_with(tmp.path(), GrepConfig::default());
        commit_file(&hist, tmp.path().join("a.myco"), b"quiet\n");
        let results = hist.grep("absent-needle", 10).expect("grep");
        assert!(results.is_empty());
        assert!(results.complete);
    }

    #[test]
    fn caps_mark_results_incomplete() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cfg = GrepConfig::default();
        cfg.match_limit_per_hypha = 2;
        let hist = history_with(tmp.path(), cfg);
        for i in 0..4 {
            let body = "foo\n".repeat(10);
            commit_file(&hist, tmp.path().join(format!("h{i}.myco")), body.as_bytes());
        }
        let results = hist.grep("foo", 2).expect("grep");
        assert!(!results.complete);
        assert_eq!(results.hyphae.len(), 2);
        for group in &results.hyphae {
            assert!(group.lines.len() <= 2);
        }
    }

    #[test]
    fn grep_slot_is_released_on_every_path() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cfg = GrepConfig::default();
        cfg.process_limit = 1;
        let hist = history_with(tmp.path(), cfg);
        commit_file(&hist, tmp.path().join("a.myco"), b"foo\n");
        for _ in 0..3 {
            hist.grep("foo", 10).expect("grep");
        }
        assert_eq!(hist.grep_count.load(Ordering::SeqCst), 0);
    }
}
