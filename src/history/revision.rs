//! Revision history queries: parsing the commit log, per-hypha revisions,
//! files at a revision and the primitive diff.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use time::OffsetDateTime;

use crate::history::{History, HistoryError, PipeOutcome};
use crate::mime;

/// A committed snapshot, as parsed from the log.
#[derive(Clone, Debug)]
pub struct Revision {
    /// Abbreviated commit hash.
    pub hash: String,
    /// Extracted from the author email's local part.
    pub username: String,
    pub time: OffsetDateTime,
    /// Single-line commit message.
    pub message: String,
    files_affected: OnceLock<Vec<String>>,
    hyphae_affected: OnceLock<Vec<String>>,
}

impl Revision {
    fn parse_line(line: &str) -> Option<Revision> {
        let mut parts = line.splitn(4, '\t');
        let hash = parts.next()?;
        let email = parts.next()?;
        let timestamp = parts.next()?;
        let message = parts.next()?;
        let username = email.split('@').next().unwrap_or(email);
        let unix: i64 = timestamp.parse().ok()?;
        let time = OffsetDateTime::from_unix_timestamp(unix).ok()?;
        Some(Revision {
            hash: hash.to_string(),
            username: username.to_string(),
            time,
            message: message.to_string(),
            files_affected: OnceLock::new(),
            hyphae_affected: OnceLock::new(),
        })
    }

    /// Repo-relative paths of the files this revision touched. Lazily
    /// fetched and cached; a backend failure caches an empty list.
    pub fn files_affected(&self, hist: &History) -> &[String] {
        if let Some(files) = self.files_affected.get() {
            return files;
        }
        let files = match hist.gitsh(&["diff-tree", "--no-commit-id", "--name-only", "-r", self.hash.as_str()])
        {
            Ok(out) => String::from_utf8_lossy(&out)
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };
        let _ = self.files_affected.set(files);
        self.files_affected.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of the hyphae this revision touched, deduplicated in file
    /// order.
    pub fn hyphae_affected(&self, hist: &History) -> &[String] {
        if let Some(hyphae) = self.hyphae_affected.get() {
            return hyphae;
        }
        let mut seen = std::collections::HashSet::new();
        let mut hyphae = Vec::new();
        for filename in self.files_affected(hist) {
            let Some((stem, _ext)) = filename.rsplit_once('.') else {
                continue;
            };
            if seen.insert(stem.to_string()) {
                hyphae.push(stem.to_string());
            }
        }
        let _ = self.hyphae_affected.set(hyphae);
        self.hyphae_affected.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// The `.myco` files this revision touched. Empty means no text changes.
    pub fn myco_files(&self, hist: &History) -> Vec<String> {
        self.files_affected(hist)
            .iter()
            .filter(|f| f.ends_with(".myco"))
            .cloned()
            .collect()
    }
}

/// The text and media file of a hypha as they were at some revision, as
/// repo-relative paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HyphaFilesAtRevision {
    pub text: Option<String>,
    pub media: Option<String>,
}

const LOG_FORMAT: &str = "--pretty=format:%h\t%ae\t%at\t%s";

impl History {
    fn git_log(&self, extra: &[&str], pathspec: Option<&str>) -> Result<Vec<Revision>, HistoryError> {
        let mut args = vec!["log", "--abbrev-commit", "--no-merges", LOG_FORMAT];
        args.extend_from_slice(extra);
        args.push("--");
        if let Some(p) = pathspec {
            args.push(p);
        }
        let out = match self.gitsh(&args) {
            Ok(out) => out,
            // A repository without commits has no HEAD yet; that is not an
            // error, there are just no revisions.
            Err(HistoryError::Backend { output, .. })
                if output.contains("bad revision 'HEAD'")
                    || output.contains("does not have any commits yet") =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let text = String::from_utf8_lossy(&out);
        let mut revs = Vec::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            match Revision::parse_line(line) {
                Some(rev) => revs.push(rev),
                None => {
                    tracing::warn!(line, "unparsable log line");
                }
            }
        }
        Ok(revs)
    }

    /// The `n` most recent revisions, newest first.
    pub fn recent_changes(&self, n: usize) -> Result<Vec<Revision>, HistoryError> {
        let mut stream = self.recent_changes_stream();
        let revs = stream.next_batch(n)?;
        tracing::info!(n = revs.len(), "found recent changes");
        Ok(revs)
    }

    /// A paginated stream over the whole history, newest first. A cursor
    /// hash remembers where the previous batch ended so nothing is re-read.
    pub fn recent_changes_stream(&self) -> RecentChanges<'_> {
        RecentChanges {
            hist: self,
            curr_hash: None,
            buf: std::collections::VecDeque::new(),
            finished: false,
        }
    }

    /// Revisions that touched the hypha, newest first. The log is restricted
    /// to the hypha's files via the `<name>.*` pathspec.
    pub fn revisions(&self, hypha_name: &str) -> Result<Vec<Revision>, HistoryError> {
        let pathspec = format!("{hypha_name}.*");
        let revs = self.git_log(&[], Some(&pathspec))?;
        tracing::info!(hypha_name, n = revs.len(), "found revisions");
        Ok(revs)
    }

    /// The file's bytes as committed at the given revision.
    pub fn file_at_revision(&self, path: &Path, hash: &str) -> Result<Vec<u8>, HistoryError> {
        let object = format!("{hash}:{}", self.shorter(path));
        self.gitsh(&["show", object.as_str()])
    }

    /// Finds the hypha's media file at a revision by listing the revision's
    /// tree and classifying entries by extension. Returns the repo-relative
    /// path and size of the unique media candidate.
    pub fn media_at_revision(
        &self,
        hypha_name: &str,
        hash: &str,
    ) -> Result<Option<(PathBuf, u64)>, HistoryError> {
        let mut found: Option<(PathBuf, u64)> = None;
        self.ls_tree(hypha_name, hash, |size, name| {
            let Some(file) = mime::data_from_filename(Path::new(name)) else {
                return Ok(true);
            };
            if file.is_text || file.name != hypha_name {
                return Ok(true);
            }
            let size: u64 = size.parse().map_err(|_| HistoryError::Parse {
                what: "ls-tree",
                line: format!("{size}\t{name}"),
            })?;
            found = Some((PathBuf::from(name), size));
            Ok(false)
        })?;
        Ok(found)
    }

    /// The hypha's text and media paths at the revision. Multiple candidates
    /// of a kind are reported and the first one wins.
    pub fn hypha_files_at_revision(
        &self,
        hypha_name: &str,
        hash: &str,
    ) -> Result<HyphaFilesAtRevision, HistoryError> {
        let mut files = HyphaFilesAtRevision::default();
        self.ls_tree(hypha_name, hash, |_size, name| {
            let Some(file) = mime::data_from_filename(Path::new(name)) else {
                return Ok(true);
            };
            if file.name != hypha_name {
                return Ok(true);
            }
            let slot = if file.is_text {
                &mut files.text
            } else {
                &mut files.media
            };
            match slot {
                None => *slot = Some(name.to_string()),
                Some(first) => tracing::warn!(
                    hypha_name,
                    revision = hash,
                    kind = if file.is_text { "text" } else { "media" },
                    file = %first,
                    file2 = name,
                    "multiple files of one kind for hypha at revision"
                ),
            }
            // Stop once both parts are known.
            Ok(if file.is_text {
                files.media.is_none()
            } else {
                files.text.is_none()
            })
        })?;
        Ok(files)
    }

    fn ls_tree<F>(&self, hypha_name: &str, hash: &str, mut visit: F) -> Result<(), HistoryError>
    where
        F: FnMut(&str, &str) -> Result<bool, HistoryError>,
    {
        let hypha_dir = match hypha_name.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/"),
            None => "./".to_string(),
        };
        let args = [
            "ls-tree",
            hash,
            "--full-tree",
            "--format",
            "%(objectsize)\t%(path)",
            "--",
            hypha_dir.as_str(),
        ];
        let outcome = self.git_pipe(&args, None, |line| {
            let Some((size, name)) = line.split_once('\t') else {
                return Err(HistoryError::Parse {
                    what: "ls-tree",
                    line: line.to_string(),
                });
            };
            if size == "-" {
                // Subtrees have no size; only blobs are hypha parts.
                return Ok(true);
            }
            visit(size, name)
        })?;
        if let PipeOutcome::Completed(status) = outcome {
            if !status.success() {
                return Err(HistoryError::Backend {
                    args: args.iter().map(|s| s.to_string()).collect(),
                    code: status.code(),
                    output: String::new(),
                });
            }
        }
        Ok(())
    }

    /// A unified diff of the file at the revision with one context line.
    pub fn primitive_diff_at_revision(
        &self,
        path: &Path,
        hash: &str,
    ) -> Result<String, HistoryError> {
        let rel = self.shorter(path);
        let out = self.gitsh(&["show", "--unified=1", "--no-color", hash, "--", rel.as_str()])?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// A resumable most-recent-first stream over the log. Batches of 30 are
/// buffered between [`Iterator::next`] calls.
pub struct RecentChanges<'a> {
    hist: &'a History,
    curr_hash: Option<String>,
    buf: std::collections::VecDeque<Revision>,
    finished: bool,
}

impl RecentChanges<'_> {
    /// The next `n` revisions, newest first; fewer when the history ends.
    pub fn next_batch(&mut self, n: usize) -> Result<Vec<Revision>, HistoryError> {
        let max_count = format!("--max-count={n}");
        let revs = match &self.curr_hash {
            None => self.hist.git_log(&[max_count.as_str(), "HEAD"], None)?,
            // The cursor is the last revision already returned; skip it.
            Some(hash) => self
                .hist
                .git_log(&[max_count.as_str(), "--skip=1", hash], None)?,
        };
        if let Some(last) = revs.last() {
            self.curr_hash = Some(last.hash.clone());
        }
        Ok(revs)
    }
}

impl Iterator for RecentChanges<'_> {
    type Item = Revision;

    fn next(&mut self) -> Option<Revision> {
        if self.buf.is_empty() && !self.finished {
            match self.next_batch(30) {
                Ok(revs) if revs.is_empty() => self.finished = true,
                Ok(revs) => self.buf.extend(revs),
                Err(e) => {
                    tracing::error!(err = %e, "failed to page the log");
                    self.finished = true;
                }
            }
        }
        self.buf.pop_front()
    }
}

/// Slices a single-file primitive diff into hunks at the `@@ -` markers.
pub fn split_primitive_diff(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let Some(idx) = text.find("@@ -") else {
        return result;
    };
    let mut rest = &text[idx..];
    loop {
        match rest.find("\n@@ -") {
            None => {
                result.push(rest.to_string());
                return result;
            }
            Some(idx) => {
                result.push(rest[..idx + 1].to_string());
                rest = &rest[idx + 1..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::GrepConfig;
    use crate::process::Lifecycle;

    fn history(dir: &Path) -> History {
        let hist = History::start(dir, Arc::new(Lifecycle::new()), GrepConfig::default(), 256)
            .expect("git must be installed for history tests");
        hist.init_repo().expect("init repo");
        hist
    }

    fn commit_file(hist: &History, dir: &Path, name: &str, data: &[u8], msg: &str, user: &str) {
        let path = dir.join(name);
        let mut op = hist.operation();
        op.with_user_name(user).with_msg(msg);
        op.write_file(&path, data).expect("write");
        op.with_files(&[path]);
        op.apply().expect("commit");
    }

    #[test]
    fn empty_repo_has_no_revisions() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        assert!(hist.recent_changes(5).expect("recent changes").is_empty());
    }

    #[test]
    fn log_is_parsed_most_recent_first() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        commit_file(&hist, tmp.path(), "a.myco", b"one\n", "Create ‘a’", "alice");
        commit_file(&hist, tmp.path(), "b.myco", b"two\n", "Create ‘b’", "bob");

        let revs = hist.recent_changes(10).expect("recent changes");
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].message, "Create ‘b’");
        assert_eq!(revs[0].username, "bob");
        assert_eq!(revs[1].message, "Create ‘a’");
        assert_eq!(revs[1].username, "alice");
    }

    #[test]
    fn revisions_are_scoped_to_the_hypha() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        commit_file(&hist, tmp.path(), "a.myco", b"one\n", "Create ‘a’", "u");
        commit_file(&hist, tmp.path(), "b.myco", b"two\n", "Create ‘b’", "u");
        commit_file(&hist, tmp.path(), "a.myco", b"three\n", "Edit ‘a’", "u");

        let revs = hist.revisions("a").expect("revisions");
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].message, "Edit ‘a’");
        assert_eq!(revs[0].hyphae_affected(&hist), ["a"]);
    }

    #[test]
    fn file_at_revision_reads_old_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        commit_file(&hist, tmp.path(), "x.myco", b"one\n", "Create ‘x’", "u");
        let first = hist.recent_changes(1).expect("log")[0].hash.clone();
        commit_file(&hist, tmp.path(), "x.myco", b"two\n", "Edit ‘x’", "u");

        let bytes = hist
            .file_at_revision(&tmp.path().join("x.myco"), &first)
            .expect("show");
        assert_eq!(bytes, b"one\n");
    }

    #[test]
    fn hypha_files_at_revision_classifies_parts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        commit_file(&hist, tmp.path(), "pic.myco", b"caption\n", "Create ‘pic’", "u");
        commit_file(&hist, tmp.path(), "pic.png", b"\x89PNG", "Media for ‘pic’", "u");
        let head = hist.recent_changes(1).expect("log")[0].hash.clone();

        let files = hist.hypha_files_at_revision("pic", &head).expect("ls-tree");
        assert_eq!(files.text.as_deref(), Some("pic.myco"));
        assert_eq!(files.media.as_deref(), Some("pic.png"));

        let media = hist.media_at_revision("pic", &head).expect("ls-tree");
        let (path, size) = media.expect("media found");
        assert_eq!(path, PathBuf::from("pic.png"));
        assert_eq!(size, 4);
    }

    #[test]
    fn primitive_diff_splits_into_hunks() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        commit_file(&hist, tmp.path(), "d.myco", b"one\n", "Create ‘d’", "u");
        commit_file(&hist, tmp.path(), "d.myco", b"two\n", "Edit ‘d’", "u");
        let head = hist.recent_changes(1).expect("log")[0].hash.clone();

        let diff = hist
            .primitive_diff_at_revision(&tmp.path().join("d.myco"), &head)
            .expect("diff");
        let hunks = split_primitive_diff(&diff);
        assert_eq!(hunks.len(), 1);
        assert!(hunks[0].starts_with("@@ -"));
        assert!(hunks[0].contains("-one"));
        assert!(hunks[0].contains("+two"));
    }

    #[test]
    fn recent_changes_stream_pages_without_rereads() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hist = history(tmp.path());
        for i in 0..5 {
            commit_file(
                &hist,
                tmp.path(),
                &format!("n{i}.myco"),
                b"x\n",
                &format!("Create ‘n{i}’"),
                "u",
            );
        }
        let mut stream = hist.recent_changes_stream();
        let first = stream.next_batch(2).expect("batch");
        let second = stream.next_batch(2).expect("batch");
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_ne!(first[1].hash, second[0].hash);
        assert_eq!(first[0].message, "Create ‘n4’");
        assert_eq!(second[0].message, "Create ‘n2’");

        let all: Vec<_> = hist.recent_changes_stream().collect();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn split_primitive_diff_handles_no_hunks() {
        assert!(split_primitive_diff("commit header only\n").is_empty());
    }
}
