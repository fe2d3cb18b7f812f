//! Bulk index rebuild: walk the hyphae directory, classify every file, and
//! swap the fresh maps in atomically.
//!
//! The walker runs as a background task feeding a bounded channel, so
//! reading file bodies and assembling the maps overlap. The walk holds a
//! revision-store read batch for its whole duration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::{Sender, bounded};
use thiserror::Error;

use crate::history::History;
use crate::hyphae::{ExistingHypha, Hypha, HyphaIndex, is_valid_name};
use crate::links;
use crate::mime;
use crate::process::Lifecycle;
use crate::util::pathographic_compare;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    #[error("failed to index directory '{path}': {reason}")]
    Walk { path: String, reason: String },

    #[error("failed to index hypha '{hypha}' ({path}): {reason}")]
    Read {
        hypha: String,
        path: String,
        reason: String,
    },
}

struct FoundFile {
    hypha: String,
    path: std::path::PathBuf,
    text: Vec<u8>,
    is_text: bool,
}

enum ScanItem {
    File(FoundFile),
    Failed(ScanError),
}

impl HyphaIndex {
    /// Rescans the hyphae directory and replaces the whole index state:
    /// hypha slice, name map, backlink map and count.
    pub fn rebuild(&self, hist: &Arc<History>, process: &Arc<Lifecycle>) -> Result<(), ScanError> {
        let (tx, rx) = bounded::<ScanItem>(8);
        {
            let hist = Arc::clone(hist);
            let walker_process = Arc::clone(process);
            process.go(move || {
                let hop = hist.read_operation();
                let root = hist.hyphae_dir().to_path_buf();
                if let Err(e) = walk(&hop, &walker_process, &tx, &root, &root) {
                    let _ = tx.send(ScanItem::Failed(e));
                }
                drop(hop);
            });
        }

        let mut by_name: HashMap<String, ExistingHypha> = HashMap::new();
        let mut backlinks: HashMap<String, Vec<String>> = HashMap::new();
        let mut failure = None;
        for item in rx {
            let file = match item {
                ScanItem::File(file) => file,
                ScanItem::Failed(e) => {
                    failure = Some(e);
                    break;
                }
            };
            let stored = match by_name.get(&file.hypha) {
                None => Hypha::empty(file.hypha.clone()),
                Some(h) => {
                    let collides = match h {
                        ExistingHypha::Textual { .. } => file.is_text,
                        ExistingHypha::Media { .. } => !file.is_text,
                    };
                    if collides {
                        // Two files of one kind claim the hypha; first wins.
                        tracing::warn!(
                            hypha = %file.hypha,
                            using_files = ?h.file_paths(),
                            instead_of = %file.path.display(),
                            "file collision"
                        );
                        continue;
                    }
                    Hypha::Existing(h.clone())
                }
            };
            let updated = if file.is_text {
                index_backlinks(&file.hypha, &file.text, &mut backlinks);
                stored.with_text_path(file.path)
            } else {
                stored.with_media_path(file.path)
            };
            by_name.insert(file.hypha, updated);
        }
        if let Some(e) = failure {
            tracing::error!(err = %e, "failed to index hyphae");
            return Err(e);
        }

        let hyphae: Vec<ExistingHypha> = by_name.values().cloned().collect();
        let n = hyphae.len();
        self.replace_all(hyphae, by_name, backlinks);
        tracing::info!(n, "indexed hyphae");
        Ok(())
    }
}

fn index_backlinks(name: &str, text: &[u8], backlinks: &mut HashMap<String, Vec<String>>) {
    let text = String::from_utf8_lossy(text);
    for link in links::extract_links(name, &text) {
        let set = backlinks.entry(link).or_default();
        if let Err(i) = set.binary_search_by(|probe| pathographic_compare(probe, name)) {
            set.insert(i, name.to_string());
        }
    }
}

fn walk(
    hop: &crate::history::ReadOp<'_>,
    process: &Lifecycle,
    tx: &Sender<ScanItem>,
    dir: &Path,
    root: &Path,
) -> Result<(), ScanError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScanError::Walk {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    for entry in entries {
        if process.is_cancelled() {
            return Ok(());
        }
        let entry = entry.map_err(|e| ScanError::Walk {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        // Directories that cannot be part of a hypha name are left alone;
        // .git in particular is administrative.
        if is_dir {
            if is_valid_name(&name) && name != ".git" {
                walk(hop, process, tx, &path, root)?;
            }
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(&path);
        let Some(file) = mime::data_from_filename(rel) else {
            continue;
        };
        let text = if file.is_text {
            hop.read_file(&path).map_err(|e| ScanError::Read {
                hypha: file.name.clone(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            Vec::new()
        };
        let item = ScanItem::File(FoundFile {
            hypha: file.name,
            path,
            text,
            is_text: file.is_text,
        });
        if tx.send(item).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::GrepConfig;
    use crate::headers::HeaderStore;

    fn setup(dir: &Path) -> (Arc<History>, Arc<Lifecycle>, HyphaIndex) {
        let process = Arc::new(Lifecycle::new());
        let hist = Arc::new(
            History::start(dir, Arc::clone(&process), GrepConfig::default(), 256)
                .expect("git must be installed for scan tests"),
        );
        hist.init_repo().expect("init repo");
        let index = HyphaIndex::new(Arc::new(HeaderStore::new("/")), "header_links");
        (hist, process, index)
    }

    fn write(dir: &Path, rel: &str, data: &[u8]) {
        crate::util::write_file(&dir.join(rel), data).expect("write");
    }

    #[test]
    fn rebuild_classifies_text_and_media() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (hist, process, index) = setup(tmp.path());
        write(tmp.path(), "apple.myco", b"=> pear\n");
        write(tmp.path(), "apple.png", b"img");
        write(tmp.path(), "pear.myco", b"juicy\n");
        write(tmp.path(), "garden/shed.myco", b"=> apple\n");

        index.rebuild(&hist, &process).expect("rebuild");
        assert_eq!(index.count(), 3);
        assert!(matches!(
            index.by_name("apple"),
            Hypha::Existing(ExistingHypha::Media { .. })
        ));
        assert_eq!(index.backlinks_for("pear"), vec!["apple"]);
        assert_eq!(index.backlinks_for("apple"), vec!["garden/shed"]);
        assert_eq!(index.orphans(), vec!["garden/shed"]);
    }

    #[test]
    fn rebuild_skips_dotfiles_and_git_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (hist, process, index) = setup(tmp.path());
        write(tmp.path(), "real.myco", b"x\n");
        write(tmp.path(), ".hidden.myco", b"x\n");
        write(tmp.path(), "noext", b"x\n");

        index.rebuild(&hist, &process).expect("rebuild");
        assert_eq!(index.count(), 1);
        assert!(!index.by_name("real").is_empty());
    }

    #[test]
    fn rebuild_replaces_previous_state() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (hist, process, index) = setup(tmp.path());
        write(tmp.path(), "old.myco", b"x\n");
        index.rebuild(&hist, &process).expect("rebuild");
        assert_eq!(index.count(), 1);

        std::fs::remove_file(tmp.path().join("old.myco")).expect("rm");
        write(tmp.path(), "new.myco", b"y\n");
        index.rebuild(&hist, &process).expect("rebuild");
        assert_eq!(index.count(), 1);
        assert!(index.by_name("old").is_empty());
        assert!(!index.by_name("new").is_empty());
    }
}
