//! The hypha variant type and the naming rules every store obeys.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};

use crate::history::History;
use crate::util::{FileReader, pathographic_compare};

/// Characters that may never appear in a hypha name.
const FORBIDDEN_CHARS: &str = "?!:#@><*|\"'&%{}";

/// Makes a name canonical: lowercase, spaces become underscores.
///
/// Canonicalization is idempotent: `canonical_name(canonical_name(x)) ==
/// canonical_name(x)`.
pub fn canonical_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Makes the ugly canonical name look presentable: the last path segment with
/// underscores turned into spaces and the first letter capitalized.
pub fn beautiful_name(ugly_name: &str) -> String {
    let last = ugly_name.rsplit('/').next().unwrap_or(ugly_name);
    let spaced = last.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        None => spaced,
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Checks a name for forbidden characters and path traversals.
pub fn is_valid_name(hypha_name: &str) -> bool {
    if hypha_name.is_empty() || hypha_name.chars().any(|c| FORBIDDEN_CHARS.contains(c)) {
        return false;
    }
    hypha_name
        .split('/')
        .all(|segment| segment != ".git" && segment != ".." && segment != ".")
}

/// Where the hypha's text part lives.
pub fn text_file_path(hyphae_dir: &Path, hypha_name: &str) -> PathBuf {
    hyphae_dir.join(format!("{hypha_name}.myco"))
}

/// Derives the file path a hypha part gets after its hypha is renamed: the
/// first occurrence of the old name in the repo-relative path is replaced
/// with the new name.
fn rename_hypha_file(
    hyphae_dir: &Path,
    path: &Path,
    old_name: &str,
    new_name: &str,
) -> PathBuf {
    let rel = path.strip_prefix(hyphae_dir).unwrap_or(path);
    let rel = canonical_name(&rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));
    let renamed = rel.replacen(old_name, new_name, 1);
    hyphae_dir.join(renamed)
}

/// A hypha that is stored in the index: it has a text part, a media part,
/// or both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExistingHypha {
    Textual {
        name: String,
        text_path: PathBuf,
    },
    Media {
        name: String,
        text_path: Option<PathBuf>,
        media_path: PathBuf,
    },
}

impl ExistingHypha {
    /// A textual hypha at the conventional path for its name.
    pub fn new_textual(hyphae_dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let text_path = text_file_path(hyphae_dir, &name);
        ExistingHypha::Textual { name, text_path }
    }

    pub fn canonical_name(&self) -> &str {
        match self {
            ExistingHypha::Textual { name, .. } | ExistingHypha::Media { name, .. } => name,
        }
    }

    pub fn has_text_file(&self) -> bool {
        match self {
            ExistingHypha::Textual { .. } => true,
            ExistingHypha::Media { text_path, .. } => text_path.is_some(),
        }
    }

    /// The text part path, computed from the name when the hypha does not
    /// have one yet.
    pub fn text_file_path(&self, hyphae_dir: &Path) -> PathBuf {
        match self {
            ExistingHypha::Textual { text_path, .. } => text_path.clone(),
            ExistingHypha::Media {
                name, text_path, ..
            } => text_path
                .clone()
                .unwrap_or_else(|| text_file_path(hyphae_dir, name)),
        }
    }

    pub fn media_file_path(&self) -> Option<&Path> {
        match self {
            ExistingHypha::Textual { .. } => None,
            ExistingHypha::Media { media_path, .. } => Some(media_path),
        }
    }

    /// The files backing this hypha, text part first.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        match self {
            ExistingHypha::Textual { text_path, .. } => vec![text_path.clone()],
            ExistingHypha::Media {
                text_path,
                media_path,
                ..
            } => {
                let mut paths = Vec::with_capacity(2);
                if let Some(p) = text_path {
                    paths.push(p.clone());
                }
                paths.push(media_path.clone());
                paths
            }
        }
    }

    /// Reads the text part through `reader`. A missing file reads as "".
    pub fn text(&self, reader: &impl FileReader) -> io::Result<String> {
        let path = match self {
            ExistingHypha::Textual { text_path, .. } => text_path,
            ExistingHypha::Media {
                text_path: Some(p), ..
            } => p,
            ExistingHypha::Media { .. } => return Ok(String::new()),
        };
        match reader.read_file(path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// The same hypha under a new name, file paths re-derived. Pure: nothing
    /// is renamed on disk.
    pub fn with_name(&self, hyphae_dir: &Path, name: &str) -> ExistingHypha {
        let name = canonical_name(name);
        match self {
            ExistingHypha::Textual {
                name: old,
                text_path,
            } => ExistingHypha::Textual {
                text_path: rename_hypha_file(hyphae_dir, text_path, old, &name),
                name,
            },
            ExistingHypha::Media {
                name: old,
                text_path,
                media_path,
            } => ExistingHypha::Media {
                text_path: text_path
                    .as_ref()
                    .map(|p| rename_hypha_file(hyphae_dir, p, old, &name)),
                media_path: rename_hypha_file(hyphae_dir, media_path, old, &name),
                name,
            },
        }
    }

    pub fn with_text_path(&self, text_path: PathBuf) -> ExistingHypha {
        match self {
            ExistingHypha::Textual { name, .. } => ExistingHypha::Textual {
                name: name.clone(),
                text_path,
            },
            ExistingHypha::Media {
                name, media_path, ..
            } => ExistingHypha::Media {
                name: name.clone(),
                text_path: Some(text_path),
                media_path: media_path.clone(),
            },
        }
    }

    pub fn with_media_path(&self, media_path: PathBuf) -> ExistingHypha {
        match self {
            ExistingHypha::Textual { name, text_path } => ExistingHypha::Media {
                name: name.clone(),
                text_path: Some(text_path.clone()),
                media_path,
            },
            ExistingHypha::Media {
                name, text_path, ..
            } => ExistingHypha::Media {
                name: name.clone(),
                text_path: text_path.clone(),
                media_path,
            },
        }
    }

    /// Drops the media part. A media hypha with text becomes textual; one
    /// without becomes empty.
    pub fn without_media(&self) -> Hypha {
        match self {
            ExistingHypha::Textual { .. } => Hypha::Existing(self.clone()),
            ExistingHypha::Media {
                name,
                text_path: Some(text_path),
                ..
            } => Hypha::Existing(ExistingHypha::Textual {
                name: name.clone(),
                text_path: text_path.clone(),
            }),
            ExistingHypha::Media { name, .. } => Hypha::empty(name.clone()),
        }
    }

    pub fn compare(&self, other: &ExistingHypha) -> Ordering {
        pathographic_compare(self.canonical_name(), other.canonical_name())
    }

    pub fn compare_name(&self, name: &str) -> Ordering {
        pathographic_compare(self.canonical_name(), name)
    }
}

/// Any hypha you can name, existing or not. Lookups for unknown names return
/// the `Empty` case; it is never stored in the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hypha {
    Empty { name: String },
    Existing(ExistingHypha),
}

impl Hypha {
    pub fn empty(name: impl Into<String>) -> Hypha {
        Hypha::Empty { name: name.into() }
    }

    pub fn canonical_name(&self) -> &str {
        match self {
            Hypha::Empty { name } => name,
            Hypha::Existing(h) => h.canonical_name(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Hypha::Empty { .. })
    }

    pub fn as_existing(&self) -> Option<&ExistingHypha> {
        match self {
            Hypha::Empty { .. } => None,
            Hypha::Existing(h) => Some(h),
        }
    }

    pub fn text(&self, reader: &impl FileReader) -> io::Result<String> {
        match self {
            Hypha::Empty { .. } => Ok(String::new()),
            Hypha::Existing(h) => h.text(reader),
        }
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        match self {
            Hypha::Empty { .. } => Vec::new(),
            Hypha::Existing(h) => h.file_paths(),
        }
    }

    /// Turns an empty or textual hypha into one that has the given text part.
    pub fn with_text_path(&self, text_path: PathBuf) -> ExistingHypha {
        match self {
            Hypha::Empty { name } => ExistingHypha::Textual {
                name: name.clone(),
                text_path,
            },
            Hypha::Existing(h) => h.with_text_path(text_path),
        }
    }

    pub fn with_media_path(&self, media_path: PathBuf) -> ExistingHypha {
        match self {
            Hypha::Empty { name } => ExistingHypha::Media {
                name: name.clone(),
                text_path: None,
                media_path,
            },
            Hypha::Existing(h) => h.with_media_path(media_path),
        }
    }
}

/// What the hypha looked like at the given revision, judged by the files the
/// repository held for it back then.
pub fn at_revision(
    history: &History,
    name: &str,
    rev_hash: &str,
) -> Result<Hypha, crate::history::HistoryError> {
    let hyphae_dir = history.hyphae_dir();
    let files = history.hypha_files_at_revision(name, rev_hash)?;
    let text = files.text.map(|p| hyphae_dir.join(p));
    let media = files.media.map(|p| hyphae_dir.join(p));
    Ok(match (text, media) {
        (None, None) => Hypha::empty(name),
        (Some(text_path), None) => Hypha::Existing(ExistingHypha::Textual {
            name: name.to_string(),
            text_path,
        }),
        (text_path, Some(media_path)) => Hypha::Existing(ExistingHypha::Media {
            name: name.to_string(),
            text_path,
            media_path,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_is_idempotent() {
        let once = canonical_name("Apple Pie/Recipe Book");
        assert_eq!(once, "apple_pie/recipe_book");
        assert_eq!(canonical_name(&once), once);
    }

    #[test]
    fn beautiful_name_takes_the_last_segment() {
        assert_eq!(beautiful_name("garden/apple_pie"), "Apple pie");
        assert_eq!(beautiful_name("gamma"), "Gamma");
        assert_eq!(beautiful_name(""), "");
    }

    #[test]
    fn name_validity() {
        assert!(is_valid_name("a/b/c"));
        assert!(is_valid_name("тест/страница"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("how?"));
        assert!(!is_valid_name("a{b}"));
        assert!(!is_valid_name("a/../b"));
        assert!(!is_valid_name("a/./b"));
        assert!(!is_valid_name(".git/config"));
    }

    #[test]
    fn with_name_rewrites_file_paths() {
        let dir = Path::new("/w/wiki.git");
        let h = ExistingHypha::Media {
            name: "a/b".to_string(),
            text_path: Some(dir.join("a/b.myco")),
            media_path: dir.join("a/b.png"),
        };
        let renamed = h.with_name(dir, "c");
        assert_eq!(renamed.canonical_name(), "c");
        assert_eq!(
            renamed.file_paths(),
            vec![dir.join("c.myco"), dir.join("c.png")]
        );
    }

    #[test]
    fn without_media_downgrades() {
        let dir = Path::new("/w/wiki.git");
        let with_text = ExistingHypha::Media {
            name: "x".to_string(),
            text_path: Some(dir.join("x.myco")),
            media_path: dir.join("x.png"),
        };
        assert!(matches!(
            with_text.without_media(),
            Hypha::Existing(ExistingHypha::Textual { .. })
        ));

        let media_only = ExistingHypha::Media {
            name: "x".to_string(),
            text_path: None,
            media_path: dir.join("x.png"),
        };
        assert!(media_only.without_media().is_empty());
    }

    #[test]
    fn file_paths_by_variant() {
        let dir = Path::new("/w/wiki.git");
        assert!(Hypha::empty("nope").file_paths().is_empty());
        let t = ExistingHypha::new_textual(dir, "note");
        assert_eq!(t.file_paths(), vec![dir.join("note.myco")]);
    }
}
