//! Locations of the files a wiki keeps inside its root directory.

use std::io;
use std::path::{Path, PathBuf};

use crate::util;

/// Resolved layout of a wiki root.
///
/// The git working tree with the hypha files lives in `wiki.git/`; everything
/// else (user database, categories, interwiki map, token cache) sits next to
/// it and is not version-controlled.
#[derive(Clone, Debug)]
pub struct WikiPaths {
    wiki_dir: PathBuf,
    hyphae_dir: PathBuf,
    cache_dir: PathBuf,
    static_dir: PathBuf,
}

impl WikiPaths {
    pub fn new(wiki_dir: impl Into<PathBuf>) -> Self {
        let wiki_dir = wiki_dir.into();
        let hyphae_dir = wiki_dir.join("wiki.git");
        let cache_dir = wiki_dir.join("cache");
        let static_dir = wiki_dir.join("static");
        Self {
            wiki_dir,
            hyphae_dir,
            cache_dir,
            static_dir,
        }
    }

    /// Creates the directories the wiki needs.
    pub fn prepare(&self) -> io::Result<()> {
        util::create_dir_group(&self.wiki_dir)?;
        util::create_dir_group(&self.hyphae_dir)?;
        util::create_dir_group(&self.cache_dir)?;
        util::create_dir_group(&self.static_dir)?;
        Ok(())
    }

    pub fn wiki_dir(&self) -> &Path {
        &self.wiki_dir
    }

    /// Path to hyphae storage, which is also the git working tree.
    pub fn hyphae_dir(&self) -> &Path {
        &self.hyphae_dir
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn config_toml(&self) -> PathBuf {
        self.wiki_dir.join("config.toml")
    }

    pub fn user_credentials_json(&self) -> PathBuf {
        self.wiki_dir.join("users.json")
    }

    pub fn tokens_json(&self) -> PathBuf {
        self.cache_dir.join("tokens.json")
    }

    pub fn categories_json(&self) -> PathBuf {
        self.wiki_dir.join("categories.json")
    }

    pub fn interwiki_json(&self) -> PathBuf {
        self.wiki_dir.join("interwiki.json")
    }

    /// Strips the hyphae directory prefix, leaving a repo-relative path.
    pub fn shorter_path<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.hyphae_dir).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_wiki_dir() {
        let p = WikiPaths::new("/srv/wiki");
        assert_eq!(p.hyphae_dir(), Path::new("/srv/wiki/wiki.git"));
        assert_eq!(p.tokens_json(), Path::new("/srv/wiki/cache/tokens.json"));
        assert_eq!(p.categories_json(), Path::new("/srv/wiki/categories.json"));
    }

    #[test]
    fn shorter_path_strips_hyphae_dir() {
        let p = WikiPaths::new("/srv/wiki");
        assert_eq!(
            p.shorter_path(Path::new("/srv/wiki/wiki.git/a/b.myco")),
            Path::new("a/b.myco")
        );
        assert_eq!(p.shorter_path(Path::new("elsewhere")), Path::new("elsewhere"));
    }
}
