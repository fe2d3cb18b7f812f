//! The interwiki map: named external wikis and the URL formats used to link
//! into them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hyphae::canonical_name;
use crate::util;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InterwikiError {
    #[error("missing wiki name")]
    MissingName,

    #[error("missing url for wiki '{name}'")]
    MissingUrl { name: String },

    #[error("invalid wiki engine '{engine}' for wiki '{name}'")]
    InvalidEngine { engine: String, name: String },

    #[error("wiki name '{name}' is already taken")]
    NameTaken { name: String },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supported interwiki targets. The engine decides the default URL formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WikiEngine {
    Mycorrhiza,
    Betula,
    Agora,
    /// Any website.
    Generic,
}

impl WikiEngine {
    fn link_href_format(self, url: &str) -> String {
        match self {
            WikiEngine::Mycorrhiza => format!("{url}/hypha/{{NAME}}"),
            WikiEngine::Betula => format!("{url}/{{BETULA-NAME}}"),
            WikiEngine::Agora => format!("{url}/node/{{NAME}}"),
            WikiEngine::Generic => format!("{url}/{{NAME}}"),
        }
    }

    fn img_src_format(self, url: &str) -> String {
        match self {
            WikiEngine::Mycorrhiza => format!("{url}/binary/{{NAME}}"),
            _ => format!("{url}/{{NAME}}"),
        }
    }
}

/// An entry in the interwiki map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wiki {
    /// Also the primary link prefix.
    pub name: String,
    /// Alternative prefixes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub url: String,
    /// Format string for links; derived from the engine when not set.
    #[serde(default)]
    pub link_href_format: String,
    #[serde(default)]
    pub img_src_format: String,
    pub engine: WikiEngine,
}

impl Wiki {
    pub fn new(
        name: &str,
        aliases: &[String],
        url: &str,
        engine: WikiEngine,
    ) -> Result<Wiki, InterwikiError> {
        let mut wiki = Wiki {
            name: name.to_string(),
            aliases: aliases.to_vec(),
            url: url.to_string(),
            link_href_format: String::new(),
            img_src_format: String::new(),
            engine,
        };
        wiki.canonize()?;
        Ok(wiki)
    }

    /// Every prefix this wiki answers to: the name, then the aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    fn canonize(&mut self) -> Result<(), InterwikiError> {
        self.name = canonical_name(&self.name);
        self.url = self.url.trim().to_string();
        if self.name.is_empty() {
            return Err(InterwikiError::MissingName);
        }
        if self.url.is_empty() {
            return Err(InterwikiError::MissingUrl {
                name: self.name.clone(),
            });
        }
        let mut seen: Vec<String> = vec![self.name.clone()];
        self.aliases = std::mem::take(&mut self.aliases)
            .into_iter()
            .map(|alias| canonical_name(&alias))
            .filter(|alias| {
                if alias.is_empty() || seen.contains(alias) {
                    return false;
                }
                seen.push(alias.clone());
                true
            })
            .collect();
        if self.link_href_format.is_empty() || self.engine != WikiEngine::Generic {
            self.link_href_format = self.engine.link_href_format(&self.url);
        }
        if self.img_src_format.is_empty() || self.engine != WikiEngine::Generic {
            self.img_src_format = self.engine.img_src_format(&self.url);
        }
        Ok(())
    }
}

struct InterwikiInner {
    /// Sorted by name.
    entries: Vec<Wiki>,
    by_name: HashMap<String, Wiki>,
}

/// The interwiki map, JSON-persisted next to the other wiki metadata.
pub struct InterwikiMap {
    inner: RwLock<InterwikiInner>,
    file_lock: Mutex<()>,
    path: PathBuf,
}

impl InterwikiMap {
    pub fn new(path: PathBuf) -> Self {
        Self {
            inner: RwLock::new(InterwikiInner {
                entries: Vec::new(),
                by_name: HashMap::new(),
            }),
            file_lock: Mutex::new(()),
            path,
        }
    }

    /// Loads `interwiki.json`; a missing file means an empty map. Duplicate
    /// prefixes are a startup error.
    pub fn load(&self) -> Result<(), InterwikiError> {
        let contents = {
            let _guard = self.file_lock.lock().expect("interwiki file lock poisoned");
            match std::fs::read(&self.path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        };
        let mut entries: Vec<Wiki> =
            serde_json::from_slice(&contents).map_err(|e| InterwikiError::Decode {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        let mut by_name = HashMap::new();
        for wiki in &mut entries {
            wiki.canonize()?;
            for name in wiki.names() {
                if by_name.contains_key(name) {
                    return Err(InterwikiError::NameTaken {
                        name: name.to_string(),
                    });
                }
            }
            for name in wiki.names() {
                by_name.insert(name.to_string(), wiki.clone());
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let n = entries.len();
        *self.inner.write().expect("interwiki lock poisoned") = InterwikiInner { entries, by_name };
        tracing::info!(n, "indexed interwiki map");
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<Wiki> {
        let name = canonical_name(name);
        let inner = self.inner.read().expect("interwiki lock poisoned");
        inner.by_name.get(&name).cloned()
    }

    pub fn entries(&self) -> Vec<Wiki> {
        self.inner.read().expect("interwiki lock poisoned").entries.clone()
    }

    /// The link format for an interwiki prefix, if the prefix is known.
    pub fn href_link_format_for(&self, prefix: &str) -> Option<String> {
        self.by_name(prefix).map(|wiki| wiki.link_href_format)
    }

    pub fn img_src_format_for(&self, prefix: &str) -> Option<String> {
        self.by_name(prefix).map(|wiki| wiki.img_src_format)
    }

    pub fn add_entry(&self, wiki: Wiki) -> Result<(), InterwikiError> {
        self.replace_entry(None, Some(wiki))
    }

    pub fn delete_entry(&self, name: &str) -> Result<(), InterwikiError> {
        let Some(old) = self.by_name(name) else {
            return Ok(());
        };
        self.replace_entry(Some(old), None)
    }

    /// Replaces `old` with `new`, checking that none of the new prefixes
    /// collides with another wiki. The snapshot is saved before the swap so
    /// the in-memory map never runs ahead of disk.
    pub fn replace_entry(
        &self,
        old: Option<Wiki>,
        new: Option<Wiki>,
    ) -> Result<(), InterwikiError> {
        let mut inner = self.inner.write().expect("interwiki lock poisoned");
        if let Some(new_wiki) = &new {
            for name in new_wiki.names() {
                if let Some(existing) = inner.by_name.get(name) {
                    if Some(existing) != old.as_ref() {
                        return Err(InterwikiError::NameTaken {
                            name: name.to_string(),
                        });
                    }
                }
            }
        }
        let mut entries = inner.entries.clone();
        match (&old, &new) {
            (None, None) => return Ok(()),
            (None, Some(new_wiki)) => {
                util::insert_sorted(
                    &mut entries,
                    |a, b| a.name.cmp(&b.name),
                    std::slice::from_ref(new_wiki),
                );
            }
            (Some(old_wiki), None) => {
                util::delete_sorted(
                    &mut entries,
                    |a, b| a.name.cmp(&b.name),
                    std::slice::from_ref(old_wiki),
                );
            }
            (Some(old_wiki), Some(new_wiki)) => {
                util::replace_sorted(&mut entries, |a, b| a.name.cmp(&b.name), old_wiki, new_wiki);
            }
        }
        self.save(&entries)?;
        inner.entries = entries;
        if let Some(old_wiki) = &old {
            for name in old_wiki.names() {
                inner.by_name.remove(name);
            }
        }
        if let Some(new_wiki) = &new {
            for name in new_wiki.names() {
                inner.by_name.insert(name.to_string(), new_wiki.clone());
            }
        }
        Ok(())
    }

    fn save(&self, entries: &[Wiki]) -> Result<(), InterwikiError> {
        let blob = serde_json::to_vec_pretty(entries).map_err(|e| InterwikiError::Decode {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let _guard = self.file_lock.lock().expect("interwiki file lock poisoned");
        util::atomic_write(&self.path, &blob)?;
        tracing::info!(path = %self.path.display(), "saved interwiki map");
        Ok(())
    }
}
