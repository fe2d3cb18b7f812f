//! Wiki configuration: schema, defaults, TOML load and save.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shown in the header and on various pages.
    pub wiki_name: String,
    pub hyphae: HyphaeConfig,
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub search: SearchConfig,
    pub grep: GrepConfig,
    /// Extra groups, name to permission level. The fixed `anon` and `admin`
    /// groups are always present.
    pub custom_groups: BTreeMap<String, u8>,
    /// Route to group name; the route's required permission level becomes
    /// that group's level.
    pub custom_permissions: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wiki_name: "Mycelium Wiki".to_string(),
            hyphae: HyphaeConfig::default(),
            network: NetworkConfig::default(),
            auth: AuthConfig::default(),
            search: SearchConfig::default(),
            grep: GrepConfig::default(),
            custom_groups: BTreeMap::new(),
            custom_permissions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HyphaeConfig {
    /// The main (index) page of the wiki.
    pub home_hypha: String,
    /// Prefix for user hyphae.
    pub user_hypha: String,
    /// Hypha whose rocket links populate the header.
    pub header_links_hypha: String,
    /// Redirection hyphae left behind by renames are added to this category.
    pub redirection_category: String,
}

impl Default for HyphaeConfig {
    fn default() -> Self {
        Self {
            home_hypha: "home".to_string(),
            user_hypha: "u".to_string(),
            header_links_hypha: "header_links".to_string(),
            redirection_category: "redirection".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen_addr: String,
    /// Public URL, used for feeds and OpenGraph.
    pub url: String,
    /// Root path the wiki is served under. Always ends with `/`.
    pub root: String,
    /// Window given to in-flight work on shutdown, seconds. At least 8.
    pub shutdown_grace_secs: u64,
    /// Subhypha tree rendering caps; zero disables a cap.
    pub max_tree_depth: usize,
    pub max_tree_nodes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:1737".to_string(),
            url: String::new(),
            root: "/".to_string(),
            shutdown_grace_secs: 8,
            max_tree_depth: 0,
            max_tree_nodes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub use_auth: bool,
    pub allow_registration: bool,
    /// Zero means unlimited.
    pub registration_limit: u64,
    pub locked: bool,
    pub use_white_list: bool,
    pub white_list: Vec<String>,
    /// Sessions kept per user; least recently used are evicted. Zero means
    /// unlimited.
    pub session_limit: usize,
    pub session_timeout_secs: u64,
    pub session_update_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            use_auth: true,
            allow_registration: false,
            registration_limit: 0,
            locked: false,
            use_white_list: false,
            white_list: Vec::new(),
            session_limit: 10,
            session_timeout_secs: 60 * 60 * 24 * 30,
            session_update_interval_secs: 60 * 5,
        }
    }
}

impl AuthConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn session_update_interval(&self) -> Duration {
        Duration::from_secs(self.session_update_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FullTextBackend {
    #[default]
    Grep,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub full_text: FullTextBackend,
    /// Character budget for a displayed match line; negative disables
    /// truncation, zero hides match lines entirely.
    pub full_text_line_length: i64,
    /// Result caps for the text search page and its inline variant.
    pub full_text_lower_limit: usize,
    pub full_text_upper_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            full_text: FullTextBackend::Grep,
            full_text_line_length: 256,
            full_text_lower_limit: 10,
            full_text_upper_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrepConfig {
    /// Skip media files, searching `*.myco` only.
    pub ignore_media: bool,
    /// Matches reported per hypha; zero means unlimited.
    pub match_limit_per_hypha: u64,
    /// Concurrent grep processes; zero means unlimited.
    pub process_limit: u32,
    /// Per-query timeout, seconds; zero disables the deadline.
    pub timeout_secs: u64,
}

impl Default for GrepConfig {
    fn default() -> Self {
        Self {
            ignore_media: true,
            match_limit_per_hypha: 5,
            process_limit: 32,
            timeout_secs: 5,
        }
    }
}

impl GrepConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Loads the config, writing defaults to `path` when it does not exist yet.
pub fn load_or_init(path: &Path) -> Config {
    if path.exists() {
        match load(path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                return Config::default();
            }
        }
    }
    let cfg = Config::default();
    if let Err(e) = write_config(path, &cfg) {
        tracing::warn!("failed to write default config: {e}");
    }
    cfg
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let write_error = |reason: String| ConfigError::Write {
        path: path.display().to_string(),
        reason,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| write_error(e.to_string()))?;
    }
    let contents = toml::to_string_pretty(cfg).map_err(|e| write_error(e.to_string()))?;
    crate::util::atomic_write(path, contents.as_bytes()).map_err(|e| write_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.wiki_name = "Test Garden".to_string();
        cfg.auth.session_limit = 2;
        cfg.grep.timeout_secs = 0;
        cfg.custom_groups.insert("gardener".to_string(), 2);
        write_config(&path, &cfg).expect("write config");
        let loaded = load(&path).expect("load config");
        assert_eq!(loaded.wiki_name, "Test Garden");
        assert_eq!(loaded.auth.session_limit, 2);
        assert_eq!(loaded.grep.timeout(), None);
        assert_eq!(loaded.custom_groups.get("gardener"), Some(&2));
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let cfg = load_or_init(&path);
        assert!(path.exists());
        assert_eq!(cfg.hyphae.redirection_category, "redirection");
        assert_eq!(cfg.network.shutdown_grace_secs, 8);
    }
}
