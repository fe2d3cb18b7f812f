//! Engine assembly: builds every store, boots the subsystems and exposes
//! the read-side conveniences the outer layers use.

use std::path::PathBuf;
use std::sync::Arc;

use crate::categories::CategoryStore;
use crate::config::{Config, FullTextBackend};
use crate::headers::HeaderStore;
use crate::history::History;
use crate::hyphae::{Hypha, HyphaIndex, ScanError};
use crate::interwiki::InterwikiMap;
use crate::paths::WikiPaths;
use crate::process::Lifecycle;
use crate::search::{self, SearchError, SearchResults};
use crate::tree::{self, TreeLimits};
use crate::users::{Groups, RouteAcl, UserStore, run_session_updater};

/// One wiki: the stores and the process lifecycle that ties them together.
pub struct Wiki {
    pub cfg: Config,
    pub paths: WikiPaths,
    pub process: Arc<Lifecycle>,
    pub history: Arc<History>,
    pub headers: Arc<HeaderStore>,
    pub index: Arc<HyphaIndex>,
    pub categories: Arc<CategoryStore>,
    pub users: Arc<UserStore>,
    pub interwiki: Arc<InterwikiMap>,
}

impl Wiki {
    /// Opens the wiki at `wiki_dir`: prepares the directory layout, finds
    /// git and initializes the repository, indexes every hypha, loads the
    /// JSON-backed stores and starts the session updater.
    pub fn open(wiki_dir: impl Into<PathBuf>, cfg: Config) -> crate::Result<Wiki> {
        let paths = WikiPaths::new(wiki_dir);
        paths.prepare()?;
        let process = Arc::new(Lifecycle::new());

        let history = Arc::new(History::start(
            paths.hyphae_dir(),
            Arc::clone(&process),
            cfg.grep.clone(),
            cfg.search.full_text_line_length,
        )?);
        history.init_repo()?;

        let headers = Arc::new(HeaderStore::new(cfg.network.root.clone()));
        let index = Arc::new(HyphaIndex::new(
            Arc::clone(&headers),
            cfg.hyphae.header_links_hypha.clone(),
        ));
        index.rebuild(&history, &process)?;

        let categories = CategoryStore::new(
            paths.categories_json(),
            Arc::clone(&process),
            cfg.hyphae.redirection_category.clone(),
        );
        categories.load()?;

        let interwiki = Arc::new(InterwikiMap::new(paths.interwiki_json()));
        interwiki.load()?;

        let groups = Groups::from_config(&cfg.custom_groups);
        let acl = RouteAcl::from_config(&cfg.custom_permissions, &groups)?;
        let users = Arc::new(UserStore::new(
            cfg.auth.clone(),
            groups,
            acl,
            paths.user_credentials_json(),
            paths.tokens_json(),
        ));
        users.load()?;
        if cfg.auth.use_auth {
            let store = Arc::clone(&users);
            let lifecycle = Arc::clone(&process);
            process.go(move || run_session_updater(store, lifecycle));
        }

        let wiki = Wiki {
            cfg,
            paths,
            process,
            history,
            headers,
            index,
            categories,
            users,
            interwiki,
        };
        wiki.derive_header_links();
        Ok(wiki)
    }

    /// Re-derives the header links from the designated hypha's current
    /// text, falling back to the defaults when it is unreadable or empty.
    pub fn derive_header_links(&self) {
        let hypha = self.index.by_name(&self.cfg.hyphae.header_links_hypha);
        let text = match hypha.text(&*self.history) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(err = %e, "failed to read header links hypha");
                String::new()
            }
        };
        self.headers.set(self.headers.parse(&text));
    }

    /// Rebuilds the whole index from disk and refreshes the header links.
    pub fn reindex(&self) -> Result<(), ScanError> {
        tracing::info!(hyphae_dir = %self.history.hyphae_dir().display(), "reindexing hyphae");
        self.index.rebuild(&self.history, &self.process)?;
        self.derive_header_links();
        Ok(())
    }

    /// Full-text search through the configured backend.
    pub fn full_text_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults, SearchError> {
        if limit == 0 {
            return Err(SearchError::Disabled);
        }
        match self.cfg.search.full_text {
            FullTextBackend::Grep => {
                let query = search::normalize_query(query);
                Ok(self.history.grep(&query, limit)?)
            }
            FullTextBackend::None => Err(SearchError::Disabled),
        }
    }

    /// Hypha names whose titles contain the query.
    pub fn title_search(&self, query: &str) -> Vec<String> {
        search::title_search(&self.index, query)
    }

    /// The rendered subhypha tree plus the neighboring siblings.
    pub fn subhyphae_tree(&self, hypha: &Hypha) -> (String, String, String) {
        tree::tree(
            &self.index,
            hypha,
            &self.cfg.network.root,
            TreeLimits {
                max_depth: self.cfg.network.max_tree_depth,
                max_nodes: self.cfg.network.max_tree_nodes,
            },
        )
    }

    pub fn shutdown(&self) {
        self.process.shutdown();
    }

    /// Blocks until every background task has exited.
    pub fn wait(&self) {
        self.process.wait();
    }
}
