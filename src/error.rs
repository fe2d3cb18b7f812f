use thiserror::Error;

use crate::config::ConfigError;
use crate::history::HistoryError;
use crate::hyphae::ScanError;
use crate::interwiki::InterwikiError;
use crate::ops::OpsError;
use crate::search::SearchError;
use crate::users::UserError;

/// Crate-level convenience error: a thin wrapper over the subsystem errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Ops(#[from] OpsError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Interwiki(#[from] InterwikiError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
