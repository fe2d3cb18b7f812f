//! Mutation workflows: each one coordinates a revision-store transaction, an
//! index transaction and a category update with all-or-nothing semantics.
//!
//! The commit order is fixed: the revision store applies first, because disk
//! is the source of truth. Only after a successful commit does the index
//! apply; category and header-link updates are best-effort side effects of a
//! committed change.

mod delete;
mod remove_media;
mod rename;
mod revert;
mod upload;

use thiserror::Error;

pub use delete::delete;
pub use remove_media::remove_media;
pub use rename::rename;
pub use revert::revert;
pub use upload::{upload_binary, upload_text};

use crate::history::HistoryError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpsError {
    #[error("invalid hypha name ‘{name}’")]
    InvalidName { name: String },

    #[error("name '{name}' is already taken")]
    NameTaken { name: String },

    #[error("nothing to do")]
    EmptyOperation,

    #[error("no new name provided")]
    RenameNoName,

    #[error("no data passed")]
    NoMediaData,

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
