#![forbid(unsafe_code)]

pub mod categories;
pub mod config;
pub mod error;
pub mod headers;
pub mod history;
pub mod hyphae;
pub mod interwiki;
pub mod links;
pub mod mime;
pub mod ops;
pub mod paths;
pub mod process;
pub mod search;
pub mod tree;
pub mod users;
pub mod util;
pub mod wiki;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the types most callers touch at the crate root.
pub use crate::config::Config;
pub use crate::hyphae::{ExistingHypha, Hypha, HyphaIndex};
pub use crate::process::Lifecycle;
pub use crate::wiki::Wiki;
