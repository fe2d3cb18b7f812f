//! Hypha storage: the variant type, naming rules, the in-memory index and
//! its transactions, and the bulk rebuild from disk.

mod hypha;
mod index;
mod index_op;
mod scan;

pub use hypha::{
    ExistingHypha, Hypha, at_revision, beautiful_name, canonical_name, is_valid_name,
    text_file_path,
};
pub use index::HyphaIndex;
pub use index_op::IndexOp;
pub use scan::ScanError;
