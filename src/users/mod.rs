//! Users, groups, route permissions and token sessions.

mod group;
mod permissions;
mod store;
mod user;

pub use group::{Group, Groups, MAX_PERMISSION, MIN_PERMISSION};
pub use permissions::RouteAcl;
pub use store::{Session, UserStore, run_session_updater};
pub use user::{User, UserError, UserSource, is_valid_username};
