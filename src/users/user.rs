//! The user value object.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::hyphae::canonical_name;
use crate::users::Group;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UserError {
    #[error("wrong username or password")]
    LoginFailure,

    #[error("permission denied for route `{route}`")]
    PermissionDenied { route: String },

    #[error("illegal username ‘{username}’")]
    InvalidUsername { username: String },

    #[error("username ‘{username}’ is already taken")]
    UsernameTaken { username: String },

    #[error("group '{group}' does not exist")]
    UnknownGroup { group: String },

    #[error("invalid user source '{value}'")]
    InvalidSource { value: String },

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("reached the limit of registered users ({limit})")]
    RegistrationLimit { limit: u64 },

    #[error("failed to generate a unique session token after {tries} tries")]
    TokenCollision { tries: u32 },

    #[error("failed to hash password: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Where the account came from. Telegram-sourced users have no password
/// hash; their identity is vouched for by the login widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSource {
    #[default]
    Local,
    Telegram,
}

/// An immutable account value. Transforms produce new instances.
#[derive(Clone, Debug)]
pub struct User {
    name: String,
    group: Group,
    password_hash: Option<String>,
    registered_at: Option<OffsetDateTime>,
    source: UserSource,
}

/// The on-disk shape of a user entry in `users.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub hashed_password: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub registered_on: Option<OffsetDateTime>,
    #[serde(default)]
    pub source: Option<UserSource>,
}

impl User {
    /// The anonymous user every unauthenticated request acts as.
    pub fn empty() -> User {
        User {
            name: "anon".to_string(),
            group: Group::empty(),
            password_hash: None,
            registered_at: None,
            source: UserSource::Local,
        }
    }

    /// The synthetic admin identity used for automated wiki edits.
    pub fn wikimind() -> User {
        User {
            name: "wikimind".to_string(),
            group: Group::admin(),
            password_hash: None,
            registered_at: None,
            source: UserSource::Local,
        }
    }

    /// A new account with a freshly hashed password. Local accounts must
    /// have a non-empty password; telegram accounts have none.
    pub fn with_password(
        name: &str,
        group: Group,
        password: &str,
        registered_at: OffsetDateTime,
        source: UserSource,
    ) -> Result<User, UserError> {
        let password_hash = match source {
            UserSource::Telegram => None,
            UserSource::Local => {
                if password.is_empty() {
                    return Err(UserError::EmptyPassword);
                }
                Some(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
            }
        };
        Ok(User {
            name: canonical_name(name),
            group,
            password_hash,
            registered_at: Some(registered_at),
            source,
        })
    }

    pub(crate) fn from_record(record: UserRecord, group: Group) -> User {
        let source = record.source.unwrap_or_default();
        User {
            name: canonical_name(&record.name),
            group,
            password_hash: if record.hashed_password.is_empty() {
                None
            } else {
                Some(record.hashed_password)
            },
            registered_at: record.registered_on,
            source,
        }
    }

    pub(crate) fn to_record(&self) -> UserRecord {
        UserRecord {
            name: self.name.clone(),
            group: self.group.name().to_string(),
            hashed_password: self.password_hash.clone().unwrap_or_default(),
            registered_on: self.registered_at,
            source: Some(self.source),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn permission(&self) -> u8 {
        self.group.permission()
    }

    pub fn registered_at(&self) -> Option<OffsetDateTime> {
        self.registered_at
    }

    pub fn source(&self) -> UserSource {
        self.source
    }

    pub fn is_local(&self) -> bool {
        self.source == UserSource::Local
    }

    pub fn is_empty(&self) -> bool {
        self.name == "anon"
    }

    pub fn is_correct_password(&self, password: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        match &self.password_hash {
            None => false,
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
        }
    }

    pub(crate) fn with_group(&self, group: Group) -> User {
        let mut user = self.clone();
        user.group = group;
        user
    }
}

/// Checks a username for wiki-hostile characters and reserved names.
pub fn is_valid_username(username: &str) -> bool {
    const FORBIDDEN: &str = "?!:#@><*|\"'&%{}/";
    !username.is_empty()
        && !username.chars().any(|c| FORBIDDEN.contains(c))
        && username != "anon"
        && username != "wikimind"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let user = User::with_password(
            "alice",
            Group::new("editor", 1),
            "sekrit",
            OffsetDateTime::UNIX_EPOCH,
            UserSource::Local,
        )
        .expect("hashing works");
        assert!(user.is_correct_password("sekrit"));
        assert!(!user.is_correct_password("wrong"));
        assert!(!user.is_correct_password(""));
    }

    #[test]
    fn local_users_need_a_password() {
        let err = User::with_password(
            "bob",
            Group::empty(),
            "",
            OffsetDateTime::UNIX_EPOCH,
            UserSource::Local,
        )
        .unwrap_err();
        assert!(matches!(err, UserError::EmptyPassword));
    }

    #[test]
    fn telegram_users_have_no_hash() {
        let user = User::with_password(
            "carol",
            Group::empty(),
            "",
            OffsetDateTime::UNIX_EPOCH,
            UserSource::Telegram,
        )
        .expect("telegram source skips password");
        assert!(!user.is_correct_password("anything"));
    }

    #[test]
    fn names_are_canonicalized() {
        let user = User::with_password(
            "Big Bob",
            Group::empty(),
            "pw",
            OffsetDateTime::UNIX_EPOCH,
            UserSource::Local,
        )
        .expect("user");
        assert_eq!(user.name(), "big_bob");
    }

    #[test]
    fn username_validity() {
        assert!(is_valid_username("mushroom_fan"));
        assert!(!is_valid_username("anon"));
        assert!(!is_valid_username("wikimind"));
        assert!(!is_valid_username("a/b"));
        assert!(!is_valid_username("what?"));
        assert!(!is_valid_username(""));
    }

    #[test]
    fn record_roundtrip() {
        let user = User::with_password(
            "dora",
            Group::new("trusted", 2),
            "pw",
            OffsetDateTime::UNIX_EPOCH,
            UserSource::Local,
        )
        .expect("user");
        let record = user.to_record();
        assert_eq!(record.group, "trusted");
        let back = User::from_record(record, Group::new("trusted", 2));
        assert_eq!(back.name(), "dora");
        assert!(back.is_correct_password("pw"));
    }
}
