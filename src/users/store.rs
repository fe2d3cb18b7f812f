//! The user and session store: JSON-backed maps plus the background session
//! updater.
//!
//! Sessions are flushed by a dedicated task: a `SessionActive` event marks
//! the store dirty for the next timer tick, a `SessionChanged` event
//! (login, logout, eviction) flushes immediately.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded, select, tick};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::AuthConfig;
use crate::process::Lifecycle;
use crate::users::user::{UserRecord, is_valid_username};
use crate::users::{Groups, RouteAcl, User, UserError};
use crate::util;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEvent {
    /// A session was touched; flush on the next tick.
    Active,
    /// Sessions were added or removed; flush now.
    Changed,
}

/// A token session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
}

impl Session {
    fn expired(&self, timeout: Duration, now: OffsetDateTime) -> bool {
        (now - self.last_used).whole_milliseconds() > timeout.as_millis() as i128
    }
}

pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
    tokens: RwLock<HashMap<String, Session>>,
    groups: Groups,
    acl: RouteAcl,
    cfg: AuthConfig,
    users_path: PathBuf,
    tokens_path: PathBuf,
    file_lock: Mutex<()>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl UserStore {
    pub fn new(
        cfg: AuthConfig,
        groups: Groups,
        acl: RouteAcl,
        users_path: PathBuf,
        tokens_path: PathBuf,
    ) -> Self {
        let (events_tx, events_rx) = bounded(16);
        Self {
            users: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            groups,
            acl,
            cfg,
            users_path,
            tokens_path,
            file_lock: Mutex::new(()),
            events_tx,
            events_rx,
        }
    }

    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    pub fn acl(&self) -> &RouteAcl {
        &self.acl
    }

    /// Loads users and tokens from disk. Call once during startup.
    pub fn load(&self) -> Result<(), UserError> {
        if !self.cfg.use_auth {
            return Ok(());
        }
        self.read_users_from_disk()?;
        self.read_tokens_from_disk()?;
        Ok(())
    }

    fn read_users_from_disk(&self) -> Result<(), UserError> {
        let contents = {
            let _guard = self.file_lock.lock().expect("user file lock poisoned");
            match std::fs::read(&self.users_path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        };
        let records: Vec<UserRecord> =
            serde_json::from_slice(&contents).map_err(|e| UserError::Decode {
                path: self.users_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let mut users = HashMap::with_capacity(records.len());
        for record in records {
            let group = self.groups.by_name(&record.group)?;
            let user = User::from_record(record, group);
            if !is_valid_username(user.name()) {
                tracing::error!(username = user.name(), "skipping user with invalid name");
                continue;
            }
            if users.insert(user.name().to_string(), user).is_some() {
                tracing::error!("duplicate user entry; last one wins");
            }
        }
        let n = users.len();
        *self.users.write().expect("users lock poisoned") = users;
        tracing::info!(n, "indexed users");
        Ok(())
    }

    fn read_tokens_from_disk(&self) -> Result<(), UserError> {
        let contents = match std::fs::read(&self.tokens_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut sessions: Vec<Session> =
            serde_json::from_slice(&contents).map_err(|e| UserError::Decode {
                path: self.tokens_path.display().to_string(),
                reason: e.to_string(),
            })?;
        // Most recently used first, so the per-user cap keeps the newest.
        sessions.sort_by(|a, b| b.last_used.cmp(&a.last_used));

        let now = OffsetDateTime::now_utc();
        let timeout = self.cfg.session_timeout();
        let mut per_user: HashMap<String, usize> = HashMap::new();
        let mut active = 0;
        let mut invalid = 0;
        let mut tokens = HashMap::new();
        for session in sessions {
            let used = per_user.entry(session.username.clone()).or_insert(0);
            if session.expired(timeout, now) {
                invalid += 1;
            } else if self.cfg.session_limit > 0 && *used == self.cfg.session_limit {
                tracing::info!(
                    username = %session.username,
                    limit = self.cfg.session_limit,
                    "session limit exceeded on load"
                );
                invalid += 1;
            } else {
                *used += 1;
                active += 1;
                tokens.insert(session.token.clone(), session);
            }
        }
        *self.tokens.write().expect("tokens lock poisoned") = tokens;
        tracing::info!(active, invalid, "indexed sessions");
        Ok(())
    }

    /// How many accounts are registered.
    pub fn count(&self) -> usize {
        self.users.read().expect("users lock poisoned").len()
    }

    pub fn has_any_admins(&self) -> bool {
        self.users
            .read()
            .expect("users lock poisoned")
            .values()
            .any(|u| u.group().name() == "admin")
    }

    /// Finds a user by name; unknown names act as the anonymous user.
    pub fn by_name(&self, username: &str) -> User {
        self.users
            .read()
            .expect("users lock poisoned")
            .get(username)
            .cloned()
            .unwrap_or_else(User::empty)
    }

    /// A snapshot of all users.
    pub fn all_users(&self) -> Vec<User> {
        self.users
            .read()
            .expect("users lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Sorted names of the users in the given group.
    pub fn users_in_group(&self, group: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .users
            .read()
            .expect("users lock poisoned")
            .values()
            .filter(|u| u.group().name() == group)
            .map(|u| u.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn credentials_ok(&self, username: &str, password: &str) -> bool {
        self.by_name(username).is_correct_password(password)
    }

    /// Resolves a session token to its user, touching the session. Expired
    /// or orphaned sessions are terminated and resolve to anon.
    pub fn by_token(&self, token: &str) -> User {
        let now = OffsetDateTime::now_utc();
        let timeout = self.cfg.session_timeout();
        let username = {
            let mut tokens = self.tokens.write().expect("tokens lock poisoned");
            match tokens.get_mut(token) {
                None => return User::empty(),
                Some(session) if session.expired(timeout, now) => {
                    tracing::info!(username = %session.username, "session expired");
                    tokens.remove(token);
                    drop(tokens);
                    self.send_event(SessionEvent::Changed);
                    return User::empty();
                }
                Some(session) => {
                    session.last_used = now;
                    session.username.clone()
                }
            }
        };
        let user = {
            let users = self.users.read().expect("users lock poisoned");
            users.get(&username).cloned()
        };
        match user {
            Some(user) => {
                self.send_event(SessionEvent::Active);
                user
            }
            None => {
                tracing::info!(%username, "session user does not exist");
                self.terminate_session(token);
                User::empty()
            }
        }
    }

    /// Whether the user may act on the route. With auth disabled everything
    /// is allowed.
    pub fn can_proceed(&self, user: &User, route: &str) -> bool {
        if !self.cfg.use_auth {
            return true;
        }
        user.permission() >= self.acl.required_permission(route)
    }

    /// [`UserStore::can_proceed`] as a checked requirement.
    pub fn require(&self, user: &User, route: &str) -> Result<(), UserError> {
        if self.can_proceed(user, route) {
            Ok(())
        } else {
            Err(UserError::PermissionDenied {
                route: route.to_string(),
            })
        }
    }

    /// Checks credentials and opens a session, returning its token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, UserError> {
        if !self.credentials_ok(username, password) {
            tracing::info!(username, "wrong username or password entered");
            return Err(UserError::LoginFailure);
        }
        self.add_session(username)
    }

    pub fn logout(&self, token: &str) {
        self.terminate_session(token);
    }

    /// Opens a session for the user. Over-limit sessions are evicted least
    /// recently used first.
    pub fn add_session(&self, username: &str) -> Result<String, UserError> {
        const TRIES: u32 = 4;
        for _ in 0..TRIES {
            let token = util::random_string(16);
            let session = Session {
                token: token.clone(),
                username: username.to_string(),
                last_used: OffsetDateTime::now_utc(),
            };
            let inserted = {
                let mut tokens = self.tokens.write().expect("tokens lock poisoned");
                if tokens.contains_key(&token) {
                    false
                } else {
                    tokens.insert(token.clone(), session);
                    self.evict_over_limit(&mut tokens, username);
                    true
                }
            };
            if inserted {
                tracing::info!(username, "added session");
                self.send_event(SessionEvent::Changed);
                return Ok(token);
            }
        }
        Err(UserError::TokenCollision { tries: TRIES })
    }

    fn evict_over_limit(&self, tokens: &mut HashMap<String, Session>, username: &str) {
        if self.cfg.session_limit == 0 {
            return;
        }
        let mut sessions: Vec<(String, OffsetDateTime)> = tokens
            .values()
            .filter(|s| s.username == username)
            .map(|s| (s.token.clone(), s.last_used))
            .collect();
        if sessions.len() <= self.cfg.session_limit {
            return;
        }
        tracing::info!(
            username,
            sessions = sessions.len(),
            "session limit exceeded"
        );
        sessions.sort_by_key(|(_, last_used)| *last_used);
        let excess = sessions.len() - self.cfg.session_limit;
        for (token, _) in sessions.into_iter().take(excess) {
            tracing::info!(username, "terminating session");
            tokens.remove(&token);
        }
    }

    pub fn terminate_session(&self, token: &str) {
        let removed = {
            let mut tokens = self.tokens.write().expect("tokens lock poisoned");
            tokens.remove(token)
        };
        if let Some(session) = removed {
            tracing::info!(username = %session.username, "terminating session");
            self.send_event(SessionEvent::Changed);
        }
    }

    /// Registers a new account and persists the user database. `force`
    /// bypasses the registration limit (used by the admin panel and the
    /// first-run bootstrap).
    pub fn register(
        &self,
        username: &str,
        password: &str,
        group: &str,
        source: super::UserSource,
        force: bool,
    ) -> Result<(), UserError> {
        if !is_valid_username(username) {
            return Err(UserError::InvalidUsername {
                username: username.to_string(),
            });
        }
        let username = crate::hyphae::canonical_name(username);
        if self.cfg.use_white_list && !self.cfg.white_list.iter().any(|w| w == &username) {
            return Err(UserError::InvalidUsername { username });
        }
        let group = self.groups.by_name(group)?;
        let user = User::with_password(
            &username,
            group,
            password,
            OffsetDateTime::now_utc(),
            source,
        )?;
        {
            let mut users = self.users.write().expect("users lock poisoned");
            if users.contains_key(&username) {
                return Err(UserError::UsernameTaken { username });
            }
            let limit = self.cfg.registration_limit;
            if !force && limit > 0 && users.len() as u64 >= limit {
                return Err(UserError::RegistrationLimit { limit });
            }
            users.insert(username, user);
        }
        self.save_user_database()
    }

    /// Removes the account and terminates its sessions.
    pub fn delete_user(&self, name: &str) -> Result<(), UserError> {
        let existed = {
            let mut users = self.users.write().expect("users lock poisoned");
            users.remove(name).is_some()
        };
        if !existed {
            return Ok(());
        }
        let dropped = {
            let mut tokens = self.tokens.write().expect("tokens lock poisoned");
            let before = tokens.len();
            tokens.retain(|_, session| session.username != name);
            before - tokens.len()
        };
        if dropped > 0 {
            self.send_event(SessionEvent::Changed);
        }
        self.save_user_database()
    }

    /// Moves the user to another group and persists the change.
    pub fn change_group(&self, name: &str, group: &str) -> Result<(), UserError> {
        let group = self.groups.by_name(group)?;
        {
            let mut users = self.users.write().expect("users lock poisoned");
            let Some(user) = users.get(name) else {
                return Err(UserError::InvalidUsername {
                    username: name.to_string(),
                });
            };
            let updated = user.with_group(group);
            users.insert(name.to_string(), updated);
        }
        self.save_user_database()
    }

    /// Writes `users.json`, overwriting atomically.
    pub fn save_user_database(&self) -> Result<(), UserError> {
        let records: Vec<UserRecord> = {
            let users = self.users.read().expect("users lock poisoned");
            users.values().map(User::to_record).collect()
        };
        let blob = serde_json::to_vec_pretty(&records).map_err(|e| UserError::Decode {
            path: self.users_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let _guard = self.file_lock.lock().expect("user file lock poisoned");
        util::atomic_write(&self.users_path, &blob)?;
        Ok(())
    }

    /// Writes `cache/tokens.json`, dropping expired sessions on the way.
    pub fn write_tokens(&self) -> Result<(), UserError> {
        let now = OffsetDateTime::now_utc();
        let timeout = self.cfg.session_timeout();
        let sessions: Vec<Session> = {
            let mut tokens = self.tokens.write().expect("tokens lock poisoned");
            tokens.retain(|_, session| {
                if session.expired(timeout, now) {
                    tracing::info!(username = %session.username, "session expired");
                    false
                } else {
                    true
                }
            });
            tokens.values().cloned().collect()
        };
        let blob = serde_json::to_vec_pretty(&sessions).map_err(|e| UserError::Decode {
            path: self.tokens_path.display().to_string(),
            reason: e.to_string(),
        })?;
        util::atomic_write(&self.tokens_path, &blob)?;
        tracing::info!(n = sessions.len(), "saved sessions");
        Ok(())
    }

    fn send_event(&self, ev: SessionEvent) {
        // A full channel means a flush is already pending; coalescing is
        // fine.
        let _ = self.events_tx.try_send(ev);
    }

    #[cfg(test)]
    pub(crate) fn sessions_of(&self, username: &str) -> Vec<Session> {
        self.tokens
            .read()
            .expect("tokens lock poisoned")
            .values()
            .filter(|s| s.username == username)
            .cloned()
            .collect()
    }
}

/// The background session flusher. Runs until shutdown; flushes batched
/// activity on each tick and immediately on session changes.
pub fn run_session_updater(store: Arc<UserStore>, process: Arc<Lifecycle>) {
    tracing::info!("starting session updater");
    let done = process.done();
    let ticker = tick(store.cfg.session_update_interval());
    let events = store.events_rx.clone();
    let mut save_pending = false;
    loop {
        let mut write = false;
        select! {
            recv(done) -> _ => break,
            recv(events) -> ev => match ev {
                Err(_) => break,
                Ok(SessionEvent::Active) => save_pending = true,
                Ok(SessionEvent::Changed) => write = true,
            },
            recv(ticker) -> _ => {
                if save_pending {
                    tracing::info!("saving session activity");
                    write = true;
                }
            }
        }
        if write {
            if let Err(e) = store.write_tokens() {
                tracing::error!(err = %e, "failed to write tokens");
            } else {
                save_pending = false;
            }
        }
    }
    tracing::info!("stopping session updater");
    if save_pending {
        if let Err(e) = store.write_tokens() {
            tracing::error!(err = %e, "failed to write tokens on shutdown");
        }
    }
}
