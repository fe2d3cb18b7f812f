//! Write and read transactions on the revision store.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::history::{EMAIL_HOST, History, HistoryError};
use crate::users::User;
use crate::util::{self, FileReader};

/// Arguments per git invocation when staging many files, to stay clear of
/// argv limits.
const FILE_CHUNK: usize = 64;

/// A write transaction. Holds the store write lock from creation until
/// `apply` or `abort`; the first error short-circuits every later builder
/// call. Dropping an unfinished transaction aborts it.
pub struct Op<'a> {
    hist: &'a History,
    guard: Option<RwLockWriteGuard<'a, ()>>,
    name: String,
    email: String,
    user_msg: String,
    files_changed: bool,
    err: Option<HistoryError>,
    done: bool,
}

impl<'a> Op<'a> {
    pub(crate) fn new(hist: &'a History, guard: RwLockWriteGuard<'a, ()>) -> Self {
        Self {
            hist,
            guard: Some(guard),
            name: "anon".to_string(),
            email: format!("anon@{EMAIL_HOST}"),
            user_msg: String::new(),
            files_changed: false,
            err: None,
            done: false,
        }
    }

    /// Whether a builder call may proceed; records `OperationDone` when the
    /// transaction is already terminal.
    fn usable(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.done {
            self.err = Some(HistoryError::OperationDone);
            return false;
        }
        true
    }

    fn gitop(&mut self, args: &[&str]) {
        if !self.usable() {
            return;
        }
        if let Err(e) = self.hist.gitsh(args) {
            self.err = Some(e);
        }
    }

    fn git_file_op(&mut self, base: &[&str], paths: &[PathBuf]) {
        if !self.usable() {
            return;
        }
        for chunk in paths.chunks(FILE_CHUNK) {
            self.files_changed = true;
            let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
            args.extend(chunk.iter().map(|p| self.hist.shorter(p)));
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            if let Err(e) = self.hist.gitsh(&arg_refs) {
                self.err = Some(e);
                return;
            }
        }
    }

    /// Sets the commit author.
    pub fn with_user(&mut self, user: &User) -> &mut Self {
        self.with_user_name(user.name())
    }

    pub fn with_user_name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self.email = format!("{name}@{EMAIL_HOST}");
        self
    }

    /// Sets the commit message. Messages are single-line; everything from
    /// the first CR or LF is dropped.
    pub fn with_msg(&mut self, user_msg: &str) -> &mut Self {
        let cut = user_msg.find(['\r', '\n']).unwrap_or(user_msg.len());
        self.user_msg = user_msg[..cut].to_string();
        self
    }

    /// Stages the paths for addition.
    pub fn with_files(&mut self, paths: &[PathBuf]) -> &mut Self {
        self.git_file_op(&["add"], paths);
        self
    }

    /// Stages the paths for removal.
    pub fn with_files_removed(&mut self, paths: &[PathBuf]) -> &mut Self {
        self.git_file_op(&["rm", "--"], paths);
        self
    }

    /// Restores the paths as they were at the given revision.
    pub fn with_files_reverted(&mut self, rev_hash: &str, paths: &[PathBuf]) -> &mut Self {
        self.git_file_op(&["checkout", rev_hash, "--"], paths);
        self
    }

    /// Renames each `(from, to)` pair, creating destination directories as
    /// needed. Stops at the first backend error.
    pub fn with_files_renamed(&mut self, pairs: &[(PathBuf, PathBuf)]) -> &mut Self {
        if !self.usable() {
            return self;
        }
        self.files_changed = true;
        for (from, to) in pairs {
            if let Some(parent) = to.parent() {
                if let Err(e) = util::create_dir_group(parent) {
                    self.err = Some(e.into());
                    return self;
                }
            }
            let from = self.hist.shorter(from);
            let to = self.hist.shorter(to);
            self.gitop(&["mv", "--force", from.as_str(), to.as_str()]);
            if self.err.is_some() {
                return self;
            }
        }
        self
    }

    /// Marks the working tree dirty without staging anything yet.
    pub fn set_files_changed(&mut self) -> &mut Self {
        self.files_changed = true;
        self
    }

    /// A standalone copy of the stored error, for returning while the
    /// transaction keeps its first-error state.
    fn err_copy(&self) -> HistoryError {
        match &self.err {
            Some(HistoryError::Backend { args, code, output }) => HistoryError::Backend {
                args: args.clone(),
                code: *code,
                output: output.clone(),
            },
            Some(HistoryError::Io(e)) => HistoryError::Io(io::Error::new(e.kind(), e.to_string())),
            Some(HistoryError::GitNotFound) => HistoryError::GitNotFound,
            Some(HistoryError::Cancelled) => HistoryError::Cancelled,
            Some(HistoryError::GrepLimit) => HistoryError::GrepLimit,
            Some(HistoryError::GrepParse { line }) => HistoryError::GrepParse { line: line.clone() },
            Some(HistoryError::Parse { what, line }) => HistoryError::Parse {
                what: *what,
                line: line.clone(),
            },
            Some(HistoryError::OperationDone) | None => HistoryError::OperationDone,
        }
    }

    /// Reads a file through the transaction's lock.
    pub fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        if self.done {
            return Err(io::Error::other(HistoryError::OperationDone.to_string()));
        }
        std::fs::read(path)
    }

    /// Writes a file, creating parent directories, and marks the transaction
    /// dirty.
    pub fn write_file(&mut self, path: &Path, data: &[u8]) -> Result<(), HistoryError> {
        if !self.usable() {
            return Err(self.err_copy());
        }
        self.files_changed = true;
        if let Err(e) = util::write_file(path, data) {
            self.err = Some(e.into());
            return Err(self.err_copy());
        }
        Ok(())
    }

    /// Streams `reader` into a file, creating parent directories, and marks
    /// the transaction dirty. Returns the number of bytes written.
    pub fn copy_file(
        &mut self,
        path: &Path,
        reader: &mut dyn io::Read,
    ) -> Result<u64, HistoryError> {
        if !self.usable() {
            return Err(self.err_copy());
        }
        self.files_changed = true;
        match util::copy_file(path, reader) {
            Ok(written) => Ok(written),
            Err(e) => {
                self.err = Some(e.into());
                Err(self.err_copy())
            }
        }
    }

    pub fn has_error(&self) -> bool {
        self.err.is_some()
    }

    pub fn error(&self) -> Option<&HistoryError> {
        self.err.as_ref()
    }

    /// Commits the staged changes, if any, and releases the lock. A backend
    /// failure rolls the working tree back. Terminal: later builder calls
    /// fail with `OperationDone`.
    pub fn apply(&mut self) -> Result<(), HistoryError> {
        if self.done {
            return Err(HistoryError::OperationDone);
        }
        if self.files_changed && self.err.is_none() {
            let author = format!("{}<{}>", self.name, self.email);
            let msg = self.user_msg.clone();
            self.gitop(&[
                "commit",
                "--author",
                author.as_str(),
                "-m",
                msg.as_str(),
                "--no-gpg-sign",
            ]);
        }
        if self.err.is_some() {
            let err = self.err_copy();
            self.abort();
            return Err(err);
        }
        self.done = true;
        self.guard.take();
        Ok(())
    }

    /// Rolls the working tree back if it was touched and releases the lock.
    /// Idempotent. A failed rollback leaves the tree in an unknown state, so
    /// it shuts the process down.
    pub fn abort(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if self.files_changed && self.hist.git_reset().is_err() {
            self.hist.process.shutdown();
        }
        self.guard.take();
    }
}

impl Drop for Op<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

impl FileReader for Op<'_> {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        Op::read_file(self, path)
    }
}

/// A read batch: a scoped token for the store read lock.
pub struct ReadOp<'a> {
    guard: Option<RwLockReadGuard<'a, ()>>,
    done: bool,
}

impl<'a> ReadOp<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, ()>) -> Self {
        Self {
            guard: Some(guard),
            done: false,
        }
    }

    pub fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        if self.done {
            return Err(io::Error::other(HistoryError::OperationDone.to_string()));
        }
        std::fs::read(path)
    }

    /// Releases the read lock. Idempotent.
    pub fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.guard.take();
        }
    }
}

impl Drop for ReadOp<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl FileReader for ReadOp<'_> {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        ReadOp::read_file(self, path)
    }
}
