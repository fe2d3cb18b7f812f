//! The revision store gateway: a single-writer / multi-reader wrapper over
//! the `git` command-line tool.
//!
//! A process-wide read-write lock gates every operation. Write transactions
//! ([`Op`]) take the write side, read batches ([`ReadOp`]) the read side, so
//! no commit ever races a concurrent read or write.

pub mod grep;
mod op;
mod revision;

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crossbeam::channel::{bounded, never, select};
use thiserror::Error;

use crate::config::GrepConfig;
use crate::process::Lifecycle;
use crate::util::FileReader;

pub use op::{Op, ReadOp};
pub use revision::{HyphaFilesAtRevision, RecentChanges, Revision, split_primitive_diff};

/// The synthetic committer identity used for all automated edits.
pub const WIKIMIND: &str = "wikimind";
const EMAIL_HOST: &str = "mycelium";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("could not find the git executable; check your $PATH")]
    GitNotFound,

    #[error("history operation is already done")]
    OperationDone,

    #[error("git {args:?} exited with {code:?}: {output}")]
    Backend {
        args: Vec<String>,
        code: Option<i32>,
        output: String,
    },

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("grep process limit exceeded")]
    GrepLimit,

    #[error("failed to parse grep output: {line}")]
    GrepParse { line: String },

    #[error("failed to parse git {what} output: {line}")]
    Parse { what: &'static str, line: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a piped git process was killed before it finished.
const KILL_NONE: u8 = 0;
const KILL_CANCELLED: u8 = 1;
const KILL_DEADLINE: u8 = 2;

/// How a [`History::git_pipe`] run ended.
pub(crate) enum PipeOutcome {
    /// The process ran to completion with this status.
    Completed(ExitStatus),
    /// The parser asked to stop; the process was killed.
    Stopped,
    /// The per-call deadline fired; partial output was parsed.
    TimedOut,
}

/// The gateway. One per wiki.
pub struct History {
    git_path: PathBuf,
    hyphae_dir: PathBuf,
    pub(crate) lock: RwLock<()>,
    pub(crate) process: Arc<Lifecycle>,
    pub(crate) grep_cfg: GrepConfig,
    pub(crate) grep_line_length: i64,
    pub(crate) grep_count: AtomicU32,
}

impl History {
    /// Locates the git binary and builds the gateway. Fails when git is not
    /// installed.
    pub fn start(
        hyphae_dir: impl Into<PathBuf>,
        process: Arc<Lifecycle>,
        grep_cfg: GrepConfig,
        grep_line_length: i64,
    ) -> Result<Self, HistoryError> {
        let git_path = find_git().ok_or(HistoryError::GitNotFound)?;
        Ok(Self {
            git_path,
            hyphae_dir: hyphae_dir.into(),
            lock: RwLock::new(()),
            process,
            grep_cfg,
            grep_line_length,
            grep_count: AtomicU32::new(0),
        })
    }

    pub fn hyphae_dir(&self) -> &Path {
        &self.hyphae_dir
    }

    /// Checks whether the hyphae directory is a git working tree and
    /// initializes one if not.
    pub fn init_repo(&self) -> Result<(), HistoryError> {
        let is_git_repo = match self.gitsh(&["rev-parse", "--git-dir"]) {
            Ok(out) => {
                let git_dir = String::from_utf8_lossy(&out).trim().to_string();
                let git_dir = Path::new(&git_dir);
                // An absolute .git outside the hyphae directory means we hit
                // an enclosing repository, not ours.
                !(git_dir.is_absolute() && !git_dir.starts_with(&self.hyphae_dir))
            }
            Err(_) => false,
        };
        if !is_git_repo {
            tracing::info!(path = %self.hyphae_dir.display(), "initializing git repo");
            self.gitsh(&["init"])?;
            self.gitsh(&["config", "core.quotePath", "false"])?;
        }
        Ok(())
    }

    /// Begins a write transaction, blocking until the write lock is free.
    pub fn operation(&self) -> Op<'_> {
        Op::new(self, self.lock.write().expect("history lock poisoned"))
    }

    /// Begins a read batch, blocking until the read lock is free.
    pub fn read_operation(&self) -> ReadOp<'_> {
        ReadOp::new(self.lock.read().expect("history lock poisoned"))
    }

    /// Tells whether the file differs from its last committed state.
    pub fn file_changed(&self, path: &Path) -> bool {
        let rel = self.shorter(path);
        self.gitsh(&["diff", "--exit-code", rel.as_str()]).is_err()
    }

    pub(crate) fn shorter(&self, path: &Path) -> String {
        path.strip_prefix(&self.hyphae_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.args(args)
            .current_dir(&self.hyphae_dir)
            .env("GIT_COMMITTER_NAME", WIKIMIND)
            .env("GIT_COMMITTER_EMAIL", format!("{WIKIMIND}@{EMAIL_HOST}"));
        cmd
    }

    /// Runs git to completion and captures its output. A failed `commit`
    /// whose output says "nothing to commit" counts as success.
    pub(crate) fn gitsh(&self, args: &[&str]) -> Result<Vec<u8>, HistoryError> {
        tracing::info!("> git {}", args.join(" "));
        let output = self.command(args).output()?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        if output.status.success() {
            return Ok(combined);
        }
        let text = String::from_utf8_lossy(&combined).into_owned();
        if args.first() == Some(&"commit") && text.contains("nothing to commit") {
            tracing::info!(output = %text, "nothing to commit");
            return Ok(combined);
        }
        tracing::error!(?args, code = ?output.status.code(), output = %text, "git command failed");
        Err(HistoryError::Backend {
            args: args.iter().map(|s| s.to_string()).collect(),
            code: output.status.code(),
            output: text,
        })
    }

    /// Hard-resets the working tree and removes untracked files. Used to
    /// roll back an aborted write transaction.
    pub(crate) fn git_reset(&self) -> Result<(), HistoryError> {
        tracing::info!("resetting git working directory");
        let mut ret = Ok(());
        if let Err(e) = self.gitsh(&["reset", "--hard"]) {
            ret = Err(e);
        }
        if let Err(e) = self.gitsh(&["clean", "-d", "-f"]) {
            ret = Err(e);
        }
        if ret.is_err() {
            tracing::error!("failed to reset working tree");
        }
        ret
    }

    /// Launches git and feeds its stdout to `parse` line by line. The parser
    /// returns whether to keep going; returning an error or `false` kills
    /// the process. Cancellation comes from the shared process context, and
    /// `timeout` adds a per-call deadline on top.
    ///
    /// Error precedence: a parser error wins over cancellation, which wins
    /// over the exit status.
    pub(crate) fn git_pipe<F>(
        &self,
        args: &[&str],
        timeout: Option<Duration>,
        mut parse: F,
    ) -> Result<PipeOutcome, HistoryError>
    where
        F: FnMut(&str) -> Result<bool, HistoryError>,
    {
        use std::io::BufRead;

        tracing::info!("> git {}", args.join(" "));
        let mut child = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("git stdout pipe missing"))?;
        let child = Arc::new(Mutex::new(child));
        let kill_reason = Arc::new(AtomicU8::new(KILL_NONE));

        // The watchdog kills the child on shutdown or deadline; the reader
        // then sees EOF and unwinds. `pipe_alive` going out of scope stops
        // the watchdog.
        let (pipe_alive, pipe_done) = bounded::<()>(0);
        let watchdog = {
            let child = Arc::clone(&child);
            let kill_reason = Arc::clone(&kill_reason);
            let cancel = self.process.done();
            let deadline = timeout.map_or_else(never, crossbeam::channel::after);
            std::thread::spawn(move || {
                let reason = select! {
                    recv(cancel) -> _ => KILL_CANCELLED,
                    recv(deadline) -> _ => KILL_DEADLINE,
                    recv(pipe_done) -> _ => return,
                };
                kill_reason.store(reason, Ordering::SeqCst);
                kill_child(&child);
            })
        };

        let finish = |child: &Arc<Mutex<Child>>| -> io::Result<ExitStatus> {
            child.lock().expect("git child lock poisoned").wait()
        };

        let reader = io::BufReader::new(stdout);
        let mut stopped = false;
        let mut parse_err = None;
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(?args, err = %e, "git pipe read error");
                    parse_err = Some(HistoryError::Io(e));
                    break;
                }
            };
            match parse(&line) {
                Ok(true) => {}
                Ok(false) => {
                    stopped = true;
                    break;
                }
                Err(e) => {
                    parse_err = Some(e);
                    break;
                }
            }
        }
        if stopped || parse_err.is_some() {
            kill_child(&child);
        }
        drop(pipe_alive);
        let status = finish(&child);
        let _ = watchdog.join();

        if let Some(e) = parse_err {
            return Err(e);
        }
        match kill_reason.load(Ordering::SeqCst) {
            KILL_CANCELLED => return Err(HistoryError::Cancelled),
            KILL_DEADLINE => return Ok(PipeOutcome::TimedOut),
            _ => {}
        }
        if stopped {
            return Ok(PipeOutcome::Stopped);
        }
        Ok(PipeOutcome::Completed(status?))
    }
}

/// Reading through the gateway takes the read lock for the duration of the
/// read.
impl FileReader for History {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let _guard = self.lock.read().expect("history lock poisoned");
        std::fs::read(path)
    }
}

fn kill_child(child: &Arc<Mutex<Child>>) {
    let mut child = child.lock().expect("git child lock poisoned");
    let _ = child.kill();
}

fn find_git() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join("git");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
