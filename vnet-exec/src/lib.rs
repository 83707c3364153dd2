#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Blocking command execution for vnet.
//!
//! Every privileged operation in vnet (namespace creation, interface pairs, queueing
//! disciplines, cleanup sweeps) is an external command. This crate gives those commands a
//! single seam, the [`Executor`] trait, so the rest of the workspace never touches
//! [`std::process::Command`] directly and can be driven by the recording executor in
//! [`mock`] during tests.
//!
//! Long-lived processes (node shells) are spawned as process-group leaders and returned as
//! [`ProcessHandle`]s, which signal the whole group rather than the leader only.

use std::{fmt, io, process, time::Duration};

mod host;
pub use host::{HostExecutor, ShellProcess};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use nix::sys::signal::Signal;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("non-zero exit status ({}): {}", .0.status, .0.stderr.trim())]
    NonZero(Output),
    #[error("signal error: {0}")]
    Nix(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A program invocation: the program name and its arguments.
///
/// Rendering a [`Cmd`] with [`fmt::Display`] joins the parts with single spaces, which is
/// the form that shows up in logs and in recorded test histories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// A script run by `sh -c`, for pipelines, globs and redirections.
    pub fn sh(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Splits a command line on ASCII whitespace. No quoting is interpreted.
    pub fn parse(line: &str) -> Result<Self> {
        let mut iter = line.split_ascii_whitespace();
        let program = iter.next().ok_or(Error::Empty)?;
        Ok(Self::new(program).args(iter))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs this command through `prefix`, e.g. `nsenter --target 42 --net --` followed by
    /// this command's program and arguments.
    pub fn wrapped_in(self, prefix: Self) -> Self {
        prefix.arg(self.program).args(self.args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Output {
    pub status: process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Standard output followed by standard error, trimmed. This is what a shell attached to
    /// a terminal would have shown for the command.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out.trim().to_string()
    }
}

impl From<process::Output> for Output {
    fn from(value: process::Output) -> Self {
        Self {
            status: value.status,
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

/// Runs commands to completion and spawns long-lived processes.
pub trait Executor: fmt::Debug + Send + Sync {
    /// Runs `cmd` and waits for it. A non-zero exit status is not an error here; see
    /// [`Executor::run_checked`].
    fn run(&self, cmd: &Cmd) -> Result<Output>;

    /// Spawns `cmd` as the leader of a new process group with its standard input held open.
    fn spawn(&self, cmd: &Cmd) -> Result<Box<dyn ProcessHandle>>;

    /// Blocks the caller. Overridden by test executors so retry loops run instantly.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Like [`Executor::run`], but a non-zero exit status becomes [`Error::NonZero`].
    fn run_checked(&self, cmd: &Cmd) -> Result<Output> {
        let output = self.run(cmd)?;
        if !output.success() {
            return Err(Error::NonZero(output));
        }

        Ok(output)
    }

    /// Runs `cmd` for its standard output, treating every failure as empty output.
    ///
    /// Used on recovery paths where a missing tool or a failed listing simply means there is
    /// nothing to act on.
    fn run_lossy(&self, cmd: &Cmd) -> String {
        match self.run(cmd) {
            Ok(output) if output.success() => output.stdout,
            Ok(output) => {
                tracing::debug!(%cmd, status = %output.status, "command failed, ignoring output");
                String::new()
            }
            Err(e) => {
                tracing::debug!(%cmd, error = %e, "command could not run, ignoring");
                String::new()
            }
        }
    }
}

/// A handle to a spawned process that leads its own process group.
pub trait ProcessHandle: fmt::Debug + Send {
    fn pid(&self) -> u32;

    /// Delivers `signal` to every process in the group. A group that is already gone is not
    /// an error.
    fn signal_group(&mut self, signal: Signal) -> Result<()>;

    /// Returns the exit status if the leader has exited, without blocking.
    fn poll(&mut self) -> Result<Option<process::ExitStatus>>;

    /// Closes the process' standard input and waits for the leader to exit.
    fn wait(&mut self) -> Result<process::ExitStatus>;

    fn is_alive(&mut self) -> bool {
        matches!(self.poll(), Ok(None))
    }
}
