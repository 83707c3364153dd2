use std::{
    os::unix::process::CommandExt,
    process::{self, Child, ChildStdin, ExitStatus, Stdio},
};

use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

use crate::{Cmd, Executor, Output, ProcessHandle, Result, Signal};

/// Runs commands on the host with [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

impl HostExecutor {
    fn command(cmd: &Cmd) -> process::Command {
        let mut command = process::Command::new(cmd.program());
        command.args(cmd.get_args());
        command
    }
}

impl Executor for HostExecutor {
    fn run(&self, cmd: &Cmd) -> Result<Output> {
        let mut command = Self::command(cmd);
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        tracing::debug!(%cmd, "running command");

        let output: Output = command.output()?.into();

        if !output.success() {
            tracing::debug!(?output.stderr, ?output.status, %cmd, "command returned non-zero status");
        }

        Ok(output)
    }

    fn spawn(&self, cmd: &Cmd) -> Result<Box<dyn ProcessHandle>> {
        let mut command = Self::command(cmd);
        command.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null()).process_group(0);

        tracing::debug!(%cmd, "spawning process group");

        let child = command.spawn()?;
        Ok(Box::new(ShellProcess::new(child)))
    }
}

/// A spawned process group, led by `child`.
///
/// The leader's standard input stays open for as long as the handle lives, which keeps
/// shells that read commands from stdin running. Dropping a handle whose leader is still
/// alive kills the whole group and reaps the leader.
#[derive(Debug)]
pub struct ShellProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    exited: Option<ExitStatus>,
}

impl ShellProcess {
    pub fn new(mut child: Child) -> Self {
        let stdin = child.stdin.take();
        Self { child, stdin, exited: None }
    }

    fn pgid(&self) -> Pid {
        // The leader's pid is the group id because it was spawned with `process_group(0)`.
        Pid::from_raw(self.child.id() as i32)
    }
}

impl ProcessHandle for ShellProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn signal_group(&mut self, signal: Signal) -> Result<()> {
        tracing::debug!(pid = self.child.id(), ?signal, "signalling process group");

        match killpg(self.pgid(), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn poll(&mut self) -> Result<Option<ExitStatus>> {
        if self.exited.is_none() {
            self.exited = self.child.try_wait()?;
        }

        Ok(self.exited)
    }

    fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exited {
            return Ok(status);
        }

        drop(self.stdin.take());
        let status = self.child.wait()?;
        self.exited = Some(status);
        Ok(status)
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.signal_group(Signal::SIGKILL) {
                tracing::error!(pid = self.child.id(), error = %e, "failed to kill process group");
            }
        }

        drop(self.stdin.take());
        if self.exited.is_none() {
            if let Err(e) = self.child.wait() {
                tracing::error!(pid = self.child.id(), error = %e, "failed to reap process");
            }
        }
    }
}
