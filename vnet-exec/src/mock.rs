//! A recording [`Executor`] for tests.
//!
//! [`RecordingExecutor`] never runs anything. It records every command line, answers with
//! scripted outputs and hands out fake process handles that remember the signals they
//! received.

use std::{
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use crate::{Cmd, Executor, Output, ProcessHandle, Result, Signal};

/// An [`Output`] with the given exit code.
pub fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// A successful [`Output`] printing `stdout`.
pub fn ok(stdout: &str) -> Output {
    output(0, stdout, "")
}

/// A failed [`Output`] printing `stderr`.
pub fn failed(code: i32, stderr: &str) -> Output {
    output(code, "", stderr)
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    output: Output,
}

#[derive(Debug, Default)]
struct State {
    history: Vec<String>,
    rules: Vec<Rule>,
    sleeps: Vec<Duration>,
    processes: Vec<Arc<Mutex<FakeState>>>,
    next_pid: u32,
}

/// Records commands and answers them from a list of rules.
///
/// A rule matches when the rendered command line contains its pattern. Rules added later
/// take precedence, so a test can change the answer for a command halfway through.
/// Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    state: Mutex<State>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, pattern: impl Into<String>, output: Output) -> &Self {
        self.state.lock().rules.push(Rule { pattern: pattern.into(), output });
        self
    }

    /// Every command line run or spawned so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    /// Commands whose line contains `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        self.state.lock().history.iter().filter(|line| line.contains(pattern)).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// Signals delivered to the process spawned with `pid`.
    pub fn signals(&self, pid: u32) -> Vec<Signal> {
        let state = self.state.lock();
        state
            .processes
            .iter()
            .map(|p| p.lock())
            .find(|p| p.pid == pid)
            .map(|p| p.signals.clone())
            .unwrap_or_default()
    }

    /// Whether the fake process spawned with `pid` is still running.
    pub fn is_running(&self, pid: u32) -> bool {
        let state = self.state.lock();
        state.processes.iter().map(|p| p.lock()).any(|p| p.pid == pid && p.alive)
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, cmd: &Cmd) -> Result<Output> {
        let line = cmd.to_string();
        let mut state = self.state.lock();
        state.history.push(line.clone());

        let output = state
            .rules
            .iter()
            .rev()
            .find(|rule| line.contains(&rule.pattern))
            .map(|rule| rule.output.clone())
            .unwrap_or_else(|| ok(""));

        Ok(output)
    }

    fn spawn(&self, cmd: &Cmd) -> Result<Box<dyn ProcessHandle>> {
        let mut state = self.state.lock();
        state.history.push(cmd.to_string());

        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        let fake = Arc::new(Mutex::new(FakeState { pid, alive: true, signals: Vec::new() }));
        state.processes.push(Arc::clone(&fake));

        Ok(Box::new(FakeProcess { state: fake }))
    }

    fn sleep(&self, duration: Duration) {
        self.state.lock().sleeps.push(duration);
    }
}

#[derive(Debug)]
struct FakeState {
    pid: u32,
    alive: bool,
    signals: Vec<Signal>,
}

/// A process handle that exits on any terminating signal.
#[derive(Debug)]
pub struct FakeProcess {
    state: Arc<Mutex<FakeState>>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.state.lock().pid
    }

    fn signal_group(&mut self, signal: Signal) -> Result<()> {
        let mut state = self.state.lock();
        state.signals.push(signal);
        if matches!(signal, Signal::SIGHUP | Signal::SIGTERM | Signal::SIGKILL) {
            state.alive = false;
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ExitStatus>> {
        let state = self.state.lock();
        Ok((!state.alive).then(|| ExitStatus::from_raw(0)))
    }

    fn wait(&mut self) -> Result<ExitStatus> {
        self.state.lock().alive = false;
        Ok(ExitStatus::from_raw(0))
    }
}
