//! Handle to a running tool process.

use std::io;
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::process::input::InputHandle;
use crate::{AppError, Result};

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The child is running or its streams are still being serviced.
    Running,
    /// Servicing the process failed.
    Error,
    /// The child exited and every stream was drained.
    Finished,
}

impl ProcessState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

/// Final result of a process, delivered exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// `Finished` or `Error`.
    pub state: ProcessState,
    /// Exit code; `None` if the child was killed by a signal or never reaped.
    pub exit_code: Option<i32>,
    /// Whether the process hit its timeout and was killed.
    pub timed_out: bool,
    /// Failure description for `ProcessState::Error`.
    pub error: Option<String>,
}

impl Completion {
    pub(crate) fn finished(exit_code: Option<i32>, timed_out: bool) -> Self {
        Self {
            state: ProcessState::Finished,
            exit_code,
            timed_out,
            error: None,
        }
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            state: ProcessState::Error,
            exit_code: None,
            timed_out: false,
            error: Some(error.into()),
        }
    }

    /// Finished in time with exit code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.state == ProcessState::Finished && !self.timed_out && self.exit_code == Some(0)
    }
}

/// How often a grace-period watchdog checks whether the child is gone.
const GRACE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State cell shared between the handle and the worker thread.
///
/// The worker reaps the child while holding the lock and leaves `Running` in
/// the same critical section, and signals are only sent under the lock while
/// the state is still `Running`. A signal therefore never reaches a pid the
/// OS may already have recycled.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<Mutex<ProcessState>>);

impl SharedState {
    pub(crate) fn running() -> Self {
        Self(Arc::new(Mutex::new(ProcessState::Running)))
    }

    pub(crate) fn set(&self, state: ProcessState) {
        *self.0.lock() = state;
    }

    pub(crate) fn get(&self) -> ProcessState {
        *self.0.lock()
    }

    /// Send `signal` to `pid` unless the child was already reaped.
    pub(crate) fn signal(&self, pid: Pid, signal: Signal) -> Result<()> {
        let state = self.0.lock();
        if *state == ProcessState::Running {
            kill(pid, signal)?;
        }
        Ok(())
    }

    /// Reap `child` if it has exited, leaving `Running` as it is reaped.
    pub(crate) fn try_reap(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let mut state = self.0.lock();
        match child.try_wait() {
            Ok(Some(status)) => {
                *state = ProcessState::Finished;
                Ok(Some(status))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                *state = ProcessState::Error;
                Err(err)
            }
        }
    }
}

/// Owner of a launched tool process.
///
/// Dropping the handle closes stdin and kills the child if it is still
/// running, or after the grace period set with [`ProcessHandle::set_drop_grace`];
/// the worker thread then drains and exits on its own.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    pid: u32,
    input: InputHandle,
    state: SharedState,
    completion: Option<oneshot::Receiver<Completion>>,
    worker: Option<JoinHandle<()>>,
    drop_grace: Duration,
}

impl ProcessHandle {
    pub(crate) fn new(
        name: String,
        pid: u32,
        input: InputHandle,
        state: SharedState,
        completion: oneshot::Receiver<Completion>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            pid,
            input,
            state,
            completion: Some(completion),
            worker: Some(worker),
            drop_grace: Duration::ZERO,
        }
    }

    /// Tool name the process was launched for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state.get()
    }

    /// Shared stdin handle, usable from any thread.
    #[must_use]
    pub fn input(&self) -> &InputHandle {
        &self.input
    }

    /// Write `bytes` to the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if stdin is closed.
    pub fn send_input(&self, bytes: &[u8]) -> Result<()> {
        self.input.send(bytes)
    }

    /// Close the child's stdin.
    pub fn close_input(&self) {
        self.input.close();
    }

    /// Let the child exit on its own for up to `grace` after the handle is
    /// dropped before it is killed.
    ///
    /// Stdin is still closed on drop, so a child waiting for end-of-file
    /// can finish cleanly.
    pub fn set_drop_grace(&mut self, grace: Duration) {
        self.drop_grace = grace;
    }

    /// Ask the child to terminate with `SIGTERM`.
    ///
    /// Does nothing once the process has finished.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the signal cannot be delivered.
    pub fn terminate(&self) -> Result<()> {
        self.state.signal(self.os_pid()?, Signal::SIGTERM)
    }

    /// Kill the child with `SIGKILL`.
    ///
    /// Does nothing once the process has finished.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the signal cannot be delivered.
    pub fn kill(&self) -> Result<()> {
        self.state.signal(self.os_pid()?, Signal::SIGKILL)
    }

    /// Close stdin and wait for the completion.
    ///
    /// Cancelling the returned future (e.g. with a timeout) leaves the
    /// completion in place, so `join` can be called again.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the process was already joined or the
    /// worker thread died without reporting a completion.
    pub async fn join(&mut self) -> Result<Completion> {
        self.input.close();
        let receiver = self
            .completion
            .as_mut()
            .ok_or_else(|| AppError::Io(format!("process {} was already joined", self.pid)))?;
        let received = receiver.await;
        self.completion = None;
        let completion = received.map_err(|_| {
            AppError::Io(format!("worker for process {} exited unexpectedly", self.pid))
        })?;

        // The completion is the worker's last action, so this returns at once.
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(pid = self.pid, "process worker panicked after completing");
            }
        }
        Ok(completion)
    }

    fn os_pid(&self) -> Result<Pid> {
        i32::try_from(self.pid)
            .map(Pid::from_raw)
            .map_err(|_| AppError::Io(format!("pid {} out of range", self.pid)))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.input.close();
        if self.state() != ProcessState::Running {
            return;
        }
        let Ok(pid) = self.os_pid() else {
            return;
        };

        if self.drop_grace.is_zero() {
            debug!(pid = self.pid, tool = %self.name, "killing process on drop");
            let _ = self.state.signal(pid, Signal::SIGKILL);
            return;
        }

        let state = self.state.clone();
        let deadline = Instant::now() + self.drop_grace;
        let name = self.name.clone();
        let watchdog = thread::Builder::new()
            .name(format!("grace-{}", self.pid))
            .spawn(move || {
                while Instant::now() < deadline {
                    if state.get() != ProcessState::Running {
                        return;
                    }
                    thread::sleep(GRACE_POLL_INTERVAL);
                }
                if state.get() == ProcessState::Running {
                    warn!(%pid, tool = %name, "process did not exit after drop; killing it");
                    let _ = state.signal(pid, Signal::SIGKILL);
                }
            });
        if let Err(err) = watchdog {
            warn!(pid = self.pid, %err, "no grace watchdog; killing process on drop");
            let _ = self.state.signal(pid, Signal::SIGKILL);
        }
    }
}
