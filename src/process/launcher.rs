//! Tool process launcher.
//!
//! Two modes are supported:
//! - **Reactor mode** ([`launch`], [`launch_with_events`], [`run_tool`]): the
//!   child's streams are attached to pipes or pseudo-terminals and serviced
//!   by a [`Reactor`] on a dedicated worker thread.
//! - **Captured mode** ([`run_captured`]): plain pipes, stdin written in
//!   full, then the caller blocks until the child exits.

use std::io::Write;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::TerminalConfig;
use crate::editor::{resolve_placeholders, EditorState};
use crate::models::tool::Tool;
use crate::process::args::parse_arguments;
use crate::process::channel::Channel;
use crate::process::handle::{Completion, ProcessHandle, SharedState};
use crate::process::input::InputHandle;
use crate::process::reactor::{DataCallback, Reactor, RunOutcome};
use crate::process::terminal::TOOL_ENVIRONMENT;
use crate::{AppError, Result};

/// How often the worker checks whether the child has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── Resolved invocation ──────────────────────────────────────────────────────

/// A tool with every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable.
    pub program: String,
    /// Parsed arguments.
    pub arguments: Vec<String>,
    /// Working directory; `None` inherits the current one.
    pub working_directory: Option<PathBuf>,
    /// Bytes written to stdin.
    pub input: String,
}

impl Invocation {
    /// Substitute placeholders in `tool` against `editor` and parse arguments.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the working directory is set but is not
    /// a directory.
    pub fn resolve(tool: &Tool, editor: &dyn EditorState) -> Result<Self> {
        let program = resolve_placeholders(&tool.path, editor);
        let arguments = parse_arguments(&resolve_placeholders(&tool.arguments, editor));
        let input = resolve_placeholders(&tool.input, editor);

        let directory = resolve_placeholders(&tool.working_directory, editor);
        let working_directory = if directory.trim().is_empty() {
            None
        } else {
            let path = PathBuf::from(directory);
            if !path.is_dir() {
                return Err(AppError::Launch(format!(
                    "working directory {} is not a directory",
                    path.display()
                )));
            }
            Some(path)
        };

        Ok(Self {
            program,
            arguments,
            working_directory,
            input,
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.arguments)
            .envs(TOOL_ENVIRONMENT.iter().copied());
        if let Some(directory) = &self.working_directory {
            command.current_dir(directory);
        }
        command
    }
}

// ── Reactor mode ─────────────────────────────────────────────────────────────

/// Callbacks receiving a process's output.
pub struct OutputSinks {
    /// Receives standard output chunks.
    pub stdout: DataCallback,
    /// Receives standard error chunks.
    pub stderr: DataCallback,
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSinks").finish_non_exhaustive()
    }
}

/// Output event from a process launched with [`launch_with_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Standard output chunk; never empty.
    Output(Bytes),
    /// Standard error chunk; never empty.
    Error(Bytes),
}

/// Launch `tool` and deliver its output to `sinks` from a worker thread.
///
/// Placeholders are resolved against `editor`. In TTY mode stdout and stderr
/// are each attached to their own pseudo-terminal configured from
/// `terminal`; stdin is always a pipe. The tool's `input` is written to stdin
/// by the worker; further input can be sent through the returned handle.
///
/// # Errors
///
/// Returns `AppError::Launch` if channels cannot be created, the working
/// directory is invalid or the executable cannot be started.
pub fn launch(
    tool: &Tool,
    editor: &dyn EditorState,
    terminal: &TerminalConfig,
    sinks: OutputSinks,
) -> Result<ProcessHandle> {
    let invocation = Invocation::resolve(tool, editor)?;

    let mut stdin = Channel::pipe()?;
    let child_stdin = child_end(stdin.take_read(), "stdin")?;
    // Only the parent's end; the child keeps a blocking stdin.
    stdin.set_nonblocking()?;
    let (input, wake) = InputHandle::attached()?;
    let (mut stdout, mut stderr) = if tool.use_tty_mode {
        (Channel::terminal(terminal)?, Channel::terminal(terminal)?)
    } else {
        (Channel::pipe()?, Channel::pipe()?)
    };

    let mut command = invocation.command();
    command
        .stdin(child_stdin)
        .stdout(child_end(stdout.take_write(), "stdout")?)
        .stderr(child_end(stderr.take_write(), "stderr")?);

    let child = command.spawn().map_err(|err| {
        AppError::Launch(format!("failed to execute {}: {err}", invocation.program))
    })?;
    // Close the parent's copies of the child ends so EOF is observable.
    drop(command);

    let pid = child.id();
    info!(
        tool = tool.display_name(),
        pid,
        tty = tool.use_tty_mode,
        program = %invocation.program,
        "tool launched"
    );

    let mut reactor = Reactor::new();
    reactor.add_reader(stdout, sinks.stdout);
    reactor.add_reader(stderr, sinks.stderr);

    reactor.set_writer(stdin, wake, invocation.input.as_bytes(), input.clone());

    let deadline = tool.timeout().map(|timeout| Instant::now() + timeout);
    let state = SharedState::running();
    let (completion_tx, completion_rx) = oneshot::channel();

    let worker_state = state.clone();
    let name = tool.display_name().to_owned();
    let worker_name = name.clone();
    let worker = thread::Builder::new()
        .name(format!("tool-{pid}"))
        .spawn(move || {
            let completion = service(child, reactor, deadline, &worker_state, &worker_name);
            worker_state.set(completion.state);
            let _ = completion_tx.send(completion);
        })
        .map_err(|err| {
            kill_pid(pid);
            AppError::Launch(format!("failed to start worker thread: {err}"))
        })?;

    Ok(ProcessHandle::new(
        name,
        pid,
        input,
        state,
        completion_rx,
        worker,
    ))
}

/// Launch `tool` and receive its output as [`ProcessEvent`]s.
///
/// The receiver ends once both output streams are closed.
///
/// # Errors
///
/// Same as [`launch`].
pub fn launch_with_events(
    tool: &Tool,
    editor: &dyn EditorState,
    terminal: &TerminalConfig,
) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<ProcessEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let error_tx = tx.clone();
    let sinks = OutputSinks {
        stdout: Box::new(move |bytes| {
            let _ = tx.send(ProcessEvent::Output(Bytes::copy_from_slice(bytes)));
        }),
        stderr: Box::new(move |bytes| {
            let _ = error_tx.send(ProcessEvent::Error(Bytes::copy_from_slice(bytes)));
        }),
    };
    let handle = launch(tool, editor, terminal, sinks)?;
    Ok((handle, rx))
}

/// Everything a reactor-mode tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Concatenated standard output.
    pub stdout: Vec<u8>,
    /// Concatenated standard error.
    pub stderr: Vec<u8>,
    /// Number of stdout events received.
    pub stdout_events: usize,
    /// Number of stderr events received.
    pub stderr_events: usize,
    /// How the process ended.
    pub completion: Completion,
}

/// Launch `tool`, collect all of its output and wait for it to finish.
///
/// Stdin is closed after the configured input is written.
///
/// # Errors
///
/// Same as [`launch`], plus `AppError::Io` if the worker vanished.
pub async fn run_tool(
    tool: &Tool,
    editor: &dyn EditorState,
    terminal: &TerminalConfig,
) -> Result<ToolOutput> {
    let (mut handle, mut events) = launch_with_events(tool, editor, terminal)?;
    // Nothing beyond the configured input will be sent.
    handle.close_input();

    let mut output = ToolOutput {
        stdout: Vec::new(),
        stderr: Vec::new(),
        stdout_events: 0,
        stderr_events: 0,
        completion: Completion::finished(None, false),
    };
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Output(bytes) => {
                output.stdout_events += 1;
                output.stdout.extend_from_slice(&bytes);
            }
            ProcessEvent::Error(bytes) => {
                output.stderr_events += 1;
                output.stderr.extend_from_slice(&bytes);
            }
        }
    }

    output.completion = handle.join().await?;
    Ok(output)
}

/// Worker thread body: service streams, then reap the child.
fn service(
    mut child: Child,
    mut reactor: Reactor,
    deadline: Option<Instant>,
    state: &SharedState,
    name: &str,
) -> Completion {
    let pid = child.id();
    let (deadline, timed_out) = match reactor.run(deadline) {
        Ok(RunOutcome::Drained) => (deadline, false),
        Ok(RunOutcome::TimedOut) => {
            warn!(tool = name, pid, "tool timed out; killing it");
            let _ = child.kill();
            (None, true)
        }
        Err(err) => {
            error!(tool = name, pid, %err, "servicing tool streams failed");
            drop(reactor);
            let _ = child.kill();
            let _ = wait_for_exit(&mut child, state, None);
            return Completion::failed(err.to_string());
        }
    };
    drop(reactor);

    match wait_for_exit(&mut child, state, deadline) {
        Ok((status, killed)) => {
            debug!(tool = name, pid, code = ?status.code(), "tool exited");
            Completion::finished(status.code(), timed_out || killed)
        }
        Err(err) => Completion::failed(format!("failed to reap process {pid}: {err}")),
    }
}

/// Wait for `child` to exit, killing it if `deadline` passes first.
///
/// The child is only reaped through [`SharedState::try_reap`]. The returned
/// flag tells whether it had to be killed.
fn wait_for_exit(
    child: &mut Child,
    state: &SharedState,
    deadline: Option<Instant>,
) -> std::io::Result<(ExitStatus, bool)> {
    let mut killed = false;
    loop {
        if let Some(status) = state.try_reap(child)? {
            return Ok((status, killed));
        }
        if !killed && deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!(
                pid = child.id(),
                "tool closed its streams but did not exit in time; killing it"
            );
            let _ = child.kill();
            killed = true;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn child_end(fd: Option<OwnedFd>, stream: &str) -> Result<Stdio> {
    fd.map(Stdio::from)
        .ok_or_else(|| AppError::Launch(format!("{stream} channel has no child end")))
}

fn kill_pid(pid: u32) {
    if let Ok(raw) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(raw), Signal::SIGKILL);
    }
}

// ── Captured mode ────────────────────────────────────────────────────────────

/// Output of [`run_captured`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
    /// Exit code; `None` if killed by a signal.
    pub exit_code: Option<i32>,
}

/// Run `tool` over plain pipes and block until it exits.
///
/// The whole `input` is written and stdin closed before output is drained, so
/// a tool that fills its output pipe before reading all input will stall.
/// Reactor mode has no such limitation.
///
/// # Errors
///
/// Returns `AppError::Launch` if the tool cannot be started and
/// `AppError::Io` if waiting for it fails.
pub fn run_captured(tool: &Tool, editor: &dyn EditorState) -> Result<CapturedOutput> {
    let invocation = Invocation::resolve(tool, editor)?;
    let mut child = invocation
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::Launch(format!("failed to execute {}: {err}", invocation.program))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(invocation.input.as_bytes()) {
            debug!(tool = tool.display_name(), %err, "tool stopped reading its input");
        }
    }

    let output = child.wait_with_output()?;
    Ok(CapturedOutput {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.status.code(),
    })
}
