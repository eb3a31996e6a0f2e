//! External process execution.
//!
//! Tools are started by the [`launcher`], which attaches their standard
//! streams to [`channel::Channel`]s and hands those to a
//! [`reactor::Reactor`] running on a dedicated worker thread. The caller keeps
//! a [`handle::ProcessHandle`] for input, termination and the completion.

pub mod args;
pub mod channel;
pub mod handle;
pub mod input;
pub mod launcher;
pub mod reactor;
pub mod terminal;

pub use channel::{Channel, ChannelKind, ChannelState};
pub use handle::{Completion, ProcessHandle, ProcessState};
pub use input::InputHandle;
pub use launcher::{
    launch, launch_with_events, run_captured, run_tool, CapturedOutput, Invocation, OutputSinks,
    ProcessEvent, ToolOutput,
};
pub use reactor::{DataCallback, Reactor, RunOutcome};
