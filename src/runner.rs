//! Running configured tools end to end.
//!
//! [`ToolRunner`] launches a tool, collects its output, reports failures to
//! the status sink and decides how each stream should be presented.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TerminalConfig;
use crate::editor::{EditorState, StatusSink};
use crate::models::tool::{Activation, Tool, ToolType};
use crate::output::{present, OutputOrigin, Presentation};
use crate::process::{run_tool, ToolOutput};
use crate::Result;

/// Result of one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Tool name.
    pub tool: String,
    /// Collected output and completion.
    pub output: ToolOutput,
    /// Presentation of standard output.
    pub stdout: Presentation,
    /// Presentation of standard error.
    pub stderr: Presentation,
}

/// Runs generic tools against the current editor state.
#[derive(Clone)]
pub struct ToolRunner {
    terminal: TerminalConfig,
    editor: Arc<dyn EditorState>,
    status: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for ToolRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRunner")
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

impl ToolRunner {
    /// Runner using `terminal` for TTY-mode tools.
    pub fn new(
        terminal: TerminalConfig,
        editor: Arc<dyn EditorState>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            terminal,
            editor,
            status,
        }
    }

    /// Run `tool` to completion.
    ///
    /// Launch failures, timeouts and worker errors are reported to the status
    /// sink. Output for document-editing targets is marked stale if the
    /// editor state changed while the tool ran.
    ///
    /// # Errors
    ///
    /// Returns the launch error if the tool could not be started.
    pub async fn run(&self, tool: &Tool) -> Result<RunReport> {
        let name = tool.display_name();
        let launched_token = self.editor.state_token();

        let output = match run_tool(tool, self.editor.as_ref(), &self.terminal).await {
            Ok(output) => output,
            Err(err) => {
                self.status.report(&format!(
                    "The tool \"{name}\" activated by {} failed to execute: {err}",
                    tool.activation
                ));
                return Err(err);
            }
        };

        let completion = &output.completion;
        if completion.timed_out {
            self.status.report(&format!(
                "The tool \"{name}\" timed out after {} ms and was stopped",
                tool.timeout_ms
            ));
        } else if let Some(error) = &completion.error {
            self.status
                .report(&format!("The tool \"{name}\" failed: {error}"));
        } else {
            debug!(tool = name, exit_code = ?completion.exit_code, "tool finished");
        }

        let stdout = present(
            &output.stdout,
            tool.output,
            OutputOrigin {
                title: name,
                is_error: false,
                launched_token,
            },
            self.editor.as_ref(),
        );
        let stderr = present(
            &output.stderr,
            tool.error,
            OutputOrigin {
                title: name,
                is_error: true,
                launched_token,
            },
            self.editor.as_ref(),
        );

        Ok(RunReport {
            tool: name.to_owned(),
            output,
            stdout,
            stderr,
        })
    }

    /// Run every enabled generic tool in `tools` triggered by `activation`,
    /// one after another.
    ///
    /// Tools that fail to launch are reported and skipped.
    pub async fn run_activation(&self, tools: &[Tool], activation: Activation) -> Vec<RunReport> {
        let mut reports = Vec::new();
        for tool in tools.iter().filter(|tool| {
            tool.enabled && tool.tool_type == ToolType::Generic && tool.activation == activation
        }) {
            info!(tool = tool.display_name(), %activation, "running triggered tool");
            if let Ok(report) = self.run(tool).await {
                reports.push(report);
            }
        }
        reports
    }
}
