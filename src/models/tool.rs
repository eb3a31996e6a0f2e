//! External tool definition.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What kind of program a tool is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// A program that is executed and whose output is displayed.
    #[default]
    Generic,
    /// A program implementing the server side of the language server protocol.
    LspServer,
}

/// What to do with the text a tool prints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// Discard the text.
    #[default]
    Ignore,
    /// Insert the text, without control sequences, at the cursor.
    Paste,
    /// Append the styled text to the console.
    Console,
    /// Show the styled text in a popup window.
    Popup,
    /// Replace the current document with the styled text.
    ReplaceDocument,
}

/// When a tool runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Only when run explicitly.
    #[default]
    None,
    /// When its keyboard shortcut is pressed.
    KeyboardShortcut,
    /// After the current file was saved.
    OnSaveFile,
    /// After the current file was modified.
    OnFileEdit,
    /// When the project is built.
    OnBuild,
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::KeyboardShortcut => "keyboard shortcut",
            Self::OnSaveFile => "saving a file",
            Self::OnFileEdit => "editing a file",
            Self::OnBuild => "building",
        };
        f.write_str(label)
    }
}

/// How to run an external program such as a compiler: its input, output
/// handling, activation and limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Tool {
    /// Display name; unique within a configuration.
    pub name: String,
    /// Tool kind.
    #[serde(default, rename = "type")]
    pub tool_type: ToolType,
    /// Executable path or name looked up in `PATH`. May contain placeholders.
    pub path: String,
    /// Argument string; double quotes group words into one argument.
    #[serde(default)]
    pub arguments: String,
    /// Text written to the tool's standard input.
    #[serde(default)]
    pub input: String,
    /// Working directory; empty means the current directory.
    #[serde(default)]
    pub working_directory: String,
    /// Handling of standard output.
    #[serde(default)]
    pub output: OutputTarget,
    /// Handling of standard error.
    #[serde(default)]
    pub error: OutputTarget,
    /// Activation trigger.
    #[serde(default)]
    pub activation: Activation,
    /// Keyboard shortcut text for [`Activation::KeyboardShortcut`].
    #[serde(default)]
    pub shortcut: Option<String>,
    /// Timeout in milliseconds; 0 means unlimited.
    #[serde(default)]
    pub timeout_ms: u64,
    /// Attach stdout and stderr to pseudo-terminals.
    #[serde(default = "default_true")]
    pub use_tty_mode: bool,
    /// Whether the tool is available at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Tool {
    /// Create a generic, enabled, TTY-mode tool for `path` with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_type: ToolType::Generic,
            path: path.into(),
            arguments: String::new(),
            input: String::new(),
            working_directory: String::new(),
            output: OutputTarget::Ignore,
            error: OutputTarget::Ignore,
            activation: Activation::None,
            shortcut: None,
            timeout_ms: 0,
            use_tty_mode: true,
            enabled: true,
        }
    }

    /// The process timeout, or `None` when unlimited.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Name used in messages; falls back to the path when unnamed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.path
        } else {
            &self.name
        }
    }
}
