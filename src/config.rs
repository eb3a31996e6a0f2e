//! Global configuration parsing and validation.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::models::tool::{Tool, ToolType};
use crate::{AppError, Result};

/// Line discipline and window size applied to tool pseudo-terminals.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TerminalConfig {
    /// Window height in character cells.
    #[serde(default = "default_rows")]
    pub rows: u16,
    /// Window width in character cells.
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Canonical (line-buffered) input processing.
    #[serde(default = "default_true")]
    pub canonical: bool,
    /// Generate signals for interrupt/quit/suspend characters.
    #[serde(default = "default_true")]
    pub signals: bool,
    /// Echo input characters.
    #[serde(default = "default_true")]
    pub echo: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            canonical: true,
            signals: true,
            echo: true,
        }
    }
}

fn default_rows() -> u16 {
    160
}

fn default_cols() -> u16 {
    80
}

fn default_true() -> bool {
    true
}

/// Language server client settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LspConfig {
    /// How long a call waits for its response.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// How long a graceful shutdown waits for the server to exit.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl LspConfig {
    /// Call timeout as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_call_timeout_ms() -> u64 {
    3000
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Pseudo-terminal settings for TTY-mode tools.
    #[serde(default)]
    pub terminal: TerminalConfig,
    /// Language server client settings.
    #[serde(default)]
    pub lsp: LspConfig,
    /// Configured external tools.
    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up an enabled tool by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no tool has that name or it is disabled.
    pub fn tool(&self, name: &str) -> Result<&Tool> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| AppError::Config(format!("no tool named {name}")))?;
        if !tool.enabled {
            return Err(AppError::Config(format!("tool {name} is disabled")));
        }
        Ok(tool)
    }

    /// Enabled language server tools.
    pub fn language_servers(&self) -> impl Iterator<Item = &Tool> {
        self.tools
            .iter()
            .filter(|tool| tool.enabled && tool.tool_type == ToolType::LspServer)
    }

    fn validate(&self) -> Result<()> {
        if self.terminal.rows == 0 || self.terminal.cols == 0 {
            return Err(AppError::Config(
                "terminal rows and cols must be greater than zero".into(),
            ));
        }

        if self.lsp.call_timeout_ms == 0 {
            return Err(AppError::Config(
                "lsp.call_timeout_ms must be greater than zero".into(),
            ));
        }

        let mut names = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(AppError::Config("tool name must not be empty".into()));
            }
            if tool.path.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "tool {} has an empty path",
                    tool.name
                )));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(AppError::Config(format!(
                    "tool name {} is used more than once",
                    tool.name
                )));
            }
        }

        Ok(())
    }
}
