//! Error types shared across the tool host.

use std::fmt::{Display, Formatter};

/// Shared result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering all failure modes of the tool host.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The tool could not be started (spawn, exec or working directory failure).
    Launch(String),
    /// A write was attempted on a channel whose write side is gone.
    ChannelClosed(String),
    /// The readiness wait of the I/O reactor failed.
    Reactor(String),
    /// A protocol frame was malformed or incomplete.
    Protocol(String),
    /// The language server rejected or failed the initialize handshake.
    Handshake(String),
    /// A call did not receive its response in time.
    Timeout(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::ChannelClosed(msg) => write!(f, "channel closed: {msg}"),
            Self::Reactor(msg) => write!(f, "reactor: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<nix::errno::Errno> for AppError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::Io(err.desc().to_owned())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed json: {err}"))
    }
}
