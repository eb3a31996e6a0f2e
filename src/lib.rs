#![forbid(unsafe_code)]

//! `sce-toolhost` runs external developer tools for the SCE editor.
//!
//! Tools are child processes whose standard streams are attached to pipes or
//! pseudo-terminals and serviced on a worker thread per process. Their output
//! is interpreted as ANSI-styled text, and language servers are driven over
//! a length-prefixed JSON-RPC protocol.

pub mod ansi;
pub mod config;
pub mod editor;
pub mod errors;
pub mod lsp;
pub mod models;
pub mod output;
pub mod process;
pub mod runner;
pub mod util;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
