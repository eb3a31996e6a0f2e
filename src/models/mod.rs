//! Domain model module declarations.

pub mod tool;

pub use tool::{Activation, OutputTarget, Tool, ToolType};
