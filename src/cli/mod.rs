//! CLI layer for supportflow-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! answering support messages, inspecting retrieval and managing prompts.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, RetrievalArgs};
