//! This module defines the command-line interface structure and handlers.

pub mod clear;
pub mod commands;
pub mod explain;
pub mod formatters;
pub mod index;
pub mod query;
pub mod serve;
pub mod stats;
pub mod watch;

// Re-export the main handler and the command enum for the binary.
pub use commands::{handle_command, CliArgs, Commands};
