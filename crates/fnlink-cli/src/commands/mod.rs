//! CLI subcommand implementations.

pub mod entry;
pub mod resolve;
pub mod services;
