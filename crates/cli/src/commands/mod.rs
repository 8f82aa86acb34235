//! CLI subcommand implementations.

pub mod config_cmd;
pub mod demo;
