//! CLI command implementations for zvm-perf-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration and xCAT reachability check
//! - `config`: Configuration file generation
//! - `inspect`: One collection, printed as YAML or JSON
//! - `generate`: Test data generation

pub mod check;
pub mod config;
pub mod generate;
pub mod inspect;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
pub use inspect::command_inspect;
