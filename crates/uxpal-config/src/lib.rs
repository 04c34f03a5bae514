//! Configuration management for uxpal
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > config file > defaults. The file is TOML with
//! `[defaults]`, `[llm]`, `[qa]` and `[screenshot]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use model::*;
pub use uxpal_utils::types::ConfigSource;
