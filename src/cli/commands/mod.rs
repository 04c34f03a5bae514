//! CLI command implementations (facade).
//!
//! Re-exports the command surface used by `run.rs` and the CLI tests.
//! Implementations live in `commands/*`.

mod common;
mod inspect;
mod pipeline;

pub use common::read_request;
pub use inspect::{execute_config_command, execute_validate_command};
pub use pipeline::{
    execute_qa_command, execute_run_command, execute_stage_command, execute_visual_command,
};
