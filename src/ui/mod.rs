//! Terminal output helpers shared by the CLI commands
//!
//! Output is plain when stdout is not a terminal or a CI environment is
//! detected, so build logs stay free of escape codes.

mod context;
mod output;

pub use context::UiContext;
pub use output::{key_value, remark, step_error_detail, step_ok_detail, step_warn_hint};
