//! Terminal output helpers
//!
//! Human-readable output goes through these helpers so it degrades to plain
//! bracketed markers when stdout is not an interactive terminal. Machine
//! formats (`--format json|plain`) bypass them entirely.

mod context;
mod output;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, remark, section, step_error_detail, step_info, step_ok,
    step_ok_detail, step_warn, step_warn_hint,
};
