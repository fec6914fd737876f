//! Terminal output for kiln
//!
//! Status lines use `console` styling with plain `[OK]`-style tags when
//! stderr is not a terminal or a CI environment is detected.

mod context;
mod output;
mod reporter;

pub use context::UiContext;
pub use output::{
    builder_line, remark, section, step_info, step_ok, step_ok_detail, step_warn,
};
pub use reporter::ConsoleReporter;
