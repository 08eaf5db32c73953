//! Terminal output for pgstamp commands
//!
//! Spinners and prompts go through `cliclack` on a TTY and degrade to plain
//! tagged lines (`[OK]`, `[WARN]`, ...) in CI or when output is piped, so
//! scripted runs stay greppable.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{remark, step_info, step_ok, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
pub use prompts::confirm;
pub use theme::{init_theme, PgstampTheme};
