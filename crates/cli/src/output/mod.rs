//! Output formatting
//!
//! Every command prints through [`Formatter`] so that `--json`, `--quiet`
//! and `--no-color` behave the same everywhere.

mod formatter;

pub use formatter::Formatter;

/// Output switches shared by all commands
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Strict JSON on stdout, errors as JSON on stderr
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
