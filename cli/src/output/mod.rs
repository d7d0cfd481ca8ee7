//! Terminal output: stylesheet, message helpers, and progress bars.
//!
//! Everything user-facing goes through an `OutputContext` so the
//! `--no-color` and `--quiet` flags (and `NO_COLOR`) are honored in one
//! place. Messages print indented under the current command's header.

pub mod progress;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::OwoColorize as _;
pub use styles::Styles;

/// Styling and verbosity state shared by every printer.
pub struct OutputContext {
    /// Stylesheet; stays unstyled unless colors are enabled.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let mut styles = Styles::default();
        if colors_enabled(no_color, is_tty) {
            styles.colorize();
        }
        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Progress bars only make sense on an interactive, non-quiet run.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// `✓` line. Suppressed when quiet.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// `⚠` line. Suppressed when quiet.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// `✗` line on stderr. Errors print even under `--quiet`.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// `ℹ` line. Suppressed when quiet.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// Section header. Suppressed when quiet.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Dimmed key, plain value. Suppressed when quiet.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

/// Colors require a TTY and neither the flag nor the `NO_COLOR`
/// convention asking for plain output.
fn colors_enabled(no_color: bool, is_tty: bool) -> bool {
    !no_color && is_tty && std::env::var("NO_COLOR").is_err()
}
