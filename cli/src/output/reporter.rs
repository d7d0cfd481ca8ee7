//! Terminal-backed `ProgressReporter`.
//!
//! Application services report progress through the port; this adapter
//! renders those events as indented, marked lines using the context's
//! stylesheet, so `--quiet` and color handling stay consistent with the
//! rest of the output layer.

use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    fn line(&self, mark: impl std::fmt::Display, message: &str) {
        if !self.ctx.quiet {
            println!("  {mark} {message}");
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        self.line("→".style(self.ctx.styles.info), message);
    }

    fn success(&self, message: &str) {
        self.line("✓".style(self.ctx.styles.success), message);
    }

    fn warn(&self, message: &str) {
        self.line("!".style(self.ctx.styles.warning), message);
    }
}
