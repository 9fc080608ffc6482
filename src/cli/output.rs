//! Styled console output for the end-of-run report
//!
//! Worker output (log lines, per-thread summaries, item errors) never goes
//! through here; it is written via the output coordinator while threads run.

use console::style;

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print a header/title
    pub fn header(&self, title: &str) {
        if !self.quiet {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    /// Print summary statistics with enhanced styling
    pub fn summary_stats(&self, label: &str, value: usize) {
        if !self.quiet {
            println!("  {:<22} {}", style(label).dim(), style(value.to_string()).bold());
        }
    }

    /// Print a key-value pair; only shown with `-v`
    pub fn verbose_key_value(&self, key: &str, value: &str) {
        if self.verbose && !self.quiet {
            println!("  {:<22} {}", style(key).dim(), style(value).dim());
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
