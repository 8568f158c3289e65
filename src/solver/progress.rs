//! Text progress reporting.

use std::io::Write;

/// A simple text progress bar, rendered to stderr with carriage-return
/// updates.
#[derive(Debug)]
pub struct ProgressBar {
    label: String,
    total: usize,
    current: usize,
    width: usize,
}

impl ProgressBar {
    /// Creates a bar counting up to `total` steps.
    pub fn new(label: &str, total: usize) -> Self {
        let bar = Self {
            label: label.to_string(),
            total,
            current: 0,
            width: 40,
        };
        bar.render();
        bar
    }

    /// Advances the bar by `steps`.
    pub fn step(&mut self, steps: usize) {
        self.current = (self.current + steps).min(self.total);
        self.render();
    }

    /// Completes the bar and moves to the next line.
    pub fn finish(&mut self) {
        self.current = self.total;
        self.render();
        eprintln!();
    }

    fn render(&self) {
        let filled = if self.total == 0 {
            self.width
        } else {
            self.width * self.current / self.total
        };
        eprint!(
            "\r{} [{}{}] {}/{}",
            self.label,
            "#".repeat(filled),
            " ".repeat(self.width - filled),
            self.current,
            self.total
        );
        let _ = std::io::stderr().flush();
    }
}
