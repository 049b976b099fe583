//! Progress output for operators
//!
//! User-facing messages go through [`Logger`], filtered by [`Verbosity`].
//! Internal diagnostics use `tracing` instead.

use colored::Colorize;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Error,
    Warn,
    Notify,
    Debug,
}

/// Writes progress messages to stderr, indented by task nesting
#[derive(Debug)]
pub struct Logger {
    verbosity: Verbosity,
    indent: usize,
    captured: Option<Vec<String>>,
}

impl Logger {
    /// Create a logger writing to stderr
    pub fn new(verbosity: Verbosity) -> Self {
        Logger {
            verbosity,
            indent: 0,
            captured: None,
        }
    }

    /// Create a logger that records messages instead of printing them
    pub fn capturing(verbosity: Verbosity) -> Self {
        Logger {
            verbosity,
            indent: 0,
            captured: Some(Vec::new()),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Messages recorded by a capturing logger, with indentation but without color
    pub fn captured(&self) -> &[String] {
        self.captured.as_deref().unwrap_or(&[])
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.indent
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Announce a task
    pub fn task_start(&mut self, name: &str, description: &str) {
        self.emit(Level::Notify, &format!("{}", name.bold()), name);
        let description = description.trim();
        if !description.is_empty() && self.verbosity >= Verbosity::Verbose {
            self.indent();
            for line in dedent_text(description).lines() {
                self.emit(Level::Debug, line, line);
            }
            self.dedent();
        }
    }

    /// Progress message
    pub fn notify(&mut self, message: &str) {
        self.emit(Level::Notify, message, message);
    }

    /// Effect suppressed by simulate mode
    pub fn would(&mut self, message: &str) {
        let plain = format!("Would {}", message);
        self.emit(Level::Notify, &format!("{}", plain.cyan()), &plain);
    }

    /// Verbose-only detail
    pub fn debug(&mut self, message: &str) {
        self.emit(Level::Debug, &format!("{}", message.dimmed()), message);
    }

    pub fn warn(&mut self, message: &str) {
        let plain = format!("Warning: {}", message);
        self.emit(Level::Warn, &format!("{}", plain.yellow()), &plain);
    }

    pub fn error(&mut self, message: &str) {
        let plain = format!("Error: {}", message);
        self.emit(Level::Error, &format!("{}", plain.red().bold()), &plain);
    }

    fn emit(&mut self, level: Level, styled: &str, plain: &str) {
        let required = match level {
            Level::Error | Level::Warn => Verbosity::Quiet,
            Level::Notify => Verbosity::Normal,
            Level::Debug => Verbosity::Verbose,
        };
        if self.verbosity < required {
            return;
        }

        let pad = "  ".repeat(self.indent);
        match &mut self.captured {
            Some(lines) => lines.push(format!("{}{}", pad, plain)),
            None => eprintln!("{}{}", pad, styled),
        }
    }
}

/// Strip the common leading whitespace from a multi-line description
pub fn dedent_text(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| if line.len() >= margin { &line[margin..] } else { line.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert!(Verbosity::Verbose > Verbosity::Normal);
        assert!(Verbosity::Normal > Verbosity::Quiet);
        assert!(Verbosity::Quiet > Verbosity::Silent);
    }

    #[test]
    fn test_capture_respects_verbosity() {
        let mut logger = Logger::capturing(Verbosity::Quiet);
        logger.notify("hidden");
        logger.warn("shown");
        logger.debug("hidden too");
        assert_eq!(logger.captured(), ["Warning: shown"]);
    }

    #[test]
    fn test_indentation() {
        let mut logger = Logger::capturing(Verbosity::Normal);
        logger.notify("outer");
        logger.indent();
        logger.would("create /tmp/x");
        logger.dedent();
        logger.dedent();
        logger.notify("back");
        assert_eq!(logger.captured(), ["outer", "  Would create /tmp/x", "back"]);
    }

    #[test]
    fn test_dedent_text() {
        let text = "\n    Install into /opt.\n\n      Indented more\n";
        assert_eq!(dedent_text(text), "\nInstall into /opt.\n\n  Indented more");
    }
}
