//! Yes/no questions put to the operator

use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use std::io;

/// Source of answers for [`crate::runner::Maker::ask`]
pub trait Prompter {
    /// Ask a yes/no question; `Ok(None)` when the operator dismissed it
    fn prompt(&mut self, question: &str, default: bool) -> io::Result<Option<bool>>;
}

/// Asks on the terminal (the prompt is drawn on stderr)
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&mut self, question: &str, default: bool) -> io::Result<Option<bool>> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(default)
            .interact_opt()
            .map_err(io::Error::other)
    }
}
