//! Interactive prompts used by the walkthroughs.

use anyhow::Result;
use dialoguer::{Input, Password};

pub trait Prompter {
    /// Asks for a non-empty line of text.
    fn input(&self, prompt: &str) -> Result<String>;

    /// Asks for a value without echoing it.
    fn secret(&self, prompt: &str) -> Result<String>;
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&self, prompt: &str) -> Result<String> {
        let value: String = Input::new().with_prompt(prompt).interact_text()?;
        Ok(value.trim().to_string())
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        Ok(Password::new().with_prompt(prompt).interact()?)
    }
}
