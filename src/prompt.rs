use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Select};
use crate::error::{Result, ZapError};

/// Interactive decisions the lifecycle needs from the user.
pub trait Prompter {
    /// Picks one of `items`, returning its index.
    fn select(&self, message: &str, items: &[String], default: usize) -> Result<usize>;
    /// Asks a yes/no question.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Prompts on the terminal. Escaping a prompt cancels the operation.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, message: &str, items: &[String], default: usize) -> Result<usize> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(items)
            .default(default.min(items.len().saturating_sub(1)))
            .interact_opt()?
            .ok_or(ZapError::UserCancelled)
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(false)
            .interact_opt()?
            .ok_or(ZapError::UserCancelled)
    }
}

/// Never asks: takes the default choice and confirms everything.
#[derive(Debug, Default)]
pub struct SilentPrompter;

impl Prompter for SilentPrompter {
    fn select(&self, _message: &str, items: &[String], default: usize) -> Result<usize> {
        if items.is_empty() {
            return Err(ZapError::NoReleaseFound);
        }
        Ok(default.min(items.len() - 1))
    }

    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Chooses one of `items` following the selection policy shared by every
/// resolution path: nothing to choose from is an error, a single candidate
/// is taken as is, and more than one requires the prompt unless silence was
/// requested.
pub fn choose(
    prompter: &dyn Prompter,
    silent: bool,
    classifier: &str,
    items: &[String],
    default: usize,
) -> Result<usize> {
    match items.len() {
        0 => {
            tracing::debug!("Couldn't find any {classifier}s");
            Err(ZapError::NoReleaseFound)
        }
        1 => {
            tracing::debug!("Found one {classifier}. Selecting that as default");
            Ok(0)
        }
        _ if silent => Err(ZapError::SilenceRequested),
        _ => prompter.select(&format!("Choose a {classifier}"), items, default),
    }
}
