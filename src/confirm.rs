// Interactive confirmation for destructive commands

use eyre::{Result, eyre};
use inquire::InquireError;
use tracing::debug;

/// Something that can ask the user a yes/no question
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Answers yes without asking (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Asks on the controlling terminal; the answer must be typed out as `yes`
///
/// The terminal is used even when stdin is redirected. Escape or Ctrl-C count
/// as a no.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        let answer = inquire::Text::new(message)
            .with_help_message("Type 'yes' to continue")
            .prompt();

        match answer {
            Ok(answer) => Ok(is_yes(&answer)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                debug!("Confirmation cancelled");
                Ok(false)
            }
            Err(InquireError::NotTTY) => Err(eyre!("No terminal available for confirmation (use --yes)")),
            Err(e) => Err(eyre!("Failed to read confirmation: {}", e)),
        }
    }
}

/// Only a spelled-out `yes` (any case) confirms
pub fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes_accepts_yes_only() {
        assert!(is_yes("yes"));
        assert!(is_yes(" YES \n"));
        assert!(!is_yes("y"));
        assert!(!is_yes(""));
        assert!(!is_yes("yes please"));
    }

    #[test]
    fn test_assume_yes() {
        assert!(AssumeYes.confirm("anything").unwrap());
    }
}
