use camino::Utf8Path;
use std::io::{self, BufRead, IsTerminal, Write};

/// Interactive gate consulted before replacing an existing archive
#[cfg_attr(test, mockall::automock)]
pub trait ConfirmOverwrite {
    /// Returns true when the user agrees to replace `archive`
    fn confirm(&self, archive: &Utf8Path) -> bool;
}

/// Asks on stdin/stderr. Declines without asking when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl ConfirmOverwrite for TerminalPrompt {
    fn confirm(&self, archive: &Utf8Path) -> bool {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            tracing::warn!("Not a terminal, declining to overwrite {}", archive);
            return false;
        }

        let mut stderr = io::stderr();
        let _ = write!(stderr, "Archive {} already exists. Overwrite? [y/N] ", archive);
        let _ = stderr.flush();

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

/// Fixed answer, for non-interactive runs and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl ConfirmOverwrite for FixedAnswer {
    fn confirm(&self, _archive: &Utf8Path) -> bool {
        self.0
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
