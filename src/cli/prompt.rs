use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;

use crate::pipeline::{Decider, Question};

/// Asks the operator on the terminal. Empty input, EOF and Ctrl-C take the
/// default answer.
#[derive(Debug, Default)]
pub struct InteractiveDecider;

impl Decider for InteractiveDecider {
    fn confirm(&self, question: &Question) -> bool {
        let default = question.default_answer();
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                warn!(error = %e, "Prompt unavailable, using the default answer");
                return default;
            }
        };
        match editor.readline(&format!("{} {} ", question.prompt(), hint)) {
            Ok(line) => parse_answer(&line).unwrap_or(default),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => default,
            Err(e) => {
                warn!(error = %e, "Prompt failed, using the default answer");
                default
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
