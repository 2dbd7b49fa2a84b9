//! Line-editor integration for the quick-command palette.
//!
//! [`QuickCommandHelper`] plugs the palette into rustyline: Tab lists the
//! matching commands with their descriptions and completes the chosen one,
//! and a dimmed hint shows the rest of the first match while typing.

use std::borrow::Cow;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::chat::commands::{matching_commands, palette_visible};

const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RESET: &str = "\x1b[0m";

/// rustyline helper offering quick commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickCommandHelper {
    use_color: bool,
}

impl QuickCommandHelper {
    /// Creates a helper; `use_color` dims the inline hint.
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    /// Palette entries for the text left of the cursor.
    pub fn candidates(&self, typed: &str) -> Vec<Pair> {
        if !palette_visible(typed) {
            return Vec::new();
        }
        matching_commands(typed)
            .into_iter()
            .map(|command| Pair {
                display: format!("{:<10} {}", command.name(), command.description()),
                replacement: command.completion(),
            })
            .collect()
    }

    /// The untyped remainder of the first matching command.
    pub fn remainder(&self, typed: &str) -> Option<String> {
        if !palette_visible(typed) {
            return None;
        }
        let first = matching_commands(typed).into_iter().next()?;
        let rest = first.name().strip_prefix(typed)?;
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

impl Completer for QuickCommandHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok((0, self.candidates(&line[..pos])))
    }
}

impl Hinter for QuickCommandHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        self.remainder(line)
    }
}

impl Highlighter for QuickCommandHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        if self.use_color {
            Cow::Owned(format!("{ANSI_DIM}{hint}{ANSI_RESET}"))
        } else {
            Cow::Borrowed(hint)
        }
    }
}

impl Validator for QuickCommandHelper {}

impl Helper for QuickCommandHelper {}
