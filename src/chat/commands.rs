//! Quick-command recognition and autocomplete.
//!
//! Quick commands start with `/` and are sent to the backend verbatim like any
//! other question.  This module only decides when the command palette should
//! be visible and which commands match what the user has typed so far.

/// The reserved leading character that triggers quick-command autocomplete.
pub const COMMAND_PREFIX: char = '/';

/// A quick command offered by the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuickCommand {
    /// Perform a calculation.
    Calc,

    /// Ask about products.
    Products,

    /// Ask about outlets.
    Outlets,

    /// Clear the conversation.
    Reset,
}

impl QuickCommand {
    /// All commands, in palette order.
    pub const ALL: [QuickCommand; 4] = [
        QuickCommand::Calc,
        QuickCommand::Products,
        QuickCommand::Outlets,
        QuickCommand::Reset,
    ];

    /// The command as typed, prefix included.
    pub fn name(&self) -> &'static str {
        match self {
            QuickCommand::Calc => "/calc",
            QuickCommand::Products => "/products",
            QuickCommand::Outlets => "/outlets",
            QuickCommand::Reset => "/reset",
        }
    }

    /// One-line description shown next to the command.
    pub fn description(&self) -> &'static str {
        match self {
            QuickCommand::Calc => "Perform calculations",
            QuickCommand::Products => "View Zus products",
            QuickCommand::Outlets => "Find outlets near you",
            QuickCommand::Reset => "Clear conversation",
        }
    }

    /// The text the input becomes when this command is chosen.
    pub fn completion(&self) -> String {
        format!("{} ", self.name())
    }
}

/// Returns true if the palette should be shown for `input`.
///
/// The palette is shown for the bare prefix, and for any input that starts
/// with the prefix and has no whitespace yet.  Once a space follows the
/// command the user is typing arguments and the palette hides.
pub fn palette_visible(input: &str) -> bool {
    input.starts_with(COMMAND_PREFIX) && !input.chars().any(char::is_whitespace)
}

/// Returns the commands whose name contains `input`, ignoring case.
///
/// Nothing matches unless `input` starts with the prefix.
pub fn matching_commands(input: &str) -> Vec<QuickCommand> {
    if !input.starts_with(COMMAND_PREFIX) {
        return Vec::new();
    }
    let needle = input.to_lowercase();
    QuickCommand::ALL
        .into_iter()
        .filter(|command| command.name().to_lowercase().contains(&needle))
        .collect()
}

/// Returns true if `input` asks for the conversation to be reset.
pub fn is_reset(input: &str) -> bool {
    input
        .trim()
        .to_lowercase()
        .starts_with(QuickCommand::Reset.name())
}

/// State of the command palette for the current input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPalette {
    visible: bool,
    candidates: Vec<QuickCommand>,
    selected: usize,
}

impl CommandPalette {
    /// Creates a hidden palette.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes visibility and candidates for `input`, resetting the selection.
    pub fn update(&mut self, input: &str) {
        self.visible = palette_visible(input);
        self.candidates = matching_commands(input);
        self.selected = 0;
    }

    /// Whether the palette is shown.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the palette is shown and has something to offer.
    pub fn has_candidates(&self) -> bool {
        self.visible && !self.candidates.is_empty()
    }

    /// The matching commands.
    pub fn candidates(&self) -> &[QuickCommand] {
        &self.candidates
    }

    /// The highlighted command, if any.
    pub fn selected(&self) -> Option<QuickCommand> {
        if self.visible {
            self.candidates.get(self.selected).copied()
        } else {
            None
        }
    }

    /// Move the highlight down, wrapping around.
    pub fn select_next(&mut self) {
        if !self.candidates.is_empty() {
            self.selected = (self.selected + 1) % self.candidates.len();
        }
    }

    /// Move the highlight up, wrapping around.
    pub fn select_previous(&mut self) {
        if !self.candidates.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.candidates.len() - 1);
        }
    }

    /// Chooses `command`, closing the palette.  Returns the rewritten input.
    pub fn choose(&mut self, command: QuickCommand) -> String {
        self.close();
        command.completion()
    }

    /// Chooses the highlighted command, if the palette is showing one.
    pub fn accept_selected(&mut self) -> Option<String> {
        let command = self.selected()?;
        Some(self.choose(command))
    }

    /// Hides the palette.
    pub fn close(&mut self) {
        self.visible = false;
        self.candidates.clear();
        self.selected = 0;
    }
}

/// Returns help text describing the quick commands.
pub fn help_text() -> String {
    let mut help = String::from("Quick commands:\n");
    for command in QuickCommand::ALL {
        help.push_str(&format!(
            "  {:<22} {}\n",
            command.name(),
            command.description()
        ));
    }
    help.push_str("Type / to see quick actions. Alt+Enter inserts a new line; Ctrl+D exits.");
    help
}
