//! Output rendering for the chat log.
//!
//! This module provides the [`Renderer`] trait and a plain-text implementation
//! that writes messages, planner traces and session notices to any writer.

use std::io::{self, Stdout, Write};

use crate::chat::SessionEvent;
use crate::types::{Message, MessageRole};
use crate::utils::time::clock_label;

/// ANSI escape code for bold text (used for `**emphasis**` in answers).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for timestamps and planner traces).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user's label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the assistant's label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Indentation for lines that continue a message.
const CONTINUATION: &str = "        ";

/// Trait for rendering the conversation.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Print one message of the log.
    fn print_message(&mut self, message: &Message);

    /// Called when the typing indicator turns on or off.
    fn print_typing(&mut self, typing: bool) {
        _ = typing;
    }

    /// Called when the log was replaced by `greeting`.
    fn print_reset(&mut self, greeting: &Message) {
        self.print_info("Conversation cleared.");
        self.print_message(greeting);
    }

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Render a session event.
    fn render_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Appended(message) => self.print_message(message),
            SessionEvent::Reset(greeting) => self.print_reset(greeting),
            SessionEvent::Typing(typing) => self.print_typing(*typing),
            SessionEvent::StoreFailed(error) => {
                self.print_error(&format!("could not save the conversation: {error}"))
            }
        }
    }
}

/// Replaces `**text**` spans with bold text.
///
/// Without color the markers are dropped.  An unmatched marker is kept as typed.
pub fn render_bold(text: &str, use_color: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        out.push_str(&rest[..start]);
        if use_color {
            out.push_str(ANSI_BOLD);
            out.push_str(&after[..end]);
            out.push_str(ANSI_RESET);
        } else {
            out.push_str(&after[..end]);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Formats a planner trace as `[Greet | Finish]`.
pub fn format_planner(planner: &[String]) -> String {
    format!("[{}]", planner.join(" | "))
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer writes to stdout by default, or to any writer supplied with
/// [`PlainTextRenderer::with_writer`].
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn emit(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_message(&mut self, message: &Message) {
        let (label, color) = match message.role {
            MessageRole::User => ("You", ANSI_CYAN),
            MessageRole::Assistant => ("Zus", ANSI_GREEN),
        };
        let content = match message.role {
            MessageRole::User => message.content.clone(),
            MessageRole::Assistant => render_bold(&message.content, self.use_color),
        };

        let mut text = format!(
            "{} {}: ",
            self.paint(ANSI_DIM, &clock_label(message.timestamp)),
            self.paint(color, label),
        );
        let mut lines = content.split('\n');
        text.push_str(lines.next().unwrap_or_default());
        text.push('\n');
        for line in lines {
            text.push_str(CONTINUATION);
            text.push_str(line);
            text.push('\n');
        }
        if let Some(planner) = message.planner.as_deref().filter(|p| !p.is_empty()) {
            let trace = format!("Planner: {}", format_planner(planner));
            text.push_str(CONTINUATION);
            text.push_str(&self.paint(ANSI_DIM, &trace));
            text.push('\n');
        }
        self.emit(&text);
    }

    fn print_typing(&mut self, typing: bool) {
        if typing {
            let text = format!("{}\n", self.paint(ANSI_DIM, "Zus is typing..."));
            self.emit(&text);
        }
    }

    fn print_error(&mut self, error: &str) {
        let text = format!("{}\n", self.paint(ANSI_RED, &format!("Error: {error}")));
        self.emit(&text);
    }

    fn print_info(&mut self, info: &str) {
        self.emit(&format!("{info}\n"));
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::types::{MessageId, NewMessage};

    fn render(use_color: bool, f: impl FnOnce(&mut PlainTextRenderer<Vec<u8>>)) -> String {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), use_color);
        f(&mut renderer);
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    fn stamped(message: NewMessage) -> Message {
        message.stamp(MessageId(1), datetime!(2025-07-01 09:05:00 UTC))
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn bold_spans() {
        assert_eq!(render_bold("**SS2** is open", false), "SS2 is open");
        assert_eq!(
            render_bold("a **b** c", true),
            format!("a {ANSI_BOLD}b{ANSI_RESET} c")
        );
        assert_eq!(render_bold("2 ** 3", false), "2 ** 3");
        assert_eq!(render_bold("**a** and **b", false), "a and **b");
        assert_eq!(render_bold("****", false), "");
    }

    #[test]
    fn greeting_shows_planner() {
        let out = render(false, |r| r.print_message(&stamped(NewMessage::greeting())));
        assert!(out.starts_with("09:05 Zus: Hi! I'm the Zus AI assistant."));
        assert!(out.ends_with("Planner: [Greet | Finish]\n"));
    }

    #[test]
    fn user_message_keeps_markers_and_line_breaks() {
        let out = render(false, |r| {
            r.print_message(&stamped(NewMessage::user("**hi**\nthere")))
        });
        assert_eq!(out, format!("09:05 You: **hi**\n{CONTINUATION}there\n"));
    }

    #[test]
    fn empty_planner_is_not_shown() {
        let out = render(false, |r| {
            r.print_message(&stamped(
                NewMessage::assistant("ok").with_planner(Some(Vec::new())),
            ))
        });
        assert_eq!(out, "09:05 Zus: ok\n");
    }

    #[test]
    fn events_are_rendered() {
        let greeting = stamped(NewMessage::greeting());
        let out = render(false, |r| {
            r.render_event(&SessionEvent::Typing(true));
            r.render_event(&SessionEvent::Typing(false));
            r.render_event(&SessionEvent::Reset(greeting.clone()));
            r.render_event(&SessionEvent::StoreFailed("disk full".to_string()));
        });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Zus is typing...");
        assert_eq!(lines[1], "Conversation cleared.");
        assert!(lines[2].starts_with("09:05 Zus: Hi!"));
        assert_eq!(
            lines.last().copied(),
            Some("Error: could not save the conversation: disk full")
        );
    }
}
