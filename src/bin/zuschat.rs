//! Interactive terminal client for the Zus assistant.
//!
//! This binary provides a REPL for chatting with the Zus backend.  The
//! conversation is kept in a local file and restored on the next start.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a backend on localhost:8000
//! zuschat
//!
//! # Point at another backend
//! zuschat --api-base https://zus.example.com
//!
//! # Keep the conversation elsewhere and log every backend turn
//! zuschat --history ~/.zus.json --log-file turns.jsonl
//!
//! # Disable colors (useful for piping output)
//! zuschat --no-color
//! ```
//!
//! # Quick commands
//!
//! Type `/` and press Tab to list the quick commands:
//! - `/calc` - Perform calculations
//! - `/products` - View Zus products
//! - `/outlets` - Find outlets near you
//! - `/reset` - Clear conversation
//!
//! Alt+Enter inserts a line break.  Ctrl+D exits.

use std::io::{self, Write};
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Cmd, Editor, ExternalPrinter, KeyCode, KeyEvent, Modifiers};

use zuschat::chat::{
    ChatArgs, ChatConfig, ChatSession, FileSlot, PlainTextRenderer, QuickCommandHelper, Renderer,
    help_text,
};
use zuschat::{HttpBackend, JsonLinesLogger};

const PROMPT: &str = "You: ";

/// Routes rendered output through rustyline so it does not clobber the prompt.
struct PrinterSink<P: ExternalPrinter + Send> {
    printer: P,
    pending: Vec<u8>,
}

impl<P: ExternalPrinter + Send> Write for PrinterSink<P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        let text = text.strip_suffix('\n').unwrap_or(&text).to_string();
        self.printer.print(text).map_err(io::Error::other)
    }
}

/// Main entry point for the zuschat application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("zuschat [OPTIONS]");
    let config = ChatConfig::from(args);
    let use_color = config.use_color;

    let mut backend = HttpBackend::with_options(config.api_base.clone(), config.timeout)?;
    if let Some(path) = &config.log_path {
        backend = backend.with_logger(Arc::new(JsonLinesLogger::create(path)?));
    }
    let endpoint = backend.endpoint().clone();
    let slot = FileSlot::new(config.history_path.clone());
    let mut session = ChatSession::open(slot, Arc::new(backend), config)?;
    let mut events = session.subscribe();

    let mut renderer = PlainTextRenderer::with_color(use_color);
    renderer.print_info(&format!("Zus Chat (backend: {endpoint})"));
    for line in help_text().lines() {
        renderer.print_info(&format!("    {line}"));
    }
    renderer.print_info("");
    for message in session.messages() {
        renderer.print_message(&message);
    }

    let mut editor: Editor<QuickCommandHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(QuickCommandHelper::new(use_color)));
    editor.bind_sequence(KeyEvent(KeyCode::Enter, Modifiers::ALT), Cmd::Newline);
    let printer = editor.create_external_printer()?;
    let mut live = PlainTextRenderer::with_writer(
        PrinterSink {
            printer,
            pending: Vec::new(),
        },
        use_color,
    );

    loop {
        // Readline blocks, so it runs off the runtime while replies keep arriving.
        let mut reading = tokio::task::spawn_blocking(move || {
            let result = editor.readline(PROMPT);
            (editor, result)
        });
        let (returned, result) = loop {
            tokio::select! {
                joined = &mut reading => break joined?,
                Some(event) = events.recv() => live.render_event(&event),
            }
        };
        editor = returned;

        match result {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                session.set_input(line);
                if let Err(err) = session.confirm(false) {
                    live.print_error(&err.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C clears the line; nothing to cancel.
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                live.print_error(&err.to_string());
                break;
            }
        }
    }

    if session.is_typing() {
        renderer.print_info("Waiting for outstanding replies...");
    }
    session.close().await?;
    while let Ok(event) = events.try_recv() {
        renderer.render_event(&event);
    }
    renderer.print_info("Goodbye!");
    Ok(())
}
