//! Chat application module for conversations with the Zus assistant.
//!
//! This module provides the conversational client built on top of the
//! [`ChatBackend`](crate::ChatBackend) trait. It supports:
//!
//! - A persisted, append-only message log seeded with a greeting
//! - Quick-command autocomplete for `/calc`, `/products`, `/outlets` and `/reset`
//! - Overlapping questions with a shared typing indicator
//! - Planner traces attached to assistant replies
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`store`]: The message log and its write-through persistence
//! - [`commands`]: Quick-command recognition and the command palette
//! - [`dispatcher`]: Sending questions and recording outcomes
//! - [`session`]: The session controller and shared log
//! - [`completion`]: rustyline integration for the palette

pub mod commands;
pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod session;
pub mod store;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{
    COMMAND_PREFIX, CommandPalette, QuickCommand, help_text, is_reset, matching_commands,
    palette_visible,
};
pub use completion::QuickCommandHelper;
pub use config::{ChatArgs, ChatConfig, DEFAULT_HISTORY_PATH};
pub use dispatcher::{DEFAULT_RESET_DELAY, Dispatcher, TurnOutcome};
pub use session::{ChatSession, SessionEvent, SessionLog, TurnHandle, TurnId};
pub use store::{FileSlot, MemorySlot, MessageStore, Slot};
