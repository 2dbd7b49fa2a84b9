//! Core chat session management.
//!
//! This module provides the [`ChatSession`] controller, which owns the input
//! line, the command palette and the [`SessionLog`], and spawns one
//! [`Dispatcher`] turn per submission.
//!
//! Front ends that handle keys themselves drive the palette through
//! [`ChatSession::palette_mut`] and [`ChatSession::choose_command`], and the
//! confirm key through [`ChatSession::confirm`].  The `zuschat` REPL leaves
//! completion and Alt+Enter to rustyline and confirms each finished line.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::chat::commands::{CommandPalette, QuickCommand};
use crate::chat::config::ChatConfig;
use crate::chat::dispatcher::{Dispatcher, TurnOutcome};
use crate::chat::store::{MessageStore, Slot};
use crate::client::ChatBackend;
use crate::error::{Error, Result};
use crate::types::{Message, NewMessage};

/// Identifies one conversational turn within a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// A change to the session, delivered to subscribers in mutation order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A message was appended to the log.
    Appended(Message),

    /// The log was replaced by a fresh greeting.
    Reset(Message),

    /// The typing indicator turned on or off.
    Typing(bool),

    /// A mutation could not be persisted and was rolled back.
    StoreFailed(String),
}

///////////////////////////////////////////// SessionLog /////////////////////////////////////////////

struct LogState {
    store: MessageStore,
    pending: BTreeSet<TurnId>,
    next_turn: u64,
    observers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl LogState {
    fn emit(&mut self, event: SessionEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn finish(&mut self, turn: TurnId) {
        if self.pending.remove(&turn) && self.pending.is_empty() {
            self.emit(SessionEvent::Typing(false));
        }
    }

    fn report<T>(&mut self, result: &Result<T>) {
        if let Err(err) = result {
            self.emit(SessionEvent::StoreFailed(err.to_string()));
        }
    }
}

/// Shared handle to the message log and the set of pending turns.
///
/// Every mutation of the store happens under one lock, together with the
/// matching typing-indicator transition and event emission.  Persisting is a
/// synchronous write of the whole log while that lock is held, so on a
/// current-thread runtime other tasks wait for it; the log is a small JSON
/// file and the write is short.
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<LogState>>,
}

impl SessionLog {
    /// Wraps a loaded store.
    pub fn new(store: MessageStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogState {
                store,
                pending: BTreeSet::new(),
                next_turn: 1,
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A snapshot of the log.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().store.messages().to_vec()
    }

    /// True while any turn awaits its assistant message.
    pub fn is_typing(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Number of turns still awaiting completion.
    pub fn pending_turns(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns true if `turn` has not finished yet.
    pub fn is_pending(&self, turn: TurnId) -> bool {
        self.lock().pending.contains(&turn)
    }

    /// Subscribes to every subsequent [`SessionEvent`].
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().observers.push(tx);
        rx
    }

    /// Appends the user's message and opens a new turn.
    pub fn begin_turn(&self, content: &str) -> Result<(TurnId, Message)> {
        let mut state = self.lock();
        let appended = state.store.append(NewMessage::user(content));
        state.report(&appended);
        let message = appended?;
        state.emit(SessionEvent::Appended(message.clone()));

        let turn = TurnId(state.next_turn);
        state.next_turn += 1;
        let was_typing = !state.pending.is_empty();
        state.pending.insert(turn);
        if !was_typing {
            state.emit(SessionEvent::Typing(true));
        }
        Ok((turn, message))
    }

    /// Appends the assistant's message for `turn` and closes the turn.
    ///
    /// The turn is closed even when the write fails.
    pub fn complete_turn(&self, turn: TurnId, message: NewMessage) -> Result<Message> {
        let mut state = self.lock();
        let appended = state.store.append(message);
        state.report(&appended);
        if let Ok(message) = &appended {
            state.emit(SessionEvent::Appended(message.clone()));
        }
        state.finish(turn);
        appended
    }

    /// Replaces the log with a fresh greeting and closes `turn`.
    pub fn reset_for(&self, turn: TurnId) -> Result<Message> {
        let mut state = self.lock();
        let reset = state.store.reset();
        state.report(&reset);
        if let Ok(greeting) = &reset {
            state.emit(SessionEvent::Reset(greeting.clone()));
        }
        state.finish(turn);
        reset
    }
}

///////////////////////////////////////////// TurnHandle /////////////////////////////////////////////

/// Handle to a submitted turn.
///
/// Dropping the handle does not cancel the turn.
pub struct TurnHandle {
    turn: TurnId,
    outcome: oneshot::Receiver<Result<TurnOutcome>>,
}

impl TurnHandle {
    /// The turn this handle tracks.
    pub fn turn(&self) -> TurnId {
        self.turn
    }

    /// Waits for the turn to finish.
    pub async fn join(self) -> Result<TurnOutcome> {
        self.outcome
            .await
            .map_err(|_| Error::task(format!("{} ended without an outcome", self.turn)))?
    }
}

///////////////////////////////////////////// ChatSession ////////////////////////////////////////////

/// A chat session: the input line, the command palette, and the log.
///
/// Open one with [`ChatSession::open`] and finish it with [`ChatSession::close`],
/// which waits for replies that are still outstanding.
pub struct ChatSession {
    log: SessionLog,
    dispatcher: Arc<Dispatcher>,
    config: ChatConfig,
    input: String,
    palette: CommandPalette,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Loads the log from `slot` and prepares a session against `backend`.
    pub fn open(
        slot: impl Slot + 'static,
        backend: Arc<dyn ChatBackend>,
        config: ChatConfig,
    ) -> Result<Self> {
        let log = SessionLog::new(MessageStore::load(slot)?);
        let dispatcher = Arc::new(Dispatcher::new(backend, log.clone(), config.reset_delay));
        Ok(Self {
            log,
            dispatcher,
            config,
            input: String::new(),
            palette: CommandPalette::new(),
            tasks: Vec::new(),
        })
    }

    /// The session configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// A handle to the shared log.
    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// A snapshot of the log.
    pub fn messages(&self) -> Vec<Message> {
        self.log.messages()
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.log.lock().store.len()
    }

    /// True while a reply is outstanding.
    pub fn is_typing(&self) -> bool {
        self.log.is_typing()
    }

    /// Subscribes to log and typing changes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.log.subscribe()
    }

    /// The current input text.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The command palette for the current input.
    pub fn palette(&self) -> &CommandPalette {
        &self.palette
    }

    /// The command palette, for moving the highlight.
    pub fn palette_mut(&mut self) -> &mut CommandPalette {
        &mut self.palette
    }

    /// Replaces the input text and refreshes the palette.
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
        self.palette.update(&self.input);
    }

    /// Rewrites the input to `command` plus a space and closes the palette.
    pub fn choose_command(&mut self, command: QuickCommand) {
        self.input = self.palette.choose(command);
    }

    /// Handles the confirm key.
    ///
    /// With the line-break modifier held a newline is inserted; otherwise the
    /// input is submitted.
    pub fn confirm(&mut self, line_break_modifier: bool) -> Result<Option<TurnHandle>> {
        if line_break_modifier {
            self.input.push('\n');
            self.palette.update(&self.input);
            return Ok(None);
        }
        self.submit()
    }

    /// Submits the current input as a new turn.
    ///
    /// Blank input is ignored and yields `Ok(None)`.  Otherwise the user message
    /// is appended, the input and palette are cleared, and the turn is spawned.
    pub fn submit(&mut self) -> Result<Option<TurnHandle>> {
        if self.input.trim().is_empty() {
            return Ok(None);
        }
        if self.config.single_flight && self.log.is_typing() {
            return Err(Error::busy("the previous reply is still pending"));
        }

        let (turn, _) = self.log.begin_turn(&self.input)?;
        let question = std::mem::take(&mut self.input);
        self.palette.close();

        let dispatcher = Arc::clone(&self.dispatcher);
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let outcome = dispatcher.run_turn(turn, question).await;
            let _ = tx.send(outcome);
        });
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task);
        Ok(Some(TurnHandle { turn, outcome: rx }))
    }

    /// Waits until every submitted turn has finished.
    ///
    /// Every turn is awaited even if one of them panicked; the first such
    /// failure is returned afterwards.
    pub async fn settle(&mut self) -> Result<()> {
        let mut first_error = None;
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                first_error.get_or_insert(Error::from(err));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Ends the session once outstanding turns have finished.
    pub async fn close(mut self) -> Result<()> {
        self.settle().await
    }
}
