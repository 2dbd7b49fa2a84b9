//! Persisted message log.
//!
//! The [`MessageStore`] owns the ordered log and mirrors it into a [`Slot`]
//! after every mutation.  Writes are full rewrites of the serialized log; a
//! mutation whose write fails is rolled back so memory and the slot never
//! disagree.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::observability::{STORE_LOAD_FALLBACKS, STORE_RESETS, STORE_WRITE_ERRORS, STORE_WRITES};
use crate::types::{Message, MessageId, NewMessage};
use crate::utils::time::unix_millis;

//////////////////////////////////////////////// Slot ////////////////////////////////////////////////

/// A single key-value slot holding the serialized log.
pub trait Slot: Send {
    /// Read the slot.  `Ok(None)` means nothing has been written yet.
    fn read(&self) -> Result<Option<String>>;

    /// Replace the slot's contents.
    fn write(&mut self, contents: &str) -> Result<()>;
}

/// A slot backed by a file on disk.
///
/// Writes go to a sibling temporary file that is renamed over the target, so a
/// crash mid-write leaves the previous log intact.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Creates a slot stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file backing this slot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Slot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io("failed to read message log", err)),
        }
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| Error::io("failed to create message log directory", err))?;
        }
        let temp = self.temp_path();
        let file = File::create(&temp)
            .map_err(|err| Error::io("failed to create message log file", err))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(contents.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|err| Error::io("failed to write message log", err))?;
        fs::rename(&temp, &self.path)
            .map_err(|err| Error::io("failed to replace message log", err))
    }
}

/// An in-memory slot.
///
/// Clones share the same contents, so a test can keep one handle and inspect
/// what the store persisted through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    contents: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemorySlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot that already holds `contents`.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let slot = Self::default();
        *slot.lock_contents() = Some(contents.into());
        slot
    }

    /// Returns a copy of the current contents.
    pub fn contents(&self) -> Option<String> {
        self.lock_contents().clone()
    }

    /// Makes subsequent writes fail until called again with `false`.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    fn lock_contents(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Slot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents())
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(Error::io(
                "memory slot rejected write",
                io::Error::other("writes disabled"),
            ));
        }
        *self.lock_contents() = Some(contents.to_string());
        Ok(())
    }
}

//////////////////////////////////////////// MessageStore ////////////////////////////////////////////

/// The ordered, append-only message log and its persisted mirror.
pub struct MessageStore {
    slot: Box<dyn Slot>,
    messages: Vec<Message>,
    last_id: Option<MessageId>,
}

impl MessageStore {
    /// Loads the log from `slot`.
    ///
    /// Missing, unreadable, malformed or empty state falls back to a single
    /// seeded greeting, which is written back so the slot matches memory.  A log
    /// holding the largest possible id counts as malformed, since no later
    /// message could be numbered after it.
    pub fn load(slot: impl Slot + 'static) -> Result<Self> {
        let persisted = match slot.read() {
            Ok(Some(contents)) => serde_json::from_str::<Vec<Message>>(&contents)
                .ok()
                .filter(|messages| !messages.is_empty())
                .filter(|messages| messages.iter().all(|m| m.id < MessageId(u64::MAX))),
            Ok(None) | Err(_) => None,
        };
        let mut store = Self {
            slot: Box::new(slot),
            messages: Vec::new(),
            last_id: None,
        };
        match persisted {
            Some(messages) => {
                store.last_id = messages.iter().map(|m| m.id).max();
                store.messages = messages;
            }
            None => {
                STORE_LOAD_FALLBACKS.click();
                let greeting = store.stamp(NewMessage::greeting())?;
                store.messages.push(greeting);
                store.persist()?;
            }
        }
        Ok(store)
    }

    /// The log, in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the log.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false once loaded; the log is never empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message and persists the full log.
    ///
    /// Returns the stamped message.  If the write fails the message is removed
    /// again and the error is returned.  Once ids are exhausted appends fail
    /// until the log is reset.
    pub fn append(&mut self, message: NewMessage) -> Result<Message> {
        let previous_id = self.last_id;
        let message = self.stamp(message)?;
        self.messages.push(message.clone());
        if let Err(err) = self.persist() {
            self.messages.pop();
            self.last_id = previous_id;
            return Err(err);
        }
        Ok(message)
    }

    /// Replaces the whole log with a fresh greeting and persists it.
    ///
    /// Numbering restarts from the clock, as none of the old ids survive.
    pub fn reset(&mut self) -> Result<Message> {
        let previous_id = self.last_id.take();
        let greeting = self.stamp(NewMessage::greeting())?;
        let previous = std::mem::replace(&mut self.messages, vec![greeting.clone()]);
        if let Err(err) = self.persist() {
            self.messages = previous;
            self.last_id = previous_id;
            return Err(err);
        }
        STORE_RESETS.click();
        Ok(greeting)
    }

    fn stamp(&mut self, message: NewMessage) -> Result<Message> {
        let now = OffsetDateTime::now_utc();
        let candidate = unix_millis(now);
        let id = match self.last_id {
            Some(MessageId(last)) if candidate <= last => {
                let next = last.checked_add(1).ok_or_else(|| {
                    Error::store("message ids are exhausted; reset the conversation")
                })?;
                MessageId(next)
            }
            _ => MessageId(candidate),
        };
        self.last_id = Some(id);
        Ok(message.stamp(id, now))
    }

    fn persist(&mut self) -> Result<()> {
        let serialized = serde_json::to_string(&self.messages)?;
        match self.slot.write(&serialized) {
            Ok(()) => {
                STORE_WRITES.click();
                Ok(())
            }
            Err(err) => {
                STORE_WRITE_ERRORS.click();
                Err(err)
            }
        }
    }
}
