//! Logging trait for backend turns.
//!
//! This module provides the [`TurnLogger`] trait that captures every request
//! sent through a [`ChatBackend`](crate::ChatBackend), along with the raw
//! response body or the failure that ended it.  [`JsonLinesLogger`] is a
//! ready-made implementation that appends one JSON object per event to a file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};
use crate::types::ChatRequest;

/// A trait for logging backend interactions.
///
/// Implementations must not fail the turn: errors while logging are swallowed.
pub trait TurnLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatRequest);

    /// Log the decoded body of a successful response.
    fn log_response(&self, request: &ChatRequest, body: &Value);

    /// Log a failed request, whether declared by the backend or raised in transport.
    fn log_failure(&self, request: &ChatRequest, error: &Error);
}

/// Appends one JSON record per event to a file.
pub struct JsonLinesLogger {
    file: Mutex<File>,
}

impl JsonLinesLogger {
    /// Opens `path` for appending, creating it if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|err| Error::io("failed to open turn log", err))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write_record(&self, mut record: Value) {
        let at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        record["at"] = Value::String(at);
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{record}");
        }
    }
}

impl TurnLogger for JsonLinesLogger {
    fn log_request(&self, request: &ChatRequest) {
        self.write_record(json!({
            "event": "request",
            "question": request.question,
        }));
    }

    fn log_response(&self, request: &ChatRequest, body: &Value) {
        self.write_record(json!({
            "event": "response",
            "question": request.question,
            "body": body,
        }));
    }

    fn log_failure(&self, request: &ChatRequest, error: &Error) {
        self.write_record(json!({
            "event": "failure",
            "question": request.question,
            "error": error.to_string(),
            "status": error.status_code(),
        }));
    }
}
