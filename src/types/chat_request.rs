use serde::{Deserialize, Serialize};

/// The body of a `POST /api/chat` request.
///
/// The question is the user's raw input, sent verbatim (command prefix included).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's question.
    pub question: String,
}

impl ChatRequest {
    /// Create a new `ChatRequest` for the given question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

impl From<&str> for ChatRequest {
    fn from(question: &str) -> Self {
        Self::new(question)
    }
}
