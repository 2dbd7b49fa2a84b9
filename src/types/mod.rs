// Public modules
pub mod chat_reply;
pub mod chat_request;
pub mod message;

// Re-exports
pub use chat_reply::{ChatReply, NO_ANSWER};
pub use chat_request::ChatRequest;
pub use message::{GREETING, GREETING_PLANNER, Message, MessageId, MessageRole, NewMessage};
