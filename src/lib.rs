// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod observability;
pub mod render;
pub mod types;
pub mod utils;

// Re-exports
pub use client::{API_BASE_ENV, ChatBackend, DEFAULT_API_BASE, HttpBackend};
pub use client_logger::{JsonLinesLogger, TurnLogger};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use types::*;
