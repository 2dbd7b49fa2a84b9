//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::chat::dispatcher::DEFAULT_RESET_DELAY;

/// Default location of the persisted conversation.
pub const DEFAULT_HISTORY_PATH: &str = "zus-chat-history.json";

/// Command-line arguments for the zuschat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat backend.
    #[arrrg(
        optional,
        "Backend base URL (default: $ZUSCHAT_API_BASE or http://localhost:8000/)",
        "URL"
    )]
    pub api_base: Option<String>,

    /// Where the conversation is persisted.
    #[arrrg(optional, "Conversation file (default: zus-chat-history.json)", "PATH")]
    pub history: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Delay before /reset clears the conversation.
    #[arrrg(optional, "Delay before /reset clears the log (default: 500)", "MILLIS")]
    pub reset_delay_ms: Option<u64>,

    /// Append every backend request and response to this file.
    #[arrrg(optional, "Log backend turns as JSON lines to PATH", "PATH")]
    pub log_file: Option<String>,

    /// Refuse to submit while a reply is pending.
    #[arrrg(flag, "Allow only one outstanding question at a time")]
    pub single_flight: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Backend base URL; `None` defers to the environment and then the default.
    pub api_base: Option<String>,

    /// Where the conversation is persisted.
    pub history_path: PathBuf,

    /// Request timeout; `None` uses the client default.
    pub timeout: Option<Duration>,

    /// Delay between submitting `/reset` and clearing the log.
    pub reset_delay: Duration,

    /// Optional JSON-lines log of backend turns.
    pub log_path: Option<PathBuf>,

    /// Whether a new question is refused while a reply is pending.
    pub single_flight: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - History: zus-chat-history.json
    /// - Reset delay: 500ms
    /// - Overlapping questions: allowed
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            api_base: None,
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            timeout: None,
            reset_delay: DEFAULT_RESET_DELAY,
            log_path: None,
            single_flight: false,
            use_color: true,
        }
    }

    /// Sets the backend base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Sets the conversation file.
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = path.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the reset delay.
    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    /// Sets the turn log path.
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    /// Sets whether only one question may be outstanding.
    pub fn with_single_flight(mut self, single_flight: bool) -> Self {
        self.single_flight = single_flight;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            api_base: args.api_base,
            history_path: args
                .history
                .map(PathBuf::from)
                .unwrap_or(defaults.history_path),
            timeout: args.timeout_secs.map(Duration::from_secs),
            reset_delay: args
                .reset_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reset_delay),
            log_path: args.log_file.map(PathBuf::from),
            single_flight: args.single_flight,
            use_color: !args.no_color,
        }
    }
}
