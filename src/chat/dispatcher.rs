//! Turn dispatch against the chat backend.
//!
//! A [`Dispatcher`] runs one turn at a time per call to [`Dispatcher::run_turn`]:
//! it asks the backend, then records the assistant's reply or the failure in the
//! [`SessionLog`].  Questions starting with `/reset` take a different path: the
//! log is replaced by a fresh greeting after a short delay, and the backend's
//! answer is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chat::commands::is_reset;
use crate::chat::session::{SessionLog, TurnId};
use crate::client::ChatBackend;
use crate::error::Result;
use crate::observability::{
    SESSION_DISCARDED_ANSWERS, SESSION_TURN_DURATION, SESSION_TURN_ERRORS, SESSION_TURNS,
};
use crate::types::{ChatRequest, Message, NewMessage};

/// Delay between submitting `/reset` and clearing the log.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(500);

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The backend answered and the reply was appended.
    Answered(Message),

    /// The backend failed and an error message was appended.
    Failed(Message),

    /// The log was replaced by `greeting`.
    ///
    /// `failure` holds the error message appended when the backend could not be
    /// reached at all; backend answers and declared failures are discarded.
    Reset {
        greeting: Message,
        failure: Option<Message>,
    },
}

impl TurnOutcome {
    /// The message that best summarizes the turn.
    pub fn message(&self) -> &Message {
        match self {
            TurnOutcome::Answered(message) | TurnOutcome::Failed(message) => message,
            TurnOutcome::Reset { greeting, .. } => greeting,
        }
    }
}

/// Sends questions to the backend and records the outcome.
pub struct Dispatcher {
    backend: Arc<dyn ChatBackend>,
    log: SessionLog,
    reset_delay: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher writing into `log`.
    pub fn new(backend: Arc<dyn ChatBackend>, log: SessionLog, reset_delay: Duration) -> Self {
        Self {
            backend,
            log,
            reset_delay,
        }
    }

    /// Runs `turn` for `question`, which the caller has already appended.
    ///
    /// Returns an error only when the outcome could not be recorded.
    pub async fn run_turn(&self, turn: TurnId, question: String) -> Result<TurnOutcome> {
        SESSION_TURNS.click();
        let start = Instant::now();
        let outcome = if is_reset(&question) {
            self.reset_turn(turn, question).await
        } else {
            self.answer_turn(turn, question).await
        };
        SESSION_TURN_DURATION.add(start.elapsed().as_secs_f64());
        outcome
    }

    async fn answer_turn(&self, turn: TurnId, question: String) -> Result<TurnOutcome> {
        let request = ChatRequest::new(question);
        match self.backend.ask(&request).await {
            Ok(reply) => {
                let message = NewMessage::assistant(reply.answer).with_planner(reply.planner);
                Ok(TurnOutcome::Answered(self.log.complete_turn(turn, message)?))
            }
            Err(err) => {
                SESSION_TURN_ERRORS.click();
                let message = self.log.complete_turn(turn, NewMessage::failure(&err))?;
                Ok(TurnOutcome::Failed(message))
            }
        }
    }

    async fn reset_turn(&self, turn: TurnId, question: String) -> Result<TurnOutcome> {
        let log = self.log.clone();
        let delay = self.reset_delay;
        let reset = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            log.reset_for(turn)
        });

        let request = ChatRequest::new(question);
        let failure = match self.backend.ask(&request).await {
            Ok(_) => {
                SESSION_DISCARDED_ANSWERS.click();
                None
            }
            Err(err) if err.is_transport() => {
                SESSION_TURN_ERRORS.click();
                Some(self.log.complete_turn(turn, NewMessage::failure(&err))?)
            }
            Err(_) => {
                SESSION_DISCARDED_ANSWERS.click();
                None
            }
        };

        let greeting = reset.await??;
        Ok(TurnOutcome::Reset { greeting, failure })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::chat::store::{MemorySlot, MessageStore};
    use crate::error::Error;
    use crate::types::{ChatReply, GREETING, MessageRole};

    /// Answers from a script, optionally after a delay.
    struct ScriptedBackend {
        delay: Duration,
        replies: Mutex<VecDeque<Result<ChatReply>>>,
        questions: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(delay: Duration, replies: Vec<Result<ChatReply>>) -> Arc<Self> {
            Arc::new(Self {
                delay,
                replies: Mutex::new(replies.into()),
                questions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn ask(&self, request: &ChatRequest) -> Result<ChatReply> {
            self.questions.lock().unwrap().push(request.question.clone());
            tokio::time::sleep(self.delay).await;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatReply::new("unscripted", None)))
        }
    }

    fn setup(backend: Arc<ScriptedBackend>) -> (Dispatcher, SessionLog, MemorySlot) {
        let slot = MemorySlot::new();
        let log = SessionLog::new(MessageStore::load(slot.clone()).unwrap());
        let dispatcher = Dispatcher::new(backend, log.clone(), DEFAULT_RESET_DELAY);
        (dispatcher, log, slot)
    }

    #[tokio::test]
    async fn answer_is_appended_with_planner() {
        let backend = ScriptedBackend::new(
            Duration::ZERO,
            vec![Ok(ChatReply::new(
                "2 + 2 = **4**",
                Some(vec!["Calculate".to_string(), "Finish".to_string()]),
            ))],
        );
        let (dispatcher, log, _) = setup(backend.clone());
        let (turn, _) = log.begin_turn("/calc 2+2").unwrap();
        assert!(log.is_typing());

        let outcome = dispatcher.run_turn(turn, "/calc 2+2".to_string()).await.unwrap();
        let TurnOutcome::Answered(message) = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content, "2 + 2 = **4**");
        assert_eq!(
            message.planner,
            Some(vec!["Calculate".to_string(), "Finish".to_string()])
        );
        assert!(!log.is_typing());
        assert_eq!(log.messages().len(), 3);
        assert_eq!(*backend.questions.lock().unwrap(), vec!["/calc 2+2"]);
    }

    #[tokio::test]
    async fn failure_is_appended_as_error_message() {
        let backend = ScriptedBackend::new(
            Duration::ZERO,
            vec![Err(Error::connection("connection refused", None))],
        );
        let (dispatcher, log, _) = setup(backend);
        let (turn, _) = log.begin_turn("hello").unwrap();

        let outcome = dispatcher.run_turn(turn, "hello".to_string()).await.unwrap();
        let TurnOutcome::Failed(message) = outcome else {
            panic!("expected a failure");
        };
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(message.content.starts_with("Error: "));
        assert!(message.content.contains("connection refused"));
        assert!(message.planner.is_none());
        assert!(!log.is_typing());
    }

    #[tokio::test]
    async fn declared_failure_is_appended_outside_reset() {
        let backend =
            ScriptedBackend::new(Duration::ZERO, vec![Err(Error::api(503, "overloaded"))]);
        let (dispatcher, log, _) = setup(backend);
        let (turn, _) = log.begin_turn("/outlets PJ").unwrap();

        let outcome = dispatcher.run_turn(turn, "/outlets PJ".to_string()).await.unwrap();
        assert_eq!(
            outcome.message().content,
            "Error: Failed to get AI answer (HTTP 503): overloaded"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_answer_and_clears_after_delay() {
        let backend = ScriptedBackend::new(
            Duration::from_millis(100),
            vec![Ok(ChatReply::new("Conversation reset.", None))],
        );
        let (dispatcher, log, slot) = setup(backend.clone());
        let (first, _) = log.begin_turn("hi").unwrap();
        log.complete_turn(first, NewMessage::assistant("hello")).unwrap();
        let (turn, _) = log.begin_turn("/reset").unwrap();

        let start = tokio::time::Instant::now();
        let outcome = dispatcher.run_turn(turn, "/reset".to_string()).await.unwrap();
        assert!(start.elapsed() >= DEFAULT_RESET_DELAY);

        let TurnOutcome::Reset { greeting, failure } = outcome else {
            panic!("expected a reset");
        };
        assert!(failure.is_none());
        assert_eq!(greeting.content, GREETING);
        assert_eq!(log.messages(), vec![greeting.clone()]);
        assert!(!log.is_typing());
        assert_eq!(*backend.questions.lock().unwrap(), vec!["/reset"]);

        let persisted: Vec<Message> = serde_json::from_str(&slot.contents().unwrap()).unwrap();
        assert_eq!(persisted, vec![greeting]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_happens_even_when_backend_is_slow() {
        let backend = ScriptedBackend::new(
            Duration::from_secs(5),
            vec![Ok(ChatReply::new("ignored", None))],
        );
        let (dispatcher, log, _) = setup(backend);
        let (turn, _) = log.begin_turn("/reset").unwrap();

        let observer = log.clone();
        let check = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            (observer.messages().len(), observer.is_typing())
        });
        dispatcher.run_turn(turn, "/reset".to_string()).await.unwrap();
        let (len, typing) = check.await.unwrap();
        assert_eq!(len, 1);
        assert!(!typing);
        assert_eq!(log.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_surfaces_transport_failures_only() {
        let backend = ScriptedBackend::new(
            Duration::ZERO,
            vec![
                Err(Error::timeout("Request timed out", Some(60.0))),
                Err(Error::api(500, "boom")),
            ],
        );
        let (dispatcher, log, _) = setup(backend);

        let (turn, _) = log.begin_turn("/reset").unwrap();
        let outcome = dispatcher.run_turn(turn, "/reset".to_string()).await.unwrap();
        let TurnOutcome::Reset { greeting, failure } = outcome else {
            panic!("expected a reset");
        };
        let failure = failure.expect("transport failure is surfaced");
        assert!(failure.content.starts_with("Error: "));
        assert_eq!(log.messages(), vec![greeting]);

        let (turn, _) = log.begin_turn("/reset now").unwrap();
        let outcome = dispatcher.run_turn(turn, "/reset now".to_string()).await.unwrap();
        let TurnOutcome::Reset { failure, .. } = outcome else {
            panic!("expected a reset");
        };
        assert!(failure.is_none());
        assert_eq!(log.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_transport_failure_lands_after_greeting() {
        let backend = ScriptedBackend::new(
            Duration::from_secs(2),
            vec![Err(Error::connection("connection reset", None))],
        );
        let (dispatcher, log, _) = setup(backend);
        let (turn, _) = log.begin_turn("/reset").unwrap();

        dispatcher.run_turn(turn, "/reset".to_string()).await.unwrap();
        let messages = log.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_greeting());
        assert!(messages[1].content.starts_with("Error: "));
        assert!(messages[0].id < messages[1].id);
    }
}
