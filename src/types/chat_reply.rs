use serde_json::Value;

use crate::types::message::planner_from_value;

/// Sentinel used when a successful response carries no usable answer.
pub const NO_ANSWER: &str = "(no answer)";

/// Primary key holding the answer in a chat response.
const ANSWER_KEY: &str = "message";

/// Fallback key holding the answer in a chat response.
const FALLBACK_ANSWER_KEY: &str = "text";

/// The interpreted body of a successful `POST /api/chat` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// The answer text, or [`NO_ANSWER`] if the response had none.
    pub answer: String,

    /// The planner trace from `debug.planner_action`, if present.
    pub planner: Option<Vec<String>>,
}

impl ChatReply {
    /// Create a new `ChatReply`.
    pub fn new(answer: impl Into<String>, planner: Option<Vec<String>>) -> Self {
        Self {
            answer: answer.into(),
            planner,
        }
    }

    /// Interpret a response body.
    ///
    /// The answer comes from `message`, then `text`, then [`NO_ANSWER`].  Null,
    /// `false`, zero and the empty string count as missing.  Other non-string
    /// answers (numbers from the calculator, product and outlet records) are
    /// rendered as compact JSON.
    pub fn from_value(body: Value) -> Self {
        let Value::Object(mut body) = body else {
            return Self::new(NO_ANSWER, None);
        };
        let answer = [ANSWER_KEY, FALLBACK_ANSWER_KEY]
            .iter()
            .find_map(|key| body.remove(*key).and_then(answer_text))
            .unwrap_or_else(|| NO_ANSWER.to_string());
        let planner = match body.remove("debug") {
            Some(Value::Object(mut debug)) => {
                debug.remove("planner_action").and_then(planner_from_value)
            }
            _ => None,
        };
        Self { answer, planner }
    }
}

fn answer_text(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_without_debug_has_no_planner() {
        let reply = ChatReply::from_value(json!({"message": "Hello"}));
        assert_eq!(reply, ChatReply::new("Hello", None));
    }

    #[test]
    fn planner_action_sequence_is_kept_in_order() {
        let reply = ChatReply::from_value(json!({
            "message": "Found it",
            "debug": {"planner_action": ["Lookup", "Answer", "Finish"], "reasoning": "x"}
        }));
        assert_eq!(
            reply.planner,
            Some(vec![
                "Lookup".to_string(),
                "Answer".to_string(),
                "Finish".to_string()
            ])
        );
    }

    #[test]
    fn planner_action_string_becomes_single_step() {
        let reply = ChatReply::from_value(json!({
            "message": "Which outlet do you mean?",
            "debug": {"planner_action": "ask_followup"}
        }));
        assert_eq!(reply.planner, Some(vec!["ask_followup".to_string()]));
    }

    #[test]
    fn text_is_the_fallback_key() {
        let reply = ChatReply::from_value(json!({"text": "From text"}));
        assert_eq!(reply.answer, "From text");
        let reply = ChatReply::from_value(json!({"message": "", "text": "From text"}));
        assert_eq!(reply.answer, "From text");
    }

    #[test]
    fn missing_answer_uses_sentinel() {
        assert_eq!(ChatReply::from_value(json!({})).answer, NO_ANSWER);
        assert_eq!(ChatReply::from_value(json!({"message": null})).answer, NO_ANSWER);
        assert_eq!(ChatReply::from_value(Value::Null).answer, NO_ANSWER);
    }

    #[test]
    fn falsy_answers_fall_through() {
        assert_eq!(ChatReply::from_value(json!({"message": 0})).answer, NO_ANSWER);
        assert_eq!(ChatReply::from_value(json!({"message": 0.0})).answer, NO_ANSWER);
        assert_eq!(ChatReply::from_value(json!({"message": false})).answer, NO_ANSWER);
        assert_eq!(
            ChatReply::from_value(json!({"message": 0, "text": "zero"})).answer,
            "zero"
        );
        assert_eq!(ChatReply::from_value(json!({"message": true})).answer, "true");
    }

    #[test]
    fn structured_answers_are_rendered_as_json() {
        assert_eq!(ChatReply::from_value(json!({"message": 4})).answer, "4");
        assert_eq!(
            ChatReply::from_value(json!({"message": {"name": "ZUS All Day Cup"}})).answer,
            r#"{"name":"ZUS All Day Cup"}"#
        );
    }

    #[test]
    fn debug_without_planner_is_absent() {
        let reply = ChatReply::from_value(json!({"message": "ok", "debug": {"reasoning": "x"}}));
        assert!(reply.planner.is_none());
    }
}
