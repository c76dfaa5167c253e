use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatMessage, Role};

/// One prior turn of the caller-held conversation.
///
/// Accepts `{role, content}` as well as the widget's `{role, parts: [text]}`
/// shape. `model` and `bot` roles read as assistant; anything else is treated
/// as the user so callers cannot inject system instructions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTurn")]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Deserialize)]
struct RawTurn {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    parts: Option<Vec<Value>>,
}

impl From<RawTurn> for ConversationTurn {
    fn from(raw: RawTurn) -> Self {
        let role = match raw.role.as_deref().map(|role| role.trim().to_ascii_lowercase()) {
            Some(role) if matches!(role.as_str(), "assistant" | "model" | "bot") => {
                TurnRole::Assistant
            }
            _ => TurnRole::User,
        };

        let content = match (raw.content, raw.parts) {
            (Some(content), _) => text_of(&content),
            (None, Some(parts)) => parts
                .iter()
                .map(text_of)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            (None, None) => String::new(),
        };

        Self { role, content: content.trim().to_string() }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map.get("text").map(text_of).unwrap_or_default(),
        Value::Array(items) => items.iter().map(text_of).collect::<Vec<_>>().join(" "),
        _ => String::new(),
    }
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }

    pub fn to_message(&self) -> ChatMessage {
        let role = match self.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        ChatMessage { role, content: self.content.clone() }
    }
}

/// History without a trailing user turn that repeats `message`. The web
/// widget appends the message to its history before posting both.
pub fn prior_turns<'a>(history: &'a [ConversationTurn], message: &str) -> &'a [ConversationTurn] {
    match history.split_last() {
        Some((last, earlier))
            if last.role == TurnRole::User && last.content.trim() == message.trim() =>
        {
            earlier
        }
        _ => history,
    }
}

/// The last `size` non-empty turns, oldest first.
pub fn window(history: &[ConversationTurn], size: usize) -> Vec<ConversationTurn> {
    let turns = history.iter().filter(|turn| !turn.content.is_empty()).collect::<Vec<_>>();
    let start = turns.len().saturating_sub(size);
    turns[start..].iter().map(|turn| (*turn).clone()).collect()
}
