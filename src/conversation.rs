//! Conversation and transcript types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a transcript.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    User = 0,
    Assistant = 1,
}

/// A piece of transcript delivered to the host. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub source: TranscriptSource,
    pub text: String,
}

impl TranscriptEvent {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            source: TranscriptSource::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            source: TranscriptSource::Assistant,
            text: text.into(),
        }
    }
}

/// A tool invocation requested by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned identifier, echoed back with the result
    pub id: String,
    /// Tool name
    pub name: String,
    /// Raw arguments
    #[serde(default)]
    pub arguments: Value,
    /// What the tool is going to do, shown to the host for approval
    pub description: String,
    /// Why the provider wants it done
    #[serde(default)]
    pub justification: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Value::Object(serde_json::Map::new()),
            description: description.into(),
            justification: justification.into(),
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }
}

/// A message in the conversation presented to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// A recorded message with the time it entered the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    pub message: Message,
    pub created_at: DateTime<Utc>,
}

/// The live, ordered conversation of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    items: Vec<ConversationItem>,
}

impl Conversation {
    pub fn push(&mut self, message: Message) {
        self.items.push(ConversationItem {
            message,
            created_at: Utc::now(),
        });
    }

    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    /// Messages in order, as sent to the provider.
    pub fn messages(&self) -> Vec<Message> {
        self.items.iter().map(|i| i.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_raw_values() {
        assert_eq!(TranscriptSource::User as u32, 0);
        assert_eq!(TranscriptSource::Assistant as u32, 1);
        assert_eq!(serde_json::to_value(TranscriptSource::Assistant).unwrap(), json!("assistant"));
    }

    #[test]
    fn conversation_keeps_order() {
        let mut conv = Conversation::default();
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant(
            "Let me look",
            vec![ToolCallRequest::new("call-1", "read_file", "read_file", "need contents")],
        ));
        conv.push(Message::tool_result("call-1", "hello", false));

        assert_eq!(conv.len(), 3);
        let messages = conv.messages();
        assert!(matches!(&messages[0], Message::User { text } if text == "Hi"));
        assert!(matches!(&messages[1], Message::Assistant { tool_calls, .. } if tool_calls.len() == 1));
        assert!(matches!(&messages[2], Message::ToolResult { call_id, .. } if call_id == "call-1"));
    }

    #[test]
    fn message_serialization_shape() {
        let value = serde_json::to_value(Message::tool_result("c1", "denied", true)).unwrap();
        assert_eq!(
            value,
            json!({ "role": "tool_result", "call_id": "c1", "content": "denied", "is_error": true })
        );

        let value = serde_json::to_value(Message::assistant("ok", vec![])).unwrap();
        assert_eq!(value, json!({ "role": "assistant", "text": "ok" }));
    }
}
