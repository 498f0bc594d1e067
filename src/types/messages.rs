//! Append-only log entries: chat messages, reasoning steps, actions taken,
//! and notifications sent (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A single turn in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// A `"[warning] <stage>: <reason>"`-style system note (§4.1 failure semantics).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One step of the ReAct reasoning trace (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub thought: String,
    pub action: Option<String>,
    pub action_input: Option<serde_json::Value>,
    pub observation: Option<String>,
}

/// One completed tool invocation (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: serde_json::Value,
    pub observation: String,
    pub success: bool,
}

/// One notification dispatched to a department (§4.3 idempotence).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub department: String,
    pub priority: String,
    pub timestamp: DateTime<Utc>,
}
