//! Notification type definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationKind {
    NewMessage,   // Someone posted in one of your chats
    TaskAssigned, // A workspace task was assigned to you
    Test,         // Connectivity test notification
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewMessage => "new_message",
            Self::TaskAssigned => "task_assigned",
            Self::Test => "test",
        }
    }

}

/// Provider-agnostic description of a notification to be delivered to one
/// user. Produced by the API layer, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Recipient user identity
    pub user_id: String,
    pub title: String,
    pub body: String,
    /// Structured payload. Values are stringified at dispatch time, so
    /// callers may put numbers or objects here.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl NotificationRequest {
    /// Request describing a new chat message for one recipient.
    pub fn new_message(
        user_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        chat_id: &str,
        message_id: &str,
    ) -> Self {
        let mut data = Map::new();
        data.insert("chatId".to_string(), Value::String(chat_id.to_string()));
        data.insert(
            "messageId".to_string(),
            Value::String(message_id.to_string()),
        );
        data.insert(
            "type".to_string(),
            Value::String(NotificationKind::NewMessage.as_str().to_string()),
        );

        Self {
            user_id: user_id.into(),
            title: title.into(),
            body: body.into(),
            data,
        }
    }
}
