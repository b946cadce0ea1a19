use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub preset_id: Option<Uuid>,
    /// Ordered references into the message collection
    #[serde(default)]
    pub message_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: String, preset_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        let title = if title.trim().is_empty() {
            DEFAULT_CONVERSATION_TITLE.to_string()
        } else {
            title
        };

        Self {
            id: Uuid::new_v4(),
            title,
            preset_id,
            message_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Advances `updated_at`, never moving it backwards.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

/// Listing filter; `limit`/`offset` paginate the sorted result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationFilter {
    pub preset_id: Option<Uuid>,
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Statistics {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub recent_conversations_7_days: usize,
    pub oldest_conversation_date: Option<DateTime<Utc>>,
}
