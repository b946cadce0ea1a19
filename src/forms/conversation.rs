use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use uuid::Uuid;

pub const MAX_TITLE_LENGTH: usize = 200;

#[derive(Serialize, Deserialize, Debug, Default, Validate)]
pub struct ConversationForm {
    #[validate(max_length = 200)]
    pub title: Option<String>,
    pub preset_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Default, Validate)]
pub struct ConversationPatch {
    #[validate(min_length = 1)]
    #[validate(max_length = 200)]
    pub title: Option<String>,
    pub preset_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Default, Validate)]
pub struct DuplicateForm {
    #[validate(max_length = 200)]
    pub title: Option<String>,
}

/// A user message, sent over REST or as a websocket text frame
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct MessageForm {
    #[validate(min_length = 1)]
    #[validate(max_length = 100000)]
    pub message: String,
    #[serde(default)]
    pub preset_id: Option<Uuid>,
}

/// Stateless chat request; a conversation is created when none is given
#[derive(Serialize, Deserialize, Debug, Validate)]
pub struct ChatForm {
    #[validate(min_length = 1)]
    #[validate(max_length = 100000)]
    pub message: String,
    pub conversation_id: Option<Uuid>,
    pub preset_id: Option<Uuid>,
}
