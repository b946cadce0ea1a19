use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Answer questions in a friendly, professional way.";

/// Sampling configuration forwarded to the model server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Preset {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub parameters: SamplingParams,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Preset {
    pub fn new(
        name: String,
        description: String,
        system_prompt: String,
        parameters: SamplingParams,
        is_active: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            system_prompt,
            parameters,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PresetUsage {
    pub preset_id: Uuid,
    pub preset_name: String,
    pub conversation_count: usize,
    pub is_active: bool,
}
