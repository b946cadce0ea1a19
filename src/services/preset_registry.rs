//! Preset Registry
//!
//! Validated CRUD over persona presets. The registry holds no state of its
//! own; every record lives in the [`RecordStore`].

use crate::errors::AppError;
use crate::forms::{PresetForm, PresetPatch, SamplingForm};
use crate::models::{Preset, PresetUsage, SamplingParams, DEFAULT_SYSTEM_PROMPT};
use crate::store::RecordStore;
use uuid::Uuid;

/// System prompt and sampling parameters used for a turn
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub preset_id: Option<Uuid>,
    pub system_prompt: String,
    pub parameters: SamplingParams,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            preset_id: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            parameters: SamplingParams::default(),
        }
    }
}

#[derive(Clone)]
pub struct PresetRegistry {
    store: RecordStore,
}

impl PresetRegistry {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Vec<Preset> {
        self.store.list_presets().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Preset, AppError> {
        self.store.get_preset(id).await
    }

    #[tracing::instrument(name = "Register preset", skip(self, form), fields(name = %form.name))]
    pub async fn create(&self, form: PresetForm) -> Result<Preset, AppError> {
        form.check().map_err(AppError::Validation)?;
        self.store.create_preset(form.into()).await
    }

    /// Validates the supplied fields, merges them into the stored preset and
    /// validates the merged result before writing it.
    #[tracing::instrument(name = "Update preset fields", skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: PresetPatch) -> Result<Preset, AppError> {
        patch.check().map_err(AppError::Validation)?;

        self.store
            .update_preset(id, move |preset| {
                patch.update(preset);
                PresetForm::from(&*preset)
                    .check()
                    .map_err(AppError::Validation)
            })
            .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.store.delete_preset(id).await
    }

    pub async fn usage(&self, id: Uuid) -> Result<PresetUsage, AppError> {
        self.store.preset_usage(id).await
    }

    /// Persona for a conversation. A preset that was deleted after the
    /// conversation referenced it falls back to the defaults.
    pub async fn persona(&self, preset_id: Option<Uuid>) -> Persona {
        let Some(id) = preset_id else {
            return Persona::default();
        };

        match self.store.get_preset(id).await {
            Ok(preset) => Persona {
                preset_id: Some(preset.id),
                system_prompt: preset.system_prompt,
                parameters: preset.parameters,
            },
            Err(err) => {
                tracing::warn!(preset_id = %id, "Preset unavailable, using defaults: {}", err);
                Persona::default()
            }
        }
    }

    /// Creates the built-in personas when no preset exists yet. Returns the
    /// number of presets created.
    #[tracing::instrument(name = "Seed default presets", skip(self))]
    pub async fn seed_defaults(&self) -> Result<usize, AppError> {
        if !self.store.list_presets().await.is_empty() {
            return Ok(0);
        }

        let defaults = default_presets();
        let count = defaults.len();
        for form in defaults {
            self.create(form).await?;
        }
        tracing::info!("Seeded {} default presets", count);

        Ok(count)
    }
}

fn default_presets() -> Vec<PresetForm> {
    let preset = |name: &str, description: &str, prompt: &str, temperature: f32| PresetForm {
        name: name.to_string(),
        description: Some(description.to_string()),
        system_prompt: prompt.to_string(),
        parameters: Some(SamplingForm {
            temperature: Some(temperature),
            ..Default::default()
        }),
        is_active: true,
    };

    vec![
        preset(
            "General assistant",
            "Friendly general purpose helper",
            DEFAULT_SYSTEM_PROMPT,
            0.7,
        ),
        preset(
            "Coding assistant",
            "Programming help with concise, correct code",
            "You are an experienced software engineer. Give precise answers and \
             include working code examples when they help.",
            0.3,
        ),
        preset(
            "Creative writer",
            "Stories, poems and brainstorming",
            "You are an imaginative writer. Respond with vivid, original prose.",
            1.0,
        ),
    ]
}
