use super::RecordStore;
use crate::errors::AppError;
use crate::models::{Preset, PresetUsage};
use chrono::Utc;
use uuid::Uuid;

impl RecordStore {
    /// Presets ordered by creation time.
    pub async fn list_presets(&self) -> Vec<Preset> {
        let mut presets: Vec<Preset> = self.inner.presets.read().await.values().cloned().collect();
        presets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        presets
    }

    pub async fn get_preset(&self, id: Uuid) -> Result<Preset, AppError> {
        self.inner
            .presets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::preset_not_found(id))
    }

    #[tracing::instrument(name = "Create preset", skip(self, preset), fields(name = %preset.name))]
    pub async fn create_preset(&self, preset: Preset) -> Result<Preset, AppError> {
        let mut presets = self.inner.presets.write().await;
        if presets.values().any(|p| p.name == preset.name) {
            return Err(AppError::Validation(format!(
                "preset name '{}' already exists",
                preset.name
            )));
        }

        let mut next = presets.clone();
        next.insert(preset.id, preset.clone());
        self.inner.presets.commit(&mut presets, next).await?;

        tracing::info!(preset_id = %preset.id, "Preset created");
        Ok(preset)
    }

    /// Applies `change` to the stored preset under the write lock, so
    /// concurrent updates never overwrite each other's fields. `id` and
    /// `created_at` are kept; an error from `change` aborts the update.
    #[tracing::instrument(name = "Update preset", skip(self, change))]
    pub async fn update_preset<F>(&self, id: Uuid, change: F) -> Result<Preset, AppError>
    where
        F: FnOnce(&mut Preset) -> Result<(), AppError>,
    {
        let mut presets = self.inner.presets.write().await;
        let existing = presets
            .get(&id)
            .ok_or_else(|| AppError::preset_not_found(id))?;

        let mut changed = existing.clone();
        change(&mut changed)?;
        if presets
            .values()
            .any(|p| p.id != id && p.name == changed.name)
        {
            return Err(AppError::Validation(format!(
                "preset name '{}' already exists",
                changed.name
            )));
        }

        let updated = Preset {
            id,
            created_at: existing.created_at,
            updated_at: Utc::now().max(existing.updated_at),
            ..changed
        };
        let mut next = presets.clone();
        next.insert(id, updated.clone());
        self.inner.presets.commit(&mut presets, next).await?;

        Ok(updated)
    }

    /// Conversations referencing the preset keep the now dangling id.
    #[tracing::instrument(name = "Delete preset", skip(self))]
    pub async fn delete_preset(&self, id: Uuid) -> Result<(), AppError> {
        let mut presets = self.inner.presets.write().await;
        if !presets.contains_key(&id) {
            return Err(AppError::preset_not_found(id));
        }

        let mut next = presets.clone();
        next.remove(&id);
        self.inner.presets.commit(&mut presets, next).await?;

        tracing::info!(preset_id = %id, "Preset deleted");
        Ok(())
    }

    pub async fn preset_usage(&self, id: Uuid) -> Result<PresetUsage, AppError> {
        let conversation_count = self
            .inner
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.preset_id == Some(id))
            .count();
        let preset = self.get_preset(id).await?;

        Ok(PresetUsage {
            preset_id: id,
            preset_name: preset.name,
            conversation_count,
            is_active: preset.is_active,
        })
    }
}
