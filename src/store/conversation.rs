use super::RecordStore;
use crate::errors::AppError;
use crate::models::{Conversation, ConversationFilter, Page, Statistics};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: usize = 50;

impl RecordStore {
    #[tracing::instrument(name = "Create conversation", skip(self))]
    pub async fn create_conversation(
        &self,
        title: &str,
        preset_id: Option<Uuid>,
    ) -> Result<Conversation, AppError> {
        let mut conversations = self.inner.conversations.write().await;

        if let Some(preset_id) = preset_id {
            if !self.inner.presets.read().await.contains_key(&preset_id) {
                return Err(AppError::preset_not_found(preset_id));
            }
        }

        let conversation = Conversation::new(title.to_string(), preset_id);
        let mut next = conversations.clone();
        next.insert(conversation.id, conversation.clone());
        self.inner.conversations.commit(&mut conversations, next).await?;

        tracing::info!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation, AppError> {
        self.inner
            .conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::conversation_not_found(id))
    }

    /// Most recently updated first.
    pub async fn list_conversations(&self, filter: &ConversationFilter) -> Page<Conversation> {
        let mut matching: Vec<Conversation> = self
            .inner
            .conversations
            .read()
            .await
            .values()
            .filter(|c| filter.preset_id.map_or(true, |p| c.preset_id == Some(p)))
            .filter(|c| filter.updated_before.map_or(true, |t| c.updated_at < t))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

        let total = matching.len();
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = filter.offset.unwrap_or(0);
        let items = matching.into_iter().skip(offset).take(limit).collect();

        Page {
            items,
            total,
            limit,
            offset,
        }
    }

    /// Ids of every conversation last updated before `cutoff`.
    pub async fn conversations_updated_before(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        self.inner
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.updated_at < cutoff)
            .map(|c| c.id)
            .collect()
    }

    /// Renames the conversation and/or switches its preset in one write.
    /// Nothing is stored when the title is blank or the preset is unknown.
    #[tracing::instrument(name = "Update conversation", skip(self))]
    pub async fn update_conversation(
        &self,
        id: Uuid,
        title: Option<&str>,
        preset_id: Option<Uuid>,
    ) -> Result<Conversation, AppError> {
        if title.map_or(false, |t| t.trim().is_empty()) {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }

        let mut conversations = self.inner.conversations.write().await;
        let mut next = conversations.clone();
        let conversation = next
            .get_mut(&id)
            .ok_or_else(|| AppError::conversation_not_found(id))?;

        if let Some(preset_id) = preset_id {
            if !self.inner.presets.read().await.contains_key(&preset_id) {
                return Err(AppError::preset_not_found(preset_id));
            }
        }

        let title_changed = title.map_or(false, |t| t != conversation.title);
        let preset_changed = preset_id.is_some() && preset_id != conversation.preset_id;
        if !title_changed && !preset_changed {
            return Ok(conversation.clone());
        }
        if let Some(title) = title {
            conversation.title = title.to_string();
        }
        if preset_changed {
            conversation.preset_id = preset_id;
        }
        conversation.touch(Utc::now());
        let updated = conversation.clone();

        self.inner.conversations.commit(&mut conversations, next).await?;
        Ok(updated)
    }

    /// Removes the conversation and all of its messages. Returns `false` when
    /// there was nothing to delete.
    #[tracing::instrument(name = "Delete conversation", skip(self))]
    pub async fn delete_conversation(&self, id: Uuid) -> Result<bool, AppError> {
        self.remove_conversation(id, None).await
    }

    /// Like `delete_conversation`, but only while the conversation is still
    /// idle since before `cutoff`. Activity after the caller listed it keeps
    /// it alive.
    #[tracing::instrument(name = "Delete expired conversation", skip(self))]
    pub async fn delete_conversation_if_updated_before(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.remove_conversation(id, Some(cutoff)).await
    }

    async fn remove_conversation(
        &self,
        id: Uuid,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let mut conversations = self.inner.conversations.write().await;
        let Some(conversation) = conversations.get(&id) else {
            return Ok(false);
        };
        if cutoff.map_or(false, |cutoff| conversation.updated_at >= cutoff) {
            tracing::debug!(conversation_id = %id, "Conversation active again, kept");
            return Ok(false);
        }
        let mut messages = self.inner.messages.write().await;

        let mut next_messages = messages.clone();
        next_messages.retain(|_, msg| msg.conversation_id != id);
        let removed_messages = messages.len() - next_messages.len();
        let mut next_conversations = conversations.clone();
        next_conversations.remove(&id);

        // messages go first so no message outlives its conversation on disk
        self.inner.messages.persist(&next_messages).await?;
        if let Err(err) = self.inner.conversations.persist(&next_conversations).await {
            Self::rollback(&self.inner.messages, &*messages).await;
            return Err(err);
        }
        *messages = next_messages;
        *conversations = next_conversations;

        tracing::info!(
            conversation_id = %id,
            messages = removed_messages,
            "Conversation deleted"
        );
        Ok(true)
    }

    /// Copies a conversation with all of its messages under fresh ids.
    #[tracing::instrument(name = "Duplicate conversation", skip(self))]
    pub async fn duplicate_conversation(
        &self,
        id: Uuid,
        title: Option<String>,
    ) -> Result<Conversation, AppError> {
        let mut conversations = self.inner.conversations.write().await;
        let original = conversations
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::conversation_not_found(id))?;
        let mut messages = self.inner.messages.write().await;

        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} (copy)", original.title));
        let mut copy = Conversation::new(title, original.preset_id);

        let mut next_messages = messages.clone();
        for message_id in &original.message_ids {
            if let Some(source) = messages.get(message_id) {
                let mut cloned = source.clone();
                cloned.id = Uuid::new_v4();
                cloned.conversation_id = copy.id;
                copy.message_ids.push(cloned.id);
                next_messages.insert(cloned.id, cloned);
            }
        }
        let mut next_conversations = conversations.clone();
        next_conversations.insert(copy.id, copy.clone());

        self.inner.messages.persist(&next_messages).await?;
        if let Err(err) = self.inner.conversations.persist(&next_conversations).await {
            Self::rollback(&self.inner.messages, &*messages).await;
            return Err(err);
        }
        *messages = next_messages;
        *conversations = next_conversations;

        Ok(copy)
    }

    pub async fn statistics(&self) -> Statistics {
        let conversations = self.inner.conversations.read().await;
        let messages = self.inner.messages.read().await;
        let week_ago = Utc::now() - Duration::days(7);

        Statistics {
            total_conversations: conversations.len(),
            total_messages: messages.len(),
            recent_conversations_7_days: conversations
                .values()
                .filter(|c| c.created_at >= week_ago)
                .count(),
            oldest_conversation_date: conversations.values().map(|c| c.created_at).min(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMessage, DEFAULT_CONVERSATION_TITLE};
    use crate::store::preset::tests::new_preset;

    async fn store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_with_existing_preset() {
        let (_dir, store) = store().await;
        let preset = store.create_preset(new_preset("Helper")).await.unwrap();

        let created = store.create_conversation("chat", Some(preset.id)).await.unwrap();
        let fetched = store.get_conversation(created.id).await.unwrap();

        assert_eq!(fetched.preset_id, Some(preset.id));
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn test_create_with_unknown_preset_fails() {
        let (_dir, store) = store().await;
        let result = store.create_conversation("chat", Some(Uuid::new_v4())).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.list_conversations(&Default::default()).await.total, 0);
    }

    #[tokio::test]
    async fn test_blank_title_gets_default() {
        let (_dir, store) = store().await;
        let created = store.create_conversation("  ", None).await.unwrap();
        assert_eq!(created.title, DEFAULT_CONVERSATION_TITLE);
    }

    #[tokio::test]
    async fn test_get_missing_conversation() {
        let (_dir, store) = store().await;
        let result = store.get_conversation(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_orders_by_updated_at_desc() {
        let (_dir, store) = store().await;
        let first = store.create_conversation("first", None).await.unwrap();
        let second = store.create_conversation("second", None).await.unwrap();
        // activity on the older one moves it to the top
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .append_message(first.id, NewMessage::user("bump"))
            .await
            .unwrap();

        let page = store.list_conversations(&Default::default()).await;
        let ids: Vec<Uuid> = page.items.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_list_paginates_and_filters() {
        let (_dir, store) = store().await;
        let preset = store.create_preset(new_preset("Helper")).await.unwrap();
        for i in 0..5 {
            let preset_id = if i % 2 == 0 { Some(preset.id) } else { None };
            store
                .create_conversation(&format!("c{}", i), preset_id)
                .await
                .unwrap();
        }

        let page = store
            .list_conversations(&ConversationFilter {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            })
            .await;
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);

        let with_preset = store
            .list_conversations(&ConversationFilter {
                preset_id: Some(preset.id),
                ..Default::default()
            })
            .await;
        assert_eq!(with_preset.total, 3);
    }

    #[tokio::test]
    async fn test_delete_cascades_and_is_idempotent() {
        let (_dir, store) = store().await;
        let conversation = store.create_conversation("gone", None).await.unwrap();
        let keep = store.create_conversation("kept", None).await.unwrap();
        for text in ["a", "b", "c"] {
            store
                .append_message(conversation.id, NewMessage::user(text))
                .await
                .unwrap();
        }
        store
            .append_message(keep.id, NewMessage::user("stays"))
            .await
            .unwrap();

        assert!(store.delete_conversation(conversation.id).await.unwrap());
        assert!(!store.delete_conversation(conversation.id).await.unwrap());

        let result = store
            .append_message(conversation.id, NewMessage::user("late"))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.statistics().await.total_messages, 1);
        assert_eq!(store.list_messages(keep.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_bumps_updated_at() {
        let (_dir, store) = store().await;
        let conversation = store.create_conversation("old", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let renamed = store
            .update_conversation(conversation.id, Some("new"), None)
            .await
            .unwrap();
        assert_eq!(renamed.title, "new");
        assert!(renamed.updated_at > conversation.updated_at);

        let blank = store.update_conversation(conversation.id, Some(" "), None).await;
        assert!(matches!(blank, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_with_unknown_preset_changes_nothing() {
        let (_dir, store) = store().await;
        let conversation = store.create_conversation("kept", None).await.unwrap();

        let result = store
            .update_conversation(conversation.id, Some("renamed"), Some(Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let stored = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(stored, conversation);
    }

    #[tokio::test]
    async fn test_update_renames_and_switches_preset_together() {
        let (_dir, store) = store().await;
        let preset = store.create_preset(new_preset("Helper")).await.unwrap();
        let conversation = store.create_conversation("old", None).await.unwrap();

        let updated = store
            .update_conversation(conversation.id, Some("new"), Some(preset.id))
            .await
            .unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(updated.preset_id, Some(preset.id));
        assert_eq!(store.get_conversation(conversation.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_conditional_delete_keeps_touched_conversation() {
        let (_dir, store) = store().await;
        let conversation = store.create_conversation("busy", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let cutoff = Utc::now();
        assert_eq!(store.conversations_updated_before(cutoff).await, vec![conversation.id]);

        // activity between listing and deleting
        store
            .append_message(conversation.id, NewMessage::user("back again"))
            .await
            .unwrap();

        let deleted = store
            .delete_conversation_if_updated_before(conversation.id, cutoff)
            .await
            .unwrap();
        assert!(!deleted);
        assert_eq!(store.list_messages(conversation.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_copies_messages() {
        let (_dir, store) = store().await;
        let conversation = store.create_conversation("origin", None).await.unwrap();
        store
            .append_message(conversation.id, NewMessage::user("hi"))
            .await
            .unwrap();
        store
            .append_message(conversation.id, NewMessage::assistant("hello"))
            .await
            .unwrap();

        let copy = store.duplicate_conversation(conversation.id, None).await.unwrap();
        assert_eq!(copy.title, "origin (copy)");
        assert_ne!(copy.id, conversation.id);

        let copied = store.list_messages(copy.id, None).await.unwrap();
        let contents: Vec<&str> = copied.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello"]);
        assert!(copied.iter().all(|m| m.conversation_id == copy.id));
        assert_eq!(store.statistics().await.total_messages, 4);
    }

    #[tokio::test]
    async fn test_statistics() {
        let (_dir, store) = store().await;
        assert_eq!(store.statistics().await.oldest_conversation_date, None);

        let first = store.create_conversation("a", None).await.unwrap();
        store.create_conversation("b", None).await.unwrap();
        store
            .append_message(first.id, NewMessage::user("x"))
            .await
            .unwrap();

        let stats = store.statistics().await;
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.recent_conversations_7_days, 2);
        assert_eq!(stats.oldest_conversation_date, Some(first.created_at));
    }
}
