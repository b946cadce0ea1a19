use super::RecordStore;
use crate::errors::AppError;
use crate::models::{Message, NewMessage};
use chrono::Utc;
use uuid::Uuid;

impl RecordStore {
    /// Appends a message and advances the conversation's `updated_at` as one
    /// operation. Fails with `NotFound` when the conversation is gone.
    #[tracing::instrument(name = "Append message", skip(self, new_message), fields(role = %new_message.role))]
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        new_message: NewMessage,
    ) -> Result<Message, AppError> {
        let mut conversations = self.inner.conversations.write().await;
        let mut next_conversations = conversations.clone();
        let conversation = next_conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| AppError::conversation_not_found(conversation_id))?;
        let mut messages = self.inner.messages.write().await;

        // creation times never go backwards within a conversation
        let last = conversation
            .message_ids
            .last()
            .and_then(|id| messages.get(id))
            .map(|m| m.created_at);
        let created_at = match last {
            Some(last) if last > Utc::now() => last,
            _ => Utc::now(),
        };

        let message = new_message.into_message(conversation_id, created_at);
        conversation.message_ids.push(message.id);
        conversation.touch(created_at);

        let mut next_messages = messages.clone();
        next_messages.insert(message.id, message.clone());

        self.inner.messages.persist(&next_messages).await?;
        if let Err(err) = self.inner.conversations.persist(&next_conversations).await {
            Self::rollback(&self.inner.messages, &*messages).await;
            return Err(err);
        }
        *messages = next_messages;
        *conversations = next_conversations;

        tracing::debug!(message_id = %message.id, "Message appended");
        Ok(message)
    }

    /// Messages in creation order; with `limit`, only the most recent ones.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, AppError> {
        let conversations = self.inner.conversations.read().await;
        let conversation = conversations
            .get(&conversation_id)
            .ok_or_else(|| AppError::conversation_not_found(conversation_id))?;
        let messages = self.inner.messages.read().await;

        let skip = match limit {
            Some(limit) => conversation.message_ids.len().saturating_sub(limit),
            None => 0,
        };

        Ok(conversation
            .message_ids
            .iter()
            .skip(skip)
            .filter_map(|id| messages.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, TokenUsage};

    #[tokio::test]
    async fn test_append_n_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let conversation = store.create_conversation("ordered", None).await.unwrap();

        for i in 0..10 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .append_message(conversation.id, NewMessage::new(role, format!("m{}", i)))
                .await
                .unwrap();
        }

        let messages = store.list_messages(conversation.id, None).await.unwrap();
        assert_eq!(messages.len(), 10);
        let contents: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
        assert_eq!(contents, expected);
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_append_advances_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let conversation = store.create_conversation("touch", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let message = store
            .append_message(conversation.id, NewMessage::user("hello"))
            .await
            .unwrap();
        let updated = store.get_conversation(conversation.id).await.unwrap();

        assert_eq!(updated.updated_at, message.created_at);
        assert!(updated.updated_at > conversation.updated_at);
        assert_eq!(updated.message_ids, vec![message.id]);
    }

    #[tokio::test]
    async fn test_list_with_limit_returns_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let conversation = store.create_conversation("limit", None).await.unwrap();
        for i in 0..5 {
            store
                .append_message(conversation.id, NewMessage::user(format!("m{}", i)))
                .await
                .unwrap();
        }

        let tail = store.list_messages(conversation.id, Some(2)).await.unwrap();
        let contents: Vec<&str> = tail.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_usage_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let conversation = store.create_conversation("usage", None).await.unwrap();
        let usage = TokenUsage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        };

        store
            .append_message(
                conversation.id,
                NewMessage::assistant("ok").with_usage(Some(usage)),
            )
            .await
            .unwrap();

        let reopened = RecordStore::open(dir.path()).await.unwrap();
        let messages = reopened.list_messages(conversation.id, None).await.unwrap();
        assert_eq!(messages[0].usage, Some(usage));
    }

    #[tokio::test]
    async fn test_list_messages_of_missing_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let result = store.list_messages(Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
