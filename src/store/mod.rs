//! File-backed record store for conversations, messages and presets.
//!
//! Lock order for operations spanning collections is always
//! conversations -> messages -> presets.

mod collection;
mod conversation;
mod message;
pub(crate) mod preset;

use crate::errors::AppError;
use crate::models::{Conversation, Message, Preset};
use collection::{Collection, Records};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    conversations: Collection<Conversation>,
    messages: Collection<Message>,
    presets: Collection<Preset>,
}

impl RecordStore {
    /// Loads all three collections from `dir`, creating missing files.
    #[tracing::instrument(name = "Open record store", skip_all, fields(dir = %dir.as_ref().display()))]
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|err| {
            tracing::error!("Failed to create data dir {}: {:?}", dir.display(), err);
            AppError::storage(err)
        })?;

        let store = Self {
            inner: Arc::new(StoreInner {
                conversations: Collection::open(&dir, "conversations").await?,
                messages: Collection::open(&dir, "messages").await?,
                presets: Collection::open(&dir, "presets").await?,
            }),
        };
        store.reconcile().await?;

        Ok(store)
    }

    /// Repairs what an interrupted multi-file write can leave behind:
    /// messages of a removed conversation are dropped, references to missing
    /// messages are dropped, and messages written without their conversation
    /// update are linked back in creation order.
    async fn reconcile(&self) -> Result<(), AppError> {
        let mut conversations = self.inner.conversations.write().await;
        let mut messages = self.inner.messages.write().await;

        let mut next_messages = messages.clone();
        next_messages.retain(|_, msg| conversations.contains_key(&msg.conversation_id));
        let orphans = messages.len() - next_messages.len();

        let mut next_conversations = conversations.clone();
        let mut relinked = 0usize;
        for conversation in next_conversations.values_mut() {
            let mut seen = HashSet::new();
            conversation
                .message_ids
                .retain(|id| next_messages.contains_key(id) && seen.insert(*id));
            for msg in next_messages.values() {
                if msg.conversation_id == conversation.id && !seen.contains(&msg.id) {
                    conversation.message_ids.push(msg.id);
                    relinked += 1;
                }
            }
            conversation
                .message_ids
                .sort_by_key(|id| next_messages.get(id).map(|m| m.created_at));

            if let Some(last) = conversation.message_ids.last().and_then(|id| next_messages.get(id)) {
                conversation.touch(last.created_at);
            }
        }

        let messages_changed = orphans > 0;
        let conversations_changed = next_conversations != *conversations;
        if !messages_changed && !conversations_changed {
            return Ok(());
        }

        tracing::warn!(
            orphans = orphans,
            relinked = relinked,
            "Record store was inconsistent on open, repairing"
        );

        if messages_changed {
            self.inner.messages.persist(&next_messages).await?;
            *messages = next_messages;
        }
        if conversations_changed {
            self.inner.conversations.persist(&next_conversations).await?;
            *conversations = next_conversations;
        }

        Ok(())
    }

    /// Restores a collection file to `previous` after a later write in the
    /// same operation failed. Best effort: the in-memory map was never changed.
    async fn rollback<T>(collection: &Collection<T>, previous: &Records<T>)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    {
        if let Err(err) = collection.persist(previous).await {
            tracing::error!(
                collection = collection.name(),
                "Rollback failed, file will be repaired on next open: {}",
                err
            );
        }
    }
}
