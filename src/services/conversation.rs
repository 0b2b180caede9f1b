use std::sync::Arc;

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::models::{Conversation, ConversationStatus, Message, Role};
use crate::services::database::Database;
use crate::services::title::{TitleContext, TitleStrategy};

/// Characters of the latest message kept on the conversation for list views.
pub const PREVIEW_CHARS: usize = 100;

/// Durable side of a chat: turns (conversation id or none, message) pairs
/// into writes.
#[derive(Clone)]
pub struct ConversationStore {
    db: Database,
    titles: Arc<dyn TitleStrategy>,
}

impl ConversationStore {
    pub fn new(db: Database, titles: Arc<dyn TitleStrategy>) -> Self {
        Self { db, titles }
    }

    pub async fn exists(&self, conversation_id: &str) -> Result<bool> {
        Ok(self.db.get_conversation(conversation_id).await?.is_some())
    }

    #[cfg(test)]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist `message`, creating the conversation first when
    /// `conversation_id` is `None`. Returns the id the message was stored
    /// under so the paired message can follow it.
    pub async fn append(
        &self,
        conversation_id: Option<&str>,
        user_id: &str,
        message: &Message,
    ) -> Result<String> {
        if message.role == Role::System {
            bail!("System messages are never persisted");
        }

        let id = match conversation_id {
            Some(id) => {
                if self.db.get_conversation(id).await?.is_none() {
                    bail!("Conversation not found: {}", id);
                }
                id.to_string()
            }
            None => self.create(user_id, message).await?,
        };

        let preview = preview(&message.content);
        self.db.append_message(&id, message, &preview).await?;
        self.retitle(&id).await?;

        Ok(id)
    }

    async fn create(&self, user_id: &str, first: &Message) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let title = self
            .titles
            .title(&TitleContext {
                conversation_id: &id,
                messages: std::slice::from_ref(first),
            })
            .await;

        let conversation = Conversation {
            id,
            user_id: user_id.to_string(),
            title: Some(title),
            status: ConversationStatus::Active,
            last_message: None,
            created_at: first.created_at,
            updated_at: first.created_at,
        };
        self.db.insert_conversation(&conversation).await?;
        tracing::info!("Created conversation {} for user {}", conversation.id, user_id);

        Ok(conversation.id)
    }

    async fn retitle(&self, id: &str) -> Result<()> {
        let messages = self.db.list_messages(id).await?;
        let title = self
            .titles
            .title(&TitleContext {
                conversation_id: id,
                messages: &messages,
            })
            .await;
        self.db.update_conversation_title(id, &title).await
    }
}

/// First [`PREVIEW_CHARS`] characters of `content`.
pub fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect()
}
