use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::models::{Conversation, ConversationStatus, Message};
use crate::services::clock::TimeFormatter;
use crate::services::database::Database;
use crate::services::export;

const NOT_AVAILABLE: &str = "N/A";
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardStats {
    pub users: u64,
    pub conversations: u64,
    pub active_conversations: u64,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub email: String,
    pub role: String,
    pub last_login: String,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub created: String,
    pub title: String,
    pub status: String,
    pub last_message: String,
}

/// What a destructive admin action will remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Conversation(String),
    AllForUser(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// First request: nothing removed yet, repeat to confirm.
    AwaitingConfirmation,
    Deleted(usize),
}

/// "Click again to confirm": a request arms the guard and only an identical
/// follow-up request goes through. Any other request re-arms it.
#[derive(Debug, Default)]
pub struct DeleteGuard {
    armed: Mutex<Option<DeleteTarget>>,
}

impl DeleteGuard {
    /// Returns true when `target` was already armed (and disarms it).
    pub fn confirm(&self, target: &DeleteTarget) -> bool {
        let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
        if armed.as_ref() == Some(target) {
            *armed = None;
            true
        } else {
            *armed = Some(target.clone());
            false
        }
    }

    pub fn disarm(&self) {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Read-mostly operator dashboard over the same store the chat writes to.
pub struct AdminService {
    db: Database,
    formatter: TimeFormatter,
    guard: DeleteGuard,
}

impl AdminService {
    pub fn new(db: Database, formatter: TimeFormatter) -> Self {
        Self {
            db,
            formatter,
            guard: DeleteGuard::default(),
        }
    }

    pub async fn is_admin(&self, email: &str) -> bool {
        match self.db.get_user_by_email(email).await {
            Ok(Some(user)) => user.role == crate::models::UserRole::Admin,
            Ok(None) => false,
            Err(e) => {
                tracing::error!("Error checking admin access: {}", e);
                false
            }
        }
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        Ok(DashboardStats {
            users: self.db.count_users().await?,
            conversations: self.db.count_conversations().await?,
            active_conversations: self
                .db
                .count_conversations_with_status(ConversationStatus::Active)
                .await?,
        })
    }

    pub async fn users(&self) -> Result<Vec<UserRow>> {
        let users = self.db.list_users().await?;
        Ok(users
            .into_iter()
            .map(|u| UserRow {
                email: u.email,
                role: u.role.as_str().to_string(),
                last_login: u
                    .last_login
                    .map(|t| self.formatter.table_stamp(t))
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            })
            .collect())
    }

    pub async fn user_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        let conversations = self.db.list_conversations_for_user(user_id, None, 0).await?;
        Ok(conversations.iter().map(|c| self.conversation_row(c)).collect())
    }

    /// Plain `role: content` lines for viewing one essay session.
    pub async fn conversation_transcript(&self, conversation_id: &str) -> Result<String> {
        let messages = self.db.list_messages(conversation_id).await?;
        Ok(messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub async fn export_conversation_markdown(&self, conversation_id: &str) -> Result<String> {
        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .with_context(|| format!("Conversation not found: {}", conversation_id))?;
        let messages = self.db.list_messages(conversation_id).await?;
        Ok(export::export_to_markdown(&conversation, &messages, &self.formatter))
    }

    pub async fn export_user_log(&self, user_id: &str) -> Result<String> {
        let conversations = self.db.list_conversations_for_user(user_id, None, 0).await?;
        let mut rows: Vec<(Conversation, Vec<Message>)> = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let messages = self.db.list_messages(&conversation.id).await?;
            rows.push((conversation, messages));
        }
        Ok(export::export_user_log(&rows, &self.formatter))
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<DeleteOutcome> {
        self.delete(DeleteTarget::Conversation(conversation_id.to_string()))
            .await
    }

    pub async fn delete_user_conversations(&self, user_id: &str) -> Result<DeleteOutcome> {
        self.delete(DeleteTarget::AllForUser(user_id.to_string())).await
    }

    /// Destructive: needs to be requested twice in a row.
    pub async fn delete(&self, target: DeleteTarget) -> Result<DeleteOutcome> {
        if !self.guard.confirm(&target) {
            return Ok(DeleteOutcome::AwaitingConfirmation);
        }

        let removed = match &target {
            DeleteTarget::Conversation(id) => usize::from(self.db.delete_conversation(id).await?),
            DeleteTarget::AllForUser(user_id) => {
                self.db.delete_conversations_for_user(user_id).await?
            }
        };
        tracing::warn!("Admin delete {:?} removed {} conversation(s)", target, removed);
        Ok(DeleteOutcome::Deleted(removed))
    }

    pub fn cancel_delete(&self) {
        self.guard.disarm();
    }

    fn conversation_row(&self, c: &Conversation) -> ConversationRow {
        let last_message = match c.last_message.as_deref() {
            Some(m) if !m.is_empty() => {
                format!("{}...", m.chars().take(PREVIEW_CHARS).collect::<String>())
            }
            _ => NOT_AVAILABLE.to_string(),
        };
        ConversationRow {
            id: c.id.clone(),
            created: self.formatter.table_stamp(c.created_at),
            title: c.display_title().to_string(),
            status: c.status.as_str().to_string(),
            last_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::services::auth::register_user;
    use chrono::Utc;
    use uuid::Uuid;

    async fn seeded() -> (AdminService, Database, String, String) {
        let db = Database::new_in_memory().unwrap();
        register_user(&db, "admin@example.ac.uk", UserRole::Admin, "admin-pass-1")
            .await
            .unwrap();
        let student = register_user(&db, "student@example.ac.uk", UserRole::Student, "student-pass-1")
            .await
            .unwrap();

        let now = Utc::now();
        let conv = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: student.id.clone(),
            title: None,
            status: ConversationStatus::Active,
            last_message: None,
            created_at: now,
            updated_at: now,
        };
        db.insert_conversation(&conv).await.unwrap();
        db.append_message(&conv.id, &Message::user("1", now), "1").await.unwrap();
        db.append_message(&conv.id, &Message::assistant("Design case", now), "Design case")
            .await
            .unwrap();

        (
            AdminService::new(db.clone(), TimeFormatter::default()),
            db,
            student.id,
            conv.id,
        )
    }

    #[tokio::test]
    async fn test_admin_role_check() {
        let (admin, _, _, _) = seeded().await;
        assert!(admin.is_admin("admin@example.ac.uk").await);
        assert!(!admin.is_admin("student@example.ac.uk").await);
        assert!(!admin.is_admin("stranger@example.ac.uk").await);
    }

    #[tokio::test]
    async fn test_stats_and_rows_default_missing_fields() {
        let (admin, _, student_id, _) = seeded().await;
        assert_eq!(
            admin.stats().await.unwrap(),
            DashboardStats {
                users: 2,
                conversations: 1,
                active_conversations: 1,
            }
        );

        let users = admin.users().await.unwrap();
        assert!(users.iter().all(|u| u.last_login == "N/A"));

        let rows = admin.user_conversations(&student_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Untitled");
        assert_eq!(rows[0].last_message, "Design case...");
    }

    #[tokio::test]
    async fn test_transcript_and_log_export() {
        let (admin, _, student_id, conv_id) = seeded().await;
        assert_eq!(
            admin.conversation_transcript(&conv_id).await.unwrap(),
            "user: 1\nassistant: Design case"
        );

        let log = admin.export_user_log(&student_id).await.unwrap();
        assert_eq!(log.lines().count(), 3);

        let md = admin.export_conversation_markdown(&conv_id).await.unwrap();
        assert!(md.contains("Design case"));
    }

    #[tokio::test]
    async fn test_delete_requires_second_request() {
        let (admin, db, _, conv_id) = seeded().await;
        let target = DeleteTarget::Conversation(conv_id.clone());

        assert_eq!(
            admin.delete(target.clone()).await.unwrap(),
            DeleteOutcome::AwaitingConfirmation
        );
        assert_eq!(db.count_conversations().await.unwrap(), 1);

        assert_eq!(admin.delete(target).await.unwrap(), DeleteOutcome::Deleted(1));
        assert_eq!(db.count_conversations().await.unwrap(), 0);
        assert!(db.list_messages(&conv_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_different_request_rearms_guard() {
        let (admin, db, student_id, conv_id) = seeded().await;

        admin.delete_conversation(&conv_id).await.unwrap();
        assert_eq!(
            admin.delete_user_conversations(&student_id).await.unwrap(),
            DeleteOutcome::AwaitingConfirmation
        );
        admin.cancel_delete();
        assert_eq!(
            admin.delete_user_conversations(&student_id).await.unwrap(),
            DeleteOutcome::AwaitingConfirmation
        );
        assert_eq!(db.count_conversations().await.unwrap(), 1);
    }
}
