use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::models::{Conversation, Session};
use crate::services::cache::TtlCache;
use crate::services::database::Database;

/// One page of the sidebar.
#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    pub page: usize,
    pub has_more: bool,
}

/// Paginated read view over a user's stored conversations.
pub struct HistoryBrowser {
    db: Database,
    page_size: usize,
    cache: TtlCache<(String, usize), ConversationPage>,
}

impl HistoryBrowser {
    pub fn new(db: Database, page_size: usize, cache_ttl: Duration) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// Conversations owned by `user_id`, most recently updated first.
    pub async fn page(&self, user_id: &str, page: usize) -> Result<ConversationPage> {
        let key = (user_id.to_string(), page);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("History cache hit for page {}", page);
            return Ok(cached);
        }

        let offset = page * self.page_size;
        let total = self.db.count_conversations_for_user(user_id).await?;
        let conversations = self
            .db
            .list_conversations_for_user(user_id, Some(self.page_size), offset)
            .await?;

        let result = ConversationPage {
            conversations,
            page,
            has_more: total > ((page + 1) * self.page_size) as u64,
        };
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// The page the session's cursor currently points at.
    pub async fn current_page(&self, session: &Session) -> Result<ConversationPage> {
        self.page(&session.user.id, session.page).await
    }

    /// Move the cursor forward when there is another page; returns whether it moved.
    pub async fn next_page(&self, session: &mut Session) -> Result<bool> {
        let current = self.current_page(session).await?;
        if current.has_more {
            session.page += 1;
        }
        Ok(current.has_more)
    }

    pub fn previous_page(&self, session: &mut Session) -> bool {
        if session.page == 0 {
            return false;
        }
        session.page -= 1;
        true
    }

    /// Jump back to the newest conversations and drop any cached pages.
    pub fn latest(&self, session: &mut Session) {
        session.page = 0;
        self.cache.clear();
    }

    /// Replace the session's working copy with a stored conversation.
    pub async fn open(&self, session: &mut Session, conversation_id: &str) -> Result<()> {
        let conversation = match self.db.get_conversation(conversation_id).await? {
            Some(c) => c,
            None => bail!("Conversation not found: {}", conversation_id),
        };
        if conversation.user_id != session.user.id {
            bail!("Conversation not found: {}", conversation_id);
        }

        let messages = self.db.list_messages(conversation_id).await?;
        tracing::info!(
            "Loaded {} messages from conversation {}",
            messages.len(),
            conversation_id
        );
        session.replace_messages(conversation.id, messages);
        Ok(())
    }

    /// Clear the working copy and reseed the welcome message. Nothing stored is touched.
    pub fn new_session(&self, session: &mut Session, now: DateTime<Utc>) {
        session.reset(now);
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationStatus, Message, Role, User, UserRole};
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;
    use uuid::Uuid;

    async fn seed_user(db: &Database, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: UserRole::Student,
            created_at: Utc::now(),
            last_login: None,
        };
        db.insert_user(&user).await.unwrap();
        user
    }

    async fn seed_conversations(db: &Database, user_id: &str, n: i64) -> Vec<String> {
        let base = Utc::now();
        let mut ids = Vec::new();
        for i in 0..n {
            let at = base + ChronoDuration::seconds(i);
            let conv = Conversation {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                title: Some(format!("Essay {}", i)),
                status: ConversationStatus::Active,
                last_message: None,
                created_at: at,
                updated_at: at,
            };
            db.insert_conversation(&conv).await.unwrap();
            ids.push(conv.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_pagination_splits_without_overlap() {
        let db = Database::new_in_memory().unwrap();
        let user = seed_user(&db, "a@example.ac.uk").await;
        let other = seed_user(&db, "b@example.ac.uk").await;
        let ids = seed_conversations(&db, &user.id, 15).await;
        seed_conversations(&db, &other.id, 3).await;

        let browser = HistoryBrowser::new(db, 10, Duration::ZERO);
        let first = browser.page(&user.id, 0).await.unwrap();
        let second = browser.page(&user.id, 1).await.unwrap();

        assert_eq!(first.conversations.len(), 10);
        assert!(first.has_more);
        assert_eq!(second.conversations.len(), 5);
        assert!(!second.has_more);

        let all: Vec<&Conversation> = first
            .conversations
            .iter()
            .chain(second.conversations.iter())
            .collect();
        let seen: HashSet<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(seen.len(), 15);
        assert!(ids.iter().all(|id| seen.contains(id.as_str())));
        assert!(all.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
        assert_eq!(all[0].title.as_deref(), Some("Essay 14"));
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_further_page() {
        let db = Database::new_in_memory().unwrap();
        let user = seed_user(&db, "a@example.ac.uk").await;
        seed_conversations(&db, &user.id, 10).await;

        let browser = HistoryBrowser::new(db, 10, Duration::ZERO);
        let first = browser.page(&user.id, 0).await.unwrap();
        assert_eq!(first.conversations.len(), 10);
        assert!(!first.has_more);
    }

    #[tokio::test]
    async fn test_cursor_navigation() {
        let db = Database::new_in_memory().unwrap();
        let user = seed_user(&db, "a@example.ac.uk").await;
        seed_conversations(&db, &user.id, 12).await;
        let browser = HistoryBrowser::new(db, 10, Duration::ZERO);
        let mut session = Session::start(user, Utc::now());

        assert!(!browser.previous_page(&mut session));
        assert!(browser.next_page(&mut session).await.unwrap());
        assert_eq!(session.page, 1);
        assert!(!browser.next_page(&mut session).await.unwrap());
        assert_eq!(session.page, 1);
        assert!(browser.previous_page(&mut session));
        session.page = 1;
        browser.latest(&mut session);
        assert_eq!(session.page, 0);
    }

    #[tokio::test]
    async fn test_cached_pages_can_be_stale_until_cleared() {
        let db = Database::new_in_memory().unwrap();
        let user = seed_user(&db, "a@example.ac.uk").await;
        seed_conversations(&db, &user.id, 2).await;
        let browser = HistoryBrowser::new(db.clone(), 10, Duration::from_secs(300));
        let mut session = Session::start(user.clone(), Utc::now());

        assert_eq!(browser.page(&user.id, 0).await.unwrap().conversations.len(), 2);
        seed_conversations(&db, &user.id, 1).await;
        assert_eq!(browser.page(&user.id, 0).await.unwrap().conversations.len(), 2);

        browser.latest(&mut session);
        assert_eq!(browser.page(&user.id, 0).await.unwrap().conversations.len(), 3);
    }

    #[tokio::test]
    async fn test_open_replaces_working_copy() {
        let db = Database::new_in_memory().unwrap();
        let user = seed_user(&db, "a@example.ac.uk").await;
        let ids = seed_conversations(&db, &user.id, 1).await;
        let at = Utc::now();
        db.append_message(&ids[0], &Message::user("1", at), "1").await.unwrap();
        db.append_message(&ids[0], &Message::assistant("Design case it is", at), "Design case it is")
            .await
            .unwrap();

        let browser = HistoryBrowser::new(db, 10, Duration::ZERO);
        let mut session = Session::start(user, at);
        session.messages.push(Message::user("unsaved", at));

        browser.open(&mut session, &ids[0]).await.unwrap();
        assert_eq!(session.conversation_id.as_deref(), Some(ids[0].as_str()));
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[1].content, "Design case it is");
    }

    #[tokio::test]
    async fn test_open_refuses_other_users_conversation() {
        let db = Database::new_in_memory().unwrap();
        let owner = seed_user(&db, "a@example.ac.uk").await;
        let intruder = seed_user(&db, "b@example.ac.uk").await;
        let ids = seed_conversations(&db, &owner.id, 1).await;

        let browser = HistoryBrowser::new(db, 10, Duration::ZERO);
        let mut session = Session::start(intruder, Utc::now());
        assert!(browser.open(&mut session, &ids[0]).await.is_err());
        assert!(session.conversation_id.is_none());
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_new_session_keeps_storage() {
        let db = Database::new_in_memory().unwrap();
        let user = seed_user(&db, "a@example.ac.uk").await;
        let ids = seed_conversations(&db, &user.id, 1).await;
        let browser = HistoryBrowser::new(db.clone(), 10, Duration::ZERO);
        let mut session = Session::start(user, Utc::now());
        browser.open(&mut session, &ids[0]).await.unwrap();

        browser.new_session(&mut session, Utc::now());
        assert!(session.conversation_id.is_none());
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::Assistant);
        assert_eq!(db.count_conversations().await.unwrap(), 1);
    }
}
