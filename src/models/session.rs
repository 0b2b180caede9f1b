use chrono::{DateTime, Duration, Utc};

use super::{EssayType, Message, Stage, User};
use crate::prompts;

/// Working state of one signed-in user. Passed explicitly through every
/// orchestration call; nothing reads it ambiently.
#[derive(Debug, Clone)]
pub struct Session {
    pub authenticated: bool,
    pub user: User,
    /// `None` until the first exchange has been persisted.
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    pub stage: Stage,
    pub essay_type: EssayType,
    /// Zero-based cursor into the history sidebar.
    pub page: usize,
    last_activity: DateTime<Utc>,
}

impl Session {
    /// A freshly authenticated session seeded with the welcome message.
    pub fn start(user: User, now: DateTime<Utc>) -> Self {
        Self {
            authenticated: true,
            user,
            conversation_id: None,
            messages: vec![welcome_message(now)],
            stage: Stage::Initial,
            essay_type: EssayType::Unset,
            page: 0,
            last_activity: now,
        }
    }

    /// "New session": forget the working copy without touching storage.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.conversation_id = None;
        self.messages = vec![welcome_message(now)];
        self.stage = Stage::Initial;
        self.essay_type = EssayType::Unset;
        self.page = 0;
        self.last_activity = now;
    }

    pub fn logout(&mut self) {
        self.authenticated = false;
        self.conversation_id = None;
        self.messages.clear();
        self.stage = Stage::Initial;
        self.essay_type = EssayType::Unset;
        self.page = 0;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Full reload of the working copy, used when opening a stored conversation.
    pub fn replace_messages(&mut self, conversation_id: String, messages: Vec<Message>) {
        self.conversation_id = Some(conversation_id);
        self.messages = messages;
    }
}

fn welcome_message(now: DateTime<Utc>) -> Message {
    Message::assistant(prompts::WELCOME_MESSAGE, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, UserRole};

    fn student() -> User {
        User {
            id: "u1".to_string(),
            email: "student@example.ac.uk".to_string(),
            role: UserRole::Student,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_start_seeds_single_welcome_message() {
        let session = Session::start(student(), Utc::now());
        assert!(session.authenticated);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::Assistant);
        assert!(session.conversation_id.is_none());
        assert_eq!(session.stage, Stage::Initial);
    }

    #[test]
    fn test_reset_clears_conversation_and_stage() {
        let now = Utc::now();
        let mut session = Session::start(student(), now);
        session.conversation_id = Some("c1".to_string());
        session.messages.push(Message::user("hello", now));
        session.stage = Stage::Drafting;
        session.essay_type = EssayType::Critique;
        session.page = 3;

        session.reset(now);

        assert!(session.conversation_id.is_none());
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.stage, Stage::Initial);
        assert_eq!(session.essay_type, EssayType::Unset);
        assert_eq!(session.page, 0);
    }

    #[test]
    fn test_expiry_is_measured_from_last_activity() {
        let start = Utc::now();
        let mut session = Session::start(student(), start);
        let hour = Duration::seconds(3600);

        assert!(!session.is_expired(start + Duration::seconds(3599), hour));
        assert!(session.is_expired(start + Duration::seconds(3601), hour));

        session.touch(start + Duration::seconds(3000));
        assert!(!session.is_expired(start + Duration::seconds(3601), hour));
    }

    #[test]
    fn test_logout_drops_working_copy() {
        let mut session = Session::start(student(), Utc::now());
        session.logout();
        assert!(!session.authenticated);
        assert!(session.messages.is_empty());
    }
}
