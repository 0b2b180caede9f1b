use crate::models::{Message, Role};
use crate::services::admin::{ConversationRow, DashboardStats, UserRow};
use crate::services::clock::TimeFormatter;
use crate::services::history::ConversationPage;

pub fn message(formatter: &TimeFormatter, message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    };
    format!(
        "{} {}:\n{}\n",
        formatter.message_stamp(message.created_at),
        speaker,
        message.content
    )
}

pub fn transcript(formatter: &TimeFormatter, messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| message(formatter, m))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sidebar listing, numbered from 1 for `/open`.
pub fn history_page(formatter: &TimeFormatter, page: &ConversationPage) -> String {
    if page.conversations.is_empty() {
        return "No saved essay sessions.".to_string();
    }

    let mut out = format!("Essay sessions (page {}):\n", page.page + 1);
    for (i, c) in page.conversations.iter().enumerate() {
        out.push_str(&format!(
            "  {:>2}. {}  ({})\n",
            i + 1,
            c.display_title(),
            formatter.table_stamp(c.updated_at)
        ));
    }
    if page.has_more {
        out.push_str("  /history next for older sessions\n");
    }
    out
}

pub fn stats(stats: &DashboardStats) -> String {
    format!(
        "Total users: {}\nTotal essay sessions: {}\nActive sessions: {}",
        stats.users, stats.conversations, stats.active_conversations
    )
}

pub fn users(rows: &[UserRow]) -> String {
    let mut out = format!("{:<32} {:<8} {}\n", "Email", "Role", "Last login");
    for r in rows {
        out.push_str(&format!("{:<32} {:<8} {}\n", r.email, r.role, r.last_login));
    }
    out
}

pub fn conversations(rows: &[ConversationRow]) -> String {
    if rows.is_empty() {
        return "No essay sessions found for this student.".to_string();
    }
    let mut out = String::new();
    for r in rows {
        out.push_str(&format!(
            "{}  {}  [{}]  {}\n    {}\n",
            r.created, r.title, r.status, r.id, r.last_message
        ));
    }
    out
}
