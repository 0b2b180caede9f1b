use crate::models::{Conversation, Message, Role};
use crate::services::clock::TimeFormatter;

const LOG_HEADER: [&str; 5] = ["conversation_id", "title", "timestamp", "role", "content"];

pub fn export_to_markdown(
    conversation: &Conversation,
    messages: &[Message],
    formatter: &TimeFormatter,
) -> String {
    let mut output = format!("# {}\n\n", conversation.display_title());
    output.push_str(&format!(
        "> Status: {} | Started: {}\n\n",
        conversation.status.as_str(),
        formatter.table_stamp(conversation.created_at)
    ));

    output.push_str("---\n\n");

    for msg in messages {
        let role_label = match msg.role {
            Role::User => "Student",
            Role::Assistant => "Assistant",
            Role::System => continue,
        };
        output.push_str(&format!(
            "### {} {}\n\n{}\n\n",
            role_label,
            formatter.message_stamp(msg.created_at),
            msg.content
        ));
    }

    output
}

/// Tab-delimited message log for one user, one row per message.
pub fn export_user_log(
    conversations: &[(Conversation, Vec<Message>)],
    formatter: &TimeFormatter,
) -> String {
    let mut output = LOG_HEADER.join("\t");
    output.push('\n');

    for (conversation, messages) in conversations {
        for msg in messages {
            let row = [
                field(&conversation.id),
                field(conversation.display_title()),
                field(&formatter.table_stamp(msg.created_at)),
                field(msg.role.as_str()),
                field(&msg.content),
            ];
            output.push_str(&row.join("\t"));
            output.push('\n');
        }
    }

    output
}

/// Quote fields that would otherwise break the row structure.
fn field(value: &str) -> String {
    if value.contains(['\t', '\n', '\r', '"']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationStatus;
    use chrono::{TimeZone, Utc};

    fn conversation() -> Conversation {
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 9, 30, 0).unwrap();
        Conversation {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            title: None,
            status: ConversationStatus::Active,
            last_message: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_markdown_export_lists_messages_in_order() {
        let conv = conversation();
        let messages = vec![
            Message::user("1", conv.created_at),
            Message::assistant("Design case it is", conv.created_at),
        ];
        let md = export_to_markdown(&conv, &messages, &TimeFormatter::default());
        assert!(md.starts_with("# Untitled\n"));
        let student = md.find("### Student [2025-01-10 09:30:00]").unwrap();
        let assistant = md.find("### Assistant").unwrap();
        assert!(student < assistant);
    }

    #[test]
    fn test_log_quotes_awkward_fields() {
        let conv = conversation();
        let messages = vec![Message::user("line one\nsaid \"hi\"", conv.created_at)];
        let log = export_user_log(&[(conv, messages)], &TimeFormatter::default());
        let lines: Vec<&str> = log.splitn(2, '\n').collect();
        assert_eq!(lines[0], "conversation_id\ttitle\ttimestamp\trole\tcontent");
        assert_eq!(
            lines[1],
            "c1\tUntitled\t2025-01-10 09:30:00\tuser\t\"line one\nsaid \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_empty_log_has_header_only() {
        let log = export_user_log(&[], &TimeFormatter::default());
        assert_eq!(log, "conversation_id\ttitle\ttimestamp\trole\tcontent\n");
    }
}
