use std::path::PathBuf;

use crate::models::Stage;

/// Sidebar navigation requested with `/history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryNav {
    Show,
    Next,
    Previous,
    Latest,
}

/// Operator actions, only honoured for admins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Stats,
    Users,
    Essays(String),
    View(String),
    Export { email: String, path: PathBuf },
    Markdown { conversation_id: String, path: PathBuf },
    Delete(String),
    Purge(String),
}

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    New,
    History(HistoryNav),
    /// 1-based position on the current history page.
    Open(usize),
    Stage(Stage),
    Logout,
    Help,
    Quit,
    Admin(AdminCommand),
}

pub const HELP: &str = "\
Commands:
  /new                      start a new essay session
  /history [next|prev|latest]
                            list saved sessions
  /open <n>                 load session <n> from the current page
  /stage <name>             set the stage (initial, topic, outline, drafting, review)
  /logout                   sign out
  /help                     show this help
  /quit                     exit
Admin:
  /admin stats | users | essays <email> | view <id>
  /admin export <email> <path> | markdown <id> <path>
  /admin delete <id> | purge <email>   (repeat to confirm)
Anything else is sent to the assistant.";

/// Parse one input line. Lines not starting with `/` are chat input.
pub fn parse(line: &str) -> Result<Command, String> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Command::Chat(trimmed.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = parts.collect();

    match (name.as_str(), args.as_slice()) {
        ("new", []) => Ok(Command::New),
        ("history", []) => Ok(Command::History(HistoryNav::Show)),
        ("history", ["next"]) => Ok(Command::History(HistoryNav::Next)),
        ("history", ["prev"] | ["previous"]) => Ok(Command::History(HistoryNav::Previous)),
        ("history", ["latest"]) => Ok(Command::History(HistoryNav::Latest)),
        ("open", [n]) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Command::Open(n)),
            _ => Err(format!("Not a list position: {}", n)),
        },
        ("stage", [s]) => Stage::from_str(s)
            .map(Command::Stage)
            .ok_or_else(|| {
                let known: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
                format!("Unknown stage: {} (one of {})", s, known.join(", "))
            }),
        ("logout", []) => Ok(Command::Logout),
        ("help", []) => Ok(Command::Help),
        ("quit" | "exit", []) => Ok(Command::Quit),
        ("admin", args) => parse_admin(args).map(Command::Admin),
        _ => Err(format!("Unknown command: /{}. Type /help for a list.", rest)),
    }
}

fn parse_admin(args: &[&str]) -> Result<AdminCommand, String> {
    match args {
        ["stats"] => Ok(AdminCommand::Stats),
        ["users"] => Ok(AdminCommand::Users),
        ["essays", email] => Ok(AdminCommand::Essays(email.to_string())),
        ["view", id] => Ok(AdminCommand::View(id.to_string())),
        ["export", email, path] => Ok(AdminCommand::Export {
            email: email.to_string(),
            path: PathBuf::from(path),
        }),
        ["markdown", id, path] => Ok(AdminCommand::Markdown {
            conversation_id: id.to_string(),
            path: PathBuf::from(path),
        }),
        ["delete", id] => Ok(AdminCommand::Delete(id.to_string())),
        ["purge", email] => Ok(AdminCommand::Purge(email.to_string())),
        _ => Err("Usage: /admin stats|users|essays|view|export|markdown|delete|purge".to_string()),
    }
}
