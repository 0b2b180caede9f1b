pub mod admin;
pub mod auth;
pub mod cache;
pub mod chat;
pub mod clock;
pub mod conversation;
pub mod database;
pub mod export;
pub mod history;
pub mod keyring;
pub mod password;
pub mod stage;
pub mod title;

pub use admin::AdminService;
pub use auth::{Authenticator, DirectoryAuthenticator};
pub use chat::{ChatError, ChatService};
pub use clock::{Clock, SystemClock, TimeFormatter};
pub use conversation::ConversationStore;
pub use database::Database;
pub use history::HistoryBrowser;
pub use keyring::KeyringService;
