pub mod conversation;
pub mod message;
pub mod session;
pub mod stage;
pub mod user;

pub use conversation::{Conversation, ConversationStatus};
pub use message::{Message, Role};
pub use session::Session;
pub use stage::{EssayType, Stage};
pub use user::{User, UserRole};
