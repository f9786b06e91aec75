pub mod models;
pub mod store;
pub mod users;
pub mod conversations;
pub mod messages;
pub mod scheduled;
pub mod emails;
pub mod sqlite;
pub mod memory;

pub use models::{
    ChatMessage, ConversationSnapshot, DeviceClass, DeviceRegistry, EmailFlag, EmailKey, EmailRow, FriendEntry,
    Membership, MessageQuery, ScheduledEntry, ScheduledMessage, SecurityQuestion, UserRecord,
};
pub use store::StateStore;
pub use users::UserRepository;
pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use scheduled::ScheduledRepository;
pub use emails::EmailRepository;
pub use sqlite::SqliteStore;
pub use memory::MemoryStore;
