use crate::convo::{FileList, MemberList};
use crate::db::models::{
    ChatMessage, ConversationSnapshot, EmailFlag, EmailKey, EmailRow, MessageQuery, ScheduledMessage, UserRecord,
};
use crate::error::AppError;

/// Typed access to user records, conversation fields, history, mailboxes
/// and the scheduled-message table.
///
/// Each call is a single round-trip. Nothing here spans calls, so a
/// read-modify-write in a handler can lose to a concurrent writer.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Lookup by handle, case-insensitively.
    async fn get_user(&self, handle: &str) -> Result<Option<UserRecord>, AppError>;
    async fn put_user(&self, user: &UserRecord) -> Result<(), AppError>;
    async fn delete_user(&self, handle: &str) -> Result<(), AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserRecord>, AppError>;

    async fn create_conversation(&self, snapshot: &ConversationSnapshot) -> Result<(), AppError>;
    async fn get_conversation(&self, cid: &str) -> Result<Option<ConversationSnapshot>, AppError>;
    async fn get_members(&self, cid: &str) -> Result<Option<MemberList>, AppError>;
    async fn set_members(&self, cid: &str, members: &MemberList) -> Result<(), AppError>;
    async fn set_name(&self, cid: &str, name: &str) -> Result<(), AppError>;
    async fn set_mtime(&self, cid: &str, m_time: &str) -> Result<(), AppError>;
    async fn get_files(&self, cid: &str) -> Result<Option<FileList>, AppError>;
    async fn set_files(&self, cid: &str, files: &FileList) -> Result<(), AppError>;

    /// Fails with [`AppError::Conflict`] when the author already has an
    /// entry at that time in the conversation.
    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError>;
    async fn query_messages(&self, cid: &str, query: MessageQuery) -> Result<Vec<ChatMessage>, AppError>;
    async fn delete_messages_by_author(&self, author: &str) -> Result<u64, AppError>;

    async fn add_email(&self, owner: &str, email: &EmailRow) -> Result<(), AppError>;
    /// Newest change first; with `since`, only entries changed after it.
    async fn query_emails(&self, owner: &str, since: Option<&str>) -> Result<Vec<EmailRow>, AppError>;
    async fn set_email_flag(
        &self,
        owner: &str,
        key: &EmailKey,
        flag: EmailFlag,
        value: bool,
        m_time: &str,
    ) -> Result<bool, AppError>;
    /// Store a draft, replacing any draft with the same `recv_time`.
    async fn save_draft(&self, owner: &str, draft: &EmailRow) -> Result<(), AppError>;
    async fn purge_deleted_emails(&self, owner: &str) -> Result<u64, AppError>;
    async fn delete_emails(&self, owner: &str) -> Result<u64, AppError>;

    async fn add_scheduled(&self, message: &ScheduledMessage) -> Result<(), AppError>;
    /// Delete one row by (author, send time).
    async fn delete_scheduled(&self, author: &str, m_time: &str) -> Result<bool, AppError>;
    async fn delete_all_scheduled(&self, author: &str) -> Result<u64, AppError>;
    /// Delete and return every row due strictly before `now`.
    async fn take_due_scheduled(&self, now: &str) -> Result<Vec<ScheduledMessage>, AppError>;
}
