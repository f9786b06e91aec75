use sqlx::{Pool, Sqlite};

use crate::convo::{FileList, MemberList};
use crate::db::conversations::ConversationRepository;
use crate::db::emails::EmailRepository;
use crate::db::messages::MessageRepository;
use crate::db::models::{
    ChatMessage, ConversationSnapshot, EmailFlag, EmailKey, EmailRow, MessageQuery, ScheduledMessage, UserRecord,
};
use crate::db::scheduled::ScheduledRepository;
use crate::db::store::StateStore;
use crate::db::users::UserRepository;
use crate::error::AppError;

/// [`StateStore`] over the SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait::async_trait]
impl StateStore for SqliteStore {
    async fn get_user(&self, handle: &str) -> Result<Option<UserRecord>, AppError> {
        UserRepository::get_by_handle(&self.pool, handle).await
    }

    async fn put_user(&self, user: &UserRecord) -> Result<(), AppError> {
        UserRepository::upsert(&self.pool, user).await
    }

    async fn delete_user(&self, handle: &str) -> Result<(), AppError> {
        UserRepository::delete(&self.pool, handle).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        UserRepository::get_by_email(&self.pool, email).await
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserRecord>, AppError> {
        UserRepository::get_by_phone(&self.pool, phone).await
    }

    async fn create_conversation(&self, snapshot: &ConversationSnapshot) -> Result<(), AppError> {
        ConversationRepository::create(&self.pool, snapshot).await
    }

    async fn get_conversation(&self, cid: &str) -> Result<Option<ConversationSnapshot>, AppError> {
        ConversationRepository::get(&self.pool, cid).await
    }

    async fn get_members(&self, cid: &str) -> Result<Option<MemberList>, AppError> {
        ConversationRepository::get_members(&self.pool, cid).await
    }

    async fn set_members(&self, cid: &str, members: &MemberList) -> Result<(), AppError> {
        ConversationRepository::set_members(&self.pool, cid, members).await
    }

    async fn set_name(&self, cid: &str, name: &str) -> Result<(), AppError> {
        ConversationRepository::set_name(&self.pool, cid, name).await
    }

    async fn set_mtime(&self, cid: &str, m_time: &str) -> Result<(), AppError> {
        ConversationRepository::set_mtime(&self.pool, cid, m_time).await
    }

    async fn get_files(&self, cid: &str) -> Result<Option<FileList>, AppError> {
        ConversationRepository::get_files(&self.pool, cid).await
    }

    async fn set_files(&self, cid: &str, files: &FileList) -> Result<(), AppError> {
        ConversationRepository::set_files(&self.pool, cid, files).await
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        MessageRepository::create(&self.pool, message).await
    }

    async fn query_messages(&self, cid: &str, query: MessageQuery) -> Result<Vec<ChatMessage>, AppError> {
        MessageRepository::query(&self.pool, cid, query).await
    }

    async fn delete_messages_by_author(&self, author: &str) -> Result<u64, AppError> {
        MessageRepository::delete_by_author(&self.pool, author).await
    }

    async fn add_email(&self, owner: &str, email: &EmailRow) -> Result<(), AppError> {
        EmailRepository::create(&self.pool, owner, email).await
    }

    async fn query_emails(&self, owner: &str, since: Option<&str>) -> Result<Vec<EmailRow>, AppError> {
        EmailRepository::list(&self.pool, owner, since).await
    }

    async fn set_email_flag(
        &self,
        owner: &str,
        key: &EmailKey,
        flag: EmailFlag,
        value: bool,
        m_time: &str,
    ) -> Result<bool, AppError> {
        EmailRepository::set_flag(&self.pool, owner, key, flag, value, m_time).await
    }

    async fn save_draft(&self, owner: &str, draft: &EmailRow) -> Result<(), AppError> {
        EmailRepository::save_draft(&self.pool, owner, draft).await
    }

    async fn purge_deleted_emails(&self, owner: &str) -> Result<u64, AppError> {
        EmailRepository::purge_deleted(&self.pool, owner).await
    }

    async fn delete_emails(&self, owner: &str) -> Result<u64, AppError> {
        EmailRepository::delete_by_owner(&self.pool, owner).await
    }

    async fn add_scheduled(&self, message: &ScheduledMessage) -> Result<(), AppError> {
        ScheduledRepository::create(&self.pool, message).await
    }

    async fn delete_scheduled(&self, author: &str, m_time: &str) -> Result<bool, AppError> {
        ScheduledRepository::delete(&self.pool, author, m_time).await
    }

    async fn delete_all_scheduled(&self, author: &str) -> Result<u64, AppError> {
        ScheduledRepository::delete_by_author(&self.pool, author).await
    }

    async fn take_due_scheduled(&self, now: &str) -> Result<Vec<ScheduledMessage>, AppError> {
        ScheduledRepository::take_due(&self.pool, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convo::ConvoMember;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn message(cid: &str, author: &str, t: &str) -> ChatMessage {
        ChatMessage {
            cid: cid.into(),
            f_username: author.into(),
            m_time: t.into(),
            content: format!("at {}", t),
        }
    }

    #[tokio::test]
    async fn users_are_keyed_case_insensitively() {
        let store = store().await;
        let mut user = UserRecord::new("Alice");
        user.email = "Alice@Example.com".into();
        store.put_user(&user).await.unwrap();

        let found = store.get_user("ALICE").await.unwrap().unwrap();
        assert_eq!(found.username, "Alice");
        assert!(store.find_user_by_email("alice@example.com").await.unwrap().is_some());

        store.delete_user("alice").await.unwrap();
        assert!(store.get_user("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conversation_fields_update_independently() {
        let store = store().await;
        let snapshot = ConversationSnapshot {
            cid: "c1".into(),
            name: "trip".into(),
            m_time: "t1".into(),
            members: MemberList::new(vec![ConvoMember { username: "a".into(), read_time: "t1".into(), typing: false }]),
            files: FileList::default(),
        };
        store.create_conversation(&snapshot).await.unwrap();
        store.set_name("c1", "renamed").await.unwrap();
        store.set_mtime("c1", "t2").await.unwrap();

        let got = store.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(got.name, "renamed");
        assert_eq!(got.m_time, "t2");
        assert_eq!(got.members, snapshot.members);
        assert!(store.get_members("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_queries_respect_cursors() {
        let store = store().await;
        for t in ["2024-01-01T00:00:01.000Z", "2024-01-01T00:00:02.000Z", "2024-01-01T00:00:03.000Z"] {
            store.append_message(&message("c1", "a", t)).await.unwrap();
        }
        store.append_message(&message("c2", "a", "2024-01-01T00:00:04.000Z")).await.unwrap();

        let latest = store.query_messages("c1", MessageQuery::Latest(2)).await.unwrap();
        assert_eq!(latest.iter().map(|m| m.m_time.as_str()).collect::<Vec<_>>(),
            vec!["2024-01-01T00:00:02.000Z", "2024-01-01T00:00:03.000Z"]);

        let since = store.query_messages("c1", MessageQuery::Since("2024-01-01T00:00:01.000Z".into())).await.unwrap();
        assert_eq!(since.len(), 2);

        let before = store.query_messages("c1", MessageQuery::Before("2024-01-01T00:00:03.000Z".into(), 50)).await.unwrap();
        assert_eq!(before[0].m_time, "2024-01-01T00:00:02.000Z");
        assert_eq!(before.len(), 2);

        assert_eq!(store.query_messages("c1", MessageQuery::All).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_history_key_is_refused() {
        let store = store().await;
        let first = message("c1", "a", "2024-01-01T00:00:01.000Z");
        store.append_message(&first).await.unwrap();

        let clash = ChatMessage { content: "second".into(), ..first.clone() };
        assert!(matches!(store.append_message(&clash).await, Err(AppError::Conflict(_))));

        let history = store.query_messages("c1", MessageQuery::All).await.unwrap();
        assert_eq!(history, vec![first]);

        store.append_message(&message("c2", "a", "2024-01-01T00:00:02.000Z")).await.unwrap();
        store.append_message(&message("c2", "b", "2024-01-01T00:00:03.000Z")).await.unwrap();
        assert_eq!(store.delete_messages_by_author("A").await.unwrap(), 2);
        assert_eq!(store.query_messages("c2", MessageQuery::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mailbox_flags_drafts_and_purge() {
        let store = store().await;
        let received = EmailRow {
            from_email: "carol@example.com".into(),
            to_emails: r#"["alice@convo.email"]"#.into(),
            subject: "hello".into(),
            content: "hi".into(),
            unread: true,
            recv_time: "2024-01-01T00:00:00.000Z".into(),
            m_time: "2024-01-01T00:00:00.000Z".into(),
            ..Default::default()
        };
        store.add_email("alice", &received).await.unwrap();
        let key = EmailKey {
            from_email: received.from_email.clone(),
            subject: received.subject.clone(),
            recv_time: received.recv_time.clone(),
        };

        assert!(store.set_email_flag("Alice", &key, EmailFlag::Unread, false, "2024-01-02T00:00:00.000Z").await.unwrap());
        let all = store.query_emails("alice", None).await.unwrap();
        assert!(!all[0].unread);
        assert_eq!(all[0].m_time, "2024-01-02T00:00:00.000Z");
        assert!(store.query_emails("alice", Some("2024-01-02T00:00:00.000Z")).await.unwrap().is_empty());

        let draft = EmailRow {
            from_email: "alice@convo.email".into(),
            subject: "v1".into(),
            draft: true,
            recv_time: "2024-01-03T00:00:00.000Z".into(),
            m_time: "2024-01-03T00:00:00.000Z".into(),
            ..Default::default()
        };
        store.save_draft("alice", &draft).await.unwrap();
        store
            .save_draft("alice", &EmailRow { subject: "v2".into(), m_time: "2024-01-04T00:00:00.000Z".into(), ..draft })
            .await
            .unwrap();
        let all = store.query_emails("alice", None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].subject, "v2");
        assert!(all[0].draft);

        store.set_email_flag("alice", &key, EmailFlag::Deleted, true, "2024-01-05T00:00:00.000Z").await.unwrap();
        assert_eq!(store.purge_deleted_emails("alice").await.unwrap(), 1);
        assert_eq!(store.delete_emails("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn take_due_removes_only_past_rows() {
        let store = store().await;
        let past = ScheduledMessage { cid: "c1".into(), f_username: "a".into(), content: "x".into(), m_time: "2024-01-01T00:00:00.000Z".into() };
        let future = ScheduledMessage { m_time: "2999-01-01T00:00:00.000Z".into(), ..past.clone() };
        store.add_scheduled(&past).await.unwrap();
        store.add_scheduled(&future).await.unwrap();

        let due = store.take_due_scheduled("2025-01-01T00:00:00.000Z").await.unwrap();
        assert_eq!(due, vec![past]);
        assert!(store.take_due_scheduled("2025-01-01T00:00:00.000Z").await.unwrap().is_empty());
        assert_eq!(store.delete_all_scheduled("a").await.unwrap(), 1);
    }
}
