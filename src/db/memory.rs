use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::convo::{FileList, MemberList};
use crate::db::models::{
    handle_key, same_handle, ChatMessage, ConversationSnapshot, EmailFlag, EmailKey, EmailRow, MessageQuery,
    ScheduledMessage, UserRecord,
};
use crate::db::store::StateStore;
use crate::error::AppError;

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    conversations: HashMap<String, ConversationSnapshot>,
    messages: Vec<ChatMessage>,
    scheduled: Vec<ScheduledMessage>,
    emails: HashMap<String, Vec<EmailRow>>,
}

/// In-process [`StateStore`], used by tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`AppError::Unavailable`].
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, Inner>, AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("memory store offline".to_string()));
        }
        Ok(self.inner.lock().await)
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStore {
    async fn get_user(&self, handle: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.lock().await?.users.get(&handle_key(handle)).cloned())
    }

    async fn put_user(&self, user: &UserRecord) -> Result<(), AppError> {
        self.lock().await?.users.insert(handle_key(&user.username), user.clone());
        Ok(())
    }

    async fn delete_user(&self, handle: &str) -> Result<(), AppError> {
        self.lock().await?.users.remove(&handle_key(handle));
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Ok(None);
        }
        let guard = self.lock().await?;
        Ok(guard.users.values().find(|u| u.email.to_lowercase() == email).cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserRecord>, AppError> {
        if phone.is_empty() {
            return Ok(None);
        }
        let guard = self.lock().await?;
        Ok(guard.users.values().find(|u| u.phone == phone).cloned())
    }

    async fn create_conversation(&self, snapshot: &ConversationSnapshot) -> Result<(), AppError> {
        self.lock().await?.conversations.insert(snapshot.cid.clone(), snapshot.clone());
        Ok(())
    }

    async fn get_conversation(&self, cid: &str) -> Result<Option<ConversationSnapshot>, AppError> {
        Ok(self.lock().await?.conversations.get(cid).cloned())
    }

    async fn get_members(&self, cid: &str) -> Result<Option<MemberList>, AppError> {
        Ok(self.lock().await?.conversations.get(cid).map(|c| c.members.clone()))
    }

    async fn set_members(&self, cid: &str, members: &MemberList) -> Result<(), AppError> {
        if let Some(c) = self.lock().await?.conversations.get_mut(cid) {
            c.members = members.clone();
        }
        Ok(())
    }

    async fn set_name(&self, cid: &str, name: &str) -> Result<(), AppError> {
        if let Some(c) = self.lock().await?.conversations.get_mut(cid) {
            c.name = name.to_string();
        }
        Ok(())
    }

    async fn set_mtime(&self, cid: &str, m_time: &str) -> Result<(), AppError> {
        if let Some(c) = self.lock().await?.conversations.get_mut(cid) {
            c.m_time = m_time.to_string();
        }
        Ok(())
    }

    async fn get_files(&self, cid: &str) -> Result<Option<FileList>, AppError> {
        Ok(self.lock().await?.conversations.get(cid).map(|c| c.files.clone()))
    }

    async fn set_files(&self, cid: &str, files: &FileList) -> Result<(), AppError> {
        if let Some(c) = self.lock().await?.conversations.get_mut(cid) {
            c.files = files.clone();
        }
        Ok(())
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        let mut guard = self.lock().await?;
        let taken = guard.messages.iter().any(|m| {
            m.cid == message.cid && m.f_username == message.f_username && m.m_time == message.m_time
        });
        if taken {
            return Err(AppError::Conflict(format!(
                "{} already posted to {} at {}",
                message.f_username, message.cid, message.m_time
            )));
        }
        guard.messages.push(message.clone());
        Ok(())
    }

    async fn query_messages(&self, cid: &str, query: MessageQuery) -> Result<Vec<ChatMessage>, AppError> {
        let guard = self.lock().await?;
        let mut history: Vec<ChatMessage> = guard.messages.iter().filter(|m| m.cid == cid).cloned().collect();
        history.sort_by(|a, b| a.m_time.cmp(&b.m_time));

        let out = match query {
            MessageQuery::Latest(n) => {
                let skip = history.len().saturating_sub(n.max(0) as usize);
                history.split_off(skip)
            }
            MessageQuery::Since(t) => history.into_iter().filter(|m| m.m_time > t).collect(),
            MessageQuery::Before(t, n) => history
                .into_iter()
                .rev()
                .filter(|m| m.m_time < t)
                .take(n.max(0) as usize)
                .collect(),
            MessageQuery::All => history,
        };
        Ok(out)
    }

    async fn delete_messages_by_author(&self, author: &str) -> Result<u64, AppError> {
        let mut guard = self.lock().await?;
        let before = guard.messages.len();
        guard.messages.retain(|m| !same_handle(&m.f_username, author));
        Ok((before - guard.messages.len()) as u64)
    }

    async fn add_email(&self, owner: &str, email: &EmailRow) -> Result<(), AppError> {
        self.lock().await?.emails.entry(handle_key(owner)).or_default().push(email.clone());
        Ok(())
    }

    async fn query_emails(&self, owner: &str, since: Option<&str>) -> Result<Vec<EmailRow>, AppError> {
        let guard = self.lock().await?;
        let mut out: Vec<EmailRow> = guard
            .emails
            .get(&handle_key(owner))
            .map(|rows| {
                rows.iter()
                    .filter(|e| since.map_or(true, |t| e.m_time.as_str() > t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| b.m_time.cmp(&a.m_time));
        Ok(out)
    }

    async fn set_email_flag(
        &self,
        owner: &str,
        key: &EmailKey,
        flag: EmailFlag,
        value: bool,
        m_time: &str,
    ) -> Result<bool, AppError> {
        let mut guard = self.lock().await?;
        let mut changed = false;
        if let Some(rows) = guard.emails.get_mut(&handle_key(owner)) {
            for row in rows.iter_mut().filter(|e| key.matches(e)) {
                flag.apply(row, value);
                row.m_time = m_time.to_string();
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn save_draft(&self, owner: &str, draft: &EmailRow) -> Result<(), AppError> {
        let mut guard = self.lock().await?;
        let rows = guard.emails.entry(handle_key(owner)).or_default();
        rows.retain(|e| !(e.draft && e.recv_time == draft.recv_time));
        rows.push(EmailRow {
            recv_email: String::new(),
            attachments: String::new(),
            starred: false,
            unread: false,
            spam: false,
            draft: true,
            deleted: false,
            ..draft.clone()
        });
        Ok(())
    }

    async fn purge_deleted_emails(&self, owner: &str) -> Result<u64, AppError> {
        let mut guard = self.lock().await?;
        let Some(rows) = guard.emails.get_mut(&handle_key(owner)) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|e| !e.deleted);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_emails(&self, owner: &str) -> Result<u64, AppError> {
        let removed = self.lock().await?.emails.remove(&handle_key(owner));
        Ok(removed.map_or(0, |rows| rows.len() as u64))
    }

    async fn add_scheduled(&self, message: &ScheduledMessage) -> Result<(), AppError> {
        let mut guard = self.lock().await?;
        guard.scheduled.retain(|s| !(s.f_username == message.f_username && s.m_time == message.m_time));
        guard.scheduled.push(message.clone());
        Ok(())
    }

    async fn delete_scheduled(&self, author: &str, m_time: &str) -> Result<bool, AppError> {
        let mut guard = self.lock().await?;
        let before = guard.scheduled.len();
        guard.scheduled.retain(|s| !(s.f_username == author && s.m_time == m_time));
        Ok(guard.scheduled.len() != before)
    }

    async fn delete_all_scheduled(&self, author: &str) -> Result<u64, AppError> {
        let mut guard = self.lock().await?;
        let before = guard.scheduled.len();
        guard.scheduled.retain(|s| s.f_username != author);
        Ok((before - guard.scheduled.len()) as u64)
    }

    async fn take_due_scheduled(&self, now: &str) -> Result<Vec<ScheduledMessage>, AppError> {
        let mut guard = self.lock().await?;
        let (due, keep): (Vec<_>, Vec<_>) = guard.scheduled.drain(..).partition(|s| s.m_time.as_str() < now);
        guard.scheduled = keep;
        Ok(due)
    }
}
