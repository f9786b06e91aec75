use sqlx::{Pool, Sqlite};
use crate::db::models::{handle_key, EmailFlag, EmailKey, EmailRow};
use crate::error::AppError;

pub struct EmailRepository;

impl EmailRepository {
    pub async fn create(pool: &Pool<Sqlite>, owner: &str, email: &EmailRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
INSERT INTO emails (owner, from_email, to_emails, recv_email, subject, content, attachments,
                    starred, unread, spam, draft, deleted, recv_time, m_time)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(handle_key(owner))
        .bind(&email.from_email)
        .bind(&email.to_emails)
        .bind(&email.recv_email)
        .bind(&email.subject)
        .bind(&email.content)
        .bind(&email.attachments)
        .bind(email.starred)
        .bind(email.unread)
        .bind(email.spam)
        .bind(email.draft)
        .bind(email.deleted)
        .bind(&email.recv_time)
        .bind(&email.m_time)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Newest change first; with `since`, only entries changed after it.
    pub async fn list(pool: &Pool<Sqlite>, owner: &str, since: Option<&str>) -> Result<Vec<EmailRow>, AppError> {
        let emails = sqlx::query_as::<_, EmailRow>(
            r#"
SELECT from_email, to_emails, recv_email, subject, content, attachments,
       starred, unread, spam, draft, deleted, recv_time, m_time
FROM emails
WHERE owner = ? AND (? IS NULL OR m_time > ?)
ORDER BY m_time DESC
            "#
        )
        .bind(handle_key(owner))
        .bind(since)
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(emails)
    }

    pub async fn set_flag(
        pool: &Pool<Sqlite>,
        owner: &str,
        key: &EmailKey,
        flag: EmailFlag,
        value: bool,
        m_time: &str,
    ) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE emails SET {} = ?, m_time = ? WHERE owner = ? AND from_email = ? AND subject = ? AND recv_time = ?",
            flag.column()
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(m_time)
            .bind(handle_key(owner))
            .bind(&key.from_email)
            .bind(&key.subject)
            .bind(&key.recv_time)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the draft sharing `draft.recv_time`, if any.
    pub async fn save_draft(pool: &Pool<Sqlite>, owner: &str, draft: &EmailRow) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM emails WHERE owner = ? AND draft = 1 AND recv_time = ?")
            .bind(handle_key(owner))
            .bind(&draft.recv_time)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
INSERT INTO emails (owner, from_email, to_emails, recv_email, subject, content, attachments,
                    starred, unread, spam, draft, deleted, recv_time, m_time)
VALUES (?, ?, ?, '', ?, ?, '', 0, 0, 0, 1, 0, ?, ?)
            "#,
        )
        .bind(handle_key(owner))
        .bind(&draft.from_email)
        .bind(&draft.to_emails)
        .bind(&draft.subject)
        .bind(&draft.content)
        .bind(&draft.recv_time)
        .bind(&draft.m_time)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }

    pub async fn purge_deleted(pool: &Pool<Sqlite>, owner: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM emails WHERE owner = ? AND deleted = 1")
            .bind(handle_key(owner))
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_by_owner(pool: &Pool<Sqlite>, owner: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM emails WHERE owner = ?")
            .bind(handle_key(owner))
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
