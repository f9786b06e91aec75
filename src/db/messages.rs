use sqlx::{Pool, Sqlite};
use crate::db::models::{ChatMessage, MessageQuery};
use crate::error::AppError;

pub struct MessageRepository;

impl MessageRepository {
    /// Insert one entry. History is keyed by (cid, author, time); a second
    /// entry under the same key is refused with [`AppError::Conflict`].
    pub async fn create(pool: &Pool<Sqlite>, message: &ChatMessage) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
INSERT INTO messages (cid, f_username, m_time, content)
VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&message.cid)
        .bind(&message.f_username)
        .bind(&message.m_time)
        .bind(&message.content)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(format!(
                "{} already posted to {} at {}",
                message.f_username, message.cid, message.m_time
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_by_author(pool: &Pool<Sqlite>, author: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM messages WHERE f_username = ? COLLATE NOCASE")
            .bind(author)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn query(
        pool: &Pool<Sqlite>,
        cid: &str,
        query: MessageQuery,
    ) -> Result<Vec<ChatMessage>, AppError> {
        match query {
            MessageQuery::Latest(limit) => {
                let mut messages = Self::get_before(pool, cid, None, limit).await?;
                messages.reverse();
                Ok(messages)
            }
            MessageQuery::Since(m_time) => Self::get_since(pool, cid, &m_time).await,
            MessageQuery::Before(m_time, limit) => Self::get_before(pool, cid, Some(&m_time), limit).await,
            MessageQuery::All => Self::get_all(pool, cid).await,
        }
    }

    async fn get_before(
        pool: &Pool<Sqlite>,
        cid: &str,
        before: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
SELECT cid, f_username, m_time, content
FROM messages
WHERE cid = ? AND (? IS NULL OR m_time < ?)
ORDER BY m_time DESC
LIMIT ?
            "#
        )
        .bind(cid)
        .bind(before)
        .bind(before)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    async fn get_since(
        pool: &Pool<Sqlite>,
        cid: &str,
        since: &str,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
SELECT cid, f_username, m_time, content
FROM messages
WHERE cid = ? AND m_time > ?
ORDER BY m_time ASC
            "#
        )
        .bind(cid)
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    async fn get_all(pool: &Pool<Sqlite>, cid: &str) -> Result<Vec<ChatMessage>, AppError> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
SELECT cid, f_username, m_time, content
FROM messages
WHERE cid = ?
ORDER BY m_time ASC
            "#
        )
        .bind(cid)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }
}
