use sqlx::{Pool, Sqlite};
use crate::db::models::ScheduledMessage;
use crate::error::AppError;

pub struct ScheduledRepository;

impl ScheduledRepository {
    pub async fn create(pool: &Pool<Sqlite>, message: &ScheduledMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
INSERT OR REPLACE INTO scheduled_messages (cid, f_username, content, m_time)
VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&message.cid)
        .bind(&message.f_username)
        .bind(&message.content)
        .bind(&message.m_time)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, author: &str, m_time: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM scheduled_messages WHERE f_username = ? AND m_time = ?")
            .bind(author)
            .bind(m_time)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_by_author(pool: &Pool<Sqlite>, author: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM scheduled_messages WHERE f_username = ?")
            .bind(author)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Single statement, so two sweepers never both claim a row.
    pub async fn take_due(pool: &Pool<Sqlite>, now: &str) -> Result<Vec<ScheduledMessage>, AppError> {
        let due = sqlx::query_as::<_, ScheduledMessage>(
            r#"
DELETE FROM scheduled_messages
WHERE m_time < ?
RETURNING cid, f_username, content, m_time
            "#
        )
        .bind(now)
        .fetch_all(pool)
        .await?;

        Ok(due)
    }
}
