use sqlx::{FromRow, Pool, Sqlite};
use crate::convo::{FileList, MemberList};
use crate::db::models::ConversationSnapshot;
use crate::error::AppError;

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: String,
    name: String,
    m_time: String,
    members: String,
    files: String,
}

/// Conversation fields live in separate columns and every setter touches
/// exactly one of them.
pub struct ConversationRepository;

impl ConversationRepository {
    pub async fn create(pool: &Pool<Sqlite>, convo: &ConversationSnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
INSERT INTO conversations (id, name, m_time, members, files)
VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&convo.cid)
        .bind(&convo.name)
        .bind(&convo.m_time)
        .bind(serde_json::to_string(&convo.members)?)
        .bind(serde_json::to_string(&convo.files)?)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get(pool: &Pool<Sqlite>, cid: &str) -> Result<Option<ConversationSnapshot>, AppError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, name, m_time, members, files FROM conversations WHERE id = ?"
        )
        .bind(cid)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ConversationSnapshot {
            cid: row.id,
            name: row.name,
            m_time: row.m_time,
            members: serde_json::from_str(&row.members)?,
            files: serde_json::from_str(&row.files)?,
        }))
    }

    pub async fn get_members(pool: &Pool<Sqlite>, cid: &str) -> Result<Option<MemberList>, AppError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT members FROM conversations WHERE id = ?")
            .bind(cid)
            .fetch_optional(pool)
            .await?;

        raw.map(|s| serde_json::from_str(&s).map_err(AppError::from)).transpose()
    }

    pub async fn set_members(pool: &Pool<Sqlite>, cid: &str, members: &MemberList) -> Result<(), AppError> {
        sqlx::query("UPDATE conversations SET members = ? WHERE id = ?")
            .bind(serde_json::to_string(members)?)
            .bind(cid)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn set_name(pool: &Pool<Sqlite>, cid: &str, name: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE conversations SET name = ? WHERE id = ?")
            .bind(name)
            .bind(cid)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn set_mtime(pool: &Pool<Sqlite>, cid: &str, m_time: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE conversations SET m_time = ? WHERE id = ?")
            .bind(m_time)
            .bind(cid)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn get_files(pool: &Pool<Sqlite>, cid: &str) -> Result<Option<FileList>, AppError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT files FROM conversations WHERE id = ?")
            .bind(cid)
            .fetch_optional(pool)
            .await?;

        raw.map(|s| serde_json::from_str(&s).map_err(AppError::from)).transpose()
    }

    pub async fn set_files(pool: &Pool<Sqlite>, cid: &str, files: &FileList) -> Result<(), AppError> {
        sqlx::query("UPDATE conversations SET files = ? WHERE id = ?")
            .bind(serde_json::to_string(files)?)
            .bind(cid)
            .execute(pool)
            .await?;

        Ok(())
    }
}
