use sqlx::{FromRow, Pool, Sqlite};
use crate::db::models::{handle_key, UserRecord};
use crate::error::AppError;

#[derive(Debug, FromRow)]
struct UserRow {
    record: String,
}

impl UserRow {
    fn decode(self) -> Result<UserRecord, AppError> {
        Ok(serde_json::from_str(&self.record)?)
    }
}

pub struct UserRepository;

impl UserRepository {
    pub async fn upsert(pool: &Pool<Sqlite>, user: &UserRecord) -> Result<(), AppError> {
        let record = serde_json::to_string(user)?;

        sqlx::query(
            r#"
INSERT INTO users (handle, email, phone, record)
VALUES (?, ?, ?, ?)
ON CONFLICT(handle) DO UPDATE SET
    email = excluded.email,
    phone = excluded.phone,
    record = excluded.record
            "#,
        )
        .bind(handle_key(&user.username))
        .bind(user.email.to_lowercase())
        .bind(&user.phone)
        .bind(record)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_handle(
        pool: &Pool<Sqlite>,
        handle: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT record FROM users WHERE handle = ?"
        )
        .bind(handle_key(handle))
        .fetch_optional(pool)
        .await?;

        row.map(UserRow::decode).transpose()
    }

    pub async fn get_by_email(
        pool: &Pool<Sqlite>,
        email: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT record FROM users WHERE email = ? AND email <> '' LIMIT 1"
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;

        row.map(UserRow::decode).transpose()
    }

    pub async fn get_by_phone(
        pool: &Pool<Sqlite>,
        phone: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT record FROM users WHERE phone = ? AND phone <> '' LIMIT 1"
        )
        .bind(phone)
        .fetch_optional(pool)
        .await?;

        row.map(UserRow::decode).transpose()
    }

    pub async fn delete(pool: &Pool<Sqlite>, handle: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM users WHERE handle = ?")
            .bind(handle_key(handle))
            .execute(pool)
            .await?;

        Ok(())
    }
}
