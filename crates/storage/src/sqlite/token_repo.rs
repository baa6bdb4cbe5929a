use async_trait::async_trait;
use chrono::Utc;
use poll_core::model::Token;
use sqlx::Row;

use crate::repository::{StorageError, TokenStore};

use super::SqliteRepository;

#[async_trait]
impl TokenStore for SqliteRepository {
    async fn store_token(&self, token: &Token) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO credentials (id, token, stored_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                stored_at = excluded.stored_at
            ",
        )
        .bind(token.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }

    async fn load_token(&self) -> Result<Option<Token>, StorageError> {
        let row = sqlx::query("SELECT token FROM credentials WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token: String = row
            .try_get("token")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(Some(Token::new(token)))
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM credentials WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
