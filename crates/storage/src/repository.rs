use async_trait::async_trait;
use poll_core::model::Token;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Keeps the participant's token between app launches.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the token cannot be stored.
    async fn store_token(&self, token: &Token) -> Result<(), StorageError>;

    /// Fetch the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load_token(&self) -> Result<Option<Token>, StorageError>;

    /// Forget the stored token (logout).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the token cannot be removed.
    async fn clear_token(&self) -> Result<(), StorageError>;
}

/// Simple in-memory store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    token: Arc<Mutex<Option<Token>>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `token`.
    #[must_use]
    pub fn with_token(token: Token) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token))),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn store_token(&self, token: &Token) -> Result<(), StorageError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(token.clone());
        Ok(())
    }

    async fn load_token(&self) -> Result<Option<Token>, StorageError> {
        let guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tokens: Arc<dyn TokenStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        Self { tokens }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_loads_and_clears_token() {
        let store = InMemoryTokenStore::new();
        assert!(store.load_token().await.unwrap().is_none());

        store.store_token(&Token::new("tok-abc")).await.unwrap();
        let loaded = store.load_token().await.unwrap().expect("token stored");
        assert_eq!(loaded.as_str(), "tok-abc");

        store.store_token(&Token::new("tok-def")).await.unwrap();
        let loaded = store.load_token().await.unwrap().expect("token replaced");
        assert_eq!(loaded.as_str(), "tok-def");

        store.clear_token().await.unwrap();
        assert!(store.load_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clones_share_the_same_slot() {
        let store = InMemoryTokenStore::with_token(Token::new("seed"));
        let storage = Storage {
            tokens: Arc::new(store.clone()),
        };
        storage.tokens.clear_token().await.unwrap();
        assert!(store.load_token().await.unwrap().is_none());
    }
}
