#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{InMemoryTokenStore, Storage, StorageError, TokenStore};
pub use sqlite::{SqliteInitError, SqliteRepository};
