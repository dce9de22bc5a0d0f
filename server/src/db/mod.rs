pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use std::sync::Arc;

pub use memory::InMemoryAccountStore;
pub use models::Account;
pub use repository::{MongoAccountStore, MongoDbContext};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an account with this username already exists")]
    Duplicate,

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable account persistence keyed by username.
///
/// `insert` must be atomic per username: of two concurrent inserts for the
/// same name exactly one succeeds and the other sees `StoreError::Duplicate`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Returns whether an account was removed.
    async fn delete_by_username(&self, username: &str) -> Result<bool, StoreError>;
}

/// What a store service exports to its dependents.
pub type SharedStore = Arc<dyn AccountStore>;
