pub mod hasher;
pub mod locks;
pub mod manager;

use std::time::Duration;

use crate::db::StoreError;
use crate::session::SessionError;

pub use hasher::{BcryptHasher, HashError, PasswordHasher, MAX_PASSWORD_BYTES};
pub use locks::KeyLocks;
pub use manager::AccountManager;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Username already taken")]
    UserExists,

    /// Unknown username and wrong password are deliberately the same error.
    #[error("Invalid credentials")]
    IncorrectCredentials,

    #[error("password must not exceed {0} bytes")]
    PasswordTooLong(usize),

    #[error("account store did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AccountError {
    /// Whether the same request may succeed if simply sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AccountError::Timeout(_) | AccountError::Store(StoreError::Unavailable(_))
        )
    }
}
