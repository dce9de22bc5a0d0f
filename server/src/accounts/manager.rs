use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::hasher::{HashError, PasswordHasher, MAX_PASSWORD_BYTES};
use super::locks::KeyLocks;
use super::AccountError;
use crate::db::{Account, AccountStore, StoreError};
use crate::session::{Session, SessionRegistry};

// Verified when the username is unknown so both failure paths cost one hash check.
const DUMMY_PASSWORD: &str = "account-manager-timing-pad";

/// Account lifecycle on top of an [`AccountStore`].
///
/// Every operation on a username runs under that username's lock, which makes
/// create, login-then-issue and delete-then-revoke atomic per account while
/// leaving other accounts untouched. No account state is cached.
#[derive(Clone)]
pub struct AccountManager {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    sessions: SessionRegistry,
    locks: KeyLocks,
    op_timeout: Duration,
    dummy_hash: Arc<str>,
}

impl AccountManager {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn PasswordHasher>,
        sessions: SessionRegistry,
        op_timeout: Duration,
    ) -> Result<Self, AccountError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;

        Ok(Self {
            store,
            hasher,
            sessions,
            locks: KeyLocks::new(),
            op_timeout,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Account, AccountError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AccountError::PasswordTooLong(MAX_PASSWORD_BYTES));
        }

        let password_hash = self.hash(password).await?;
        let account = Account::new(username.to_string(), password_hash);

        let _guard = self.locks.lock(username).await;
        match self.bounded(self.store.insert(&account)).await {
            Ok(()) => {
                log::info!(
                    "Created account {} for user: {}",
                    account.account_id,
                    username
                );
                Ok(account)
            }
            Err(AccountError::Store(StoreError::Duplicate)) => {
                log::info!("Rejected duplicate account for user: {}", username);
                Err(AccountError::UserExists)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let _guard = self.locks.lock(username).await;
        self.verify_credentials(username, password).await
    }

    /// Login and session issue as one step, so a concurrent delete of the same
    /// account cannot leave a session behind.
    pub async fn open_session(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(Account, Session), AccountError> {
        let _guard = self.locks.lock(username).await;
        let account = self.verify_credentials(username, password).await?;
        let session = self.sessions.issue(&account)?;

        log::info!(
            "Successful login for user: {} (session: {})",
            username,
            session.session_id
        );
        Ok((account, session))
    }

    /// Re-verifies the credentials, removes the account and revokes all of its sessions.
    pub async fn delete_account(&self, username: &str, password: &str) -> Result<(), AccountError> {
        let _guard = self.locks.lock(username).await;
        let account = self.verify_credentials(username, password).await?;

        if !self
            .bounded(self.store.delete_by_username(username))
            .await?
        {
            return Err(AccountError::IncorrectCredentials);
        }

        let revoked = self.sessions.revoke_all_for_account(&account.account_id);
        log::info!(
            "Deleted account {} for user: {} ({} session(s) revoked)",
            account.account_id,
            username,
            revoked
        );
        Ok(())
    }

    // Callers must hold the username lock.
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Account, AccountError> {
        let account = self.bounded(self.store.find_by_username(username)).await?;

        // bcrypt only compares the first MAX_PASSWORD_BYTES bytes.
        let acceptable = password.len() <= MAX_PASSWORD_BYTES;
        let hash = account
            .as_ref()
            .filter(|_| acceptable)
            .map(|a| a.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.to_string());
        let verified = self.verify(password, hash).await?;

        match account {
            Some(account) if acceptable && verified => Ok(account),
            _ => {
                log::warn!("Failed login attempt for user: {}", username);
                Err(AccountError::IncorrectCredentials)
            }
        }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(AccountError::from),
            Err(_) => {
                log::warn!("Account store call exceeded {:?}", self.op_timeout);
                Err(AccountError::Timeout(self.op_timeout))
            }
        }
    }

    async fn hash(&self, password: &str) -> Result<String, AccountError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HashError::Worker(e.to_string()))?
            .map_err(AccountError::from)
    }

    async fn verify(&self, password: &str, hash: String) -> Result<bool, AccountError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| HashError::Worker(e.to_string()))?
            .map_err(AccountError::from)
    }
}
