use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::token::{TokenGenerator, UuidTokenGenerator};
use crate::db::Account;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found or expired")]
    NotFound,

    #[error("token generator produced a live token twice")]
    TokenCollision,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub account_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<Instant>,
}

impl Session {
    fn new(session_id: String, account_id: String, ttl: Option<Duration>) -> Self {
        Self {
            session_id,
            account_id,
            issued_at: Utc::now(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }
}

/// Live sessions, shared by every request handler.
///
/// Lock order is always `account_sessions` then `sessions`; paths that touch
/// both in the other direction release the first map before taking the second.
#[derive(Clone)]
pub struct SessionRegistry {
    // session_id -> Session
    sessions: Arc<DashMap<String, Session>>,
    // account_id -> session_ids in issue order
    account_sessions: Arc<DashMap<String, Vec<String>>>,
    tokens: Arc<dyn TokenGenerator>,
    ttl: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self::with_generator(Arc::new(UuidTokenGenerator), ttl)
    }

    pub fn with_generator(tokens: Arc<dyn TokenGenerator>, ttl: Option<Duration>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            account_sessions: Arc::new(DashMap::new()),
            tokens,
            ttl,
        }
    }

    /// Records a fresh session for `account`. A generated token that is
    /// already live is retried once; a second collision is an error.
    pub fn issue(&self, account: &Account) -> Result<Session, SessionError> {
        let mut owned = self
            .account_sessions
            .entry(account.account_id.clone())
            .or_default();

        for attempt in 0..2 {
            let token = self.tokens.generate();
            match self.sessions.entry(token) {
                Entry::Occupied(_) => {
                    log::warn!(
                        "Session token collision for account {} (attempt {})",
                        account.account_id,
                        attempt + 1
                    );
                }
                Entry::Vacant(slot) => {
                    let session = Session::new(
                        slot.key().clone(),
                        account.account_id.clone(),
                        self.ttl,
                    );
                    slot.insert(session.clone());
                    owned.push(session.session_id.clone());

                    log::info!(
                        "Created session {} for account {}",
                        session.session_id,
                        account.account_id
                    );
                    return Ok(session);
                }
            }
        }

        if owned.is_empty() {
            drop(owned);
            self.account_sessions
                .remove_if(&account.account_id, |_, ids| ids.is_empty());
        }
        Err(SessionError::TokenCollision)
    }

    pub fn lookup(&self, session_id: &str) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or(SessionError::NotFound)?;

        if session.is_expired() {
            drop(session);
            self.revoke(session_id);
            return Err(SessionError::NotFound);
        }

        Ok(session.clone())
    }

    /// Live sessions of one account, oldest first.
    pub fn list_by_account(&self, account_id: &str) -> Vec<Session> {
        let ids = self
            .account_sessions
            .get(account_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        ids.iter()
            .filter_map(|id| self.sessions.get(id).map(|s| s.clone()))
            .filter(|s| !s.is_expired())
            .collect()
    }

    pub fn revoke(&self, session_id: &str) {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return;
        };

        if let Entry::Occupied(mut owned) = self.account_sessions.entry(session.account_id.clone())
        {
            owned.get_mut().retain(|id| id != session_id);
            if owned.get().is_empty() {
                owned.remove();
            }
        }

        log::info!("Invalidated session: {}", session_id);
    }

    /// Returns how many sessions were dropped.
    pub fn revoke_all_for_account(&self, account_id: &str) -> usize {
        let Some((_, ids)) = self.account_sessions.remove(account_id) else {
            return 0;
        };

        let removed = ids
            .iter()
            .filter(|id| self.sessions.remove(id.as_str()).is_some())
            .count();

        log::info!(
            "Invalidated {} session(s) for account {}",
            removed,
            account_id
        );
        removed
    }

    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in &expired {
            log::debug!("Cleaned up expired session: {}", session_id);
            self.revoke(session_id);
        }

        if !expired.is_empty() {
            log::info!("Cleaned up {} expired sessions", expired.len());
        }

        expired.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn account(name: &str) -> Account {
        Account::new(name.to_string(), "hash".to_string())
    }

    /// Replays a fixed token script, then repeats the last entry.
    struct ScriptedTokens {
        script: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl TokenGenerator for ScriptedTokens {
        fn generate(&self) -> String {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            self.script[i.min(self.script.len() - 1)].to_string()
        }
    }

    fn scripted(script: Vec<&'static str>) -> SessionRegistry {
        SessionRegistry::with_generator(
            Arc::new(ScriptedTokens {
                script,
                next: AtomicUsize::new(0),
            }),
            None,
        )
    }

    #[test]
    fn test_issue_and_lookup() {
        let registry = SessionRegistry::new(None);
        let alice = account("alice");

        let session = registry.issue(&alice).unwrap();
        let found = registry.lookup(&session.session_id).unwrap();

        assert_eq!(found.account_id, alice.account_id);
        assert_eq!(registry.active_session_count(), 1);
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let registry = SessionRegistry::new(None);
        assert_eq!(
            registry.lookup("does-not-exist").unwrap_err(),
            SessionError::NotFound
        );
    }

    #[test]
    fn test_multiple_sessions_listed_in_issue_order() {
        let registry = SessionRegistry::new(None);
        let alice = account("alice");
        let bob = account("bob");

        let first = registry.issue(&alice).unwrap();
        registry.issue(&bob).unwrap();
        let second = registry.issue(&alice).unwrap();
        let third = registry.issue(&alice).unwrap();

        let listed: Vec<_> = registry
            .list_by_account(&alice.account_id)
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(
            listed,
            vec![first.session_id, second.session_id, third.session_id]
        );
    }

    #[test]
    fn test_revoke_single_session() {
        let registry = SessionRegistry::new(None);
        let alice = account("alice");
        let keep = registry.issue(&alice).unwrap();
        let gone = registry.issue(&alice).unwrap();

        registry.revoke(&gone.session_id);

        assert!(registry.lookup(&gone.session_id).is_err());
        assert!(registry.lookup(&keep.session_id).is_ok());
        assert_eq!(registry.list_by_account(&alice.account_id).len(), 1);
    }

    #[test]
    fn test_revoke_all_for_account_leaves_others() {
        let registry = SessionRegistry::new(None);
        let alice = account("alice");
        let bob = account("bob");
        let a1 = registry.issue(&alice).unwrap();
        let a2 = registry.issue(&alice).unwrap();
        let b1 = registry.issue(&bob).unwrap();

        assert_eq!(registry.revoke_all_for_account(&alice.account_id), 2);

        assert!(registry.lookup(&a1.session_id).is_err());
        assert!(registry.lookup(&a2.session_id).is_err());
        assert!(registry.lookup(&b1.session_id).is_ok());
        assert!(registry.list_by_account(&alice.account_id).is_empty());
        assert_eq!(registry.revoke_all_for_account(&alice.account_id), 0);
    }

    #[test]
    fn test_collision_is_retried_once() {
        let registry = scripted(vec!["tok-a", "tok-a", "tok-b"]);
        let first = registry.issue(&account("alice")).unwrap();
        let second = registry.issue(&account("bob")).unwrap();

        assert_eq!(first.session_id, "tok-a");
        assert_eq!(second.session_id, "tok-b");
    }

    #[test]
    fn test_repeated_collision_fails() {
        let registry = scripted(vec!["tok-a"]);
        registry.issue(&account("alice")).unwrap();

        assert_eq!(
            registry.issue(&account("bob")).unwrap_err(),
            SessionError::TokenCollision
        );
        assert_eq!(registry.active_session_count(), 1);
    }

    #[test]
    fn test_session_expiry() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(0)));
        let alice = account("alice");
        let session = registry.issue(&alice).unwrap();

        std::thread::sleep(Duration::from_millis(10));

        assert!(registry.lookup(&session.session_id).is_err());
        assert_eq!(registry.active_session_count(), 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(0)));
        registry.issue(&account("alice")).unwrap();
        registry.issue(&account("bob")).unwrap();

        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(registry.cleanup_expired(), 2);
        assert_eq!(registry.active_session_count(), 0);
    }

    #[test]
    fn test_concurrent_issue_never_duplicates_tokens() {
        let registry = SessionRegistry::new(None);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let owner = account(&format!("user-{i}"));
                    (0..50)
                        .map(|_| registry.issue(&owner).unwrap().session_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token), "token issued twice");
            }
        }
        assert_eq!(registry.active_session_count(), 400);
    }
}
