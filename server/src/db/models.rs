use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored account record. Only the store keeps it; callers get copies that
/// live for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub account_id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            account_id: Uuid::new_v4().to_string(),
            username,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_new() {
        let account = Account::new("testuser".to_string(), "$2b$04$hash".to_string());
        assert_eq!(account.username, "testuser");
        assert_eq!(account.password_hash, "$2b$04$hash");
        assert!(Uuid::parse_str(&account.account_id).is_ok());
    }

    #[test]
    fn test_account_ids_are_unique() {
        let a = Account::new("a".to_string(), String::new());
        let b = Account::new("a".to_string(), String::new());
        assert_ne!(a.account_id, b.account_id);
    }

    #[test]
    fn test_account_id_is_stored_as_document_id() {
        let account = Account::new("testuser".to_string(), "hash".to_string());
        let value = serde_json::to_value(&account).unwrap();
        assert_eq!(value["_id"], account.account_id);
        assert!(value.get("account_id").is_none());
    }
}
