use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_common::id::{prefix, prefixed_ulid};

use crate::error::ApiError;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A refresh token issued to a user, keyed by its `jti`.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

/// Persistence of users and revocable refresh tokens.
///
/// Backed by an in-memory map; a database-backed implementation only has to
/// provide these operations.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create a user. Fails with a conflict when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<Account, ApiError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<Account>, ApiError>;
    /// Display name of a user id. Not-found error when the user is unknown.
    async fn username_of(&self, user_id: &str) -> Result<String, ApiError>;

    async fn save_refresh_token(
        &self,
        jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ApiError>;
    /// `true` when the token exists, belongs to `user_id`, is not revoked and
    /// has not expired.
    async fn is_refresh_token_valid(&self, jti: &str, user_id: &str) -> Result<bool, ApiError>;
    async fn revoke_token(&self, jti: &str) -> Result<(), ApiError>;
    /// Revoke every open refresh token of a user. Returns how many were revoked.
    async fn revoke_tokens_for_user(&self, user_id: &str) -> Result<usize, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAccountStore {
    /// username → account
    users: DashMap<String, Account>,
    /// user id → username
    names: DashMap<String, String>,
    /// jti → record
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<Account, ApiError> {
        match self.users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(ApiError::conflict("User already exists")),
            Entry::Vacant(slot) => {
                let account = Account {
                    id: prefixed_ulid(prefix::USER),
                    username: username.to_string(),
                    password_hash: password_hash.to_string(),
                    created_at: Utc::now(),
                };
                self.names
                    .insert(account.id.clone(), account.username.clone());
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<Account>, ApiError> {
        Ok(self.users.get(username).map(|entry| entry.value().clone()))
    }

    async fn username_of(&self, user_id: &str) -> Result<String, ApiError> {
        self.names
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    async fn save_refresh_token(
        &self,
        jti: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        self.refresh_tokens.insert(
            jti.to_string(),
            RefreshTokenRecord {
                user_id: user_id.to_string(),
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn is_refresh_token_valid(&self, jti: &str, user_id: &str) -> Result<bool, ApiError> {
        Ok(self.refresh_tokens.get(jti).is_some_and(|record| {
            record.user_id == user_id && !record.revoked && record.expires_at > Utc::now()
        }))
    }

    async fn revoke_token(&self, jti: &str) -> Result<(), ApiError> {
        if let Some(mut record) = self.refresh_tokens.get_mut(jti) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn revoke_tokens_for_user(&self, user_id: &str) -> Result<usize, ApiError> {
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryAccountStore::new();
        let account = store.create_user("alice", "hash").await.unwrap();
        assert!(account.id.starts_with("usr_"));

        let err = store.create_user("alice", "other").await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn username_lookup_by_id() {
        let store = MemoryAccountStore::new();
        let account = store.create_user("bob", "hash").await.unwrap();

        assert_eq!(store.username_of(&account.id).await.unwrap(), "bob");
        let missing = store.username_of("usr_missing").await.unwrap_err();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let found = store.user_by_username("bob").await.unwrap().unwrap();
        assert_eq!(found, account);
        assert!(store.user_by_username("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_token_validity() {
        let store = MemoryAccountStore::new();
        let later = Utc::now() + Duration::hours(1);
        store.save_refresh_token("rt_1", "usr_a", later).await.unwrap();
        store
            .save_refresh_token("rt_old", "usr_a", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(store.is_refresh_token_valid("rt_1", "usr_a").await.unwrap());
        assert!(!store.is_refresh_token_valid("rt_1", "usr_b").await.unwrap());
        assert!(!store.is_refresh_token_valid("rt_old", "usr_a").await.unwrap());
        assert!(!store.is_refresh_token_valid("rt_nope", "usr_a").await.unwrap());

        store.revoke_token("rt_1").await.unwrap();
        assert!(!store.is_refresh_token_valid("rt_1", "usr_a").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_all_for_user_counts_open_tokens() {
        let store = MemoryAccountStore::new();
        let later = Utc::now() + Duration::hours(1);
        store.save_refresh_token("rt_1", "usr_a", later).await.unwrap();
        store.save_refresh_token("rt_2", "usr_a", later).await.unwrap();
        store.save_refresh_token("rt_3", "usr_b", later).await.unwrap();
        store.revoke_token("rt_2").await.unwrap();

        assert_eq!(store.revoke_tokens_for_user("usr_a").await.unwrap(), 1);
        assert!(store.is_refresh_token_valid("rt_3", "usr_b").await.unwrap());
    }
}
