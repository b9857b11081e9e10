//! Access and refresh token issuance and verification (HS256 JWT).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use relay_common::id::{prefix, prefixed_ulid};
use serde::{Deserialize, Serialize};

use crate::auth::password::verify_password;
use crate::config::Config;
use crate::db::accounts::AccountStore;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by both token kinds. Refresh tokens also carry a `jti`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Verifies bearer tokens and credentials, and mints token pairs.
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    accounts: Arc<dyn AccountStore>,
}

impl Authenticator {
    pub fn new(
        secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
            accounts,
        }
    }

    pub fn from_config(config: &Config, accounts: Arc<dyn AccountStore>) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
            accounts,
        )
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Validate an access token and return its subject.
    pub fn verify_access_token(&self, token: &str) -> Result<String, ApiError> {
        self.verify(token, TokenKind::Access).map(|claims| claims.sub)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, ApiError> {
        if token.is_empty() {
            return Err(ApiError::unauthorized("token not provided"));
        }
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(%e, "token rejected");
            ApiError::unauthorized("Invalid or expired token")
        })?;
        if data.claims.typ != kind {
            return Err(ApiError::unauthorized("Wrong token type"));
        }
        Ok(data.claims)
    }

    /// Check a username/password pair and return the user id.
    ///
    /// Unknown users and wrong passwords produce the same error.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let account = self
            .accounts
            .user_by_username(username)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;
        verify_password(password, &account.password_hash)?;
        Ok(account.id)
    }

    /// Mint a fresh pair for `user_id`, revoking every older refresh token.
    pub async fn issue_pair(&self, user_id: &str) -> Result<TokenPair, ApiError> {
        if let Err(err) = self.accounts.revoke_tokens_for_user(user_id).await {
            tracing::warn!(%user_id, %err, "failed to revoke previous refresh tokens");
        }

        let now = Utc::now();
        let access = Claims {
            sub: user_id.to_string(),
            jti: None,
            iat: now.timestamp(),
            exp: now.timestamp() + self.access_ttl.as_secs() as i64,
            typ: TokenKind::Access,
        };
        let jti = prefixed_ulid(prefix::REFRESH_TOKEN);
        let refresh_expires_at = now + chrono::Duration::seconds(self.refresh_ttl.as_secs() as i64);
        let refresh = Claims {
            sub: user_id.to_string(),
            jti: Some(jti.clone()),
            iat: now.timestamp(),
            exp: refresh_expires_at.timestamp(),
            typ: TokenKind::Refresh,
        };

        let pair = TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        };
        self.accounts
            .save_refresh_token(&jti, user_id, refresh_expires_at)
            .await?;
        Ok(pair)
    }

    /// Exchange a live refresh token for a new pair. The old token is revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let claims = self.verify_refresh_token(refresh_token)?;
        let jti = claims
            .jti
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
        if !self.accounts.is_refresh_token_valid(&jti, &claims.sub).await? {
            return Err(ApiError::unauthorized("Refresh token revoked"));
        }
        self.accounts.revoke_token(&jti).await?;
        self.issue_pair(&claims.sub).await
    }

    /// Revoke the refresh token so it can no longer be exchanged.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let claims = self.verify_refresh_token(refresh_token)?;
        if let Some(jti) = claims.jti {
            self.accounts.revoke_token(&jti).await?;
        }
        tracing::info!(user_id = %claims.sub, "logged out");
        Ok(())
    }

    fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            tracing::error!(?e, "failed to sign token");
            ApiError::internal("Token signing failed")
        })
    }
}
