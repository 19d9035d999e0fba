use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

const TOKEN_BYTES: usize = 24;
const TOKEN_TTL_HOURS: i64 = 24;

/// Where issued admin tokens and their expiry are kept.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), SessionError>;
    async fn expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, SessionError>;
    /// Returns whether the token was present.
    async fn remove(&self, token: &str) -> Result<bool, SessionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to persist admin sessions to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode admin sessions: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] SessionError),
}

/// Volatile store; sessions end with the process.
#[derive(Default)]
pub struct InMemorySessionStore {
    tokens: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), SessionError> {
        self.tokens.lock().await.insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        Ok(self.tokens.lock().await.get(token).copied())
    }

    async fn remove(&self, token: &str) -> Result<bool, SessionError> {
        Ok(self.tokens.lock().await.remove(token).is_some())
    }
}

/// Token map persisted as `{ "<token>": <expiresAtMillis>, ... }` after every change.
pub struct FileSessionStore {
    path: PathBuf,
    tokens: Mutex<HashMap<String, i64>>,
}

impl FileSessionStore {
    /// Load unexpired sessions from `path`. A missing or unreadable file
    /// starts an empty map.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = load_tokens(&path, Utc::now()).await;
        tracing::debug!(path = %path.display(), sessions = tokens.len(), "admin sessions loaded");
        Self {
            path,
            tokens: Mutex::new(tokens),
        }
    }

    async fn persist(&self, tokens: &HashMap<String, i64>) -> Result<(), SessionError> {
        let encoded = serde_json::to_vec(tokens)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SessionError::Persist {
                    path: self.path.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|source| SessionError::Persist {
                path: self.path.clone(),
                source,
            })
    }
}

async fn load_tokens(path: &Path, now: DateTime<Utc>) -> HashMap<String, i64> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read admin sessions");
            return HashMap::new();
        }
    };

    match serde_json::from_slice::<HashMap<String, serde_json::Value>>(&raw) {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|(token, expires_at)| Some((token, expires_at.as_i64()?)))
            .filter(|(_, expires_at)| *expires_at > now.timestamp_millis())
            .collect(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt admin session file");
            HashMap::new()
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn insert(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), SessionError> {
        let mut tokens = self.tokens.lock().await;
        let mut next = tokens.clone();
        next.insert(token.to_string(), expires_at.timestamp_millis());
        self.persist(&next).await?;
        *tokens = next;
        Ok(())
    }

    async fn expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        let tokens = self.tokens.lock().await;
        Ok(tokens
            .get(token)
            .and_then(|millis| DateTime::from_timestamp_millis(*millis)))
    }

    async fn remove(&self, token: &str) -> Result<bool, SessionError> {
        let mut tokens = self.tokens.lock().await;
        let mut next = tokens.clone();
        if next.remove(token).is_none() {
            return Ok(false);
        }
        self.persist(&next).await?;
        *tokens = next;
        Ok(true)
    }
}

/// Token handed back by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks bearer tokens for the single shared admin secret.
pub struct AdminSessions {
    secret: String,
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl AdminSessions {
    pub fn new(secret: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            secret: secret.into(),
            store,
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn login(&self, password: &str) -> Result<IssuedToken, AuthError> {
        let matches: bool = password.as_bytes().ct_eq(self.secret.as_bytes()).into();
        if password.is_empty() || !matches {
            tracing::warn!("admin login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let token = mint_token();
        let expires_at = Utc::now() + self.ttl;
        self.store.insert(&token, expires_at).await?;
        tracing::info!(expires_at = %expires_at, "admin session issued");
        Ok(IssuedToken { token, expires_at })
    }

    /// Validate an `Authorization` header value. Expired tokens are evicted.
    pub async fn authorize(&self, header: Option<&str>) -> Result<String, AuthError> {
        let token = header
            .and_then(bearer_token)
            .ok_or(AuthError::Unauthorized)?;
        let expires_at = self
            .store
            .expiry(token)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if Utc::now() >= expires_at {
            if let Err(err) = self.store.remove(token).await {
                tracing::warn!(error = %err, "failed to evict expired admin session");
            }
            tracing::debug!("expired admin session evicted");
            return Err(AuthError::Unauthorized);
        }

        Ok(token.to_string())
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if self.store.remove(token).await? {
            tracing::info!("admin session revoked");
        }
        Ok(())
    }
}

/// Token part of `Bearer <token>`, if present.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
