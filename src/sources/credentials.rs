//! Bearer credential discovery: a cached credential first, then a bounded live lookup.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::SourceError;

#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub subject: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_usable_for(&self, user_id: Uuid, now: DateTime<Utc>) -> bool {
        self.subject == user_id
            && !self.access_token.trim().is_empty()
            && self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn cached(&self) -> Option<Credential>;

    async fn fetch_live(&self) -> Result<Option<Credential>, SourceError>;
}

/// Resolves a credential for `user_id`, bounding the live lookup by `budget`.
pub async fn discover(
    provider: &dyn CredentialProvider,
    user_id: Uuid,
    budget: Duration,
) -> Result<Credential, SourceError> {
    let now = Utc::now();

    if let Some(cached) = provider.cached().filter(|c| c.is_usable_for(user_id, now)) {
        debug!("using cached credential");
        return Ok(cached);
    }

    let live = tokio::time::timeout(budget, provider.fetch_live())
        .await
        .map_err(|_| SourceError::Timeout {
            operation: "credential discovery",
            budget,
        })??;

    live.filter(|c| c.is_usable_for(user_id, now))
        .ok_or_else(|| SourceError::Auth {
            details: format!("no unexpired credential for user {user_id}"),
        })
}

/// Token from the environment plus a session file written by the sign-in flow.
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    cached: Option<Credential>,
    session_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SessionFile {
    access_token: String,
    user_id: Uuid,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl SessionCredentials {
    pub fn new(access_token: Option<String>, user_id: Option<Uuid>, session_file: Option<PathBuf>) -> Self {
        let cached = match (access_token, user_id) {
            (Some(access_token), Some(subject)) => Some(Credential {
                access_token,
                subject,
                expires_at: None,
            }),
            _ => None,
        };
        Self {
            cached,
            session_file,
        }
    }
}

#[async_trait]
impl CredentialProvider for SessionCredentials {
    fn cached(&self) -> Option<Credential> {
        self.cached.clone()
    }

    async fn fetch_live(&self) -> Result<Option<Credential>, SourceError> {
        let Some(path) = &self.session_file else {
            return Ok(None);
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let session: SessionFile =
            serde_json::from_str(&contents).map_err(|err| SourceError::parse("session file", err))?;

        Ok(Some(Credential {
            access_token: session.access_token,
            subject: session.user_id,
            expires_at: session.expires_at,
        }))
    }
}
