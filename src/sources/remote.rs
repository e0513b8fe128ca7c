use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::{Settings, DEFAULT_ROW_LIMIT};
use crate::db;
use crate::errors::SourceError;
use crate::models::{SourceOrigin, UserContext};
use crate::risk;
use crate::sources::credentials::{self, CredentialProvider};
use crate::sources::{SourceAdapter, SourceBatch};

/// Hosted store of assessments, scoped to the caller by row-level security.
pub struct RemoteStoreAdapter {
    pool: PgPool,
    credentials: Arc<dyn CredentialProvider>,
    credential_timeout: Duration,
    fetch_timeout: Duration,
    row_limit: i64,
}

impl RemoteStoreAdapter {
    pub fn new(pool: PgPool, credentials: Arc<dyn CredentialProvider>) -> Self {
        let defaults = Settings::default();
        Self {
            pool,
            credentials,
            credential_timeout: defaults.credential_timeout,
            fetch_timeout: defaults.fetch_timeout,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.credential_timeout = settings.credential_timeout;
        self.fetch_timeout = settings.fetch_timeout;
        self.row_limit = settings.row_limit;
        self
    }
}

#[async_trait]
impl SourceAdapter for RemoteStoreAdapter {
    fn origin(&self) -> SourceOrigin {
        SourceOrigin::Remote
    }

    async fn fetch(
        &self,
        ctx: &UserContext,
        lookback_days: i64,
        as_of: DateTime<Utc>,
    ) -> Result<SourceBatch, SourceError> {
        let user_id = ctx.user_id.ok_or_else(|| SourceError::Auth {
            details: "caller is not signed in".to_string(),
        })?;

        let credential =
            credentials::discover(self.credentials.as_ref(), user_id, self.credential_timeout).await?;

        let since_date = risk::cutoff_date(as_of.date_naive(), lookback_days);
        debug!(%user_id, %since_date, limit = self.row_limit, "querying remote assessments");

        let rows = tokio::time::timeout(
            self.fetch_timeout,
            db::fetch_assessments(&self.pool, &credential, since_date, self.row_limit),
        )
        .await
        .map_err(|_| SourceError::Timeout {
            operation: "remote fetch",
            budget: self.fetch_timeout,
        })??;

        info!(rows = rows.len(), "remote assessments fetched");

        Ok(SourceBatch {
            records: rows.into_iter().map(|row| row.into_raw()).collect(),
            origin: SourceOrigin::Remote,
        })
    }
}
