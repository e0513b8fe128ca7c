use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::SourceError;
use crate::models::{SourceOrigin, UserContext};
use crate::normalize::LooseAssessment;
use crate::sources::{SourceAdapter, SourceBatch};

pub const LOCAL_ASSESSMENTS_KEY: &str = "burnoutAssessments";

/// Reads the on-device key-value store, a single JSON object of key to value.
pub struct DeviceLocalAdapter {
    path: PathBuf,
    key: String,
}

impl DeviceLocalAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: LOCAL_ASSESSMENTS_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for DeviceLocalAdapter {
    fn origin(&self) -> SourceOrigin {
        SourceOrigin::DeviceLocal
    }

    async fn fetch(
        &self,
        _ctx: &UserContext,
        _lookback_days: i64,
        _as_of: DateTime<Utc>,
    ) -> Result<SourceBatch, SourceError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "local store absent");
                return Ok(SourceBatch::empty(SourceOrigin::DeviceLocal));
            }
            Err(err) => return Err(err.into()),
        };

        let store: Value = serde_json::from_str(&contents)
            .map_err(|err| SourceError::parse("device-local store", err))?;

        let entries = match store.get(&self.key) {
            None | Some(Value::Null) => return Ok(SourceBatch::empty(SourceOrigin::DeviceLocal)),
            Some(Value::Array(entries)) => entries.clone(),
            // Some writers store the array JSON-encoded as a string.
            Some(Value::String(encoded)) => serde_json::from_str::<Vec<Value>>(encoded)
                .map_err(|err| SourceError::parse("device-local assessments", err))?,
            Some(other) => {
                return Err(SourceError::parse(
                    "device-local assessments",
                    format!("expected an array, found {other}"),
                ))
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<LooseAssessment>(entry) {
                Ok(loose) => records.push(loose.into_raw()),
                Err(err) => warn!(error = %err, "skipping unreadable local assessment"),
            }
        }

        Ok(SourceBatch {
            records,
            origin: SourceOrigin::DeviceLocal,
        })
    }
}
