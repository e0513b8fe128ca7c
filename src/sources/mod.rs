//! Adapters that fetch raw assessments from one origin each.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::SourceError;
use crate::models::{SourceOrigin, UserContext};
use crate::normalize::RawAssessment;

pub mod credentials;
pub mod derived;
pub mod local;
pub mod remote;

pub use derived::FallbackDerivationAdapter;
pub use local::DeviceLocalAdapter;
pub use remote::RemoteStoreAdapter;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub records: Vec<RawAssessment>,
    pub origin: SourceOrigin,
}

impl SourceBatch {
    pub fn empty(origin: SourceOrigin) -> Self {
        Self {
            records: Vec::new(),
            origin,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn origin(&self) -> SourceOrigin;

    async fn fetch(
        &self,
        ctx: &UserContext,
        lookback_days: i64,
        as_of: DateTime<Utc>,
    ) -> Result<SourceBatch, SourceError>;
}
