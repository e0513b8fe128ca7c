use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FailureReason;

/// Which adapter produced a record or a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceOrigin {
    Remote,
    DeviceLocal,
    Derived,
}

impl SourceOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::DeviceLocal => "device-local",
            Self::Derived => "derived",
        }
    }
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Moderate,
    High,
    Severe,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Severe => "severe",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical assessment after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnoutRecord {
    pub energy_tank: u8,
    pub recovery_speed: u8,
    pub emotional_leakage: u8,
    pub performance_signal: u8,
    pub tomorrow_readiness: u8,
    /// Always within [0, 10].
    pub total_score: f64,
    pub risk_level: RiskLevel,
    /// Calendar day copied from the source's date component, never time-zone shifted.
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub source_origin: SourceOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBucket {
    pub period_key: NaiveDate,
    pub total_score: f64,
    pub risk_level: RiskLevel,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

/// Lookback presets offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookbackWindow {
    Week,
    Month,
    NinetyDays,
}

impl LookbackWindow {
    pub fn days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::NinetyDays => 90,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::NinetyDays => "90 days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserContext {
    pub user_id: Option<Uuid>,
}

impl UserContext {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Fresh,
    Empty,
    Failed(FailureReason),
}

/// Diagnostic tag naming where a result came from. Never used for business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTag {
    pub origin: SourceOrigin,
    pub status: SourceStatus,
}

impl Serialize for SourceTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            SourceStatus::Fresh => write!(f, "{}", self.origin),
            SourceStatus::Empty => write!(f, "{}, empty", self.origin),
            SourceStatus::Failed(reason) => write!(f, "{}, failed: {}", self.origin, reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub buckets: Vec<AggregatedBucket>,
    pub source_used: SourceTag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledRecords {
    pub records: Vec<BurnoutRecord>,
    pub source_used: SourceTag,
}

/// Generic reflection entry, coarser than an assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionEntry {
    pub entry_kind: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RiskMixSummary {
    pub risk_level: RiskLevel,
    pub count: usize,
    pub avg_score: f64,
}
