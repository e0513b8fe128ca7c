//! Burnout-trend reconciliation for the interpreter wellness dashboard.
//!
//! Assessments are pulled from exactly one origin per query (hosted store,
//! device-local cache, or a best-effort derivation from reflection history),
//! normalized into [`models::BurnoutRecord`], collapsed to one record per day,
//! windowed, and rolled up into [`models::AggregatedBucket`]s.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod dedupe;
pub mod errors;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod report;
pub mod risk;
pub mod sources;
pub mod trend;
pub mod watch;
pub mod window;

pub use models::{
    AggregatedBucket, BurnoutRecord, Granularity, LookbackWindow, RiskLevel, SourceOrigin,
    SourceTag, TrendResult, UserContext,
};
pub use trend::{ReconciliationMode, TrendQuery, TrendService};
