//! The reconciliation façade.
//!
//! A query picks a plan (an ordered list of adapters) from the caller's
//! authentication state and mode, then walks it in one loop:
//!
//! * an authoritative step ends the walk with whatever it produced, empty or failed;
//! * a non-authoritative step ends it only when it yields records.
//!
//! Results from different origins are never merged. Failures never escape:
//! the caller always gets a (possibly empty) bucket list plus a [`SourceTag`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::dedupe::dedupe_by_day;
use crate::errors::FailureReason;
use crate::models::{
    BurnoutRecord, Granularity, LookbackWindow, ReconciledRecords, SourceOrigin, SourceStatus,
    SourceTag, TrendResult, UserContext,
};
use crate::normalize::normalize;
use crate::sources::{SourceAdapter, SourceBatch};
use crate::window::filter_by_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconciliationMode {
    #[default]
    Default,
    /// Approximate from reflection history instead of assessments.
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendQuery {
    pub lookback_days: i64,
    pub granularity: Granularity,
    pub mode: ReconciliationMode,
    pub as_of: DateTime<Utc>,
}

impl TrendQuery {
    pub fn new(lookback_days: i64, granularity: Granularity) -> Self {
        Self {
            lookback_days,
            granularity,
            mode: ReconciliationMode::Default,
            as_of: Utc::now(),
        }
    }

    pub fn for_window(window: LookbackWindow, granularity: Granularity) -> Self {
        Self::new(window.days(), granularity)
    }

    pub fn best_effort(mut self) -> Self {
        self.mode = ReconciliationMode::BestEffort;
        self
    }

    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }
}

#[derive(Clone)]
pub struct FallbackStep {
    pub origin: SourceOrigin,
    pub adapter: Option<Arc<dyn SourceAdapter>>,
    pub authoritative: bool,
}

impl FallbackStep {
    pub fn authoritative(origin: SourceOrigin, adapter: Option<Arc<dyn SourceAdapter>>) -> Self {
        Self {
            origin,
            adapter,
            authoritative: true,
        }
    }

    pub fn tentative(origin: SourceOrigin, adapter: Option<Arc<dyn SourceAdapter>>) -> Self {
        Self {
            origin,
            adapter,
            authoritative: false,
        }
    }
}

#[derive(Clone)]
pub struct TrendService {
    remote: Option<Arc<dyn SourceAdapter>>,
    local: Arc<dyn SourceAdapter>,
    derived: Option<Arc<dyn SourceAdapter>>,
}

impl TrendService {
    pub fn new(local: Arc<dyn SourceAdapter>) -> Self {
        Self {
            remote: None,
            local,
            derived: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn SourceAdapter>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_derivation(mut self, derived: Arc<dyn SourceAdapter>) -> Self {
        self.derived = Some(derived);
        self
    }

    pub fn plan_for(&self, ctx: &UserContext, mode: ReconciliationMode) -> Vec<FallbackStep> {
        match mode {
            ReconciliationMode::BestEffort => vec![FallbackStep::authoritative(
                SourceOrigin::Derived,
                self.derived.clone(),
            )],
            ReconciliationMode::Default if ctx.is_authenticated() => vec![
                FallbackStep::authoritative(SourceOrigin::Remote, self.remote.clone()),
            ],
            ReconciliationMode::Default => vec![FallbackStep::authoritative(
                SourceOrigin::DeviceLocal,
                Some(self.local.clone()),
            )],
        }
    }

    pub async fn get_trend(&self, ctx: &UserContext, query: &TrendQuery) -> TrendResult {
        self.trend_with_records(ctx, query).await.0
    }

    /// The trend plus the records it was rolled up from, for callers that show both.
    pub async fn trend_with_records(
        &self,
        ctx: &UserContext,
        query: &TrendQuery,
    ) -> (TrendResult, Vec<BurnoutRecord>) {
        let reconciled = self.reconcile_records(ctx, query).await;
        let trend = TrendResult {
            buckets: aggregate(&reconciled.records, query.granularity),
            source_used: reconciled.source_used,
        };
        (trend, reconciled.records)
    }

    /// Deduplicated, windowed records from the one origin the plan settled on,
    /// ascending by date.
    pub async fn reconcile_records(&self, ctx: &UserContext, query: &TrendQuery) -> ReconciledRecords {
        let plan = self.plan_for(ctx, query.mode);
        let (batch, source_used) = run_plan(&plan, ctx, query).await;
        let records = batch.map(|batch| prepare(batch, query)).unwrap_or_default();

        info!(
            source = %source_used,
            records = records.len(),
            lookback_days = query.lookback_days,
            "reconciled burnout records"
        );

        ReconciledRecords {
            records,
            source_used,
        }
    }
}

/// Walks `plan` and returns the batch it settles on, if any, with its tag.
pub async fn run_plan(
    plan: &[FallbackStep],
    ctx: &UserContext,
    query: &TrendQuery,
) -> (Option<SourceBatch>, SourceTag) {
    let mut last_tag = SourceTag {
        origin: plan
            .first()
            .map(|step| step.origin)
            .unwrap_or(SourceOrigin::DeviceLocal),
        status: SourceStatus::Failed(FailureReason::Unconfigured),
    };

    for step in plan {
        let outcome = match &step.adapter {
            Some(adapter) => adapter.fetch(ctx, query.lookback_days, query.as_of).await,
            None => {
                warn!(origin = %step.origin, "no adapter configured for plan step");
                last_tag = SourceTag {
                    origin: step.origin,
                    status: SourceStatus::Failed(FailureReason::Unconfigured),
                };
                if step.authoritative {
                    break;
                }
                continue;
            }
        };

        match outcome {
            Ok(batch) if !batch.records.is_empty() => {
                let tag = SourceTag {
                    origin: step.origin,
                    status: SourceStatus::Fresh,
                };
                return (Some(batch), tag);
            }
            Ok(_) => {
                debug!(origin = %step.origin, "source returned no rows");
                last_tag = SourceTag {
                    origin: step.origin,
                    status: SourceStatus::Empty,
                };
            }
            Err(err) => {
                warn!(origin = %step.origin, reason = %err.reason(), error = %err, "source failed");
                last_tag = SourceTag {
                    origin: step.origin,
                    status: SourceStatus::Failed(err.reason()),
                };
            }
        }

        if step.authoritative {
            break;
        }
    }

    (None, last_tag)
}

fn prepare(batch: SourceBatch, query: &TrendQuery) -> Vec<BurnoutRecord> {
    let mut normalized = Vec::with_capacity(batch.records.len());
    for raw in &batch.records {
        match normalize(raw, batch.origin) {
            Ok(record) => normalized.push(record),
            Err(err) => warn!(origin = %batch.origin, error = %err, "dropping unreadable record"),
        }
    }

    let deduped = dedupe_by_day(normalized);
    let mut records = filter_by_window(deduped, query.lookback_days, query.as_of);
    records.sort_by(|a, b| a.date.cmp(&b.date).then(a.timestamp.cmp(&b.timestamp)));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use crate::normalize::LooseAssessment;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    enum Behaviour {
        Rows(Vec<serde_json::Value>),
        Fail(fn() -> SourceError),
    }

    struct FakeAdapter {
        origin: SourceOrigin,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeAdapter {
        fn rows(origin: SourceOrigin, rows: Vec<serde_json::Value>) -> Arc<Self> {
            Arc::new(Self {
                origin,
                behaviour: Behaviour::Rows(rows),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(origin: SourceOrigin, err: fn() -> SourceError) -> Arc<Self> {
            Arc::new(Self {
                origin,
                behaviour: Behaviour::Fail(err),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn origin(&self) -> SourceOrigin {
            self.origin
        }

        async fn fetch(
            &self,
            _ctx: &UserContext,
            _lookback_days: i64,
            _as_of: DateTime<Utc>,
        ) -> Result<SourceBatch, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Rows(rows) => Ok(SourceBatch {
                    records: rows
                        .iter()
                        .map(|row| {
                            serde_json::from_value::<LooseAssessment>(row.clone())
                                .unwrap()
                                .into_raw()
                        })
                        .collect(),
                    origin: self.origin,
                }),
                Behaviour::Fail(err) => Err(err()),
            }
        }
    }

    fn as_of() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn signed_in() -> UserContext {
        UserContext::authenticated(Uuid::new_v4())
    }

    fn cached_rows() -> Vec<serde_json::Value> {
        vec![
            json!({ "date": "2024-03-08", "totalScore": 6, "riskLevel": "low" }),
            json!({ "date": "2024-03-09", "totalScore": 4, "riskLevel": "moderate" }),
        ]
    }

    #[tokio::test]
    async fn same_day_remote_rows_collapse_to_latest() {
        let remote = FakeAdapter::rows(
            SourceOrigin::Remote,
            vec![
                json!({ "assessment_date": "2024-03-01", "created_at": "2024-03-01T09:00:00Z", "total_score": 3 }),
                json!({ "assessment_date": "2024-03-01", "created_at": "2024-03-01T14:00:00Z", "total_score": 7 }),
            ],
        );
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, Vec::new());
        let service = TrendService::new(local).with_remote(remote);
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let reconciled = service.reconcile_records(&signed_in(), &query).await;
        assert_eq!(reconciled.records.len(), 1);
        assert_eq!(reconciled.records[0].total_score, 7.0);
        assert_eq!(reconciled.source_used.to_string(), "remote");
    }

    #[tokio::test]
    async fn remote_schema_failure_never_consults_device_local() {
        let remote = FakeAdapter::failing(SourceOrigin::Remote, || SourceError::Schema {
            details: "relation \"burnout_assessments\" does not exist".into(),
        });
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local.clone()).with_remote(remote.clone());
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let result = service.get_trend(&signed_in(), &query).await;
        assert!(result.buckets.is_empty());
        assert_eq!(
            result.source_used,
            SourceTag {
                origin: SourceOrigin::Remote,
                status: SourceStatus::Failed(FailureReason::TableMissing),
            }
        );
        assert_eq!(remote.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn empty_remote_is_reported_as_remote_empty() {
        let remote = FakeAdapter::rows(SourceOrigin::Remote, Vec::new());
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local.clone()).with_remote(remote);
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let result = service.get_trend(&signed_in(), &query).await;
        assert!(result.buckets.is_empty());
        assert_eq!(result.source_used.to_string(), "remote, empty");
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn anonymous_callers_only_use_device_local() {
        let remote = FakeAdapter::rows(SourceOrigin::Remote, cached_rows());
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local.clone()).with_remote(remote.clone());
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let result = service.get_trend(&UserContext::anonymous(), &query).await;
        assert_eq!(result.buckets.len(), 2);
        assert_eq!(result.source_used.origin, SourceOrigin::DeviceLocal);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn best_effort_uses_only_the_derivation_path() {
        let remote = FakeAdapter::rows(SourceOrigin::Remote, cached_rows());
        let derived = FakeAdapter::rows(
            SourceOrigin::Derived,
            vec![json!({ "date": "2024-03-07", "energy_tank": 4 })],
        );
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local)
            .with_remote(remote.clone())
            .with_derivation(derived);
        let query = TrendQuery::new(30, Granularity::Daily)
            .as_of(as_of())
            .best_effort();

        let result = service.get_trend(&signed_in(), &query).await;
        assert_eq!(result.buckets.len(), 1);
        assert_eq!(result.source_used.origin, SourceOrigin::Derived);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn missing_adapter_is_tagged_unconfigured() {
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local);
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let result = service.get_trend(&signed_in(), &query).await;
        assert!(result.buckets.is_empty());
        assert_eq!(result.source_used.to_string(), "remote, failed: unconfigured");
    }

    #[tokio::test]
    async fn tentative_steps_fall_through_but_never_merge() {
        let first = FakeAdapter::rows(SourceOrigin::DeviceLocal, Vec::new());
        let second = FakeAdapter::failing(SourceOrigin::Derived, || SourceError::Other {
            details: "offline".into(),
        });
        let third = FakeAdapter::rows(SourceOrigin::Remote, cached_rows());
        let fourth = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let plan = vec![
            FallbackStep::tentative(SourceOrigin::DeviceLocal, Some(first.clone())),
            FallbackStep::tentative(SourceOrigin::Derived, Some(second.clone())),
            FallbackStep::tentative(SourceOrigin::Remote, Some(third.clone())),
            FallbackStep::tentative(SourceOrigin::DeviceLocal, Some(fourth.clone())),
        ];
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let (batch, tag) = run_plan(&plan, &signed_in(), &query).await;
        let batch = batch.unwrap();
        assert_eq!(batch.origin, SourceOrigin::Remote);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(tag.status, SourceStatus::Fresh);
        assert_eq!(
            [first.calls(), second.calls(), third.calls(), fourth.calls()],
            [1, 1, 1, 0]
        );
    }

    #[tokio::test]
    async fn authoritative_step_stops_the_walk_even_when_empty() {
        let first = FakeAdapter::rows(SourceOrigin::Remote, Vec::new());
        let second = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let plan = vec![
            FallbackStep::authoritative(SourceOrigin::Remote, Some(first)),
            FallbackStep::tentative(SourceOrigin::DeviceLocal, Some(second.clone())),
        ];
        let query = TrendQuery::new(30, Granularity::Daily).as_of(as_of());

        let (batch, tag) = run_plan(&plan, &signed_in(), &query).await;
        assert!(batch.is_none());
        assert_eq!(tag.status, SourceStatus::Empty);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn window_and_monthly_rollup_apply_after_dedupe() {
        let local = FakeAdapter::rows(
            SourceOrigin::DeviceLocal,
            vec![
                json!({ "date": "2024-03-02", "totalScore": 2 }),
                json!({ "date": "2024-03-05", "totalScore": 4 }),
                json!({ "date": "2024-03-08", "totalScore": 6 }),
                json!({ "date": "2024-01-02", "totalScore": 9 }),
            ],
        );
        let service = TrendService::new(local);
        let query = TrendQuery::new(30, Granularity::Monthly).as_of(as_of());

        let result = service.get_trend(&UserContext::anonymous(), &query).await;
        assert_eq!(result.buckets.len(), 1);
        assert_eq!(result.buckets[0].total_score, 4.0);
        assert_eq!(result.buckets[0].count, 3);
    }

    #[tokio::test]
    async fn oversized_lookback_keeps_every_record() {
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local);

        for lookback in [200_000_000, i64::MAX] {
            let query = TrendQuery::new(lookback, Granularity::Daily).as_of(as_of());
            let result = service.get_trend(&UserContext::anonymous(), &query).await;
            assert_eq!(result.buckets.len(), 2);
            assert_eq!(result.source_used.to_string(), "device-local");
        }
    }

    #[tokio::test]
    async fn trend_with_records_matches_get_trend() {
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, cached_rows());
        let service = TrendService::new(local);
        let query = TrendQuery::new(30, Granularity::Weekly).as_of(as_of());
        let ctx = UserContext::anonymous();

        let (trend, records) = service.trend_with_records(&ctx, &query).await;
        assert_eq!(trend, service.get_trend(&ctx, &query).await);
        assert_eq!(records.len(), 2);
        assert_eq!(trend.buckets[0].count, records.len());
    }

    #[tokio::test]
    async fn repeated_queries_are_identical() {
        let remote = FakeAdapter::rows(
            SourceOrigin::Remote,
            vec![
                json!({ "assessment_date": "2024-03-03", "total_score": 5, "risk_level": "high" }),
                json!({ "assessment_date": "2024-03-04", "total_score": 3, "risk_level": "low" }),
                json!({ "assessment_date": "2024-03-04", "created_at": "2024-03-04T20:00:00Z", "total_score": 8, "risk_level": "low" }),
                json!({ "assessment_date": "2024-03-09", "total_score": 6, "risk_level": "high" }),
            ],
        );
        let local = FakeAdapter::rows(SourceOrigin::DeviceLocal, Vec::new());
        let service = TrendService::new(local).with_remote(remote);
        let ctx = signed_in();

        for granularity in [Granularity::Daily, Granularity::Weekly, Granularity::Monthly] {
            let query = TrendQuery::new(90, granularity).as_of(as_of());
            let first = service.get_trend(&ctx, &query).await;
            let second = service.get_trend(&ctx, &query).await;
            assert_eq!(first, second);
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
            let total: usize = first.buckets.iter().map(|bucket| bucket.count).sum();
            assert_eq!(total, 3);
        }
    }
}
