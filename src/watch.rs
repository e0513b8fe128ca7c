//! Re-runs the whole pipeline on discrete triggers and publishes the newest result.
//!
//! Triggers are handled one at a time, in arrival order. Each one recomputes from
//! fresh inputs; nothing from a previous pass is patched or reused.

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Granularity, TrendResult, UserContext};
use crate::trend::{ReconciliationMode, TrendQuery, TrendService};

/// What the dashboard is currently looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendView {
    pub lookback_days: i64,
    pub granularity: Granularity,
    pub mode: ReconciliationMode,
}

impl TrendView {
    fn query(&self) -> TrendQuery {
        let mut query = TrendQuery::new(self.lookback_days, self.granularity);
        query.mode = self.mode;
        query.as_of = Utc::now();
        query
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    AssessmentSaved,
    IdentityChanged(UserContext),
    ViewChanged(TrendView),
}

/// Computes once up front, then once per trigger until the trigger channel closes.
/// Returns the number of passes made.
pub async fn run(
    service: &TrendService,
    mut ctx: UserContext,
    mut view: TrendView,
    mut triggers: mpsc::Receiver<Trigger>,
    results: watch::Sender<Option<TrendResult>>,
) -> usize {
    let mut passes = 0;
    publish(service, &ctx, &view, &results).await;
    passes += 1;

    while let Some(trigger) = triggers.recv().await {
        debug!(?trigger, "trend trigger received");
        match trigger {
            Trigger::AssessmentSaved => {}
            Trigger::IdentityChanged(next) => ctx = next,
            Trigger::ViewChanged(next) => view = next,
        }
        publish(service, &ctx, &view, &results).await;
        passes += 1;
    }

    info!(passes, "trigger channel closed; trend watch finished");
    passes
}

/// Whether an `assessment_saved` notification payload concerns `ctx`.
/// Payloads that are empty or not a user id apply to everyone.
pub fn notification_applies(payload: &str, ctx: &UserContext) -> bool {
    match payload.trim().parse::<Uuid>() {
        Ok(user_id) => ctx.user_id == Some(user_id),
        Err(_) => true,
    }
}

async fn publish(
    service: &TrendService,
    ctx: &UserContext,
    view: &TrendView,
    results: &watch::Sender<Option<TrendResult>>,
) {
    let result = service.get_trend(ctx, &view.query()).await;
    results.send_replace(Some(result));
}
