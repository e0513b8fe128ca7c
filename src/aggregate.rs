//! Roll-ups of reconciled records into display buckets.
//!
//! Weekly buckets are anchored on the data, not on calendar weeks: a bucket
//! starts at a record and absorbs every later record within seven days of it.
//! Reported trends depend on this, so it stays as is.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{AggregatedBucket, BurnoutRecord, Granularity};
use crate::risk;

const WEEK_SPAN_DAYS: i64 = 7;

pub fn aggregate(records: &[BurnoutRecord], granularity: Granularity) -> Vec<AggregatedBucket> {
    let mut ordered: Vec<&BurnoutRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.date.cmp(&b.date)));

    let mut buckets = match granularity {
        Granularity::Daily => ordered
            .into_iter()
            .map(|record| summarize(record.date, &[record]))
            .collect(),
        Granularity::Weekly => weekly(&ordered),
        Granularity::Monthly => monthly(&ordered),
    };

    buckets.sort_by_key(|bucket| bucket.period_key);
    buckets
}

fn weekly(ordered: &[&BurnoutRecord]) -> Vec<AggregatedBucket> {
    let mut buckets = Vec::new();
    let mut members: Vec<&BurnoutRecord> = Vec::new();

    for &record in ordered {
        if let Some(&anchor) = members.first() {
            if record.timestamp - anchor.timestamp > Duration::days(WEEK_SPAN_DAYS) {
                buckets.push(summarize(anchor.date, &members));
                members.clear();
            }
        }
        members.push(record);
    }

    if let Some(&anchor) = members.first() {
        buckets.push(summarize(anchor.date, &members));
    }
    buckets
}

fn monthly(ordered: &[&BurnoutRecord]) -> Vec<AggregatedBucket> {
    let mut groups: Vec<(NaiveDate, Vec<&BurnoutRecord>)> = Vec::new();

    for &record in ordered {
        let stamp = record.timestamp.date_naive();
        let Some(month_start) = NaiveDate::from_ymd_opt(stamp.year(), stamp.month(), 1) else {
            continue;
        };
        match groups.iter_mut().find(|(key, _)| *key == month_start) {
            Some((_, members)) => members.push(record),
            None => groups.push((month_start, vec![record])),
        }
    }

    groups
        .into_iter()
        .map(|(month_start, members)| summarize(month_start, &members))
        .collect()
}

fn summarize(period_key: NaiveDate, members: &[&BurnoutRecord]) -> AggregatedBucket {
    let count = members.len();
    let total: f64 = members.iter().map(|record| record.total_score).sum();

    AggregatedBucket {
        period_key,
        total_score: if count == 0 { 0.0 } else { total / count as f64 },
        risk_level: risk::modal_risk(members.iter().map(|record| record.risk_level)),
        count,
    }
}
