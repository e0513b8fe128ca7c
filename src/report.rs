use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AggregatedBucket, BurnoutRecord, Granularity, RiskMixSummary, TrendResult};

pub fn summarize_by_risk(records: &[BurnoutRecord]) -> Vec<RiskMixSummary> {
    let mut map: std::collections::HashMap<crate::models::RiskLevel, (usize, f64)> =
        std::collections::HashMap::new();

    for record in records {
        let entry = map.entry(record.risk_level).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.total_score;
    }

    let mut summaries: Vec<RiskMixSummary> = map
        .into_iter()
        .map(|(risk_level, (count, total_score))| RiskMixSummary {
            risk_level,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.risk_level.as_str().cmp(b.risk_level.as_str()))
    });
    summaries
}

fn granularity_label(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Daily => "daily",
        Granularity::Weekly => "weekly",
        Granularity::Monthly => "monthly",
    }
}

pub fn build_report(
    user_label: Option<&str>,
    lookback_days: i64,
    cutoff: NaiveDate,
    granularity: Granularity,
    trend: &TrendResult,
    records: &[BurnoutRecord],
) -> String {
    let summaries = summarize_by_risk(records);

    let mut output = String::new();
    let user_label = user_label.unwrap_or("this device");

    let _ = writeln!(output, "# Burnout Trend Report");
    let _ = writeln!(
        output,
        "Generated for {} (last {} days, since {}, {} buckets)",
        user_label,
        lookback_days,
        cutoff,
        granularity_label(granularity)
    );
    let _ = writeln!(output, "Source: {}", trend.source_used);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");

    if trend.buckets.is_empty() {
        let _ = writeln!(output, "No assessments recorded for this window.");
    } else {
        let _ = writeln!(output, "| Period | Score | Risk | Assessments |");
        let _ = writeln!(output, "|---|---|---|---|");
        for bucket in trend.buckets.iter() {
            let _ = writeln!(output, "{}", bucket_row(bucket));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No assessments recorded for this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} assessments (avg score {:.1})",
                summary.risk_level, summary.count, summary.avg_score
            );
        }
    }

    let mut recent = records.to_vec();
    recent.sort_by(|a, b| b.date.cmp(&a.date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Check-ins");

    if recent.is_empty() {
        let _ = writeln!(output, "No assessments recorded for this window.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: score {:.1} ({}) energy {}/5, recovery {}/5, readiness {}/5",
                record.date,
                record.total_score,
                record.risk_level,
                record.energy_tank,
                record.recovery_speed,
                record.tomorrow_readiness
            );
        }
    }

    output
}

fn bucket_row(bucket: &AggregatedBucket) -> String {
    format!(
        "| {} | {:.1} | {} | {} |",
        bucket.period_key, bucket.total_score, bucket.risk_level, bucket.count
    )
}

pub fn write_csv<W: std::io::Write>(writer: W, buckets: &[AggregatedBucket]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for bucket in buckets {
        csv.serialize(bucket)?;
    }
    csv.flush()?;
    Ok(())
}
