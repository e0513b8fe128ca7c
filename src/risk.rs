use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::RiskLevel;

pub fn parse_label(label: &str) -> Option<RiskLevel> {
    match label.trim().to_ascii_lowercase().as_str() {
        "low" => Some(RiskLevel::Low),
        "moderate" | "medium" => Some(RiskLevel::Moderate),
        "high" => Some(RiskLevel::High),
        "severe" | "critical" => Some(RiskLevel::Severe),
        _ => None,
    }
}

/// Most frequent level; ties go to whichever level was seen first.
pub fn modal_risk<I>(levels: I) -> RiskLevel
where
    I: IntoIterator<Item = RiskLevel>,
{
    let mut tallies: Vec<(RiskLevel, usize)> = Vec::new();

    for level in levels {
        match tallies.iter_mut().find(|(seen, _)| *seen == level) {
            Some(entry) => entry.1 += 1,
            None => tallies.push((level, 1)),
        }
    }

    let mut winner: Option<(RiskLevel, usize)> = None;
    for (level, count) in tallies {
        if winner.map_or(true, |(_, best)| count > best) {
            winner = Some((level, count));
        }
    }

    winner.map(|(level, _)| level).unwrap_or_default()
}

/// Lookbacks reaching past the calendar's range saturate at its start.
pub fn cutoff_date(today: NaiveDate, lookback_days: i64) -> NaiveDate {
    Duration::try_days(lookback_days.max(0))
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

pub fn cutoff_instant(now: DateTime<Utc>, lookback_days: i64) -> DateTime<Utc> {
    Duration::try_days(lookback_days.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
