use chrono::{DateTime, Utc};

use crate::models::BurnoutRecord;
use crate::risk;

/// Drops records captured before `now - lookback_days`. Order is preserved.
pub fn filter_by_window(
    records: Vec<BurnoutRecord>,
    lookback_days: i64,
    now: DateTime<Utc>,
) -> Vec<BurnoutRecord> {
    let cutoff = risk::cutoff_instant(now, lookback_days);
    records
        .into_iter()
        .filter(|record| record.timestamp >= cutoff)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskLevel, SourceOrigin};
    use chrono::{Duration, NaiveDate};

    fn record_on(day: &str) -> BurnoutRecord {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        BurnoutRecord {
            energy_tank: 3,
            recovery_speed: 3,
            emotional_leakage: 3,
            performance_signal: 3,
            tomorrow_readiness: 3,
            total_score: 5.0,
            risk_level: RiskLevel::Moderate,
            date,
            timestamp: date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            source_origin: SourceOrigin::DeviceLocal,
        }
    }

    fn now() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn week_window_drops_eight_day_old_records() {
        let records = vec![record_on("2024-03-02"), record_on("2024-03-05")];
        let kept = filter_by_window(records, 7, now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn cutoff_boundary_is_inclusive() {
        let kept = filter_by_window(vec![record_on("2024-03-03")], 7, now());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn nothing_older_than_cutoff_survives() {
        let records: Vec<BurnoutRecord> = (0..120)
            .map(|days| {
                let day = now().date_naive() - Duration::days(days);
                record_on(&day.format("%Y-%m-%d").to_string())
            })
            .collect();

        for lookback in [7, 30, 90] {
            let cutoff = now() - Duration::days(lookback);
            let kept = filter_by_window(records.clone(), lookback, now());
            assert!(kept.iter().all(|record| record.timestamp >= cutoff));
            assert_eq!(kept.len(), lookback as usize + 1);
        }
    }

    #[test]
    fn order_is_preserved() {
        let records = vec![record_on("2024-03-09"), record_on("2024-03-06")];
        let kept = filter_by_window(records, 30, now());
        assert_eq!(kept[0].date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(kept[1].date, NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
    }
}
