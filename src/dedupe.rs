use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::BurnoutRecord;

/// Keeps one record per calendar day: the one with the latest timestamp.
///
/// On equal timestamps the record seen first stays. Output is ascending by date.
pub fn dedupe_by_day(records: Vec<BurnoutRecord>) -> Vec<BurnoutRecord> {
    let mut winners: HashMap<NaiveDate, BurnoutRecord> = HashMap::new();

    for record in records {
        match winners.get(&record.date) {
            Some(current) if current.timestamp >= record.timestamp => {}
            _ => {
                winners.insert(record.date, record);
            }
        }
    }

    let mut deduped: Vec<BurnoutRecord> = winners.into_values().collect();
    deduped.sort_by_key(|record| record.date);
    deduped
}
