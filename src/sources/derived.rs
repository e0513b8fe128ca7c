//! Best-effort assessments approximated from generic reflection entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::DEFAULT_ROW_LIMIT;
use crate::db;
use crate::errors::SourceError;
use crate::models::{ReflectionEntry, SourceOrigin, UserContext};
use crate::normalize::{
    lookup_number, lookup_text, Capture, ColumnarAssessment, MetricFields, MinimalAssessment, RawAssessment,
    ScoreFields, SymptomsBlob,
};
use crate::sources::{SourceAdapter, SourceBatch};

pub const RELEVANT_KINDS: &[&str] = &[
    "burnout_assessment",
    "daily_burnout",
    "wellness_check",
    "post_assignment",
    "stress_reset",
    "end_of_day",
];

const COMPONENT_SCALE: f64 = 1.25;
const COMPONENT_PER_POINT: f64 = 2.5;

pub struct FallbackDerivationAdapter {
    pool: PgPool,
    row_limit: i64,
}

impl FallbackDerivationAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: i64) -> Self {
        self.row_limit = row_limit;
        self
    }
}

#[async_trait]
impl SourceAdapter for FallbackDerivationAdapter {
    fn origin(&self) -> SourceOrigin {
        SourceOrigin::Derived
    }

    async fn fetch(
        &self,
        ctx: &UserContext,
        _lookback_days: i64,
        _as_of: DateTime<Utc>,
    ) -> Result<SourceBatch, SourceError> {
        let user_id = ctx.user_id.ok_or_else(|| SourceError::Auth {
            details: "reflection history requires a signed-in caller".to_string(),
        })?;

        let entries = db::fetch_reflections(&self.pool, user_id, RELEVANT_KINDS, self.row_limit).await?;
        let records: Vec<RawAssessment> = entries.iter().filter_map(derive_assessment).collect();

        info!(
            entries = entries.len(),
            derived = records.len(),
            "derived assessments from reflections"
        );

        Ok(SourceBatch {
            records,
            origin: SourceOrigin::Derived,
        })
    }
}

/// Known assessment fields win; otherwise a stress/energy pair is mapped onto the
/// five-point metrics. Entries with neither yield nothing.
pub fn derive_assessment(entry: &ReflectionEntry) -> Option<RawAssessment> {
    let Some(data) = entry.data.as_object() else {
        debug!(kind = %entry.entry_kind, "reflection data is not an object");
        return None;
    };

    let capture = Capture {
        day: lookup_text(data, &["assessment_date", "assessmentDate", "date"]),
        instant: Some(entry.created_at.to_rfc3339()),
    };
    let risk_label = lookup_text(data, &["risk_level", "riskLevel"]);
    let scores = ScoreFields {
        total_score: lookup_number(data, &["total_score", "totalScore"]),
        burnout_score: lookup_number(data, &["burnout_score", "burnoutScore"]),
        score: lookup_number(data, &["score"]),
    };
    let metrics = MetricFields {
        energy_tank: lookup_number(data, &["energy_tank", "energyTank"]),
        recovery_speed: lookup_number(data, &["recovery_speed", "recoverySpeed"]),
        emotional_leakage: lookup_number(data, &["emotional_leakage", "emotionalLeakage"]),
        performance_signal: lookup_number(data, &["performance_signal", "performanceSignal"]),
        tomorrow_readiness: lookup_number(data, &["tomorrow_readiness", "tomorrowReadiness"]),
    };
    let symptoms = data.get("symptoms").cloned().and_then(SymptomsBlob::from_value);

    if metrics.any() || symptoms.is_some() {
        return Some(RawAssessment::Columnar(ColumnarAssessment {
            capture,
            scores,
            metrics,
            symptoms,
            risk_label,
        }));
    }

    if let Some(score) = scores.first() {
        return Some(RawAssessment::Minimal(MinimalAssessment {
            capture,
            score: Some(score),
            risk_label,
        }));
    }

    let stress = lookup_number(data, &["stress_level", "stressLevel", "stress"])?;
    let energy = lookup_number(data, &["energy_level", "energyLevel", "energy"])?;
    let stress_component = (10.0 - stress) * COMPONENT_SCALE;
    let energy_component = energy * COMPONENT_SCALE;
    let stress_points = stress_component / COMPONENT_PER_POINT;
    let energy_points = energy_component / COMPONENT_PER_POINT;

    Some(RawAssessment::Columnar(ColumnarAssessment {
        capture,
        scores: ScoreFields::default(),
        metrics: MetricFields {
            energy_tank: Some(energy_points),
            recovery_speed: Some(stress_points),
            emotional_leakage: Some(stress_points),
            performance_signal: Some((stress_points + energy_points) / 2.0),
            tomorrow_readiness: Some(energy_points),
        },
        symptoms: None,
        risk_label,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::{json, Value};

    fn entry(data: Value) -> ReflectionEntry {
        ReflectionEntry {
            entry_kind: "wellness_check".to_string(),
            data,
            created_at: DateTime::parse_from_rfc3339("2024-03-05T18:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn stress_energy_pair_uses_linear_transform() {
        let raw = derive_assessment(&entry(json!({ "stress_level": 2, "energy_level": 8 }))).unwrap();
        let record = normalize(&raw, SourceOrigin::Derived).unwrap();

        // stress 2 -> component 10.0 -> 4 points; energy 8 -> component 10.0 -> 4 points
        assert_eq!(record.energy_tank, 4);
        assert_eq!(record.recovery_speed, 4);
        assert_eq!(record.emotional_leakage, 4);
        assert_eq!(record.performance_signal, 4);
        assert_eq!(record.tomorrow_readiness, 4);
        assert_eq!(record.total_score, 7.5);
        assert_eq!(record.date.to_string(), "2024-03-05");
        assert_eq!(record.source_origin, SourceOrigin::Derived);
    }

    #[test]
    fn extreme_stress_clamps_to_scale_floor() {
        let raw = derive_assessment(&entry(json!({ "stressLevel": 10, "energyLevel": 0 }))).unwrap();
        let record = normalize(&raw, SourceOrigin::Derived).unwrap();
        assert_eq!(record.energy_tank, 1);
        assert_eq!(record.recovery_speed, 1);
        assert_eq!(record.total_score, 0.0);
    }

    #[test]
    fn known_metric_fields_take_precedence() {
        let raw = derive_assessment(&entry(json!({
            "energyTank": 2,
            "stress_level": 1,
            "energy_level": 9,
            "riskLevel": "high"
        })))
        .unwrap();
        let record = normalize(&raw, SourceOrigin::Derived).unwrap();
        assert_eq!(record.energy_tank, 2);
        assert_eq!(record.recovery_speed, 3);
        assert_eq!(record.risk_level, crate::models::RiskLevel::High);
    }

    #[test]
    fn score_only_entries_become_minimal() {
        let raw = derive_assessment(&entry(json!({ "burnout_score": "6" }))).unwrap();
        assert!(matches!(raw, RawAssessment::Minimal(_)));
        assert_eq!(normalize(&raw, SourceOrigin::Derived).unwrap().total_score, 6.0);
    }

    #[test]
    fn unrelated_entries_are_skipped() {
        assert!(derive_assessment(&entry(json!({ "notes": "long day" }))).is_none());
        assert!(derive_assessment(&entry(json!({ "stress_level": 4 }))).is_none());
        assert!(derive_assessment(&entry(json!("plain text"))).is_none());
    }

    #[test]
    fn explicit_date_in_data_wins_over_created_at() {
        let raw = derive_assessment(&entry(json!({ "date": "2024-03-04", "total_score": 5 }))).unwrap();
        let record = normalize(&raw, SourceOrigin::Derived).unwrap();
        assert_eq!(record.date.to_string(), "2024-03-04");
    }
}
