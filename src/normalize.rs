//! Raw assessment shapes and their mapping into [`BurnoutRecord`].
//!
//! Sources emit a [`LooseAssessment`], which is classified exactly once into a
//! [`RawAssessment`] variant. Each variant has its own normalizer.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::SourceError;
use crate::models::{BurnoutRecord, SourceOrigin};
use crate::risk;

pub const DEFAULT_METRIC: u8 = 3;
pub const DEFAULT_TOTAL_SCORE: f64 = 5.0;
pub const MAX_TOTAL_SCORE: f64 = 10.0;

/// Date and time strings exactly as the source provided them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    pub day: Option<String>,
    pub instant: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreFields {
    pub total_score: Option<f64>,
    pub burnout_score: Option<f64>,
    pub score: Option<f64>,
}

impl ScoreFields {
    /// The first finite score in `total_score`, `burnout_score`, `score` order.
    pub fn first(&self) -> Option<f64> {
        [self.total_score, self.burnout_score, self.score]
            .into_iter()
            .flatten()
            .find(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricFields {
    pub energy_tank: Option<f64>,
    pub recovery_speed: Option<f64>,
    pub emotional_leakage: Option<f64>,
    pub performance_signal: Option<f64>,
    pub tomorrow_readiness: Option<f64>,
}

impl MetricFields {
    pub fn any(&self) -> bool {
        self.values().iter().any(Option::is_some)
    }

    fn values(&self) -> [Option<f64>; 5] {
        [
            self.energy_tank,
            self.recovery_speed,
            self.emotional_leakage,
            self.performance_signal,
            self.tomorrow_readiness,
        ]
    }

    /// Fills gaps in `self` from `other`.
    fn or(self, other: MetricFields) -> MetricFields {
        MetricFields {
            energy_tank: self.energy_tank.or(other.energy_tank),
            recovery_speed: self.recovery_speed.or(other.recovery_speed),
            emotional_leakage: self.emotional_leakage.or(other.emotional_leakage),
            performance_signal: self.performance_signal.or(other.performance_signal),
            tomorrow_readiness: self.tomorrow_readiness.or(other.tomorrow_readiness),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymptomsBlob {
    Encoded(String),
    Structured(Map<String, Value>),
}

impl SymptomsBlob {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Encoded(text)),
            Value::Object(map) => Some(Self::Structured(map)),
            _ => None,
        }
    }

    fn metrics(&self) -> Result<MetricFields, SourceError> {
        let owned;
        let map = match self {
            Self::Structured(map) => map,
            Self::Encoded(text) => {
                owned = match serde_json::from_str::<Value>(text) {
                    Ok(Value::Object(map)) => map,
                    Ok(other) => {
                        return Err(SourceError::parse(
                            "symptoms blob",
                            format!("expected an object, found {other}"),
                        ))
                    }
                    Err(err) => return Err(SourceError::parse("symptoms blob", err)),
                };
                &owned
            }
        };

        Ok(MetricFields {
            energy_tank: lookup_number(map, &["energy_tank", "energyTank"]),
            recovery_speed: lookup_number(map, &["recovery_speed", "recoverySpeed"]),
            emotional_leakage: lookup_number(map, &["emotional_leakage", "emotionalLeakage"]),
            performance_signal: lookup_number(map, &["performance_signal", "performanceSignal"]),
            tomorrow_readiness: lookup_number(map, &["tomorrow_readiness", "tomorrowReadiness"]),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnarAssessment {
    pub capture: Capture,
    pub scores: ScoreFields,
    pub metrics: MetricFields,
    /// Secondary source for metrics the columns leave empty.
    pub symptoms: Option<SymptomsBlob>,
    pub risk_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlobAssessment {
    pub capture: Capture,
    pub scores: ScoreFields,
    pub symptoms: SymptomsBlob,
    pub risk_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimalAssessment {
    pub capture: Capture,
    pub score: Option<f64>,
    pub risk_label: Option<String>,
}

/// The three shapes the same logical assessment has taken over time.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAssessment {
    Columnar(ColumnarAssessment),
    Blob(BlobAssessment),
    Minimal(MinimalAssessment),
}

/// Field bag accepting either naming style, numbers or numeric strings.
///
/// A field present under several names takes the first readable one, in the
/// order the `From<Map>` impl lists them; the rest are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct LooseAssessment {
    pub date: Option<String>,
    pub created_at: Option<String>,
    pub total_score: Option<f64>,
    pub burnout_score: Option<f64>,
    pub score: Option<f64>,
    pub energy_tank: Option<f64>,
    pub recovery_speed: Option<f64>,
    pub emotional_leakage: Option<f64>,
    pub performance_signal: Option<f64>,
    pub tomorrow_readiness: Option<f64>,
    pub symptoms: Option<Value>,
    pub risk_level: Option<String>,
}

impl From<Map<String, Value>> for LooseAssessment {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            date: lookup_text(&map, &["assessment_date", "assessmentDate", "date"]),
            created_at: lookup_instant(&map, &["created_at", "createdAt", "timestamp"]),
            total_score: lookup_number(&map, &["total_score", "totalScore"]),
            burnout_score: lookup_number(&map, &["burnout_score", "burnoutScore"]),
            score: lookup_number(&map, &["score"]),
            energy_tank: lookup_number(&map, &["energy_tank", "energyTank"]),
            recovery_speed: lookup_number(&map, &["recovery_speed", "recoverySpeed"]),
            emotional_leakage: lookup_number(&map, &["emotional_leakage", "emotionalLeakage"]),
            performance_signal: lookup_number(&map, &["performance_signal", "performanceSignal"]),
            tomorrow_readiness: lookup_number(&map, &["tomorrow_readiness", "tomorrowReadiness"]),
            symptoms: map.get("symptoms").filter(|value| !value.is_null()).cloned(),
            risk_level: lookup_text(&map, &["risk_level", "riskLevel", "risk"]),
        }
    }
}

impl LooseAssessment {
    /// Picks the variant: metric columns win, then a symptoms blob, else minimal.
    pub fn into_raw(self) -> RawAssessment {
        let capture = Capture {
            day: self.date,
            instant: self.created_at,
        };
        let metrics = MetricFields {
            energy_tank: self.energy_tank,
            recovery_speed: self.recovery_speed,
            emotional_leakage: self.emotional_leakage,
            performance_signal: self.performance_signal,
            tomorrow_readiness: self.tomorrow_readiness,
        };
        let scores = ScoreFields {
            total_score: self.total_score,
            burnout_score: self.burnout_score,
            score: self.score,
        };
        let symptoms = self.symptoms.and_then(SymptomsBlob::from_value);

        if metrics.any() {
            return RawAssessment::Columnar(ColumnarAssessment {
                capture,
                scores,
                metrics,
                symptoms,
                risk_label: self.risk_level,
            });
        }

        match symptoms {
            Some(symptoms) => RawAssessment::Blob(BlobAssessment {
                capture,
                scores,
                symptoms,
                risk_label: self.risk_level,
            }),
            None => RawAssessment::Minimal(MinimalAssessment {
                capture,
                score: scores.first(),
                risk_label: self.risk_level,
            }),
        }
    }
}

pub(crate) fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

pub(crate) fn lookup_number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(number_from_value))
}

pub(crate) fn lookup_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

/// Instants as text, or as epoch milliseconds rendered to RFC 3339.
fn lookup_instant(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(millis) => millis
            .as_i64()
            .or_else(|| millis.as_f64().filter(|value| value.is_finite()).map(|value| value as i64))
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|instant| instant.to_rfc3339()),
        _ => None,
    })
}

pub fn normalize(raw: &RawAssessment, origin: SourceOrigin) -> Result<BurnoutRecord, SourceError> {
    match raw {
        RawAssessment::Columnar(columnar) => normalize_columnar(columnar, origin),
        RawAssessment::Blob(blob) => normalize_blob(blob, origin),
        RawAssessment::Minimal(minimal) => normalize_minimal(minimal, origin),
    }
}

fn normalize_columnar(
    raw: &ColumnarAssessment,
    origin: SourceOrigin,
) -> Result<BurnoutRecord, SourceError> {
    let fallback = raw
        .symptoms
        .as_ref()
        .map(blob_metrics_or_default)
        .unwrap_or_default();
    let metrics = raw.metrics.or(fallback);
    build_record(
        &raw.capture,
        raw.scores,
        metrics,
        raw.risk_label.as_deref(),
        origin,
    )
}

fn normalize_blob(raw: &BlobAssessment, origin: SourceOrigin) -> Result<BurnoutRecord, SourceError> {
    let metrics = blob_metrics_or_default(&raw.symptoms);
    build_record(
        &raw.capture,
        raw.scores,
        metrics,
        raw.risk_label.as_deref(),
        origin,
    )
}

fn normalize_minimal(
    raw: &MinimalAssessment,
    origin: SourceOrigin,
) -> Result<BurnoutRecord, SourceError> {
    let scores = ScoreFields {
        total_score: raw.score,
        ..ScoreFields::default()
    };
    build_record(
        &raw.capture,
        scores,
        MetricFields::default(),
        raw.risk_label.as_deref(),
        origin,
    )
}

fn blob_metrics_or_default(blob: &SymptomsBlob) -> MetricFields {
    blob.metrics().unwrap_or_else(|err| {
        warn!(error = %err, "symptoms blob unreadable; using default metrics");
        MetricFields::default()
    })
}

fn build_record(
    capture: &Capture,
    scores: ScoreFields,
    metrics: MetricFields,
    risk_label: Option<&str>,
    origin: SourceOrigin,
) -> Result<BurnoutRecord, SourceError> {
    let (date, timestamp) = resolve_capture(capture)?;
    let total_score = resolve_total_score(scores, &metrics);
    let risk_level = risk_label
        .and_then(risk::parse_label)
        .unwrap_or_default();

    Ok(BurnoutRecord {
        energy_tank: to_scale(metrics.energy_tank),
        recovery_speed: to_scale(metrics.recovery_speed),
        emotional_leakage: to_scale(metrics.emotional_leakage),
        performance_signal: to_scale(metrics.performance_signal),
        tomorrow_readiness: to_scale(metrics.tomorrow_readiness),
        total_score,
        risk_level,
        date,
        timestamp,
        source_origin: origin,
    })
}

/// `total_score`, `burnout_score`, then `score`; then the sub-metrics, then the default.
pub fn resolve_total_score(scores: ScoreFields, metrics: &MetricFields) -> f64 {
    let score = scores
        .first()
        .or_else(|| derive_from_metrics(metrics))
        .unwrap_or(DEFAULT_TOTAL_SCORE);
    score.clamp(0.0, MAX_TOTAL_SCORE)
}

fn derive_from_metrics(metrics: &MetricFields) -> Option<f64> {
    if !metrics.any() {
        return None;
    }
    let sum: f64 = metrics
        .values()
        .iter()
        .map(|value| f64::from(to_scale(*value)))
        .sum();
    Some((sum - 5.0) / 20.0 * MAX_TOTAL_SCORE)
}

fn to_scale(value: Option<f64>) -> u8 {
    match value {
        Some(value) if value.is_finite() => value.round().clamp(1.0, 5.0) as u8,
        _ => DEFAULT_METRIC,
    }
}

fn resolve_capture(capture: &Capture) -> Result<(NaiveDate, DateTime<Utc>), SourceError> {
    let instant = capture.instant.as_deref().and_then(parse_instant);
    let date = capture
        .day
        .as_deref()
        .and_then(leading_date)
        .or_else(|| capture.instant.as_deref().and_then(leading_date))
        .ok_or_else(|| {
            SourceError::parse("capture date", format!("{:?} / {:?}", capture.day, capture.instant))
        })?;
    let timestamp = instant.unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc());
    Ok((date, timestamp))
}

/// The `YYYY-MM-DD` prefix, read as text so no offset can move the day.
pub fn leading_date(text: &str) -> Option<NaiveDate> {
    let prefix = text.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}
