use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::errors::SourceError;
use crate::models::ReflectionEntry;
use crate::normalize::LooseAssessment;
use crate::sources::credentials::Credential;

pub const ASSESSMENT_NOTIFY_CHANNEL: &str = "assessment_saved";

/// Pool that only connects on first use, so anonymous runs never touch the network.
pub fn lazy_pool(database_url: &str, acquire_timeout: Duration) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)
}

pub async fn fetch_assessments(
    pool: &PgPool,
    credential: &Credential,
    since_date: NaiveDate,
    limit: i64,
) -> Result<Vec<LooseAssessment>, SourceError> {
    let claims = json!({ "sub": credential.subject, "role": "authenticated" });
    let headers = json!({ "authorization": format!("Bearer {}", credential.access_token) });

    let mut tx = pool.begin().await?;

    sqlx::query(
        "SELECT set_config('request.jwt.claims', $1, true), \
         set_config('request.headers', $2, true)",
    )
    .bind(claims.to_string())
    .bind(headers.to_string())
    .execute(&mut *tx)
    .await?;

    let rows = sqlx::query(
        r#"
        SELECT to_jsonb(a) AS assessment
        FROM burnout_assessments a
        WHERE a.user_id = $1 AND a.assessment_date >= $2
        ORDER BY a.assessment_date DESC
        LIMIT $3
        "#,
    )
    .bind(credential.subject)
    .bind(since_date)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    let mut assessments = Vec::with_capacity(rows.len());
    for row in rows {
        assessments.push(assessment_from_json(row.try_get("assessment")?)?);
    }

    Ok(assessments)
}

pub async fn fetch_reflections(
    pool: &PgPool,
    user_id: Uuid,
    kinds: &[&str],
    limit: i64,
) -> Result<Vec<ReflectionEntry>, SourceError> {
    let rows = sqlx::query(
        r#"
        SELECT entry_kind, data, created_at
        FROM reflection_entries
        WHERE user_id = $1 AND entry_kind = ANY($2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(kinds)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(ReflectionEntry {
            entry_kind: row.try_get("entry_kind")?,
            data: column::<serde_json::Value>(&row, "data").unwrap_or(serde_json::Value::Null),
            created_at: row.try_get("created_at")?,
        });
    }

    Ok(entries)
}

/// Rows come back as `to_jsonb`, so NUMERIC and timestamp columns arrive as
/// plain JSON and whichever columns this schema era has are read by name.
pub fn assessment_from_json(row: serde_json::Value) -> Result<LooseAssessment, SourceError> {
    serde_json::from_value(row).map_err(|err| SourceError::parse("assessment row", err))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Option<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(name).ok().flatten()
}
