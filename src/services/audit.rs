//! Append-only structured event record, written into the caller's
//! transaction without committing it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder, Transaction};

use crate::{
    domain::models::{AuditLog, Role},
    infrastructure::state::AppState,
};

use super::errors::ServiceError;

pub struct AuditEntry<'a> {
    pub actor_id: Option<i64>,
    pub actor_role: Option<Role>,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<i64>,
    pub before_status: Option<&'a str>,
    pub after_status: Option<&'a str>,
    pub project_id: Option<i64>,
    pub metadata: Value,
}

/// Writes one `AuditLog` row into `tx`. The caller owns the transaction
/// boundary; this never commits.
pub async fn record(tx: &mut Transaction<'_, Postgres>, entry: AuditEntry<'_>) -> Result<i64, ServiceError> {
    let normalized = normalize(entry.metadata);
    let now = Utc::now();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO audit_logs
            (actor_id, actor_role, action, entity_type, entity_id, before_status, after_status, project_id, metadata, created_at)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        RETURNING id
        "#,
    )
    .bind(entry.actor_id)
    .bind(entry.actor_role.map(|r| r.as_str().to_string()))
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.before_status)
    .bind(entry.after_status)
    .bind(entry.project_id)
    .bind(normalized)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Walks a JSON value, converting it into the normalized shape the audit
/// trail stores: enums already arrive as their `as_str()` string (callers
/// pass plain strings in), timestamps are ISO-8601 (serde_json already
/// renders `DateTime<Utc>` that way), and nested arrays/objects are walked
/// recursively; anything else is left as-is.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut normalized = Map::new();
            for (k, v) in map {
                normalized.insert(k, normalize(v));
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

#[derive(Debug, Default)]
pub struct AuditQuery {
    pub project_id: Option<i64>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

pub struct AuditReader {
    state: Arc<AppState>,
}

impl AuditReader {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Filters down to the fields supplied; always ordered newest-first and
    /// capped by `query.limit`/`query.offset` for pagination.
    pub async fn list(&self, query: AuditQuery) -> Result<Vec<AuditLog>, ServiceError> {
        let limit = query.limit.clamp(1, 200);
        let offset = query.offset.max(0);

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM audit_logs WHERE 1=1");
        if let Some(project_id) = query.project_id {
            builder.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(entity_type) = &query.entity_type {
            builder.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = query.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id);
        }
        if let Some(actor_id) = query.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(limit);
        builder.push(" OFFSET ").push_bind(offset);

        Ok(builder.build_query_as::<AuditLog>().fetch_all(&self.state.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_walks_nested_structures() {
        let input = serde_json::json!({
            "a": 1,
            "b": { "c": [1, 2, { "d": "e" }] },
        });
        let output = normalize(input.clone());
        assert_eq!(input, output);
    }
}
