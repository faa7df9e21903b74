//! Free-form key/value metadata per destination and destination type.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Extension, Query, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::ActorContext;
use crate::database::record::{self, get_i64, get_str, FieldChange};
use crate::error::ApiError;
use crate::filter::{Condition, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::super::support::{body_i64, ucwords, ApiPath, JsonBody, Validator};
use super::{destination_table, require_destination, type_label, VIEW_CAPABILITIES, VIEW_TIERS};

/// Body keys that address the metadata rather than being stored
const RESERVED_KEYS: &[&str] = &["type", "destination_id"];

fn check_type(body: &Map<String, Value>) -> Result<i64, ApiError> {
    Validator::new(body)
        .required("type")
        .one_of("type", &["1", "2"])
        .finish()?;
    Ok(body_i64(body, "type").unwrap_or(1))
}

/// Stored form of a submitted value: strings as-is, anything else as JSON text
fn stored(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Stored values that parse as JSON are returned decoded
fn decoded(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        other => other.clone(),
    }
}

fn meta_query(destination_id: i64, kind: i64) -> Result<ListQuery, ApiError> {
    Ok(ListQuery::new("destination_metas")?
        .base(Condition::eq("destination_id", destination_id))
        .base(Condition::eq("type", kind))
        .order_by(vec![OrderBy::asc("id")]))
}

fn as_object(rows: &[Row]) -> Map<String, Value> {
    rows.iter()
        .map(|row| {
            let value = row.get("meta_value").map(decoded).unwrap_or(Value::Null);
            (get_str(row, "meta_key").to_string(), value)
        })
        .collect()
}

/// GET /api/destinations/:id/meta?type=
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(destination_id): ApiPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let query_body: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let kind = check_type(&query_body)?;
    require_destination(&state, destination_table(kind), destination_id).await?;

    let rows = state.store.all(&meta_query(destination_id, kind)?, None).await?;
    Ok(ApiResponse::success(as_object(&rows))
        .with_message("destination meta list retrieved successfully."))
}

/// PUT /api/destinations/:id/meta - Upsert every non-reserved key of the body
pub async fn put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(destination_id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;

    let kind = check_type(&body)?;
    let destination = require_destination(&state, destination_table(kind), destination_id).await?;

    let mut tx = state.store.begin().await?;
    let existing: HashMap<String, Row> = tx
        .all(&meta_query(destination_id, kind)?)
        .await?
        .into_iter()
        .map(|row| (get_str(&row, "meta_key").to_string(), row))
        .collect();

    let mut changes = BTreeMap::new();
    for (key, value) in body.iter().filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str())) {
        let new = stored(value);
        match existing.get(key) {
            Some(row) => {
                let old = row.get("meta_value").cloned().unwrap_or(Value::Null);
                if old != new {
                    changes.insert(key.clone(), FieldChange { old, new: new.clone() });
                }
                let id = get_i64(row, "id").unwrap_or_default();
                let mut update = Row::new();
                update.insert("meta_value".into(), new);
                update.insert("created_by".into(), json!(actor.id));
                record::stamp_updated(&mut update);
                tx.update("destination_metas", id, update).await?;
            }
            None => {
                changes.insert(key.clone(), FieldChange { old: Value::Null, new: new.clone() });
                let mut insert = Row::new();
                insert.insert("destination_id".into(), json!(destination_id));
                insert.insert("type".into(), json!(kind));
                insert.insert("meta_key".into(), json!(key));
                insert.insert("meta_value".into(), new);
                insert.insert("created_by".into(), json!(actor.id));
                record::stamp_created(&mut insert);
                tx.insert("destination_metas", insert).await?;
            }
        }
    }

    let rows = tx.all(&meta_query(destination_id, kind)?).await?;
    tx.commit().await?;

    if !changes.is_empty() {
        let fields: Vec<String> = changes.keys().map(|k| ucwords(k)).collect();
        activity::emit(
            state.activity.as_ref(),
            ActivityEntry::new(
                ActivityType::Info,
                "destination",
                destination_id,
                "destination Metadata Updated",
                format!("{} {} updated", type_label(kind), get_str(&destination, "name")),
            )
            .message(format!("Fields updated: {}", fields.join(", ")))
            .changes(&changes)
            .by(actor.id),
        )
        .await;
    }

    Ok(ApiResponse::success(as_object(&rows)).with_message("destination processed successfully"))
}
