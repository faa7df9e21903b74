use axum::extract::{Extension, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::ActorContext;
use crate::database::record::{self, diff_rows, get_i64, get_str, FieldChange};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::super::support::{body_str, ApiPath, JsonBody, Validator};
use super::{require_destination, DESTINATION_FIELDS, STATUSES, TRENDS, VIEW_CAPABILITIES, VIEW_TIERS};

const IGNORED_IN_DIFF: &[&str] = &["created_at", "updated_at"];

/// Rules shared by every write; each only fires when its field is present
fn check_optional(validator: &mut Validator<'_>) {
    validator
        .max_len("official_name", 200)
        .max_len("flag", 10)
        .between("success_rate", 0, 100)
        .integer("success_rate")
        .one_of("dropout_refusal_risk_level", &["low", "medium", "high"])
        .url("vac_appointment_url")
        .one_of("overall_trend", TRENDS)
        .one_of("status", STATUSES);
    for column in DESTINATION_FIELDS.list_columns() {
        validator.array(column);
    }
}

fn check_required(validator: &mut Validator<'_>) {
    validator
        .required("name")
        .max_len("name", 200)
        .required("continent")
        .max_len("continent", 100)
        .required("currency")
        .max_len("currency", 100)
        .required("language")
        .max_len("language", 100);
}

async fn log_update(
    state: &AppState,
    actor: &ActorContext,
    id: i64,
    name: &str,
    changes: &std::collections::BTreeMap<String, FieldChange>,
) {
    if changes.is_empty() {
        return;
    }
    let fields: Vec<&str> = changes.keys().map(String::as_str).collect();
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "destination",
            id,
            "Destination Updated",
            format!("{} destination updated", name),
        )
        .message(format!("Fields updated: {}", fields.join(", ")))
        .changes(changes)
        .by(actor.id),
    )
    .await;
}

/// POST /api/destinations
pub async fn post(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["create destination"]).await?;

    let mut validator = Validator::new(&body);
    check_required(&mut validator);
    check_optional(&mut validator);
    validator.finish()?;

    let assigned = DESTINATION_FIELDS.apply(&body);
    let mut values = assigned.values;
    values.entry("english_proficiency_required").or_insert(json!(false));
    if values.get("status").map(Value::is_null).unwrap_or(true) {
        values.insert("status".into(), json!("active"));
    }
    values.insert("created_by".into(), json!(actor.id));
    record::stamp_created(&mut values);
    let destination = state.store.insert("destinations", values).await?;

    let name = get_str(&destination, "name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Success,
            "destination",
            get_i64(&destination, "id").unwrap_or_default(),
            "Destination Created",
            format!("{} destination created", name),
        )
        .message(format!("{} destination created", name))
        .by(actor.id),
    )
    .await;

    let mut response = ApiResponse::created(&destination).with_message("Destination created successfully.");
    if !assigned.ignored.is_empty() {
        response = response.with("ignored_fields", assigned.ignored);
    }
    Ok(response)
}

/// GET /api/destinations/:id - Detail with list columns as arrays
pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let mut destination = require_destination(&state, "destinations", id).await?;
    record::expand_lists(&mut destination, DESTINATION_FIELDS.list_columns());

    let mut body = Map::new();
    body.insert("status".into(), json!("success"));
    body.insert("destination".into(), Value::Object(destination));
    Ok(ApiResponse::raw(body))
}

/// PUT /api/destinations/:id - Full profile update
pub async fn put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;

    let mut validator = Validator::new(&body);
    check_required(&mut validator);
    check_optional(&mut validator);
    validator.finish()?;

    let before = require_destination(&state, "destinations", id).await?;

    let assigned = DESTINATION_FIELDS.apply_full(&body);
    let mut values = assigned.values;
    // Status and trend survive a form that leaves them out
    for column in ["status", "overall_trend"] {
        if values.get(column).map(Value::is_null).unwrap_or(true) {
            values.insert(column.into(), before.get(column).cloned().unwrap_or(Value::Null));
        }
    }

    let changes = diff_rows(&before, &values, IGNORED_IN_DIFF);
    record::stamp_updated(&mut values);
    let destination = state
        .store
        .update("destinations", id, values)
        .await?
        .ok_or_else(|| ApiError::not_found("Destination not found."))?;

    log_update(&state, &actor, id, get_str(&destination, "name"), &changes).await;

    let mut response = ApiResponse::success(&destination).with_message("Destination updated successfully.");
    if !assigned.ignored.is_empty() {
        response = response.with("ignored_fields", assigned.ignored);
    }
    Ok(response)
}

/// PATCH /api/destinations/:id - Update only the keys sent
pub async fn patch(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;

    let mut validator = Validator::new(&body);
    check_optional(&mut validator);
    for column in ["name", "continent", "currency", "language"] {
        if body.contains_key(column) {
            validator.required(column);
        }
    }
    validator.finish()?;

    let before = require_destination(&state, "destinations", id).await?;

    let assigned = DESTINATION_FIELDS.apply(&body);
    let mut values = assigned.values;
    let changes = diff_rows(&before, &values, IGNORED_IN_DIFF);

    let destination = if values.is_empty() {
        before
    } else {
        record::stamp_updated(&mut values);
        state
            .store
            .update("destinations", id, values)
            .await?
            .ok_or_else(|| ApiError::not_found("Destination not found."))?
    };

    log_update(&state, &actor, id, get_str(&destination, "name"), &changes).await;

    let mut response = ApiResponse::success(&destination).with_message("Destination updated successfully.");
    if !assigned.ignored.is_empty() {
        response = response.with("ignored_fields", assigned.ignored);
    }
    Ok(response)
}

/// PUT /api/destinations/:id/status
pub async fn status(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;

    Validator::new(&body)
        .required("status")
        .one_of("status", STATUSES)
        .finish()?;
    let destination = require_destination(&state, "destinations", id).await?;
    let status = body_str(&body, "status");

    let mut values = serde_json::Map::new();
    values.insert("status".into(), json!(status));
    record::stamp_updated(&mut values);
    state.store.update("destinations", id, values).await?;

    let title = format!("{} status updated to {}", get_str(&destination, "name"), status);
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(ActivityType::Info, "destination", id, "Destination Updated", title.clone())
            .message(title)
            .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Destination status successfully updated!"))
}

/// DELETE /api/destinations/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, &[], &["delete destination"]).await?;

    let destination = require_destination(&state, "destinations", id).await?;
    state.store.delete("destinations", id).await?;

    let name = get_str(&destination, "name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            "destination",
            id,
            "Destination deleted",
            format!("{} destination deleted", name),
        )
        .message(format!("{} destination deleted", name))
        .snapshot(&destination)
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Destination successfully deleted!"))
}
