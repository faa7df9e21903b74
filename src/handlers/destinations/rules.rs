//! Ordered restriction, requirement and pipeline rules of a destination.

use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::ActorContext;
use crate::database::record::{self, diff_rows, get_i64, get_str};
use crate::error::ApiError;
use crate::filter::{Condition, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::super::support::{body_i64, body_str, user_names, ApiPath, JsonBody, Validator};
use super::{destination_table, require_destination, type_label};

const RULE_TYPES: &[&str] = &["restriction", "requirement", "pipeline"];
const DESTINATION_TYPES: &[&str] = &["1", "2"];

fn check_rule(body: &Map<String, Value>) -> Result<(), ApiError> {
    Validator::new(body)
        .required("name")
        .required("position")
        .integer("position")
        .required("type")
        .one_of("type", DESTINATION_TYPES)
        .required("rule_type")
        .one_of("rule_type", RULE_TYPES)
        .finish()
}

async fn require_rule(state: &AppState, id: i64) -> Result<Row, ApiError> {
    state
        .store
        .find("destination_rules", id)
        .await?
        .ok_or_else(|| ApiError::not_found("Destination Rule not found."))
}

/// Display name of the destination a rule hangs off, or blank when it is gone
async fn destination_name(state: &AppState, rule: &Row) -> Result<String, ApiError> {
    let table = destination_table(get_i64(rule, "type").unwrap_or(1));
    let id = get_i64(rule, "destination_id").unwrap_or_default();
    Ok(state
        .store
        .find(table, id)
        .await?
        .map(|d| get_str(&d, "name").to_string())
        .unwrap_or_default())
}

/// GET /api/destinations/:id/rules?type=&rule_type=
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(destination_id): ApiPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, &[], &["manage destination"]).await?;

    let body: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Validator::new(&body)
        .required("type")
        .one_of("type", DESTINATION_TYPES)
        .required("rule_type")
        .one_of("rule_type", RULE_TYPES)
        .finish()?;
    let kind = body_i64(&body, "type").unwrap_or(1);
    require_destination(&state, destination_table(kind), destination_id).await?;

    let query = ListQuery::new("destination_rules")?
        .base(Condition::eq("destination_id", destination_id))
        .base(Condition::eq("rule_type", body_str(&body, "rule_type")))
        .base(Condition::eq("type", kind))
        .order_by(vec![OrderBy::asc("position"), OrderBy::asc("id")]);
    let rules = state.store.all(&query, None).await?;

    let creators = user_names(
        state.store.as_ref(),
        rules.iter().filter_map(|r| get_i64(r, "created_by")),
    )
    .await?;
    let rules: Vec<Row> = rules
        .into_iter()
        .map(|mut rule| {
            let creator = get_i64(&rule, "created_by")
                .and_then(|id| creators.get(&id).map(|name| json!({"id": id, "name": name})))
                .unwrap_or(Value::Null);
            rule.insert("creator".into(), creator);
            rule
        })
        .collect();

    Ok(ApiResponse::success(rules))
}

/// POST /api/destinations/:id/rules
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(destination_id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["create destination"]).await?;
    check_rule(&body)?;

    let kind = body_i64(&body, "type").unwrap_or(1);
    let destination = require_destination(&state, destination_table(kind), destination_id).await?;

    let mut values = Row::new();
    values.insert("destination_id".into(), json!(destination_id));
    values.insert("name".into(), json!(body_str(&body, "name")));
    values.insert("position".into(), json!(body_i64(&body, "position")));
    values.insert("type".into(), json!(kind));
    values.insert("rule_type".into(), json!(body_str(&body, "rule_type")));
    values.insert("created_by".into(), json!(actor.id));
    record::stamp_created(&mut values);
    let rule = state.store.insert("destination_rules", values).await?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Success,
            "Destination",
            destination_id,
            "Rule Created",
            format!(
                "{} {} {} created",
                type_label(kind),
                get_str(&destination, "name"),
                get_str(&rule, "rule_type")
            ),
        )
        .message(format!(
            "A new rule '{}' has been created successfully.",
            get_str(&rule, "name")
        ))
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::created(&rule).with_message("Destination Rule successfully created."))
}

/// PUT /api/destination-rules/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;
    check_rule(&body)?;

    let before = require_rule(&state, id).await?;

    let mut values = Row::new();
    values.insert("name".into(), json!(body_str(&body, "name")));
    values.insert("position".into(), json!(body_i64(&body, "position")));
    values.insert("rule_type".into(), json!(body_str(&body, "rule_type")));
    values.insert("created_by".into(), json!(actor.id));
    record::stamp_updated(&mut values);
    let rule = state
        .store
        .update("destination_rules", id, values)
        .await?
        .ok_or_else(|| ApiError::not_found("Destination Rule not found."))?;

    let name = destination_name(&state, &rule).await?;
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "Destination",
            get_i64(&rule, "destination_id").unwrap_or_default(),
            "Rule Updated",
            format!(
                "{} {} {} updated",
                type_label(get_i64(&rule, "type").unwrap_or(1)),
                name,
                get_str(&rule, "rule_type")
            ),
        )
        .message(format!(
            "The rule has been updated from '{}' to '{}'.",
            get_str(&before, "name"),
            get_str(&rule, "name")
        ))
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::success(&rule).with_message("Destination Rule successfully updated."))
}

/// PUT /api/destination-rules/:id/position
pub async fn position(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;
    Validator::new(&body)
        .required("position")
        .integer("position")
        .finish()?;

    let before = require_rule(&state, id).await?;

    let mut values = Row::new();
    values.insert("position".into(), json!(body_i64(&body, "position")));
    values.insert("created_by".into(), json!(actor.id));
    let changes = diff_rows(&before, &values, &[]);
    record::stamp_updated(&mut values);
    let rule = state
        .store
        .update("destination_rules", id, values)
        .await?
        .ok_or_else(|| ApiError::not_found("Destination Rule not found."))?;

    if !changes.is_empty() {
        activity::emit(
            state.activity.as_ref(),
            ActivityEntry::new(
                ActivityType::Info,
                "Destination",
                get_i64(&rule, "destination_id").unwrap_or_default(),
                "Rule Updated",
                "Destination Rule Updated",
            )
            .message("Fields updated successfully")
            .changes(&changes)
            .by(actor.id),
        )
        .await;
    }

    Ok(ApiResponse::success(&rule).with_message("Destination Rule successfully updated."))
}

/// DELETE /api/destination-rules/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, &[], &["delete destination"]).await?;

    let rule = require_rule(&state, id).await?;
    let name = destination_name(&state, &rule).await?;
    state.store.delete("destination_rules", id).await?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            "Destination",
            get_i64(&rule, "destination_id").unwrap_or_default(),
            "Rule Deleted",
            format!(
                "{} {} {} deleted",
                type_label(get_i64(&rule, "type").unwrap_or(1)),
                name,
                get_str(&rule, "rule_type")
            ),
        )
        .message(format!("The rule '{}' has been deleted successfully.", get_str(&rule, "name")))
        .snapshot(&rule)
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Destination Rule successfully deleted."))
}
