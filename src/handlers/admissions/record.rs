use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::{ActorContext, RoleTier};
use crate::database::record::{self, diff_rows, get_i64, get_str, FieldKind};
use crate::error::ApiError;
use crate::filter::{Condition, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::scope::ScopeColumns;
use crate::state::AppState;

use super::super::notes::{self, ADMISSION_NOTES};
use super::super::support::{body_i64, param, ApiPath, JsonBody, Validator};
use super::{VIEW_CAPABILITIES, VIEW_TIERS};

/// Request key, deal column, kind. Only these keys are written on update.
const DEAL_UPDATE_FIELDS: &[(&str, &str, FieldKind)] = &[
    ("name", "name", FieldKind::Text),
    ("category", "category", FieldKind::Text),
    ("university_id", "university_id", FieldKind::Int),
    ("organization_id", "organization_id", FieldKind::Int),
    ("lead_phone", "phone", FieldKind::Text),
    ("brand_id", "brand_id", FieldKind::Int),
    ("region_id", "region_id", FieldKind::Int),
    ("lead_branch", "branch_id", FieldKind::Int),
    ("assigned_to", "assigned_to", FieldKind::Int),
    ("intake_month", "intake_month", FieldKind::Text),
    ("intake_year", "intake_year", FieldKind::Text),
    ("pipeline_id", "pipeline_id", FieldKind::Int),
    ("deal_description", "description", FieldKind::Text),
];

async fn related(state: &AppState, query: ListQuery) -> Result<Vec<Row>, ApiError> {
    Ok(state.store.all(&query, None).await?)
}

/// Client profile columns kept in step with the deal on update
const CLIENT_FIELDS: &[&str] = &["passport_number", "gender", "nationality", "date_of_birth"];

/// The deal, looked up through the actor's record scope. A deal outside the
/// scope is reported as missing.
async fn require_scoped_deal(state: &AppState, actor: &ActorContext, id: i64) -> Result<Row, ApiError> {
    let scope = state.record_scope(actor, &ScopeColumns::DEALS).await;
    let query = ListQuery::new("deals")?.base(Condition::eq("id", id)).scope(scope);
    state
        .store
        .all(&query, Some(1))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Admission not found."))
}

/// Id of the client user linked to the deal through `client_deals`
async fn client_of(state: &AppState, deal_id: i64) -> Result<Option<i64>, ApiError> {
    let query = ListQuery::new("client_deals")?
        .base(Condition::eq("deal_id", deal_id))
        .order_by(vec![OrderBy::asc("id")]);
    let Some(link) = state.store.all(&query, Some(1)).await?.into_iter().next() else {
        return Ok(None);
    };
    let Some(client_id) = get_i64(&link, "client_id") else {
        return Ok(None);
    };
    Ok(state.store.find("users", client_id).await?.map(|_| client_id))
}

/// GET /api/admissions/:id - Deal with its history, tasks, stages and applications
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;
    let deal = require_scoped_deal(&state, &actor, id).await?;

    let stage_histories: Vec<Value> = related(
        &state,
        ListQuery::new("stage_histories")?
            .base(Condition::eq("type", "deal"))
            .base(Condition::eq("type_id", id))
            .order_by(vec![OrderBy::asc("id")]),
    )
    .await?
    .iter()
    .map(|h| h.get("stage_id").cloned().unwrap_or(Value::Null))
    .collect();

    let log_activities = related(
        &state,
        ListQuery::new("log_activities")?
            .base(Condition::eq("module_type", "deal"))
            .base(Condition::eq("module_id", id)),
    )
    .await?;

    let tasks = related(
        &state,
        ListQuery::new("deal_tasks")?
            .base(Condition::eq("related_to", id))
            .base(Condition::eq("related_type", "deal"))
            .order_by(vec![OrderBy::asc("status"), OrderBy::asc("id")]),
    )
    .await?;

    let stages: Map<String, Value> = related(
        &state,
        ListQuery::new("stages")?.order_by(vec![OrderBy::asc("id")]),
    )
    .await?
    .iter()
    .filter_map(|s| Some((get_i64(s, "id")?.to_string(), json!(get_str(s, "name")))))
    .collect();

    let applications = related(
        &state,
        ListQuery::new("deal_applications")?
            .base(Condition::eq("deal_id", id))
            .order_by(vec![OrderBy::asc("id")]),
    )
    .await?;

    Ok(ApiResponse::success(deal)
        .with("stageHistories", stage_histories)
        .with("logActivities", log_activities)
        .with("tasks", tasks)
        .with("stages", stages)
        .with("applications", applications))
}

/// PUT /api/admissions/:id - Update the deal's editable fields and its
/// client's profile
pub async fn put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[RoleTier::SuperAdmin], &["edit deal"]).await?;

    Validator::new(&body)
        .required("name")
        .required("intake_month")
        .required("intake_year")
        .required("brand_id")
        .positive("brand_id")
        .required("region_id")
        .positive("region_id")
        .required("lead_branch")
        .positive("lead_branch")
        .required("assigned_to")
        .integer("assigned_to")
        .required("pipeline_id")
        .required("gender")
        .required("nationality")
        .required("date_of_birth")
        .finish()?;

    let before = require_scoped_deal(&state, &actor, id).await?;

    let assignee = body_i64(&body, "assigned_to").unwrap_or_default();
    if !state.store.exists("users", "id", json!(assignee), None).await? {
        return Err(ApiError::invalid_field("assigned_to", "The selected assigned to is invalid."));
    }

    let client = client_of(&state, id).await?;
    if let Some(client_id) = client {
        Validator::new(&body).required("passport_number").finish()?;
        let passport = record::normalise(
            FieldKind::Text,
            body.get("passport_number").unwrap_or(&Value::Null),
        );
        if state.store.exists("users", "passport_number", passport, Some(client_id)).await? {
            return Err(ApiError::invalid_field(
                "passport_number",
                "The passport number has already been taken.",
            ));
        }
    }

    let mut changes = Row::new();
    for (key, column, kind) in DEAL_UPDATE_FIELDS {
        let value = body.get(*key).unwrap_or(&Value::Null);
        changes.insert(column.to_string(), record::normalise(*kind, value));
    }
    changes.insert("price".into(), json!(0));
    changes.insert("status".into(), json!("Active"));
    let ignored: Vec<&String> = body
        .keys()
        .filter(|k| {
            !DEAL_UPDATE_FIELDS.iter().any(|(key, _, _)| *key == k.as_str())
                && !CLIENT_FIELDS.contains(&k.as_str())
        })
        .collect();

    let diff = diff_rows(&before, &changes, &["created_at", "updated_at"]);
    record::stamp_updated(&mut changes);

    let mut tx = state.store.begin().await?;
    let deal = tx
        .update("deals", id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Admission not found."))?;
    if let Some(client_id) = client {
        let mut profile = Row::new();
        for field in CLIENT_FIELDS {
            let value = body.get(*field).unwrap_or(&Value::Null);
            profile.insert(field.to_string(), record::normalise(FieldKind::Text, value));
        }
        record::stamp_updated(&mut profile);
        tx.update("users", client_id, profile).await?;
    }
    tx.commit().await?;

    if !diff.is_empty() {
        let fields: Vec<&str> = diff.keys().map(String::as_str).collect();
        activity::emit(
            state.activity.as_ref(),
            ActivityEntry::new(
                ActivityType::Info,
                "deal",
                id,
                "Deal Updated",
                format!("Deal updated: {}", get_str(&deal, "name")),
            )
            .message(format!("Fields updated: {}", fields.join(", ")))
            .changes(&diff)
            .by(actor.id),
        )
        .await;
    }

    let mut response = ApiResponse::message("Deal successfully updated!").with("deal", deal);
    if !ignored.is_empty() {
        response = response.with("ignored_fields", ignored);
    }
    Ok(response)
}

/// DELETE /api/admissions/:id - Remove a deal that has no applications
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, &[RoleTier::SuperAdmin], &["delete deal"]).await?;

    let deal = require_scoped_deal(&state, &actor, id).await?;

    let applications = ListQuery::new("deal_applications")?.base(Condition::eq("deal_id", id));
    if state.store.count(&applications).await? > 0 {
        return Err(ApiError::forbidden(
            "The application created for this admission cannot be deleted.",
        ));
    }

    state.store.delete("deals", id).await?;

    let name = get_str(&deal, "name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            "deal",
            id,
            "deal Deleted",
            format!("{} admission Deleted", name),
        )
        .message(format!("{} admission deleted successfully", name))
        .snapshot(&deal)
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Admission successfully deleted!"))
}

/// GET /api/admissions/:id/notes
pub async fn notes(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    notes::list(&state, &actor, &ADMISSION_NOTES, id).await
}

/// GET /api/admissions/:id/stage-history?type= - Stage ids the record has passed through
pub async fn stage_history(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let kind = param(&params, "type")
        .ok_or_else(|| ApiError::invalid_field("type", "The type field is required."))?;
    require_scoped_deal(&state, &actor, id).await?;

    let query = ListQuery::new("stage_histories")?
        .base(Condition::eq("type", kind))
        .base(Condition::eq("type_id", id))
        .order_by(vec![OrderBy::asc("id")]);
    let stages: Vec<Value> = state
        .store
        .all(&query, None)
        .await?
        .iter()
        .map(|h| h.get("stage_id").cloned().unwrap_or(Value::Null))
        .collect();

    Ok(ApiResponse::success(stages))
}
