//! English language test requirements offered as destination options.

use axum::extract::{Extension, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::ActorContext;
use crate::database::record::{self, diff_rows, get_i64, get_str};
use crate::error::ApiError;
use crate::filter::{ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::destinations::{VIEW_CAPABILITIES, VIEW_TIERS};
use super::support::{body_str, user_names, ApiPath, JsonBody, Validator};

const TABLE: &str = "elt_requirements";

async fn require_requirement(state: &AppState, id: i64) -> Result<Row, ApiError> {
    state
        .store
        .find(TABLE, id)
        .await?
        .ok_or_else(|| ApiError::not_found("ELT requirement not found."))
}

async fn every_requirement(state: &AppState) -> Result<Vec<Row>, ApiError> {
    let query = ListQuery::new(TABLE)?.order_by(vec![OrderBy::asc("id")]);
    Ok(state.store.all(&query, None).await?)
}

/// GET /api/elt-requirements
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let requirements = every_requirement(&state).await?;
    let creators = user_names(
        state.store.as_ref(),
        requirements.iter().filter_map(|r| get_i64(r, "created_by")),
    )
    .await?;
    let requirements: Vec<Row> = requirements
        .into_iter()
        .map(|mut requirement| {
            let creator = get_i64(&requirement, "created_by")
                .and_then(|id| creators.get(&id).map(|name| json!({"id": id, "name": name})))
                .unwrap_or(Value::Null);
            requirement.insert("creator".into(), creator);
            requirement
        })
        .collect();

    Ok(ApiResponse::success(requirements))
}

/// GET /api/elt-requirements/pluck - `{id: name}`
pub async fn pluck(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let names: Map<String, Value> = every_requirement(&state)
        .await?
        .iter()
        .filter_map(|r| Some((get_i64(r, "id")?.to_string(), json!(get_str(r, "name")))))
        .collect();
    Ok(ApiResponse::success(names))
}

/// POST /api/elt-requirements
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["create destination"]).await?;
    Validator::new(&body).required("name").max_len("name", 255).finish()?;

    let mut values = Row::new();
    values.insert("name".into(), json!(body_str(&body, "name")));
    values.insert("created_by".into(), json!(actor.id));
    record::stamp_created(&mut values);
    let requirement = state.store.insert(TABLE, values).await?;

    let title = format!("{} ELT requirement created", get_str(&requirement, "name"));
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Success,
            "elt_requirement",
            get_i64(&requirement, "id").unwrap_or_default(),
            "ELT Requirement Created",
            title,
        )
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::created(&requirement).with_message("ELT requirement successfully created."))
}

/// PUT /api/elt-requirements/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["edit destination"]).await?;
    Validator::new(&body).required("name").max_len("name", 255).finish()?;

    let before = require_requirement(&state, id).await?;

    let mut values = Row::new();
    values.insert("name".into(), json!(body_str(&body, "name")));
    values.insert("created_by".into(), json!(actor.id));
    let changes = diff_rows(&before, &values, &[]);
    record::stamp_updated(&mut values);
    let requirement = state
        .store
        .update(TABLE, id, values)
        .await?
        .ok_or_else(|| ApiError::not_found("ELT requirement not found."))?;

    if !changes.is_empty() {
        let fields: Vec<&str> = changes.keys().map(String::as_str).collect();
        activity::emit(
            state.activity.as_ref(),
            ActivityEntry::new(
                ActivityType::Info,
                "elt_requirement",
                id,
                "ELT Requirement Updated",
                format!("{} ELT requirement updated", get_str(&requirement, "name")),
            )
            .message(format!("Fields updated: {}", fields.join(", ")))
            .changes(&changes)
            .by(actor.id),
        )
        .await;
    }

    Ok(ApiResponse::success(&requirement).with_message("ELT requirement successfully updated."))
}

/// DELETE /api/elt-requirements/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, &[], &["delete destination"]).await?;

    let requirement = require_requirement(&state, id).await?;
    state.store.delete(TABLE, id).await?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            "elt_requirement",
            id,
            "ELT Requirement Deleted",
            format!("{} ELT requirement deleted", get_str(&requirement, "name")),
        )
        .snapshot(&requirement)
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("ELT requirement successfully deleted."))
}
