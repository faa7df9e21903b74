use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde_json::{json, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::api::format;
use crate::auth::{ActorContext, RoleTier};
use crate::database::record::{self, diff_rows, get_i64, get_str, FieldKind, FieldMap};
use crate::error::ApiError;
use crate::filter::{field, Condition, FilterKind, FilterSpec, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::notes::{self, AGENCY_NOTES};
use super::support::{body_str, pagination, param, ApiPath, JsonBody, Validator};

const ADMIN: &[RoleTier] = &[RoleTier::SuperAdmin];

const AGENCY_FIELDS: FieldMap = FieldMap::new(&[
    ("phone", FieldKind::Text),
    ("organization_name", FieldKind::Text),
    ("organization_email", FieldKind::Text),
    ("website", FieldKind::Text),
    ("linkedin", FieldKind::Text),
    ("facebook", FieldKind::Text),
    ("twitter", FieldKind::Text),
    ("billing_street", FieldKind::Text),
    ("contactname", FieldKind::Text),
    ("contactemail", FieldKind::Text),
    ("contactphone", FieldKind::Text),
    ("contactjobroll", FieldKind::Text),
    ("billing_country", FieldKind::Text),
    ("description", FieldKind::Text),
    ("city", FieldKind::Text),
    ("c_address", FieldKind::Text),
]);

const AGENCY_FILTERS: FilterSpec = FilterSpec::new(&[
    field("organization_name", "organization_name", FilterKind::Text),
    field("organization_email", "organization_email", FilterKind::Text),
    field("billing_country", "billing_country", FilterKind::Text),
]);

const AGENCY_SEARCH: &[&str] = &[
    "organization_name",
    "phone",
    "organization_email",
    "billing_country",
    "city",
];

/// Columns the form leaves blank rather than null
fn fill_defaults(values: &mut Row, actor: &ActorContext) {
    values.insert("type".into(), json!("Agency"));
    values.insert("user_id".into(), json!(actor.id));
    for column in ["billing_country", "city"] {
        if values.get(column).map(Value::is_null).unwrap_or(true) {
            values.insert(column.into(), json!(""));
        }
    }
}

async fn check_unique(
    state: &AppState,
    body: &serde_json::Map<String, Value>,
    except: Option<i64>,
) -> Result<(), ApiError> {
    for column in ["organization_name", "organization_email"] {
        let value = body_str(body, column);
        if state.store.exists("agencies", column, json!(value), except).await? {
            return Err(ApiError::conflict(
                column,
                format!("The {} has already been taken.", column.replace('_', " ")),
            ));
        }
    }
    Ok(())
}

async fn require_agency(state: &AppState, id: i64) -> Result<Row, ApiError> {
    state
        .store
        .find("agencies", id)
        .await?
        .ok_or_else(|| ApiError::not_found("Agency not found."))
}

/// GET /api/agencies - Paged agency catalogue
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, ADMIN, &["Manage Agency"]).await?;

    let query = ListQuery::new("agencies")?
        .filters(AGENCY_FILTERS.parse(&params)?)
        .search(param(&params, "search"), AGENCY_SEARCH)
        .order_by(vec![OrderBy::asc("id")])
        .paginate(pagination(&params)?);

    let page = state.store.page(&query).await?;
    Ok(ApiResponse::raw(format::list_envelope(page)))
}

/// POST /api/agencies - Register an agency
pub async fn post(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, ADMIN, &["Create Agency"]).await?;

    Validator::new(&body)
        .required("organization_name")
        .required("organization_email")
        .required("phone")
        .finish()?;
    check_unique(&state, &body, None).await?;

    let assigned = AGENCY_FIELDS.apply(&body);
    let mut values = assigned.values;
    fill_defaults(&mut values, &actor);
    record::stamp_created(&mut values);
    let agency = state.store.insert("agencies", values).await?;

    let name = get_str(&agency, "organization_name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "agency",
            get_i64(&agency, "id").unwrap_or_default(),
            "Agency Created",
            format!("{} Agency Created", name),
        )
        .message(format!("{} Agency created successfully", name))
        .by(actor.id),
    )
    .await;

    let mut response = ApiResponse::created(&agency).with_message("Agency created successfully!");
    if !assigned.ignored.is_empty() {
        response = response.with("ignored_fields", assigned.ignored);
    }
    Ok(response)
}

/// GET /api/agencies/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, ADMIN, &["Manage Agency"]).await?;
    Ok(ApiResponse::success(require_agency(&state, id).await?))
}

/// PUT /api/agencies/:id - Replace the agency profile
pub async fn put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, ADMIN, &["Edit Agency"]).await?;

    Validator::new(&body)
        .required("organization_name")
        .required("organization_email")
        .email("organization_email")
        .required("phone")
        .finish()?;
    let before = require_agency(&state, id).await?;
    check_unique(&state, &body, Some(id)).await?;

    let assigned = AGENCY_FIELDS.apply_full(&body);
    let mut values = assigned.values;
    fill_defaults(&mut values, &actor);
    let changes = diff_rows(&before, &values, &["created_at", "updated_at"]);
    record::stamp_updated(&mut values);
    let agency = state
        .store
        .update("agencies", id, values)
        .await?
        .ok_or_else(|| ApiError::not_found("Agency not found."))?;

    let name = get_str(&agency, "organization_name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "agency",
            id,
            "Agency Updated",
            format!("{} agency Updated", name),
        )
        .message(format!("{} agency updated successfully", name))
        .changes(&changes)
        .by(actor.id),
    )
    .await;

    let mut response = ApiResponse::success(&agency).with_message("Agency updated successfully!");
    if !assigned.ignored.is_empty() {
        response = response.with("ignored_fields", assigned.ignored);
    }
    Ok(response)
}

/// DELETE /api/agencies/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, ADMIN, &["Delete Agency"]).await?;

    let agency = require_agency(&state, id).await?;
    state.store.delete("agencies", id).await?;

    let name = get_str(&agency, "organization_name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            "agency",
            id,
            "Agency Deleted",
            format!("{} agency deleted", name),
        )
        .message(format!("{} agency deleted successfully", name))
        .snapshot(&agency)
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Agency deleted successfully!"))
}

/// DELETE /api/agencies - Bulk delete by `ids: "1,2,3"`, along with the
/// agencies' login users
pub async fn delete_bulk(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, ADMIN, &["Delete Agency"]).await?;

    let ids: Vec<Value> = match body.get("ids") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| record::normalise(FieldKind::Int, v).as_i64())
            .map(Value::from)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .filter_map(|p| p.trim().parse::<i64>().ok())
            .map(Value::from)
            .collect(),
        _ => vec![],
    };
    if ids.is_empty() {
        return Err(ApiError::invalid_field("ids", "Select at least one agency."));
    }

    let mut tx = state.store.begin().await?;
    let agencies = tx
        .all(&ListQuery::new("agencies")?.base(Condition::in_list("id", ids.clone())))
        .await?;
    let user_ids: Vec<Value> = agencies
        .iter()
        .filter_map(|a| get_i64(a, "user_id"))
        .map(Value::from)
        .collect();
    if !user_ids.is_empty() {
        tx.delete_where(
            "users",
            vec![Condition::in_list("id", user_ids), Condition::eq("type", "agency")],
        )
        .await?;
    }
    let deleted = tx.delete_where("agencies", vec![Condition::in_list("id", ids)]).await?;
    tx.commit().await?;

    for agency in &agencies {
        let name = get_str(agency, "organization_name");
        activity::emit(
            state.activity.as_ref(),
            ActivityEntry::new(
                ActivityType::Warning,
                "agency",
                get_i64(agency, "id").unwrap_or_default(),
                "Agency Deleted",
                format!("{} agency deleted", name),
            )
            .message(format!("{} agency deleted successfully", name))
            .snapshot(agency)
            .by(actor.id),
        )
        .await;
    }

    Ok(ApiResponse::message(format!("{} agencies deleted successfully", deleted))
        .with("deleted", deleted))
}

/// GET /api/agencies/:id/notes
pub async fn notes_get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    notes::list(&state, &actor, &AGENCY_NOTES, id).await
}

/// POST /api/agencies/:id/notes
pub async fn notes_post(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    body: JsonBody,
) -> ApiResult {
    notes::create(&state, &actor, &AGENCY_NOTES, id, body).await
}

/// PUT /api/agencies/:id/notes/:note_id
pub async fn notes_put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(ids): ApiPath<(i64, i64)>,
    body: JsonBody,
) -> ApiResult {
    notes::update(&state, &actor, &AGENCY_NOTES, ids, body).await
}

/// DELETE /api/agencies/:id/notes/:note_id
pub async fn notes_delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(ids): ApiPath<(i64, i64)>,
) -> ApiResult {
    notes::delete(&state, &actor, &AGENCY_NOTES, ids).await
}
