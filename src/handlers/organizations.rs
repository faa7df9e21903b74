//! Partner organizations. Each organization is a `users` row of type
//! `organization` (name, email, login) plus its `organizations` profile row.

use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::api::format;
use crate::auth::ActorContext;
use crate::database::record::{self, diff_rows, get_i64, get_str, FieldKind};
use crate::error::ApiError;
use crate::filter::{field, FilterKind, FilterSpec, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::notes::{self, ORGANIZATION_NOTES};
use super::support::{body_str, pagination, param, ApiPath, JsonBody, Validator};

/// Request key, profile column, kind
const PROFILE_FIELDS: &[(&str, &str, FieldKind)] = &[
    ("organization_type", "type", FieldKind::Text),
    ("organization_phone", "phone", FieldKind::Text),
    ("organization_website", "website", FieldKind::Text),
    ("organization_linkedin", "linkedin", FieldKind::Text),
    ("organization_facebook", "facebook", FieldKind::Text),
    ("organization_twitter", "twitter", FieldKind::Text),
    ("organization_billing_street", "billing_street", FieldKind::Text),
    ("contactname", "contactname", FieldKind::Text),
    ("contactemail", "contactemail", FieldKind::Text),
    ("contactphone", "contactphone", FieldKind::Text),
    ("contactjobroll", "contactjobroll", FieldKind::Text),
    ("organization_billing_country", "billing_country", FieldKind::Text),
    ("organization_description", "description", FieldKind::Text),
];

/// Keys stored on the user row instead of the profile
const USER_KEYS: &[&str] = &["organization_name", "organization_email"];

const ORGANIZATION_FILTERS: FilterSpec = FilterSpec::new(&[
    field("name", "name", FilterKind::Text),
    field("phone", "phone", FilterKind::ExactText),
    field("billing_street", "billing_street", FilterKind::ExactText),
    field("billing_state", "billing_state", FilterKind::ExactText),
    field("billing_country", "billing_country", FilterKind::ExactText),
    field("billing_city", "billing_city", FilterKind::ExactText),
]);

const ORGANIZATION_SEARCH: &[&str] = &[
    "name",
    "billing_street",
    "billing_city",
    "billing_state",
    "billing_country",
];

fn validate(body: &Map<String, Value>) -> Result<(), ApiError> {
    Validator::new(body)
        .required("organization_name")
        .required("organization_type")
        .required("organization_email")
        .email("organization_email")
        .required("organization_phone")
        .finish()
}

fn profile_values(body: &Map<String, Value>) -> (Row, Vec<String>) {
    let mut values = Row::new();
    for (key, column, kind) in PROFILE_FIELDS {
        let value = body.get(*key).unwrap_or(&Value::Null);
        values.insert(column.to_string(), record::normalise(*kind, value));
    }
    let ignored = body
        .keys()
        .filter(|k| {
            !USER_KEYS.contains(&k.as_str()) && !PROFILE_FIELDS.iter().any(|(key, _, _)| *key == k.as_str())
        })
        .cloned()
        .collect();
    (values, ignored)
}

async fn check_email(state: &AppState, email: &str, except_user: Option<i64>) -> Result<(), ApiError> {
    if state.store.exists("users", "email", json!(email), except_user).await? {
        return Err(ApiError::conflict(
            "organization_email",
            "The organization email has already been taken.",
        ));
    }
    Ok(())
}

async fn require_organization(state: &AppState, id: i64) -> Result<Row, ApiError> {
    state
        .store
        .find("organizations", id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found."))
}

fn with_user(mut organization: Row, user: Option<Row>) -> Row {
    organization.insert("user".into(), user.map(Value::Object).unwrap_or(Value::Null));
    organization
}

/// GET /api/organizations - Paged organization directory
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, &[], &["manage organization"]).await?;

    let query = ListQuery::new("organization_view")?
        .filters(ORGANIZATION_FILTERS.parse(&params)?)
        .search(param(&params, "search"), ORGANIZATION_SEARCH)
        .order_by(vec![OrderBy::asc("id")])
        .paginate(pagination(&params)?);

    let page = state.store.page(&query).await?;
    Ok(ApiResponse::raw(format::list_envelope(page)))
}

/// POST /api/organizations - Create the organization user and its profile
pub async fn post(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["create organization"]).await?;
    validate(&body)?;
    check_email(&state, body_str(&body, "organization_email"), None).await?;

    let mut tx = state.store.begin().await?;

    let mut user = Row::new();
    user.insert("name".into(), json!(body_str(&body, "organization_name")));
    user.insert("type".into(), json!("organization"));
    user.insert("email".into(), json!(body_str(&body, "organization_email")));
    user.insert("is_active".into(), json!(true));
    user.insert("lang".into(), json!("en"));
    user.insert("mode".into(), json!("light"));
    user.insert("created_by".into(), json!(actor.id));
    record::stamp_created(&mut user);
    let user = tx.insert("users", user).await?;

    let (mut profile, ignored) = profile_values(&body);
    profile.insert("user_id".into(), user.get("id").cloned().unwrap_or(Value::Null));
    record::stamp_created(&mut profile);
    let organization = tx.insert("organizations", profile).await?;

    tx.commit().await?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "organization",
            get_i64(&organization, "id").unwrap_or_default(),
            "Organization Created",
            "Organization Created",
        )
        .message("Organization created successfully")
        .by(actor.id),
    )
    .await;

    let mut response = ApiResponse::created(with_user(organization, Some(user)))
        .with_message("Organization created successfully!");
    if !ignored.is_empty() {
        response = response.with("ignored_fields", ignored);
    }
    Ok(response)
}

/// GET /api/organizations/:id - Profile with its user
pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, &[], &["manage organization"]).await?;

    let organization = require_organization(&state, id).await?;
    let user = match get_i64(&organization, "user_id") {
        Some(user_id) => state.store.find("users", user_id).await?,
        None => None,
    };
    Ok(ApiResponse::success(with_user(organization, user)))
}

/// PUT /api/organizations/:id
pub async fn put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, &[], &["create organization"]).await?;
    validate(&body)?;

    let before = require_organization(&state, id).await?;
    let user_id = get_i64(&before, "user_id")
        .ok_or_else(|| ApiError::not_found("Organization user not found."))?;
    let before_user = state
        .store
        .find("users", user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization user not found."))?;
    check_email(&state, body_str(&body, "organization_email"), Some(user_id)).await?;

    let mut user_changes = Row::new();
    user_changes.insert("name".into(), json!(body_str(&body, "organization_name")));
    user_changes.insert("email".into(), json!(body_str(&body, "organization_email")));
    let (mut profile, ignored) = profile_values(&body);

    let mut changes = diff_rows(&before, &profile, &["created_at", "updated_at"]);
    changes.extend(diff_rows(&before_user, &user_changes, &[]));

    record::stamp_updated(&mut user_changes);
    record::stamp_updated(&mut profile);

    let mut tx = state.store.begin().await?;
    let user = tx.update("users", user_id, user_changes).await?;
    let organization = tx
        .update("organizations", id, profile)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found."))?;
    tx.commit().await?;

    let name = body_str(&body, "organization_name");
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "organization",
            id,
            "Organization Updated",
            format!("{} Organization Updated", name),
        )
        .message(format!("{} Organization updated successfully", name))
        .changes(&changes)
        .by(actor.id),
    )
    .await;

    let mut response = ApiResponse::success(with_user(organization, user))
        .with_message("Organization updated successfully!");
    if !ignored.is_empty() {
        response = response.with("ignored_fields", ignored);
    }
    Ok(response)
}

/// DELETE /api/organizations/:id - Remove the profile and its user
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    state.authorize(&actor, &[], &["delete organization"]).await?;

    let organization = require_organization(&state, id).await?;
    let user = match get_i64(&organization, "user_id") {
        Some(user_id) => state.store.find("users", user_id).await?,
        None => None,
    };

    let mut tx = state.store.begin().await?;
    if let Some(user_id) = user.as_ref().and_then(|u| get_i64(u, "id")) {
        tx.delete_where("users", vec![crate::filter::Condition::eq("id", user_id)])
            .await?;
    }
    tx.delete_where("organizations", vec![crate::filter::Condition::eq("id", id)])
        .await?;
    tx.commit().await?;

    let name = user.as_ref().map(|u| get_str(u, "name")).unwrap_or_default();
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            "organization",
            id,
            "Organization Deleted",
            format!("{} Organization deleted", name),
        )
        .message(format!("{} Organization deleted", name))
        .snapshot(&with_user(organization, user.clone()))
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Organization successfully deleted."))
}

/// GET /api/organizations/:id/notes
pub async fn notes_get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    notes::list(&state, &actor, &ORGANIZATION_NOTES, id).await
}

/// POST /api/organizations/:id/notes
pub async fn notes_post(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    body: JsonBody,
) -> ApiResult {
    notes::create(&state, &actor, &ORGANIZATION_NOTES, id, body).await
}

/// PUT /api/organizations/:id/notes/:note_id
pub async fn notes_put(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(ids): ApiPath<(i64, i64)>,
    body: JsonBody,
) -> ApiResult {
    notes::update(&state, &actor, &ORGANIZATION_NOTES, ids, body).await
}

/// DELETE /api/organizations/:id/notes/:note_id
pub async fn notes_delete(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(ids): ApiPath<(i64, i64)>,
) -> ApiResult {
    notes::delete(&state, &actor, &ORGANIZATION_NOTES, ids).await
}
