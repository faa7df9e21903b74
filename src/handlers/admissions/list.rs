use std::collections::HashMap;

use axum::{
    extract::{Extension, Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::api::format::{self, CardLayout, CsvLayout};
use crate::auth::ActorContext;
use crate::config::CONFIG;
use crate::database::record::truthy;
use crate::database::stream_rows;
use crate::error::ApiError;
use crate::filter::{field, Condition, FilterKind, FilterSpec, ListQuery, OrderBy};
use crate::middleware::{ApiResponse, ApiResult};
use crate::scope::ScopeColumns;
use crate::state::AppState;

use super::super::support::{pagination, param};
use super::{VIEW_CAPABILITIES, VIEW_TIERS};

const DEAL_FILTERS: FilterSpec = FilterSpec::new(&[
    field("name", "name", FilterKind::Text),
    field("brand_id", "brand_id", FilterKind::Exact),
    field("region_id", "region_id", FilterKind::Exact),
    field("branch_id", "branch_id", FilterKind::Exact),
    field("lead_assigned_user", "assigned_to", FilterKind::Exact),
    field("stages", "stage_id", FilterKind::Exact),
    field("users", "created_by", FilterKind::List),
    field("created_at_from", "created_at", FilterKind::DateFrom),
    field("created_at_to", "created_at", FilterKind::DateTo),
    field("tag", "tag_ids", FilterKind::Set),
]);

const VIEW_FILTERS: FilterSpec = FilterSpec::new(&[
    field("name", "name", FilterKind::Text),
    field("brand_id", "brand_id", FilterKind::Exact),
    field("region_id", "region_id", FilterKind::Exact),
    field("branch_id", "branch_id", FilterKind::Exact),
    field("lead_assigned_user", "assigned_to", FilterKind::Exact),
    field("stages", "stage_id", FilterKind::Exact),
    field("users", "created_by", FilterKind::List),
    field("created_at_from", "created_at", FilterKind::DateFrom),
    field("created_at_to", "created_at", FilterKind::DateTo),
    field("tag", "tag_ids", FilterKind::Set),
    field("days_at_stage", "days_at_stage", FilterKind::DaysAtStage),
]);

const DEAL_SEARCH: &[&str] = &["name", "phone", "price"];

const VIEW_SEARCH: &[&str] = &[
    "name",
    "phone",
    "price",
    "passport_number",
    "lead_name",
    "lead_email",
    "lead_phone",
];

const KANBAN_CARD: CardLayout = &[
    ("id", "id"),
    ("name", "name"),
    ("phone", "phone"),
    ("price", "price"),
    ("assigned_to", "assigned_user_name"),
    ("brand", "brand_name"),
    ("agent", "agent_name"),
    ("client_passport", "passport_number"),
    ("lead_name", "lead_name"),
];

const CSV_COLUMNS: CsvLayout = &[
    ("ID", "id"),
    ("Name", "name"),
    ("Stage", "stage_name"),
    ("Brand", "brand_name"),
    ("Agent", "agent_name"),
    ("Assigned", "assigned_user_name"),
    ("Client Passport", "passport_number"),
    ("Lead Name", "lead_name"),
    ("Lead Email", "lead_email"),
    ("University", "university_name"),
    ("Price", "price"),
    ("Created At", "created_at"),
];

/// Rows per store round-trip while streaming an export
const CSV_BATCH: u64 = 500;

/// `fetcttype` tabs of the admissions board
fn fetch_type_conditions(fetch_type: Option<&str>, actor: &ActorContext) -> Vec<Condition> {
    let Some(fetch_type) = fetch_type else {
        return vec![];
    };
    let mut conditions = Vec::new();
    match fetch_type {
        "youradmissions" => conditions.push(Condition::eq("created_by", actor.id)),
        "assigntome" => conditions.push(Condition::eq("assigned_to", actor.id)),
        _ => {}
    }
    if fetch_type == "agentadmissions" {
        conditions.push(Condition::NotNull { column: "agent_id".into() });
    } else {
        conditions.push(Condition::IsNull { column: "agent_id".into() });
    }
    conditions
}

/// GET /api/admissions - Paged deal listing within the caller's scope
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let scope = state.record_scope(&actor, &ScopeColumns::DEALS).await;
    let query = ListQuery::new("deals")?
        .scope(scope)
        .filters(DEAL_FILTERS.parse(&params)?)
        .search(param(&params, "search"), DEAL_SEARCH)
        .paginate(pagination(&params)?);

    let page = state.store.page(&query).await?;
    Ok(ApiResponse::raw(format::list_envelope(page)))
}

/// GET /api/admissions/view - Admission board as a list, kanban or CSV export
pub async fn view(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let scope = state.record_scope(&actor, &ScopeColumns::DEALS).await;
    let query = ListQuery::new("admission_view")?
        .scope(scope)
        .filters(VIEW_FILTERS.parse(&params)?)
        .filters(fetch_type_conditions(param(&params, "fetcttype"), &actor))
        .search(param(&params, "search"), VIEW_SEARCH);

    let csv = param(&params, "download_csv")
        .map(|v| truthy(&serde_json::Value::String(v.to_string())))
        .unwrap_or(false);
    if csv {
        let filename = format!("admissions_{}.csv", Utc::now().timestamp());
        tracing::info!("user {} exporting admissions to {}", actor.id, filename);
        let rows = stream_rows(state.store.clone(), query, CSV_BATCH);
        return Ok(format::csv_response(&filename, CSV_COLUMNS, rows));
    }

    if param(&params, "view") == Some("kanban") {
        let query = query.order_by(vec![OrderBy::desc("created_at")]);
        let deals = state
            .store
            .all(&query, Some(CONFIG.listing.kanban_limit))
            .await?;
        let stages = state
            .store
            .all(&ListQuery::new("stages")?.order_by(vec![OrderBy::asc("id")]), None)
            .await?;
        let board = format::kanban_board(&stages, &deals, KANBAN_CARD);
        return Ok(ApiResponse::raw(format::kanban_envelope(board)).into_response());
    }

    let page = state.store.page(&query.paginate(pagination(&params)?)).await?;
    Ok(ApiResponse::raw(format::list_envelope(page)).into_response())
}
