use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde_json::{json, Map, Value};

use crate::auth::ActorContext;
use crate::filter::{field, Condition, FilterKind, FilterSpec, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::super::support::{pagination, param};
use super::{STATUSES, TRENDS, VIEW_CAPABILITIES, VIEW_TIERS};

const DESTINATION_FILTERS: FilterSpec = FilterSpec::new(&[
    field("destination_name", "name", FilterKind::Text),
    field("continent", "continent", FilterKind::ExactText),
    field("status", "status", FilterKind::ExactText),
    field("popular_study_cities", "popular_study_cities", FilterKind::Text),
    field("overall_trend", "overall_trend", FilterKind::ExactText),
    field("flag", "flag", FilterKind::ExactText),
]);

/// Dashboard tiles, counted over active destinations
const TILES: &[&str] = &["Canada", "UK", "Europe", "America", "Australia"];

/// GET /api/destinations - Paged destinations with continent tiles
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let query = ListQuery::new("destinations")?
        .filters(DESTINATION_FILTERS.parse(&params)?)
        .search(param(&params, "search"), &["name", "official_name"])
        .order_by(vec![OrderBy::asc("name")])
        .paginate(pagination(&params)?);
    let page = state.store.page(&query).await?;

    let mut statuses = Map::new();
    for continent in TILES {
        let active = ListQuery::new("destinations")?
            .base(Condition::eq("status", "active"))
            .base(Condition::eq("continent", *continent));
        let count = state.store.count(&active).await?;
        statuses.insert(continent.to_string(), json!({ "count": count, "label": continent }));
    }

    let data = json!({
        "number_of_tiles": TILES.len(),
        "statuses": statuses,
        "destinations": page.items,
        "current_page": page.current_page,
        "last_page": page.last_page,
        "total_records": page.total,
        "per_page": page.per_page,
    });
    Ok(ApiResponse::success(data).with_message("Destination list retrieved successfully."))
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Distinct values for the filter sidebar, in first-seen order
fn collect_options(destinations: &[Row]) -> Value {
    let mut flags = Vec::new();
    let mut continents = Vec::new();
    let mut cities = Vec::new();
    for destination in destinations {
        if let Some(flag) = destination.get("flag").and_then(Value::as_str) {
            push_unique(&mut flags, flag);
        }
        if let Some(continent) = destination.get("continent").and_then(Value::as_str) {
            push_unique(&mut continents, continent);
        }
        if let Some(list) = destination.get("popular_study_cities").and_then(Value::as_str) {
            for city in list.split(',') {
                push_unique(&mut cities, city.trim());
            }
        }
    }
    json!({
        "flags": flags,
        "continents": continents,
        "popular_study_cities": cities,
        "overall_trends": TRENDS,
        "statuses": STATUSES,
    })
}

/// GET /api/destinations/filter-options
pub async fn filter_options(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
) -> ApiResult {
    state.authorize(&actor, VIEW_TIERS, VIEW_CAPABILITIES).await?;

    let query = ListQuery::new("destinations")?.order_by(vec![OrderBy::asc("id")]);
    let destinations = state.store.all(&query, None).await?;
    Ok(ApiResponse::success(collect_options(&destinations)))
}
