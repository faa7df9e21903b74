//! Moving an application from one admission to another.

use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use serde_json::{json, Map, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::{ActorContext, RoleTier};
use crate::database::record::{diff_rows, get_i64, get_str, stamp_updated};
use crate::database::StoreTx;
use crate::error::ApiError;
use crate::filter::{Condition, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::support::{body_i64, param, ApiPath, JsonBody, Validator};

const MOVERS: &[RoleTier] = &[RoleTier::SuperAdmin, RoleTier::AdminTeam];

/// Application columns carried onto the clone
const CLONED_FIELDS: &[&str] = &[
    "application_key",
    "university_id",
    "course",
    "stage_id",
    "name",
    "intake",
    "external_app_id",
    "status",
    "created_by",
    "brand_id",
    "created_at",
    "updated_at",
];

/// Compared between the original and the clone for the activity entry
const COMPARED_FIELDS: &[&str] = &[
    "application_key",
    "university_id",
    "deal_id",
    "course",
    "stage_id",
    "name",
    "intake",
    "external_app_id",
    "status",
    "created_by",
    "brand_id",
    "created_at",
    "updated_at",
];

/// Deal stage reached by an application stage. Stages above 12 map to 0.
pub fn deal_stage_for(application_stage: i64) -> i64 {
    match application_stage {
        0 => 0,
        1 | 2 => 1,
        3 | 4 => 2,
        5 | 6 => 3,
        7 | 8 => 4,
        9 | 10 => 5,
        11 => 6,
        12 => 7,
        _ => 0,
    }
}

fn pick(row: &Row, fields: &[&str]) -> Row {
    fields
        .iter()
        .map(|f| (f.to_string(), row.get(*f).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Sets the deal's stage from its furthest application. Deals without
/// applications keep their stage.
async fn recompute_deal_stage(tx: &mut Box<dyn StoreTx>, deal_id: i64) -> Result<(), ApiError> {
    let query = ListQuery::new("deal_applications")?
        .base(Condition::eq("deal_id", deal_id))
        .order_by(vec![OrderBy::desc("stage_id")]);
    let furthest = tx.all(&query).await?.into_iter().next();
    let Some(application) = furthest else {
        tracing::debug!("deal {} has no applications, stage unchanged", deal_id);
        return Ok(());
    };

    let stage = deal_stage_for(get_i64(&application, "stage_id").unwrap_or(0));
    let mut changes = Row::new();
    changes.insert("stage_id".into(), json!(stage));
    stamp_updated(&mut changes);
    tx.update("deals", deal_id, changes).await?;
    Ok(())
}

/// GET /api/applications/:id/move-targets?passport_number= - Deals of the same client
pub async fn move_targets(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.authorize(&actor, MOVERS, &[]).await?;

    let passport = param(&params, "passport_number").ok_or_else(|| {
        ApiError::invalid_field("passport_number", "The passport number field is required.")
    })?;
    if state.store.find("deal_applications", id).await?.is_none() {
        return Err(ApiError::not_found("Application not found."));
    }

    let query = ListQuery::new("admission_view")?
        .base(Condition::eq("passport_number", passport))
        .order_by(vec![OrderBy::asc("id")]);
    let deals = state.store.all(&query, None).await?;

    let targets: Map<String, Value> = deals
        .iter()
        .filter_map(|deal| {
            let label = [
                "name",
                "brand_name",
                "region_name",
                "branch_name",
                "assigned_user_name",
            ]
            .iter()
            .map(|c| get_str(deal, c))
            .collect::<Vec<_>>()
            .join("-");
            Some((get_i64(deal, "id")?.to_string(), Value::String(label)))
        })
        .collect();

    Ok(ApiResponse::success(targets))
}

/// POST /api/applications/:id/move - Re-home an application, its notes and tasks
pub async fn move_application(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    ApiPath(id): ApiPath<i64>,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(&actor, MOVERS, &[]).await?;

    Validator::new(&body)
        .required("deal_id")
        .integer("deal_id")
        .required("old_deal_id")
        .integer("old_deal_id")
        .finish()?;
    let deal_id = body_i64(&body, "deal_id").unwrap_or_default();
    let old_deal_id = body_i64(&body, "old_deal_id").unwrap_or_default();

    if deal_id == old_deal_id {
        return Err(ApiError::invalid_field(
            "deal_id",
            "The selected deal already contains this application.",
        ));
    }
    for (field, deal) in [("deal_id", deal_id), ("old_deal_id", old_deal_id)] {
        if state.store.find("deals", deal).await?.is_none() {
            return Err(ApiError::invalid_field(
                field,
                format!("The selected {} is invalid.", field.replace('_', " ")),
            ));
        }
    }

    let mut tx = state.store.begin().await?;

    let original = tx
        .find("deal_applications", id)
        .await?
        .ok_or_else(|| ApiError::not_found("Original application not found."))?;

    let mut clone = pick(&original, CLONED_FIELDS);
    clone.insert("deal_id".into(), json!(deal_id));
    let moved = tx.insert("deal_applications", clone).await?;
    let new_id = get_i64(&moved, "id")
        .ok_or_else(|| ApiError::internal_server_error("Stored application has no id"))?;

    let notes = ListQuery::new("application_notes")?
        .base(Condition::eq("application_id", id))
        .order_by(vec![OrderBy::asc("id")]);
    for note in tx.all(&notes).await? {
        let mut copy = pick(&note, &["title", "description", "created_by", "created_at", "updated_at"]);
        copy.insert("application_id".into(), json!(new_id));
        tx.insert("application_notes", copy).await?;
    }

    let tasks = ListQuery::new("deal_tasks")?
        .base(Condition::eq("related_to", id))
        .base(Condition::eq("related_type", "application"))
        .order_by(vec![OrderBy::asc("id")]);
    for mut task in tx.all(&tasks).await? {
        task.remove("id");
        task.insert("deal_id".into(), json!(new_id));
        task.insert("related_to".into(), json!(new_id));
        task.insert("status".into(), json!(1));
        tx.insert("deal_tasks", task).await?;
    }

    // The original goes before stages are recomputed so it no longer
    // counts towards the old deal.
    tx.delete_where("deal_applications", vec![Condition::eq("id", id)]).await?;
    recompute_deal_stage(&mut tx, deal_id).await?;
    recompute_deal_stage(&mut tx, old_deal_id).await?;

    tx.commit().await?;
    tracing::info!(
        "user {} moved application {} from deal {} to deal {} as {}",
        actor.id,
        id,
        old_deal_id,
        deal_id,
        new_id
    );

    let differences = diff_rows(
        &pick(&original, COMPARED_FIELDS),
        &pick(&moved, COMPARED_FIELDS),
        &[],
    );
    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            "application",
            new_id,
            "Application Moved",
            "Application Moved",
        )
        .message("Application moved to another deal successfully.")
        .changes(&differences)
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Application moved successfully.").with("app_id", new_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_map_pairs_application_stages() {
        let mapped: Vec<i64> = (0..=13).map(deal_stage_for).collect();
        assert_eq!(mapped, vec![0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 7, 0]);
    }
}
