//! Notes attached to admissions, agencies and organizations.
//!
//! Listings go through the note scope: an actor sees notes written by the
//! employees their record scope covers, or only their own.

use serde_json::{json, Value};

use crate::activity::{self, ActivityEntry, ActivityType};
use crate::auth::{ActorContext, RoleTier};
use crate::database::record::{self, get_i64};
use crate::error::ApiError;
use crate::filter::{Condition, ListQuery, OrderBy, Row};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::support::{body_str, shape_notes, user_names, JsonBody, Validator};

/// Where a record type keeps its notes and who may touch them
#[derive(Debug, Clone, Copy)]
pub struct NoteSubject {
    pub parent_table: &'static str,
    pub notes_table: &'static str,
    pub parent_column: &'static str,
    pub module_type: &'static str,
    /// Display name used in messages, e.g. `Agency`
    pub label: &'static str,
    pub tiers: &'static [RoleTier],
    pub capabilities: &'static [&'static str],
}

pub const ADMISSION_NOTES: NoteSubject = NoteSubject {
    parent_table: "deals",
    notes_table: "deal_notes",
    parent_column: "deal_id",
    module_type: "deal",
    label: "Admission",
    tiers: super::admissions::VIEW_TIERS,
    capabilities: super::admissions::VIEW_CAPABILITIES,
};

pub const AGENCY_NOTES: NoteSubject = NoteSubject {
    parent_table: "agencies",
    notes_table: "agency_notes",
    parent_column: "agency_id",
    module_type: "agency",
    label: "Agency",
    tiers: &[RoleTier::SuperAdmin],
    capabilities: &["view organization"],
};

pub const ORGANIZATION_NOTES: NoteSubject = NoteSubject {
    parent_table: "organizations",
    notes_table: "organization_notes",
    parent_column: "organization_id",
    module_type: "organization",
    label: "Organization",
    tiers: &[RoleTier::SuperAdmin],
    capabilities: &["view organization"],
};

async fn require_parent(state: &AppState, subject: &NoteSubject, parent_id: i64) -> Result<Row, ApiError> {
    state
        .store
        .find(subject.parent_table, parent_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found.", subject.label)))
}

async fn require_note(
    state: &AppState,
    subject: &NoteSubject,
    parent_id: i64,
    note_id: i64,
) -> Result<Row, ApiError> {
    let note = state.store.find(subject.notes_table, note_id).await?;
    match note {
        Some(note) if get_i64(&note, subject.parent_column) == Some(parent_id) => Ok(note),
        _ => Err(ApiError::not_found("Note not found.")),
    }
}

async fn shaped(state: &AppState, note: &Row) -> Result<Value, ApiError> {
    let authors = user_names(state.store.as_ref(), get_i64(note, "created_by")).await?;
    Ok(shape_notes(std::slice::from_ref(note), &authors)
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

pub async fn list(state: &AppState, actor: &ActorContext, subject: &NoteSubject, parent_id: i64) -> ApiResult {
    state.authorize(actor, subject.tiers, subject.capabilities).await?;
    require_parent(state, subject, parent_id).await?;

    let scope = state.note_scope(actor).await;
    let query = ListQuery::new(subject.notes_table)?
        .base(Condition::eq(subject.parent_column, parent_id))
        .scope(scope)
        .order_by(vec![OrderBy::desc("created_at"), OrderBy::desc("id")]);
    let notes = state.store.all(&query, None).await?;

    let authors = user_names(
        state.store.as_ref(),
        notes.iter().filter_map(|n| get_i64(n, "created_by")),
    )
    .await?;

    Ok(ApiResponse::success(shape_notes(&notes, &authors))
        .with_message(format!("{} notes fetched successfully.", subject.label)))
}

pub async fn create(
    state: &AppState,
    actor: &ActorContext,
    subject: &NoteSubject,
    parent_id: i64,
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(actor, subject.tiers, subject.capabilities).await?;
    Validator::new(&body).required("description").finish()?;
    require_parent(state, subject, parent_id).await?;

    let mut row = Row::new();
    row.insert("description".into(), json!(body_str(&body, "description")));
    row.insert(subject.parent_column.into(), json!(parent_id));
    row.insert("created_by".into(), json!(actor.id));
    record::stamp_created(&mut row);
    let note = state.store.insert(subject.notes_table, row).await?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            subject.module_type,
            parent_id,
            &format!("{} Notes Created", subject.label),
            "Notes created",
        )
        .message(format!("{} notes created successfully", subject.label))
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::created(shaped(state, &note).await?).with_message("Notes added successfully"))
}

pub async fn update(
    state: &AppState,
    actor: &ActorContext,
    subject: &NoteSubject,
    (parent_id, note_id): (i64, i64),
    JsonBody(body): JsonBody,
) -> ApiResult {
    state.authorize(actor, subject.tiers, subject.capabilities).await?;
    Validator::new(&body).required("description").finish()?;
    require_note(state, subject, parent_id, note_id).await?;

    let mut changes = Row::new();
    changes.insert("description".into(), json!(body_str(&body, "description")));
    record::stamp_updated(&mut changes);
    let note = state
        .store
        .update(subject.notes_table, note_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Note not found."))?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Info,
            subject.module_type,
            parent_id,
            &format!("{} Notes Updated", subject.label),
            format!("{} Notes Updated", subject.label),
        )
        .message(format!("{} notes updated successfully", subject.label))
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::success(shaped(state, &note).await?).with_message("Notes updated successfully"))
}

pub async fn delete(
    state: &AppState,
    actor: &ActorContext,
    subject: &NoteSubject,
    (parent_id, note_id): (i64, i64),
) -> ApiResult {
    state.authorize(actor, subject.tiers, subject.capabilities).await?;
    require_note(state, subject, parent_id, note_id).await?;
    state.store.delete(subject.notes_table, note_id).await?;

    activity::emit(
        state.activity.as_ref(),
        ActivityEntry::new(
            ActivityType::Warning,
            subject.module_type,
            parent_id,
            &format!("{} Notes Deleted", subject.label),
            format!("{} Notes Deleted", subject.label),
        )
        .message(format!("{} notes deleted successfully", subject.label))
        .by(actor.id),
    )
    .await;

    Ok(ApiResponse::message("Notes deleted successfully"))
}
