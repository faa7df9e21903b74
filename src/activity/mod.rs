//! Activity log: every create, update and delete leaves an entry.
//!
//! Writing an entry never fails the request that caused it. Sink errors are
//! logged and dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::database::record::{self, FieldChange};
use crate::database::{RecordStore, StoreError};
use crate::filter::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Success,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub title: String,
    pub message: String,
    pub module_id: i64,
    pub module_type: String,
    pub notification_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
    pub created_by: i64,
}

impl ActivityEntry {
    pub fn new(
        kind: ActivityType,
        module_type: &str,
        module_id: i64,
        notification_type: &str,
        title: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            kind,
            message: title.clone(),
            title,
            module_id,
            module_type: module_type.to_string(),
            notification_type: notification_type.to_string(),
            changes: None,
            created_by: 0,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn by(mut self, actor_id: i64) -> Self {
        self.created_by = actor_id;
        self
    }

    pub fn changes(mut self, changes: &BTreeMap<String, FieldChange>) -> Self {
        self.changes = Some(json!(changes));
        self
    }

    /// Full before-image, for deletions
    pub fn snapshot(mut self, row: &Row) -> Self {
        self.changes = Some(Value::Object(row.clone()));
        self
    }
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, entry: ActivityEntry) -> Result<(), StoreError>;
}

/// Writes a `log_activities` row per entry; title, message and changes are
/// packed into the JSON `note` column.
pub struct StoreActivityLog {
    store: Arc<dyn RecordStore>,
}

impl StoreActivityLog {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActivityLog for StoreActivityLog {
    async fn record(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        let mut note = json!({"title": entry.title, "message": entry.message});
        if let (Some(changes), Some(obj)) = (&entry.changes, note.as_object_mut()) {
            obj.insert("changes".to_string(), changes.clone());
        }
        let mut row = Row::new();
        row.insert("type".into(), json!(entry.kind));
        row.insert("note".into(), Value::String(note.to_string()));
        row.insert("module_id".into(), json!(entry.module_id));
        row.insert("module_type".into(), json!(entry.module_type));
        row.insert("notification_type".into(), json!(entry.notification_type));
        row.insert("created_by".into(), json!(entry.created_by));
        record::stamp_created(&mut row);
        self.store.insert("log_activities", row).await?;
        Ok(())
    }
}

/// Emits entries as structured log events only
pub struct TracingActivityLog;

#[async_trait]
impl ActivityLog for TracingActivityLog {
    async fn record(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        tracing::info!(
            module_type = %entry.module_type,
            module_id = entry.module_id,
            notification_type = %entry.notification_type,
            "{}",
            entry.title
        );
        Ok(())
    }
}

/// Record an entry, logging instead of propagating sink failures
pub async fn emit(log: &dyn ActivityLog, entry: ActivityEntry) {
    let label = format!("{} {}", entry.module_type, entry.module_id);
    if let Err(e) = log.record(entry).await {
        tracing::error!("Failed to write activity log entry for {}: {}", label, e);
    }
}
