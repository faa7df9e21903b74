//! Response shapes for listings: paged JSON, kanban board and CSV export.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::database::RowStream;
use crate::filter::{Page, Row};

/// Paged listing envelope
pub fn list_envelope(page: Page<Row>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("status".into(), json!("success"));
    body.insert(
        "data".into(),
        Value::Array(page.items.into_iter().map(Value::Object).collect()),
    );
    body.insert("current_page".into(), json!(page.current_page));
    body.insert("last_page".into(), json!(page.last_page));
    body.insert("total_records".into(), json!(page.total));
    body.insert("per_page".into(), json!(page.per_page));
    body
}

/// Stage id -> (accent colour, background colour)
pub fn stage_colors(stage_id: i64) -> (&'static str, &'static str) {
    match stage_id {
        1 => ("#4F46E5", "#eef2ff"),
        2 => ("#F59E0B", "#fff7ed"),
        3 => ("#22C55E", "#f0fdf4"),
        4 => ("#EC928E", "#fef2f2"),
        5 => ("#0EA5E9", "#e0f2fe"),
        6 => ("#6B7280", "#f3f4f6"),
        _ => ("#000", "#fff"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KanbanColumn {
    pub stage_id: i64,
    pub title: String,
    pub count: usize,
    pub color: &'static str,
    #[serde(rename = "bgColor")]
    pub bg_color: &'static str,
    pub deals: Vec<Value>,
}

/// Which row fields make up a card, as (card key, row column)
pub type CardLayout = &'static [(&'static str, &'static str)];

/// Group rows under every stage, in stage order. Stages without rows still
/// get a column; rows whose stage is not listed are dropped.
pub fn kanban_board(stages: &[Row], rows: &[Row], card: CardLayout) -> Vec<KanbanColumn> {
    stages
        .iter()
        .filter_map(|stage| {
            let stage_id = crate::database::record::get_i64(stage, "id")?;
            let deals: Vec<Value> = rows
                .iter()
                .filter(|row| crate::database::record::get_i64(row, "stage_id") == Some(stage_id))
                .map(|row| {
                    let mut c = Map::new();
                    for (key, column) in card {
                        c.insert(key.to_string(), row.get(*column).cloned().unwrap_or(Value::Null));
                    }
                    Value::Object(c)
                })
                .collect();
            let (color, bg_color) = stage_colors(stage_id);
            Some(KanbanColumn {
                stage_id,
                title: crate::database::record::get_str(stage, "name").to_string(),
                count: deals.len(),
                color,
                bg_color,
                deals,
            })
        })
        .collect()
}

/// `total_records` counts the cards on the board, so rows dropped for an
/// unknown stage are not included.
pub fn kanban_envelope(board: Vec<KanbanColumn>) -> Map<String, Value> {
    let total_records: usize = board.iter().map(|column| column.count).sum();
    let mut body = Map::new();
    body.insert("status".into(), json!("success"));
    body.insert("view".into(), json!("kanban"));
    body.insert("data".into(), json!(board));
    body.insert("total_records".into(), json!(total_records));
    body
}

/// CSV columns as (header, row column)
pub type CsvLayout = &'static [(&'static str, &'static str)];

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One encoded CSV line
pub fn csv_line<I, S>(fields: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

pub fn csv_row(layout: CsvLayout, row: &Row) -> Result<Vec<u8>, csv::Error> {
    csv_line(layout.iter().map(|(_, column)| cell(row.get(*column))))
}

/// Streams `rows` as an attachment, one encoded line per row
pub fn csv_response(filename: &str, layout: CsvLayout, rows: RowStream) -> Response {
    let header_line = csv_line(layout.iter().map(|(h, _)| *h));
    let head = futures::stream::once(async move { header_line.map_err(std::io::Error::other) });
    let body = rows.map(move |row| match row {
        Ok(row) => csv_row(layout, &row).map_err(std::io::Error::other),
        Err(e) => {
            tracing::error!("CSV export aborted: {}", e);
            Err(std::io::Error::other(e))
        }
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(head.chain(body)),
    )
        .into_response()
}
