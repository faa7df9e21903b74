//! Request plumbing shared by the record handlers: body extraction, field
//! validation, paging parameters and note shaping.

use std::collections::{BTreeMap, HashMap, HashSet};

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

use crate::database::record::{get_i64, get_str};
use crate::database::RecordStore;
use crate::error::{ApiError, FieldErrors};
use crate::filter::{Condition, ListQuery, Pagination, Row};

/// JSON object body. An empty body reads as an empty object so that
/// validation, not parsing, reports the missing fields.
#[derive(Debug, Clone, Default)]
pub struct JsonBody(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(Map::new()));
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(JsonBody(map)),
            Ok(_) => Err(ApiError::bad_request("Request body must be a JSON object")),
            Err(e) => Err(ApiError::bad_request(format!("Invalid JSON body: {}", e))),
        }
    }
}

/// Path parameters. A segment that does not parse is a 400 in the usual
/// error envelope.
#[derive(Debug, Clone, Copy)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| ApiPath(value))
            .map_err(|e| ApiError::bad_request(e.body_text()))
    }
}

/// `organization_email` -> `organization email`
fn label(field: &str) -> String {
    field.replace('_', " ")
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Collects field errors for one request body. Rules on a blank optional
/// field are skipped; `required` reports those.
pub struct Validator<'a> {
    body: &'a Map<String, Value>,
    errors: FieldErrors,
}

impl<'a> Validator<'a> {
    pub fn new(body: &'a Map<String, Value>) -> Self {
        Self { body, errors: FieldErrors::new() }
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        let value = self.body.get(field);
        if is_blank(value) {
            None
        } else {
            value
        }
    }

    pub fn fail(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.entry(field.to_string()).or_default().push(message.into());
        self
    }

    pub fn required(&mut self, field: &str) -> &mut Self {
        if self.present(field).is_none() {
            self.fail(field, format!("The {} field is required.", label(field)));
        }
        self
    }

    pub fn max_len(&mut self, field: &str, max: usize) -> &mut Self {
        if let Some(Value::String(s)) = self.present(field) {
            if s.chars().count() > max {
                self.fail(
                    field,
                    format!("The {} may not be greater than {} characters.", label(field), max),
                );
            }
        }
        self
    }

    pub fn email(&mut self, field: &str) -> &mut Self {
        if let Some(value) = self.present(field) {
            let ok = value
                .as_str()
                .and_then(|s| s.trim().split_once('@'))
                .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
                .unwrap_or(false);
            if !ok {
                self.fail(field, format!("The {} must be a valid email address.", label(field)));
            }
        }
        self
    }

    pub fn url(&mut self, field: &str) -> &mut Self {
        if let Some(value) = self.present(field) {
            let ok = value.as_str().map(|s| url::Url::parse(s.trim()).is_ok()).unwrap_or(false);
            if !ok {
                self.fail(field, format!("The {} format is invalid.", label(field)));
            }
        }
        self
    }

    pub fn one_of(&mut self, field: &str, allowed: &[&str]) -> &mut Self {
        if let Some(value) = self.present(field) {
            let text = match value {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            if !allowed.contains(&text.as_str()) {
                self.fail(field, format!("The selected {} is invalid.", label(field)));
            }
        }
        self
    }

    pub fn integer(&mut self, field: &str) -> &mut Self {
        if let Some(value) = self.present(field) {
            if as_integer(value).is_none() {
                self.fail(field, format!("The {} must be an integer.", label(field)));
            }
        }
        self
    }

    pub fn between(&mut self, field: &str, min: i64, max: i64) -> &mut Self {
        if let Some(n) = self.present(field).and_then(as_integer) {
            if n < min || n > max {
                self.fail(field, format!("The {} must be between {} and {}.", label(field), min, max));
            }
        }
        self
    }

    /// Laravel's `gt:0`
    pub fn positive(&mut self, field: &str) -> &mut Self {
        if let Some(value) = self.present(field) {
            if as_integer(value).map(|n| n <= 0).unwrap_or(true) {
                self.fail(field, format!("The {} must be greater than 0.", label(field)));
            }
        }
        self
    }

    pub fn array(&mut self, field: &str) -> &mut Self {
        if let Some(value) = self.present(field) {
            if !value.is_array() {
                self.fail(field, format!("The {} must be an array.", label(field)));
            }
        }
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 422 carrying every collected message, headed by the first one
    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let errors = std::mem::take(&mut self.errors);
        let message = errors
            .values()
            .flat_map(|messages| messages.first())
            .next()
            .cloned()
            .unwrap_or_else(|| "The given data was invalid.".to_string());
        Err(ApiError::validation_error(message, errors))
    }
}

/// Integer body field, accepting numeric strings
pub fn body_i64(body: &Map<String, Value>, field: &str) -> Option<i64> {
    body.get(field).and_then(as_integer)
}

pub fn body_str<'a>(body: &'a Map<String, Value>, field: &str) -> &'a str {
    body.get(field).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

/// Non-blank query parameter
pub fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn int_param(params: &HashMap<String, String>, key: &str) -> Result<Option<i64>, ApiError> {
    match param(params, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::invalid_field(key, format!("The {} must be an integer.", key))),
    }
}

/// `perPage` (or `per_page`) and `page` from the query string
pub fn pagination(params: &HashMap<String, String>) -> Result<Pagination, ApiError> {
    let per_page = match int_param(params, "perPage")? {
        Some(n) => Some(n),
        None => int_param(params, "per_page")?,
    };
    let page = int_param(params, "page")?;
    Ok(Pagination::new(per_page, page))
}

/// Laravel `ucwords`
pub fn ucwords(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses the timestamp shapes the stores return
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// "3 hours ago" style relative time
pub fn humanize(then: NaiveDateTime, now: NaiveDateTime) -> String {
    let seconds = (now - then).num_seconds();
    let (amount, future) = if seconds < 0 { (-seconds, true) } else { (seconds, false) };
    let (n, unit) = match amount {
        s if s < 60 => (s.max(1), "second"),
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 604_800 => (s / 86_400, "day"),
        s if s < 2_592_000 => (s / 604_800, "week"),
        s if s < 31_536_000 => (s / 2_592_000, "month"),
        s => (s / 31_536_000, "year"),
    };
    let plural = if n == 1 { "" } else { "s" };
    if future {
        format!("{} {}{} from now", n, unit, plural)
    } else {
        format!("{} {}{} ago", n, unit, plural)
    }
}

/// `user id -> name` for the given ids
pub async fn user_names(
    store: &dyn RecordStore,
    ids: impl IntoIterator<Item = i64>,
) -> Result<BTreeMap<i64, String>, ApiError> {
    let ids: HashSet<i64> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    let query = ListQuery::new("users")?
        .base(Condition::in_list("id", ids.into_iter().map(Value::from).collect()));
    let users = store.all(&query, None).await?;
    Ok(users
        .iter()
        .filter_map(|u| Some((get_i64(u, "id")?, get_str(u, "name").to_string())))
        .collect())
}

/// Note rows as the timeline widget expects them, newest first as given
pub fn shape_notes(notes: &[Row], authors: &BTreeMap<i64, String>) -> Vec<Value> {
    let now = Utc::now().naive_utc();
    notes
        .iter()
        .map(|note| {
            let created = parse_timestamp(get_str(note, "created_at"));
            let author = get_i64(note, "created_by").and_then(|id| authors.get(&id)).cloned();
            json!({
                "id": note.get("id").cloned().unwrap_or(Value::Null),
                "text": get_str(note, "description"),
                "author": author,
                "time": created.map(|t| humanize(t, now)),
                "pinned": false,
                "timestamp": created.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn collects_laravel_style_messages() {
        let input = body(json!({"name": "", "status": "closed", "brand_id": "0", "email": "nope"}));
        let mut v = Validator::new(&input);
        v.required("name")
            .one_of("status", &["active", "paused"])
            .positive("brand_id")
            .email("email");
        let err = v.finish().unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        let json = err.to_json();
        assert_eq!(json["errors"]["name"][0], "The name field is required.");
        assert_eq!(json["errors"]["status"][0], "The selected status is invalid.");
        assert_eq!(json["errors"]["brand_id"][0], "The brand id must be greater than 0.");
        assert_eq!(json["errors"]["email"][0], "The email must be a valid email address.");
    }

    #[test]
    fn optional_rules_skip_blank_fields() {
        let input = body(json!({"flag": null}));
        let mut v = Validator::new(&input);
        v.max_len("flag", 10).integer("success_rate").url("vac_appointment_url");
        assert!(v.finish().is_ok());
    }

    #[test]
    fn paging_parameters_accept_both_spellings() {
        let mut params = HashMap::new();
        params.insert("per_page".to_string(), "2".to_string());
        params.insert("page".to_string(), "5".to_string());
        let p = pagination(&params).unwrap();
        assert_eq!((p.per_page, p.page), (2, 5));

        params.insert("page".to_string(), "five".to_string());
        assert!(pagination(&params).is_err());
    }

    #[test]
    fn relative_times() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let hours = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(humanize(hours, now), "3 hours ago");
        assert_eq!(humanize(day, now), "1 day ago");
    }

    #[test]
    fn reads_store_timestamps() {
        assert!(parse_timestamp("2024-03-01 10:00:00").is_some());
        assert!(parse_timestamp("2024-03-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("2024-03-01T10:00:00+00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn capitalises_words() {
        assert_eq!(ucwords("visa fee"), "Visa Fee");
        assert_eq!(ucwords("visa_fee"), "Visa_fee");
    }
}
