#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

use placement_crm_api::activity::StoreActivityLog;
use placement_crm_api::auth::{Claims, RoleTier};
use placement_crm_api::config::CONFIG;
use placement_crm_api::database::{MemoryStore, RecordStore, StoreError, StoreTx};
use placement_crm_api::filter::{Condition, ListQuery, Row};
use placement_crm_api::routes;
use placement_crm_api::scope::{StaticDirectory, StaticPermissionOracle};
use placement_crm_api::state::AppState;

pub const SUPER_ADMIN: i64 = 1;

/// Every capability the handlers check, as the super admin role holds them
pub const ADMIN_CAPABILITIES: &[&str] = &[
    "manage deal",
    "edit deal",
    "delete deal",
    "manage organization",
    "create organization",
    "delete organization",
    "show destination",
    "manage destination",
    "create destination",
    "edit destination",
    "delete destination",
];

/// Oracle knowing the super admin and every capability it holds
pub fn admin_oracle() -> StaticPermissionOracle {
    ADMIN_CAPABILITIES
        .iter()
        .fold(StaticPermissionOracle::new().with_tier(SUPER_ADMIN, RoleTier::SuperAdmin), |oracle, cap| {
            oracle.grant(SUPER_ADMIN, cap)
        })
}

pub struct TestApp {
    pub store: MemoryStore,
    router: Router,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }
}

impl TestApp {
    /// In-memory app; activity entries land in the store's `log_activities`
    pub fn new(store: MemoryStore, oracle: StaticPermissionOracle) -> Self {
        Self::with_directory(store, oracle, StaticDirectory::new())
    }

    pub fn with_directory(store: MemoryStore, oracle: StaticPermissionOracle, directory: StaticDirectory) -> Self {
        let shared: Arc<dyn RecordStore> = Arc::new(store.clone());
        Self::build(store, shared, oracle, directory)
    }

    /// Handlers write through a store whose deletes always fail; activity
    /// still lands in `store`.
    pub fn refusing_deletes(store: MemoryStore, oracle: StaticPermissionOracle) -> Self {
        let shared: Arc<dyn RecordStore> = Arc::new(RefusingDeletes(store.clone()));
        Self::build(store, shared, oracle, StaticDirectory::new())
    }

    fn build(
        store: MemoryStore,
        records: Arc<dyn RecordStore>,
        oracle: StaticPermissionOracle,
        directory: StaticDirectory,
    ) -> Self {
        let log = StoreActivityLog::new(Arc::new(store.clone()));
        let state = AppState::new(records, Arc::new(oracle), Arc::new(directory), Arc::new(log));
        Self { store, router: routes::app(state) }
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<Reply> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json)?)
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(Reply { status, headers, text: String::from_utf8(bytes.to_vec())? })
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<Reply> {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<Reply> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Result<Reply> {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> Result<Reply> {
        self.send(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Result<Reply> {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    /// Activity entries written so far, as `(notification_type, decoded note)`
    pub async fn activity(&self) -> Vec<(String, Value)> {
        self.store
            .rows("log_activities")
            .await
            .iter()
            .map(|row| {
                let kind = row["notification_type"].as_str().unwrap_or_default().to_string();
                let note = row["note"]
                    .as_str()
                    .and_then(|n| serde_json::from_str(n).ok())
                    .unwrap_or(Value::Null);
                (kind, note)
            })
            .collect()
    }
}

pub struct TokenFor {
    pub claims: Claims,
}

/// Claims for `sub` with a one hour lifetime
pub fn token_for(sub: i64, role: &str) -> TokenFor {
    TokenFor {
        claims: Claims {
            sub,
            role: role.to_string(),
            brand_id: None,
            region_id: None,
            branch_id: None,
            agent_id: None,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        },
    }
}

impl TokenFor {
    pub fn branch(mut self, branch_id: i64) -> Self {
        self.claims.branch_id = Some(branch_id);
        self
    }

    pub fn agent(mut self, agent_id: i64) -> Self {
        self.claims.agent_id = Some(agent_id);
        self
    }

    pub fn sign(&self) -> String {
        let key = EncodingKey::from_secret(CONFIG.security.jwt_secret.as_bytes());
        encode(&Header::default(), &self.claims, &key).expect("sign test token")
    }
}

pub fn admin_token() -> String {
    token_for(SUPER_ADMIN, "super admin").sign()
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("fixture rows are objects")
}

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values.into_iter().map(row).collect()
}

/// `MemoryStore` whose deletes fail, for checking nothing is logged when a
/// delete does not happen
pub struct RefusingDeletes(pub MemoryStore);

#[async_trait]
impl RecordStore for RefusingDeletes {
    async fn fetch(&self, query: &ListQuery) -> Result<Vec<Row>, StoreError> {
        self.0.fetch(query).await
    }

    async fn count(&self, query: &ListQuery) -> Result<u64, StoreError> {
        self.0.count(query).await
    }

    async fn all(&self, query: &ListQuery, cap: Option<u64>) -> Result<Vec<Row>, StoreError> {
        self.0.all(query, cap).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        self.0.insert(table, row).await
    }

    async fn update(&self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError> {
        self.0.update(table, id, changes).await
    }

    async fn delete_where(&self, table: &str, _conditions: Vec<Condition>) -> Result<u64, StoreError> {
        Err(StoreError::Query(format!("deletes from {} are disabled", table)))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.0.begin().await
    }
}
