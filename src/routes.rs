use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use axum::{extract::State, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Environment, CONFIG};
use crate::handlers;
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full application router: public health check plus the authenticated API
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(admission_routes())
        .merge(application_routes())
        .merge(agency_routes())
        .merge(organization_routes())
        .merge(destination_routes())
        .merge(elt_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    if matches!(CONFIG.environment, Environment::Development) {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = CONFIG
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn admission_routes() -> Router<AppState> {
    use handlers::admissions;

    Router::new()
        .route("/api/admissions", get(admissions::admissions_get))
        .route("/api/admissions/view", get(admissions::admissions_view))
        .route(
            "/api/admissions/:id",
            get(admissions::admission_get)
                .put(admissions::admission_put)
                .delete(admissions::admission_delete),
        )
        .route("/api/admissions/:id/notes", get(admissions::admission_notes))
        .route(
            "/api/admissions/:id/stage-history",
            get(admissions::admission_stage_history),
        )
}

fn application_routes() -> Router<AppState> {
    use handlers::applications;

    Router::new()
        .route(
            "/api/applications/:id/move-targets",
            get(applications::move_targets),
        )
        .route("/api/applications/:id/move", post(applications::move_application))
}

fn agency_routes() -> Router<AppState> {
    use handlers::agencies;

    Router::new()
        .route(
            "/api/agencies",
            get(agencies::get).post(agencies::post).delete(agencies::delete_bulk),
        )
        .route(
            "/api/agencies/:id",
            get(agencies::show).put(agencies::put).delete(agencies::delete),
        )
        .route(
            "/api/agencies/:id/notes",
            get(agencies::notes_get).post(agencies::notes_post),
        )
        .route(
            "/api/agencies/:id/notes/:note_id",
            put(agencies::notes_put).delete(agencies::notes_delete),
        )
}

fn organization_routes() -> Router<AppState> {
    use handlers::organizations;

    Router::new()
        .route(
            "/api/organizations",
            get(organizations::get).post(organizations::post),
        )
        .route(
            "/api/organizations/:id",
            get(organizations::show)
                .put(organizations::put)
                .delete(organizations::delete),
        )
        .route(
            "/api/organizations/:id/notes",
            get(organizations::notes_get).post(organizations::notes_post),
        )
        .route(
            "/api/organizations/:id/notes/:note_id",
            put(organizations::notes_put).delete(organizations::notes_delete),
        )
}

fn destination_routes() -> Router<AppState> {
    use handlers::destinations::{self, meta, rules};

    Router::new()
        .route(
            "/api/destinations",
            get(destinations::destinations_get).post(destinations::destination_post),
        )
        .route(
            "/api/destinations/filter-options",
            get(destinations::destination_filter_options),
        )
        .route(
            "/api/destinations/:id",
            get(destinations::destination_show)
                .put(destinations::destination_put)
                .patch(destinations::destination_patch)
                .delete(destinations::destination_delete),
        )
        .route(
            "/api/destinations/:id/status",
            put(destinations::destination_status),
        )
        .route(
            "/api/destinations/:id/rules",
            get(rules::list).post(rules::create),
        )
        .route("/api/destinations/:id/meta", get(meta::get).put(meta::put))
        .route(
            "/api/destination-rules/:id",
            put(rules::update).delete(rules::delete),
        )
        .route("/api/destination-rules/:id/position", put(rules::position))
}

fn elt_routes() -> Router<AppState> {
    use handlers::elt_requirements as elt;

    Router::new()
        .route("/api/elt-requirements", get(elt::list).post(elt::create))
        .route("/api/elt-requirements/pluck", get(elt::pluck))
        .route(
            "/api/elt-requirements/:id",
            put(elt::update).delete(elt::delete),
        )
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "message": "database unavailable",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
