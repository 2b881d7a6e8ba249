//! REST API server for the item collection.
//!
//! Exposes CRUD over catalog items as a JSON HTTP API for the browser
//! client and the `stk` management commands.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/api/items` | List all items |
//! | `GET`    | `/api/items/{id}` | Fetch one item |
//! | `POST`   | `/api/items/add` | Create an item (201) |
//! | `PUT`    | `/api/items/update/{id}` | Replace an item, version-checked |
//! | `DELETE` | `/api/items/{id}` | Delete an item |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "version_conflict", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `validation` (400, with a per-field
//! map), `store_error` (400), `not_found` (404), `version_conflict` (409).
//! Clients branch on `version_conflict`: it is the marker the save-retry
//! loop uses to tell a concurrency loss apart from other rejections.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients. The JSON body cap is configurable (`[server].max_body_mb`,
//! default 10 MB) so inline `data:` images fit.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db;
use crate::models::{Item, ValidatedItem, VersionToken};
use crate::reconcile;
use crate::store::{self, StoreError};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
}

/// Builds the application router over an open item-store pool.
///
/// Split out from [`run_server`] so tests can mount the full API on an
/// ephemeral listener.
pub fn app(pool: SqlitePool, max_body_mb: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/items", get(handle_list))
        .route("/api/items/add", post(handle_add))
        .route("/api/items/update/{id}", put(handle_update))
        .route("/api/items/{id}", get(handle_get).delete(handle_delete))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_mb * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pool })
}

/// Starts the REST API server on the configured bind address.
///
/// Runs until the process is terminated. `stk serve` is the standard entry
/// point.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let router = app(pool, config.server.max_body_mb);

    tracing::info!(bind = %config.server.bind, "item API listening");
    println!("Item API listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable
/// message; validation failures also carry the per-field map.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, String>>,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    fields: Option<BTreeMap<String, String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                fields: self.fields,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
        fields: None,
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
        fields: None,
    }
}

/// 409 with the `version_conflict` code the retry loop branches on.
fn version_conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "version_conflict".to_string(),
        message: message.into(),
        fields: None,
    }
}

/// 400 with the field map from a failed payload validation.
fn validation_error(errors: reconcile::ValidationErrors) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "validation".to_string(),
        message: format!("invalid item fields: {}", errors),
        fields: Some(errors.fields),
    }
}

/// Maps store failures to responses. Store-level faults stay 400 so the
/// client contract has exactly one success shape and one error shape per
/// route.
fn classify_store_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound(id) => not_found(format!("item not found: {}", id)),
        StoreError::VersionConflict(id) => version_conflict(format!(
            "item {} changed since last read; refetch and retry",
            id
        )),
        StoreError::CatalogNumberTaken(n) => {
            bad_request(format!("catalog number already in use: {}", n))
        }
        StoreError::Corrupt { .. } | StoreError::Db(_) => AppError {
            status: StatusCode::BAD_REQUEST,
            code: "store_error".to_string(),
            message: err.to_string(),
            fields: None,
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check used by monitors and the CLI's connectivity probe.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /api/items ============

async fn handle_list(State(state): State<AppState>) -> Result<Json<Vec<Item>>, AppError> {
    let items = store::list_items(&state.pool)
        .await
        .map_err(classify_store_error)?;
    Ok(Json(items))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, AppError> {
    let item = store::get_item(&state.pool, &id)
        .await
        .map_err(classify_store_error)?;
    Ok(Json(item))
}

async fn handle_add(
    State(state): State<AppState>,
    Json(payload): Json<ValidatedItem>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let errors = reconcile::check_fields(&payload);
    if !errors.is_empty() {
        return Err(validation_error(errors));
    }

    let item = store::insert_item(&state.pool, &payload)
        .await
        .map_err(classify_store_error)?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Full replacement payload: the item's fields plus the version token the
/// client last read. Extra fields from a serialized `Item` (id, timestamps)
/// are accepted and ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateItemPayload {
    #[serde(flatten)]
    fields: ValidatedItem,
    version: VersionToken,
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateItemPayload>,
) -> Result<Json<Item>, AppError> {
    let errors = reconcile::check_fields(&payload.fields);
    if !errors.is_empty() {
        return Err(validation_error(errors));
    }

    let item = store::replace_item(&state.pool, &id, &payload.fields, payload.version)
        .await
        .map_err(classify_store_error)?;
    Ok(Json(item))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    message: String,
    deleted_item: Item,
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let item = store::delete_item(&state.pool, &id)
        .await
        .map_err(classify_store_error)?;
    Ok(Json(DeleteResponse {
        message: "Item deleted successfully".to_string(),
        deleted_item: item,
    }))
}
