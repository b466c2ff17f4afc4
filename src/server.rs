//! JSON HTTP API over the advisor.
//!
//! A thin surface for local tooling: editors, dashboards, and scripts talk
//! to the same [`Advisor`] the CLI uses.
//!
//! # Endpoints
//!
//! | Method   | Path              | Description                          |
//! |----------|-------------------|--------------------------------------|
//! | `GET`    | `/health`         | Health check (returns version)       |
//! | `POST`   | `/projects`       | Ingest a project by root path        |
//! | `GET`    | `/projects`       | List ingested projects               |
//! | `GET`    | `/projects/{id}`  | One project's profile                |
//! | `DELETE` | `/projects/{id}`  | Delete a project and its index data  |
//! | `POST`   | `/ask`            | Ask a question about a project       |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `stale_embeddings`
//! (409), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: this is a local tooling
//! surface, not a public API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::advisor::{Advisor, IngestReport};
use crate::config::Config;
use crate::error::AdvisorError;
use crate::models::{AskResponse, ProjectProfile};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    advisor: Arc<Advisor>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let advisor = Advisor::open(config.clone()).await?;
    let state = AppState {
        advisor: Arc::new(advisor),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/projects", post(handle_ingest).get(handle_list_projects))
        .route(
            "/projects/{id}",
            get(handle_get_project).delete(handle_delete_project),
        )
        .route("/ask", post(handle_ask))
        .layer(cors)
        .with_state(state);

    println!("Advisor server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable
/// message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 404 Not Found error.
fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Maps advisor errors onto HTTP statuses: caller mistakes are 4xx, a
/// stale index is 409, and the rest stays 500.
fn classify_error(err: AdvisorError) -> AppError {
    match &err {
        AdvisorError::InvalidQuery(msg) if msg.contains("unknown project") => not_found(msg),
        AdvisorError::InvalidQuery(_)
        | AdvisorError::InvalidArgument { .. }
        | AdvisorError::Scan { .. } => bad_request(err.to_string()),
        AdvisorError::UnknownFunction(_) => not_found(err.to_string()),
        AdvisorError::StaleEmbeddings { .. } => AppError {
            status: StatusCode::CONFLICT,
            code: "stale_embeddings".to_string(),
            message: err.to_string(),
        },
        _ => AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        },
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /projects ============

/// JSON request body for `POST /projects`.
#[derive(Deserialize)]
struct IngestRequest {
    root_path: String,
}

/// Handler for `POST /projects`: scan and ingest the project at
/// `root_path`, replacing any previous ingestion of the same root.
async fn handle_ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, AppError> {
    if request.root_path.trim().is_empty() {
        return Err(bad_request("root_path must not be empty"));
    }
    let report = state
        .advisor
        .ingest_project(std::path::Path::new(&request.root_path))
        .await
        .map_err(classify_error)?;
    Ok(Json(report))
}

// ============ GET /projects ============

/// JSON response body for `GET /projects`.
#[derive(Serialize)]
struct ProjectListResponse {
    projects: Vec<ProjectProfile>,
}

/// Handler for `GET /projects`.
async fn handle_list_projects(
    State(state): State<AppState>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let projects = state.advisor.list_projects().await.map_err(classify_error)?;
    Ok(Json(ProjectListResponse { projects }))
}

// ============ GET /projects/{id} ============

/// Handler for `GET /projects/{id}`.
async fn handle_get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectProfile>, AppError> {
    let profile = state
        .advisor
        .get_project(&id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("unknown project: {}", id)))?;
    Ok(Json(profile))
}

// ============ DELETE /projects/{id} ============

/// Handler for `DELETE /projects/{id}`.
async fn handle_delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .advisor
        .delete_project(&id)
        .await
        .map_err(classify_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("unknown project: {}", id)))
    }
}

// ============ POST /ask ============

/// JSON request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    session_id: Option<String>,
    project_id: String,
    query: String,
}

/// Handler for `POST /ask`: run one query through the pipeline. The
/// response carries the session id to pass back for follow-up questions.
async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let response = state
        .advisor
        .ask(
            request.session_id.as_deref(),
            &request.project_id,
            &request.query,
        )
        .await
        .map_err(classify_error)?;
    Ok(Json(response))
}
