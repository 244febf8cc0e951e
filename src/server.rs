//! HTTP server.
//!
//! Thin JSON layer over [`Hub`], plus a server-sent-events endpoint that
//! streams comments on one recipe as they are added.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, bus state, live subscribers) |
//! | `POST` | `/users` | Create a user |
//! | `GET`  | `/recipes` | List recipes |
//! | `POST` | `/recipes` | Create a recipe (author from `x-user-id`) |
//! | `GET`  | `/recipes/{id}` | Fetch one recipe |
//! | `PUT`  | `/recipes/{id}` | Patch a recipe (author only) |
//! | `DELETE` | `/recipes/{id}` | Delete a recipe (author only) |
//! | `GET`  | `/recipes/{id}/comments` | Comments on a recipe, oldest first |
//! | `POST` | `/recipes/{id}/comments` | Add a comment (author from `x-user-id`) |
//! | `GET`  | `/recipes/{id}/comments/stream` | SSE stream of new comments |
//! | `POST` | `/search` | Fuzzy text + required-ingredient search |
//!
//! Recipe writes answer `{"record": .., "indexWarning": null | "<message>"}`.
//! A non-null warning means the write is stored but search may lag.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "recipe not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `conflict` (409), `unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use recipehub_core::bus::InProcessBus;
use recipehub_core::filter::COMMENT_ADDED_TOPIC;
use recipehub_core::hub::Hub;
use recipehub_core::models::{
    Comment, Recipe, RecipeInput, RecipePatch, SearchDocument, SearchQuery, User,
};
use recipehub_core::recipes::WriteOutcome;
use recipehub_core::CoreError;

use crate::app::App;
use crate::config::Config;

/// Header carrying the acting user's id. Authentication happens upstream.
pub const USER_HEADER: &str = "x-user-id";

/// Shared state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub bus: Arc<InProcessBus>,
}

/// Builds the router without binding a listener.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/users", post(handle_create_user))
        .route("/recipes", get(handle_list_recipes).post(handle_create_recipe))
        .route(
            "/recipes/{id}",
            get(handle_get_recipe)
                .put(handle_update_recipe)
                .delete(handle_delete_recipe),
        )
        .route(
            "/recipes/{id}/comments",
            get(handle_list_comments).post(handle_create_comment),
        )
        .route("/recipes/{id}/comments/stream", get(handle_comment_stream))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
///
/// On shutdown the hub drains queued notifications and closes the bus,
/// which also ends every open comment stream.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let state = AppState {
        hub: app.hub.clone(),
        bus: app.bus.clone(),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "recipehub server listening");
    println!("Recipe Hub listening on http://{}", config.server.bind);

    let hub = app.hub.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
            hub.shutdown().await;
        })
        .await?;

    app.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotFound { .. } => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            CoreError::Conflict(_) => AppError::new(StatusCode::CONFLICT, "conflict", message),
            CoreError::Forbidden(_) => AppError::new(StatusCode::FORBIDDEN, "forbidden", message),
            CoreError::InvalidInput(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            CoreError::TransportUnavailable(_) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
            }
            CoreError::MalformedPayload(_) => {
                tracing::error!(error = %message, "malformed data reached the HTTP layer");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

fn acting_user(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                format!("missing {} header", USER_HEADER),
            )
        })
}

// ============ GET /health ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    bus_connected: bool,
    comment_subscribers: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        bus_connected: state.bus.is_connected(),
        comment_subscribers: state.bus.subscriber_count(COMMENT_ADDED_TOPIC),
    })
}

// ============ Users ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    username: String,
    #[serde(default)]
    display_name: Option<String>,
}

async fn handle_create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "username must not be empty",
        ));
    }
    let user = state
        .hub
        .create_user(username, req.display_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

// ============ Recipes ============

async fn handle_list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, AppError> {
    Ok(Json(state.hub.list_recipes().await?))
}

async fn handle_create_recipe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RecipeInput>,
) -> Result<(StatusCode, Json<WriteOutcome<Recipe>>), AppError> {
    let author = acting_user(&headers)?;
    let outcome = state.hub.create_recipe(&author, &input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn handle_get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, AppError> {
    Ok(Json(state.hub.get_recipe(&id).await?))
}

async fn handle_update_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<RecipePatch>,
) -> Result<Json<WriteOutcome<Recipe>>, AppError> {
    let actor = acting_user(&headers)?;
    Ok(Json(state.hub.update_recipe(&id, &actor, &patch).await?))
}

async fn handle_delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<WriteOutcome<Recipe>>, AppError> {
    let actor = acting_user(&headers)?;
    Ok(Json(state.hub.delete_recipe(&id, &actor).await?))
}

// ============ Comments ============

#[derive(Deserialize)]
struct CreateCommentRequest {
    text: String,
}

async fn handle_list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Comment>>, AppError> {
    state.hub.get_recipe(&id).await?;
    Ok(Json(state.hub.comments_for_recipe(&id).await?))
}

async fn handle_create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let author = acting_user(&headers)?;
    // A missing recipe is a 404 here rather than a foreign-key conflict.
    state.hub.get_recipe(&id).await?;
    let comment = state.hub.create_comment(&req.text, &id, &author).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Streams `commentAdded` events for one recipe. The stream ends when the
/// client disconnects or the bus goes away; clients reconnect and get only
/// comments added after that.
async fn handle_comment_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.hub.get_recipe(&id).await?;
    let feed = state.hub.subscribe_comments_for_recipe(&id).await?;
    tracing::debug!(recipe_id = %id, "comment stream opened");

    let events = feed.into_stream().filter_map(|comment| async move {
        match Event::default().event(COMMENT_ADDED_TOPIC).json_data(&comment) {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                tracing::warn!(comment_id = %comment.id, error = %err, "failed to encode comment event");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

// ============ POST /search ============

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchDocument>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state.hub.search(&query).await?;
    Ok(Json(SearchResponse { results }))
}
