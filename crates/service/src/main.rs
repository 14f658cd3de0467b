use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use highlighter_core::{
    DatasetTable, HighlightError, HighlightStore, HighlighterConfig, RowLookup, StoredHighlights,
};

struct AppState {
    table: DatasetTable,
    store: HighlightStore,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let config = HighlighterConfig::load(None)?;
    let state = Arc::new(AppState {
        table: DatasetTable::load_or_empty(&config),
        store: HighlightStore::new(&config.store_path),
    });
    let app = router(state);
    let addr: SocketAddr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr, "store" = %config.store_path.display());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/api/columns", get(handle_columns))
        .route("/api/row/:row_index", get(handle_row))
        .route(
            "/api/highlights",
            post(handle_submit_highlights).get(handle_list_highlights),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("signal_error" = %err);
        return;
    }
    info!("shutting down");
}

#[derive(Debug, Serialize)]
struct ColumnsResponse {
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct HighlightsResponse {
    highlights: StoredHighlights,
}

async fn handle_index() -> &'static str {
    "Highlight server is running."
}

async fn handle_columns(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ColumnsResponse>, AppError> {
    if state.table.is_empty() {
        return Err(AppError::unavailable("No columns found."));
    }
    Ok(Json(ColumnsResponse {
        columns: state.table.columns().to_vec(),
    }))
}

async fn handle_row(
    State(state): State<Arc<AppState>>,
    row_index: Result<AxumPath<i64>, PathRejection>,
) -> Result<Json<RowLookup>, AppError> {
    let AxumPath(row_index) = row_index.map_err(|_| AppError::bad_request("Invalid row index."))?;
    let lookup = state
        .table
        .get_row(row_index)
        .map_err(AppError::bad_request)?;
    Ok(Json(lookup))
}

async fn handle_submit_highlights(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let body: Value = serde_json::from_slice(&body).map_err(|_| HighlightError::NoData)?;
    let response = task::spawn_blocking(move || {
        state.store.submit(&body, &state.table)?;
        Ok::<_, AppError>(MessageResponse {
            message: format!(
                "Highlights saved to {} successfully.",
                state.store.path().display()
            ),
        })
    })
    .await
    .map_err(AppError::internal)??;
    Ok(Json(response))
}

async fn handle_list_highlights(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HighlightsResponse>, AppError> {
    let highlights = task::spawn_blocking(move || state.store.load())
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)?;
    Ok(Json(HighlightsResponse { highlights }))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Highlight(#[from] HighlightError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn unavailable<E: ToString>(msg: E) -> Self {
        Self::Unavailable(msg.to_string())
    }

    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Highlight(err) => {
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
