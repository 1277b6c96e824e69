use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chronicle_core::{
    export_channel, export_forum, import_forum, ExportSummary, ForumExportSummary, ImportRequest,
    ReplayEngine, ReplayTarget,
};
use chronicle_net::HistorySource;
use chronicle_shared::Snowflake;
use chronicle_store::{store::validate_name, FailedBatchInfo};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::runs::{RunKind, RunOutput, RunRegistry, RunSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn HistorySource>,
    pub engine: ReplayEngine,
    pub runs: RunRegistry,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/export", post(export))
        .route("/export/forum", post(export_forum_route))
        .route("/import", post(import))
        .route("/import/forum", post(import_forum_route))
        .route("/runs", get(list_runs))
        .route("/runs/:id", get(get_run))
        .route("/runs/:id/cancel", post(cancel_run))
        .route("/failed-batch", get(failed_batch).delete(discard_failed_batch))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct ExportBody {
    channel_id: Snowflake,
}

#[derive(Deserialize)]
struct ImportBody {
    source: String,
    channel_id: Snowflake,
    #[serde(default)]
    thread_id: Option<Snowflake>,
    #[serde(default)]
    resume_failed: bool,
}

#[derive(Deserialize)]
struct ForumImportBody {
    source: String,
    guild_id: Snowflake,
    #[serde(default)]
    parent_id: Option<Snowflake>,
}

#[derive(Serialize)]
struct RunStarted {
    run_id: Uuid,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Ok(());
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    // Constant-time comparison to prevent timing attacks on the admin token.
    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

async fn require_admin_token(
    State(config): State<Arc<ServerConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    verify_admin_token(request.headers(), &config)?;
    Ok(next.run(request).await)
}

async fn export(
    State(state): State<AppState>,
    Json(body): Json<ExportBody>,
) -> Result<Json<ExportSummary>, ServerError> {
    let summary = export_channel(state.source.as_ref(), state.engine.store(), body.channel_id).await?;
    Ok(Json(summary))
}

async fn export_forum_route(
    State(state): State<AppState>,
    Json(body): Json<ExportBody>,
) -> Result<Json<ForumExportSummary>, ServerError> {
    let summary = export_forum(state.source.as_ref(), state.engine.store(), body.channel_id).await?;
    Ok(Json(summary))
}

/// Start a channel import. Preconditions are checked here so a rejected
/// import never creates a run.
async fn import(
    State(state): State<AppState>,
    Json(body): Json<ImportBody>,
) -> Result<Json<RunStarted>, ServerError> {
    validate_name(&body.source)?;
    let store = state.engine.store();
    if body.resume_failed {
        if !store.has_failed_batch() {
            return Err(ServerError::NotFound("no failed batch to resume".into()));
        }
    } else {
        store.ensure_no_failed_batch()?;
        store.resolve_import_source(&body.source)?;
    }

    let request = ImportRequest {
        source: body.source.clone(),
        target: ReplayTarget {
            channel: body.channel_id,
            thread: body.thread_id,
        },
        resume_failed: body.resume_failed,
    };
    let engine = state.engine.clone();
    let run_id = state
        .runs
        .start(RunKind::Import, body.source, move |ctx| async move {
            let outcome = engine.import(request, &ctx).await?;
            Ok(RunOutput::Replay(outcome))
        })
        .await?;
    Ok(Json(RunStarted { run_id }))
}

async fn import_forum_route(
    State(state): State<AppState>,
    Json(body): Json<ForumImportBody>,
) -> Result<Json<RunStarted>, ServerError> {
    validate_name(&body.source)?;
    let store = state.engine.store();
    store.ensure_no_failed_batch()?;
    store.read_atlas(&body.source)?;

    let engine = state.engine.clone();
    let atlas = body.source.clone();
    let run_id = state
        .runs
        .start(RunKind::ForumImport, body.source, move |ctx| async move {
            let outcome = import_forum(&engine, &atlas, body.guild_id, body.parent_id, &ctx).await?;
            Ok(RunOutput::Forum(outcome))
        })
        .await?;
    Ok(Json(RunStarted { run_id }))
}

async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSnapshot>> {
    Json(state.runs.list().await)
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, ServerError> {
    state
        .runs
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("run {id}")))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, ServerError> {
    Ok(Json(state.runs.cancel(id).await?))
}

async fn failed_batch(State(state): State<AppState>) -> Result<Json<FailedBatchInfo>, ServerError> {
    state
        .engine
        .store()
        .read_failed_batch_info()?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("no failed batch".into()))
}

async fn discard_failed_batch(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let discarded = state.engine.store().discard_failed_batch()?;
    Ok(Json(serde_json::json!({ "discarded": discarded })))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
