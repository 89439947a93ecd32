#![forbid(unsafe_code)]

use std::{env, path::PathBuf, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use skillbridge_adapter::{
    config::AdapterConfig, AdapterHealthResponse, AdapterHttpReply, AdapterRuntime,
    API_PASSWORD_HEADER,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "skillbridge.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SKILLBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config_from_env()?;
    config.apply_env_overrides(|key| env::var(key).ok())?;
    let addr = config.bind_addr()?;
    let runtime = Arc::new(AdapterRuntime::from_config(&config)?);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/alexa", post(alexa))
        .route("/api/states/:entity_id", get(read_state).post(write_state))
        .with_state(runtime);

    info!(%addr, "skillbridge_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// `SKILLBRIDGE_CONFIG` if set, else `./skillbridge.toml` when present, else
/// built-in defaults with no intents.
fn load_config_from_env() -> Result<AdapterConfig, Box<dyn std::error::Error>> {
    if let Some(path) = env::var("SKILLBRIDGE_CONFIG")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        info!(path = %path, "loading config");
        return Ok(AdapterConfig::from_file(&PathBuf::from(path))?);
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_path.is_file() {
        info!(path = %default_path.display(), "loading config");
        return Ok(AdapterConfig::from_file(&default_path)?);
    }
    info!("no config file found; starting with defaults");
    Ok(AdapterConfig::default())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

async fn healthz(State(runtime): State<Arc<AdapterRuntime>>) -> Json<AdapterHealthResponse> {
    Json(runtime.health())
}

async fn alexa(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let password = password_from(&headers);
    run_blocking(move || runtime.handle_alexa(password.as_deref(), &body)).await
}

async fn read_state(
    State(runtime): State<Arc<AdapterRuntime>>,
    Path(entity_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let password = password_from(&headers);
    run_blocking(move || runtime.read_state(password.as_deref(), &entity_id)).await
}

async fn write_state(
    State(runtime): State<Arc<AdapterRuntime>>,
    Path(entity_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let password = password_from(&headers);
    run_blocking(move || runtime.write_state(password.as_deref(), &entity_id, &body)).await
}

fn password_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Template rendering and service calls block, so handlers leave the async
/// workers free.
async fn run_blocking<F>(f: F) -> Response
where
    F: FnOnce() -> AdapterHttpReply + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(reply) => into_response(reply),
        Err(err) => {
            error!(error = %err, "request task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn into_response(reply: AdapterHttpReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match reply.body {
        Some(body) => (status, Json(body)).into_response(),
        None => (status, [(header::CONTENT_TYPE, "application/json")], "").into_response(),
    }
}
