use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use adk_rust::prelude::*;
use adk_session::SessionService;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::RuntimeConfig;
use crate::eval::round_metric;
use crate::model::resolve_model;
use crate::runner::{build_agent_graph, build_runner_with_session_service};
use crate::session::build_session_service;
use crate::streaming::run_prompt;
use crate::telemetry::TelemetrySink;

/// Shared state behind the HTTP analyst endpoint. One agent graph serves
/// every request; runners are cached per user/session pair on top of it.
#[derive(Clone)]
pub struct ServerState {
    pub cfg: RuntimeConfig,
    pub telemetry: TelemetrySink,
    pub agent: Arc<dyn Agent>,
    pub session_service: Arc<dyn SessionService>,
    pub backend_label: String,
    pub model_name: String,
    pub runner_cache: Arc<tokio::sync::RwLock<HashMap<String, Arc<Runner>>>>,
    pub auth_token: Option<String>,
    pub runner_cache_max: usize,
}

#[derive(Debug, Serialize)]
pub struct ServerHealthResponse {
    pub status: &'static str,
    pub app_name: String,
    pub profile: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerAskRequest {
    pub prompt: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServerAskResponse {
    pub answer: String,
    pub backend: String,
    pub model: String,
    pub session_id: String,
    pub user_id: String,
}

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub fn server_runner_cache_key(cfg: &RuntimeConfig) -> String {
    format!("{}::{}", cfg.user_id, cfg.session_id)
}

/// Returns a cached runner for the request's user/session pair, building
/// one on miss. The second status element reports the cache outcome.
pub async fn get_or_build_server_runner(
    state: &ServerState,
    cfg: &RuntimeConfig,
) -> Result<(Arc<Runner>, &'static str)> {
    let key = server_runner_cache_key(cfg);
    {
        let cache = state.runner_cache.read().await;
        if let Some(runner) = cache.get(&key) {
            return Ok((runner.clone(), "hit"));
        }
    }

    let runner = Arc::new(
        build_runner_with_session_service(state.agent.clone(), cfg, state.session_service.clone())
            .await?,
    );

    let mut cache = state.runner_cache.write().await;
    if let Some(existing) = cache.get(&key) {
        // Another request built the same runner while this one held no lock.
        return Ok((existing.clone(), "hit-race"));
    }

    if cache.len() >= state.runner_cache_max
        && let Some(evict_key) = cache.keys().next().cloned()
    {
        cache.remove(&evict_key);
        tracing::info!(
            evicted_key = %evict_key,
            cache_size = cache.len(),
            "server runner cache eviction"
        );
    }

    cache.insert(key, runner.clone());
    Ok((runner, "miss"))
}

pub fn check_server_auth(
    state: &ServerState,
    headers: &axum::http::HeaderMap,
) -> Result<(), ApiError> {
    let Some(expected_token) = state.auth_token.as_deref() else {
        // No token configured, endpoint is open.
        return Ok(());
    };

    let provided_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if provided_token.is_empty() || provided_token != expected_token {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "missing or invalid Authorization bearer token",
        ));
    }
    Ok(())
}

pub async fn handle_server_health(
    State(state): State<Arc<ServerState>>,
) -> Json<ServerHealthResponse> {
    Json(ServerHealthResponse {
        status: "ok",
        app_name: state.cfg.app_name.clone(),
        profile: state.cfg.profile.clone(),
        model: state.model_name.clone(),
    })
}

fn validated_ask_prompt(cfg: &RuntimeConfig, raw: &str) -> Result<String, ApiError> {
    let prompt = raw.trim();
    if prompt.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "prompt cannot be empty for /v1/ask",
        ));
    }
    if prompt.chars().count() > cfg.max_prompt_chars {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "prompt exceeds the maximum of {} characters",
                cfg.max_prompt_chars
            ),
        ));
    }
    Ok(prompt.to_string())
}

pub async fn handle_server_ask(
    State(state): State<Arc<ServerState>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ServerAskRequest>,
) -> ApiResult<ServerAskResponse> {
    check_server_auth(&state, &headers)?;
    let started_at = Instant::now();

    let mut cfg = state.cfg.clone();
    if let Some(session_id) = request.session_id {
        cfg.session_id = session_id;
    }
    if let Some(user_id) = request.user_id {
        cfg.user_id = user_id;
    }
    let prompt = validated_ask_prompt(&cfg, &request.prompt)?;

    let (runner, cache_status) = get_or_build_server_runner(&state, &cfg)
        .await
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let answer = run_prompt(runner.as_ref(), &cfg, &prompt, &state.telemetry)
        .await
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    state.telemetry.emit(
        "server.ask",
        json!({
            "backend": state.backend_label.clone(),
            "model": state.model_name.clone(),
            "session_id": cfg.session_id.clone(),
            "user_id": cfg.user_id.clone(),
            "runner_cache": cache_status,
            "latency_ms": round_metric(started_at.elapsed().as_secs_f64() * 1000.0)
        }),
    );

    Ok(Json(ServerAskResponse {
        answer,
        backend: state.backend_label.clone(),
        model: state.model_name.clone(),
        session_id: cfg.session_id,
        user_id: cfg.user_id,
    }))
}

pub fn build_server_router(state: Arc<ServerState>) -> AxumRouter {
    AxumRouter::new()
        .route("/healthz", get(handle_server_health))
        .route("/v1/ask", post(handle_server_ask))
        .with_state(state)
}

fn server_auth_token_from_env() -> Option<String> {
    std::env::var("SUPPLYLINE_SERVER_AUTH_TOKEN")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn run_server(
    cfg: RuntimeConfig,
    host: String,
    port: u16,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server bind address '{}:{}'", host, port))?;

    let (model, backend, model_name) = resolve_model(&cfg)?;
    let backend_label = backend.label().to_string();
    telemetry.emit(
        "model.resolved",
        json!({
            "backend": backend_label.clone(),
            "model": model_name.clone(),
            "path": "server"
        }),
    );

    let agent = build_agent_graph(&cfg, model).await?;
    let session_service = build_session_service(&cfg).await?;

    // Warm the cache with a runner for the configured default session, so
    // the first /v1/ask does not pay graph-assembly latency.
    let warm_runner = Arc::new(
        build_runner_with_session_service(agent.clone(), &cfg, session_service.clone()).await?,
    );
    let runner_cache = HashMap::from([(server_runner_cache_key(&cfg), warm_runner)]);

    let state = Arc::new(ServerState {
        cfg: cfg.clone(),
        telemetry: telemetry.clone(),
        agent,
        session_service,
        backend_label: backend_label.clone(),
        model_name: model_name.clone(),
        runner_cache: Arc::new(tokio::sync::RwLock::new(runner_cache)),
        auth_token: server_auth_token_from_env(),
        runner_cache_max: cfg.server_runner_cache_max.max(1),
    });

    telemetry.emit(
        "server.started",
        json!({
            "host": host,
            "port": port,
            "profile": cfg.profile,
            "session_backend": format!("{:?}", cfg.session_backend),
            "backend": backend_label,
            "model": model_name
        }),
    );
    println!("Analyst server listening on http://{addr} (health: /healthz, ask: /v1/ask)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server listener")?;
    axum::serve(listener, build_server_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { println!("\nReceived Ctrl+C, shutting down gracefully..."); }
        _ = terminate => { println!("\nReceived SIGTERM, shutting down gracefully..."); }
    }
}
