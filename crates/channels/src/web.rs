//! HTTP surface of the gateway: axum routes over a shared [`GatewayManager`].
//!
//! Every model call is started on a detached task, so a client that hangs
//! up does not cancel the exchange or its memory write.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use agent::{
    AskRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GatewayManager,
    prompts::DEFAULT_TEMPLATE,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures_util::stream;
use proto::{ChannelError, DEFAULT_SESSION_ID, GatewayError, QueryResult};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::stream::stream_frames;

// ─── Request bodies ────────────────────────────────────────

/// Body of `/query` and `/query-stream`.
#[derive(Debug, Default, Deserialize)]
pub struct QueryBody {
    pub topic: Option<String>,
    pub provider: Option<String>,
    pub template: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub session_id: Option<String>,
}

/// Body of `/query-all`.
#[derive(Debug, Default, Deserialize)]
pub struct QueryAllBody {
    pub topic: Option<String>,
    pub template: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Query parameters of `/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub provider: Option<String>,
    pub session_id: Option<String>,
}

/// Filters of `/reset-memory`, from the query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct ResetParams {
    pub provider: Option<String>,
    pub session_id: Option<String>,
}

impl QueryBody {
    fn template(&self) -> String {
        self.template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())
    }

    fn into_ask(self) -> Result<AskRequest, Response> {
        let template = self.template();
        let topic = require_topic(self.topic)?;
        let mut req = AskRequest::new(topic)
            .template(template)
            .max_tokens(self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
            .temperature(self.temperature.unwrap_or(DEFAULT_TEMPERATURE))
            .session(
                self.session_id
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
            );
        if let Some(provider) = self.provider.filter(|p| !p.is_empty()) {
            req = req.provider(provider);
        }
        Ok(req)
    }
}

// ─── Server ────────────────────────────────────────────────

/// axum server exposing a [`GatewayManager`].
pub struct GatewayServer {
    host: String,
    port: u16,
    cors_origins: String,
    manager: Arc<GatewayManager>,
}

impl GatewayServer {
    /// Creates a server; nothing is bound until [`GatewayServer::run`].
    pub fn new(
        host: impl Into<String>,
        port: u16,
        cors_origins: impl Into<String>,
        manager: Arc<GatewayManager>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            cors_origins: cors_origins.into(),
            manager,
        }
    }

    /// Builds the CORS layer from the configured origins string.
    fn build_cors(&self) -> CorsLayer {
        if self.cors_origins.trim() == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            // Parse comma-separated origins
            let origins: Vec<_> = self
                .cors_origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }

    /// Routes with shared state and CORS applied.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(status_handler))
            .route("/health", get(health_handler))
            .route("/providers", get(providers_handler))
            .route("/capabilities", get(capabilities_handler))
            .route("/query", post(query_handler))
            .route("/query-stream", post(query_stream_handler))
            .route("/query-all", post(query_all_handler))
            .route("/history", get(history_handler))
            .route("/reset-memory", post(reset_memory_handler))
            .with_state(self.manager.clone())
            .layer(self.build_cors())
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), ChannelError> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serves until `shutdown` resolves.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ChannelError> {
        let addr = format!("{}:{}", self.host, self.port);
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("bind {addr} failed: {e}")))?;

        info!(
            addr = %addr,
            framework = %self.manager.framework(),
            providers = ?self.manager.available_providers(),
            "Gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ChannelError::Server(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

// ─── Handlers ──────────────────────────────────────────────

type SharedManager = State<Arc<GatewayManager>>;

async fn health_handler() -> &'static str {
    "ok"
}

async fn status_handler(State(manager): SharedManager) -> Json<Value> {
    let available = manager.available_providers();
    let initialization: BTreeMap<String, String> = manager
        .provider_statuses()
        .into_iter()
        .map(|s| (s.name, s.status))
        .collect();
    let status = if available.is_empty() {
        "no_providers"
    } else {
        "healthy"
    };
    Json(json!({
        "framework": manager.framework(),
        "total_available": available.len(),
        "status": status,
        "available_providers": available,
        "initialization_status": initialization,
    }))
}

async fn providers_handler(State(manager): SharedManager) -> Json<Value> {
    let providers: Vec<_> = manager
        .provider_statuses()
        .into_iter()
        .filter(|s| s.available)
        .collect();
    Json(json!({
        "framework": manager.framework(),
        "count": providers.len(),
        "providers": providers,
    }))
}

async fn capabilities_handler(State(manager): SharedManager) -> Json<Value> {
    Json(json!({
        "framework": manager.framework(),
        "streaming": true,
        "stream_transport": "sse",
        "memory": manager.memory_enabled(),
    }))
}

async fn query_handler(
    State(manager): SharedManager,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text(), None),
    };
    let template = body.template();
    let req = match body.into_ask() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let result = match ask_detached(manager.clone(), req).await {
        Ok(result) => result,
        Err(resp) => return resp,
    };
    if !result.success {
        return failure(
            StatusCode::BAD_REQUEST,
            result.error.unwrap_or_else(|| "Query failed".to_string()),
            result.raw_response,
        );
    }

    let mut envelope = json!({
        "success": true,
        "framework": manager.framework(),
        "provider": result.provider,
        "model": result.model,
        "response": result.response,
        "parameters": {
            "temperature": result.temperature,
            "max_tokens": result.max_tokens,
            "template": template,
        },
        "prompt": result.prompt,
        "session_id": result.session_id,
    });
    if let Some(raw_answer) = result.raw_answer {
        envelope["raw_answer"] = Value::String(raw_answer);
    }
    Json(envelope).into_response()
}

async fn query_stream_handler(
    State(manager): SharedManager,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text(), None),
    };
    let req = match body.into_ask() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let frames = match ask_detached(manager, req).await {
        Ok(result) => stream_frames(&result),
        Err(_) => vec![json!({"type": "error", "error": "Query task failed"})],
    };
    debug!(frames = frames.len(), "Streaming answer");
    let events = frames
        .into_iter()
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_string())));
    Sse::new(stream::iter(events)).into_response()
}

async fn query_all_handler(
    State(manager): SharedManager,
    body: Result<Json<QueryAllBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text(), None),
    };
    let topic = match require_topic(body.topic) {
        Ok(topic) => topic,
        Err(resp) => return resp,
    };
    let template = body
        .template
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let max_tokens = body.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    let temperature = body.temperature.unwrap_or(DEFAULT_TEMPERATURE);

    let task_manager = manager.clone();
    let joined = tokio::spawn(async move {
        task_manager
            .query_all(&topic, &template, max_tokens, temperature)
            .await
    })
    .await;
    let all = match joined {
        Ok(all) => all,
        Err(e) => return task_failed(e),
    };
    if !all.success {
        return failure(
            StatusCode::BAD_REQUEST,
            all.error.unwrap_or_else(|| "Query failed".to_string()),
            None,
        );
    }

    let responses: BTreeMap<&String, Value> = all
        .responses
        .iter()
        .map(|(provider, r)| (provider, provider_entry(r)))
        .collect();
    Json(json!({
        "success": true,
        "framework": manager.framework(),
        "prompt": all.prompt,
        "responses": responses,
        "summary": all.summary,
    }))
    .into_response()
}

async fn history_handler(
    State(manager): SharedManager,
    Query(params): Query<HistoryParams>,
) -> Response {
    let Some(provider) = params.provider.filter(|p| !p.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "provider is required", None);
    };
    let session_id = params
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
    match manager.history(&provider, &session_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => gateway_failure(e),
    }
}

async fn reset_memory_handler(
    State(manager): SharedManager,
    Query(query): Query<ResetParams>,
    body: Bytes,
) -> Response {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        ResetParams::default()
    } else {
        match serde_json::from_slice::<ResetParams>(&body) {
            Ok(params) => params,
            Err(e) => {
                return failure(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"), None);
            }
        }
    };
    let provider = query.provider.or(from_body.provider);
    let session_id = query.session_id.or(from_body.session_id);

    match manager.reset_memory(provider, session_id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => gateway_failure(e),
    }
}

// ─── Helpers ───────────────────────────────────────────────

async fn ask_detached(
    manager: Arc<GatewayManager>,
    req: AskRequest,
) -> Result<QueryResult, Response> {
    tokio::spawn(async move { manager.ask(req).await })
        .await
        .map_err(task_failed)
}

fn require_topic(topic: Option<String>) -> Result<String, Response> {
    topic
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "topic is required", None))
}

fn provider_entry(result: &QueryResult) -> Value {
    let mut entry = json!({
        "success": result.success,
        "model": result.model,
        "response": result.response,
        "parameters": {
            "temperature": result.temperature,
            "max_tokens": result.max_tokens,
        },
    });
    if let Some(error) = &result.error {
        entry["error"] = Value::String(error.clone());
    }
    entry
}

fn failure(
    status: StatusCode,
    error: impl Into<String>,
    raw_response: Option<String>,
) -> Response {
    let mut body = json!({"success": false, "error": error.into()});
    if let Some(raw) = raw_response {
        body["raw_response"] = Value::String(raw);
    }
    (status, Json(body)).into_response()
}

fn gateway_failure(err: GatewayError) -> Response {
    let status = match err {
        GatewayError::MemoryUnsupported => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, err.to_string(), None)
}

fn task_failed(err: tokio::task::JoinError) -> Response {
    error!(error = %err, "Query task failed");
    failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
}
