//! # vitae-server
//!
//! HTTP API surface for the Vitae platform: ingest, chat, scrape, health,
//! and metrics endpoints over the injected services. Validation errors are
//! the only 400s; upstream provider failures never surface as errors here
//! because the router below absorbs them.

pub mod metrics;
pub mod ratelimit;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use vitae_chat::ChatService;
use vitae_config::schema::ServerConfig;
use vitae_core::{new_correlation_id, KvStore, VitaeError};
use vitae_retrieval::RetrievalService;
use vitae_scrape::{job_posting_rules, RuleSet, ScrapeRequest, Scraper};

/// Upper bound on chat question length.
const QUESTION_MAX_CHARS: usize = 1000;
/// Bounds on `max_context_items`.
const CONTEXT_ITEMS_MIN: usize = 1;
const CONTEXT_ITEMS_MAX: usize = 20;

/// Shared server state. All services are injected at construction; tests
/// substitute deterministic providers behind the same types.
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub retrieval: Arc<RetrievalService>,
    pub scraper: Arc<Scraper>,
    pub kv: Arc<dyn KvStore>,
    pub metrics: metrics::Metrics,
    pub config: ServerConfig,
    /// Registered provider names, for health and telemetry reporting.
    pub providers: Vec<String>,
}

// ── Error mapping ──────────────────────────────────────────────

/// Caller-visible error classes. Everything else is a generic 500, which
/// correct operation never reaches.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, detail) = match self {
            ApiError::Validation(detail) => {
                (StatusCode::BAD_REQUEST, "validation_error", detail)
            }
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal Server Error".to_string(),
            ),
        };
        (
            status,
            Json(serde_json::json!({
                "detail": detail,
                "error_type": error_type,
            })),
        )
            .into_response()
    }
}

impl From<VitaeError> for ApiError {
    fn from(e: VitaeError) -> Self {
        match e {
            VitaeError::Validation(detail) => ApiError::Validation(detail),
            VitaeError::NotFound(detail) => ApiError::NotFound(detail),
            other => {
                error!(error = %other, "request failed");
                ApiError::Internal
            }
        }
    }
}

// ── Request / response bodies ──────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    conversation_id: Option<String>,
    max_context_items: Option<usize>,
}

#[derive(Deserialize)]
struct WelcomeRequest {
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Deserialize)]
struct IngestRequest {
    content: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct ExtractRequest {
    url: String,
    extraction_rules: RuleSet,
    #[serde(default = "default_true")]
    use_cache: bool,
}

#[derive(Deserialize)]
struct JobPostingRequest {
    url: String,
    #[serde(default = "default_true")]
    use_cache: bool,
}

#[derive(Serialize)]
struct ExtractResponse {
    success: bool,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    data: std::collections::BTreeMap<String, serde_json::Value>,
    metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ── Router assembly ────────────────────────────────────────────

/// Build the Axum router over the shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Window counters live in the shared store with TTLs, so the limiter
    // itself is stateless and needs no eviction task.
    let limiter = ratelimit::RateLimiter::new(
        Arc::clone(&state.kv),
        ratelimit::RateLimitConfig {
            enabled: state.config.rate_limit_enabled,
            requests_per_minute: state.config.requests_per_minute,
        },
    );

    let cors = cors_layer(&state.config.cors_origins);

    // Layers execute outermost-first: request counting wraps rate limiting.
    Router::new()
        .route("/ingest", post(ingest_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/welcome", post(welcome_handler))
        .route("/embeddings/{id}", delete(delete_embedding_handler))
        .route("/health", get(health_handler))
        .route("/health/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/extract", post(extract_handler))
        .route("/scrape/job-posting", post(job_posting_handler))
        .layer(middleware::from_fn_with_state(
            (limiter, state.metrics.clone()),
            ratelimit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            track_requests,
        ))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Count every request and error, and pin the correlation id: absent ones
/// are minted here so the handler and the response header agree.
async fn track_requests(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    state.metrics.inc_http_requests();

    if !req.headers().contains_key("x-correlation-id") {
        if let Ok(value) = new_correlation_id().parse::<HeaderValue>() {
            req.headers_mut().insert("x-correlation-id", value);
        }
    }
    let correlation = req.headers().get("x-correlation-id").cloned();

    let mut resp = next.run(req).await;
    if resp.status().is_client_error() || resp.status().is_server_error() {
        state.metrics.inc_http_errors();
    }
    if let Some(value) = correlation {
        resp.headers_mut().insert("x-correlation-id", value);
    }
    resp
}

/// Correlation id from the request, or a fresh one. Threaded explicitly
/// into every operation the handler invokes.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_correlation_id)
}

// ── Handlers ───────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<vitae_chat::ChatReply>, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("question must not be empty".into()));
    }
    if question.chars().count() > QUESTION_MAX_CHARS {
        return Err(ApiError::Validation(format!(
            "question exceeds {QUESTION_MAX_CHARS} characters"
        )));
    }
    let max_items = req
        .max_context_items
        .unwrap_or_else(|| state.chat.default_context_items());
    if !(CONTEXT_ITEMS_MIN..=CONTEXT_ITEMS_MAX).contains(&max_items) {
        return Err(ApiError::Validation(format!(
            "max_context_items must be within [{CONTEXT_ITEMS_MIN}, {CONTEXT_ITEMS_MAX}]"
        )));
    }

    state.metrics.inc_chat_messages();
    let correlation_id = correlation_id(&headers);
    let reply = state
        .chat
        .respond(question, req.conversation_id, max_items, &correlation_id)
        .await
        .map_err(ApiError::from)?;

    if reply.fallback_used {
        state.metrics.inc_chat_fallbacks();
    }
    Ok(Json(reply))
}

async fn welcome_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WelcomeRequest>,
) -> Json<vitae_chat::WelcomeReply> {
    state.metrics.inc_welcome_messages();
    Json(state.chat.welcome(req.conversation_id).await)
}

async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }
    let metadata = req.metadata.unwrap_or_else(|| serde_json::json!({}));
    if !metadata.is_object() {
        return Err(ApiError::Validation("metadata must be an object".into()));
    }

    let id = state
        .retrieval
        .ingest(&req.content, metadata)
        .await
        .map_err(ApiError::from)?;
    state.metrics.inc_ingests();

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "status": "ingested"})),
    ))
}

async fn delete_embedding_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.retrieval.delete(id).await.map_err(ApiError::from)?;
    if deleted {
        state.metrics.inc_embeddings_deleted();
    }
    Ok(Json(serde_json::json!({"id": id, "deleted": deleted})))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let storage_ok = state.retrieval.repository().ping();
    let kv_ok = kv_probe(&state.kv).await;

    let status = if storage_ok && kv_ok {
        "healthy"
    } else if storage_ok {
        // The breaker store fails open; a dead KV degrades telemetry only.
        "degraded"
    } else {
        "unhealthy"
    };
    let code = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "vitae",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "storage": storage_ok,
                "kv_store": kv_ok,
                "providers": state.providers,
            },
        })),
    )
        .into_response()
}

async fn ready_handler(State(state): State<Arc<AppState>>) -> Response {
    if state.retrieval.repository().ping() {
        (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "not_ready"})),
        )
            .into_response()
    }
}

async fn kv_probe(kv: &Arc<dyn KvStore>) -> bool {
    let ttl = Some(std::time::Duration::from_secs(60));
    match kv.set("health:probe", "ok", ttl).await {
        Ok(()) => matches!(kv.get("health:probe").await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// Prometheus text: process counters plus best-effort per-provider request
/// counts and mean recent latency from the shared store.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    let mut body = state.metrics.render_prometheus();

    if !state.providers.is_empty() {
        body.push_str(
            "\n# HELP vitae_llm_requests_total Successful LLM calls per provider.\n\
             # TYPE vitae_llm_requests_total counter\n",
        );
        for provider in &state.providers {
            let requests = state
                .kv
                .get(&format!("llm:{provider}:requests"))
                .await
                .ok()
                .flatten()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            body.push_str(&format!(
                "vitae_llm_requests_total{{provider=\"{provider}\"}} {requests}\n"
            ));
        }

        body.push_str(
            "\n# HELP vitae_llm_latency_ms_mean Mean of the recent LLM call latencies.\n\
             # TYPE vitae_llm_latency_ms_mean gauge\n",
        );
        for provider in &state.providers {
            let samples = state
                .kv
                .list(&format!("llm:{provider}:latency_ms"))
                .await
                .unwrap_or_default();
            let parsed: Vec<f64> = samples.iter().filter_map(|s| s.parse().ok()).collect();
            let mean = if parsed.is_empty() {
                0.0
            } else {
                parsed.iter().sum::<f64>() / parsed.len() as f64
            };
            body.push_str(&format!(
                "vitae_llm_latency_ms_mean{{provider=\"{provider}\"}} {mean:.1}\n"
            ));
        }
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

async fn extract_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    if req.extraction_rules.is_empty() {
        return Err(ApiError::Validation(
            "extraction_rules must not be empty".into(),
        ));
    }
    vitae_scrape::rules::validate_url(&req.url).map_err(ApiError::from)?;

    run_scrape(&state, req.url, req.extraction_rules, req.use_cache).await
}

async fn job_posting_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobPostingRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    vitae_scrape::rules::validate_url(&req.url).map_err(ApiError::from)?;
    run_scrape(&state, req.url, job_posting_rules(), req.use_cache).await
}

async fn run_scrape(
    state: &AppState,
    url: String,
    rules: RuleSet,
    use_cache: bool,
) -> Result<Json<ExtractResponse>, ApiError> {
    let request = ScrapeRequest {
        url,
        rules,
        use_cache,
    };
    // The pipeline never raises; failures come back in-band.
    let result = state.scraper.scrape(&request).await;

    state.metrics.inc_scrapes();
    if result.from_cache {
        state.metrics.inc_scrape_cache_hits();
    }

    Ok(Json(ExtractResponse {
        success: result.success,
        url: result.url,
        title: result.title,
        data: result.data,
        metadata: serde_json::json!({"from_cache": result.from_cache}),
        error: result.error,
    }))
}
