//! HTTP API integration tests: exercise the endpoints with mock providers,
//! a mock embedding backend, and a deterministic page fetcher.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use vitae_chat::{ChatService, MemoryConversationStore, PromptBuilder};
use vitae_config::schema::{BreakerConfig, RagConfig, ServerConfig};
use vitae_core::{KvStore, MemoryKv, Result};
use vitae_llm::mock::MockProvider;
use vitae_llm::provider::LlmProvider;
use vitae_llm::router::LlmRouter;
use vitae_retrieval::{MockEmbedding, RetrievalService, VectorRepository};
use vitae_scrape::browser::{FetchedPage, PageFetcher};
use vitae_scrape::{MemoryScrapeCache, Scraper};
use vitae_server::{build_router, metrics::Metrics, AppState};

const PAGE: &str = r#"
    <html>
      <head><title>Example Domain</title></head>
      <body><h1>Example heading</h1><p>Some paragraph.</p></body>
    </html>
"#;

struct CountingFetcher {
    calls: AtomicU32,
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedPage {
            html: PAGE.to_string(),
            title: None,
        })
    }
}

struct TestApp {
    app: axum::Router,
    retrieval: Arc<RetrievalService>,
    fetcher: Arc<CountingFetcher>,
}

fn setup(providers: Vec<MockProvider>) -> TestApp {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

    let embedding = MockEmbedding::new(3)
        .with_vector("RAG is Retrieval-Augmented Generation", vec![1.0, 0.1, 0.0])
        .with_vector("What is RAG?", vec![1.0, 0.0, 0.0]);
    let repo = Arc::new(VectorRepository::open_in_memory(3).unwrap());
    let retrieval = Arc::new(RetrievalService::new(
        Arc::new(embedding),
        repo,
        Duration::from_secs(60),
    ));

    let mut router = LlmRouter::new(Arc::clone(&kv), BreakerConfig::default());
    let mut provider_names = Vec::new();
    for p in providers {
        provider_names.push(p.name().to_string());
        router.add_provider(Arc::new(p));
    }

    let chat = Arc::new(ChatService::new(
        Arc::clone(&retrieval),
        Arc::new(router),
        Arc::new(MemoryConversationStore::new()),
        PromptBuilder::default(),
        RagConfig::default(),
    ));

    let fetcher = Arc::new(CountingFetcher {
        calls: AtomicU32::new(0),
    });
    let scraper = Arc::new(Scraper::new(
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        Some(Arc::new(MemoryScrapeCache::new())),
        Duration::from_secs(3600),
    ));

    let state = Arc::new(AppState {
        chat,
        retrieval: Arc::clone(&retrieval),
        scraper,
        kv,
        metrics: Metrics::new(),
        config: ServerConfig::default(),
        providers: provider_names,
    });

    TestApp {
        app: build_router(state),
        retrieval,
        fetcher,
    }
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Health & metrics ───────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let t = setup(vec![MockProvider::new("primary").always_ok("ok")]);
    let resp = t
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["storage"], true);
    assert_eq!(json["checks"]["providers"][0], "primary");
}

#[tokio::test]
async fn test_readiness_endpoint() {
    let t = setup(vec![]);
    let resp = t
        .app
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup(vec![MockProvider::new("primary").always_ok("ok")]);
    let resp = t
        .app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(ct.contains("text/plain"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("vitae_http_requests_total"));
    assert!(body.contains("vitae_llm_requests_total{provider=\"primary\"}"));
}

// ── Chat ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_happy_path_with_sources() {
    let t = setup(vec![
        MockProvider::new("primary").always_ok("RAG grounds answers in retrieved documents.")
    ]);
    t.retrieval
        .ingest(
            "RAG is Retrieval-Augmented Generation",
            serde_json::json!({"source": "cv"}),
        )
        .await
        .unwrap();

    let resp = t
        .app
        .oneshot(post_json(
            "/chat",
            r#"{"question":"What is RAG?","max_context_items":3}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert!(!json["answer"].as_str().unwrap().is_empty());
    assert_eq!(json["sources"].as_array().unwrap().len(), 1);
    let similarity = json["sources"][0]["similarity"].as_f64().unwrap();
    assert!(similarity > 0.9 && similarity <= 1.0);
    assert!(uuid::Uuid::parse_str(json["conversation_id"].as_str().unwrap()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_chat_stays_200_when_every_provider_fails() {
    let t = setup(vec![
        MockProvider::new("primary").always_transient("down"),
        MockProvider::new("secondary").always_transient("down"),
    ]);

    let resp = t
        .app
        .oneshot(post_json("/chat", r#"{"question":"Anyone there?"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let answer = json["answer"].as_str().unwrap();
    assert!(!answer.is_empty());
    assert!(answer.contains("degraded mode"));
}

#[tokio::test]
async fn test_chat_rejects_empty_question() {
    let t = setup(vec![]);
    let resp = t
        .app
        .oneshot(post_json("/chat", r#"{"question":"   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["error_type"], "validation_error");
}

#[tokio::test]
async fn test_chat_rejects_oversized_question() {
    let t = setup(vec![]);
    let long = "x".repeat(1001);
    let body = serde_json::json!({"question": long}).to_string();
    let resp = t.app.oneshot(post_json("/chat", &body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_context_items_bounds() {
    let t = setup(vec![MockProvider::new("primary").always_ok("ok")]);

    let resp = t
        .app
        .clone()
        .oneshot(post_json(
            "/chat",
            r#"{"question":"q","max_context_items":0}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .app
        .oneshot(post_json(
            "/chat",
            r#"{"question":"q","max_context_items":20}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_missing_question_is_unprocessable() {
    let t = setup(vec![]);
    let resp = t.app.oneshot(post_json("/chat", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_welcome_endpoint() {
    let t = setup(vec![]);
    let resp = t
        .app
        .oneshot(post_json("/chat/welcome", "{}"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert!(!json["message"].as_str().unwrap().is_empty());
    assert!(json["conversation_id"].is_string());
}

// ── Ingest & delete ────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_and_delete_roundtrip() {
    let t = setup(vec![]);

    let resp = t
        .app
        .clone()
        .oneshot(post_json(
            "/ingest",
            r#"{"content":"Ten years of backend work","metadata":{"source":"cv"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = body_json(resp).await;
    let id = json["id"].as_i64().unwrap();

    let resp = t
        .app
        .clone()
        .oneshot(
            Request::delete(format!("/embeddings/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deleted"], true);

    // Idempotent: deleting again reports the same final state.
    let resp = t
        .app
        .oneshot(
            Request::delete(format!("/embeddings/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deleted"], false);
}

#[tokio::test]
async fn test_ingest_rejects_empty_content() {
    let t = setup(vec![]);
    let resp = t
        .app
        .oneshot(post_json("/ingest", r#"{"content":""}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Scrape ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_endpoint_and_cache_metadata() {
    let t = setup(vec![]);
    let body = r#"{
        "url": "https://example.com",
        "extraction_rules": {"heading": {"selector": "h1"}},
        "use_cache": true
    }"#;

    let resp = t.app.clone().oneshot(post_json("/extract", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["title"], "Example Domain");
    assert_eq!(json["data"]["heading"], "Example heading");
    assert_eq!(json["metadata"]["from_cache"], false);

    let resp = t.app.oneshot(post_json("/extract", body)).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["metadata"]["from_cache"], true);
    assert_eq!(json["data"]["heading"], "Example heading");
    // The second request never reached the fetcher.
    assert_eq!(t.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_extract_rejects_bad_scheme() {
    let t = setup(vec![]);
    let body = r#"{
        "url": "file:///etc/passwd",
        "extraction_rules": {"heading": {"selector": "h1"}}
    }"#;
    let resp = t.app.oneshot(post_json("/extract", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extract_rejects_empty_rules() {
    let t = setup(vec![]);
    let body = r#"{"url": "https://example.com", "extraction_rules": {}}"#;
    let resp = t.app.oneshot(post_json("/extract", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_job_posting_preset_endpoint() {
    let t = setup(vec![]);
    let resp = t
        .app
        .oneshot(post_json(
            "/scrape/job-posting",
            r#"{"url":"https://example.com/job"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["title"], "Example heading");
}
