use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vitae_chat::{ChatService, ConversationStore, PromptBuilder, SqliteConversationStore};
use vitae_config::schema::LoggingConfig;
use vitae_core::{KvStore, MemoryKv};
use vitae_llm::anthropic::AnthropicProvider;
use vitae_llm::openai::OpenAiProvider;
use vitae_llm::router::LlmRouter;
use vitae_retrieval::{EmbeddingProvider, OpenAiEmbedding, RetrievalService, VectorRepository};
use vitae_scrape::{BrowserPool, KvScrapeCache, PageFetcher, ScrapeCache, Scraper};
use vitae_server::{build_router, metrics::Metrics, AppState};

#[derive(Parser)]
#[command(name = "vitae", version, about = "Resilient RAG question answering for a professional portfolio")]
struct Cli {
    /// Path to the config file (defaults to ./vitae.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = vitae_config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);

    // The shared key-value substrate behind breakers, telemetry, and the
    // scrape cache.
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

    // Retrieval stage
    let repository = Arc::new(VectorRepository::open(
        &config.storage.db_path,
        config.embedding.dimensions,
    )?);
    let embedding: Arc<dyn EmbeddingProvider> = Arc::new(
        OpenAiEmbedding::new(config.embedding.api_key.clone().unwrap_or_default())
            .with_model(config.embedding.model.clone(), config.embedding.dimensions),
    );
    let retrieval = Arc::new(RetrievalService::new(
        embedding,
        Arc::clone(&repository),
        Duration::from_secs(config.embedding.timeout_secs),
    ));

    // Provider chain: each provider is enabled by its credential, in
    // primary-then-secondary order.
    let mut router = LlmRouter::new(Arc::clone(&kv), config.breaker.clone());
    let attempt_timeout = Duration::from_secs(config.providers.request_timeout_secs);
    if let Some(key) = config.providers.anthropic_api_key.clone() {
        router.add_provider(Arc::new(
            AnthropicProvider::new(key, config.providers.anthropic_model.clone(), attempt_timeout)
                .with_limits(config.providers.max_tokens, config.providers.temperature),
        ));
    }
    if let Some(key) = config.providers.openai_api_key.clone() {
        router.add_provider(Arc::new(
            OpenAiProvider::new(key, config.providers.openai_model.clone(), attempt_timeout)
                .with_limits(config.providers.max_tokens, config.providers.temperature),
        ));
    }
    let provider_names = router.provider_names();

    // Conversation store + orchestrator
    let store: Arc<dyn ConversationStore> =
        Arc::new(SqliteConversationStore::open(&config.storage.db_path)?);
    let chat = Arc::new(ChatService::new(
        Arc::clone(&retrieval),
        Arc::new(router),
        store,
        PromptBuilder::new(None, config.rag.history_token_budget),
        config.rag.clone(),
    ));

    // Scrape pipeline
    let pool: Arc<dyn PageFetcher> = Arc::new(BrowserPool::new(config.scraper.clone()));
    let cache: Option<Arc<dyn ScrapeCache>> = if config.scraper.cache_enabled {
        Some(Arc::new(KvScrapeCache::new(Arc::clone(&kv))))
    } else {
        None
    };
    let scraper = Arc::new(Scraper::new(
        pool,
        cache,
        Duration::from_secs(config.scraper.cache_ttl_secs),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState {
        chat,
        retrieval,
        scraper,
        kv,
        metrics: Metrics::new(),
        config: config.server.clone(),
        providers: provider_names,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "vitae server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining");
}
