//! Prometheus-compatible metrics endpoint for the Vitae server.
//!
//! Tracks request counts, chat volume, scrape and cache activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Global metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    pub http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    pub http_errors_total: AtomicU64,
    /// Total chat messages answered.
    pub chat_messages_total: AtomicU64,
    /// Total welcome greetings served.
    pub welcome_messages_total: AtomicU64,
    /// Total answers produced by a fallback (backup provider or static).
    pub chat_fallbacks_total: AtomicU64,
    /// Total documents ingested.
    pub ingests_total: AtomicU64,
    /// Total embeddings deleted.
    pub embeddings_deleted_total: AtomicU64,
    /// Total scrapes executed.
    pub scrapes_total: AtomicU64,
    /// Total scrapes served from cache.
    pub scrape_cache_hits_total: AtomicU64,
    /// Total rate limit rejections.
    pub rate_limit_rejections_total: AtomicU64,
    /// Server start time for uptime calculation.
    pub started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                chat_messages_total: AtomicU64::new(0),
                welcome_messages_total: AtomicU64::new(0),
                chat_fallbacks_total: AtomicU64::new(0),
                ingests_total: AtomicU64::new(0),
                embeddings_deleted_total: AtomicU64::new(0),
                scrapes_total: AtomicU64::new(0),
                scrape_cache_hits_total: AtomicU64::new(0),
                rate_limit_rejections_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_chat_messages(&self) {
        self.inner
            .chat_messages_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_welcome_messages(&self) {
        self.inner
            .welcome_messages_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_chat_fallbacks(&self) {
        self.inner
            .chat_fallbacks_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ingests(&self) {
        self.inner.ingests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_embeddings_deleted(&self) {
        self.inner
            .embeddings_deleted_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scrapes(&self) {
        self.inner.scrapes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scrape_cache_hits(&self) {
        self.inner
            .scrape_cache_hits_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limit_rejections(&self) {
        self.inner
            .rate_limit_rejections_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let m = &self.inner;
        let uptime = m.started_at.elapsed().as_secs();

        format!(
            r#"# HELP vitae_uptime_seconds Time since the server started.
# TYPE vitae_uptime_seconds gauge
vitae_uptime_seconds {}

# HELP vitae_http_requests_total Total HTTP requests served.
# TYPE vitae_http_requests_total counter
vitae_http_requests_total {}

# HELP vitae_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE vitae_http_errors_total counter
vitae_http_errors_total {}

# HELP vitae_chat_messages_total Total chat messages answered.
# TYPE vitae_chat_messages_total counter
vitae_chat_messages_total {}

# HELP vitae_welcome_messages_total Total welcome greetings served.
# TYPE vitae_welcome_messages_total counter
vitae_welcome_messages_total {}

# HELP vitae_chat_fallbacks_total Total answers produced by a fallback layer.
# TYPE vitae_chat_fallbacks_total counter
vitae_chat_fallbacks_total {}

# HELP vitae_ingests_total Total documents ingested.
# TYPE vitae_ingests_total counter
vitae_ingests_total {}

# HELP vitae_embeddings_deleted_total Total embeddings deleted.
# TYPE vitae_embeddings_deleted_total counter
vitae_embeddings_deleted_total {}

# HELP vitae_scrapes_total Total scrape requests executed.
# TYPE vitae_scrapes_total counter
vitae_scrapes_total {}

# HELP vitae_scrape_cache_hits_total Total scrapes served from cache.
# TYPE vitae_scrape_cache_hits_total counter
vitae_scrape_cache_hits_total {}

# HELP vitae_rate_limit_rejections_total Total rate limit rejections (429).
# TYPE vitae_rate_limit_rejections_total counter
vitae_rate_limit_rejections_total {}
"#,
            uptime,
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.chat_messages_total.load(Ordering::Relaxed),
            m.welcome_messages_total.load(Ordering::Relaxed),
            m.chat_fallbacks_total.load(Ordering::Relaxed),
            m.ingests_total.load(Ordering::Relaxed),
            m.embeddings_deleted_total.load(Ordering::Relaxed),
            m.scrapes_total.load(Ordering::Relaxed),
            m.scrape_cache_hits_total.load(Ordering::Relaxed),
            m.rate_limit_rejections_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counter_increments() {
        let m = Metrics::new();
        m.inc_http_requests();
        m.inc_http_requests();
        m.inc_chat_messages();
        let output = m.render_prometheus();
        assert!(output.contains("vitae_http_requests_total 2"));
        assert!(output.contains("vitae_chat_messages_total 1"));
    }

    #[test]
    fn test_metrics_prometheus_format() {
        let m = Metrics::new();
        let output = m.render_prometheus();
        assert!(output.contains("# HELP vitae_uptime_seconds"));
        assert!(output.contains("# TYPE vitae_uptime_seconds gauge"));
        assert!(output.contains("# TYPE vitae_http_requests_total counter"));
    }
}
