#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use vitae_core::{Result, VitaeError};
    use vitae_scrape::browser::{FetchedPage, PageFetcher};
    use vitae_scrape::cache::MemoryScrapeCache;
    use vitae_scrape::pipeline::{ScrapeRequest, Scraper};
    use vitae_scrape::rules::{job_posting_rules, ExtractionRule, RuleSet};

    const PAGE: &str = r#"
        <html>
          <head><title>Example Jobs</title></head>
          <body>
            <h1>Senior Rust Engineer</h1>
            <div class="company-name">Acme Corp</div>
            <a class="apply" href="https://example.com/apply">Apply</a>
            <ul>
              <li class="tag">rust</li>
              <li class="tag">tokio</li>
              <li class="tag">sqlite</li>
            </ul>
          </body>
        </html>
    "#;

    /// Deterministic fetcher that counts how often the "browser" ran.
    struct MockFetcher {
        calls: AtomicU32,
        fail: bool,
    }

    impl MockFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VitaeError::Scrape("page load timed out".into()));
            }
            Ok(FetchedPage {
                html: PAGE.to_string(),
                title: None,
            })
        }
    }

    fn rules() -> RuleSet {
        let mut rules = RuleSet::new();
        rules.insert("heading".into(), ExtractionRule::text("h1"));
        rules.insert("company".into(), ExtractionRule::text(".company-name"));
        rules.insert("apply_link".into(), ExtractionRule::attr("a.apply", "href"));
        rules.insert("tags".into(), ExtractionRule::all(".tag"));
        rules.insert("missing".into(), ExtractionRule::text(".nope"));
        rules
    }

    fn request(use_cache: bool) -> ScrapeRequest {
        ScrapeRequest {
            url: "https://example.com/job".into(),
            rules: rules(),
            use_cache,
        }
    }

    fn scraper(fetcher: Arc<MockFetcher>) -> Scraper {
        Scraper::new(
            fetcher,
            Some(Arc::new(MemoryScrapeCache::new())),
            Duration::from_secs(3600),
        )
    }

    // ── Extraction ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_extracts_scalar_attribute_and_list_fields() {
        let fetcher = MockFetcher::new();
        let result = scraper(fetcher).scrape(&request(false)).await;

        assert!(result.success);
        assert_eq!(result.title.as_deref(), Some("Example Jobs"));
        assert_eq!(result.data["heading"], "Senior Rust Engineer");
        assert_eq!(result.data["company"], "Acme Corp");
        assert_eq!(result.data["apply_link"], "https://example.com/apply");
        assert_eq!(
            result.data["tags"],
            serde_json::json!(["rust", "tokio", "sqlite"])
        );
        assert_eq!(result.data["missing"], serde_json::Value::Null);
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_fetch_failure_becomes_unsuccessful_result() {
        let fetcher = MockFetcher::failing();
        let result = scraper(fetcher).scrape(&request(false)).await;

        assert!(!result.success);
        assert!(result.data.is_empty());
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_invalid_url_becomes_unsuccessful_result() {
        let fetcher = MockFetcher::new();
        let mut req = request(false);
        req.url = "file:///etc/passwd".into();
        let result = scraper(Arc::clone(&fetcher)).scrape(&req).await;

        assert!(!result.success);
        assert_eq!(fetcher.calls(), 0);
    }

    // ── Cache behavior ─────────────────────────────────────────

    #[tokio::test]
    async fn test_second_scrape_hits_cache_and_skips_browser() {
        let fetcher = MockFetcher::new();
        let scraper = scraper(Arc::clone(&fetcher));

        let first = scraper.scrape(&request(true)).await;
        let second = scraper.scrape(&request(true)).await;

        assert_eq!(fetcher.calls(), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.data, second.data);
        assert_eq!(first.title, second.title);
    }

    #[tokio::test]
    async fn test_rule_change_invalidates_cache() {
        let fetcher = MockFetcher::new();
        let scraper = scraper(Arc::clone(&fetcher));

        scraper.scrape(&request(true)).await;

        let mut changed = request(true);
        changed
            .rules
            .insert("heading".into(), ExtractionRule::text("h1.other"));
        let result = scraper.scrape(&changed).await;

        assert_eq!(fetcher.calls(), 2);
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_fetches() {
        let fetcher = MockFetcher::new();
        let scraper = scraper(Arc::clone(&fetcher));

        scraper.scrape(&request(false)).await;
        scraper.scrape(&request(false)).await;

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_uncached_scraper_works_without_cache_backend() {
        let fetcher = MockFetcher::new();
        let scraper = Scraper::new(Arc::clone(&fetcher) as Arc<dyn PageFetcher>, None, Duration::from_secs(1));

        let result = scraper.scrape(&request(true)).await;
        assert!(result.success);
        assert!(!result.from_cache);
    }

    // ── Presets ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_job_posting_preset_runs_through_generic_pipeline() {
        let fetcher = MockFetcher::new();
        let req = ScrapeRequest {
            url: "https://example.com/job".into(),
            rules: job_posting_rules(),
            use_cache: false,
        };
        let result = scraper(fetcher).scrape(&req).await;

        assert!(result.success);
        assert_eq!(result.data["title"], "Senior Rust Engineer");
        assert_eq!(result.data["company"], "Acme Corp");
        assert_eq!(
            result.data["tags"],
            serde_json::json!(["rust", "tokio", "sqlite"])
        );
    }
}
