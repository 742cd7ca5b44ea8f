//! The scrape pipeline: cache check, fetch, parse, extract, cache fill.
//!
//! Every failure mode collapses into `ScrapeResult { success: false }`;
//! callers never see a raised error.

use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use vitae_core::Result;

use crate::browser::PageFetcher;
use crate::cache::{CachedPage, ScrapeCache};
use crate::rules::{cache_key, sanitize_selector, validate_url, RuleSet};

/// One scrape request.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub url: String,
    pub rules: RuleSet,
    pub use_cache: bool,
}

/// The pipeline's answer. `success == false` implies empty `data` and a
/// populated `error`.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub url: String,
    pub title: Option<String>,
    pub data: BTreeMap<String, serde_json::Value>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeResult {
    fn failure(url: &str, error: String) -> Self {
        Self {
            success: false,
            url: url.to_string(),
            title: None,
            data: BTreeMap::new(),
            from_cache: false,
            error: Some(error),
        }
    }
}

/// Generic extraction pipeline over a fetcher and an optional cache.
pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
    cache: Option<Arc<dyn ScrapeCache>>,
    cache_ttl: Duration,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        cache: Option<Arc<dyn ScrapeCache>>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            cache,
            cache_ttl,
        }
    }

    /// Run the pipeline. Never returns an error.
    pub async fn scrape(&self, request: &ScrapeRequest) -> ScrapeResult {
        match self.try_scrape(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(url = %request.url, error = %e, "scrape failed");
                ScrapeResult::failure(&request.url, e.to_string())
            }
        }
    }

    async fn try_scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResult> {
        validate_url(&request.url)?;

        let mut rules = RuleSet::new();
        for (name, rule) in &request.rules {
            let mut rule = rule.clone();
            rule.selector = sanitize_selector(&rule.selector)?;
            rules.insert(name.clone(), rule);
        }

        let key = cache_key(&request.url, &rules);
        if request.use_cache {
            if let Some(cache) = &self.cache {
                if let Some(page) = cache.get(&key).await {
                    info!(url = %request.url, "scrape served from cache");
                    return Ok(ScrapeResult {
                        success: true,
                        url: request.url.clone(),
                        title: page.title,
                        data: page.data,
                        from_cache: true,
                        error: None,
                    });
                }
            }
        }

        let fetched = self.fetcher.fetch(&request.url).await?;
        let (title, data) = extract_fields(&fetched.html, fetched.title, &rules);

        if request.use_cache {
            if let Some(cache) = &self.cache {
                let page = CachedPage {
                    title: title.clone(),
                    data: data.clone(),
                };
                cache.put(&key, &page, self.cache_ttl).await;
            }
        }

        info!(url = %request.url, fields = data.len(), "scrape extracted");
        Ok(ScrapeResult {
            success: true,
            url: request.url.clone(),
            title,
            data,
            from_cache: false,
            error: None,
        })
    }
}

/// Parse the document once and apply every rule.
///
/// Plain function with no awaits: the parsed DOM is not `Send` and must not
/// live across a suspension point.
fn extract_fields(
    html: &str,
    fetched_title: Option<String>,
    rules: &RuleSet,
) -> (Option<String>, BTreeMap<String, serde_json::Value>) {
    let document = Html::parse_document(html);

    let title = fetched_title.or_else(|| {
        Selector::parse("title").ok().and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        })
    });

    let mut data = BTreeMap::new();
    for (name, rule) in rules {
        let value = match Selector::parse(&rule.selector) {
            Ok(selector) => {
                if rule.multiple {
                    let items: Vec<serde_json::Value> = document
                        .select(&selector)
                        .filter_map(|el| extract_one(&el, rule.attribute.as_deref()))
                        .map(serde_json::Value::String)
                        .collect();
                    serde_json::Value::Array(items)
                } else {
                    document
                        .select(&selector)
                        .next()
                        .and_then(|el| extract_one(&el, rule.attribute.as_deref()))
                        .map(serde_json::Value::String)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Err(_) => {
                warn!(field = %name, selector = %rule.selector, "unparseable selector");
                serde_json::Value::Null
            }
        };
        data.insert(name.clone(), value);
    }

    (title, data)
}

fn extract_one(
    element: &scraper::ElementRef<'_>,
    attribute: Option<&str>,
) -> Option<String> {
    match attribute {
        Some(attr) => element.value().attr(attr).map(str::to_string),
        None => {
            let text = element.text().collect::<String>().trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
    }
}
