//! # vitae-scrape
//!
//! Dynamic-page extraction: a pooled headless-browser fetcher, declarative
//! selector rules with a canonical fingerprint, a content-addressed result
//! cache, and the pipeline that composes them without ever raising.

pub mod browser;
pub mod cache;
pub mod pipeline;
pub mod rules;

pub use browser::{BrowserPool, FetchedPage, PageFetcher};
pub use cache::{CachedPage, KvScrapeCache, MemoryScrapeCache, ScrapeCache};
pub use pipeline::{ScrapeRequest, ScrapeResult, Scraper};
pub use rules::{cache_key, job_posting_rules, ruleset_hash, ExtractionRule, RuleSet};
