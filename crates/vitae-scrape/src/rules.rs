//! Declarative extraction rules and their canonical fingerprint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use vitae_core::{Result, VitaeError};

/// One field to extract: a CSS selector, optionally an attribute to read
/// instead of the element text, and whether to collect every match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub multiple: bool,
}

impl ExtractionRule {
    pub fn text(selector: &str) -> Self {
        Self {
            selector: selector.into(),
            attribute: None,
            multiple: false,
        }
    }

    pub fn attr(selector: &str, attribute: &str) -> Self {
        Self {
            selector: selector.into(),
            attribute: Some(attribute.into()),
            multiple: false,
        }
    }

    pub fn all(selector: &str) -> Self {
        Self {
            selector: selector.into(),
            attribute: None,
            multiple: true,
        }
    }
}

/// Field name to rule. The map keeps its keys sorted, which is exactly the
/// canonical order the fingerprint needs.
pub type RuleSet = BTreeMap<String, ExtractionRule>;

/// Stable fingerprint of a ruleset. Semantically equal rulesets (same
/// fields, any construction order) hash identically, and any change to a
/// selector, attribute, or multiplicity produces a new value, invalidating
/// cached bodies extracted under the old shape.
pub fn ruleset_hash(rules: &RuleSet) -> String {
    let mut hasher = blake3::Hasher::new();
    for (name, rule) in rules {
        hasher.update(name.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(rule.selector.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(rule.attribute.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\x1f");
        hasher.update(if rule.multiple { b"1" } else { b"0" });
        hasher.update(b"\x1e");
    }
    hasher.finalize().to_hex().to_string()
}

/// Cache key binding a page to the extraction shape applied to it.
pub fn cache_key(url: &str, rules: &RuleSet) -> String {
    format!("scrape:{}:{}", url, ruleset_hash(rules))
}

/// Strip script-injection fragments out of a CSS selector.
pub fn sanitize_selector(selector: &str) -> Result<String> {
    let dangerous = [
        regex::Regex::new(r"(?i)javascript:").unwrap(),
        regex::Regex::new(r"(?i)on\w+\s*=").unwrap(),
        regex::Regex::new(r"(?i)<script").unwrap(),
        regex::Regex::new(r"(?i)</script>").unwrap(),
    ];

    let mut cleaned = selector.to_string();
    for pattern in &dangerous {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = cleaned.trim().to_string();

    if cleaned.is_empty() {
        return Err(VitaeError::Validation(format!(
            "selector is empty after sanitization: {selector:?}"
        )));
    }
    Ok(cleaned)
}

/// Reject anything that isn't plain http(s).
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| VitaeError::Validation(format!("invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(VitaeError::Validation(format!(
            "URL scheme must be http or https, got {other:?}"
        ))),
    }
}

/// Preset ruleset for job postings. Just configuration over the generic
/// pipeline; no new control flow.
pub fn job_posting_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.insert("title".into(), ExtractionRule::text("h1"));
    rules.insert(
        "company".into(),
        ExtractionRule::text(".company-name, [data-company]"),
    );
    rules.insert(
        "location".into(),
        ExtractionRule::text(".location, [data-location]"),
    );
    rules.insert(
        "description".into(),
        ExtractionRule::text(".job-description, #job-description, article"),
    );
    rules.insert(
        "salary".into(),
        ExtractionRule::text(".salary, [data-salary]"),
    );
    rules.insert("tags".into(), ExtractionRule::all(".tag, .skill"));
    rules
}
