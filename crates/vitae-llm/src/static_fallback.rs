//! Last-resort responder for when every external provider is down.
//!
//! Formats the request's retrieved hits without any model generation, or a
//! generic apology when there is nothing to show. It cannot fail, which is
//! what makes the router's no-error guarantee possible.

use async_trait::async_trait;

use crate::provider::{LlmProvider, ProviderError};

/// Distinguished provider name for the degraded responder.
pub const STATIC_FALLBACK_NAME: &str = "static_fallback";

/// Maximum hits rendered into a degraded answer.
const MAX_RENDERED_HITS: usize = 3;
/// Rendered excerpts are cut at this many characters.
const EXCERPT_LIMIT: usize = 200;

/// A retrieved document handed to the responder for rendering.
#[derive(Debug, Clone)]
pub struct FallbackHit {
    pub content: String,
    pub similarity: f32,
}

/// Static degraded responder.
pub struct StaticResponder {
    hits: Vec<FallbackHit>,
}

impl StaticResponder {
    pub fn new(hits: Vec<FallbackHit>) -> Self {
        Self { hits }
    }

    /// Render the degraded answer. Infallible.
    pub fn render(&self) -> String {
        if self.hits.is_empty() {
            return Self::no_results_message();
        }

        let mut parts = vec![
            "**Relevant information found:**\n".to_string(),
            "_(Note: answer assembled without AI generation due to temporary technical problems)_\n".to_string(),
        ];

        for (idx, hit) in self.hits.iter().take(MAX_RENDERED_HITS).enumerate() {
            let mut content = hit.content.trim().to_string();
            if content.len() > EXCERPT_LIMIT {
                let mut cut = EXCERPT_LIMIT;
                while !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                content.truncate(cut);
                content.push_str("...");
            }
            parts.push(format!(
                "\n**{}. Relevant excerpt** (similarity: {:.0}%)",
                idx + 1,
                hit.similarity * 100.0
            ));
            parts.push(format!("{content}\n"));
        }

        parts.push(
            "\n_For a fully generated answer, please try again in a few minutes._".to_string(),
        );

        parts.join("\n")
    }

    fn no_results_message() -> String {
        "**Assistant running in degraded mode**\n\n\
         I can't process your question right now due to a temporary technical problem. Please:\n\n\
         1. Try rephrasing your question\n\
         2. Try again in a few minutes\n\
         3. Reach out directly if it is urgent\n\n\
         _Apologies for the inconvenience. The service is being restored._"
            .to_string()
    }
}

#[async_trait]
impl LlmProvider for StaticResponder {
    fn name(&self) -> &str {
        STATIC_FALLBACK_NAME
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.render())
    }
}
