//! The chat orchestrator: retrieval, prompt assembly, routing, persistence.

use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use vitae_config::schema::RagConfig;
use vitae_core::Result;
use vitae_llm::{FallbackHit, LlmRouter, RouteContext, STATIC_FALLBACK_NAME};
use vitae_retrieval::{RetrievalService, SearchHit};

use crate::prompt::PromptBuilder;
use crate::store::ConversationStore;

/// Suffix appended when a backup provider (not the static responder)
/// produced the answer.
const BACKUP_NOTICE: &str = "\n\n_(Response generated by backup system)_";

/// Source previews are cut at this many characters.
const PREVIEW_LIMIT: usize = 200;

const NEW_CONVERSATION_GREETINGS: &[&str] = &[
    "Hi! I'm the portfolio assistant. I can tell you about professional experience, \
     projects, and skills. Where shall we start?",
    "Welcome! I'm trained to answer questions about this professional profile. \
     Interested in the most recent projects?",
    "Nice to meet you! I'm an AI assistant specialized in this portfolio. Ask me about \
     backend work, distributed systems, or anything in the CV.",
];

const RETURNING_CONVERSATION_GREETINGS: &[&str] = &[
    "Welcome back! What else would you like to know about the portfolio?",
    "Hello again! I remember our earlier conversation. Want to dig deeper?",
    "Good to see you again! Any other questions about the candidate's background?",
];

/// A retrieved document as surfaced to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDoc {
    pub id: i64,
    pub content: String,
    pub content_preview: String,
    pub similarity: f32,
    pub metadata: serde_json::Value,
}

/// The orchestrator's answer.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub answer: String,
    pub sources: Vec<SourceDoc>,
    pub conversation_id: String,
    #[serde(skip)]
    pub provider: String,
    #[serde(skip)]
    pub fallback_used: bool,
}

/// Static greeting, never routed through a model.
#[derive(Debug, Clone, Serialize)]
pub struct WelcomeReply {
    pub message: String,
    pub conversation_id: String,
}

/// Composes retrieval, prompt assembly, routing, and persistence for one
/// request at a time. All collaborators are injected at construction.
pub struct ChatService {
    retrieval: Arc<RetrievalService>,
    router: Arc<LlmRouter>,
    store: Arc<dyn ConversationStore>,
    prompt: PromptBuilder,
    config: RagConfig,
}

impl ChatService {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        router: Arc<LlmRouter>,
        store: Arc<dyn ConversationStore>,
        prompt: PromptBuilder,
        config: RagConfig,
    ) -> Self {
        Self {
            retrieval,
            router,
            store,
            prompt,
            config,
        }
    }

    /// Context items retrieved when the request doesn't specify a count.
    pub fn default_context_items(&self) -> usize {
        self.config.default_context_items
    }

    /// Answer a question with retrieved grounding. Always yields an answer;
    /// every LLM-side failure is absorbed by the router and retrieval
    /// trouble degrades to an ungrounded prompt.
    pub async fn respond(
        &self,
        question: &str,
        conversation_id: Option<String>,
        max_context_items: usize,
        correlation_id: &str,
    ) -> Result<ChatReply> {
        let conversation_id =
            conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let hits: Vec<SearchHit> = match self
            .retrieval
            .search(question, max_context_items, self.config.similarity_threshold)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    error = %e,
                    correlation_id,
                    "retrieval failed, answering without context"
                );
                vec![]
            }
        };

        let history = match self
            .store
            .get_history(&conversation_id, self.config.history_turns)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, correlation_id, "history fetch failed, continuing without it");
                vec![]
            }
        };

        let context_text = self.prompt.build_context(&hits);
        let history_text = self.prompt.build_history(&history);
        let prompt = self
            .prompt
            .build_prompt(question, &context_text, &history_text);

        let route_ctx = RouteContext {
            conversation_id: Some(conversation_id.clone()),
            correlation_id: correlation_id.to_string(),
            hits: hits
                .iter()
                .map(|h| FallbackHit {
                    content: h.content.clone(),
                    similarity: h.similarity,
                })
                .collect(),
        };
        let routed = self.router.generate(&prompt, &route_ctx).await;

        let mut answer = routed.text;
        // The static responder's output already explains itself; only a
        // backup model gets the visible notice.
        if routed.fallback_used && routed.provider != STATIC_FALLBACK_NAME {
            answer.push_str(BACKUP_NOTICE);
        }

        if let Err(e) = self
            .store
            .save_turn(&conversation_id, question, &answer)
            .await
        {
            warn!(
                error = %e,
                conversation_id = %conversation_id,
                correlation_id,
                "failed to persist turn, returning response anyway"
            );
        }

        info!(
            provider = %routed.provider,
            fallback_used = routed.fallback_used,
            sources = hits.len(),
            conversation_id = %conversation_id,
            correlation_id,
            "chat answered"
        );

        Ok(ChatReply {
            answer,
            sources: hits.into_iter().map(source_doc).collect(),
            conversation_id,
            provider: routed.provider,
            fallback_used: routed.fallback_used,
        })
    }

    /// Static greeting chosen by whether the conversation has history.
    /// Never invokes the router or consumes model quota.
    pub async fn welcome(&self, conversation_id: Option<String>) -> WelcomeReply {
        let conversation_id =
            conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let has_history = self
            .store
            .get_history(&conversation_id, 1)
            .await
            .map(|h| !h.is_empty())
            .unwrap_or(false);

        let pool = if has_history {
            RETURNING_CONVERSATION_GREETINGS
        } else {
            NEW_CONVERSATION_GREETINGS
        };
        let message = pool
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(NEW_CONVERSATION_GREETINGS[0])
            .to_string();

        WelcomeReply {
            message,
            conversation_id,
        }
    }
}

fn source_doc(hit: SearchHit) -> SourceDoc {
    let content_preview = if hit.content.len() > PREVIEW_LIMIT {
        let mut cut = PREVIEW_LIMIT;
        while !hit.content.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &hit.content[..cut])
    } else {
        hit.content.clone()
    };
    SourceDoc {
        id: hit.id,
        content: hit.content,
        content_preview,
        similarity: hit.similarity,
        metadata: hit.metadata,
    }
}
