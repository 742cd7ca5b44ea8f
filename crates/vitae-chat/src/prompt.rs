//! Prompt assembly for grounded answers.
//!
//! Four blocks in fixed order: system preface, retrieved context, a
//! sliding-window slice of the conversation history, and the question.
//! Only the history block is budgeted; overall context limits are the
//! providers' concern.

use vitae_retrieval::SearchHit;

use crate::store::Turn;

/// Default token budget for the history block.
const DEFAULT_HISTORY_BUDGET: usize = 2048;

/// Builds prompts for grounded queries.
pub struct PromptBuilder {
    system_instruction: String,
    history_budget: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None, DEFAULT_HISTORY_BUDGET)
    }
}

impl PromptBuilder {
    pub fn new(system_instruction: Option<String>, history_budget: usize) -> Self {
        Self {
            system_instruction: system_instruction
                .unwrap_or_else(|| Self::default_instruction().to_string()),
            history_budget,
        }
    }

    fn default_instruction() -> &'static str {
        "You are a professional AI assistant representing a software engineer's portfolio. \
         Your goal is to help recruiters and technical interviewers understand the candidate.\n\n\
         Behavior rules:\n\
         1. Speak as a professional assistant who knows the candidate's background thoroughly.\n\
         2. Use ONLY the information in the provided context (CV, projects) to answer.\n\
         3. If a technology or experience is NOT in the context, say so honestly and offer the \
         closest related experience instead.\n\
         4. Highlight quantifiable achievements and key technologies.\n\
         5. Keep a professional, confident tone without arrogance.\n\
         6. Be concise, but give technical detail when the question calls for it.\n\n\
         If the context is empty and you are greeted, briefly introduce yourself as the \
         portfolio assistant."
    }

    /// Rough token estimation (4 chars per token).
    fn estimate_tokens(text: &str) -> usize {
        text.len() / 4
    }

    /// Format retrieved hits into the context block.
    pub fn build_context(&self, hits: &[SearchHit]) -> String {
        if hits.is_empty() {
            return "No relevant context found in the knowledge base.".to_string();
        }

        let parts: Vec<String> = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                let source = hit
                    .metadata
                    .get("source")
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown");
                format!(
                    "[Document {} - source: {} - similarity: {:.2}]\n{}\n",
                    i + 1,
                    source,
                    hit.similarity,
                    hit.content
                )
            })
            .collect();

        parts.join("\n---\n")
    }

    /// Format history with a sliding window, newest turns kept first.
    ///
    /// Turns are walked newest to oldest and included only while the
    /// cumulative estimate stays within the budget, so the most recent turn
    /// that fits is always present and older ones fall off.
    pub fn build_history(&self, history: &[Turn]) -> String {
        if history.is_empty() {
            return String::new();
        }

        let header = "\n\nConversation history:\n";
        let mut remaining = self
            .history_budget
            .saturating_sub(Self::estimate_tokens(header));

        let mut included: Vec<String> = Vec::new();
        for turn in history.iter().rev() {
            let turn_text = format!("User: {}\nAssistant: {}\n\n", turn.question, turn.answer);
            let turn_tokens = Self::estimate_tokens(&turn_text);
            if turn_tokens > remaining {
                break;
            }
            included.insert(0, turn_text);
            remaining -= turn_tokens;
        }

        if included.is_empty() {
            return String::new();
        }
        format!("{header}{}", included.join(""))
    }

    /// Assemble the complete prompt.
    pub fn build_prompt(&self, question: &str, context: &str, history: &str) -> String {
        format!(
            "{}\n{}\n\nAVAILABLE CONTEXT:\n{}\n\nUSER QUESTION:\n{}\n\nRESPONSE:",
            self.system_instruction, history, context, question
        )
    }

    pub fn history_budget(&self) -> usize {
        self.history_budget
    }
}
