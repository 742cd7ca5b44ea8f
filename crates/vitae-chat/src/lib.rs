//! # vitae-chat
//!
//! Conversation persistence, prompt assembly under a token budget, and the
//! orchestrator that wires retrieval and the LLM router into a grounded,
//! never-failing chat flow.

pub mod orchestrator;
pub mod prompt;
pub mod store;

pub use orchestrator::{ChatReply, ChatService, SourceDoc, WelcomeReply};
pub use prompt::PromptBuilder;
pub use store::{ConversationStore, MemoryConversationStore, SqliteConversationStore, Turn};
