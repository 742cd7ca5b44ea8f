//! # vitae-retrieval
//!
//! The grounding stage of the platform: embedding generation with retry,
//! a SQLite-backed vector repository, and the service that composes them
//! for ingest and similarity search.

pub mod embedding;
pub mod mock;
pub mod repository;
pub mod service;

pub use embedding::{EmbedTask, EmbeddingProvider, OpenAiEmbedding};
pub use mock::MockEmbedding;
pub use repository::{SearchHit, VectorRepository};
pub use service::RetrievalService;
