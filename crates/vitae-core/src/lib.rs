//! # vitae-core
//!
//! Core types, errors, and shared primitives for the Vitae platform.
//! This crate defines the vocabulary used by every other crate in the
//! workspace: the error taxonomy, the shared key-value store contract that
//! backs circuit breakers and caches, and request telemetry helpers.

pub mod error;
pub mod kv;
pub mod telemetry;

pub use error::{Result, VitaeError};
pub use kv::{KvStore, MemoryKv};
pub use telemetry::{new_correlation_id, timed};
