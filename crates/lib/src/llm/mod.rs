//! Runtime protocol client and incremental NDJSON decoding.
//!
//! Supports liveness probing, model listing/pull, and streaming chat against
//! a local Ollama instance.

pub mod ndjson;
mod ollama;

pub use ollama::{ChatMessage, OllamaClient, OllamaError, OllamaModel};
