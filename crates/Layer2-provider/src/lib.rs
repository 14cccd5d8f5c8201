//! # conductor-provider
//!
//! Text generation collaborator layer for Conductor.
//! The Summary Generator streams report summaries through a `TextGenerator`.
//!
//! ## Features
//! - Token streaming with mid-stream failure reporting
//! - Ollama NDJSON adapter

pub mod error;
pub mod providers;
pub mod r#trait;

// Core trait and types
pub use r#trait::{GenerationRequest, TextGenerator, TokenStream};

// Error
pub use error::ProviderError;

// Provider implementations
pub use providers::ollama::OllamaGenerator;
