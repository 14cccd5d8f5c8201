//! Text generator implementations

pub mod ollama;
