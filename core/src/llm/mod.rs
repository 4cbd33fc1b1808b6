//! Text generation collaborators
//!
//! The scene agent only depends on the [`TextGenerator`] trait; the shipped
//! implementation is [`client::LlmClient`].

pub mod client;

pub use client::{LlmClient, LlmProvider};

use async_trait::async_trait;

use crate::error::Result;

/// Options for a single generation call
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Override the configured sampling temperature
    pub temperature: Option<f32>,
    /// Ask the provider for JSON-only output where supported
    pub json_output: bool,
}

/// A fallible text-generation collaborator.
///
/// No retry/timeout guarantees beyond what the implementation provides;
/// failures surface as `NeosceneError::Llm`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String>;

    /// Whether the generator has credentials and can reach a real provider
    fn is_configured(&self) -> bool;

    /// Provider name for error reporting
    fn provider_name(&self) -> String;
}
