//! In-process `mistralrs` inference backend (feature `llm`).
//!
//! Mirrors the teacher's "Hub server" mode: the model is loaded once and
//! held behind an `Arc`, generation runs in-process with no separate HTTP
//! inference server. Grounded on the teacher's `MistralRsBackend::load` /
//! `generate_with_params` shape, generalised from a fixed drilling-advisory
//! prompt template to the plain `complete(prompt, options)` contract every
//! backend implements here.

use std::sync::Arc;

use async_trait::async_trait;
use mistralrs::{
    GgufModelBuilder, Model, RequestBuilder, TextMessageRole, TextMessages,
};

use super::{CompletionOptions, LlmClient, LlmError};

pub struct MistralRsBackend {
    model: Arc<Model>,
    name: String,
}

impl MistralRsBackend {
    /// Load a GGUF model from `path`. Mirrors the teacher's load-once,
    /// shared-read-only resource lifecycle (§3, §5 "LLM client... the
    /// engine applies backoff... the client is thread-safe").
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        let (dir, file) = path
            .rsplit_once('/')
            .map(|(d, f)| (d.to_string(), f.to_string()))
            .unwrap_or_else(|| (".".to_string(), path.to_string()));

        let model = GgufModelBuilder::new(dir, vec![file])
            .build()
            .await?;

        Ok(Self { model: Arc::new(model), name: path.to_string() })
    }
}

#[async_trait]
impl LlmClient for MistralRsBackend {
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String, LlmError> {
        let messages = TextMessages::new().add_message(TextMessageRole::User, prompt);
        let request = RequestBuilder::from(messages)
            .set_sampler_max_len(options.max_tokens)
            .set_sampler_temperature(options.temperature);

        let response = tokio::time::timeout(options.timeout, self.model.send_chat_request(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::Backend(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Backend("empty response".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Whether a CUDA device is visible to `candle` (grounded on the teacher's
/// same-named helper, used to pick the GPU vs CPU load path).
pub fn is_cuda_available() -> bool {
    candle_core::utils::cuda_is_available()
}
