//! Synchronous bridge over an async [`LlmProvider`].
//!
//! The retry executor is blocking, so each provider call is driven to
//! completion on a private current-thread runtime. Do not use a
//! `BlockingClient` from inside another tokio runtime: `block_on` panics
//! there.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// Blocking handle to a provider.
pub struct BlockingClient {
    provider: Arc<dyn LlmProvider>,
    runtime: Runtime,
}

impl BlockingClient {
    /// Wrap a provider. Fails only if the runtime cannot be created.
    pub fn new(provider: Arc<dyn LlmProvider>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { provider, runtime })
    }

    /// Run one completion, bounded by `config.timeout`.
    pub fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let call = self.provider.complete(messages, config);
        self.runtime
            .block_on(async { tokio::time::timeout(config.timeout, call).await })
            .map_err(|_| ProviderError::Timeout(config.timeout))?
    }

    /// Name of the wrapped provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("provider", &self.provider.name())
            .finish()
    }
}
