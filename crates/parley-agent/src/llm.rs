use crate::backends::gemini::GeminiBackend;
use crate::backends::{ChunkStream, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use parley_core::{ConversationTurn, ParleyResult, ToolDeclaration};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Client that dispatches to the configured generation backend.
///
/// The backend is built on first use, not at construction, so the service
/// starts without credentials and the first query reports what is missing.
/// Concurrent first uses build it exactly once.
pub struct LlmClient {
    config: ModelConfig,
    backend: OnceCell<Arc<dyn LlmBackend>>,
}

impl LlmClient {
    /// Creates a client; the backend is built on first use.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            backend: OnceCell::new(),
        }
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            config: ModelConfig::default(),
            backend: OnceCell::new_with(Some(backend)),
        }
    }

    /// The shared backend, building it on first call.
    ///
    /// A failed build is not cached; the next call tries again.
    pub async fn backend(&self) -> ParleyResult<&Arc<dyn LlmBackend>> {
        self.backend
            .get_or_try_init(|| async { self.init_backend() })
            .await
    }

    fn init_backend(&self) -> ParleyResult<Arc<dyn LlmBackend>> {
        let backend: Arc<dyn LlmBackend> = match self.config.provider {
            LlmProvider::Gemini => Arc::new(GeminiBackend::new(self.config.clone())?),
        };
        info!(
            provider = ?self.config.provider,
            model = %self.config.model_id,
            "Initialized generation backend"
        );
        Ok(backend)
    }

    /// Starts one streamed turn.
    pub async fn stream_turn(
        &self,
        history: &[ConversationTurn],
        tools: &[ToolDeclaration],
    ) -> ParleyResult<ChunkStream> {
        self.backend().await?.stream_turn(history, tools).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parley_core::ParleyError;

    #[tokio::test]
    async fn test_missing_key_fails_at_first_use() {
        let client = LlmClient::new(ModelConfig::default());
        assert!(!client.backend.initialized());

        let err = client.backend().await.err().unwrap();
        assert!(matches!(err, ParleyError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Config error: GEMINI_API_KEY environment variable is required"
        );
        assert!(!client.backend.initialized());
    }

    #[tokio::test]
    async fn test_backend_built_once_under_concurrency() {
        let client = Arc::new(LlmClient::new(ModelConfig {
            api_key: Some("test-key".into()),
            ..Default::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    let backend = client.backend().await.unwrap();
                    Arc::as_ptr(backend) as *const () as usize
                })
            })
            .collect();

        let mut addresses = Vec::new();
        for handle in handles {
            addresses.push(handle.await.unwrap());
        }
        addresses.dedup();
        assert_eq!(addresses.len(), 1);
        assert!(client.backend.initialized());
    }
}
