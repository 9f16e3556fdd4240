mod error;
mod gemini;
mod models;

pub use error::{ProviderError, ProviderErrorKind};
pub use gemini::GeminiClient;
pub use models::{GenerationConfig, HistoryEntry, Speaker};

use crate::config::ModelConfig;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a reply to `new_message`, given the turns that precede it.
    async fn generate(
        &self,
        history: &[HistoryEntry],
        new_message: &str,
    ) -> Result<String, ProviderError>;

    fn model_name(&self) -> &str;
}

/// Holds a client that is constructed at most once and then shared.
///
/// Concurrent first callers block on the same initialization; every caller
/// sees the same `Arc`.
pub struct ClientCell {
    cell: OnceLock<Arc<dyn LlmClient>>,
}

impl ClientCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn get_or_init<F>(&self, init: F) -> Arc<dyn LlmClient>
    where
        F: FnOnce() -> Arc<dyn LlmClient>,
    {
        Arc::clone(self.cell.get_or_init(init))
    }
}

static SHARED_CLIENT: ClientCell = ClientCell::new();

/// The process-wide Gemini client, built from `config` on first use.
///
/// Later calls ignore `config` and return the instance built first.
pub fn shared_client(config: &ModelConfig) -> Arc<dyn LlmClient> {
    SHARED_CLIENT.get_or_init(|| {
        let client = GeminiClient::new(config);
        tracing::info!(model = %config.model, endpoint = %client.endpoint(), "Model client created");
        Arc::new(client)
    })
}
