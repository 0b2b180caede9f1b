use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse, ProviderError};

/// A hosted chat-completion endpoint: ordered turns plus generation
/// parameters in, one assistant reply out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, ProviderError>;
}
