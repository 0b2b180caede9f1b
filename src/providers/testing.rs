//! In-process provider double for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::CompletionProvider;
use super::types::{CompletionRequest, CompletionResponse, ProviderError};

/// Replays scripted replies in order and records every request it receives.
/// Once the script runs out it keeps answering with `fallback`.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fallback: String,
}

impl ScriptedProvider {
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback: fallback.to_string(),
        }
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_failure(&self, error: &str) {
        self.replies.lock().unwrap().push_back(Err(error.to_string()));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| Ok(self.fallback.clone())) {
            Ok(content) => Ok(CompletionResponse {
                content,
                model,
                tokens_in: None,
                tokens_out: None,
            }),
            Err(e) => Err(ProviderError::NetworkError(e)),
        }
    }
}
