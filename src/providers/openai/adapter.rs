use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::models::*;
use crate::providers::traits::CompletionProvider;
use crate::providers::types::{CompletionRequest, CompletionResponse, ProviderError, Turn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Adapter for OpenAI-compatible `/v1/chat/completions` endpoints.
pub struct OpenAiProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, ProviderError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid base URL: {}", e)))?;
        let endpoint = base
            .join("v1/chat/completions")
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_messages(turns: &[Turn]) -> Vec<OpenAiMessage> {
        turns
            .iter()
            .map(|t| OpenAiMessage {
                role: t.role.as_str().to_string(),
                content: Some(t.content.clone()),
            })
            .collect()
    }

    fn build_auth_header(api_key: &str) -> Option<String> {
        if api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", api_key))
        }
    }

    fn parse_error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error.message);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let openai_request = OpenAiRequest {
            model: request.model.clone(),
            messages: Self::build_messages(&request.turns),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(&openai_request);

        if let Some(auth) = Self::build_auth_header(&self.api_key) {
            req = req.header("Authorization", auth);
        }

        tracing::debug!(
            "Sending {} turns to {} (max_tokens={})",
            request.turns.len(),
            self.endpoint,
            request.max_tokens
        );

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        let openai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = openai_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        let (tokens_in, tokens_out) = openai_response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(CompletionResponse {
            content,
            model: openai_response.model.unwrap_or(request.model),
            tokens_in,
            tokens_out,
        })
    }
}
