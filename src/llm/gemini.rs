use super::error::{ProviderError, ProviderErrorKind};
use super::models::{
    GeminiContent, GeminiErrorResponse, GeminiRequest, GeminiResponse, GenerationConfig,
    HistoryEntry,
};
use super::LlmClient;
use crate::config::ModelConfig;
use async_trait::async_trait;
use std::time::Instant;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    system_instruction: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Self {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.expose().to_string(),
            model: config.model.clone(),
            endpoint,
            system_instruction: config.system_instruction.clone(),
            generation: config.generation,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, history: &[HistoryEntry], new_message: &str) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = history
            .iter()
            .map(|entry| GeminiContent {
                role: Some(entry.speaker.as_str().to_string()),
                parts: entry
                    .payload
                    .iter()
                    .map(|text| super::models::GeminiPart {
                        text: Some(text.clone()),
                    })
                    .collect(),
            })
            .collect();
        contents.push(GeminiContent::text(Some("user"), new_message));

        let system_instruction = if self.system_instruction.trim().is_empty() {
            None
        } else {
            Some(GeminiContent::text(None, self.system_instruction.clone()))
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: self.generation,
        }
    }

    fn extract_text(response: GeminiResponse) -> Result<String, ProviderError> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            return Err(ProviderError::blocked(format!(
                "Prompt was blocked: {}",
                reason
            )));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("No candidates in response"))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(match candidate.finish_reason.as_deref() {
                Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => {
                    ProviderError::blocked(format!(
                        "Response was blocked: {}",
                        candidate.finish_reason.unwrap_or_default()
                    ))
                }
                _ => ProviderError::malformed("Empty response from Gemini API"),
            });
        }

        Ok(text)
    }

    fn classify_error(status: u16, body: &str) -> ProviderError {
        match serde_json::from_str::<GeminiErrorResponse>(body) {
            Ok(error_resp) => {
                let message = match error_resp.error.status {
                    Some(code) => format!("{} ({})", error_resp.error.message, code),
                    None => error_resp.error.message,
                };
                ProviderError::from_status(status, message)
            }
            Err(_) => ProviderError::from_status(status, body.trim().to_string()),
        }
    }

    fn classify_transport_error(e: &reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::new(ProviderErrorKind::Timeout, format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ProviderError::network(format!("Connection failed: {}", e))
        } else {
            ProviderError::unknown(format!("Request failed: {}", e))
        }
    }

    async fn send_request(&self, request: &GeminiRequest) -> Result<GeminiResponse, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Self::classify_transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::classify_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::malformed(format!("Failed to parse Gemini API response: {}", e)))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        history: &[HistoryEntry],
        new_message: &str,
    ) -> Result<String, ProviderError> {
        let request = self.build_request(history, new_message);
        let start = Instant::now();

        let result = match self.send_request(&request).await {
            Ok(response) => {
                let usage = response.usage_metadata.as_ref().map(|u| {
                    (u.prompt_token_count, u.candidates_token_count)
                });
                Self::extract_text(response).map(|text| (text, usage))
            }
            Err(err) => Err(err),
        };

        match result {
            Ok((text, usage)) => {
                let (input_tokens, output_tokens) = usage.unwrap_or_default();
                tracing::info!(
                    model = %self.model,
                    duration_ms = %start.elapsed().as_millis(),
                    history_len = history.len(),
                    input_tokens,
                    output_tokens,
                    "Gemini request completed"
                );
                Ok(text)
            }
            Err(err) => {
                tracing::error!(
                    model = %self.model,
                    duration_ms = %start.elapsed().as_millis(),
                    kind = err.kind.as_str(),
                    error = %err.message,
                    "Gemini request failed"
                );
                Err(err)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
