// AI Provider Service
// Implements hosted generateContent calls for the standard and tuned models

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use super::config_store::{GenerationParams, ModelProfile};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured")]
    MissingApiKey,
}

/// Binary part attached next to the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinePart {
    pub mime_type: String,
    /// Base64 (standard alphabet) payload
    pub data: String,
}

impl InlinePart {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// One outbound completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model_id: String,
    pub base_url: String,
    pub api_key: String,
    pub prompt: String,
    pub inline: Option<InlinePart>,
    pub generation: GenerationParams,
}

impl CompletionRequest {
    pub fn for_profile(profile: &ModelProfile, api_key: &str, prompt: String) -> Self {
        Self {
            model_id: profile.model_id.clone(),
            base_url: profile.base_url().to_string(),
            api_key: api_key.to_string(),
            prompt,
            inline: None,
            generation: profile.generation,
        }
    }

    pub fn with_inline(mut self, inline: Option<InlinePart>) -> Self {
        self.inline = inline;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

/// Anything that can turn a prompt into free text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<ChatResult, ProviderError>;
}

// ============ Wire format ============

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Clone, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn build_body(request: &CompletionRequest) -> GenerateContentRequest {
    let mut parts = vec![Part::Text {
        text: request.prompt.clone(),
    }];
    if let Some(ref inline) = request.inline {
        parts.push(Part::Inline {
            inline_data: InlineData {
                mime_type: inline.mime_type.clone(),
                data: inline.data.clone(),
            },
        });
    }

    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: request.generation.temperature,
            top_k: request.generation.top_k,
            top_p: request.generation.top_p,
            max_output_tokens: request.generation.max_output_tokens,
        },
    }
}

/// `models/<id>` for base models; tuned ids already carry their collection prefix.
fn endpoint_for(base_url: &str, model_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let model_path = if model_id.contains('/') {
        model_id.to_string()
    } else {
        format!("models/{}", model_id)
    };
    format!("{}/{}:generateContent", base, model_path)
}

/// Concatenate the text parts of the first candidate.
fn extract_text(data: GenerateContentResponse) -> Option<String> {
    let parts = data
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?;

    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct ProviderClient {
    client: Client,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProviderClient {
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().unwrap_or_default();
        Self { client }
    }

    pub fn with_proxy(proxy_url: &str, timeout: Option<Duration>) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let mut builder = Client::builder().proxy(proxy);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        Ok(Self { client })
    }

    async fn call_generate_content(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatResult, ProviderError> {
        if request.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let url = endpoint_for(&request.base_url, &request.model_id);
        let body = build_body(request);

        debug!(
            "[PROVIDER] POST {} model={} inline={}",
            url,
            request.model_id,
            request.inline.as_ref().map(|i| i.mime_type.as_str()).unwrap_or("none")
        );

        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &request.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = extract_text(data).ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }
}

#[async_trait]
impl CompletionBackend for ProviderClient {
    async fn generate(&self, request: &CompletionRequest) -> Result<ChatResult, ProviderError> {
        self.call_generate_content(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_store::ModelProfiles;

    fn sample_request() -> CompletionRequest {
        let profiles = ModelProfiles::default();
        CompletionRequest::for_profile(&profiles.standard, "key", "Is this a scam?".to_string())
    }

    #[test]
    fn test_endpoint_for_base_and_tuned_models() {
        assert_eq!(
            endpoint_for("https://example.test/v1beta/", "gemini-2.0-flash-exp"),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
        assert_eq!(
            endpoint_for("https://example.test/v1beta", "tunedModels/phish-1"),
            "https://example.test/v1beta/tunedModels/phish-1:generateContent"
        );
    }

    #[test]
    fn test_body_carries_generation_config() {
        let body = serde_json::to_value(build_body(&sample_request())).unwrap();
        let config = &body["generationConfig"];
        assert_eq!(config["temperature"], 0.3);
        assert_eq!(config["topK"], 50);
        assert_eq!(config["topP"], 0.85);
        assert_eq!(config["maxOutputTokens"], 1024);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Is this a scam?");
        assert!(body["contents"][0]["parts"].get(1).is_none());
    }

    #[test]
    fn test_body_attaches_inline_part() {
        let request = sample_request().with_inline(Some(InlinePart::from_bytes(b"abc", "image/png")));
        let body = serde_json::to_value(build_body(&request)).unwrap();
        let inline = &body["contents"][0]["parts"][1]["inline_data"];
        assert_eq!(inline["mime_type"], "image/png");
        assert_eq!(inline["data"], "YWJj");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let data: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"isScam\": "},{"text":"true}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(data).as_deref(), Some("{\"isScam\": true}"));
    }

    #[test]
    fn test_extract_text_missing_candidates() {
        let data: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(extract_text(data).is_none());
    }

    #[tokio::test]
    async fn test_blank_key_rejected_before_request() {
        let client = ProviderClient::default();
        let mut request = sample_request();
        request.api_key = " ".to_string();
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }
}
