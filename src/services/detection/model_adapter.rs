// Model Client Adapter
// Wraps one completion endpoint: prompt in, sanitized verdict out

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{ClassificationRequest, ModelRole, ModelVerdict};
use crate::services::config_store::ModelProfile;
use crate::services::providers::{CompletionBackend, CompletionRequest, InlinePart, ProviderError};

use super::prompts::PromptTemplate;
use super::sanitizer::sanitize;

/// Verdict plus how long the endpoint took to answer.
#[derive(Debug, Clone)]
pub struct AdapterOutcome {
    pub verdict: ModelVerdict,
    pub latency_ms: i64,
}

#[derive(Clone)]
pub struct ModelAdapter {
    role: ModelRole,
    profile: ModelProfile,
    api_key: String,
    backend: Arc<dyn CompletionBackend>,
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("role", &self.role)
            .field("model_id", &self.profile.model_id)
            .finish()
    }
}

impl ModelAdapter {
    pub fn new(
        role: ModelRole,
        profile: ModelProfile,
        api_key: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            role,
            profile,
            api_key: api_key.into(),
            backend,
        }
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    pub fn model_id(&self) -> &str {
        &self.profile.model_id
    }

    fn build_request(&self, request: &ClassificationRequest, template: &PromptTemplate) -> CompletionRequest {
        let prompt = template.render(request);
        let inline = request
            .binary_part()
            .map(|(bytes, mime)| InlinePart::from_bytes(bytes, mime));
        CompletionRequest::for_profile(&self.profile, &self.api_key, prompt).with_inline(inline)
    }

    /// Run one classification and report latency.
    ///
    /// A response that arrives without any text is treated like any other
    /// malformed output and handed to the sanitizer; every other provider
    /// failure is returned to the caller untouched.
    pub async fn classify_timed(
        &self,
        request: &ClassificationRequest,
        template: &PromptTemplate,
    ) -> Result<AdapterOutcome, ProviderError> {
        let kind = request.kind();
        let call = self.build_request(request, template);

        info!(
            "[MODEL_ADAPTER] {} model {} classifying {} ({} prompt chars, template {})",
            self.role,
            self.profile.model_id,
            kind,
            call.prompt.chars().count(),
            template.name
        );

        let start = Instant::now();
        let (raw, latency_ms) = match self.backend.generate(&call).await {
            Ok(result) => (result.content, result.latency_ms),
            Err(ProviderError::MissingContent) => {
                warn!(
                    "[MODEL_ADAPTER] {} model returned no text, treating as empty output",
                    self.role
                );
                (String::new(), start.elapsed().as_millis() as i64)
            }
            Err(e) => {
                warn!("[MODEL_ADAPTER] {} model call failed: {}", self.role, e);
                return Err(e);
            }
        };

        debug!("[MODEL_ADAPTER] {} raw output: {}", self.role, raw);

        let verdict = sanitize(&raw, kind);

        info!(
            "[MODEL_ADAPTER] {} verdict: is_scam={}, confidence={:.2}, degraded={}, latency={}ms",
            self.role, verdict.is_scam, verdict.confidence, verdict.degraded, latency_ms
        );

        Ok(AdapterOutcome { verdict, latency_ms })
    }

    pub async fn classify(
        &self,
        request: &ClassificationRequest,
        template: &PromptTemplate,
    ) -> Result<ModelVerdict, ProviderError> {
        self.classify_timed(request, template)
            .await
            .map(|outcome| outcome.verdict)
    }
}
