// Ensemble Classifier
// Runs the standard and tuned models concurrently and merges their verdicts

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    ClassificationRequest, ContentKind, EnsembleVerdict, ModelRole, ModelSummary, PerModelResults,
};
use crate::services::config_store::{AppConfig, EnsembleConfig};
use crate::services::media::MAX_INLINE_BYTES;
use crate::services::providers::{CompletionBackend, ProviderClient, ProviderError};

use super::aggregation::{decide, decide_single, EnsembleDecision};
use super::error::AnalysisError;
use super::model_adapter::{AdapterOutcome, ModelAdapter};
use super::prompts::prompts_for;

pub struct EnsembleClassifier {
    standard: ModelAdapter,
    tuned: ModelAdapter,
    config: EnsembleConfig,
}

impl EnsembleClassifier {
    pub fn new(standard: ModelAdapter, tuned: ModelAdapter, config: EnsembleConfig) -> Self {
        Self {
            standard,
            tuned,
            config,
        }
    }

    /// Build against the hosted endpoint described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, AnalysisError> {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);
        let client = match config.proxy.as_ref().and_then(|p| p.active_url()) {
            Some(url) => ProviderClient::with_proxy(url, timeout)
                .map_err(|e| AnalysisError::Config(format!("invalid proxy {}: {}", url, e)))?,
            None => ProviderClient::new(timeout),
        };
        Self::with_backend(config, Arc::new(client))
    }

    /// Build with an explicit backend shared by both models.
    pub fn with_backend(
        config: &AppConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self, AnalysisError> {
        config
            .validate()
            .map_err(|e| AnalysisError::Config(e.to_string()))?;

        let adapter = |role: ModelRole| -> Result<ModelAdapter, AnalysisError> {
            let key = config.api_keys.get(role).ok_or_else(|| {
                AnalysisError::Config(format!("no API key configured for the {} model", role))
            })?;
            Ok(ModelAdapter::new(
                role,
                config.models.get(role).clone(),
                key,
                backend.clone(),
            ))
        };

        Ok(Self::new(
            adapter(ModelRole::Standard)?,
            adapter(ModelRole::Tuned)?,
            config.ensemble.clone(),
        ))
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Reject payloads no model should be asked about.
    pub fn validate_request(&self, request: &ClassificationRequest) -> Result<(), AnalysisError> {
        let invalid = |msg: String| -> Result<(), AnalysisError> { Err(AnalysisError::InvalidInput(msg)) };

        match request {
            ClassificationRequest::Text { body } => {
                let chars = body.trim().chars().count();
                if chars == 0 || chars < self.config.min_text_chars {
                    return invalid(format!(
                        "text must contain at least {} characters",
                        self.config.min_text_chars.max(1)
                    ));
                }
            }
            ClassificationRequest::Image { bytes, mime_type } => {
                check_binary(bytes, mime_type, "image/")?;
            }
            ClassificationRequest::Audio {
                bytes,
                mime_type,
                duration_seconds,
            } => {
                check_binary(bytes, mime_type, "audio/")?;
                if !duration_seconds.is_finite() || *duration_seconds < 0.0 {
                    return invalid(format!("invalid audio duration: {}", duration_seconds));
                }
            }
        }

        Ok(())
    }

    /// Classify one request with both models.
    ///
    /// Both calls always run to completion. A transport failure in either one
    /// fails the whole analysis unless single-model fallback is enabled, in
    /// which case the surviving verdict is reported as degraded. When both
    /// fail, the standard model's error is returned.
    pub async fn analyze(&self, request: &ClassificationRequest) -> Result<EnsembleVerdict, AnalysisError> {
        self.validate_request(request)?;

        let request_id = Uuid::new_v4().to_string();
        let kind = request.kind();
        let prompts = prompts_for(kind);
        let start = Instant::now();

        info!(
            "[ENSEMBLE] {} start: kind={}, payload={} bytes",
            request_id,
            kind,
            request.payload_len()
        );

        let (standard, tuned) = tokio::join!(
            self.standard.classify_timed(request, &prompts.standard),
            self.tuned.classify_timed(request, &prompts.tuned),
        );

        let fallback = self.config.single_model_fallback;
        let verdict = match (standard, tuned) {
            (Ok(s), Ok(t)) => {
                let decision = decide(&s.verdict, &t.verdict, &self.config);
                let per_model = PerModelResults {
                    standard: answered(&self.standard, &s),
                    tuned: answered(&self.tuned, &t),
                };
                build_verdict(request_id, kind, decision, per_model, false)
            }
            (Err(e), Ok(t)) if fallback => {
                warn!("[ENSEMBLE] {} standard model failed, using tuned model only: {}", request_id, e);
                let decision = decide_single(ModelRole::Tuned, &t.verdict, &self.config);
                let per_model = PerModelResults {
                    standard: failed(&self.standard, &e),
                    tuned: answered(&self.tuned, &t),
                };
                build_verdict(request_id, kind, decision, per_model, true)
            }
            (Ok(s), Err(e)) if fallback => {
                warn!("[ENSEMBLE] {} tuned model failed, using standard model only: {}", request_id, e);
                let decision = decide_single(ModelRole::Standard, &s.verdict, &self.config);
                let per_model = PerModelResults {
                    standard: answered(&self.standard, &s),
                    tuned: failed(&self.tuned, &e),
                };
                build_verdict(request_id, kind, decision, per_model, true)
            }
            (Err(source), _) => {
                warn!("[ENSEMBLE] {} aborted: standard model failed: {}", request_id, source);
                return Err(AnalysisError::Transport {
                    role: ModelRole::Standard,
                    source,
                });
            }
            (_, Err(source)) => {
                warn!("[ENSEMBLE] {} aborted: tuned model failed: {}", request_id, source);
                return Err(AnalysisError::Transport {
                    role: ModelRole::Tuned,
                    source,
                });
            }
        };

        info!(
            "[ENSEMBLE] {} done in {}ms: is_scam={}, confidence={:.2}, cross_validated={}, degraded={}",
            verdict.request_id,
            start.elapsed().as_millis(),
            verdict.is_scam,
            verdict.confidence,
            verdict.cross_validated,
            verdict.degraded
        );

        Ok(verdict)
    }

    pub async fn analyze_text(&self, body: &str) -> Result<EnsembleVerdict, AnalysisError> {
        self.analyze(&ClassificationRequest::text(body)).await
    }

    pub async fn analyze_image(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<EnsembleVerdict, AnalysisError> {
        self.analyze(&ClassificationRequest::image(bytes, mime_type)).await
    }

    pub async fn analyze_audio(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        duration_seconds: f64,
    ) -> Result<EnsembleVerdict, AnalysisError> {
        self.analyze(&ClassificationRequest::audio(bytes, mime_type, duration_seconds))
            .await
    }
}

fn check_binary(bytes: &[u8], mime_type: &str, prefix: &str) -> Result<(), AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::InvalidInput("payload is empty".to_string()));
    }
    if bytes.len() > MAX_INLINE_BYTES {
        return Err(AnalysisError::InvalidInput(format!(
            "payload of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_INLINE_BYTES
        )));
    }
    let mime = mime_type.trim();
    if mime.is_empty() {
        return Err(AnalysisError::InvalidInput("MIME type is missing".to_string()));
    }
    if !mime.to_ascii_lowercase().starts_with(prefix) {
        return Err(AnalysisError::InvalidInput(format!(
            "MIME type {} does not match the content kind",
            mime
        )));
    }
    Ok(())
}

fn answered(adapter: &ModelAdapter, outcome: &AdapterOutcome) -> ModelSummary {
    ModelSummary {
        model_id: adapter.model_id().to_string(),
        is_scam: outcome.verdict.is_scam,
        confidence: outcome.verdict.confidence,
        latency_ms: Some(outcome.latency_ms),
        error: None,
    }
}

fn failed(adapter: &ModelAdapter, error: &ProviderError) -> ModelSummary {
    ModelSummary {
        model_id: adapter.model_id().to_string(),
        is_scam: false,
        confidence: 0.0,
        latency_ms: None,
        error: Some(error.to_string()),
    }
}

fn build_verdict(
    request_id: String,
    content_kind: ContentKind,
    decision: EnsembleDecision,
    per_model: PerModelResults,
    degraded: bool,
) -> EnsembleVerdict {
    EnsembleVerdict {
        request_id,
        content_kind,
        is_scam: decision.is_scam,
        confidence: decision.confidence,
        reason: decision.reason,
        cross_validated: decision.cross_validated,
        detected_tactics: decision.detected_tactics,
        per_model,
        findings: decision.findings,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_store::{DEFAULT_STANDARD_MODEL, DEFAULT_TUNED_MODEL};
    use crate::services::detection::test_support::ScriptedBackend;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.api_keys.set(ModelRole::Standard, Some("standard-key".to_string()));
        config.api_keys.set(ModelRole::Tuned, Some("tuned-key".to_string()));
        config
    }

    fn classifier(config: &AppConfig, backend: &Arc<ScriptedBackend>) -> EnsembleClassifier {
        EnsembleClassifier::with_backend(config, backend.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_both_models_confident() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply(
            DEFAULT_STANDARD_MODEL,
            r#"{"isScam": true, "confidence": 0.9, "reason": "Asks for a wire transfer"}"#,
        );
        backend.reply(
            DEFAULT_TUNED_MODEL,
            r#"{"isScam": true, "confidence": 0.95, "reason": "CEO fraud pattern", "detectedTactics": ["impersonation", "urgency"]}"#,
        );

        let verdict = classifier(&test_config(), &backend)
            .analyze_text("Please wire $4,000 today, I'm in a meeting. - CEO")
            .await
            .unwrap();

        assert!(verdict.is_scam);
        assert!((verdict.confidence - 0.93).abs() < 1e-9);
        assert!(verdict.cross_validated);
        assert!(!verdict.degraded);
        assert_eq!(verdict.content_kind, ContentKind::Text);
        assert_eq!(verdict.detected_tactics, vec!["impersonation", "urgency"]);
        assert_eq!(
            verdict.reason,
            "Standard Analysis: Asks for a wire transfer\nSpecialized Analysis: CEO fraud pattern"
        );
        assert_eq!(verdict.per_model.standard.model_id, DEFAULT_STANDARD_MODEL);
        assert_eq!(verdict.per_model.tuned.model_id, DEFAULT_TUNED_MODEL);
        assert!(Uuid::parse_str(&verdict.request_id).is_ok());

        // Each model is called with its own credential and template
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            if call.model_id == DEFAULT_STANDARD_MODEL {
                assert_eq!(call.api_key, "standard-key");
                assert!(call.prompt.starts_with("You are an AI designed to detect scams"));
            } else {
                assert_eq!(call.api_key, "tuned-key");
                assert!(call.prompt.starts_with("Analyze this content for advanced phishing"));
            }
        }
    }

    #[tokio::test]
    async fn test_disagreement_is_gated() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply(DEFAULT_STANDARD_MODEL, r#"{"isScam": true, "confidence": 0.5, "reason": "Odd link"}"#);
        backend.reply(DEFAULT_TUNED_MODEL, r#"{"isScam": false, "confidence": 0.3, "reason": "Known sender"}"#);

        let verdict = classifier(&test_config(), &backend)
            .analyze_text("Your invoice is attached")
            .await
            .unwrap();

        assert!(!verdict.is_scam);
        assert!((verdict.confidence - 0.38).abs() < 1e-9);
        assert!(!verdict.cross_validated);
        assert!(verdict.reason.starts_with("Insufficient confidence (0.38) to mark as scam."));
        assert!(verdict.per_model.standard.is_scam);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_closed() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply(DEFAULT_STANDARD_MODEL, r#"{"isScam": true, "confidence": 0.99, "reason": "x"}"#);
        backend.fail(DEFAULT_TUNED_MODEL, 503);

        let err = classifier(&test_config(), &backend)
            .analyze_text("Reset your password here")
            .await
            .unwrap_err();

        match err {
            AnalysisError::Transport { role, source } => {
                assert_eq!(role, ModelRole::Tuned);
                assert!(matches!(source, ProviderError::ApiError { status: 503, .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Both calls ran; nothing was cancelled
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_both_failures_report_standard_first() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail(DEFAULT_STANDARD_MODEL, 500);
        backend.fail(DEFAULT_TUNED_MODEL, 429);

        let mut config = test_config();
        config.ensemble.single_model_fallback = true;

        let err = classifier(&config, &backend)
            .analyze_text("You won a prize")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Transport {
                role: ModelRole::Standard,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_skips_models() {
        let backend = Arc::new(ScriptedBackend::new());
        let ensemble = classifier(&test_config(), &backend);

        for request in [
            ClassificationRequest::text("   hi  "),
            ClassificationRequest::text(""),
            ClassificationRequest::image(Vec::new(), "image/png"),
            ClassificationRequest::image(vec![1, 2], " "),
            ClassificationRequest::image(vec![1, 2], "audio/wav"),
            ClassificationRequest::audio(vec![1, 2], "audio/wav", f64::NAN),
            ClassificationRequest::audio(vec![1, 2], "audio/wav", -1.0),
        ] {
            let err = ensemble.analyze(&request).await.unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidInput(_)), "{:?}", request);
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_roles_are_fixed_regardless_of_completion_order() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply(DEFAULT_STANDARD_MODEL, r#"{"isScam": false, "confidence": 0.1, "reason": "slow"}"#);
        backend.reply(DEFAULT_TUNED_MODEL, r#"{"isScam": true, "confidence": 0.8, "reason": "fast"}"#);
        backend.delay(DEFAULT_STANDARD_MODEL, Duration::from_millis(50));

        let verdict = classifier(&test_config(), &backend)
            .analyze_text("Verify your account within 24 hours")
            .await
            .unwrap();

        assert_eq!(
            backend.completion_order(),
            vec![DEFAULT_TUNED_MODEL.to_string(), DEFAULT_STANDARD_MODEL.to_string()]
        );
        assert_eq!(verdict.per_model.standard.confidence, 0.1);
        assert_eq!(verdict.per_model.tuned.confidence, 0.8);
        assert!((verdict.confidence - (0.4 * 0.1 + 0.6 * 0.8)).abs() < 1e-9);
        assert!(verdict.reason.starts_with("Insufficient confidence (0.52) to mark as scam. Standard Analysis: slow"));
    }

    #[tokio::test]
    async fn test_single_model_fallback() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply(
            DEFAULT_STANDARD_MODEL,
            r#"{"isScam": true, "confidence": 0.88, "reason": "Gift card request"}"#,
        );
        backend.fail(DEFAULT_TUNED_MODEL, 500);

        let mut config = test_config();
        config.ensemble.single_model_fallback = true;

        let verdict = classifier(&config, &backend)
            .analyze_text("Buy three gift cards and send me the codes")
            .await
            .unwrap();

        assert!(verdict.degraded);
        assert!(verdict.is_scam);
        assert_eq!(verdict.confidence, 0.88);
        assert!(!verdict.cross_validated);
        assert!(verdict.per_model.tuned.error.is_some());
        assert!(verdict.per_model.tuned.latency_ms.is_none());
        assert!(verdict.reason.contains("the tuned model did not respond"));
    }

    #[tokio::test]
    async fn test_single_model_fallback_when_standard_fails() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail(DEFAULT_STANDARD_MODEL, 502);
        backend.reply(
            DEFAULT_TUNED_MODEL,
            r#"{"isScam": true, "confidence": 0.7, "reason": "Spoofed bank sender"}"#,
        );

        let mut config = test_config();
        config.ensemble.single_model_fallback = true;

        let verdict = classifier(&config, &backend)
            .analyze_text("Your account is locked, confirm your PIN here")
            .await
            .unwrap();

        assert!(verdict.degraded);
        assert!(!verdict.cross_validated);
        assert!(verdict.per_model.standard.error.is_some());
        assert!(verdict.per_model.standard.latency_ms.is_none());
        assert!(verdict.per_model.tuned.error.is_none());
        // Gate sees the tuned confidence on its own, not 0.6 * 0.7
        assert_eq!(verdict.confidence, 0.7);
        assert!(!verdict.is_scam);
        assert!(verdict.reason.starts_with("Insufficient confidence (0.70) to mark as scam."));
        assert!(verdict.reason.contains("the standard model did not respond"));
        assert!(verdict.reason.contains("Specialized Analysis: Spoofed bank sender"));
    }

    #[tokio::test]
    async fn test_image_salvage_flows_through() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply(DEFAULT_STANDARD_MODEL, "I think this is suspicious because the QR code points elsewhere");
        backend.reply(
            DEFAULT_TUNED_MODEL,
            r#"{"isScam": true, "confidence": 0.9, "reason": "Fake parking QR", "detectedElements": "QR code, meter sticker"}"#,
        );

        let verdict = classifier(&test_config(), &backend)
            .analyze_image(vec![0xFF, 0xD8, 0xFF], "image/jpeg")
            .await
            .unwrap();

        assert!(verdict.per_model.standard.is_scam);
        assert_eq!(verdict.content_kind, ContentKind::Image);
        assert_eq!(verdict.findings.detected_elements.as_deref(), Some("QR code, meter sticker"));
        assert!(verdict.reason.contains("Degraded extraction"));

        let calls = backend.calls();
        assert!(calls.iter().all(|c| c.inline.as_ref().map(|i| i.mime_type.as_str()) == Some("image/jpeg")));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let backend: Arc<dyn CompletionBackend> = Arc::new(ScriptedBackend::new());
        let mut config = test_config();
        config.api_keys.set(ModelRole::Tuned, None);

        let err = EnsembleClassifier::with_backend(&config, backend.clone()).err().unwrap();
        assert!(matches!(err, AnalysisError::Config(ref msg) if msg.contains("tuned")));

        let mut config = test_config();
        config.ensemble.weights.tuned_model = 0.9;
        let err = EnsembleClassifier::with_backend(&config, backend).err().unwrap();
        assert!(matches!(err, AnalysisError::Config(_)));
    }
}
