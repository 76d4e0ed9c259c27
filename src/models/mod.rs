// ScamChecker Data Models
// Requests submitted by callers and the verdicts produced for them

use serde::{Deserialize, Serialize};
use std::fmt;

// ============ Content & Roles ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Audio,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Audio => "audio",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the ensemble a model plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// General-purpose model, heuristic cues
    Standard,
    /// Fine-tuned model, social-engineering cues
    Tuned,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Standard => "standard",
            ModelRole::Tuned => "tuned",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Classification Request ============

/// Content submitted for one analysis. Built per user action and dropped after the verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationRequest {
    Text {
        body: String,
    },
    Image {
        bytes: Vec<u8>,
        mime_type: String,
    },
    Audio {
        bytes: Vec<u8>,
        mime_type: String,
        duration_seconds: f64,
    },
}

impl ClassificationRequest {
    pub fn text(body: impl Into<String>) -> Self {
        ClassificationRequest::Text { body: body.into() }
    }

    pub fn image(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        ClassificationRequest::Image {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn audio(bytes: Vec<u8>, mime_type: impl Into<String>, duration_seconds: f64) -> Self {
        ClassificationRequest::Audio {
            bytes,
            mime_type: mime_type.into(),
            duration_seconds,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            ClassificationRequest::Text { .. } => ContentKind::Text,
            ClassificationRequest::Image { .. } => ContentKind::Image,
            ClassificationRequest::Audio { .. } => ContentKind::Audio,
        }
    }

    /// Binary payload and its declared MIME type, if the request carries one.
    pub fn binary_part(&self) -> Option<(&[u8], &str)> {
        match self {
            ClassificationRequest::Text { .. } => None,
            ClassificationRequest::Image { bytes, mime_type }
            | ClassificationRequest::Audio {
                bytes, mime_type, ..
            } => Some((bytes.as_slice(), mime_type.as_str())),
        }
    }

    /// Size of the payload in bytes (UTF-8 length for text).
    pub fn payload_len(&self) -> usize {
        match self {
            ClassificationRequest::Text { body } => body.len(),
            ClassificationRequest::Image { bytes, .. }
            | ClassificationRequest::Audio { bytes, .. } => bytes.len(),
        }
    }
}

// ============ Per-model Verdict ============

/// Structured result recovered from one model's raw output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVerdict {
    pub is_scam: bool,
    /// Always within [0, 1]; 0 when the model gave none.
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub detected_tactics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_elements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    /// Set when the verdict came from heuristic salvage rather than structured parsing.
    #[serde(default)]
    pub degraded: bool,
}

impl ModelVerdict {
    pub fn new(is_scam: bool, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            is_scam,
            confidence,
            reason: reason.into(),
            detected_tactics: Vec::new(),
            detected_elements: None,
            technical_analysis: None,
            risk_level: None,
            transcript: None,
            degraded: false,
        }
    }
}

// ============ Ensemble Verdict ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub model_id: String,
    pub is_scam: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    /// Transport failure text when this model did not answer (degraded mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerModelResults {
    pub standard: ModelSummary,
    pub tuned: ModelSummary,
}

/// Kind-specific extras reported by the models (image elements, audio analysis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_elements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl SupplementaryFindings {
    pub fn is_empty(&self) -> bool {
        self.detected_elements.is_none()
            && self.technical_analysis.is_none()
            && self.risk_level.is_none()
            && self.transcript.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleVerdict {
    pub request_id: String,
    pub content_kind: ContentKind,
    pub is_scam: bool,
    /// Weighted confidence, unrounded.
    pub confidence: f64,
    pub reason: String,
    pub cross_validated: bool,
    #[serde(default)]
    pub detected_tactics: Vec<String>,
    pub per_model: PerModelResults,
    #[serde(default, skip_serializing_if = "SupplementaryFindings::is_empty")]
    pub findings: SupplementaryFindings,
    /// Only one model answered (single-model fallback).
    #[serde(default)]
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind_and_binary_part() {
        let text = ClassificationRequest::text("hello there");
        assert_eq!(text.kind(), ContentKind::Text);
        assert!(text.binary_part().is_none());

        let image = ClassificationRequest::image(vec![1, 2, 3], "image/png");
        assert_eq!(image.kind(), ContentKind::Image);
        assert_eq!(image.binary_part(), Some((&[1u8, 2, 3][..], "image/png")));
        assert_eq!(image.payload_len(), 3);

        let audio = ClassificationRequest::audio(vec![0; 8], "audio/wav", 1.5);
        assert_eq!(audio.kind(), ContentKind::Audio);
    }

    #[test]
    fn test_verdict_uses_camel_case_keys() {
        let mut verdict = ModelVerdict::new(true, 0.8, "urgent payment request");
        verdict.detected_tactics = vec!["urgency".to_string()];
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["isScam"], true);
        assert_eq!(json["detectedTactics"][0], "urgency");
        assert!(json.get("transcript").is_none());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(ModelRole::Standard.to_string(), "standard");
        assert_eq!(ModelRole::Tuned.to_string(), "tuned");
    }
}
