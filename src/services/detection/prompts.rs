// Prompt Templates
// One template per content kind and model role.
// The standard model gets general heuristic cues, the tuned model social-engineering cues.
// Placeholders: {content} (text body), {duration} {format} {size} (audio metadata)

use crate::models::{ClassificationRequest, ContentKind, ModelRole};

const STANDARD_TEXT_PROMPT: &str = r#"You are an AI designed to detect scams and phishing attempts. Analyze the following content and determine if it's a scam.
Be conservative in your assessment and avoid overfitting to known patterns.

"{content}"

Consider these indicators, but don't overweight any single factor:
- Urgency or threats
- Requests for sensitive information
- Suspicious sender claims
- Grammar and spelling (but consider ESL writers)
- Offers and promises
- Context and plausibility

IMPORTANT: Return a valid JSON object with confidence score:

{
  "isScam": false,
  "confidence": 0.0,
  "reason": "Detailed explanation with balanced analysis"
}"#;

const TUNED_TEXT_PROMPT: &str = r#"Analyze this content for advanced phishing patterns while avoiding overfitting.
Consider the full context and avoid false positives.

"{content}"

Evaluate multiple aspects:
- Social engineering tactics (but consider legitimate urgent communications)
- Impersonation attempts (but consider authorized representatives)
- Context-aware manipulation (but consider legitimate personalization)
- Attack patterns (but avoid overfitting to known patterns)
- Business context (but consider various communication styles)
- Industry-specific elements (but avoid rigid pattern matching)

Return a balanced analysis in JSON format:
{
  "isScam": false,
  "confidence": 0.0,
  "reason": "Nuanced analysis considering multiple factors",
  "detectedTactics": ["list", "of", "confirmed", "tactics"]
}"#;

const STANDARD_IMAGE_PROMPT: &str = r#"Analyze this image and determine if it contains any scam indicators, phishing attempts, or suspicious content.

Look for:
- QR codes that might lead to malicious websites
- Fake login forms or websites
- Suspicious offers or promotions
- Signs of counterfeit products or services
- Suspicious branding or logos that might be impersonating legitimate companies
- Any visual elements designed to trick users

IMPORTANT: You must return a valid JSON object with no additional text, markdown formatting, or explanation. The response must start with '{' and end with '}'. Use this exact format:

{
  "isScam": false,
  "confidence": 0.0,
  "reason": "Detailed explanation of your analysis and why this image is or isn't suspicious",
  "detectedElements": "List of main elements detected in the image"
}

Do not include any text before or after the JSON object. Do not use markdown backticks or json tags."#;

const TUNED_IMAGE_PROMPT: &str = r#"Examine this image for social-engineering and phishing patterns while avoiding false positives.

Evaluate:
- Brand or authority impersonation (logos, official-looking notices, spoofed sender names)
- Credential or payment harvesting (login forms, card entry screens, QR codes to pay or "verify")
- Pressure devices (countdowns, account suspension warnings, limited-time rewards)
- Mismatched or look-alike domains and URLs visible in the image
- Legitimate context that would explain the content (receipts, genuine notifications)

IMPORTANT: Return only a valid JSON object, starting with '{' and ending with '}', in this format:

{
  "isScam": false,
  "confidence": 0.0,
  "reason": "Nuanced analysis of the visual evidence",
  "detectedTactics": ["list", "of", "confirmed", "tactics"],
  "detectedElements": "Main elements visible in the image"
}"#;

const STANDARD_AUDIO_PROMPT: &str = r#"You are an AI specialized in detecting scams in audio content. Analyze this audio file in detail.

Technical Details:
- Duration: {duration} seconds
- Format: {format}
- File size: {size} bytes

Analyze the audio for scam indicators including:
- Voice characteristics (natural vs synthetic)
- Speaking patterns and tone
- Background noise analysis
- Use of pressure tactics or urgency
- Requests for sensitive information
- Signs of impersonation
- Social engineering techniques
- Common scam phrases or patterns

Risk factors to consider:
- Very short duration could indicate automated calls
- Unusual long duration might be suspicious
- Non-standard audio formats might indicate manipulation
- Suspicious speaking patterns or tactics

IMPORTANT: You must return a valid JSON object with no additional text, markdown formatting, or explanation. The response must start with '{' and end with '}'. Use this exact format:

{
  "isScam": false,
  "confidence": 0.0,
  "reason": "Clear explanation of analysis results",
  "detectedTactics": ["list of detected tactics, empty if none found"],
  "technicalAnalysis": "Analysis of voice and audio characteristics",
  "riskLevel": "Low/Medium/High",
  "transcript": "Transcribed audio content or error message if transcription failed"
}

Do not include any text before or after the JSON object. Do not use markdown backticks or json tags."#;

const TUNED_AUDIO_PROMPT: &str = r#"Listen to this recording and assess it for voice-phishing (vishing) and social-engineering patterns while avoiding false positives.

Recording: {duration} seconds, {format}, {size} bytes.

Evaluate:
- Caller identity claims (bank, government, delivery, tech support, family member in distress)
- Requests for codes, passwords, card numbers, remote access or unusual payment methods
- Manufactured urgency, threats, secrecy demands or emotional pressure
- Scripted or synthetic delivery typical of robocalls
- Legitimate context that would explain the call (appointment reminders, genuine service notices)

Return only a valid JSON object in this format:
{
  "isScam": false,
  "confidence": 0.0,
  "reason": "Nuanced analysis of the call",
  "detectedTactics": ["list", "of", "confirmed", "tactics"],
  "riskLevel": "Low/Medium/High",
  "transcript": "Transcribed audio content"
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    body: &'static str,
}

impl PromptTemplate {
    pub const fn new(name: &'static str, body: &'static str) -> Self {
        Self { name, body }
    }

    pub fn body(&self) -> &'static str {
        self.body
    }

    /// Fill the template for a request. Binary payloads travel as separate parts.
    pub fn render(&self, request: &ClassificationRequest) -> String {
        match request {
            ClassificationRequest::Text { body } => self.body.replacen("{content}", body, 1),
            ClassificationRequest::Image { .. } => self.body.to_string(),
            ClassificationRequest::Audio {
                bytes,
                mime_type,
                duration_seconds,
            } => self
                .body
                .replace("{duration}", &format!("{:.2}", duration_seconds))
                .replace("{format}", mime_type)
                .replace("{size}", &bytes.len().to_string()),
        }
    }
}

/// Templates for both ensemble members.
#[derive(Debug, Clone, Copy)]
pub struct PromptSet {
    pub standard: PromptTemplate,
    pub tuned: PromptTemplate,
}

impl PromptSet {
    pub fn for_role(&self, role: ModelRole) -> &PromptTemplate {
        match role {
            ModelRole::Standard => &self.standard,
            ModelRole::Tuned => &self.tuned,
        }
    }
}

pub fn prompts_for(kind: ContentKind) -> PromptSet {
    match kind {
        ContentKind::Text => PromptSet {
            standard: PromptTemplate::new("standard_text", STANDARD_TEXT_PROMPT),
            tuned: PromptTemplate::new("tuned_text", TUNED_TEXT_PROMPT),
        },
        ContentKind::Image => PromptSet {
            standard: PromptTemplate::new("standard_image", STANDARD_IMAGE_PROMPT),
            tuned: PromptTemplate::new("tuned_image", TUNED_IMAGE_PROMPT),
        },
        ContentKind::Audio => PromptSet {
            standard: PromptTemplate::new("standard_audio", STANDARD_AUDIO_PROMPT),
            tuned: PromptTemplate::new("tuned_audio", TUNED_AUDIO_PROMPT),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_prompts_embed_body() {
        let request = ClassificationRequest::text("Your parcel is held, pay $1.99 at hxxp://track.example");
        let set = prompts_for(ContentKind::Text);
        for template in [set.standard, set.tuned] {
            let prompt = template.render(&request);
            assert!(prompt.contains("\"Your parcel is held, pay $1.99 at hxxp://track.example\""));
            assert!(!prompt.contains("{content}"));
            assert!(prompt.contains("\"confidence\""));
        }
        assert!(set.tuned.body().contains("detectedTactics"));
    }

    #[test]
    fn test_audio_prompt_embeds_metadata() {
        let request = ClassificationRequest::audio(vec![0; 2048], "audio/wav", 12.345);
        let prompt = prompts_for(ContentKind::Audio).standard.render(&request);
        assert!(prompt.contains("Duration: 12.35 seconds"));
        assert!(prompt.contains("Format: audio/wav"));
        assert!(prompt.contains("File size: 2048 bytes"));
    }

    #[test]
    fn test_every_template_requests_confidence() {
        for kind in [ContentKind::Text, ContentKind::Image, ContentKind::Audio] {
            let set = prompts_for(kind);
            for role in [ModelRole::Standard, ModelRole::Tuned] {
                let template = set.for_role(role);
                assert!(template.body().contains("\"isScam\""), "{}", template.name);
                assert!(template.body().contains("\"confidence\""), "{}", template.name);
            }
        }
    }

    #[test]
    fn test_image_prompt_is_static() {
        let request = ClassificationRequest::image(vec![1, 2, 3], "image/png");
        let template = prompts_for(ContentKind::Image).standard;
        assert_eq!(template.render(&request), template.body());
    }
}
