// Response Sanitizer
// Recovers a structured verdict from free-form model output.
// Stages, first success wins:
// - strict parse of the fenced/sliced/cleaned object
// - repair pass (trailing commas, bare keys) and reparse
// - heuristic salvage (regex for text, keyword sniffing for image/audio)
// `sanitize` never fails: every input yields a well-formed ModelVerdict.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ContentKind, ModelVerdict};

const NO_REASON: &str = "No reason provided by the model.";
const NO_TACTICS_DETECTED: &str = "No clear tactics detected";
const EMPTY_RESPONSE_REASON: &str =
    "Degraded extraction: the model returned an empty response, so no verdict could be extracted.";
const DEGRADED_PREFIX: &str = "Degraded extraction from unstructured model output:";
const TEXT_UNANALYZABLE: &str =
    "Unable to analyze the content. Please try again with more detailed text.";
const IMAGE_ELEMENTS_FALLBACK: &str =
    "Image analysis completed, but structured data couldn't be extracted.";
const AUDIO_TACTICS_HINT: &str = "Potential tactics detected, see explanation for details.";
const AUDIO_TECHNICAL_FALLBACK: &str = "Audio analysis completed, see reason for technical details";

const IMAGE_PREVIEW_CHARS: usize = 200;
const AUDIO_PREVIEW_CHARS: usize = 500;

/// Smallest bare number read as a percentage.
const PERCENT_FLOOR: f64 = 2.0;

const SCAM_KEYWORDS: [&str; 3] = ["scam", "suspicious", "phishing"];

#[derive(Debug, Error)]
enum SanitizeError {
    #[error("no JSON object in response")]
    NoObject,
    #[error("JSON syntax error: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("top-level JSON value is not an object")]
    NotAnObject,
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex pattern"))
}

fn is_scam_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"(?i)"?is_?scam"?\s*:\s*"?(true|false)"#)
}

fn confidence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"(?i)"?confidence"?\s*:\s*"?([0-9]*\.?[0-9]+)\s*(%)?"#)
}

fn string_field_re(field: &str) -> Regex {
    // Only called with the fixed field names below
    Regex::new(&format!(r#"(?i)"{}"\s*:\s*"([^"]*)""#, regex::escape(field)))
        .expect("field regex pattern")
}

fn reason_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| string_field_re("reason"))
}

fn tactics_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| string_field_re("detectedTactics"))
}

fn technical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| string_field_re("technicalAnalysis"))
}

fn risk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| string_field_re("riskLevel"))
}

/// Turn raw model output into a verdict. Never fails.
pub fn sanitize(raw: &str, kind: ContentKind) -> ModelVerdict {
    let candidate = clean_candidate(slice_object(strip_code_fences(raw)));
    debug!("[SANITIZER] {} candidate: {}", kind, candidate);

    parse_strict(&candidate, kind)
        .or_else(|err| {
            debug!("[SANITIZER] strict parse failed ({}), attempting repair", err);
            parse_repaired(&candidate, kind)
        })
        .unwrap_or_else(|err| {
            warn!(
                "[SANITIZER] structured parse of {} response failed ({}), salvaging",
                kind, err
            );
            salvage(raw, kind)
        })
}

// ============ Candidate preparation ============

fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if s.len() >= 7 && s.is_char_boundary(7) && s[..7].eq_ignore_ascii_case("```json") {
        s = &s[7..];
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Slice from the first `{` to the last `}`, dropping any prose around the object.
fn slice_object(s: &str) -> &str {
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => &s[start..=end],
        _ => s,
    }
}

fn clean_candidate(s: &str) -> String {
    let mut text: String = s
        .chars()
        .filter_map(|c| match c {
            '\n' | '\r' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    // The whole object arrived as an escaped string literal
    if text.starts_with("{\\\"") {
        text = unescape_one_level(&text);
    }

    normalize_escapes(&text).trim().to_string()
}

/// Escaped newlines become spaces; backslashes that do not start a valid escape are doubled.
fn normalize_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') | Some('r') | Some('t') => {
                chars.next();
                out.push(' ');
            }
            Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'u')) => {
                chars.next();
                out.push('\\');
                out.push(next);
            }
            _ => out.push_str("\\\\"),
        }
    }

    out
}

/// Strip one level of string-literal escaping. Escapes of the inner object survive.
fn unescape_one_level(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('"' | '\\' | '/')) => out.push(next),
            Some('n') | Some('r') | Some('t') => out.push(' '),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

/// Drop trailing commas and quote bare object keys, leaving string contents alone.
fn repair_json(candidate: &str) -> String {
    let chars: Vec<char> = candidate.chars().collect();
    let mut out = String::with_capacity(candidate.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    // Last non-whitespace character emitted outside a string
    let mut last_structural: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last_structural = Some('"');
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' if matches!(next_significant(&chars, i + 1), Some('}') | Some(']')) => {}
            c if (c.is_ascii_alphabetic() || c == '_')
                && matches!(last_structural, Some('{') | Some(',')) =>
            {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                last_structural = ident.chars().last();
                continue;
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last_structural = Some(c);
                }
            }
        }
        i += 1;
    }

    out
}

// ============ Structured stages ============

fn parse_strict(candidate: &str, kind: ContentKind) -> Result<ModelVerdict, SanitizeError> {
    if !candidate.contains('{') {
        return Err(SanitizeError::NoObject);
    }
    let value: Value = serde_json::from_str(candidate)?;
    verdict_from_value(value, kind)
}

fn parse_repaired(candidate: &str, kind: ContentKind) -> Result<ModelVerdict, SanitizeError> {
    if !candidate.contains('{') {
        return Err(SanitizeError::NoObject);
    }
    let repaired = repair_json(candidate);
    debug!("[SANITIZER] repaired candidate: {}", repaired);
    let value: Value = serde_json::from_str(&repaired)?;
    verdict_from_value(value, kind)
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| map.get(*n))
        .find(|v| !v.is_null())
}

fn verdict_from_value(value: Value, kind: ContentKind) -> Result<ModelVerdict, SanitizeError> {
    let map = match value {
        Value::Object(map) => map,
        _ => return Err(SanitizeError::NotAnObject),
    };

    let is_scam = field(&map, &["isScam", "is_scam"])
        .and_then(read_bool)
        .unwrap_or(false);
    let confidence = field(&map, &["confidence"])
        .map(read_confidence)
        .unwrap_or(0.0);
    let reason = field(&map, &["reason"])
        .and_then(read_text)
        .unwrap_or_else(|| NO_REASON.to_string());
    let detected_tactics = match field(&map, &["detectedTactics", "detected_tactics"]) {
        Some(v) => read_list(v),
        None => default_tactics(kind),
    };

    Ok(ModelVerdict {
        is_scam,
        confidence,
        reason,
        detected_tactics,
        detected_elements: field(&map, &["detectedElements"]).and_then(read_text),
        technical_analysis: field(&map, &["technicalAnalysis"]).and_then(read_text),
        risk_level: field(&map, &["riskLevel"]).and_then(read_text),
        transcript: field(&map, &["transcript"]).and_then(read_text),
        degraded: field(&map, &["degraded"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn default_tactics(kind: ContentKind) -> Vec<String> {
    match kind {
        ContentKind::Audio => vec![NO_TACTICS_DETECTED.to_string()],
        ContentKind::Text | ContentKind::Image => Vec::new(),
    }
}

// ============ Field readers ============

/// Collapse whitespace runs and drop control characters.
fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        _ => None,
    }
}

/// Clamp to [0, 1]. Values in [2, 100] or marked with `%` are percentages; anything unreadable is 0.
/// Slight overshoots such as 1.2 are clamped rather than read as percentages.
pub fn normalize_confidence(value: f64, percent: bool) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scaled = if percent || (PERCENT_FLOOR..=100.0).contains(&value) {
        value / 100.0
    } else {
        value
    };
    scaled.clamp(0.0, 1.0)
}

fn read_confidence(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().map(|x| normalize_confidence(x, false)).unwrap_or(0.0),
        Value::String(s) => {
            let trimmed = s.trim();
            let (digits, percent) = match trimmed.strip_suffix('%') {
                Some(d) => (d.trim(), true),
                None => (trimmed, false),
            };
            digits
                .parse::<f64>()
                .map(|x| normalize_confidence(x, percent))
                .unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

fn read_text(v: &Value) -> Option<String> {
    let text = match v {
        Value::String(s) => normalize_text(s),
        Value::Array(items) => items
            .iter()
            .filter_map(read_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(|c| matches!(c, ',' | ';' | '\n'))
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn read_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().filter_map(read_text).collect(),
        Value::String(s) => split_list(s),
        other => read_text(other).into_iter().collect(),
    }
}

// ============ Salvage ============

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

fn mentions_scam(text: &str) -> bool {
    let lower = text.to_lowercase();
    SCAM_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn salvaged_confidence(raw: &str) -> f64 {
    confidence_re()
        .captures(raw)
        .and_then(|c| {
            let percent = c.get(2).is_some();
            c.get(1)?
                .as_str()
                .parse::<f64>()
                .ok()
                .map(|x| normalize_confidence(x, percent))
        })
        .unwrap_or(0.0)
}

fn capture_text(re: &Regex, raw: &str) -> Option<String> {
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| normalize_text(m.as_str()))
        .filter(|s| !s.is_empty())
}

fn degraded_verdict(kind: ContentKind, is_scam: bool, confidence: f64, reason: String) -> ModelVerdict {
    let mut verdict = ModelVerdict::new(is_scam, confidence, reason);
    verdict.detected_tactics = default_tactics(kind);
    verdict.degraded = true;
    verdict
}

fn salvage(raw: &str, kind: ContentKind) -> ModelVerdict {
    let text = normalize_text(raw);
    if text.is_empty() {
        return degraded_verdict(kind, false, 0.0, EMPTY_RESPONSE_REASON.to_string());
    }

    match kind {
        ContentKind::Text => salvage_text(raw),
        ContentKind::Image => salvage_image(raw, &text),
        ContentKind::Audio => salvage_audio(raw, &text),
    }
}

fn salvage_text(raw: &str) -> ModelVerdict {
    let is_scam = is_scam_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().eq_ignore_ascii_case("true"));

    match is_scam {
        Some(is_scam) => {
            let reason = capture_text(reason_re(), raw)
                .unwrap_or_else(|| "the model gave no readable reason.".to_string());
            degraded_verdict(
                ContentKind::Text,
                is_scam,
                salvaged_confidence(raw),
                format!("{} {}", DEGRADED_PREFIX, reason),
            )
        }
        None => degraded_verdict(
            ContentKind::Text,
            false,
            0.0,
            format!("{} {}", DEGRADED_PREFIX, TEXT_UNANALYZABLE),
        ),
    }
}

fn salvage_image(raw: &str, text: &str) -> ModelVerdict {
    let mut verdict = degraded_verdict(
        ContentKind::Image,
        mentions_scam(text),
        salvaged_confidence(raw),
        format!(
            "{} based on the image analysis, {}",
            DEGRADED_PREFIX,
            preview(text, IMAGE_PREVIEW_CHARS)
        ),
    );
    verdict.detected_elements = Some(IMAGE_ELEMENTS_FALLBACK.to_string());
    verdict
}

fn salvage_audio(raw: &str, text: &str) -> ModelVerdict {
    let is_scam = mentions_scam(text);
    let mut verdict = degraded_verdict(
        ContentKind::Audio,
        is_scam,
        salvaged_confidence(raw),
        format!("{} {}", DEGRADED_PREFIX, preview(text, AUDIO_PREVIEW_CHARS)),
    );

    verdict.detected_tactics = match capture_text(tactics_re(), raw) {
        Some(t) => split_list(&t),
        None if text.to_lowercase().contains("tactic") => vec![AUDIO_TACTICS_HINT.to_string()],
        None => default_tactics(ContentKind::Audio),
    };
    verdict.technical_analysis = Some(
        capture_text(technical_re(), raw).unwrap_or_else(|| AUDIO_TECHNICAL_FALLBACK.to_string()),
    );
    let default_risk = if is_scam { "High" } else { "Low" };
    verdict.risk_level =
        Some(capture_text(risk_re(), raw).unwrap_or_else(|| default_risk.to_string()));
    verdict
}
