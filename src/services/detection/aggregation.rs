// Aggregation Logic
// Combines the standard and tuned verdicts into one ensemble decision

use crate::models::{ModelRole, ModelVerdict, SupplementaryFindings};
use crate::services::config_store::{EnsembleConfig, EnsembleWeights};

fn role_label(role: ModelRole) -> &'static str {
    match role {
        ModelRole::Standard => "Standard Analysis",
        ModelRole::Tuned => "Specialized Analysis",
    }
}

/// Combined outcome before request metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleDecision {
    pub is_scam: bool,
    pub confidence: f64,
    pub reason: String,
    pub cross_validated: bool,
    pub detected_tactics: Vec<String>,
    pub findings: SupplementaryFindings,
}

/// `standard * w_std + tuned * w_tuned`, unrounded.
pub fn weighted_confidence(standard: f64, tuned: f64, weights: &EnsembleWeights) -> f64 {
    standard * weights.standard_model + tuned * weights.tuned_model
}

pub fn meets_threshold(total: f64, threshold: f64) -> bool {
    total >= threshold
}

/// Agreement (1 or 0) scaled by how close the two confidences are.
pub fn cross_validation_score(standard: &ModelVerdict, tuned: &ModelVerdict) -> f64 {
    let agreement = if standard.is_scam == tuned.is_scam { 1.0 } else { 0.0 };
    agreement * (1.0 - (standard.confidence - tuned.confidence).abs())
}

pub fn is_cross_validated(standard: &ModelVerdict, tuned: &ModelVerdict, threshold: f64) -> bool {
    cross_validation_score(standard, tuned) >= threshold
}

pub fn combine_reasons(standard: &str, tuned: &str) -> String {
    format!(
        "{}: {}\n{}: {}",
        role_label(ModelRole::Standard),
        standard,
        role_label(ModelRole::Tuned),
        tuned
    )
}

/// Prefix shown when the ensemble overrides the model votes.
pub fn annotate_insufficient(total: f64, reason: &str) -> String {
    format!(
        "Insufficient confidence ({:.2}) to mark as scam. {}",
        total, reason
    )
}

/// Tactics from the tuned model, or the standard model's when it reported none.
pub fn merge_tactics(standard: &ModelVerdict, tuned: &ModelVerdict) -> Vec<String> {
    if tuned.detected_tactics.is_empty() {
        standard.detected_tactics.clone()
    } else {
        tuned.detected_tactics.clone()
    }
}

/// Field by field, tuned model first.
pub fn merge_findings(standard: &ModelVerdict, tuned: &ModelVerdict) -> SupplementaryFindings {
    SupplementaryFindings {
        detected_elements: tuned
            .detected_elements
            .clone()
            .or_else(|| standard.detected_elements.clone()),
        technical_analysis: tuned
            .technical_analysis
            .clone()
            .or_else(|| standard.technical_analysis.clone()),
        risk_level: tuned.risk_level.clone().or_else(|| standard.risk_level.clone()),
        transcript: tuned.transcript.clone().or_else(|| standard.transcript.clone()),
    }
}

fn findings_of(verdict: &ModelVerdict) -> SupplementaryFindings {
    SupplementaryFindings {
        detected_elements: verdict.detected_elements.clone(),
        technical_analysis: verdict.technical_analysis.clone(),
        risk_level: verdict.risk_level.clone(),
        transcript: verdict.transcript.clone(),
    }
}

fn gate(total: f64, reason: String, config: &EnsembleConfig) -> (bool, String) {
    if meets_threshold(total, config.minimum_confidence_threshold) {
        (true, reason)
    } else {
        (false, annotate_insufficient(total, &reason))
    }
}

/// Full two-model decision.
pub fn decide(standard: &ModelVerdict, tuned: &ModelVerdict, config: &EnsembleConfig) -> EnsembleDecision {
    let total = weighted_confidence(standard.confidence, tuned.confidence, &config.weights);
    let reason = combine_reasons(&standard.reason, &tuned.reason);
    let (is_scam, reason) = gate(total, reason, config);

    EnsembleDecision {
        is_scam,
        confidence: total,
        reason,
        cross_validated: is_cross_validated(standard, tuned, config.cross_validation_threshold),
        detected_tactics: merge_tactics(standard, tuned),
        findings: merge_findings(standard, tuned),
    }
}

/// Decision from the only model that answered. Never cross-validated.
pub fn decide_single(
    survivor_role: ModelRole,
    survivor: &ModelVerdict,
    config: &EnsembleConfig,
) -> EnsembleDecision {
    let failed_role = match survivor_role {
        ModelRole::Standard => ModelRole::Tuned,
        ModelRole::Tuned => ModelRole::Standard,
    };
    let missing = format!("unavailable, the {} model did not respond.", failed_role);
    let reason = match survivor_role {
        ModelRole::Standard => combine_reasons(&survivor.reason, &missing),
        ModelRole::Tuned => combine_reasons(&missing, &survivor.reason),
    };

    let total = survivor.confidence;
    let (is_scam, reason) = gate(total, reason, config);

    EnsembleDecision {
        is_scam,
        confidence: total,
        reason,
        cross_validated: false,
        detected_tactics: survivor.detected_tactics.clone(),
        findings: findings_of(survivor),
    }
}
