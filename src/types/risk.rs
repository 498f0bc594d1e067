//! Risk assessment result (§3, §4.5).

use serde::{Deserialize, Serialize};

/// Risk level ordering matters for floor/boost comparisons in the weighted
/// evaluator (§4.5 step 4) — declared low-to-high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    MediumHigh,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::MediumHigh => "MEDIUM_HIGH",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Guardrails attached to a risk level (§3, §4.5 step 5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Guardrails {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub requires_human_approval: bool,
}

/// The risk assessment sub-structure hanging off session state (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u8,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub rules_triggered: Vec<String>,
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    #[serde(default)]
    pub guardrails: Guardrails,
    /// Set when the weighted evaluator promoted the level via a rule's
    /// `risk_floor` (§4.5 step 3-4, Open Question on cross-validation).
    #[serde(default)]
    pub risk_floor_applied: Option<RiskLevel>,
}
