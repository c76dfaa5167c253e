use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::lead::{LeadField, LeadMemory};
use crate::errors::DomainError;

/// Closed set of conversational tactics. The tactic decides what the voice
/// stage is allowed to communicate; only `AllowMeeting` unlocks scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tactic {
    Investigate,
    Educate,
    AnchorPrice,
    AllowMeeting,
    #[serde(alias = "handle-objection")]
    ValueProposition,
    Reject,
}

impl Tactic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investigate => "investigate",
            Self::Educate => "educate",
            Self::AnchorPrice => "anchor-price",
            Self::AllowMeeting => "allow-meeting",
            Self::ValueProposition => "value-proposition",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Tactic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tactic {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "investigate" | "investigar" => Ok(Self::Investigate),
            "educate" | "educar" => Ok(Self::Educate),
            "anchor-price" | "anchor" | "anclar-precio" => Ok(Self::AnchorPrice),
            "allow-meeting" | "permitir-reunion" => Ok(Self::AllowMeeting),
            "value-proposition" | "handle-objection" => Ok(Self::ValueProposition),
            "reject" | "rechazar" => Ok(Self::Reject),
            _ => Err(DomainError::UnknownTactic(value.trim().to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Chosen by the deterministic decision table.
    Rules,
    /// Taken from the model's proposal as-is.
    Model,
    /// Degraded default after an inference failure.
    Fallback,
    /// Rewritten by the safety gate.
    Gate,
}

/// One per turn. `directive` is consumed only by the voice stage and is never
/// shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub tactic: Tactic,
    pub directive: String,
    pub target_field: Option<LeadField>,
    pub source: DecisionSource,
}

impl StrategyDecision {
    pub fn new(tactic: Tactic, directive: impl Into<String>, source: DecisionSource) -> Self {
        Self { tactic, directive: directive.into(), target_field: None, source }
    }

    pub fn with_target(mut self, field: LeadField) -> Self {
        self.target_field = Some(field);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Continue,
    UnlockScheduling,
}

/// Machine-readable flag telling the caller whether to present scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSignal {
    pub action: AuditAction,
    pub score: u8,
}

impl AuditSignal {
    /// Unlocks scheduling iff the final, post-gate tactic is `AllowMeeting`.
    pub fn derive(decision: &StrategyDecision, memory: &LeadMemory) -> Self {
        let action = if decision.tactic == Tactic::AllowMeeting {
            AuditAction::UnlockScheduling
        } else {
            AuditAction::Continue
        };
        Self { action, score: memory.lead_score() }
    }

    pub fn hold(memory: &LeadMemory) -> Self {
        Self { action: AuditAction::Continue, score: memory.lead_score() }
    }

    pub fn unlocks_scheduling(&self) -> bool {
        self.action == AuditAction::UnlockScheduling
    }
}
