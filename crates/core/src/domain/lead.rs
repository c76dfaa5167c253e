use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::contact::ContactMatch;

/// Value written into a string field the lead declined to answer.
pub const DECLINED_PLACEHOLDER: &str = "no especificado";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sophistication {
    Low,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseIntent {
    Info,
    Appointment,
    Price,
}

impl PurchaseIntent {
    pub fn is_commercial(&self) -> bool {
        matches!(self, Self::Appointment | Self::Price)
    }
}

/// String fields the strategist is allowed to ask the lead for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Organization,
    Pain,
    TechStack,
}

impl LeadField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Pain => "pain",
            Self::TechStack => "tech_stack",
        }
    }
}

impl fmt::Display for LeadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-turn understanding of one prospective client.
///
/// The server never keeps this between requests: it arrives in `lead_data`
/// and leaves in `updated_lead_data`. `budget_confirmed` is tri-state and
/// only `Some(true)` means the lead accepted a stated price anchor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadMemory {
    #[serde(deserialize_with = "non_blank")]
    pub organization: Option<String>,
    #[serde(deserialize_with = "non_blank")]
    pub pain: Option<String>,
    #[serde(deserialize_with = "non_blank")]
    pub tech_stack: Option<String>,
    #[serde(deserialize_with = "lenient_flag")]
    pub budget_confirmed: Option<bool>,
    #[serde(deserialize_with = "lenient_code")]
    pub urgency: Option<Urgency>,
    #[serde(deserialize_with = "lenient_code")]
    pub sophistication: Option<Sophistication>,
    #[serde(deserialize_with = "lenient_flag")]
    pub confused: Option<bool>,
    #[serde(deserialize_with = "lenient_code")]
    pub intent: Option<PurchaseIntent>,
    #[serde(deserialize_with = "non_blank")]
    pub contact: Option<String>,
    #[serde(deserialize_with = "lenient_code", skip_serializing_if = "Option::is_none")]
    pub pending_ask: Option<LeadField>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub qualified_at: Option<DateTime<Utc>>,
}

/// Structured output of the profiler's extraction call. Every field is
/// optional; `None` means "nothing new learned this turn".
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LeadExtraction {
    #[serde(alias = "empresa", deserialize_with = "non_blank")]
    pub organization: Option<String>,
    #[serde(alias = "dolor", deserialize_with = "non_blank")]
    pub pain: Option<String>,
    #[serde(alias = "stack", deserialize_with = "non_blank")]
    pub tech_stack: Option<String>,
    #[serde(alias = "presupuesto_confirmado", deserialize_with = "lenient_flag")]
    pub budget_confirmed: Option<bool>,
    #[serde(alias = "urgencia", deserialize_with = "lenient_code")]
    pub urgency: Option<Urgency>,
    #[serde(alias = "nivel_tecnico", deserialize_with = "lenient_code")]
    pub sophistication: Option<Sophistication>,
    #[serde(alias = "confundido", deserialize_with = "lenient_flag")]
    pub confused: Option<bool>,
    #[serde(alias = "intencion", deserialize_with = "lenient_code")]
    pub intent: Option<PurchaseIntent>,
}

impl LeadMemory {
    /// Field-wise override-if-present: a `None` in the extraction never
    /// erases a known value.
    pub fn merge(&mut self, extraction: LeadExtraction) {
        override_if_present(&mut self.organization, extraction.organization);
        override_if_present(&mut self.pain, extraction.pain);
        override_if_present(&mut self.tech_stack, extraction.tech_stack);
        override_if_present(&mut self.budget_confirmed, extraction.budget_confirmed);
        override_if_present(&mut self.urgency, extraction.urgency);
        override_if_present(&mut self.sophistication, extraction.sophistication);
        override_if_present(&mut self.confused, extraction.confused);
        override_if_present(&mut self.intent, extraction.intent);
    }

    /// Appends newly rescued identifiers to the contact blob. Identifiers
    /// already present are skipped; existing content is never replaced.
    /// Returns `true` when something was appended.
    pub fn append_contact(&mut self, found: &ContactMatch) -> bool {
        let existing = self.contact.clone().unwrap_or_default();
        let fresh = found
            .labelled()
            .into_iter()
            .filter(|(_, value)| !existing.contains(value.as_str()))
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>();

        if fresh.is_empty() {
            return false;
        }

        let addition = fresh.join(" | ");
        self.contact = Some(if existing.trim().is_empty() {
            addition
        } else {
            format!("{existing} | {addition}")
        });
        true
    }

    pub fn value_of(&self, field: LeadField) -> Option<&str> {
        let value = match field {
            LeadField::Organization => &self.organization,
            LeadField::Pain => &self.pain,
            LeadField::TechStack => &self.tech_stack,
        };
        value.as_deref().filter(|text| !text.trim().is_empty())
    }

    pub fn is_missing(&self, field: LeadField) -> bool {
        self.value_of(field).is_none()
    }

    pub fn budget_is_confirmed(&self) -> bool {
        self.budget_confirmed == Some(true)
    }

    pub fn note_ask(&mut self, field: LeadField) {
        self.pending_ask = Some(field);
    }

    /// Resolves last turn's ask. If the asked field is still unknown the lead
    /// declined it, so the placeholder is stored and the field is never asked
    /// again. Returns the field that received the placeholder.
    pub fn settle_pending_ask(&mut self) -> Option<LeadField> {
        let field = self.pending_ask.take()?;
        if !self.is_missing(field) {
            return None;
        }

        let slot = match field {
            LeadField::Organization => &mut self.organization,
            LeadField::Pain => &mut self.pain,
            LeadField::TechStack => &mut self.tech_stack,
        };
        *slot = Some(DECLINED_PLACEHOLDER.to_string());
        Some(field)
    }

    /// Deterministic 0-100 completeness score surfaced in the audit signal.
    pub fn lead_score(&self) -> u8 {
        let mut score = 0u8;
        if !self.is_missing(LeadField::Organization) {
            score += 20;
        }
        if !self.is_missing(LeadField::Pain) {
            score += 20;
        }
        if !self.is_missing(LeadField::TechStack) {
            score += 10;
        }
        score += match self.urgency {
            Some(Urgency::High) => 15,
            Some(Urgency::Medium) => 10,
            Some(Urgency::Low) => 5,
            None => 0,
        };
        if self.budget_is_confirmed() {
            score += 30;
        }
        if self.contact.as_deref().is_some_and(|contact| !contact.trim().is_empty()) {
            score += 5;
        }
        score
    }
}

fn override_if_present<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value);
    }
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Maps undecodable values to `None` instead of rejecting the whole payload.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Like [`lenient`], but case-insensitive for enum codes.
fn lenient_code<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| {
        let value = match value {
            Value::String(text) => Value::String(text.trim().to_ascii_lowercase()),
            other => other,
        };
        serde_json::from_value(value).ok()
    }))
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "si" | "sí" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}
