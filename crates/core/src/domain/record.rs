use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lead::LeadMemory;
use crate::errors::DomainError;

pub const WEB_CHAT_SOURCE: &str = "web-chat";
const EMPTY_CELL: &str = "N/A";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordTag {
    RescuedContact,
    Qualified,
    SystemFailure,
}

impl RecordTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RescuedContact => "rescued-contact",
            Self::Qualified => "qualified",
            Self::SystemFailure => "system-failure",
        }
    }
}

impl fmt::Display for RecordTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordTag {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "rescued-contact" => Ok(Self::RescuedContact),
            "qualified" => Ok(Self::Qualified),
            "system-failure" => Ok(Self::SystemFailure),
            other => Err(DomainError::UnknownRecordTag(other.to_string())),
        }
    }
}

/// Fixed-width row appended to the lead log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub organization: String,
    pub pain_and_contact: String,
    pub tech_stack: String,
    pub budget_confirmed: bool,
    pub urgency: String,
    pub tag: RecordTag,
    pub source: String,
    pub correlation_id: String,
}

impl LeadRecord {
    pub fn from_memory(
        memory: &LeadMemory,
        tag: RecordTag,
        correlation_id: impl Into<String>,
    ) -> Self {
        let pain_and_contact = [memory.pain.as_deref(), memory.contact.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" | ");

        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            organization: cell(memory.organization.as_deref()),
            pain_and_contact: cell(Some(pain_and_contact.as_str())),
            tech_stack: cell(memory.tech_stack.as_deref()),
            budget_confirmed: memory.budget_is_confirmed(),
            urgency: cell(memory.urgency.map(|urgency| urgency.as_str())),
            tag,
            source: WEB_CHAT_SOURCE.to_string(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Attaches the raw user message so failure rows can be followed up by hand.
    pub fn with_raw_message(mut self, message: &str) -> Self {
        let note = format!("mensaje: {}", message.trim());
        self.pain_and_contact = if self.pain_and_contact == EMPTY_CELL {
            note
        } else {
            format!("{} | {note}", self.pain_and_contact)
        };
        self
    }

    pub fn budget_label(&self) -> &'static str {
        if self.budget_confirmed {
            "yes"
        } else {
            "no"
        }
    }
}

fn cell(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => EMPTY_CELL.to_string(),
    }
}
