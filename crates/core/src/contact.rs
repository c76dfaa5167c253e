//! Contact rescue: pulls email and phone identifiers out of free text so a
//! lead can be followed up manually even when the reasoning pipeline fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").ok());

// Ten contiguous digits, or 3-3-4 groups split by space, hyphen or dot.
static PHONE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b(?:\d{3}[-.\s]\d{3}[-.\s]\d{4}|\d{10})\b").ok());

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ContactMatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }

    /// `(label, value)` pairs in a stable order: email first, then phone.
    pub fn labelled(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(email) = &self.email {
            pairs.push(("email", email.clone()));
        }
        if let Some(phone) = &self.phone {
            pairs.push(("tel", phone.clone()));
        }
        pairs
    }

    pub fn summary(&self) -> String {
        self.labelled()
            .into_iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContactExtractor;

impl ContactExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Returns the first email and the first phone found. Never fails; no
    /// match yields an empty result.
    pub fn extract(&self, text: &str) -> ContactMatch {
        ContactMatch {
            email: first_match(&EMAIL_PATTERN, text),
            phone: first_match(&PHONE_PATTERN, text),
        }
    }
}

fn first_match(pattern: &Lazy<Option<Regex>>, text: &str) -> Option<String> {
    let pattern = pattern.as_ref()?;
    pattern.find(text).map(|found| found.as_str().to_string())
}
