//! Instrument identity for tracked scrap-metal commodities.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Known instrument codes and their display names.
///
/// Codes outside this table are still accepted; they display as themselves.
pub const SUPPORTED_INSTRUMENTS: &[(&str, &str)] = &[
    ("CU", "Copper"),
    ("CU_BRIGHT", "Bright Copper"),
    ("BRASS", "Brass"),
    ("AL", "Aluminium"),
    ("AL_CAN", "Aluminium Cans"),
    ("STS", "Stainless Steel"),
    ("PB", "Lead"),
    ("ZN", "Zinc"),
    ("NI", "Nickel"),
    ("SN", "Tin"),
    ("HMS", "Heavy Melting Steel"),
];

/// Normalized instrument code (e.g. "CU", "AL_CAN").
///
/// Codes are trimmed and upper-cased on parse and may only contain ASCII
/// letters, digits, `_` and `-`, so they are always safe to embed in a URL path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentCode(Arc<str>);

impl InstrumentCode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(ValidationError::EmptyInstrumentCode);
        }
        if let Some(ch) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(ValidationError::InvalidInstrumentChar {
                code: input.to_string(),
                ch,
            });
        }
        Ok(Self(Arc::from(normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_supported(&self) -> bool {
        lookup_name(self.as_str()).is_some()
    }

    /// Human-readable name, or the code itself when unknown.
    pub fn display_name(&self) -> &str {
        lookup_name(self.as_str()).unwrap_or(self.as_str())
    }

    /// Reverse of [`display_name`](Self::display_name).
    ///
    /// Matches known names case-insensitively and otherwise treats the input
    /// as a code.
    pub fn from_display_name(name: &str) -> Result<Self, ValidationError> {
        let trimmed = name.trim();
        SUPPORTED_INSTRUMENTS
            .iter()
            .find(|(_, display)| display.eq_ignore_ascii_case(trimmed))
            .map_or_else(|| Self::parse(trimmed), |(code, _)| Self::parse(code))
    }

    /// All catalogue instruments in table order.
    pub fn supported() -> impl Iterator<Item = InstrumentCode> {
        SUPPORTED_INSTRUMENTS
            .iter()
            .map(|(code, _)| Self(Arc::from(*code)))
    }
}

fn lookup_name(code: &str) -> Option<&'static str> {
    SUPPORTED_INSTRUMENTS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

impl fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InstrumentCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for InstrumentCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InstrumentCode> for String {
    fn from(code: InstrumentCode) -> Self {
        code.0.to_string()
    }
}
