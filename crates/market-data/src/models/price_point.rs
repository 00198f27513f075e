//! Daily price observations.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InstrumentCode;
use crate::errors::ValidationError;

/// Direction of a price move relative to the previous observation or bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Positive,
    Negative,
    Unchanged,
    #[default]
    Unknown,
}

impl ChangeType {
    /// Derive the direction from a signed percentage.
    pub fn from_percent(percent: Option<Decimal>) -> Self {
        match percent {
            Some(p) if p > Decimal::ZERO => Self::Positive,
            Some(p) if p < Decimal::ZERO => Self::Negative,
            Some(_) => Self::Unchanged,
            None => Self::Unknown,
        }
    }

    /// Lenient parse of a wire label. Unrecognized labels map to `Unknown`.
    pub fn parse_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" | "up" | "rise" => Self::Positive,
            "negative" | "down" | "fall" => Self::Negative,
            "unchanged" | "flat" | "same" => Self::Unchanged,
            _ => Self::Unknown,
        }
    }
}

/// One price for one instrument on one calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub instrument_code: InstrumentCode,
    pub observed_date: NaiveDate,
    /// Price in the local currency's smallest quoted unit per kilogram.
    pub price: Decimal,
    pub change_percent: Option<Decimal>,
    pub change_type: ChangeType,
}

impl PricePoint {
    /// Build a validated point.
    ///
    /// When `change_type` is absent it is derived from `change_percent`.
    pub fn new(
        instrument_code: InstrumentCode,
        observed_date: NaiveDate,
        price: Decimal,
        change_percent: Option<Decimal>,
        change_type: Option<ChangeType>,
    ) -> Result<Self, ValidationError> {
        if price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice {
                code: instrument_code.to_string(),
                date: observed_date,
                price,
            });
        }
        let change_type = match change_type {
            Some(ChangeType::Unknown) | None => ChangeType::from_percent(change_percent),
            Some(explicit) => explicit,
        };
        Ok(Self {
            instrument_code,
            observed_date,
            price,
            change_percent,
            change_type,
        })
    }
}
