//! Axis label selection under a pixel budget.

use std::collections::BTreeSet;

use scrapmarket_market_data::Period;
use serde::Serialize;

use crate::errors::LayoutError;

/// Per-period label limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelProfile {
    min_labels: usize,
    max_labels: usize,
    /// Labels are shortened when capacity drops below this.
    compact_below: usize,
}

impl LabelProfile {
    /// `min_labels` is raised to 2 so both ends always fit; `max_labels` is
    /// raised to `min_labels`.
    pub fn new(min_labels: usize, max_labels: usize, compact_below: usize) -> Self {
        let min_labels = min_labels.max(2);
        Self {
            min_labels,
            max_labels: max_labels.max(min_labels),
            compact_below,
        }
    }

    pub fn for_period(period: Period) -> Self {
        match period {
            Period::Daily => Self::new(2, 7, 5),
            Period::Weekly => Self::new(2, 6, 4),
            Period::Monthly => Self::new(2, 12, 6),
        }
    }

    pub fn min_labels(&self) -> usize {
        self.min_labels
    }

    pub fn max_labels(&self) -> usize {
        self.max_labels
    }
}

/// Horizontal space available to the axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBudget {
    width_px: u32,
    min_spacing_px: u32,
    avg_label_width_px: u32,
}

impl PixelBudget {
    pub fn new(
        width_px: u32,
        min_spacing_px: u32,
        avg_label_width_px: u32,
    ) -> Result<Self, LayoutError> {
        if width_px == 0 {
            return Err(LayoutError::ZeroPixelBudget);
        }
        if avg_label_width_px.saturating_add(min_spacing_px) == 0 {
            return Err(LayoutError::ZeroLabelSlot);
        }
        Ok(Self {
            width_px,
            min_spacing_px,
            avg_label_width_px,
        })
    }

    /// Labels that fit before clamping: `width / (label + spacing)`.
    pub fn raw_capacity(&self) -> usize {
        let slot = self.avg_label_width_px.saturating_add(self.min_spacing_px);
        (self.width_px / slot) as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedLabel {
    pub index: usize,
    pub text: String,
    pub is_visible: bool,
}

/// One entry per raw label, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelPlan {
    pub labels: Vec<PlannedLabel>,
    pub capacity: usize,
    pub compacted: bool,
}

impl LabelPlan {
    pub fn visible(&self) -> impl Iterator<Item = &PlannedLabel> {
        self.labels.iter().filter(|l| l.is_visible)
    }

    pub fn visible_texts(&self) -> Vec<&str> {
        self.visible().map(|l| l.text.as_str()).collect()
    }
}

/// Shorten a full-length label: `2024/01/05` -> `01/05`, `2024/01` -> `24/01`.
/// Anything else is returned unchanged.
pub fn compact_label(label: &str) -> String {
    let parts: Vec<&str> = label.split('/').collect();
    let is_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    match parts.as_slice() {
        [year, month, day] if is_digits(year, 4) && is_digits(month, 2) && is_digits(day, 2) => {
            format!("{}/{}", month, day)
        }
        [year, month] if is_digits(year, 4) && is_digits(month, 2) => {
            format!("{}/{}", &year[2..], month)
        }
        _ => label.to_string(),
    }
}

/// Picks which axis labels to draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelLayoutEngine {
    profile: LabelProfile,
}

impl LabelLayoutEngine {
    pub fn new(profile: LabelProfile) -> Self {
        Self { profile }
    }

    pub fn for_period(period: Period) -> Self {
        Self::new(LabelProfile::for_period(period))
    }

    pub fn capacity(&self, budget: &PixelBudget) -> usize {
        budget
            .raw_capacity()
            .clamp(self.profile.min_labels, self.profile.max_labels)
    }

    /// Select an evenly spread subset of `raw_labels`.
    ///
    /// The first and last labels are always visible. When there are more
    /// labels than capacity `c`, exactly `c` are visible, at indices
    /// `round(i * (n - 1) / (c - 1))`.
    pub fn plan<S: AsRef<str>>(&self, raw_labels: &[S], budget: &PixelBudget) -> LabelPlan {
        let n = raw_labels.len();
        let capacity = self.capacity(budget);
        let compacted = capacity < self.profile.compact_below;

        let visible: BTreeSet<usize> = if n <= capacity {
            (0..n).collect()
        } else {
            let span = n - 1;
            let steps = capacity - 1;
            (0..capacity)
                .map(|i| (2 * i * span + steps) / (2 * steps))
                .collect()
        };

        let labels = raw_labels
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let raw = raw.as_ref();
                PlannedLabel {
                    index,
                    text: if compacted {
                        compact_label(raw)
                    } else {
                        raw.to_string()
                    },
                    is_visible: visible.contains(&index),
                }
            })
            .collect();

        LabelPlan {
            labels,
            capacity,
            compacted,
        }
    }
}
