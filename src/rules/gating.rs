//! Month-end gating: RED/AMBER/GREEN decision and the override gate

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::rules::overrides::OverrideRegistry;
use crate::types::{CloseError, CloseResult};
use crate::utils::money::{deserialize_amount, round2};

/// Traffic-light outcome of a gating evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatingStatus {
    Green,
    Amber,
    Red,
}

impl fmt::Display for GatingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GatingStatus::Green => "GREEN",
            GatingStatus::Amber => "AMBER",
            GatingStatus::Red => "RED",
        };
        f.write_str(label)
    }
}

/// Upper bounds a run may reach while staying in a tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTier {
    pub max_unmatched_transactions: u64,
    #[serde(deserialize_with = "deserialize_amount")]
    pub max_unexplained_amount: BigDecimal,
    #[serde(deserialize_with = "deserialize_amount")]
    pub max_vat_monthly_difference: BigDecimal,
}

impl ThresholdTier {
    /// Whether any input strictly exceeds this tier
    fn exceeded_by(&self, inputs: &GatingInputs) -> bool {
        inputs.unmatched_transactions > self.max_unmatched_transactions
            || inputs.unexplained_amount > self.max_unexplained_amount
            || inputs.max_vat_monthly_difference() > self.max_vat_monthly_difference
    }
}

/// Green and amber bounds; anything beyond amber is RED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingThresholds {
    pub green: ThresholdTier,
    pub amber: ThresholdTier,
}

impl Default for GatingThresholds {
    fn default() -> Self {
        Self {
            green: ThresholdTier {
                max_unmatched_transactions: 0,
                max_unexplained_amount: BigDecimal::from(0),
                max_vat_monthly_difference: BigDecimal::from(0),
            },
            amber: ThresholdTier {
                max_unmatched_transactions: 5,
                max_unexplained_amount: BigDecimal::from(1000),
                max_vat_monthly_difference: BigDecimal::from(250),
            },
        }
    }
}

impl GatingThresholds {
    /// Load thresholds from JSON; a missing file yields the defaults
    pub fn load(path: &Path) -> CloseResult<Self> {
        if !path.exists() {
            tracing::debug!(file = %path.display(), "no thresholds file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let thresholds: Self = serde_json::from_str(&raw).map_err(|e| {
            CloseError::Configuration(format!("gating thresholds {}: {e}", path.display()))
        })?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Amber bounds must not be tighter than green bounds
    pub fn validate(&self) -> CloseResult<()> {
        let mut violations = Vec::new();
        if self.amber.max_unmatched_transactions < self.green.max_unmatched_transactions {
            violations.push("max_unmatched_transactions");
        }
        if self.amber.max_unexplained_amount < self.green.max_unexplained_amount {
            violations.push("max_unexplained_amount");
        }
        if self.amber.max_vat_monthly_difference < self.green.max_vat_monthly_difference {
            violations.push("max_vat_monthly_difference");
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CloseError::Configuration(format!(
                "amber thresholds must be >= green thresholds: {}",
                violations.join(", ")
            )))
        }
    }
}

/// Summary metrics the gate evaluates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingInputs {
    pub unmatched_transactions: u64,
    pub unexplained_amount: BigDecimal,
    pub vat_monthly_differences: Vec<BigDecimal>,
}

impl GatingInputs {
    pub fn new(
        unmatched_transactions: u64,
        unexplained_amount: BigDecimal,
        vat_monthly_differences: Vec<BigDecimal>,
    ) -> Self {
        Self {
            unmatched_transactions,
            unexplained_amount: round2(&unexplained_amount),
            vat_monthly_differences,
        }
    }

    /// Largest absolute monthly VAT difference, zero when there are none
    pub fn max_vat_monthly_difference(&self) -> BigDecimal {
        let max = self
            .vat_monthly_differences
            .iter()
            .map(|d| d.abs())
            .max()
            .unwrap_or_else(|| BigDecimal::from(0));
        round2(&max)
    }
}

/// Evaluate the gate; RED is checked before AMBER
pub fn evaluate(inputs: &GatingInputs, thresholds: &GatingThresholds) -> GatingStatus {
    if thresholds.amber.exceeded_by(inputs) {
        GatingStatus::Red
    } else if thresholds.green.exceeded_by(inputs) {
        GatingStatus::Amber
    } else {
        GatingStatus::Green
    }
}

/// Close may proceed on GREEN or AMBER, and on RED only with an override
pub fn can_proceed(status: GatingStatus, overrides: &OverrideRegistry) -> bool {
    status != GatingStatus::Red || !overrides.is_empty()
}
