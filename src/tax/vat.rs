//! VAT line classification for the exception register

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::Period;
use crate::types::TaxLine;

/// Direction of a VAT line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxType {
    /// VAT paid on purchases
    Input,
    /// VAT charged on sales
    Output,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::Input => "input",
            TaxType::Output => "output",
        }
    }
}

impl fmt::Display for TaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exception categories, declared in classification priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VatCategory {
    #[serde(rename = "credit_notes/reversals")]
    CreditNotesReversals,
    #[serde(rename = "timing/posting period")]
    TimingPostingPeriod,
    #[serde(rename = "missing documents")]
    MissingDocuments,
    #[serde(rename = "wrong tax tags")]
    WrongTaxTags,
    #[serde(rename = "FX rounding")]
    FxRounding,
}

impl VatCategory {
    pub fn label(&self) -> &'static str {
        match self {
            VatCategory::CreditNotesReversals => "credit_notes/reversals",
            VatCategory::TimingPostingPeriod => "timing/posting period",
            VatCategory::MissingDocuments => "missing documents",
            VatCategory::WrongTaxTags => "wrong tax tags",
            VatCategory::FxRounding => "FX rounding",
        }
    }
}

impl fmt::Display for VatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const REFUND_MOVE_TYPES: [&str; 2] = ["out_refund", "in_refund"];

/// Classify a tax line into at most one category; first match wins.
pub fn classify(line: &TaxLine, period: Period) -> Option<VatCategory> {
    let hint = line.exception_hint.to_lowercase();
    let move_type = line.move_type.to_lowercase();
    let source_period = line.source_period.trim();

    if hint.contains("credit") || REFUND_MOVE_TYPES.contains(&move_type.as_str()) {
        return Some(VatCategory::CreditNotesReversals);
    }
    if hint.contains("timing") || (!source_period.is_empty() && source_period != period.to_string())
    {
        return Some(VatCategory::TimingPostingPeriod);
    }
    if line.document_ref.trim().is_empty() || hint.contains("missing") {
        return Some(VatCategory::MissingDocuments);
    }
    if hint.contains("tag") {
        return Some(VatCategory::WrongTaxTags);
    }
    if hint.contains("fx") {
        return Some(VatCategory::FxRounding);
    }
    None
}
