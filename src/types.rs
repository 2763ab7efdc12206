//! Core types and data structures for the month-end close engines

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::tax::vat::{TaxType, VatCategory};

/// Kind of cash journal the ledger exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalType {
    Bank,
    Cash,
}

/// A bank or cash journal discovered in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankJournal {
    /// Ledger identifier of the journal
    pub id: i64,
    /// Display name as stored in the ledger
    pub name: String,
    /// Bank or cash
    pub journal_type: JournalType,
    /// Currency name, empty when the journal uses the company currency
    pub currency: String,
    /// Whether the journal is active
    pub active: bool,
    /// Stable code used to key fixture files and registry lookups
    pub code: String,
}

/// Canonical presentation of a journal resolved through the bank registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankProfile {
    pub code: String,
    pub display_name: String,
    pub currency: String,
}

/// A single bank statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub id: String,
    /// Value date; lines without a date age into the `unknown` bucket
    pub date: Option<NaiveDate>,
    /// Signed amount, positive for money in
    pub amount: BigDecimal,
    pub reference: String,
    pub payment_ref: String,
    /// Already matched to one or more ledger move lines
    pub is_reconciled: bool,
    pub move_line_count: u32,
}

/// A VAT-bearing ledger line extracted for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    /// Period the line was requested for
    pub period: Period,
    pub tax_type: TaxType,
    /// Absolute VAT amount
    pub vat_amount: BigDecimal,
    pub document_ref: String,
    pub move_type: String,
    /// Period the source document belongs to; may differ from `period`
    pub source_period: String,
    pub exception_hint: String,
    pub notes: String,
}

/// Ageing bucket of an unreconciled statement line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "0_30")]
    Days0To30,
    #[serde(rename = "31_60")]
    Days31To60,
    #[serde(rename = "61_plus")]
    Days61Plus,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Counts of unreconciled lines per ageing bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingBuckets {
    #[serde(rename = "0_30")]
    pub days_0_30: u64,
    #[serde(rename = "31_60")]
    pub days_31_60: u64,
    #[serde(rename = "61_plus")]
    pub days_61_plus: u64,
    pub unknown: u64,
}

impl AgingBuckets {
    /// Count one more line in the given bucket
    pub fn record(&mut self, bucket: AgingBucket) {
        match bucket {
            AgingBucket::Days0To30 => self.days_0_30 += 1,
            AgingBucket::Days31To60 => self.days_31_60 += 1,
            AgingBucket::Days61Plus => self.days_61_plus += 1,
            AgingBucket::Unknown => self.unknown += 1,
        }
    }

    /// Total lines across all buckets
    pub fn total(&self) -> u64 {
        self.days_0_30 + self.days_31_60 + self.days_61_plus + self.unknown
    }
}

/// Exceptions raised by the bank tie-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankExceptionKind {
    UnreconciledLines,
    TieOutDifference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankException {
    #[serde(rename = "type")]
    pub kind: BankExceptionKind,
    pub message: String,
    /// Up to five references of unreconciled lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference: Option<BigDecimal>,
}

/// A bank exception annotated with the owning bank's display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolledUpBankException {
    pub bank: String,
    #[serde(flatten)]
    pub exception: BankException,
}

/// Statement versus ledger comparison for one journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieOut {
    pub statement_ending_balance: BigDecimal,
    pub ledger_balance: BigDecimal,
    pub difference: BigDecimal,
    pub assumption: String,
}

/// Reconciliation outcome for a single bank journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankReconciliation {
    pub code: String,
    pub display_name: String,
    pub journal: String,
    pub journal_id: i64,
    pub journal_type: JournalType,
    pub currency: String,
    pub statement_line_count: u64,
    pub reconciled_count: u64,
    pub unreconciled_count: u64,
    pub reconciled_pct: BigDecimal,
    pub unreconciled_aging_buckets: AgingBuckets,
    pub exceptions: Vec<BankException>,
    pub tie_out: TieOut,
}

/// Cross-bank rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRollup {
    pub bank_count: u64,
    pub total_statement_lines: u64,
    pub total_reconciled_lines: u64,
    pub overall_reconciled_pct: BigDecimal,
    pub exception_count: u64,
    pub exceptions: Vec<RolledUpBankException>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankReconciliationResult {
    pub period: Period,
    pub banks: Vec<BankReconciliation>,
    /// Journal names in discovery order
    pub proposed_journals: Vec<String>,
    pub bank_controls_rollup: BankRollup,
}

impl BankReconciliationResult {
    /// Statement lines not yet matched to the ledger
    pub fn unmatched_transactions(&self) -> u64 {
        self.bank_controls_rollup.total_statement_lines
            - self.bank_controls_rollup.total_reconciled_lines
    }

    /// Sum of absolute per-bank tie-out differences
    pub fn unexplained_amount(&self) -> BigDecimal {
        self.banks
            .iter()
            .map(|bank| bank.tie_out.difference.abs())
            .sum()
    }
}

/// Ledger vs external VAT comparison for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatMonthlySummary {
    pub period: Period,
    pub ledger_input_vat: BigDecimal,
    pub tra_input_vat: BigDecimal,
    pub input_difference: BigDecimal,
    pub ledger_output_vat: BigDecimal,
    pub tra_output_vat: BigDecimal,
    pub output_difference: BigDecimal,
    pub net_vat_difference: BigDecimal,
    pub vat_control_balance: BigDecimal,
    pub vat_control_assumption: String,
}

/// Row of the VAT exception register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatException {
    pub period: Period,
    pub category: VatCategory,
    pub document_ref: String,
    pub source_period: String,
    pub vat_amount: BigDecimal,
    pub tax_type: TaxType,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatMetrics {
    pub months: u64,
    pub exception_count: u64,
    /// Sum of each month's absolute net difference
    pub aggregate_net_vat_difference_abs: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatReconciliationResult {
    pub period_from: Period,
    pub period_to: Period,
    pub monthly_summary: Vec<VatMonthlySummary>,
    pub exception_register: Vec<VatException>,
    pub tra_file: Option<String>,
    pub metrics: VatMetrics,
}

impl VatReconciliationResult {
    /// Net VAT difference per month, in chronological order
    pub fn monthly_differences(&self) -> Vec<BigDecimal> {
        self.monthly_summary
            .iter()
            .map(|row| row.net_vat_difference.clone())
            .collect()
    }
}

/// Errors that can occur during a close run
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Source data error: {0}")]
    Data(String),
    #[error("Report error: {0}")]
    Report(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for close operations
pub type CloseResult<T> = Result<T, CloseError>;
