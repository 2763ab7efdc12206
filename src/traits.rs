//! Traits for source abstraction

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::tax::vat::TaxType;
use crate::types::*;

/// Read-only access to the ledger data a close run needs
///
/// Implemented by the fixture reader and the live ledger client so the
/// reconciliation engines never depend on a concrete source. Absent data
/// for a journal or period is an empty result, not an error; any error
/// returned is fatal to the current run.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// All active bank and cash journals
    async fn discover_bank_journals(&self) -> CloseResult<Vec<BankJournal>>;

    /// Statement lines of a journal dated within the period
    async fn get_statement_lines(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<Vec<StatementLine>>;

    /// Sum of posted ledger move-line balances for the journal and period
    async fn get_journal_balance(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<BigDecimal>;

    /// Input or output tax lines touching posted transactions in the period
    async fn get_vat_tax_lines(
        &self,
        period: Period,
        tax_type: TaxType,
    ) -> CloseResult<Vec<TaxLine>>;

    /// Best-effort reconstruction of the VAT control account for the period
    async fn get_vat_control_balance(&self, period: Period) -> CloseResult<VatControlBalance>;
}

/// Approximate VAT control account movement for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatControlBalance {
    pub opening_balance: BigDecimal,
    pub debits: BigDecimal,
    pub credits: BigDecimal,
    pub closing_balance: BigDecimal,
    /// What exact balance these figures approximate
    pub assumption: String,
}

impl VatControlBalance {
    /// Build a snapshot with `closing = opening + debits - credits`
    pub fn from_movements(
        opening_balance: BigDecimal,
        debits: BigDecimal,
        credits: BigDecimal,
        assumption: impl Into<String>,
    ) -> Self {
        let closing_balance = &opening_balance + &debits - &credits;
        Self {
            opening_balance,
            debits,
            credits,
            closing_balance,
            assumption: assumption.into(),
        }
    }
}
