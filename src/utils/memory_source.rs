//! In-memory source implementation for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;

use crate::period::Period;
use crate::tax::vat::TaxType;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::sum_round2;

/// In-memory source adapter for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    journals: Vec<BankJournal>,
    statement_lines: HashMap<(i64, Period), Vec<StatementLine>>,
    journal_balances: HashMap<(i64, Period), BigDecimal>,
    tax_lines: HashMap<(Period, TaxType), Vec<TaxLine>>,
    control_balances: HashMap<Period, VatControlBalance>,
    failure: Option<String>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active bank journal and return it
    pub fn add_journal(&mut self, id: i64, name: &str, currency: &str) -> BankJournal {
        let journal = BankJournal {
            id,
            name: name.to_string(),
            journal_type: JournalType::Bank,
            currency: currency.to_string(),
            active: true,
            code: id.to_string(),
        };
        self.journals.push(journal.clone());
        journal
    }

    pub fn add_statement_lines(
        &mut self,
        journal: &BankJournal,
        period: Period,
        lines: Vec<StatementLine>,
    ) {
        self.statement_lines
            .entry((journal.id, period))
            .or_default()
            .extend(lines);
    }

    pub fn set_journal_balance(&mut self, journal: &BankJournal, period: Period, balance: BigDecimal) {
        self.journal_balances.insert((journal.id, period), balance);
    }

    /// Add tax lines; each is filed under its own period and tax type
    pub fn add_tax_lines(&mut self, lines: Vec<TaxLine>) {
        for line in lines {
            self.tax_lines
                .entry((line.period, line.tax_type))
                .or_default()
                .push(line);
        }
    }

    pub fn set_control_balance(&mut self, period: Period, balance: VatControlBalance) {
        self.control_balances.insert(period, balance);
    }

    /// Make every subsequent call fail with a connection error
    pub fn fail_with(&mut self, cause: &str) {
        self.failure = Some(cause.to_string());
    }

    /// Clear all data (useful for testing)
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn check(&self) -> CloseResult<()> {
        match &self.failure {
            Some(cause) => Err(CloseError::Connection(cause.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceAdapter for MemorySource {
    async fn discover_bank_journals(&self) -> CloseResult<Vec<BankJournal>> {
        self.check()?;
        Ok(self.journals.iter().filter(|j| j.active).cloned().collect())
    }

    async fn get_statement_lines(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<Vec<StatementLine>> {
        self.check()?;
        Ok(self
            .statement_lines
            .get(&(journal.id, period))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_journal_balance(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<BigDecimal> {
        self.check()?;
        Ok(self
            .journal_balances
            .get(&(journal.id, period))
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn get_vat_tax_lines(
        &self,
        period: Period,
        tax_type: TaxType,
    ) -> CloseResult<Vec<TaxLine>> {
        self.check()?;
        Ok(self
            .tax_lines
            .get(&(period, tax_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_vat_control_balance(&self, period: Period) -> CloseResult<VatControlBalance> {
        self.check()?;
        if let Some(balance) = self.control_balances.get(&period) {
            return Ok(balance.clone());
        }

        let empty = Vec::new();
        let inputs = self.tax_lines.get(&(period, TaxType::Input)).unwrap_or(&empty);
        let outputs = self.tax_lines.get(&(period, TaxType::Output)).unwrap_or(&empty);
        Ok(VatControlBalance::from_movements(
            BigDecimal::from(0),
            sum_round2(inputs.iter().map(|l| &l.vat_amount)),
            sum_round2(outputs.iter().map(|l| &l.vat_amount)),
            "In-memory source: control balance derived from registered tax lines.",
        ))
    }
}
