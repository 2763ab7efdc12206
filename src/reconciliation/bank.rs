//! Bank statement tie-out against ledger balances

use chrono::NaiveDate;

use crate::period::Period;
use crate::reconciliation::registry::BankRegistry;
use crate::traits::SourceAdapter;
use crate::types::*;
use crate::utils::money::{percentage, round2, sum_round2, tie_out_tolerance};

/// Number of unreconciled references quoted in an exception
const SAMPLE_REF_LIMIT: usize = 5;

const TIE_OUT_ASSUMPTION: &str = "Best-effort tie-out uses sum of statement line amounts vs posted journal move-line balances for the period.";

/// Ageing bucket of a line relative to the exclusive end of the period
pub fn aging_bucket(line_date: Option<NaiveDate>, period: Period) -> AgingBucket {
    let Some(date) = line_date else {
        return AgingBucket::Unknown;
    };
    let age_days = (period.end_exclusive() - date).num_days();
    if age_days <= 30 {
        AgingBucket::Days0To30
    } else if age_days <= 60 {
        AgingBucket::Days31To60
    } else {
        AgingBucket::Days61Plus
    }
}

/// Runs the bank tie-out for every discovered journal
pub struct BankReconciliationEngine<'a, S: SourceAdapter + ?Sized> {
    source: &'a S,
    registry: &'a BankRegistry,
}

impl<'a, S: SourceAdapter + ?Sized> BankReconciliationEngine<'a, S> {
    pub fn new(source: &'a S, registry: &'a BankRegistry) -> Self {
        Self { source, registry }
    }

    /// Reconcile all journals for the period and roll the results up
    pub async fn reconcile(&self, period: Period) -> CloseResult<BankReconciliationResult> {
        let journals = self.source.discover_bank_journals().await?;
        tracing::info!(%period, journals = journals.len(), "starting bank reconciliation");

        let mut banks = Vec::with_capacity(journals.len());
        for journal in &journals {
            banks.push(self.reconcile_journal(journal, period).await?);
        }

        let bank_controls_rollup = rollup(&banks);
        tracing::info!(
            %period,
            lines = bank_controls_rollup.total_statement_lines,
            reconciled = bank_controls_rollup.total_reconciled_lines,
            exceptions = bank_controls_rollup.exception_count,
            "bank reconciliation complete"
        );

        Ok(BankReconciliationResult {
            period,
            banks,
            proposed_journals: journals.iter().map(|j| j.name.clone()).collect(),
            bank_controls_rollup,
        })
    }

    /// Tie out a single journal
    pub async fn reconcile_journal(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<BankReconciliation> {
        let profile = self.registry.resolve(&journal.name, &journal.currency);
        let lines = self.source.get_statement_lines(journal, period).await?;
        let ledger_balance = round2(&self.source.get_journal_balance(journal, period).await?);
        tracing::debug!(journal = %journal.name, lines = lines.len(), "fetched statement lines");

        let (reconciled, unreconciled): (Vec<&StatementLine>, Vec<&StatementLine>) =
            lines.iter().partition(|line| line.is_reconciled);

        let mut aging = AgingBuckets::default();
        for line in &unreconciled {
            aging.record(aging_bucket(line.date, period));
        }

        let statement_ending_balance = sum_round2(lines.iter().map(|line| &line.amount));
        let difference = round2(&(&statement_ending_balance - &ledger_balance));

        let mut exceptions = Vec::new();
        if !unreconciled.is_empty() {
            exceptions.push(BankException {
                kind: BankExceptionKind::UnreconciledLines,
                message: format!("{} unreconciled statement lines.", unreconciled.len()),
                sample_refs: unreconciled
                    .iter()
                    .take(SAMPLE_REF_LIMIT)
                    .map(|line| line.reference.clone())
                    .collect(),
                difference: None,
            });
        }
        if difference.abs() > tie_out_tolerance() {
            exceptions.push(BankException {
                kind: BankExceptionKind::TieOutDifference,
                message: "Statement vs ledger tie-out difference exceeds tolerance.".to_string(),
                sample_refs: Vec::new(),
                difference: Some(difference.clone()),
            });
        }

        let total = lines.len() as u64;
        let reconciled_count = reconciled.len() as u64;

        Ok(BankReconciliation {
            code: profile.code,
            display_name: profile.display_name,
            journal: journal.name.clone(),
            journal_id: journal.id,
            journal_type: journal.journal_type,
            currency: profile.currency,
            statement_line_count: total,
            reconciled_count,
            unreconciled_count: unreconciled.len() as u64,
            reconciled_pct: percentage(reconciled_count, total),
            unreconciled_aging_buckets: aging,
            exceptions,
            tie_out: TieOut {
                statement_ending_balance,
                ledger_balance,
                difference,
                assumption: TIE_OUT_ASSUMPTION.to_string(),
            },
        })
    }
}

fn rollup(banks: &[BankReconciliation]) -> BankRollup {
    let total_statement_lines: u64 = banks.iter().map(|b| b.statement_line_count).sum();
    let total_reconciled_lines: u64 = banks.iter().map(|b| b.reconciled_count).sum();
    let exceptions: Vec<RolledUpBankException> = banks
        .iter()
        .flat_map(|bank| {
            bank.exceptions.iter().map(|exception| RolledUpBankException {
                bank: bank.display_name.clone(),
                exception: exception.clone(),
            })
        })
        .collect();

    BankRollup {
        bank_count: banks.len() as u64,
        total_statement_lines,
        total_reconciled_lines,
        overall_reconciled_pct: percentage(total_reconciled_lines, total_statement_lines),
        exception_count: exceptions.len() as u64,
        exceptions,
    }
}
