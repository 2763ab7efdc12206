//! VAT reconciliation of ledger extracts against the tax authority import

use bigdecimal::BigDecimal;

use crate::period::{iter_periods, Period};
use crate::tax::tra::TraImport;
use crate::tax::vat::{classify, TaxType};
use crate::traits::SourceAdapter;
use crate::types::*;
use crate::utils::money::{round2, sum_round2};

/// Compares monthly ledger VAT with the external extract and builds the
/// exception register
pub struct VatReconciliationEngine<'a, S: SourceAdapter + ?Sized> {
    source: &'a S,
    tra: &'a TraImport,
}

impl<'a, S: SourceAdapter + ?Sized> VatReconciliationEngine<'a, S> {
    pub fn new(source: &'a S, tra: &'a TraImport) -> Self {
        Self { source, tra }
    }

    /// Reconcile every month from `period_from` to `period_to` inclusive
    pub async fn reconcile(
        &self,
        period_from: Period,
        period_to: Period,
    ) -> CloseResult<VatReconciliationResult> {
        let periods = iter_periods(period_from, period_to)?;
        tracing::info!(%period_from, %period_to, months = periods.len(), "starting VAT reconciliation");

        let mut monthly_summary = Vec::with_capacity(periods.len());
        let mut exception_register = Vec::new();

        for period in periods {
            let (summary, exceptions) = self.reconcile_month(period).await?;
            monthly_summary.push(summary);
            exception_register.extend(exceptions);
        }

        let aggregate: BigDecimal = monthly_summary
            .iter()
            .map(|row| row.net_vat_difference.abs())
            .sum();

        let metrics = VatMetrics {
            months: monthly_summary.len() as u64,
            exception_count: exception_register.len() as u64,
            aggregate_net_vat_difference_abs: round2(&aggregate),
        };
        tracing::info!(
            months = metrics.months,
            exceptions = metrics.exception_count,
            aggregate = %metrics.aggregate_net_vat_difference_abs,
            "VAT reconciliation complete"
        );

        Ok(VatReconciliationResult {
            period_from,
            period_to,
            monthly_summary,
            exception_register,
            tra_file: self.tra.source().map(|p| p.display().to_string()),
            metrics,
        })
    }

    /// Compare one month and classify its tax lines
    pub async fn reconcile_month(
        &self,
        period: Period,
    ) -> CloseResult<(VatMonthlySummary, Vec<VatException>)> {
        let input_lines = self.source.get_vat_tax_lines(period, TaxType::Input).await?;
        let output_lines = self.source.get_vat_tax_lines(period, TaxType::Output).await?;
        tracing::debug!(
            %period,
            input = input_lines.len(),
            output = output_lines.len(),
            "fetched tax lines"
        );

        let ledger_input = sum_round2(input_lines.iter().map(|l| &l.vat_amount));
        let ledger_output = sum_round2(output_lines.iter().map(|l| &l.vat_amount));

        let key = period.to_string();
        let tra_row = self.tra.row_or_zero(&key);
        let tra_input = round2(&tra_row.input_vat);
        let tra_output = round2(&tra_row.output_vat);

        let input_difference = round2(&(&ledger_input - &tra_input));
        let output_difference = round2(&(&ledger_output - &tra_output));
        let net_vat_difference =
            round2(&((&ledger_output - &ledger_input) - (&tra_output - &tra_input)));

        let control = self.source.get_vat_control_balance(period).await?;

        let summary = VatMonthlySummary {
            period,
            ledger_input_vat: ledger_input,
            tra_input_vat: tra_input,
            input_difference,
            ledger_output_vat: ledger_output,
            tra_output_vat: tra_output,
            output_difference,
            net_vat_difference,
            vat_control_balance: round2(&control.closing_balance),
            vat_control_assumption: control.assumption,
        };

        let exceptions = input_lines
            .iter()
            .chain(output_lines.iter())
            .filter_map(|line| {
                classify(line, period).map(|category| VatException {
                    period,
                    category,
                    document_ref: line.document_ref.clone(),
                    source_period: line.source_period.clone(),
                    vat_amount: round2(&line.vat_amount),
                    tax_type: line.tax_type,
                    notes: line.notes.clone(),
                })
            })
            .collect();

        Ok((summary, exceptions))
    }
}
