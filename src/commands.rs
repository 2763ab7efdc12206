//! The three close commands: bank reconciliation, VAT pack and month-end gating
//!
//! Each command validates its periods, runs the engines against the supplied
//! source, writes its artifacts under the configured outputs directory and
//! returns the payload that was written as JSON.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::CloseConfig;
use crate::period::{validate_period, Period};
use crate::reconciliation::bank::BankReconciliationEngine;
use crate::reconciliation::vat::VatReconciliationEngine;
use crate::reports::{self, Table};
use crate::rules::gating::{can_proceed, evaluate, GatingInputs, GatingStatus, GatingThresholds};
use crate::rules::overrides::OverrideRegistry;
use crate::tax::tra::TraImport;
use crate::traits::SourceAdapter;
use crate::types::*;

const BANK_NOTES: &str = "No PDF parsing; statement lines only.";
const VAT_NARRATIVE: &str = "Draft-only VAT reconciliation generated from ledger extraction and TRA import. No auto-posting performed; numbers are deterministic from source records.";

/// Identity of one command execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Artifact label to written file path
pub type Artifacts = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize)]
pub struct BankReconPayload {
    pub command: &'static str,
    pub mode: &'static str,
    pub auto_posting: bool,
    #[serde(flatten)]
    pub run: RunMetadata,
    pub notes: &'static str,
    #[serde(flatten)]
    pub result: BankReconciliationResult,
    pub artifacts: Artifacts,
}

#[derive(Debug, Clone, Serialize)]
pub struct VatPackPayload {
    pub command: &'static str,
    pub mode: &'static str,
    pub auto_posting: bool,
    #[serde(flatten)]
    pub run: RunMetadata,
    pub narrative: &'static str,
    #[serde(flatten)]
    pub result: VatReconciliationResult,
    pub artifacts: Artifacts,
}

/// VAT figures the gate looks at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VatRollup {
    pub months: u64,
    pub max_abs_net_vat_difference: BigDecimal,
    pub exception_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthEndPayload {
    pub command: &'static str,
    pub period: Period,
    pub mode: &'static str,
    pub auto_posting: bool,
    #[serde(flatten)]
    pub run: RunMetadata,
    pub status: GatingStatus,
    pub proceed: bool,
    pub gating_inputs: GatingInputs,
    pub thresholds: GatingThresholds,
    pub override_count: usize,
    pub bank_controls_rollup: BankRollup,
    pub vat_controls_rollup: VatRollup,
    pub artifacts: Artifacts,
}

/// Flattened per-bank row for the CSV and XLSX outputs
#[derive(Debug, Serialize)]
struct BankSummaryRow<'a> {
    period: Period,
    bank: &'a str,
    journal: &'a str,
    currency: &'a str,
    line_count: u64,
    reconciled_count: u64,
    reconciled_pct: &'a BigDecimal,
    difference: &'a BigDecimal,
}

fn artifact(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    dir.join(format!("{stem}.{ext}"))
}

fn record(artifacts: &mut Artifacts, key: impl Into<String>, path: &Path) {
    artifacts.insert(key.into(), path.display().to_string());
}

/// Run the bank engine and assemble the payload; nothing is written
async fn compute_bank_pack<S>(
    config: &CloseConfig,
    source: &S,
    period: Period,
) -> CloseResult<BankReconPayload>
where
    S: SourceAdapter + ?Sized,
{
    tracing::info!(%period, mode = config.mode.label(), "running bank reconciliation");
    let result = BankReconciliationEngine::new(source, &config.bank_registry)
        .reconcile(period)
        .await?;

    let stem = format!("bank_recon_{period}");
    let mut artifacts = Artifacts::new();
    for ext in ["json", "csv", "xlsx", "html"] {
        record(&mut artifacts, ext, &artifact(&config.paths.outputs_dir, &stem, ext));
    }

    Ok(BankReconPayload {
        command: "bank_recon",
        mode: config.mode.label(),
        auto_posting: false,
        run: RunMetadata::new(),
        notes: BANK_NOTES,
        result,
        artifacts,
    })
}

fn write_bank_pack(config: &CloseConfig, payload: &BankReconPayload) -> CloseResult<()> {
    let result = &payload.result;
    let period = result.period;
    let dir = &config.paths.outputs_dir;
    let stem = format!("bank_recon_{period}");

    let rows: Vec<BankSummaryRow<'_>> = result
        .banks
        .iter()
        .map(|bank| BankSummaryRow {
            period,
            bank: &bank.display_name,
            journal: &bank.journal,
            currency: &bank.currency,
            line_count: bank.statement_line_count,
            reconciled_count: bank.reconciled_count,
            reconciled_pct: &bank.reconciled_pct,
            difference: &bank.tie_out.difference,
        })
        .collect();
    let table = Table::from_rows(&rows)?;
    reports::write_csv(&table, &artifact(dir, &stem, "csv"))?;
    reports::write_xlsx(&table, "BankRecon", &artifact(dir, &stem, "xlsx"))?;
    reports::write_html(
        &format!("Bank Reconciliation {period}"),
        &[
            ("Summary", reports::section(&result.bank_controls_rollup)?),
            ("Banks", reports::section(&result.banks)?),
        ],
        &artifact(dir, &stem, "html"),
    )?;
    reports::write_json(payload, &artifact(dir, &stem, "json"))
}

/// Reconcile every bank journal for a period and write the bank pack
pub async fn run_bank_recon<S>(
    config: &CloseConfig,
    source: &S,
    period: &str,
) -> CloseResult<BankReconPayload>
where
    S: SourceAdapter + ?Sized,
{
    let period = validate_period(period)?;
    let payload = compute_bank_pack(config, source, period).await?;
    write_bank_pack(config, &payload)?;
    Ok(payload)
}

/// Pick the external VAT import: explicit path, else the fixture default for
/// the first month, else nothing
fn resolve_tra(config: &CloseConfig, explicit: Option<&Path>, from: Period) -> CloseResult<TraImport> {
    if let Some(path) = explicit {
        return TraImport::read(path);
    }

    let vat_dir = config.paths.fixtures_dir.join("vat");
    for ext in ["csv", "xlsx"] {
        let candidate = vat_dir.join(format!("tra_vat_{from}.{ext}"));
        if candidate.exists() {
            tracing::debug!(file = %candidate.display(), "using default TRA import");
            return TraImport::read(&candidate);
        }
    }

    tracing::warn!(%from, "no TRA import found, comparing against zero totals");
    Ok(TraImport::empty())
}

fn vat_stems(from: Period, to: Period) -> (String, String, String) {
    (
        format!("vat_monthly_summary_{from}_{to}"),
        format!("vat_exception_register_{from}_{to}"),
        format!("vat_pack_report_{from}_{to}"),
    )
}

/// Run the VAT engine and assemble the payload; nothing is written
async fn compute_vat_pack<S>(
    config: &CloseConfig,
    source: &S,
    from: Period,
    to: Period,
    tra: &TraImport,
) -> CloseResult<VatPackPayload>
where
    S: SourceAdapter + ?Sized,
{
    tracing::info!(%from, %to, mode = config.mode.label(), "running VAT pack");
    let result = VatReconciliationEngine::new(source, tra)
        .reconcile(from, to)
        .await?;

    let dir = &config.paths.outputs_dir;
    let (summary_stem, register_stem, report_stem) = vat_stems(from, to);
    let mut artifacts = Artifacts::new();
    for ext in ["json", "csv", "xlsx"] {
        record(&mut artifacts, format!("vat_monthly_summary_{ext}"), &artifact(dir, &summary_stem, ext));
        record(&mut artifacts, format!("vat_exception_register_{ext}"), &artifact(dir, &register_stem, ext));
    }
    record(&mut artifacts, "vat_pack_report_html", &artifact(dir, &report_stem, "html"));

    Ok(VatPackPayload {
        command: "vat_pack",
        mode: config.mode.label(),
        auto_posting: false,
        run: RunMetadata::new(),
        narrative: VAT_NARRATIVE,
        result,
        artifacts,
    })
}

fn write_vat_pack(config: &CloseConfig, payload: &VatPackPayload) -> CloseResult<()> {
    let result = &payload.result;
    let (from, to) = (result.period_from, result.period_to);
    let dir = &config.paths.outputs_dir;
    let (summary_stem, register_stem, report_stem) = vat_stems(from, to);

    reports::write_json(
        &serde_json::json!({ "monthly_summary": &result.monthly_summary }),
        &artifact(dir, &summary_stem, "json"),
    )?;
    let summary = Table::from_rows(&result.monthly_summary)?;
    reports::write_csv(&summary, &artifact(dir, &summary_stem, "csv"))?;
    reports::write_xlsx(&summary, "VatSummary", &artifact(dir, &summary_stem, "xlsx"))?;

    reports::write_json(
        &serde_json::json!({ "exception_register": &result.exception_register }),
        &artifact(dir, &register_stem, "json"),
    )?;
    let register = Table::from_rows(&result.exception_register)?;
    reports::write_csv(&register, &artifact(dir, &register_stem, "csv"))?;
    reports::write_xlsx(&register, "VatExceptions", &artifact(dir, &register_stem, "xlsx"))?;

    reports::write_html(
        &format!("VAT Pack {from} to {to}"),
        &[
            ("Narrative", serde_json::json!({ "text": VAT_NARRATIVE })),
            ("Monthly Summary", reports::section(&result.monthly_summary)?),
            ("Exception Register", reports::section(&result.exception_register)?),
        ],
        &artifact(dir, &report_stem, "html"),
    )
}

/// Reconcile VAT over a month range and write the VAT pack
pub async fn run_vat_pack<S>(
    config: &CloseConfig,
    source: &S,
    period_from: &str,
    period_to: Option<&str>,
    tra_file: Option<&Path>,
) -> CloseResult<VatPackPayload>
where
    S: SourceAdapter + ?Sized,
{
    let from = validate_period(period_from)?;
    let to = match period_to {
        Some(p) => validate_period(p)?,
        None => from,
    };

    let tra = resolve_tra(config, tra_file, from)?;
    let payload = compute_vat_pack(config, source, from, to, &tra).await?;
    write_vat_pack(config, &payload)?;
    Ok(payload)
}

/// Run both packs for a period and decide whether the close may proceed.
///
/// Both engines complete before any artifact is written, so a failure in
/// either leaves nothing on disk for the period.
pub async fn run_month_end<S>(
    config: &CloseConfig,
    source: &S,
    period: &str,
    tra_file: Option<&Path>,
) -> CloseResult<MonthEndPayload>
where
    S: SourceAdapter + ?Sized,
{
    let period = validate_period(period)?;
    let tra = resolve_tra(config, tra_file, period)?;
    let bank = compute_bank_pack(config, source, period).await?;
    let vat = compute_vat_pack(config, source, period, period, &tra).await?;

    let inputs = GatingInputs::new(
        bank.result.unmatched_transactions(),
        bank.result.unexplained_amount(),
        vat.result.monthly_differences(),
    );
    let status = evaluate(&inputs, &config.thresholds);
    let overrides = OverrideRegistry::load(&config.paths.overrides_file);
    let proceed = can_proceed(status, &overrides);
    tracing::info!(
        %period,
        %status,
        proceed,
        overrides = overrides.len(),
        "month-end gate evaluated"
    );

    let vat_controls_rollup = VatRollup {
        months: vat.result.metrics.months,
        max_abs_net_vat_difference: inputs.max_vat_monthly_difference(),
        exception_count: vat.result.metrics.exception_count,
    };

    let dir = &config.paths.outputs_dir;
    let stem = format!("month_end_{period}");
    let mut artifacts = Artifacts::new();
    record(&mut artifacts, "month_end_json", &artifact(dir, &stem, "json"));
    record(&mut artifacts, "month_end_html", &artifact(dir, &stem, "html"));
    for (key, path) in &bank.artifacts {
        artifacts.insert(format!("bank_recon_{key}"), path.clone());
    }
    artifacts.extend(vat.artifacts.clone());

    write_bank_pack(config, &bank)?;
    write_vat_pack(config, &vat)?;

    let payload = MonthEndPayload {
        command: "month_end",
        period,
        mode: config.mode.label(),
        auto_posting: false,
        run: RunMetadata::new(),
        status,
        proceed,
        gating_inputs: inputs,
        thresholds: config.thresholds.clone(),
        override_count: overrides.len(),
        bank_controls_rollup: bank.result.bank_controls_rollup,
        vat_controls_rollup,
        artifacts,
    };

    reports::write_html(
        &format!("Month-End Gate {period}"),
        &[
            (
                "Decision",
                serde_json::json!({
                    "status": payload.status,
                    "proceed": payload.proceed,
                    "override_count": payload.override_count,
                }),
            ),
            ("Gating Inputs", reports::section(&payload.gating_inputs)?),
            ("Thresholds", reports::section(&payload.thresholds)?),
            ("Bank Controls", reports::section(&payload.bank_controls_rollup)?),
            ("VAT Controls", reports::section(&payload.vat_controls_rollup)?),
        ],
        &artifact(dir, &stem, "html"),
    )?;
    reports::write_json(&payload, &artifact(dir, &stem, "json"))?;
    Ok(payload)
}
