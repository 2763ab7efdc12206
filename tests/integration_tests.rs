//! Integration tests for finance-close against the shipped fixtures

use bigdecimal::BigDecimal;
use finance_close::{
    commands,
    config::PathSettings,
    sources::{self, FixtureSource},
    utils::MemorySource,
    AgingBuckets, BankExceptionKind, BankReconciliationEngine, CloseConfig, CloseError,
    GatingStatus, SourceMode, TraImport, VatCategory, VatReconciliationEngine,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;

fn dec(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Shipped fixtures and rules, outputs redirected to `outputs`
fn fixture_config(outputs: &Path) -> CloseConfig {
    let mut paths = PathSettings::under(&repo_root());
    paths.outputs_dir = outputs.to_path_buf();
    CloseConfig::with_paths(SourceMode::Fixture, paths).unwrap()
}

#[tokio::test]
async fn test_bank_recon_pilot_banks() {
    let outputs = tempfile::tempdir().unwrap();
    let config = fixture_config(outputs.path());
    let source = FixtureSource::new(&config.paths.fixtures_dir);

    let payload = commands::run_bank_recon(&config, &source, "2025-01").await.unwrap();
    let codes: Vec<&str> = payload.result.banks.iter().map(|b| b.code.as_str()).collect();
    assert_eq!(codes, vec!["nmb_tzs", "nbc_usd"]);
    assert_eq!(payload.result.proposed_journals, vec!["NMB TZS", "NBC USD"]);

    let nmb = &payload.result.banks[0];
    assert_eq!(nmb.display_name, "NMB Bank TZS Operating");
    assert_eq!(nmb.statement_line_count, 5);
    assert_eq!(nmb.reconciled_count + nmb.unreconciled_count, nmb.statement_line_count);
    assert_eq!(nmb.reconciled_pct, dec("40"));
    assert_eq!(
        nmb.unreconciled_aging_buckets,
        AgingBuckets {
            days_0_30: 1,
            days_31_60: 1,
            days_61_plus: 0,
            unknown: 1,
        }
    );
    assert_eq!(nmb.unreconciled_aging_buckets.total(), nmb.unreconciled_count);
    assert_eq!(nmb.tie_out.difference, BigDecimal::from(0));
    assert_eq!(nmb.exceptions.len(), 1);
    assert_eq!(nmb.exceptions[0].kind, BankExceptionKind::UnreconciledLines);
    assert_eq!(nmb.exceptions[0].sample_refs.len(), 3);

    let nbc = &payload.result.banks[1];
    assert_eq!(nbc.reconciled_pct, dec("100"));
    assert_eq!(nbc.tie_out.statement_ending_balance, dec("10250"));
    assert_eq!(nbc.tie_out.difference, dec("50"));
    assert_eq!(nbc.exceptions[0].kind, BankExceptionKind::TieOutDifference);

    let rollup = &payload.result.bank_controls_rollup;
    assert_eq!(rollup.bank_count, 2);
    assert_eq!(rollup.total_statement_lines, 7);
    assert_eq!(rollup.total_reconciled_lines, 4);
    assert_eq!(rollup.exception_count, 2);
    assert_eq!(rollup.exceptions[1].bank, "NBC Bank USD Collections");

    for ext in ["json", "csv", "xlsx", "html"] {
        assert!(outputs.path().join(format!("bank_recon_2025-01.{ext}")).exists());
    }
}

#[tokio::test]
async fn test_bank_recon_period_without_data() {
    let outputs = tempfile::tempdir().unwrap();
    let config = fixture_config(outputs.path());
    let source = FixtureSource::new(&config.paths.fixtures_dir);

    let result = BankReconciliationEngine::new(&source, &config.bank_registry)
        .reconcile(finance_close::validate_period("2025-03").unwrap())
        .await
        .unwrap();

    for bank in &result.banks {
        assert_eq!(bank.statement_line_count, 0);
        assert_eq!(bank.reconciled_pct, dec("100"));
    }
    assert_eq!(result.bank_controls_rollup.overall_reconciled_pct, dec("100"));
}

#[tokio::test]
async fn test_vat_pack_january_against_tra() {
    let outputs = tempfile::tempdir().unwrap();
    let config = fixture_config(outputs.path());
    let source = FixtureSource::new(&config.paths.fixtures_dir);

    let payload = commands::run_vat_pack(&config, &source, "2025-01", None, None)
        .await
        .unwrap();
    assert!(payload
        .result
        .tra_file
        .as_deref()
        .is_some_and(|f| f.ends_with("tra_vat_2025-01.csv")));

    let jan = &payload.result.monthly_summary[0];
    assert_eq!(jan.ledger_input_vat, dec("1700"));
    assert_eq!(jan.tra_input_vat, dec("1600"));
    assert_eq!(jan.input_difference, dec("100"));
    assert_eq!(jan.output_difference, dec("262.35"));
    assert_eq!(jan.net_vat_difference, dec("162.35"));
    assert_eq!(jan.vat_control_balance, dec("-462.35"));

    let categories: Vec<VatCategory> = payload
        .result
        .exception_register
        .iter()
        .map(|e| e.category)
        .collect();
    assert_eq!(
        categories,
        vec![
            VatCategory::TimingPostingPeriod,
            VatCategory::MissingDocuments,
            VatCategory::CreditNotesReversals,
            VatCategory::FxRounding,
        ]
    );
    assert!(payload.narrative.contains("No auto-posting performed"));

    for stem in [
        "vat_monthly_summary_2025-01_2025-01.json",
        "vat_monthly_summary_2025-01_2025-01.csv",
        "vat_monthly_summary_2025-01_2025-01.xlsx",
        "vat_exception_register_2025-01_2025-01.json",
        "vat_exception_register_2025-01_2025-01.csv",
        "vat_exception_register_2025-01_2025-01.xlsx",
        "vat_pack_report_2025-01_2025-01.html",
    ] {
        assert!(outputs.path().join(stem).exists(), "missing {stem}");
    }
}

#[tokio::test]
async fn test_vat_range_aggregates_absolute_differences() {
    let root = repo_root();
    let source = FixtureSource::new(root.join("fixtures"));
    let tra = TraImport::read(&root.join("fixtures/vat/tra_vat_2025-01.csv")).unwrap();

    let result = VatReconciliationEngine::new(&source, &tra)
        .reconcile(
            finance_close::validate_period("2025-01").unwrap(),
            finance_close::validate_period("2025-02").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(result.metrics.months, 2);
    assert_eq!(result.monthly_summary[1].net_vat_difference, BigDecimal::from(0));
    assert_eq!(result.metrics.aggregate_net_vat_difference_abs, dec("162.35"));
    assert_eq!(result.metrics.exception_count, 5);
    assert_eq!(
        result.exception_register.last().map(|e| e.category),
        Some(VatCategory::WrongTaxTags)
    );
}

#[tokio::test]
async fn test_vat_pack_rejects_bad_inputs() {
    let outputs = tempfile::tempdir().unwrap();
    let config = fixture_config(outputs.path());
    let source = FixtureSource::new(&config.paths.fixtures_dir);

    let reversed = commands::run_vat_pack(&config, &source, "2025-02", Some("2025-01"), None).await;
    assert!(matches!(reversed, Err(CloseError::Validation(ref m)) if m.contains("period_from")));

    let txt = outputs.path().join("tra.txt");
    std::fs::write(&txt, "period,input_vat,output_vat\n").unwrap();
    let unsupported = commands::run_vat_pack(&config, &source, "2025-01", None, Some(&txt)).await;
    assert!(matches!(unsupported, Err(CloseError::Validation(ref m)) if m.contains(".csv or .xlsx")));

    let partial = outputs.path().join("tra.csv");
    std::fs::write(&partial, "period,input_vat\n2025-01,10\n").unwrap();
    let missing = commands::run_vat_pack(&config, &source, "2025-01", None, Some(&partial)).await;
    assert!(
        matches!(missing, Err(CloseError::Validation(ref m)) if m.contains("period,input_vat,output_vat"))
    );
}

#[tokio::test]
async fn test_month_end_january_is_amber() {
    let outputs = tempfile::tempdir().unwrap();
    let config = fixture_config(outputs.path());
    let source = sources::connect(&config).await.unwrap();

    let payload = commands::run_month_end(&config, source.as_ref(), "2025-01", None)
        .await
        .unwrap();

    assert_eq!(payload.status, GatingStatus::Amber);
    assert!(payload.proceed);
    assert_eq!(payload.mode, "fixture-only");
    assert!(!payload.auto_posting);
    assert_eq!(payload.gating_inputs.unmatched_transactions, 3);
    assert_eq!(payload.gating_inputs.unexplained_amount, dec("50"));
    assert_eq!(payload.vat_controls_rollup.max_abs_net_vat_difference, dec("162.35"));
    assert_eq!(payload.vat_controls_rollup.exception_count, 4);
    assert_eq!(payload.override_count, 0);

    let written: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(outputs.path().join("month_end_2025-01.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written["status"], "AMBER");
    assert_eq!(written["proceed"], true);
    assert_eq!(written["thresholds"]["amber"]["max_unmatched_transactions"], 5);
    assert!(outputs.path().join("month_end_2025-01.html").exists());
    assert!(outputs.path().join("bank_recon_2025-01.json").exists());
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let outputs = tempfile::tempdir().unwrap();
    let config = fixture_config(outputs.path());
    let mut source = MemorySource::new();
    source.fail_with("timeout: ledger unreachable");

    let result = commands::run_month_end(&config, &source, "2025-01", None).await;
    assert!(matches!(result, Err(CloseError::Connection(ref m)) if m.contains("unreachable")));
    assert!(std::fs::read_dir(outputs.path()).unwrap().next().is_none());
}

#[test]
fn test_live_mode_requires_all_settings() {
    let result = CloseConfig::from_lookup(|key| match key {
        "FIXTURE_MODE" => Some("false".to_string()),
        "ODOO_URL" => Some("https://erp.example.com".to_string()),
        _ => None,
    });

    match result {
        Err(CloseError::Configuration(msg)) => {
            assert!(msg.contains("ODOO_DB"));
            assert!(msg.contains("ODOO_USER"));
            assert!(msg.contains("ODOO_PASSWORD"));
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn test_period_validation() {
    assert!(finance_close::validate_period("2025-01").is_ok());
    for bad in ["2025-13", "2025-00", "25-01", "2025-1", "2025/01", ""] {
        assert!(
            matches!(finance_close::validate_period(bad), Err(CloseError::Validation(_))),
            "{bad} should be rejected"
        );
    }
}
