//! Run configuration, assembled once and passed down explicitly

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::reconciliation::registry::BankRegistry;
use crate::rules::gating::GatingThresholds;
use crate::types::{CloseError, CloseResult};

const LIVE_KEYS: [&str; 4] = ["ODOO_URL", "ODOO_DB", "ODOO_USER", "ODOO_PASSWORD"];
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where ledger data is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// Static fixture files, no network
    Fixture,
    /// Live ledger over JSON-RPC
    Live(OdooSettings),
}

impl SourceMode {
    /// Label used in report payloads
    pub fn label(&self) -> &'static str {
        match self {
            SourceMode::Fixture => "fixture-only",
            SourceMode::Live(_) => "live-odoo",
        }
    }
}

/// Connection settings for the live ledger
#[derive(Clone, PartialEq, Eq)]
pub struct OdooSettings {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OdooSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdooSettings")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// File locations used by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSettings {
    pub fixtures_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub overrides_file: PathBuf,
    pub bank_registry_file: PathBuf,
    pub gating_thresholds_file: PathBuf,
}

impl PathSettings {
    /// Conventional layout under a base directory
    pub fn under(base: &Path) -> Self {
        let fixtures_dir = base.join("fixtures");
        Self {
            overrides_file: fixtures_dir.join("overrides").join("month_end_overrides.json"),
            fixtures_dir,
            outputs_dir: base.join("outputs"),
            bank_registry_file: base.join("rules").join("bank_registry.json"),
            gating_thresholds_file: base.join("rules").join("gating_thresholds.json"),
        }
    }
}

/// Immutable configuration for one process run
#[derive(Debug, Clone)]
pub struct CloseConfig {
    pub mode: SourceMode,
    pub paths: PathSettings,
    pub thresholds: GatingThresholds,
    pub bank_registry: BankRegistry,
}

impl CloseConfig {
    /// Build from the process environment, loading `.env` first if present
    pub fn from_env() -> CloseResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(file = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as absent
    pub fn from_lookup<F>(lookup: F) -> CloseResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = resolve_mode(&get)?;

        let fixtures_dir = PathBuf::from(get("FIXTURES_DIR").unwrap_or_else(|| "fixtures".into()));
        let paths = PathSettings {
            overrides_file: get("OVERRIDES_FILE").map(PathBuf::from).unwrap_or_else(|| {
                fixtures_dir.join("overrides").join("month_end_overrides.json")
            }),
            outputs_dir: PathBuf::from(get("OUTPUTS_DIR").unwrap_or_else(|| "outputs".into())),
            bank_registry_file: PathBuf::from(
                get("BANK_REGISTRY_FILE").unwrap_or_else(|| "rules/bank_registry.json".into()),
            ),
            gating_thresholds_file: PathBuf::from(
                get("GATING_THRESHOLDS_FILE")
                    .unwrap_or_else(|| "rules/gating_thresholds.json".into()),
            ),
            fixtures_dir,
        };

        Self::with_paths(mode, paths)
    }

    /// Assemble from explicit parts, loading thresholds and registry files
    pub fn with_paths(mode: SourceMode, paths: PathSettings) -> CloseResult<Self> {
        let thresholds = GatingThresholds::load(&paths.gating_thresholds_file)?;
        let bank_registry = BankRegistry::load(&paths.bank_registry_file)?;
        Ok(Self {
            mode,
            paths,
            thresholds,
            bank_registry,
        })
    }

    pub fn is_fixture_mode(&self) -> bool {
        matches!(self.mode, SourceMode::Fixture)
    }
}

fn resolve_mode<G>(get: &G) -> CloseResult<SourceMode>
where
    G: Fn(&str) -> Option<String>,
{
    let fixture_mode = get("FIXTURE_MODE")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(true);
    if fixture_mode {
        return Ok(SourceMode::Fixture);
    }

    let missing: Vec<&str> = LIVE_KEYS
        .iter()
        .copied()
        .filter(|key| get(key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CloseError::Configuration(format!(
            "live mode requires settings: missing {}",
            missing.join(", ")
        )));
    }

    let timeout_secs = match get("ODOO_TIMEOUT_SECS") {
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            CloseError::Configuration(format!("ODOO_TIMEOUT_SECS {raw:?}: {e}"))
        })?,
        None => DEFAULT_TIMEOUT_SECS,
    };

    Ok(SourceMode::Live(OdooSettings {
        url: get("ODOO_URL").unwrap_or_default(),
        database: get("ODOO_DB").unwrap_or_default(),
        username: get("ODOO_USER").unwrap_or_default(),
        password: get("ODOO_PASSWORD").unwrap_or_default(),
        timeout: Duration::from_secs(timeout_secs),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_fixture_mode_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.json");
        let thresholds = dir.path().join("thresholds.json");
        let config = CloseConfig::from_lookup(lookup(&[
            ("BANK_REGISTRY_FILE", registry.to_str().unwrap()),
            ("GATING_THRESHOLDS_FILE", thresholds.to_str().unwrap()),
        ]))
        .unwrap();

        assert!(config.is_fixture_mode());
        assert_eq!(config.mode.label(), "fixture-only");
        assert_eq!(config.paths.fixtures_dir, PathBuf::from("fixtures"));
        assert_eq!(
            config.paths.overrides_file,
            PathBuf::from("fixtures/overrides/month_end_overrides.json")
        );
        assert_eq!(config.thresholds, GatingThresholds::default());
    }

    #[test]
    fn test_fixture_mode_flag_values() {
        for (value, fixture) in [("TRUE", true), ("yes", true), ("1", true), ("false", false), ("0", false)] {
            let mode = resolve_mode(&lookup(&[
                ("FIXTURE_MODE", value),
                ("ODOO_URL", "https://erp.example.com"),
                ("ODOO_DB", "prod"),
                ("ODOO_USER", "finance"),
                ("ODOO_PASSWORD", "secret"),
            ]))
            .unwrap();
            assert_eq!(matches!(mode, SourceMode::Fixture), fixture, "FIXTURE_MODE={value}");
        }
    }

    #[test]
    fn test_live_mode_lists_missing_keys() {
        let err = resolve_mode(&lookup(&[
            ("FIXTURE_MODE", "false"),
            ("ODOO_URL", "https://erp.example.com"),
            ("ODOO_USER", "  "),
        ]))
        .unwrap_err();

        match err {
            CloseError::Configuration(msg) => {
                assert!(msg.contains("ODOO_DB, ODOO_USER, ODOO_PASSWORD"), "{msg}");
                assert!(!msg.contains("ODOO_URL"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_live_mode_settings() {
        let mode = resolve_mode(&lookup(&[
            ("FIXTURE_MODE", "no"),
            ("ODOO_URL", "https://erp.example.com"),
            ("ODOO_DB", "prod"),
            ("ODOO_USER", "finance"),
            ("ODOO_PASSWORD", "secret"),
            ("ODOO_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        let SourceMode::Live(settings) = mode else {
            panic!("expected live mode");
        };
        assert_eq!(settings.database, "prod");
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert!(!format!("{settings:?}").contains("secret"));
    }

    #[test]
    fn test_invalid_thresholds_fail_config() {
        let dir = tempfile::tempdir().unwrap();
        let thresholds = dir.path().join("thresholds.json");
        std::fs::write(
            &thresholds,
            r#"{"green": {"max_unmatched_transactions": 9, "max_unexplained_amount": 0, "max_vat_monthly_difference": 0},
                "amber": {"max_unmatched_transactions": 5, "max_unexplained_amount": 1000, "max_vat_monthly_difference": 250}}"#,
        )
        .unwrap();

        let mut paths = PathSettings::under(dir.path());
        paths.gating_thresholds_file = thresholds;
        let result = CloseConfig::with_paths(SourceMode::Fixture, paths);
        assert!(matches!(result, Err(CloseError::Configuration(_))));
    }
}
