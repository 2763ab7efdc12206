//! # Finance Close
//!
//! Month-end close support for a finance operations team: draft bank and VAT
//! reconciliation packs plus a RED/AMBER/GREEN gate that decides whether the
//! close may proceed. Nothing is ever posted back to the ledger.
//!
//! ## Features
//!
//! - **Bank tie-out**: per-journal reconciled share, ageing of open lines and statement vs ledger difference
//! - **VAT reconciliation**: monthly ledger VAT against the TRA extract, with a categorized exception register
//! - **Close gating**: configurable thresholds and an override registry for RED periods
//! - **Source abstraction**: fixture files or a live ledger behind one trait
//! - **Reports**: JSON, CSV, XLSX and HTML artifacts per run
//!
//! ## Quick Start
//!
//! ```rust
//! use finance_close::{evaluate, GatingInputs, GatingStatus, GatingThresholds};
//! use bigdecimal::BigDecimal;
//!
//! let inputs = GatingInputs::new(1, BigDecimal::from(0), vec![]);
//! assert_eq!(evaluate(&inputs, &GatingThresholds::default()), GatingStatus::Amber);
//! ```

pub mod commands;
pub mod config;
pub mod logging;
pub mod period;
pub mod reconciliation;
pub mod reports;
pub mod rules;
pub mod sources;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{CloseConfig, SourceMode};
pub use period::{iter_periods, validate_period, Period};
pub use reconciliation::{BankReconciliationEngine, BankRegistry, VatReconciliationEngine};
pub use rules::*;
pub use tax::{TaxType, TraImport, VatCategory};
pub use traits::*;
pub use types::*;
