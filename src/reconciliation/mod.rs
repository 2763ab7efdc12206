//! Reconciliation engines for bank statements and VAT
//!
//! Both engines depend only on [`crate::traits::SourceAdapter`] and run one
//! journal or month at a time in a fixed order, so results are deterministic
//! for a given source snapshot.

pub mod bank;
pub mod registry;
pub mod vat;

pub use bank::*;
pub use registry::*;
pub use vat::*;
