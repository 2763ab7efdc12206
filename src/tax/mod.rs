//! Tax handling: VAT line classification and the TRA extract import

pub mod tra;
pub mod vat;

pub use tra::*;
pub use vat::*;
