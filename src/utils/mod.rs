//! Utility modules

pub mod memory_source;
pub mod money;

pub use memory_source::*;
pub use money::*;
