//! Month-end gating rules and the override registry

pub mod gating;
pub mod overrides;

pub use gating::*;
pub use overrides::*;
