//! Source adapters and selection by run mode

pub mod fixtures;
pub mod odoo;

pub use fixtures::FixtureSource;
pub use odoo::{OdooClient, OdooSource, RpcFailure};

use crate::config::{CloseConfig, SourceMode};
use crate::traits::SourceAdapter;
use crate::types::CloseResult;

/// Build the adapter the configuration asks for
pub async fn connect(config: &CloseConfig) -> CloseResult<Box<dyn SourceAdapter>> {
    match &config.mode {
        SourceMode::Fixture => {
            tracing::debug!(dir = %config.paths.fixtures_dir.display(), "using fixture source");
            Ok(Box::new(FixtureSource::new(&config.paths.fixtures_dir)))
        }
        SourceMode::Live(settings) => Ok(Box::new(OdooSource::connect(settings.clone()).await?)),
    }
}
