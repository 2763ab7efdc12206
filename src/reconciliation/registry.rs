//! Bank profile registry
//!
//! Resolution is layered: the journal name is first mapped through the
//! alias table, the resulting key is looked up in the per-key profiles,
//! and anything left over gets a profile synthesized from the journal
//! itself (optionally seeded by `default_profile`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{BankProfile, CloseError, CloseResult};

/// Partial profile as written in the registry file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub code: Option<String>,
    pub display_name: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankRegistry {
    #[serde(default)]
    pub default_profile: ProfileEntry,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileEntry>,
    /// Journal name to profile key
    #[serde(default)]
    pub journal_name_map: HashMap<String, String>,
}

impl BankRegistry {
    /// Load the registry; a missing file yields an empty registry
    pub fn load(path: &Path) -> CloseResult<Self> {
        if !path.exists() {
            tracing::debug!(file = %path.display(), "no bank registry, using synthesized profiles");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            CloseError::Configuration(format!("bank registry {}: {e}", path.display()))
        })
    }

    /// Resolve the canonical profile of a journal
    pub fn resolve(&self, journal_name: &str, journal_currency: &str) -> BankProfile {
        let key = self
            .journal_name_map
            .get(journal_name)
            .map(String::as_str)
            .unwrap_or(journal_name);

        if let Some(candidate) = self.profiles.get(key) {
            return BankProfile {
                code: candidate.code.clone().unwrap_or_else(|| slug(key)),
                display_name: candidate
                    .display_name
                    .clone()
                    .unwrap_or_else(|| key.to_string()),
                currency: candidate
                    .currency
                    .clone()
                    .unwrap_or_else(|| journal_currency.to_string()),
            };
        }

        let currency = if journal_currency.is_empty() {
            self.default_profile.currency.clone().unwrap_or_default()
        } else {
            journal_currency.to_string()
        };

        BankProfile {
            code: self
                .default_profile
                .code
                .clone()
                .unwrap_or_else(|| format!("journal_{}", slug(journal_name))),
            display_name: journal_name.to_string(),
            currency,
        }
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}
