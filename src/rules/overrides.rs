//! Registry of manual approvals that let a RED close proceed

use serde_json::Value;
use std::path::Path;

/// Approval records loaded from a JSON array; content is not inspected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideRegistry {
    records: Vec<Value>,
}

impl OverrideRegistry {
    pub fn from_records(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Load the registry, treating a missing or unreadable file as empty
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "override registry unreadable, treating as empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(records)) => Self { records },
            Ok(_) => {
                tracing::warn!(file = %path.display(), "override registry is not a JSON array, treating as empty");
                Self::default()
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "override registry malformed, treating as empty");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }
}
