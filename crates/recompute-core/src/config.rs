//! Engine configuration
//!
//! An engine type declares its label (used in logs) and the parameters it
//! tracks for snapshot/revert. Commands usually build this in code, but it
//! can also be loaded from a TOML table:
//!
//! ```toml
//! label = "extrude"
//! tracked_keys = ["distance", "direction"]
//!
//! [parameters]
//! distance = 10.0
//! direction = [0.0, 0.0, 1.0]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::params::{Parameters, TrackedKeys};

/// Configuration for a [`RecomputeEngine`](crate::RecomputeEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Label used in log fields and observer callbacks
    pub label: String,

    /// Parameters subject to snapshot and revert
    pub tracked_keys: TrackedKeys,

    /// Initial parameter values
    pub parameters: Parameters,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: "engine".to_string(),
            tracked_keys: TrackedKeys::default(),
            parameters: Parameters::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config with a label and no parameters.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Builder-style: add an initial parameter value.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<crate::ParamValue>,
    ) -> Self {
        self.parameters.set(name, value);
        self
    }

    /// Builder-style: add an initial parameter value and track it.
    pub fn with_tracked(
        mut self,
        name: impl Into<String>,
        value: impl Into<crate::ParamValue>,
    ) -> Self {
        let name = name.into();
        self.parameters.set(name.clone(), value);
        let mut keys: Vec<String> = self.tracked_keys.into();
        keys.push(name);
        self.tracked_keys = TrackedKeys::new(keys);
        self
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Check that every tracked key names a parameter.
    pub fn validate(&self) -> Result<()> {
        match self.tracked_keys.first_missing(&self.parameters) {
            Some(missing) => Err(EngineError::UnknownTrackedKey(missing.to_string())),
            None => Ok(()),
        }
    }
}
