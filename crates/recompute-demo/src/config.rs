//! Demo session configuration

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Settings for one simulated editing session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Label of the simulated operation
    pub label: String,
    /// Simulated backend latency per call, in milliseconds
    pub latency_ms: u64,
    /// Number of parameter edits the simulated user makes
    pub edits: usize,
    /// Delay between edits, in milliseconds
    pub interval_ms: u64,
    /// Distance added by each edit
    pub step: f64,
    /// Distances above this are rejected by the backend
    pub max_distance: f64,
    /// Parameters subject to revert
    pub tracked: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            label: "extrude".to_string(),
            latency_ms: 40,
            edits: 12,
            interval_ms: 10,
            step: 0.5,
            max_distance: 4.0,
            tracked: vec!["distance".to_string()],
        }
    }
}

impl DemoConfig {
    /// Load a config file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
