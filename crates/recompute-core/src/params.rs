/*
 * params.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Named parameters, tracked keys and snapshots.
 */

//! Parameter storage for a recompute engine.
//!
//! The engine treats values opaquely: it only clones them into snapshots
//! and writes them back on revert. [`Parameters`] keeps insertion order so
//! backends and logs see parameters in the order the command declared them.

use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean toggle
    Bool(bool),
    /// Whole number (counts, segment numbers)
    Integer(i64),
    /// Real number (distances, angles)
    Number(f64),
    /// Fixed-size vector (directions, points)
    Vector(Vec<f64>),
    /// Free text
    Text(String),
    /// Member of a closed set, e.g. a boolean operation kind.
    /// Deserializes as `Text`; commands construct it explicitly.
    Choice(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Integer(_) => "integer",
            ParamValue::Number(_) => "number",
            ParamValue::Vector(_) => "vector",
            ParamValue::Text(_) => "text",
            ParamValue::Choice(_) => "choice",
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ParamValue::Text(s) => write!(f, "{:?}", s),
            ParamValue::Choice(c) => write!(f, "{}", c),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(value: Vec<f64>) -> Self {
        ParamValue::Vector(value)
    }
}

impl From<[f64; 3]> for ParamValue {
    fn from(value: [f64; 3]) -> Self {
        ParamValue::Vector(value.to_vec())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Insertion-ordered mapping from parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: LinkedHashMap<String, ParamValue>,
}

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or overwrite a value. Existing names keep their position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.get_mut(&name) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(name, value);
            }
        }
    }

    /// Look up a value.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Whether the name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Capture the tracked subset of the parameters.
    ///
    /// Names missing from the parameters are skipped; the engine rejects
    /// such keys at construction so this only happens for hand-built sets.
    pub fn snapshot(&self, keys: &TrackedKeys) -> Snapshot {
        let mut values = LinkedHashMap::new();
        for key in keys.iter() {
            if let Some(value) = self.values.get(key) {
                values.insert(key.to_string(), value.clone());
            }
        }
        Snapshot { values }
    }

    /// Write a snapshot back. Returns the names whose value changed.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, value) in snapshot.values.iter() {
            if self.values.get(name) != Some(value) {
                changed.push(name.clone());
                self.set(name.clone(), value.clone());
            }
        }
        changed
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for (name, value) in iter {
            params.set(name, value);
        }
        params
    }
}

/// The ordered, duplicate-free set of parameter names subject to
/// snapshot and revert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TrackedKeys {
    keys: Vec<String>,
}

impl TrackedKeys {
    /// Build from names, dropping duplicates while keeping first occurrence.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !keys.contains(&name) {
                keys.push(name);
            }
        }
        Self { keys }
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Whether the name is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k == name)
    }

    /// Number of tracked names.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First tracked name that is not present on `params`.
    pub fn first_missing(&self, params: &Parameters) -> Option<&str> {
        self.iter().find(|key| !params.contains(key))
    }
}

impl From<Vec<String>> for TrackedKeys {
    fn from(keys: Vec<String>) -> Self {
        TrackedKeys::new(keys)
    }
}

impl From<TrackedKeys> for Vec<String> {
    fn from(keys: TrackedKeys) -> Self {
        keys.keys
    }
}

/// Tracked parameter values captured at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: LinkedHashMap<String, ParamValue>,
}

impl Snapshot {
    /// Look up a captured value.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Number of captured values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
