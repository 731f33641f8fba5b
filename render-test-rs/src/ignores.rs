//! Known-failing scenarios.
//!
//! The ignore list is a JSON object mapping a scenario identifier such as
//! `render-tests/regressions/mapbox-gl-js#5631` to a free-form reason. A reason
//! starting with `skip` keeps the scenario from running at all; any other
//! reason runs it and reports the result as ignored.

use crate::error::{RenderTestError, RenderTestResult};
use crate::parser::read_json;
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreEntry {
    pub identifier: String,
    pub reason: String,
}

impl IgnoreEntry {
    /// Whether the scenario must not be executed.
    pub fn is_skip(&self) -> bool {
        self.reason.starts_with("skip")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ignores {
    entries: BTreeMap<String, String>,
}

impl Ignores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an ignore list. A missing file yields an empty list.
    pub fn from_path(path: &Path) -> RenderTestResult<Self> {
        if !path.exists() {
            warn!("No ignore list at {}", path.display());
            return Ok(Self::new());
        }
        Self::from_value(path, &read_json(path)?)
    }

    pub fn from_value(path: &Path, value: &Value) -> RenderTestResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(RenderTestError::InvalidMetadata {
                path: path.to_path_buf(),
                message: "ignore list must be a JSON object".to_string(),
            });
        };

        let mut ignores = Self::new();
        for (identifier, reason) in object {
            match reason.as_str() {
                Some(reason) => ignores.insert(identifier.clone(), reason),
                None => warn!("Ignoring non-string reason for {identifier}"),
            }
        }
        Ok(ignores)
    }

    pub fn insert(&mut self, identifier: impl Into<String>, reason: impl Into<String>) {
        self.entries.insert(identifier.into(), reason.into());
    }

    pub fn get(&self, identifier: &str) -> Option<IgnoreEntry> {
        self.entries
            .get_key_value(identifier)
            .map(|(identifier, reason)| IgnoreEntry {
                identifier: identifier.clone(),
                reason: reason.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
