//! Per-scenario test configuration.

use crate::cache::RendererKey;
use crate::engine::{MapDebugOptions, MapMode, MapOptions, ProjectionMode, Size};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Default tolerated fraction of differing pixels.
pub const DEFAULT_ALLOWED_DIFFERENCE: f64 = 0.00015;

/// Everything the harness knows about one scenario.
///
/// Created by [`crate::parser::parse_test_metadata`]. Only `document` changes
/// after loading: the resolver localizes it and operation replay drains
/// `metadata.test.operations` from it.
#[derive(Debug, Clone)]
pub struct TestMetadata {
    /// Path of the scenario's `style.json`.
    pub path: PathBuf,
    pub document: Value,

    pub size: Size,
    pub pixel_ratio: f32,
    /// Largest difference ratio that still counts as a pass.
    pub allowed: f64,
    pub description: String,
    pub map_mode: MapMode,
    pub debug: MapDebugOptions,
    pub cross_source_collisions: bool,
    pub axonometric: bool,
    pub x_skew: f64,
    pub y_skew: f64,
}

impl TestMetadata {
    pub fn new(path: impl Into<PathBuf>, document: Value) -> Self {
        Self {
            path: path.into(),
            document,
            size: Size::default(),
            pixel_ratio: 1.0,
            allowed: DEFAULT_ALLOWED_DIFFERENCE,
            description: String::new(),
            map_mode: MapMode::Static,
            debug: MapDebugOptions::NO_DEBUG,
            cross_source_collisions: true,
            axonometric: false,
            x_skew: 0.0,
            y_skew: 1.0,
        }
    }

    /// Directory holding the scenario's golden image and artifacts.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn renderer_key(&self) -> RendererKey {
        RendererKey::new(self.map_mode, self.pixel_ratio, self.cross_source_collisions)
    }

    pub fn map_options(&self) -> MapOptions {
        MapOptions {
            map_mode: self.map_mode,
            size: self.size,
            pixel_ratio: self.pixel_ratio,
            cross_source_collisions: self.cross_source_collisions,
        }
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        ProjectionMode {
            axonometric: self.axonometric,
            x_skew: self.x_skew,
            y_skew: self.y_skew,
        }
    }

    /// The `metadata.test` object, if the document has one.
    pub fn test_value(&self) -> Option<&Value> {
        self.document.get("metadata")?.get("test")
    }

    /// Number of scripted operations not yet replayed.
    pub fn pending_operations(&self) -> usize {
        self.test_value()
            .and_then(|test| test.get("operations"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}
