//! Loading scenario documents and their `metadata.test` configuration.

use crate::engine::{MapDebugOptions, MapMode};
use crate::error::{RenderTestError, RenderTestResult};
use crate::localize::ReferenceResolver;
use crate::metadata::TestMetadata;
use log::{error, warn};
use serde_json::{Map as JsonMap, Value};
use std::fs;
use std::path::Path;

/// Test features the harness cannot emulate. A scenario using any of them is
/// rejected instead of producing a misleading result.
const UNSUPPORTED_FEATURES: [&str; 2] = ["fadeDuration", "addFakeCanvas"];

/// Reads and parses a JSON file, logging the location of any parse error.
pub fn read_json(path: &Path) -> RenderTestResult<Value> {
    let text = fs::read_to_string(path).map_err(|err| {
        error!("Unable to open file {}", path.display());
        RenderTestError::io(path, err)
    })?;

    serde_json::from_str(&text).map_err(|err| {
        let err = RenderTestError::JsonParse {
            path: path.to_path_buf(),
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        };
        error!("{err}");
        err
    })
}

/// Loads the scenario at `path`.
///
/// Resource URLs are localized before the configuration is read, so operation
/// payloads see local references as well. A document without `metadata.test`
/// is still runnable with defaults.
pub fn parse_test_metadata(
    path: &Path,
    resolver: &ReferenceResolver,
) -> RenderTestResult<TestMetadata> {
    let mut document = read_json(path).inspect_err(|_| {
        error!("Unable to parse: {}", path.display());
    })?;
    resolver.localize_style_urls(&mut document);

    let mut metadata = TestMetadata::new(path, Value::Null);

    match document.get("metadata").map(|value| value.get("test")) {
        None => warn!("Style has no 'metadata': {}", path.display()),
        Some(None) => warn!("Style has no 'metadata.test': {}", path.display()),
        Some(Some(test)) => {
            let Some(test) = test.as_object() else {
                return Err(invalid(path, "'metadata.test' must be an object"));
            };
            apply_test_config(&mut metadata, &TestConfig { path, test })?;
        }
    }

    metadata.document = document;
    Ok(metadata)
}

fn apply_test_config(metadata: &mut TestMetadata, config: &TestConfig) -> RenderTestResult<()> {
    for feature in UNSUPPORTED_FEATURES {
        if config.test.contains_key(feature) {
            error!(
                "Unsupported test feature '{feature}': {}",
                config.path.display()
            );
            return Err(RenderTestError::UnsupportedFeature {
                path: config.path.to_path_buf(),
                feature: feature.to_string(),
            });
        }
    }

    if let Some(width) = config.dimension("width")? {
        metadata.size.width = width;
    }

    if let Some(height) = config.dimension("height")? {
        metadata.size.height = height;
    }

    if let Some(pixel_ratio) = config.number("pixelRatio")? {
        if pixel_ratio <= 0.0 {
            return Err(invalid(config.path, "'pixelRatio' must be positive"));
        }
        metadata.pixel_ratio = pixel_ratio as f32;
    }

    if let Some(allowed) = config.number("allowed")? {
        if allowed < 0.0 {
            return Err(invalid(config.path, "'allowed' must not be negative"));
        }
        metadata.allowed = allowed;
    }

    if let Some(description) = config.string("description")? {
        metadata.description = description.to_string();
    }

    if let Some(map_mode) = config.string("mapMode")? {
        metadata.map_mode = MapMode::from_name(map_mode);
    }

    // Debug switches act on presence, whatever their value.
    if config.test.contains_key("debug") {
        metadata.debug |= MapDebugOptions::TILE_BORDERS;
    }

    if config.test.contains_key("collisionDebug") {
        metadata.debug |= MapDebugOptions::COLLISION;
    }

    if config.test.contains_key("showOverdrawInspector") {
        metadata.debug |= MapDebugOptions::OVERDRAW;
    }

    if let Some(cross_source_collisions) = config.boolean("crossSourceCollisions")? {
        metadata.cross_source_collisions = cross_source_collisions;
    }

    if let Some(axonometric) = config.boolean("axonometric")? {
        metadata.axonometric = axonometric;
    }

    if let Some(skew) = config.test.get("skew") {
        let pair = skew
            .as_array()
            .filter(|values| values.len() == 2)
            .and_then(|values| Some((values[0].as_f64()?, values[1].as_f64()?)));
        let Some((x_skew, y_skew)) = pair else {
            return Err(invalid(config.path, "'skew' must be an array of two numbers"));
        };
        metadata.x_skew = x_skew;
        metadata.y_skew = y_skew;
    }

    // `operations` stays in the document; replay consumes it.
    Ok(())
}

struct TestConfig<'a> {
    path: &'a Path,
    test: &'a JsonMap<String, Value>,
}

impl TestConfig<'_> {
    fn number(&self, key: &str) -> RenderTestResult<Option<f64>> {
        match self.test.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid(self.path, format!("'{key}' must be a number"))),
        }
    }

    fn dimension(&self, key: &str) -> RenderTestResult<Option<u32>> {
        match self.test.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .map(Some)
                .ok_or_else(|| invalid(self.path, format!("'{key}' must be a positive integer"))),
        }
    }

    fn boolean(&self, key: &str) -> RenderTestResult<Option<bool>> {
        match self.test.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| invalid(self.path, format!("'{key}' must be a boolean"))),
        }
    }

    fn string(&self, key: &str) -> RenderTestResult<Option<&str>> {
        match self.test.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| invalid(self.path, format!("'{key}' must be a string"))),
        }
    }
}

fn invalid(path: &Path, message: impl Into<String>) -> RenderTestError {
    let err = RenderTestError::InvalidMetadata {
        path: path.to_path_buf(),
        message: message.into(),
    };
    error!("{err}");
    err
}
