//! Replay of scripted style mutations (`metadata.test.operations`).
//!
//! Operations are taken from the front of the list one at a time. Each one is
//! removed from the document before it is applied, so the list always holds
//! exactly the operations that have not run yet. A bad operation is logged and
//! dropped; replay carries on with the next one.

use crate::engine::{
    CameraOptions, HeadlessFrontend, LatLng, Map, MapInstance, Style, StyleImage, StyleLayer,
};
use crate::error::OperationError;
use crate::localize::ReferenceResolver;
use crate::metadata::TestMetadata;
use crate::parser::read_json;
use log::{debug, error};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

/// Duration of a `sleep` operation without an explicit argument.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOperation {
    pub name: String,
    /// Path relative to the integration suite directory.
    pub path: String,
    pub pixel_ratio: f32,
    pub sdf: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub layer: String,
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Render one frame and discard it, flushing pending work.
    Wait,
    /// Pump the event loop for the given duration.
    Sleep(Duration),
    AddImage(ImageOperation),
    UpdateImage(ImageOperation),
    RemoveImage(String),
    /// A style URL/path or an inline style object.
    SetStyle(Value),
    SetCenter(LatLng),
    SetZoom(f64),
    SetBearing(f64),
    SetFilter {
        layer: String,
        filter: Value,
    },
    SetLayerZoomRange {
        layer: String,
        min_zoom: f32,
        max_zoom: f32,
    },
    SetLight(Value),
    AddLayer(Value),
    RemoveLayer(String),
    AddSource {
        id: String,
        source: Value,
    },
    RemoveSource(String),
    SetPaintProperty(PropertyChange),
    SetLayoutProperty(PropertyChange),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Wait => "wait",
            Operation::Sleep(_) => "sleep",
            Operation::AddImage(_) => "addImage",
            Operation::UpdateImage(_) => "updateImage",
            Operation::RemoveImage(_) => "removeImage",
            Operation::SetStyle(_) => "setStyle",
            Operation::SetCenter(_) => "setCenter",
            Operation::SetZoom(_) => "setZoom",
            Operation::SetBearing(_) => "setBearing",
            Operation::SetFilter { .. } => "setFilter",
            Operation::SetLayerZoomRange { .. } => "setLayerZoomRange",
            Operation::SetLight(_) => "setLight",
            Operation::AddLayer(_) => "addLayer",
            Operation::RemoveLayer(_) => "removeLayer",
            Operation::AddSource { .. } => "addSource",
            Operation::RemoveSource(_) => "removeSource",
            Operation::SetPaintProperty(_) => "setPaintProperty",
            Operation::SetLayoutProperty(_) => "setLayoutProperty",
        }
    }

    /// Parses a `[name, arg1, arg2, ...]` array.
    pub fn parse(value: Value) -> Result<Self, OperationError> {
        let values = match value {
            Value::Array(values) => values,
            other => {
                return Err(OperationError::Malformed(format!(
                    "expected an array, got {other}"
                )))
            }
        };
        let mut values = values.into_iter();
        let name = match values.next() {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(OperationError::Malformed(format!(
                    "operation name must be a string, got {other}"
                )))
            }
            None => return Err(OperationError::Malformed("empty operation".to_string())),
        };
        let mut args = Arguments {
            operation: &name,
            values,
        };

        let operation = match name.as_str() {
            "wait" => Operation::Wait,
            "sleep" => Operation::Sleep(match args.optional() {
                Some(value) => Duration::from_millis(args.expect_u64(value, "duration")?),
                None => DEFAULT_SLEEP,
            }),
            "addImage" => Operation::AddImage(args.image()?),
            "updateImage" => Operation::UpdateImage(args.image()?),
            "removeImage" => Operation::RemoveImage(args.string("image name")?),
            "setStyle" => match args.value("style")? {
                style @ (Value::String(_) | Value::Object(_)) => Operation::SetStyle(style),
                _ => return Err(args.invalid("style must be a URL or an object")),
            },
            "setCenter" => Operation::SetCenter(args.center()?),
            "setZoom" => Operation::SetZoom(args.number("zoom")?),
            "setBearing" => Operation::SetBearing(args.number("bearing")?),
            "setFilter" => Operation::SetFilter {
                layer: args.string("layer")?,
                filter: args.value("filter")?,
            },
            "setLayerZoomRange" => Operation::SetLayerZoomRange {
                layer: args.string("layer")?,
                min_zoom: args.number("min zoom")? as f32,
                max_zoom: args.number("max zoom")? as f32,
            },
            "setLight" => Operation::SetLight(args.object("light")?),
            "addLayer" => Operation::AddLayer(args.object("layer")?),
            "removeLayer" => Operation::RemoveLayer(args.string("layer")?),
            "addSource" => Operation::AddSource {
                id: args.string("source id")?,
                source: args.object("source")?,
            },
            "removeSource" => Operation::RemoveSource(args.string("source id")?),
            "setPaintProperty" => Operation::SetPaintProperty(args.property_change()?),
            "setLayoutProperty" => Operation::SetLayoutProperty(args.property_change()?),
            _ => return Err(OperationError::Unsupported(name.clone())),
        };
        Ok(operation)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::SetFilter { layer, .. }
            | Operation::SetLayerZoomRange { layer, .. }
            | Operation::SetPaintProperty(PropertyChange { layer, .. })
            | Operation::SetLayoutProperty(PropertyChange { layer, .. }) => {
                write!(f, "{} {layer}", self.name())
            }
            Operation::AddImage(image) | Operation::UpdateImage(image) => {
                write!(f, "{} {}", self.name(), image.name)
            }
            Operation::RemoveImage(id)
            | Operation::RemoveLayer(id)
            | Operation::RemoveSource(id)
            | Operation::AddSource { id, .. } => write!(f, "{} {id}", self.name()),
            _ => write!(f, "{}", self.name()),
        }
    }
}

struct Arguments<'a> {
    operation: &'a str,
    values: std::vec::IntoIter<Value>,
}

impl Arguments<'_> {
    fn invalid(&self, message: impl Into<String>) -> OperationError {
        OperationError::InvalidArguments {
            operation: self.operation.to_string(),
            message: message.into(),
        }
    }

    fn optional(&mut self) -> Option<Value> {
        self.values.next()
    }

    fn value(&mut self, what: &str) -> Result<Value, OperationError> {
        self.values
            .next()
            .ok_or_else(|| self.invalid(format!("missing {what}")))
    }

    fn string(&mut self, what: &str) -> Result<String, OperationError> {
        match self.value(what)? {
            Value::String(value) => Ok(value),
            other => Err(self.invalid(format!("{what} must be a string, got {other}"))),
        }
    }

    fn number(&mut self, what: &str) -> Result<f64, OperationError> {
        let value = self.value(what)?;
        value
            .as_f64()
            .ok_or_else(|| self.invalid(format!("{what} must be a number, got {value}")))
    }

    fn object(&mut self, what: &str) -> Result<Value, OperationError> {
        match self.value(what)? {
            value @ Value::Object(_) => Ok(value),
            other => Err(self.invalid(format!("{what} must be an object, got {other}"))),
        }
    }

    fn expect_u64(&self, value: Value, what: &str) -> Result<u64, OperationError> {
        value
            .as_u64()
            .ok_or_else(|| self.invalid(format!("{what} must be a non-negative integer")))
    }

    fn center(&mut self) -> Result<LatLng, OperationError> {
        let value = self.value("center")?;
        let coordinates = value
            .as_array()
            .filter(|values| values.len() == 2)
            .and_then(|values| Some((values[0].as_f64()?, values[1].as_f64()?)));
        match coordinates {
            Some((longitude, latitude)) => Ok(LatLng::new(latitude, longitude)),
            None => Err(self.invalid(format!("center must be [lng, lat], got {value}"))),
        }
    }

    fn image(&mut self) -> Result<ImageOperation, OperationError> {
        let name = strip_quotes(&self.string("image name")?);
        let path = strip_quotes(&self.string("image path")?);
        let mut image = ImageOperation {
            name,
            path,
            pixel_ratio: 1.0,
            sdf: false,
        };

        if let Some(options) = self.optional() {
            let Value::Object(options) = options else {
                return Err(self.invalid("image options must be an object"));
            };
            if let Some(pixel_ratio) = options.get("pixelRatio") {
                image.pixel_ratio = pixel_ratio
                    .as_f64()
                    .ok_or_else(|| self.invalid("pixelRatio must be a number"))?
                    as f32;
            }
            if let Some(sdf) = options.get("sdf") {
                image.sdf = sdf
                    .as_bool()
                    .ok_or_else(|| self.invalid("sdf must be a boolean"))?;
            }
        }
        Ok(image)
    }

    fn property_change(&mut self) -> Result<PropertyChange, OperationError> {
        Ok(PropertyChange {
            layer: self.string("layer")?,
            name: self.string("property name")?,
            value: self.value("property value")?,
        })
    }
}

fn strip_quotes(value: &str) -> String {
    value.chars().filter(|c| *c != '"').collect()
}

/// Removes and returns the first pending operation of a scenario document.
pub fn take_next_operation(document: &mut Value) -> Option<Value> {
    let operations = document
        .get_mut("metadata")?
        .get_mut("test")?
        .get_mut("operations")?
        .as_array_mut()?;
    if operations.is_empty() {
        None
    } else {
        Some(operations.remove(0))
    }
}

/// Counts of a finished replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub failed: usize,
}

/// Applies a scenario's operations to a live renderer instance.
pub struct OperationInterpreter<'a, F: HeadlessFrontend> {
    instance: &'a mut MapInstance<F>,
    resolver: &'a ReferenceResolver,
}

impl<'a, F: HeadlessFrontend> OperationInterpreter<'a, F> {
    pub fn new(instance: &'a mut MapInstance<F>, resolver: &'a ReferenceResolver) -> Self {
        Self { instance, resolver }
    }

    /// Replays every pending operation of `metadata`, in order.
    pub fn run(&mut self, metadata: &mut TestMetadata) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        while let Some(result) = self.step(metadata) {
            match result {
                Ok(()) => summary.applied += 1,
                Err(err) => {
                    error!("{}: {err}", metadata.path.display());
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Removes the first pending operation and applies it. Returns `None` once
    /// the list is empty.
    pub fn step(&mut self, metadata: &mut TestMetadata) -> Option<Result<(), OperationError>> {
        let value = take_next_operation(&mut metadata.document)?;
        Some(Operation::parse(value).and_then(|operation| {
            debug!("{}: {operation}", metadata.path.display());
            self.apply(operation)
        }))
    }

    pub fn apply(&mut self, operation: Operation) -> Result<(), OperationError> {
        match operation {
            Operation::Wait => {
                self.instance.render()?;
            }
            Operation::Sleep(duration) => self.sleep(duration),
            Operation::AddImage(image) | Operation::UpdateImage(image) => {
                let image = self.load_image(image)?;
                self.instance.map.style_mut().add_image(image);
            }
            Operation::RemoveImage(id) => self.instance.map.style_mut().remove_image(&id),
            Operation::SetStyle(style) => self.set_style(style)?,
            Operation::SetCenter(center) => self
                .instance
                .map
                .jump_to(&CameraOptions::default().with_center(center)),
            Operation::SetZoom(zoom) => self
                .instance
                .map
                .jump_to(&CameraOptions::default().with_zoom(zoom)),
            Operation::SetBearing(bearing) => self
                .instance
                .map
                .jump_to(&CameraOptions::default().with_bearing(bearing)),
            Operation::SetFilter { layer, filter } => {
                let style = self.instance.map.style_mut();
                let filter = style
                    .convert_filter(&filter)
                    .map_err(|source| OperationError::Conversion {
                        kind: "filter",
                        source,
                    })?;
                style
                    .layer_mut(&layer)
                    .ok_or(OperationError::LayerNotFound(layer))?
                    .set_filter(filter);
            }
            Operation::SetLayerZoomRange {
                layer,
                min_zoom,
                max_zoom,
            } => {
                let layer = self
                    .instance
                    .map
                    .style_mut()
                    .layer_mut(&layer)
                    .ok_or(OperationError::LayerNotFound(layer))?;
                layer.set_min_zoom(min_zoom);
                layer.set_max_zoom(max_zoom);
            }
            Operation::SetLight(light) => {
                let style = self.instance.map.style_mut();
                let light = style
                    .convert_light(&light)
                    .map_err(|source| OperationError::Conversion {
                        kind: "light",
                        source,
                    })?;
                style.set_light(light);
            }
            Operation::AddLayer(layer) => {
                let style = self.instance.map.style_mut();
                let layer = style
                    .convert_layer(&layer)
                    .map_err(|source| OperationError::Conversion {
                        kind: "layer",
                        source,
                    })?;
                debug!("Adding layer {}", layer.id());
                style.add_layer(layer);
            }
            Operation::RemoveLayer(id) => {
                self.instance.map.style_mut().remove_layer(&id);
            }
            Operation::AddSource { id, mut source } => {
                self.resolver.localize_source_urls(&mut source);
                let style = self.instance.map.style_mut();
                let source = style.convert_source(&id, &source).map_err(|source| {
                    OperationError::Conversion {
                        kind: "source",
                        source,
                    }
                })?;
                style.add_source(source);
            }
            Operation::RemoveSource(id) => {
                self.instance.map.style_mut().remove_source(&id);
            }
            Operation::SetPaintProperty(change) => {
                let PropertyChange { layer, name, value } = change;
                self.layer_mut(&layer)?
                    .set_paint_property(&name, &value)
                    .map_err(|source| OperationError::Property {
                        layer,
                        property: name,
                        source,
                    })?;
            }
            Operation::SetLayoutProperty(change) => {
                let PropertyChange { layer, name, value } = change;
                self.layer_mut(&layer)?
                    .set_layout_property(&name, &value)
                    .map_err(|source| OperationError::Property {
                        layer,
                        property: name,
                        source,
                    })?;
            }
        }
        Ok(())
    }

    fn layer_mut(
        &mut self,
        id: &str,
    ) -> Result<&mut <<F::Map as Map>::Style as Style>::Layer, OperationError> {
        self.instance
            .map
            .style_mut()
            .layer_mut(id)
            .ok_or_else(|| OperationError::LayerNotFound(id.to_string()))
    }

    fn sleep(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.instance.frontend.run_once(deadline - now);
        }
    }

    fn load_image(&self, operation: ImageOperation) -> Result<StyleImage, OperationError> {
        let path = self.resolver.roots().integration.join(&operation.path);
        let bytes = std::fs::read(&path).map_err(|err| OperationError::ImageLoad {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|err| OperationError::ImageLoad {
            path,
            message: err.to_string(),
        })?;
        Ok(StyleImage {
            id: operation.name,
            image: decoded.to_rgba8(),
            pixel_ratio: operation.pixel_ratio,
            sdf: operation.sdf,
        })
    }

    fn set_style(&mut self, style: Value) -> Result<(), OperationError> {
        let mut style = match style {
            Value::String(url) => {
                let path = self.resolver.localize_url(&url);
                read_json(Path::new(&path)).map_err(|err| OperationError::StyleLoad {
                    path,
                    source: Box::new(err),
                })?
            }
            inline => inline,
        };
        self.resolver.localize_style_urls(&mut style);
        self.instance.map.style_mut().load_json(&style.to_string());
        Ok(())
    }
}
