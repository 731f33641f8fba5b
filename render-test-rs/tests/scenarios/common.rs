//! Shared test infrastructure: an in-memory engine that records what the
//! harness does to it and renders solid-color frames.

use image::{Rgba, RgbaImage};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Re-export commonly used types so test modules can `use super::common::*`
pub use render_test_rs::engine::{
    CameraOptions, HeadlessFrontend, LatLng, Map, MapDebugOptions, MapInstance, MapMode,
    MapOptions, ProjectionMode, RenderBackend, Size, Style, StyleImage, StyleLayer,
};
pub use render_test_rs::{
    ConversionError, Ignores, OperationError, OperationInterpreter, ReferenceResolver,
    RenderTestError, RenderTestResult, RendererKey, ResourceRoots, RunnerConfig, SuiteOptions,
    TestMetadata, TestRunner, TestStatus,
};
pub use serde_json::json;
pub use tempfile::TempDir;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Color of every frame the fake engine renders. Only the red channel varies,
/// with the number of style layers.
pub fn frame_color(layer_count: usize) -> Rgba<u8> {
    Rgba([(layer_count * 40 % 256) as u8, 80, 160, 255])
}

/// The frame the fake engine produces for a style with `layer_count` layers.
pub fn expected_frame(width: u32, height: u32, layer_count: usize) -> RgbaImage {
    RgbaImage::from_pixel(width, height, frame_color(layer_count))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeLayer {
    pub id: String,
    pub layer_type: String,
    pub filter: Option<Value>,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub paint: BTreeMap<String, Value>,
    pub layout: BTreeMap<String, Value>,
}

impl StyleLayer for FakeLayer {
    type Filter = Value;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_filter(&mut self, filter: Value) {
        self.filter = Some(filter);
    }

    fn set_min_zoom(&mut self, zoom: f32) {
        self.min_zoom = zoom;
    }

    fn set_max_zoom(&mut self, zoom: f32) {
        self.max_zoom = zoom;
    }

    fn set_paint_property(&mut self, name: &str, value: &Value) -> Result<(), ConversionError> {
        if value.is_null() {
            return Err(ConversionError::new(format!("{name} must not be null")));
        }
        self.paint.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn set_layout_property(&mut self, name: &str, value: &Value) -> Result<(), ConversionError> {
        if name == "visibility" && !matches!(value.as_str(), Some("visible" | "none")) {
            return Err(ConversionError::new("visibility must be `visible` or `none`"));
        }
        self.layout.insert(name.to_string(), value.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeSource {
    pub id: String,
    pub value: Value,
}

#[derive(Debug, Default)]
pub struct FakeStyle {
    pub json: Value,
    pub layers: Vec<FakeLayer>,
    pub sources: BTreeMap<String, FakeSource>,
    pub images: BTreeMap<String, StyleImage>,
    pub light: Option<Value>,
    pub loads: usize,
}

impl Style for FakeStyle {
    type Layer = FakeLayer;
    type Source = FakeSource;
    type Light = Value;

    fn load_json(&mut self, json: &str) {
        let value: Value = serde_json::from_str(json).unwrap_or(Value::Null);
        self.layers = value["layers"]
            .as_array()
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|layer| self.convert_layer(layer).ok())
                    .collect()
            })
            .unwrap_or_default();
        self.sources = value["sources"]
            .as_object()
            .map(|sources| {
                sources
                    .iter()
                    .filter_map(|(id, source)| self.convert_source(id, source).ok())
                    .map(|source| (source.id.clone(), source))
                    .collect()
            })
            .unwrap_or_default();
        self.images.clear();
        self.light = value.get("light").cloned();
        self.json = value;
        self.loads += 1;
    }

    fn default_camera(&self) -> CameraOptions {
        let mut camera = CameraOptions::default();
        if let Some([lng, lat]) = self.json["center"].as_array().map(Vec::as_slice) {
            if let (Some(lng), Some(lat)) = (lng.as_f64(), lat.as_f64()) {
                camera = camera.with_center(LatLng::new(lat, lng));
            }
        }
        if let Some(zoom) = self.json["zoom"].as_f64() {
            camera = camera.with_zoom(zoom);
        }
        if let Some(bearing) = self.json["bearing"].as_f64() {
            camera = camera.with_bearing(bearing);
        }
        if let Some(pitch) = self.json["pitch"].as_f64() {
            camera = camera.with_pitch(pitch);
        }
        camera
    }

    fn layer_mut(&mut self, id: &str) -> Option<&mut FakeLayer> {
        self.layers.iter_mut().find(|layer| layer.id == id)
    }

    fn add_layer(&mut self, layer: FakeLayer) {
        self.layers.push(layer);
    }

    fn remove_layer(&mut self, id: &str) -> Option<FakeLayer> {
        let index = self.layers.iter().position(|layer| layer.id == id)?;
        Some(self.layers.remove(index))
    }

    fn add_source(&mut self, source: FakeSource) {
        self.sources.insert(source.id.clone(), source);
    }

    fn remove_source(&mut self, id: &str) -> Option<FakeSource> {
        self.sources.remove(id)
    }

    fn set_light(&mut self, light: Value) {
        self.light = Some(light);
    }

    fn add_image(&mut self, image: StyleImage) {
        self.images.insert(image.id.clone(), image);
    }

    fn remove_image(&mut self, id: &str) {
        self.images.remove(id);
    }

    fn convert_filter(&self, value: &Value) -> Result<Value, ConversionError> {
        match value {
            Value::Array(_) | Value::Bool(_) => Ok(value.clone()),
            other => Err(ConversionError::new(format!("invalid filter: {other}"))),
        }
    }

    fn convert_layer(&self, value: &Value) -> Result<FakeLayer, ConversionError> {
        let id = value["id"]
            .as_str()
            .ok_or_else(|| ConversionError::new("layer must have an id"))?;
        let layer_type = value["type"]
            .as_str()
            .ok_or_else(|| ConversionError::new("layer must have a type"))?;
        let properties = |key: &str| -> BTreeMap<String, Value> {
            value[key]
                .as_object()
                .map(|object| object.clone().into_iter().collect())
                .unwrap_or_default()
        };
        Ok(FakeLayer {
            id: id.to_string(),
            layer_type: layer_type.to_string(),
            filter: value.get("filter").cloned(),
            min_zoom: value["minzoom"].as_f64().unwrap_or(0.0) as f32,
            max_zoom: value["maxzoom"].as_f64().unwrap_or(24.0) as f32,
            paint: properties("paint"),
            layout: properties("layout"),
        })
    }

    fn convert_source(&self, id: &str, value: &Value) -> Result<FakeSource, ConversionError> {
        if !value["type"].is_string() {
            return Err(ConversionError::new("source must have a type"));
        }
        Ok(FakeSource {
            id: id.to_string(),
            value: value.clone(),
        })
    }

    fn convert_light(&self, value: &Value) -> Result<Value, ConversionError> {
        if value.is_object() {
            Ok(value.clone())
        } else {
            Err(ConversionError::new("light must be an object"))
        }
    }
}

/// Camera state after all jumps so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub center: LatLng,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

#[derive(Debug)]
pub struct FakeMap {
    pub style: FakeStyle,
    pub camera: Camera,
    pub size: Size,
    pub projection: ProjectionMode,
    pub debug: MapDebugOptions,
}

impl FakeMap {
    pub fn new(options: &MapOptions) -> Self {
        Self {
            style: FakeStyle::default(),
            camera: Camera {
                center: LatLng::new(0.0, 0.0),
                zoom: 0.0,
                bearing: 0.0,
                pitch: 0.0,
            },
            size: options.size,
            projection: ProjectionMode::default(),
            debug: MapDebugOptions::NO_DEBUG,
        }
    }
}

impl Map for FakeMap {
    type Style = FakeStyle;

    fn style(&self) -> &FakeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut FakeStyle {
        &mut self.style
    }

    fn jump_to(&mut self, camera: &CameraOptions) {
        if let Some(center) = camera.center {
            self.camera.center = center;
        }
        if let Some(zoom) = camera.zoom {
            self.camera.zoom = zoom;
        }
        if let Some(bearing) = camera.bearing {
            self.camera.bearing = bearing;
        }
        if let Some(pitch) = camera.pitch {
            self.camera.pitch = pitch;
        }
    }

    fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.projection = mode;
    }

    fn set_debug(&mut self, debug: MapDebugOptions) {
        self.debug = debug;
    }
}

#[derive(Debug)]
pub struct FakeFrontend {
    pub size: Size,
    pub pixel_ratio: f32,
    pub renders: usize,
    pub run_once_calls: usize,
}

impl HeadlessFrontend for FakeFrontend {
    type Map = FakeMap;

    fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    fn render(&mut self, map: &mut FakeMap) -> RenderTestResult<RgbaImage> {
        if self.size.is_empty() {
            return Err(RenderTestError::Renderer("cannot render an empty frame".into()));
        }
        self.renders += 1;
        let width = (self.size.width as f32 * self.pixel_ratio) as u32;
        let height = (self.size.height as f32 * self.pixel_ratio) as u32;
        Ok(expected_frame(width, height, map.style.layers.len()))
    }

    fn run_once(&mut self, timeout: Duration) {
        self.run_once_calls += 1;
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub created: usize,
    pub fail: bool,
}

impl RenderBackend for FakeBackend {
    type Frontend = FakeFrontend;

    fn create(&mut self, options: &MapOptions) -> RenderTestResult<MapInstance<FakeFrontend>> {
        if self.fail {
            return Err(RenderTestError::Renderer("no rendering context".into()));
        }
        self.created += 1;
        let frontend = FakeFrontend {
            size: options.size,
            pixel_ratio: options.pixel_ratio,
            renders: 0,
            run_once_calls: 0,
        };
        Ok(MapInstance::new(frontend, FakeMap::new(options)))
    }
}

/// A fresh instance with default options.
pub fn fake_instance() -> MapInstance<FakeFrontend> {
    let options = TestMetadata::new("style.json", Value::Null).map_options();
    FakeBackend::default().create(&options).unwrap()
}

/// Vendor and integration roots inside `dir`, both created.
pub fn fixture_roots(dir: &Path) -> ResourceRoots {
    let roots = ResourceRoots::new(dir.join("vendor"), dir.join("integration"));
    fs::create_dir_all(&roots.vendor).unwrap();
    fs::create_dir_all(&roots.integration).unwrap();
    roots
}

/// Writes `<tests_root>/<name>/style.json` and returns its path.
pub fn write_scenario(tests_root: &Path, name: &str, document: &Value) -> PathBuf {
    let dir = tests_root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("style.json");
    fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}

/// Writes the golden image the fake engine will reproduce for a scenario.
pub fn write_expected(scenario: &Path, width: u32, height: u32, layer_count: usize) {
    let dir = scenario.parent().unwrap();
    expected_frame(width, height, layer_count)
        .save_with_format(dir.join("expected.png"), image::ImageFormat::Png)
        .unwrap();
}
