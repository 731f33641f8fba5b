//! Traits describing the rendering engine under test.
//!
//! The harness never renders anything itself. A concrete engine implements
//! [`RenderBackend`] to hand out [`MapInstance`]s, and the runner drives them
//! through these traits: loading styles, mutating the style during operation
//! replay, moving the camera and producing frames.

use crate::error::{ConversionError, RenderTestResult};
use image::RgbaImage;
use serde_json::Value;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Output size in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Render the whole viewport once, waiting for every resource.
    #[default]
    Static,
    /// Render a single tile-sized frame.
    Tile,
}

impl MapMode {
    pub fn from_name(name: &str) -> Self {
        if name == "tile" {
            MapMode::Tile
        } else {
            MapMode::Static
        }
    }
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapMode::Static => write!(f, "static"),
            MapMode::Tile => write!(f, "tile"),
        }
    }
}

/// Debug overlays, combinable with `|`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MapDebugOptions(u32);

impl MapDebugOptions {
    pub const NO_DEBUG: Self = Self(0);
    pub const TILE_BORDERS: Self = Self(1 << 1);
    pub const COLLISION: Self = Self(1 << 4);
    pub const OVERDRAW: Self = Self(1 << 5);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MapDebugOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MapDebugOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionMode {
    pub axonometric: bool,
    pub x_skew: f64,
    pub y_skew: f64,
}

impl Default for ProjectionMode {
    fn default() -> Self {
        Self {
            axonometric: false,
            x_skew: 0.0,
            y_skew: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A camera jump. Unset fields leave the current value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraOptions {
    pub center: Option<LatLng>,
    pub zoom: Option<f64>,
    pub bearing: Option<f64>,
    pub pitch: Option<f64>,
}

impl CameraOptions {
    pub fn with_center(mut self, center: LatLng) -> Self {
        self.center = Some(center);
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }
}

/// Options a renderer instance is constructed with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapOptions {
    pub map_mode: MapMode,
    pub size: Size,
    pub pixel_ratio: f32,
    pub cross_source_collisions: bool,
}

/// A decoded raster registered in the style's image registry.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleImage {
    pub id: String,
    pub image: RgbaImage,
    pub pixel_ratio: f32,
    pub sdf: bool,
}

pub trait StyleLayer {
    /// Engine representation of a converted filter expression.
    type Filter;

    fn id(&self) -> &str;
    fn set_filter(&mut self, filter: Self::Filter);
    fn set_min_zoom(&mut self, zoom: f32);
    fn set_max_zoom(&mut self, zoom: f32);

    /// Converts `value` and applies it. Conversion problems are reported by
    /// the setter itself.
    fn set_paint_property(&mut self, name: &str, value: &Value) -> Result<(), ConversionError>;
    fn set_layout_property(&mut self, name: &str, value: &Value)
        -> Result<(), ConversionError>;
}

/// The mutable style (scene) of a map.
pub trait Style {
    type Layer: StyleLayer;
    type Source;
    type Light;

    fn load_json(&mut self, json: &str);
    fn default_camera(&self) -> CameraOptions;

    fn layer_mut(&mut self, id: &str) -> Option<&mut Self::Layer>;
    fn add_layer(&mut self, layer: Self::Layer);
    fn remove_layer(&mut self, id: &str) -> Option<Self::Layer>;

    fn add_source(&mut self, source: Self::Source);
    fn remove_source(&mut self, id: &str) -> Option<Self::Source>;

    fn set_light(&mut self, light: Self::Light);

    fn add_image(&mut self, image: StyleImage);
    fn remove_image(&mut self, id: &str);

    fn convert_filter(
        &self,
        value: &Value,
    ) -> Result<<Self::Layer as StyleLayer>::Filter, ConversionError>;
    fn convert_layer(&self, value: &Value) -> Result<Self::Layer, ConversionError>;
    fn convert_source(&self, id: &str, value: &Value) -> Result<Self::Source, ConversionError>;
    fn convert_light(&self, value: &Value) -> Result<Self::Light, ConversionError>;
}

pub trait Map {
    type Style: Style;

    fn style(&self) -> &Self::Style;
    fn style_mut(&mut self) -> &mut Self::Style;
    fn jump_to(&mut self, camera: &CameraOptions);
    fn set_size(&mut self, size: Size);
    fn set_projection_mode(&mut self, mode: ProjectionMode);
    fn set_debug(&mut self, debug: MapDebugOptions);
}

/// Offscreen frontend that turns a map into frames.
pub trait HeadlessFrontend {
    type Map: Map;

    fn set_size(&mut self, size: Size);

    /// Blocks until a complete frame of `map` is available.
    fn render(&mut self, map: &mut Self::Map) -> RenderTestResult<RgbaImage>;

    /// Runs one iteration of the engine's event loop, waiting at most
    /// `timeout` for work to arrive.
    fn run_once(&mut self, timeout: Duration);
}

/// A frontend together with the map it renders.
pub struct MapInstance<F: HeadlessFrontend> {
    pub frontend: F,
    pub map: F::Map,
}

impl<F: HeadlessFrontend> MapInstance<F> {
    pub fn new(frontend: F, map: F::Map) -> Self {
        Self { frontend, map }
    }

    pub fn render(&mut self) -> RenderTestResult<RgbaImage> {
        self.frontend.render(&mut self.map)
    }
}

/// Factory for renderer instances.
pub trait RenderBackend {
    type Frontend: HeadlessFrontend;

    fn create(&mut self, options: &MapOptions) -> RenderTestResult<MapInstance<Self::Frontend>>;
}
