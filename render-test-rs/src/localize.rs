//! Rewrites resource URLs in a style into local `file://` references.
//!
//! Scenarios reference tiles, glyphs, sprites and GeoJSON through `local://`,
//! `mapbox://` and `http://localhost:2900` URLs. Each is mapped onto either the
//! vendored fixtures directory or the integration suite directory, trying the
//! candidates in a fixed order and keeping the first one whose parent directory
//! exists on disk.

use crate::parser::read_json;
use log::{debug, warn};
use regex::{NoExpand, Regex};
use serde_json::Value;
use std::path::{is_separator, Path, PathBuf};

pub const FILE_SCHEME: &str = "file://";

lazy_static! {
    static ref LOCAL_URL: Regex = Regex::new("local://").unwrap();
    static ref LOCALHOST_URL: Regex = Regex::new("http://localhost:2900").unwrap();
    static ref MAPBOX_URL: Regex = Regex::new("mapbox://").unwrap();
    static ref MAPBOX_FONTS_URL: Regex = Regex::new("mapbox://fonts").unwrap();
}

/// Directories URLs are localized against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRoots {
    /// Vendored fixtures, tried first.
    pub vendor: PathBuf,
    /// The integration test suite (`.../test/integration`).
    pub integration: PathBuf,
}

impl ResourceRoots {
    pub fn new(vendor: impl Into<PathBuf>, integration: impl Into<PathBuf>) -> Self {
        Self {
            vendor: vendor.into(),
            integration: integration.into(),
        }
    }

    /// Standard layout below a checkout root.
    pub fn from_root(root: &Path) -> Self {
        Self::new(
            root.join("vendor"),
            root.join("mapbox-gl-js").join("test").join("integration"),
        )
    }
}

/// What a URL points at. Selects the rewrite chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A source `url` / `urls` entry (TileJSON manifest).
    Tileset,
    /// A tile URL template.
    Tiles,
    /// Inline source data given as a URL.
    Data,
    /// The style's glyph URL template.
    Glyphs,
    /// The style's sprite base URL.
    Sprite,
}

#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    roots: ResourceRoots,
}

impl ReferenceResolver {
    pub fn new(roots: ResourceRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &ResourceRoots {
        &self.roots
    }

    /// Localizes a single reference. Returns a `file://` reference, or
    /// `reference` unchanged when no rule produces an existing directory.
    pub fn localize(&self, reference: &str, kind: ResourceKind) -> String {
        let url = remove_url_arguments(reference);
        let localized = match kind {
            ResourceKind::Tileset => self
                .mapbox_tileset_url(url)
                .or_else(|| self.local_url(url, false)),
            ResourceKind::Tiles => self
                .mapbox_tiles_url(url)
                .or_else(|| self.local_url(url, false))
                .or_else(|| self.http_url(url)),
            ResourceKind::Data => self.local_url(url, false),
            ResourceKind::Glyphs => self
                .mapbox_fonts_url(url)
                .or_else(|| self.local_url(url, true)),
            ResourceKind::Sprite => self
                .mapbox_sprite_url(url)
                .or_else(|| self.local_url(url, false)),
        };

        match localized {
            Some(path) => format!("{FILE_SCHEME}{path}"),
            None => reference.to_string(),
        }
    }

    /// Localizes a `local://` style URL to a plain path, for loading a style
    /// from disk. Unmatched URLs are returned unchanged.
    pub fn localize_url(&self, url: &str) -> String {
        self.local_url(remove_url_arguments(url), false)
            .unwrap_or_else(|| url.to_string())
    }

    /// Localizes `url`, `urls`, `tiles` and `data` of a source object in place.
    ///
    /// A `url` that resolves to a local TileJSON manifest is replaced by the
    /// manifest's `tiles`, except for image and video sources.
    pub fn localize_source_urls(&self, source: &mut Value) {
        let Some(object) = source.as_object_mut() else {
            return;
        };

        if let Some(Value::Array(urls)) = object.get_mut("urls") {
            for url in urls.iter_mut() {
                self.localize_value(url, ResourceKind::Tileset);
            }
        }

        if let Some(url) = object.get_mut("url") {
            self.localize_value(url, ResourceKind::Tileset);

            let source_type = object.get("type").and_then(Value::as_str).unwrap_or("");
            if source_type != "image" && source_type != "video" {
                let tiles = object
                    .get("url")
                    .and_then(Value::as_str)
                    .and_then(|url| self.read_tileset_tiles(url));
                if let Some(tiles) = tiles {
                    object.insert("tiles".to_string(), tiles);
                    object.remove("url");
                }
            }
        }

        if let Some(Value::Array(tiles)) = object.get_mut("tiles") {
            for tile in tiles.iter_mut() {
                self.localize_value(tile, ResourceKind::Tiles);
            }
        }

        if let Some(data) = object.get_mut("data") {
            self.localize_value(data, ResourceKind::Data);
        }
    }

    /// Localizes every source, the glyph template and the sprite of a style.
    pub fn localize_style_urls(&self, style: &mut Value) {
        if let Some(Value::Object(sources)) = style.get_mut("sources") {
            for source in sources.values_mut() {
                self.localize_source_urls(source);
            }
        }

        if let Some(glyphs) = style.get_mut("glyphs") {
            self.localize_value(glyphs, ResourceKind::Glyphs);
        }

        if let Some(sprite) = style.get_mut("sprite") {
            self.localize_value(sprite, ResourceKind::Sprite);
        }
    }

    fn localize_value(&self, value: &mut Value, kind: ResourceKind) {
        if let Value::String(reference) = value {
            let localized = self.localize(reference, kind);
            *reference = localized;
        }
    }

    fn read_tileset_tiles(&self, url: &str) -> Option<Value> {
        let path = url.strip_prefix(FILE_SCHEME)?;
        let manifest = read_json(Path::new(path)).ok()?;
        match manifest.get("tiles") {
            Some(tiles @ Value::Array(_)) => {
                debug!("Inlined tiles from tileset {path}");
                Some(tiles.clone())
            }
            _ => {
                warn!("Tileset {path} has no `tiles` array");
                None
            }
        }
    }

    fn local_url(&self, url: &str, glyphs: bool) -> Option<String> {
        self.vendor_path(url, &LOCAL_URL, glyphs)
            .or_else(|| self.integration_path(url, "", &LOCAL_URL, glyphs))
    }

    fn http_url(&self, url: &str) -> Option<String> {
        self.vendor_path(url, &LOCALHOST_URL, false)
            .or_else(|| self.integration_path(url, "", &LOCALHOST_URL, false))
    }

    fn mapbox_sprite_url(&self, url: &str) -> Option<String> {
        self.integration_path(url, "", &MAPBOX_URL, false)
    }

    fn mapbox_fonts_url(&self, url: &str) -> Option<String> {
        self.integration_path(url, "glyphs/", &MAPBOX_FONTS_URL, true)
    }

    fn mapbox_tiles_url(&self, url: &str) -> Option<String> {
        self.vendor_path(url, &MAPBOX_URL, false)
            .or_else(|| self.integration_path(url, "tiles/", &MAPBOX_URL, false))
    }

    fn mapbox_tileset_url(&self, url: &str) -> Option<String> {
        self.integration_path(url, "tilesets/", &MAPBOX_URL, false)
    }

    fn vendor_path(&self, url: &str, pattern: &Regex, glyphs: bool) -> Option<String> {
        rewrite(url, pattern, &directory_prefix(&self.roots.vendor), glyphs)
    }

    fn integration_path(
        &self,
        url: &str,
        parent: &str,
        pattern: &Regex,
        glyphs: bool,
    ) -> Option<String> {
        let replacement = format!("{}{}", directory_prefix(&self.roots.integration), parent);
        rewrite(url, pattern, &replacement, glyphs)
    }
}

/// Replaces `pattern` in `url` with `replacement` and accepts the result if its
/// parent directory exists. Glyph paths carry an extra `{fontstack}` segment,
/// so their grandparent is accepted too.
fn rewrite(url: &str, pattern: &Regex, replacement: &str, glyphs: bool) -> Option<String> {
    if !pattern.is_match(url) {
        return None;
    }

    let file = pattern.replace_all(url, NoExpand(replacement)).into_owned();
    let parent = Path::new(&file).parent()?;
    if parent.exists() || (glyphs && parent.parent().is_some_and(Path::exists)) {
        Some(file)
    } else {
        None
    }
}

fn remove_url_arguments(url: &str) -> &str {
    match url.find('?') {
        Some(index) => &url[..index],
        None => url,
    }
}

fn directory_prefix(path: &Path) -> String {
    let mut prefix = path.to_string_lossy().into_owned();
    if !prefix.ends_with(is_separator) {
        prefix.push('/');
    }
    prefix
}
