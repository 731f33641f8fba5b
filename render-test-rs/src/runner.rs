//! Runs one scenario: configure a cached renderer, load the style, replay the
//! operations, render and compare.

use crate::cache::{RendererCache, RendererKey};
use crate::config::RunnerConfig;
use crate::engine::{HeadlessFrontend, Map, MapInstance, RenderBackend, Style};
use crate::error::RenderTestResult;
use crate::image_compare::{ComparisonResult, ImageComparator};
use crate::localize::ReferenceResolver;
use crate::metadata::TestMetadata;
use crate::operations::OperationInterpreter;
use crate::parser::parse_test_metadata;
use image::RgbaImage;
use log::{error, warn};
use std::path::Path;

pub struct TestRunner<B: RenderBackend> {
    backend: B,
    maps: RendererCache<MapInstance<B::Frontend>>,
    resolver: ReferenceResolver,
    comparator: ImageComparator,
}

impl<B: RenderBackend> TestRunner<B> {
    pub fn new(backend: B, config: RunnerConfig) -> Self {
        Self {
            backend,
            maps: RendererCache::new(),
            resolver: ReferenceResolver::new(config.roots),
            comparator: ImageComparator::new(config.update_expectations, config.write_artifacts),
        }
    }

    pub fn with_comparator(mut self, comparator: ImageComparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    /// The cached instance for `key`, if one has been created.
    pub fn instance(&self, key: &RendererKey) -> Option<&MapInstance<B::Frontend>> {
        self.maps.get(key)
    }

    pub fn cached_instances(&self) -> usize {
        self.maps.len()
    }

    /// Drops every cached renderer instance.
    pub fn reset(&mut self) {
        self.maps.reset();
    }

    /// Loads the scenario at `path` with this runner's resolver.
    pub fn load(&self, path: &Path) -> RenderTestResult<TestMetadata> {
        parse_test_metadata(path, &self.resolver)
    }

    /// Renders the scenario and compares the frame with its golden image.
    /// Any error along the way yields a failed result.
    pub fn run(&mut self, metadata: &mut TestMetadata) -> ComparisonResult {
        let actual = match self.render(metadata) {
            Ok(actual) => actual,
            Err(err) => {
                error!("{}: {err}", metadata.path.display());
                return ComparisonResult::failed();
            }
        };

        match self.comparator.compare(&actual, metadata.base_dir()) {
            Ok(difference) => ComparisonResult::from_difference(difference, metadata.allowed),
            Err(err) => {
                error!("{}: {err}", metadata.path.display());
                ComparisonResult::failed()
            }
        }
    }

    /// Produces the scenario's final frame without comparing it.
    ///
    /// A reused instance still carries the previous scenario's state, so size,
    /// projection, debug overlays, style and camera are all set again here.
    pub fn render(&mut self, metadata: &mut TestMetadata) -> RenderTestResult<RgbaImage> {
        let options = metadata.map_options();
        let backend = &mut self.backend;
        let instance = self
            .maps
            .get_or_insert_with(metadata.renderer_key(), || backend.create(&options))?;

        instance.frontend.set_size(metadata.size);
        instance.map.set_size(metadata.size);
        instance.map.set_projection_mode(metadata.projection_mode());
        instance.map.set_debug(metadata.debug);
        instance
            .map
            .style_mut()
            .load_json(&metadata.document.to_string());
        let camera = instance.map.style().default_camera();
        instance.map.jump_to(&camera);

        let summary = OperationInterpreter::new(instance, &self.resolver).run(metadata);
        if summary.failed > 0 {
            warn!(
                "{}: {} of {} operations failed",
                metadata.path.display(),
                summary.failed,
                summary.applied + summary.failed
            );
        }

        instance.render()
    }
}
