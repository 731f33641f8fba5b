//! Golden image comparison.

use crate::error::{RenderTestError, RenderTestResult};
use image::{ImageFormat, RgbaImage};
use log::{error, info};
use pixelmatch::pixelmatch;
use serde::Serialize;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

/// Per-pixel color distance (0-1) above which two pixels count as different.
pub const PIXEL_THRESHOLD: f64 = 0.13;

pub const EXPECTED_IMAGE: &str = "expected.png";
pub const ACTUAL_IMAGE: &str = "actual.png";
pub const DIFF_IMAGE: &str = "diff.png";

/// Outcome of comparing one rendered frame with its golden image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonResult {
    /// Fraction of differing pixels, in `[0, 1]`.
    pub difference: f64,
    pub passed: bool,
}

impl ComparisonResult {
    pub fn from_difference(difference: f64, allowed: f64) -> Self {
        Self {
            difference,
            passed: difference <= allowed,
        }
    }

    /// Result for a comparison that could not be carried out.
    pub fn failed() -> Self {
        Self {
            difference: 1.0,
            passed: false,
        }
    }
}

/// What a [`PixelDiff`] found.
pub struct PixelDiffOutput {
    pub differing_pixels: usize,
    /// PNG visualization of the differing pixels.
    pub diff_png: Option<Vec<u8>>,
}

/// Counts differing pixels between two images of equal size.
pub trait PixelDiff {
    fn diff(
        &self,
        actual: &RgbaImage,
        expected: &RgbaImage,
        threshold: f64,
    ) -> RenderTestResult<PixelDiffOutput>;
}

/// [`PixelDiff`] backed by the pixelmatch algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pixelmatch;

impl PixelDiff for Pixelmatch {
    fn diff(
        &self,
        actual: &RgbaImage,
        expected: &RgbaImage,
        threshold: f64,
    ) -> RenderTestResult<PixelDiffOutput> {
        let (width, height) = expected.dimensions();
        let actual_png = encode_png(actual)?;
        let expected_png = encode_png(expected)?;
        let mut diff_png = Cursor::new(Vec::new());

        let differing_pixels = pixelmatch(
            Cursor::new(actual_png),
            Cursor::new(expected_png),
            Some(&mut diff_png),
            Some(width),
            Some(height),
            Some(pixelmatch::Options {
                threshold,
                ..Default::default()
            }),
        )
        .map_err(|e| RenderTestError::PixelDiff(format!("{:?}", e)))?;

        Ok(PixelDiffOutput {
            differing_pixels: differing_pixels as usize,
            diff_png: Some(diff_png.into_inner()),
        })
    }
}

pub fn encode_png(image: &RgbaImage) -> RenderTestResult<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

pub struct ImageComparator {
    update_expectations: bool,
    write_artifacts: bool,
    differ: Box<dyn PixelDiff>,
}

impl ImageComparator {
    pub fn new(update_expectations: bool, write_artifacts: bool) -> Self {
        Self {
            update_expectations,
            write_artifacts,
            differ: Box::new(Pixelmatch),
        }
    }

    pub fn with_pixel_diff(mut self, differ: impl PixelDiff + 'static) -> Self {
        self.differ = Box::new(differ);
        self
    }

    /// Compares `actual` with `<base>/expected.png` and returns the fraction
    /// of differing pixels.
    ///
    /// In update mode `actual` becomes the new golden image and the difference
    /// is 0. Otherwise `actual.png` and `diff.png` are written next to the
    /// golden image when artifacts are enabled.
    pub fn compare(&self, actual: &RgbaImage, base: &Path) -> RenderTestResult<f64> {
        if self.update_expectations {
            let expected_path = base.join(EXPECTED_IMAGE);
            info!("Updating {}", expected_path.display());
            actual.save_with_format(&expected_path, ImageFormat::Png)?;
            return Ok(0.0);
        }

        let expected_path = base.join(EXPECTED_IMAGE);
        let bytes = match fs::read(&expected_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                error!("Failed to load expected image {}", expected_path.display());
                return Err(RenderTestError::MissingExpectedImage(expected_path));
            }
            Err(err) => return Err(RenderTestError::io(expected_path, err)),
        };
        let expected = image::load_from_memory(&bytes)?.to_rgba8();

        if self.write_artifacts {
            actual.save_with_format(base.join(ACTUAL_IMAGE), ImageFormat::Png)?;
        }

        if expected.dimensions() != actual.dimensions() {
            error!(
                "Expected and actual image sizes differ: {:?} vs {:?}",
                expected.dimensions(),
                actual.dimensions()
            );
            return Err(RenderTestError::ImageSizeMismatch {
                expected: expected.dimensions(),
                actual: actual.dimensions(),
            });
        }

        let (width, height) = expected.dimensions();
        let total = u64::from(width) * u64::from(height);
        if total == 0 {
            return Ok(0.0);
        }

        let output = self.differ.diff(actual, &expected, PIXEL_THRESHOLD)?;

        if self.write_artifacts {
            if let Some(diff_png) = &output.diff_png {
                let diff_path = base.join(DIFF_IMAGE);
                fs::write(&diff_path, diff_png).map_err(|err| RenderTestError::io(diff_path, err))?;
            }
        }

        Ok(output.differing_pixels as f64 / total as f64)
    }
}
