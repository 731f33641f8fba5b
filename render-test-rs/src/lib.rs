#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod ignores;
pub mod image_compare;
pub mod localize;
pub mod metadata;
pub mod operations;
pub mod parser;
pub mod runner;
pub mod suite;

#[macro_use]
extern crate lazy_static;

pub use cache::{RendererCache, RendererKey};
pub use config::{RunnerConfig, SuiteOptions};
pub use error::{ConversionError, OperationError, RenderTestError, RenderTestResult};
pub use ignores::{IgnoreEntry, Ignores};
pub use image_compare::{ComparisonResult, ImageComparator, PixelDiff, Pixelmatch};
pub use localize::{ReferenceResolver, ResourceKind, ResourceRoots};
pub use metadata::TestMetadata;
pub use operations::{Operation, OperationInterpreter, ReplaySummary};
pub use parser::parse_test_metadata;
pub use runner::TestRunner;
pub use serde_json;
pub use suite::{discover_tests, run_suite, SuiteSummary, TestReport, TestStatus};
