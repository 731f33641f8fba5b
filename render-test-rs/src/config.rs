//! Runner and suite configuration.

use crate::localize::ResourceRoots;
use std::path::{Path, PathBuf};

/// Environment variable that turns every comparison into a golden update.
pub const UPDATE_ENV: &str = "UPDATE";
/// Environment variable that disables writing `actual.png` / `diff.png`.
pub const READ_ONLY_ENV: &str = "TEST_READ_ONLY";

/// Prefix of scenario identifiers in the ignore list.
pub const IGNORE_PREFIX: &str = "render-tests/";

/// Shuffle seed used when none is given.
pub const DEFAULT_SEED: u32 = 1;

/// Runner configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Directories resource URLs are localized against.
    pub roots: ResourceRoots,
    /// Write the rendered frame as the new `expected.png` instead of comparing
    /// (default: false).
    pub update_expectations: bool,
    /// Write `actual.png` and `diff.png` next to each scenario (default: true).
    pub write_artifacts: bool,
}

impl RunnerConfig {
    pub fn new(roots: ResourceRoots) -> Self {
        Self {
            roots,
            update_expectations: false,
            write_artifacts: true,
        }
    }

    /// Configuration for the standard checkout layout below `root`.
    pub fn from_root(root: &Path) -> Self {
        Self::new(ResourceRoots::from_root(root))
    }

    /// Applies `UPDATE` and `TEST_READ_ONLY` from the process environment.
    /// Either takes effect when set, whatever its value.
    pub fn with_env(mut self) -> Self {
        if std::env::var_os(UPDATE_ENV).is_some() {
            self.update_expectations = true;
        }
        if std::env::var_os(READ_ONLY_ENV).is_some() {
            self.write_artifacts = false;
        }
        self
    }
}

/// Options for a whole batch of scenarios.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteOptions {
    /// Directory scanned for `style.json` files; scenario names are relative
    /// to it.
    pub tests_root: PathBuf,
    /// Scenario names or sub-directories to run. Empty runs everything.
    pub test_names: Vec<String>,
    /// Keep renderer instances between scenarios instead of resetting the
    /// cache before each one (default: false).
    pub recycle_map: bool,
    /// Prepended to a scenario name to form its ignore-list identifier.
    pub ignore_prefix: String,
    /// Run scenarios in a seeded random order instead of sorted (default:
    /// false).
    pub shuffle: bool,
    /// Seed for `shuffle` (default: 1).
    pub seed: u32,
}

impl SuiteOptions {
    pub fn new(tests_root: impl Into<PathBuf>) -> Self {
        Self {
            tests_root: tests_root.into(),
            test_names: Vec::new(),
            recycle_map: false,
            ignore_prefix: IGNORE_PREFIX.to_string(),
            shuffle: false,
            seed: DEFAULT_SEED,
        }
    }

    /// Standard location of the render tests below a checkout root.
    pub fn from_root(root: &Path) -> Self {
        Self::new(ResourceRoots::from_root(root).integration.join("render-tests"))
    }
}

/// Standard location of the ignore list below a checkout root.
pub fn default_ignores_path(root: &Path) -> PathBuf {
    root.join("platform")
        .join("node")
        .join("test")
        .join("ignores.json")
}
