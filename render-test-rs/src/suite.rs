//! Batch execution over a directory of scenarios.

use crate::config::SuiteOptions;
use crate::engine::RenderBackend;
use crate::error::{RenderTestError, RenderTestResult};
use crate::ignores::Ignores;
use crate::runner::TestRunner;
use log::{error, info, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SCENARIO_FILE: &str = "style.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Passed,
    Failed,
    /// Listed as known-failing, but passed.
    IgnoredPassed,
    /// Listed as known-failing, and failed.
    IgnoredFailed,
    /// Not executed: a `skip` ignore, or the scenario could not be loaded.
    Skipped,
}

impl TestStatus {
    pub fn classify(passed: bool, ignored: bool) -> Self {
        match (passed, ignored) {
            (true, false) => TestStatus::Passed,
            (false, false) => TestStatus::Failed,
            (true, true) => TestStatus::IgnoredPassed,
            (false, true) => TestStatus::IgnoredFailed,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::IgnoredPassed => "ignored passed",
            TestStatus::IgnoredFailed => "ignored failed",
            TestStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub name: String,
    pub status: TestStatus,
    /// Ignore reason or load error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Difference ratio, for scenarios that were rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub reports: Vec<TestReport>,
}

impl SuiteSummary {
    pub fn count(&self, status: TestStatus) -> usize {
        self.reports
            .iter()
            .filter(|report| report.status == status)
            .count()
    }

    /// True when no scenario failed outright. Ignored failures do not count.
    pub fn is_success(&self) -> bool {
        self.count(TestStatus::Failed) == 0
    }

    pub fn report(&self, name: &str) -> Option<&TestReport> {
        self.reports.iter().find(|report| report.name == name)
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} ignored passed, {} ignored failed, {} skipped",
            self.count(TestStatus::Passed),
            self.count(TestStatus::Failed),
            self.count(TestStatus::IgnoredPassed),
            self.count(TestStatus::IgnoredFailed),
            self.count(TestStatus::Skipped),
        )
    }
}

/// Collects every `style.json` below `tests_root`, or below each of `names`
/// when given, sorted by path.
///
/// A name that matches nothing is logged and left out.
pub fn discover_tests(tests_root: &Path, names: &[String]) -> RenderTestResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    if names.is_empty() {
        collect_scenarios(tests_root, &mut paths)?;
    } else {
        for name in names {
            let dir = tests_root.join(name);
            if dir.is_dir() {
                collect_scenarios(&dir, &mut paths)?;
            } else {
                error!("Test not found: {name}");
            }
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn collect_scenarios(dir: &Path, paths: &mut Vec<PathBuf>) -> RenderTestResult<()> {
    let entries = fs::read_dir(dir).map_err(|err| RenderTestError::io(dir, err))?;
    for entry in entries {
        let path = entry.map_err(|err| RenderTestError::io(dir, err))?.path();
        if path.is_dir() {
            collect_scenarios(&path, paths)?;
        } else if path.file_name().is_some_and(|name| name == SCENARIO_FILE) {
            paths.push(path);
        }
    }
    Ok(())
}

/// Reorders `paths` pseudo-randomly. The same seed always yields the same
/// order.
pub fn shuffle_tests(paths: &mut [PathBuf], seed: u32) {
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(seed));
    paths.shuffle(&mut rng);
}

/// Name of the scenario at `path`: its directory relative to `tests_root`,
/// `/`-separated.
pub fn test_name(tests_root: &Path, path: &Path) -> String {
    let dir = path.parent().unwrap_or(path);
    let relative = dir.strip_prefix(tests_root).unwrap_or(dir);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Runs every discovered scenario in order.
///
/// Failures of individual scenarios never stop the batch; only an unreadable
/// test directory is an error.
pub fn run_suite<B: RenderBackend>(
    runner: &mut TestRunner<B>,
    ignores: &Ignores,
    options: &SuiteOptions,
) -> RenderTestResult<SuiteSummary> {
    let mut paths = discover_tests(&options.tests_root, &options.test_names)?;
    if options.shuffle {
        info!("Shuffle seed: {}", options.seed);
        shuffle_tests(&mut paths, options.seed);
    }
    info!("Running {} tests", paths.len());

    let mut summary = SuiteSummary::default();
    for path in paths {
        let name = test_name(&options.tests_root, &path);
        let ignore = ignores.get(&format!("{}{name}", options.ignore_prefix));

        if let Some(entry) = ignore.as_ref().filter(|entry| entry.is_skip()) {
            info!("* skipped {} ({})", entry.identifier, entry.reason);
            summary.reports.push(TestReport {
                name,
                status: TestStatus::Skipped,
                reason: Some(entry.reason.clone()),
                difference: None,
            });
            continue;
        }

        let mut metadata = match runner.load(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("* skipped {name}: {err}");
                summary.reports.push(TestReport {
                    name,
                    status: TestStatus::Skipped,
                    reason: Some(err.to_string()),
                    difference: None,
                });
                continue;
            }
        };

        if !options.recycle_map {
            runner.reset();
        }

        let result = runner.run(&mut metadata);
        let status = TestStatus::classify(result.passed, ignore.is_some());
        match status {
            TestStatus::Passed => info!("* passed {name}"),
            TestStatus::Failed => error!("* failed {name} (difference {})", result.difference),
            _ => warn!("* {status} {name}"),
        }

        summary.reports.push(TestReport {
            name,
            status,
            reason: ignore.map(|entry| entry.reason),
            difference: Some(result.difference),
        });
    }

    info!("{summary}");
    Ok(summary)
}
