use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use render_test_rs::config::{default_ignores_path, DEFAULT_SEED, IGNORE_PREFIX};
use render_test_rs::metadata::DEFAULT_ALLOWED_DIFFERENCE;
use render_test_rs::parser::read_json;
use render_test_rs::suite::{discover_tests, shuffle_tests, test_name};
use render_test_rs::{
    parse_test_metadata, ComparisonResult, Ignores, ImageComparator, ReferenceResolver,
    ResourceRoots, SuiteOptions,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// render-test: inspect render test scenarios and compare frames with their golden images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a scenario with its resource URLs rewritten to local files
    Localize {
        /// Path to the scenario's style.json
        input: PathBuf,

        /// Checkout root containing vendor/ and mapbox-gl-js/test/integration/
        #[arg(short, long)]
        root: PathBuf,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// List scenarios with their load status and ignore classification
    List {
        /// Checkout root containing vendor/ and mapbox-gl-js/test/integration/
        #[arg(short, long)]
        root: PathBuf,

        /// Directory scanned for style.json files [default: <root>/mapbox-gl-js/test/integration/render-tests]
        #[arg(short, long)]
        tests: Option<PathBuf>,

        /// Ignore list [default: <root>/platform/node/test/ignores.json]
        #[arg(short, long)]
        ignores: Option<PathBuf>,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,

        /// List scenarios in the seeded random order a shuffled run uses
        #[arg(long)]
        shuffle: bool,

        /// Shuffle seed
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u32,

        /// Scenario names or directories to list. Lists everything when empty
        names: Vec<String>,
    },

    /// Compare a rendered PNG with <dir>/expected.png
    Compare {
        /// Rendered frame
        actual: PathBuf,

        /// Scenario directory holding expected.png
        dir: PathBuf,

        /// Largest fraction of differing pixels that still passes
        #[arg(short, long, default_value_t = DEFAULT_ALLOWED_DIFFERENCE)]
        allowed: f64,

        /// Write the frame as the new expected.png instead of comparing
        #[arg(short, long)]
        update: bool,

        /// Do not write actual.png and diff.png
        #[arg(long)]
        read_only: bool,
    },
}

#[derive(Debug, Serialize)]
struct ListEntry {
    name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Localize {
            input,
            root,
            pretty,
        } => localize(&input, &root, pretty),
        Commands::List {
            root,
            tests,
            ignores,
            json,
            shuffle,
            seed,
            names,
        } => list(&root, tests, ignores, json, shuffle.then_some(seed), names),
        Commands::Compare {
            actual,
            dir,
            allowed,
            update,
            read_only,
        } => {
            let result = compare(&actual, &dir, allowed, update, read_only)?;
            println!("{}", result.difference);
            if !result.passed {
                bail!(
                    "Difference {} exceeds the allowed {}",
                    result.difference,
                    allowed
                );
            }
            Ok(())
        }
    }
}

fn localize(input: &Path, root: &Path, pretty: bool) -> Result<()> {
    let resolver = ReferenceResolver::new(ResourceRoots::from_root(root));
    let mut document =
        read_json(input).with_context(|| format!("Failed to read {}", input.display()))?;
    resolver.localize_style_urls(&mut document);

    let output = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    println!("{output}");
    Ok(())
}

fn list(
    root: &Path,
    tests: Option<PathBuf>,
    ignores: Option<PathBuf>,
    json: bool,
    seed: Option<u32>,
    names: Vec<String>,
) -> Result<()> {
    let resolver = ReferenceResolver::new(ResourceRoots::from_root(root));
    let tests_root = tests.unwrap_or_else(|| SuiteOptions::from_root(root).tests_root);
    let ignores_path = ignores.unwrap_or_else(|| default_ignores_path(root));
    let ignores = Ignores::from_path(&ignores_path)?;

    let mut paths = discover_tests(&tests_root, &names)
        .with_context(|| format!("Failed to scan {}", tests_root.display()))?;
    if let Some(seed) = seed {
        info!("Shuffle seed: {seed}");
        shuffle_tests(&mut paths, seed);
    }
    info!("Found {} tests in {}", paths.len(), tests_root.display());

    let entries: Vec<ListEntry> = paths
        .iter()
        .map(|path| {
            let name = test_name(&tests_root, path);
            let ignore = ignores.get(&format!("{IGNORE_PREFIX}{name}"));
            let (status, detail) = match ignore {
                Some(entry) if entry.is_skip() => ("skip", Some(entry.reason)),
                ignore => match parse_test_metadata(path, &resolver) {
                    Err(err) => ("error", Some(err.to_string())),
                    Ok(_) => match ignore {
                        Some(entry) => ("ignored", Some(entry.reason)),
                        None => ("ok", None),
                    },
                },
            };
            ListEntry {
                name,
                status,
                detail,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            match &entry.detail {
                Some(detail) => println!("{}\t{}\t{}", entry.name, entry.status, detail),
                None => println!("{}\t{}", entry.name, entry.status),
            }
        }
    }
    Ok(())
}

fn compare(
    actual: &Path,
    dir: &Path,
    allowed: f64,
    update: bool,
    read_only: bool,
) -> Result<ComparisonResult> {
    let actual = image::open(actual)
        .with_context(|| format!("Failed to open {}", actual.display()))?
        .to_rgba8();
    let comparator = ImageComparator::new(update, !read_only);
    let difference = comparator.compare(&actual, dir)?;
    Ok(ComparisonResult::from_difference(difference, allowed))
}
