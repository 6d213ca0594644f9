// kaptest-cli/src/main.rs
// ============================================================================
// Module: kaptest CLI Entry Point
// Description: Argument parsing and test run orchestration.
// Purpose: Discover suites, run every test, and report with stable exit codes.
// Dependencies: clap, kaptest-cli, kaptest-core, thiserror
// ============================================================================

//! ## Overview
//! `kaptest [--run PATTERN] [-v] [--json] [--config PATH] [PATH...]`
//! discovers admission policy test suites under the given paths (default
//! `.`), evaluates every test case, and reports results. Exit codes:
//! 0 when all tests pass, 1 when any test fails, 2 for invalid
//! arguments or configuration errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Parser;
use kaptest_cli::config::CliConfig;
use kaptest_cli::loader;
use kaptest_cli::loader::TestSuite;
use kaptest_cli::reporter::OutputFormat;
use kaptest_cli::reporter::Reporter;
use kaptest_cli::runner::run_test;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Test runner for Kubernetes admission policies.
#[derive(Parser, Debug)]
#[command(name = "kaptest", version, about = "Run admission policy tests against local fixtures")]
struct Cli {
    /// Run only tests whose name contains the pattern.
    #[arg(long = "run", value_name = "PATTERN")]
    run: Option<String>,
    /// Print per-test results.
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    verbose: bool,
    /// Emit JSON test events.
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,
    /// Optional config file path (defaults to kaptest.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Test suite paths to load (defaults to the working directory).
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI-level failure: invalid arguments or configuration.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning a stable exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "kaptest: {err}");
            ExitCode::from(2)
        }
    }
}

/// Loads configuration and suites, runs every test, and reports.
fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    let format = select_format(&cli, &config);

    let mut paths = cli.paths;
    if paths.is_empty() {
        paths.push(PathBuf::from("."));
    }

    let mut suites: Vec<TestSuite> = Vec::new();
    for path in &paths {
        let loaded = loader::load(path, cli.run.as_deref()).map_err(|err| {
            CliError::new(format!("load test suites from {}: {err}", path.display()))
        })?;
        suites.extend(loaded);
    }

    let stdout = std::io::stdout().lock();
    let mut reporter = Reporter::new(stdout, format);

    for suite in &suites {
        reporter.start_suite(&suite.name);
        for test in &suite.tests {
            reporter.start_test(&suite.name, &test.name);
            let verdict = run_test(&suite.policies, test);
            reporter.report(&suite.name, &test.name, &verdict);
        }
        reporter.end_suite(&suite.name);
    }

    if reporter.summary() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

/// Chooses the output format: flags win over configuration.
fn select_format(cli: &Cli, config: &CliConfig) -> OutputFormat {
    if cli.json {
        return OutputFormat::Json;
    }
    if cli.verbose {
        return OutputFormat::Verbose;
    }
    config.output.format.map(OutputFormat::from).unwrap_or_default()
}
