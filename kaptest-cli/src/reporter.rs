// kaptest-cli/src/reporter.rs
// ============================================================================
// Module: Test Reporter
// Description: Default, verbose, and JSON test-result output.
// Purpose: Render suite progress and totals in go-test style.
// Dependencies: chrono, kaptest-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The default format stays quiet for passing suites and prints an
//! `ok`/`FAIL` line per suite plus indented failure messages. Verbose
//! mode adds `=== RUN` / `--- PASS` lines per test. JSON mode emits one
//! event object per line in the manner of `go test -json`. Write errors
//! on the output stream are ignored; reporting must never fail the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::time::Instant;

use chrono::SecondsFormat;
use chrono::Utc;
use kaptest_core::TestVerdict;
use serde::Serialize;

// ============================================================================
// SECTION: Output Format
// ============================================================================

/// Output format for test results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Summary per suite, failures only (like `go test`).
    #[default]
    Default,
    /// Per-test RUN/PASS/FAIL lines (like `go test -v`).
    Verbose,
    /// One JSON event per line (like `go test -json`).
    Json,
}

// ============================================================================
// SECTION: JSON Events
// ============================================================================

/// One JSON test event.
#[derive(Debug, Serialize)]
struct TestEvent<'a> {
    /// Event timestamp in RFC 3339 form.
    time: String,
    /// Event action: run, pass, fail, or output.
    action: &'a str,
    /// Suite name.
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<&'a str>,
    /// Test name.
    #[serde(skip_serializing_if = "Option::is_none")]
    test: Option<&'a str>,
    /// Elapsed seconds for pass/fail events.
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed: Option<f64>,
    /// Failure output for output events.
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

// ============================================================================
// SECTION: Reporter
// ============================================================================

/// Formats and accumulates test results for one run.
pub struct Reporter<W: Write> {
    /// Output stream.
    out: W,
    /// Selected output format.
    format: OutputFormat,
    /// Totals across all suites.
    total: usize,
    passed: usize,
    failed: usize,
    /// Run start time.
    run_start: Instant,
    /// Current suite state.
    suite_start: Instant,
    suite_failed: usize,
    test_start: Instant,
    first_failure_in_suite: bool,
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to `out` in the given format.
    pub fn new(out: W, format: OutputFormat) -> Self {
        let now = Instant::now();
        Self {
            out,
            format,
            total: 0,
            passed: 0,
            failed: 0,
            run_start: now,
            suite_start: now,
            suite_failed: 0,
            test_start: now,
            first_failure_in_suite: true,
        }
    }

    /// Reports the start of a suite.
    pub fn start_suite(&mut self, suite: &str) {
        self.suite_start = Instant::now();
        self.suite_failed = 0;
        self.first_failure_in_suite = true;

        match self.format {
            OutputFormat::Verbose => {
                let _ = writeln!(self.out, "\n=== RUN   {suite}");
            }
            OutputFormat::Json => self.emit(TestEvent {
                time: timestamp(),
                action: "run",
                package: Some(suite),
                test: None,
                elapsed: None,
                output: None,
            }),
            OutputFormat::Default => {}
        }
    }

    /// Reports the start of an individual test.
    pub fn start_test(&mut self, suite: &str, test: &str) {
        self.total += 1;
        self.test_start = Instant::now();

        match self.format {
            OutputFormat::Verbose => {
                let _ = writeln!(self.out, "=== RUN   {suite}/{test}");
            }
            OutputFormat::Json => self.emit(TestEvent {
                time: timestamp(),
                action: "run",
                package: Some(suite),
                test: Some(test),
                elapsed: None,
                output: None,
            }),
            OutputFormat::Default => {}
        }
    }

    /// Reports a verdict for the current test.
    pub fn report(&mut self, suite: &str, test: &str, verdict: &TestVerdict) {
        if verdict.passed {
            self.report_pass(suite, test);
        } else {
            self.report_fail(suite, test, &verdict.message);
        }
    }

    /// Reports the end of a suite.
    pub fn end_suite(&mut self, suite: &str) {
        let elapsed = self.suite_start.elapsed().as_secs_f64();

        match self.format {
            OutputFormat::Default => {
                if self.suite_failed > 0 {
                    let _ = writeln!(self.out, "FAIL\t{suite}\t{elapsed:.3}s");
                } else {
                    let _ = writeln!(self.out, "ok  \t{suite}\t{elapsed:.3}s");
                }
            }
            OutputFormat::Json => {
                let action = if self.suite_failed > 0 { "fail" } else { "pass" };
                self.emit(TestEvent {
                    time: timestamp(),
                    action,
                    package: Some(suite),
                    test: None,
                    elapsed: Some(elapsed),
                    output: None,
                });
            }
            OutputFormat::Verbose => {}
        }
    }

    /// Prints the final summary; returns true when every test passed.
    pub fn summary(&mut self) -> bool {
        let elapsed = self.run_start.elapsed().as_secs_f64();

        match self.format {
            OutputFormat::Verbose => {
                if self.failed > 0 {
                    let _ = writeln!(self.out, "FAIL");
                } else {
                    let _ = writeln!(self.out, "PASS");
                }
            }
            OutputFormat::Json => {
                let action = if self.failed > 0 { "fail" } else { "pass" };
                self.emit(TestEvent {
                    time: timestamp(),
                    action,
                    package: None,
                    test: None,
                    elapsed: Some(elapsed),
                    output: None,
                });
            }
            OutputFormat::Default => {}
        }

        self.failed == 0
    }

    /// Returns the run totals: (total, passed, failed).
    #[must_use]
    pub const fn stats(&self) -> (usize, usize, usize) {
        (self.total, self.passed, self.failed)
    }

    fn report_pass(&mut self, suite: &str, test: &str) {
        self.passed += 1;
        let elapsed = self.test_start.elapsed().as_secs_f64();

        match self.format {
            OutputFormat::Verbose => {
                let _ = writeln!(self.out, "--- PASS: {suite}/{test} ({elapsed:.2}s)");
            }
            OutputFormat::Json => self.emit(TestEvent {
                time: timestamp(),
                action: "pass",
                package: Some(suite),
                test: Some(test),
                elapsed: Some(elapsed),
                output: None,
            }),
            OutputFormat::Default => {}
        }
    }

    fn report_fail(&mut self, suite: &str, test: &str, message: &str) {
        self.failed += 1;
        self.suite_failed += 1;
        let elapsed = self.test_start.elapsed().as_secs_f64();
        let message = message.trim_end();

        match self.format {
            OutputFormat::Verbose => {
                let _ = writeln!(self.out, "--- FAIL: {suite}/{test} ({elapsed:.2}s)");
                self.print_indented(message);
            }
            OutputFormat::Json => {
                self.emit(TestEvent {
                    time: timestamp(),
                    action: "output",
                    package: Some(suite),
                    test: Some(test),
                    elapsed: None,
                    output: Some(format!("{message}\n")),
                });
                self.emit(TestEvent {
                    time: timestamp(),
                    action: "fail",
                    package: Some(suite),
                    test: Some(test),
                    elapsed: Some(elapsed),
                    output: None,
                });
            }
            OutputFormat::Default => {
                if self.first_failure_in_suite {
                    self.first_failure_in_suite = false;
                    let _ = writeln!(self.out);
                }
                let _ = writeln!(self.out, "--- FAIL: {suite}/{test} ({elapsed:.2}s)");
                self.print_indented(message);
            }
        }
    }

    fn print_indented(&mut self, message: &str) {
        for line in message.lines() {
            if line.is_empty() {
                let _ = writeln!(self.out);
            } else {
                let _ = writeln!(self.out, "    {line}");
            }
        }
    }

    fn emit(&mut self, event: TestEvent<'_>) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(self.out, "{line}");
        }
    }
}

/// Current wall-clock time in RFC 3339 form.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
