// kaptest-core/src/runtime/oracle.rs
// ============================================================================
// Module: Test Oracle
// Description: Expectation-vs-outcome comparison with diff rendering.
// Purpose: Produce the pass/fail verdict for one evaluated test case.
// Dependencies: crate::core::expectation, crate::runtime::diff, serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! The oracle compares an evaluation outcome against the declared
//! expectation in a fixed order: decision, audit annotations, warnings,
//! message, mutated object. The first failed rule renders the verdict
//! message; textual mismatches render as unified diffs and object
//! mismatches as unified YAML diffs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::core::expectation::TestExpectation;
use crate::core::expectation::TestOutcome;
use crate::core::expectation::TestVerdict;
use crate::runtime::diff::unified_diff;

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Compares an outcome against the expectation.
///
/// Rules apply in order; the first mismatch produces the failing verdict
/// and later rules are not consulted.
#[must_use]
pub fn compare(expected: &TestExpectation, actual: &TestOutcome) -> TestVerdict {
    if actual.allowed != expected.allowed {
        return TestVerdict::failed(format!(
            "expected allowed={}, got allowed={}",
            expected.allowed, actual.allowed
        ));
    }

    if let Some(verdict) = check_audit_annotations(&expected.audit_annotations, &actual.audit_annotations) {
        return verdict;
    }

    if let Some(verdict) = check_warnings(&expected.warnings, &actual.warnings) {
        return verdict;
    }

    if !expected.message.is_empty() && actual.message != expected.message {
        let diff = unified_diff(&expected.message, &actual.message);
        return TestVerdict::failed(format!("message does not match expected:\n{diff}"));
    }

    if let Some(verdict) = check_mutated_object(expected.object.as_ref(), actual.object.as_ref()) {
        return verdict;
    }

    TestVerdict::passed()
}

// ============================================================================
// SECTION: Audit Annotations
// ============================================================================

/// Subset-matches audit annotations: every expected key must be present
/// with the exact value; extra actual keys are ignored.
fn check_audit_annotations(
    expected: &BTreeMap<String, String>,
    actual: &BTreeMap<String, String>,
) -> Option<TestVerdict> {
    if expected.is_empty() {
        return None;
    }

    let filtered: BTreeMap<String, String> = expected
        .keys()
        .filter_map(|key| actual.get(key).map(|value| (key.clone(), value.clone())))
        .collect();

    if &filtered == expected {
        return None;
    }

    let diff = unified_diff(&render_yaml_map(expected), &render_yaml_map(&filtered));
    Some(TestVerdict::failed(format!("audit annotations do not match expected:\n{diff}")))
}

// ============================================================================
// SECTION: Warnings
// ============================================================================

/// Requires full-sequence equality of warnings when any are expected.
fn check_warnings(expected: &[String], actual: &[String]) -> Option<TestVerdict> {
    if expected.is_empty() {
        return None;
    }

    if actual.is_empty() {
        return Some(TestVerdict::failed(format!("expected warnings {expected:?}, got none")));
    }

    if actual.len() != expected.len() {
        return Some(TestVerdict::failed(format!(
            "expected {} warnings, got {}",
            expected.len(),
            actual.len()
        )));
    }

    for (index, (expected_warning, actual_warning)) in expected.iter().zip(actual).enumerate() {
        if actual_warning != expected_warning {
            let diff = unified_diff(expected_warning, actual_warning);
            return Some(TestVerdict::failed(format!(
                "warning[{index}] does not match expected:\n{diff}"
            )));
        }
    }

    None
}

// ============================================================================
// SECTION: Mutated Object
// ============================================================================

/// Deep-compares the mutated object against the expectation.
fn check_mutated_object(expected: Option<&JsonValue>, actual: Option<&JsonValue>) -> Option<TestVerdict> {
    let expected = expected?;

    let Some(actual) = actual else {
        return Some(TestVerdict::failed("expected mutated object, got none".to_string()));
    };

    if actual == expected {
        return None;
    }

    let diff = unified_diff(&render_yaml(expected), &render_yaml(actual));
    Some(TestVerdict::failed(format!("mutated object does not match expected:\n{diff}")))
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a JSON value as YAML for diffing.
fn render_yaml(value: &JsonValue) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Renders a string map as YAML for diffing.
fn render_yaml_map(map: &BTreeMap<String, String>) -> String {
    serde_yaml::to_string(map).unwrap_or_else(|_| format!("{map:?}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
