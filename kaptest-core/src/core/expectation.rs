// kaptest-core/src/core/expectation.rs
// ============================================================================
// Module: Test Expectation Model
// Description: Expected and actual outcomes of a policy evaluation.
// Purpose: Define the inputs and verdict type of the test oracle.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A test expectation captures what the author declared through filenames
//! and sidecar files: the allow/deny decision, and optionally the denial
//! message, warnings, audit annotations, and the expected mutated object.
//! The outcome mirrors it with observed values; the verdict is the
//! oracle's pass/fail decision with a diff-quality failure message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Expectation
// ============================================================================

/// Declared expectation for one test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestExpectation {
    /// Expected admission decision.
    pub allowed: bool,
    /// Expected denial message; empty means "not checked".
    #[serde(default)]
    pub message: String,
    /// Expected warnings in order; empty means "not checked".
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Expected audit annotations, subset-matched by key.
    #[serde(default)]
    pub audit_annotations: BTreeMap<String, String>,
    /// Expected mutated object; `None` means "not checked".
    #[serde(default)]
    pub object: Option<Value>,
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Observed outcome of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Observed admission decision.
    pub allowed: bool,
    /// Observed denial message.
    #[serde(default)]
    pub message: String,
    /// Observed warnings in order.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Observed audit annotations.
    #[serde(default)]
    pub audit_annotations: BTreeMap<String, String>,
    /// Object compared against the expectation: the patched object when a
    /// mutation ran, otherwise the input object.
    #[serde(default)]
    pub object: Option<Value>,
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Oracle verdict for one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVerdict {
    /// True when every declared expectation held.
    pub passed: bool,
    /// Failure explanation or diff; empty on pass.
    #[serde(default)]
    pub message: String,
}

impl TestVerdict {
    /// Constructs a passing verdict.
    #[must_use]
    pub const fn passed() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    /// Constructs a failing verdict with the given message.
    #[must_use]
    pub const fn failed(message: String) -> Self {
        Self {
            passed: false,
            message,
        }
    }
}
