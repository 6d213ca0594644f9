// kaptest-cli/src/loader/mod.rs
// ============================================================================
// Module: Test Suite Loader
// Description: Suite discovery and loading by filename convention.
// Purpose: Turn a directory tree into policies, bindings, and test cases.
// Dependencies: crate::loader::{policy, testcase}, thiserror
// ============================================================================

//! ## Overview
//! A directory containing policy files is a test suite; its `tests/`
//! subdirectory holds test cases grouped by base filename. Discovery
//! recurses from the given root, skipping `tests`, `testdata`, and
//! dot-directories. Loading failures that belong to a single test case
//! attach to that case; failures in policies or discovery abort loading.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

pub mod policy;
pub mod testcase;

pub use policy::PolicySet;
pub use testcase::TestCase;

// ============================================================================
// SECTION: Test Suite
// ============================================================================

/// One policy directory with its policies, bindings, and test cases.
#[derive(Debug, Default)]
pub struct TestSuite {
    /// Suite name (the directory basename).
    pub name: String,
    /// Suite directory.
    pub path: PathBuf,
    /// Policies and bindings loaded from the directory.
    pub policies: PolicySet,
    /// Test cases loaded from the `tests/` subdirectory.
    pub tests: Vec<TestCase>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads all test suites reachable from `path`.
///
/// A path that itself contains policy files loads as a single suite;
/// otherwise subdirectories are discovered recursively. `pattern`, when
/// set, keeps only tests whose name contains it; suites left without
/// tests are dropped.
///
/// # Errors
///
/// Returns [`LoadError`] when the tree cannot be read or a policy file
/// is malformed.
pub fn load(path: &Path, pattern: Option<&str>) -> Result<Vec<TestSuite>, LoadError> {
    let mut suites = if has_policy_files(path)? {
        let name = suite_name(path);
        vec![load_suite(path, &name)?]
    } else {
        discover_suites(path)?
    };

    if let Some(pattern) = pattern {
        suites.retain_mut(|suite| {
            suite.tests.retain(|test| test.name.contains(pattern));
            !suite.tests.is_empty()
        });
    }

    Ok(suites)
}

/// Discovers suites in every subdirectory of `root`.
fn discover_suites(root: &Path) -> Result<Vec<TestSuite>, LoadError> {
    let mut suites = Vec::new();
    let mut entries: Vec<PathBuf> = read_dir(root)?
        .into_iter()
        .filter(|entry| entry.is_dir())
        .filter(|entry| !should_skip_dir(entry))
        .collect();
    entries.sort();

    for directory in entries {
        if has_policy_files(&directory)? {
            let name = suite_name(&directory);
            suites.push(load_suite(&directory, &name)?);
        } else {
            suites.extend(discover_suites(&directory)?);
        }
    }

    Ok(suites)
}

/// Loads one suite: its policy set and, when present, its test cases.
fn load_suite(directory: &Path, name: &str) -> Result<TestSuite, LoadError> {
    let policies = policy::load_policy_set(directory)?;

    let tests_dir = directory.join("tests");
    let tests = if tests_dir.is_dir() {
        testcase::load_test_cases(&tests_dir, &policies.policy_names())?
    } else {
        Vec::new()
    };

    Ok(TestSuite {
        name: name.to_string(),
        path: directory.to_path_buf(),
        policies,
        tests,
    })
}

// ============================================================================
// SECTION: Directory Helpers
// ============================================================================

/// Returns true when the directory directly contains policy files.
fn has_policy_files(directory: &Path) -> Result<bool, LoadError> {
    Ok(read_dir(directory)?
        .iter()
        .filter(|entry| entry.is_file())
        .filter_map(|entry| entry.file_name().and_then(|name| name.to_str()))
        .any(policy::is_policy_file))
}

/// Reads directory entries, wrapping I/O failures with the path.
fn read_dir(directory: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(directory).map_err(|err| LoadError::Io {
        path: directory.to_path_buf(),
        detail: err.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| LoadError::Io {
            path: directory.to_path_buf(),
            detail: err.to_string(),
        })?;
        paths.push(entry.path());
    }
    Ok(paths)
}

/// Returns true for directories discovery must not descend into.
fn should_skip_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_none_or(|name| name == "tests" || name == "testdata" || name.starts_with('.'))
}

/// Returns the suite name for a directory.
fn suite_name(path: &Path) -> String {
    path.file_name().and_then(|name| name.to_str()).unwrap_or("suite").to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Test loading failures.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Filesystem read failure.
    #[error("read {path}: {detail}", path = .path.display())]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying diagnostic.
        detail: String,
    },
    /// YAML parse failure.
    #[error("parse {path}: {detail}", path = .path.display())]
    Yaml {
        /// Path that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },
    /// YAML document failed to decode into its declared kind.
    #[error("decode document {index} in {path}: {detail}", path = .path.display())]
    Document {
        /// Path containing the document.
        path: PathBuf,
        /// One-based document index.
        index: usize,
        /// Decoder diagnostic.
        detail: String,
    },
    /// Validating policy or binding declared with the v1beta1 API.
    #[error("v1beta1 {kind} is not supported, use admissionregistration.k8s.io/v1: document {index} in {path}", path = .path.display())]
    UnsupportedV1Beta1 {
        /// Declared kind.
        kind: String,
        /// One-based document index.
        index: usize,
        /// Path containing the document.
        path: PathBuf,
    },
    /// Object input is missing a required field.
    #[error("{field}: {name} is required")]
    MissingObjectField {
        /// Input field being validated (object, oldObject, namespaceObject).
        field: String,
        /// Missing manifest field.
        name: String,
    },
    /// Namespace object is not a v1 Namespace.
    #[error("namespaceObject: expected v1/Namespace, got {got}")]
    NamespaceObjectKind {
        /// Declared apiVersion/kind of the input.
        got: String,
    },
    /// No operation was declared and none could be inferred.
    #[error("cannot infer operation: no object/oldObject files and no explicit operation")]
    CannotInferOperation,
    /// Assembled request violates an operation invariant.
    #[error("invalid request: {detail}")]
    InvalidRequest {
        /// Invariant diagnostic.
        detail: String,
    },
}
