// kaptest-cli/src/loader/testcase.rs
// ============================================================================
// Module: Test Case Loader
// Description: Test case assembly from sidecar files by base name.
// Purpose: Turn grouped fixture files into evaluable test cases.
// Dependencies: crate::loader, kaptest-core, serde_yaml
// ============================================================================

//! ## Overview
//! Files in a suite's `tests/` directory group by base name after
//! stripping a well-known suffix: `object.yaml`, `oldObject.yaml`,
//! `request.yaml`, `params.yaml`, `authorizer.yaml`, `gold.yaml`,
//! `annotations.yaml`, `message.txt`, `warnings.txt`. A `.deny.` infix in
//! the base name expects denial; `.warn.`, `.audit.`, `.allow.`, and the
//! default expect an allow. Request metadata is synthesized from the
//! object when `request.yaml` does not override it, and the operation is
//! inferred from which object files exist.
//!
//! Failures that belong to one test case (bad YAML, impossible
//! inference) attach to that case and surface as test-loading failures
//! without aborting the rest of the suite.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use kaptest_core::AdmissionRequest;
use kaptest_core::AuthorizerRecord;
use kaptest_core::GroupVersionKind;
use kaptest_core::GroupVersionResource;
use kaptest_core::Operation;
use kaptest_core::TestExpectation;
use kaptest_core::UserInfo;
use serde::Deserialize;
use serde_json::Value;

use crate::loader::LoadError;

// ============================================================================
// SECTION: Test Case
// ============================================================================

/// One evaluable test case assembled from fixture files.
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    /// Test name (the grouped base name).
    pub name: String,
    /// Name of the policy this test targets.
    pub policy_name: String,
    /// Synthesized admission request.
    pub request: AdmissionRequest,
    /// Incoming object.
    pub object: Option<Value>,
    /// Prior object state.
    pub old_object: Option<Value>,
    /// Policy parameters.
    pub params: Option<Value>,
    /// Namespace object.
    pub namespace_object: Option<Value>,
    /// Requesting user identity.
    pub user_info: Option<UserInfo>,
    /// Mock authorizer records.
    pub authorizer: Vec<AuthorizerRecord>,
    /// Declared expectation.
    pub expectation: TestExpectation,
    /// Loading failure attached to this case, if any.
    pub error: Option<String>,
}

// ============================================================================
// SECTION: File Grouping
// ============================================================================

/// Known sidecar suffixes, stripped to form the group base name.
const SUFFIXES: &[&str] = &[
    ".object.yaml",
    ".oldObject.yaml",
    ".request.yaml",
    ".params.yaml",
    ".authorizer.yaml",
    ".gold.yaml",
    ".annotations.yaml",
    ".message.txt",
    ".warnings.txt",
];

/// Loads every test case from a `tests/` directory.
///
/// # Errors
///
/// Returns [`LoadError`] when the directory cannot be read; per-case
/// failures attach to the returned cases instead.
pub fn load_test_cases(directory: &Path, policy_names: &[String]) -> Result<Vec<TestCase>, LoadError> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    let entries = fs::read_dir(directory).map_err(|err| LoadError::Io {
        path: directory.to_path_buf(),
        detail: err.to_string(),
    })?;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some(base) = base_name(name) {
            groups.entry(base.to_string()).or_default().push(path);
        }
    }

    let mut cases = Vec::with_capacity(groups.len());
    for (base, mut files) in groups {
        files.sort();
        cases.push(build_test_case(&base, &files, policy_names));
    }
    Ok(cases)
}

/// Strips a known suffix, returning the base name for grouping.
fn base_name(file_name: &str) -> Option<&str> {
    SUFFIXES.iter().find_map(|suffix| file_name.strip_suffix(suffix))
}

// ============================================================================
// SECTION: Case Assembly
// ============================================================================

/// Builds one test case from its grouped files.
fn build_test_case(base: &str, files: &[PathBuf], policy_names: &[String]) -> TestCase {
    let mut case = TestCase {
        name: base.to_string(),
        policy_name: match_policy_name(base, policy_names),
        expectation: TestExpectation {
            allowed: expected_allowed(base),
            ..TestExpectation::default()
        },
        ..TestCase::default()
    };

    let mut simplified: Option<SimplifiedRequest> = None;
    for path in files {
        if let Err(err) = parse_file(&mut case, &mut simplified, path) {
            case.error = Some(err.to_string());
            return case;
        }
    }

    if let Err(err) = assemble_request(&mut case, simplified) {
        case.error = Some(err.to_string());
    }

    case
}

/// Parses one fixture file into the case under assembly.
fn parse_file(
    case: &mut TestCase,
    simplified: &mut Option<SimplifiedRequest>,
    path: &Path,
) -> Result<(), LoadError> {
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();

    if name.ends_with(".object.yaml") {
        let object: Value = parse_yaml(path)?;
        validate_object(&object, "object")?;
        case.object = Some(object);
    } else if name.ends_with(".oldObject.yaml") {
        let object: Value = parse_yaml(path)?;
        validate_object(&object, "oldObject")?;
        case.old_object = Some(object);
    } else if name.ends_with(".request.yaml") {
        *simplified = Some(parse_yaml(path)?);
    } else if name.ends_with(".params.yaml") {
        case.params = Some(parse_yaml(path)?);
    } else if name.ends_with(".authorizer.yaml") {
        case.authorizer = parse_yaml(path)?;
    } else if name.ends_with(".gold.yaml") {
        case.expectation.object = Some(parse_yaml(path)?);
    } else if name.ends_with(".annotations.yaml") {
        case.expectation.audit_annotations = parse_yaml(path)?;
    } else if name.ends_with(".message.txt") {
        case.expectation.message = read_text(path)?.trim().to_string();
    } else if name.ends_with(".warnings.txt") {
        case.expectation.warnings = read_text(path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
    }

    Ok(())
}

/// Simplified `request.yaml` format overriding request metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimplifiedRequest {
    #[serde(default)]
    operation: Option<Operation>,
    #[serde(default)]
    sub_resource: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    namespace_object: Option<Value>,
    #[serde(default)]
    user_info: Option<UserInfo>,
    #[serde(default)]
    object: Option<Value>,
    #[serde(default)]
    old_object: Option<Value>,
    #[serde(default)]
    options: Option<Value>,
}

/// Assembles the admission request from the parsed pieces.
fn assemble_request(case: &mut TestCase, simplified: Option<SimplifiedRequest>) -> Result<(), LoadError> {
    let mut request = AdmissionRequest {
        uid: format!("test-{}", case.name),
        ..AdmissionRequest::default()
    };

    if let Some(simplified) = simplified {
        if let Some(object) = simplified.object {
            validate_object(&object, "object")?;
            case.object = Some(object);
        }
        if let Some(old_object) = simplified.old_object {
            validate_object(&old_object, "oldObject")?;
            case.old_object = Some(old_object);
        }
        if let Some(namespace_object) = simplified.namespace_object {
            validate_namespace_object(&namespace_object)?;
            case.namespace_object = Some(namespace_object);
        }
        if let Some(user_info) = simplified.user_info {
            request.user_info = Some(user_info.clone());
            case.user_info = Some(user_info);
        }
        request.operation = simplified.operation;
        request.sub_resource = simplified.sub_resource;
        request.name = simplified.name;
        request.namespace = simplified.namespace;
        request.options = simplified.options;
    }

    infer_from_object(&mut request, case.object.as_ref().or(case.old_object.as_ref()));

    if request.operation.is_none() {
        request.operation = Some(infer_operation(case.object.is_some(), case.old_object.is_some())?);
    }

    request
        .validate(case.object.is_some(), case.old_object.is_some())
        .map_err(|err| LoadError::InvalidRequest {
            detail: err.to_string(),
        })?;

    case.request = request;
    Ok(())
}

/// Fills unset request metadata from the primary object.
fn infer_from_object(request: &mut AdmissionRequest, object: Option<&Value>) {
    let Some(object) = object else {
        return;
    };

    let api_version = object.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };

    if request.kind.is_none() && !kind.is_empty() {
        request.kind = Some(GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        });
    }
    if request.resource.is_none() && !kind.is_empty() {
        request.resource = Some(GroupVersionResource {
            group: group.to_string(),
            version: version.to_string(),
            resource: kind_to_resource(kind),
        });
    }

    let metadata = object.get("metadata");
    if request.name.is_empty()
        && let Some(name) = metadata.and_then(|meta| meta.get("name")).and_then(Value::as_str)
    {
        request.name = name.to_string();
    }
    if request.namespace.is_empty()
        && let Some(namespace) =
            metadata.and_then(|meta| meta.get("namespace")).and_then(Value::as_str)
    {
        request.namespace = namespace.to_string();
    }
}

// ============================================================================
// SECTION: Inference Rules
// ============================================================================

/// Infers the operation from which object files are present.
fn infer_operation(has_object: bool, has_old_object: bool) -> Result<Operation, LoadError> {
    match (has_object, has_old_object) {
        (true, false) => Ok(Operation::Create),
        (false, true) => Ok(Operation::Delete),
        (true, true) => Ok(Operation::Update),
        (false, false) => Err(LoadError::CannotInferOperation),
    }
}

/// Derives the resource name for a kind: the lowercased kind plus "s".
fn kind_to_resource(kind: &str) -> String {
    format!("{}s", kind.to_lowercase())
}

/// Matches the test's policy by base-name prefix; a suite with a single
/// policy claims every test.
fn match_policy_name(base: &str, policy_names: &[String]) -> String {
    for name in policy_names {
        if base.starts_with(&format!("{name}.")) {
            return name.clone();
        }
    }
    if let [only] = policy_names {
        return only.clone();
    }
    String::new()
}

/// Reads the expected decision from the base name: a `.deny.` infix or
/// `.deny` suffix expects denial, everything else expects an allow.
fn expected_allowed(base: &str) -> bool {
    !(base.contains(".deny.") || base.ends_with(".deny"))
}

// ============================================================================
// SECTION: Input Validation
// ============================================================================

/// Requires `apiVersion` and `kind` on object-shaped inputs.
fn validate_object(object: &Value, field: &str) -> Result<(), LoadError> {
    for name in ["apiVersion", "kind"] {
        let present = object.get(name).and_then(Value::as_str).is_some_and(|text| !text.is_empty());
        if !present {
            return Err(LoadError::MissingObjectField {
                field: field.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Requires the namespace object to be a v1 Namespace.
fn validate_namespace_object(object: &Value) -> Result<(), LoadError> {
    validate_object(object, "namespaceObject")?;
    let api_version = object.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    if api_version != "v1" || kind != "Namespace" {
        return Err(LoadError::NamespaceObjectKind {
            got: format!("{api_version}/{kind}"),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Parses a YAML file into the requested type.
fn parse_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = read_text(path)?;
    serde_yaml::from_str(&text).map_err(|err| LoadError::Yaml {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

/// Reads a file to a string with path-tagged errors.
fn read_text(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|err| LoadError::Io {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_names_strip_every_known_suffix() {
        assert_eq!(base_name("p.case.object.yaml"), Some("p.case"));
        assert_eq!(base_name("p.case.oldObject.yaml"), Some("p.case"));
        assert_eq!(base_name("p.case.request.yaml"), Some("p.case"));
        assert_eq!(base_name("p.case.gold.yaml"), Some("p.case"));
        assert_eq!(base_name("p.case.message.txt"), Some("p.case"));
        assert_eq!(base_name("p.case.warnings.txt"), Some("p.case"));
        assert_eq!(base_name("README.md"), None);
    }

    #[test]
    fn deny_infix_expects_denial() {
        assert!(!expected_allowed("policy.bad-pod.deny"));
        assert!(!expected_allowed("policy.deny.missing-label"));
        assert!(expected_allowed("policy.good-pod.allow"));
        assert!(expected_allowed("policy.warn.case"));
        assert!(expected_allowed("policy.audit.case"));
        assert!(expected_allowed("policy.plain"));
    }

    #[test]
    fn operation_inference_follows_file_presence() {
        assert_eq!(infer_operation(true, false).unwrap(), Operation::Create);
        assert_eq!(infer_operation(false, true).unwrap(), Operation::Delete);
        assert_eq!(infer_operation(true, true).unwrap(), Operation::Update);
        assert!(matches!(infer_operation(false, false), Err(LoadError::CannotInferOperation)));
    }

    #[test]
    fn resource_names_are_the_lowercased_kind_plus_s() {
        assert_eq!(kind_to_resource("Pod"), "pods");
        assert_eq!(kind_to_resource("Deployment"), "deployments");
        assert_eq!(kind_to_resource("NetworkPolicy"), "networkpolicys");
        assert_eq!(kind_to_resource("Ingress"), "ingresss");
    }

    #[test]
    fn policy_matching_prefers_prefix_then_single_policy() {
        let names = vec!["require-owner".to_string(), "limits".to_string()];
        assert_eq!(match_policy_name("require-owner.case", &names), "require-owner");
        assert_eq!(match_policy_name("limits.case.deny", &names), "limits");
        assert_eq!(match_policy_name("unrelated.case", &names), "");

        let single = vec!["only".to_string()];
        assert_eq!(match_policy_name("anything", &single), "only");
    }

    #[test]
    fn namespace_objects_must_be_v1_namespaces() {
        let good = serde_json::json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "ns"}});
        assert!(validate_namespace_object(&good).is_ok());

        let bad = serde_json::json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}});
        assert!(matches!(
            validate_namespace_object(&bad),
            Err(LoadError::NamespaceObjectKind { .. })
        ));
    }
}
