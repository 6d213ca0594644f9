// kaptest-core/tests/scenarios.rs
// ============================================================================
// Module: End-to-End Evaluation Scenarios
// Description: Full policy evaluations with literal inputs and outputs.
// Purpose: Pin the engine's observable behavior for representative tests.
// Dependencies: kaptest-core, serde_json, serde_yaml
// ============================================================================
//! ## Overview
//! Each scenario evaluates one policy against one request and asserts the
//! literal result: label-check deny, JSONPatch mutation, Warn routing,
//! match-condition skip, parameter-driven deny, and authorizer-gated
//! decisions.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use kaptest_core::AdmissionRequest;
use kaptest_core::EvaluationInputs;
use kaptest_core::GroupVersionKind;
use kaptest_core::GroupVersionResource;
use kaptest_core::MockAuthorizer;
use kaptest_core::MutatingAdmissionPolicy;
use kaptest_core::Operation;
use kaptest_core::PolicyCase;
use kaptest_core::UserInfo;
use kaptest_core::ValidatingAdmissionPolicy;
use kaptest_core::ValidatingAdmissionPolicyBinding;
use kaptest_core::evaluate_policy;
use serde_json::Value;
use serde_json::json;

fn create_request(object: &Value) -> AdmissionRequest {
    let kind = object["kind"].as_str().unwrap_or_default().to_string();
    AdmissionRequest {
        uid: "test-uid".to_string(),
        kind: Some(GroupVersionKind {
            group: String::new(),
            version: "v1".to_string(),
            kind: kind.clone(),
        }),
        resource: Some(GroupVersionResource {
            group: String::new(),
            version: "v1".to_string(),
            resource: format!("{}s", kind.to_lowercase()),
        }),
        name: object["metadata"]["name"].as_str().unwrap_or_default().to_string(),
        namespace: object["metadata"]["namespace"].as_str().unwrap_or_default().to_string(),
        operation: Some(Operation::Create),
        ..AdmissionRequest::default()
    }
}

fn validating(yaml: &str) -> ValidatingAdmissionPolicy {
    serde_yaml::from_str(yaml).expect("policy yaml")
}

fn mutating(yaml: &str) -> MutatingAdmissionPolicy {
    serde_yaml::from_str(yaml).expect("policy yaml")
}

fn binding(yaml: &str) -> ValidatingAdmissionPolicyBinding {
    serde_yaml::from_str(yaml).expect("binding yaml")
}

/// Scenario: a Deployment without an `owner` label is denied with the
/// policy's static message.
#[test]
fn deny_on_missing_owner_label() {
    let policy = validating(
        r#"
metadata:
  name: require-owner
spec:
  validations:
    - expression: "has(object.metadata.labels) && 'owner' in object.metadata.labels"
      message: "All workloads must have an 'owner' label"
"#,
    );
    let object = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "d", "namespace": "default", "labels": {"app": "a"}},
    });

    let result = evaluate_policy(
        &PolicyCase::Validating {
            policy: &policy,
            binding: None,
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();

    assert!(!result.allowed);
    assert_eq!(result.message, "All workloads must have an 'owner' label");
}

/// Scenario: a JSONPatch mutation adds a label; the request is allowed
/// and the patched object carries the new label.
#[test]
fn allow_and_mutate_by_json_patch() {
    let policy = mutating(
        r#"
metadata:
  name: add-matched-label
spec:
  mutations:
    - patchType: JSONPatch
      jsonPatch:
        expression: "[JSONPatch{op: 'add', path: '/metadata/labels/matched', value: 'true'}]"
"#,
    );
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "p", "namespace": "default", "labels": {}},
    });

    let result = evaluate_policy(
        &PolicyCase::Mutating {
            policy: &policy,
            binding: None,
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();

    assert!(result.allowed);
    let patched = result.patched_object.unwrap();
    assert_eq!(patched["metadata"]["labels"], json!({"matched": "true"}));
}

/// Scenario: a failing validation routed through `[Warn]` allows the
/// request and surfaces the message verbatim as the only warning.
#[test]
fn warn_routing_moves_message_into_warnings() {
    let policy = validating(
        r#"
metadata:
  name: warn-policy
spec:
  validations:
    - expression: "false"
      message: "warn me"
"#,
    );
    let warn_binding = binding(
        r"
metadata:
  name: warn-binding
spec:
  policyName: warn-policy
  validationActions: [Warn]
",
    );
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "p", "namespace": "default"},
    });

    let result = evaluate_policy(
        &PolicyCase::Validating {
            policy: &policy,
            binding: Some(&warn_binding),
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();

    assert!(result.allowed);
    assert_eq!(result.warnings, vec!["warn me".to_string()]);
    assert!(result.message.is_empty());
}

/// Scenario: a match condition scoped to the production namespace skips
/// the failing validation for an object in `default`.
#[test]
fn match_condition_skips_policy_for_other_namespaces() {
    let policy = validating(
        r#"
metadata:
  name: production-only
spec:
  matchConditions:
    - name: in-production
      expression: "object.metadata.namespace == 'production'"
  validations:
    - expression: "false"
      message: "never evaluated"
"#,
    );
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "p", "namespace": "default"},
    });

    let result = evaluate_policy(
        &PolicyCase::Validating {
            policy: &policy,
            binding: None,
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();

    assert!(result.allowed);
    assert!(result.warnings.is_empty());
    assert!(result.message.is_empty());
}

/// Scenario: a parameter-driven replica ceiling denies a Deployment that
/// exceeds `params.maxReplicas`.
#[test]
fn params_drive_the_replica_ceiling() {
    let policy = validating(
        r#"
metadata:
  name: replica-ceiling
spec:
  validations:
    - expression: "object.spec.replicas <= params.maxReplicas"
      message: "Replica count exceeds maximum allowed"
"#,
    );
    let object = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "d", "namespace": "default"},
        "spec": {"replicas": 50},
    });
    let params = json!({"maxReplicas": 10});

    let result = evaluate_policy(
        &PolicyCase::Validating {
            policy: &policy,
            binding: None,
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            params: Some(&params),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();

    assert!(!result.allowed);
    assert_eq!(result.message, "Replica count exceeds maximum allowed");
}

/// Scenario: an authorizer-gated validation follows the mock table. The
/// same expression allows with an allow record and denies with a deny
/// record.
#[test]
fn authorizer_mock_flips_the_decision() {
    let policy = validating(
        r#"
metadata:
  name: needs-pod-create
spec:
  validations:
    - expression: "authorizer.group('').resource('pods').namespace(object.metadata.namespace).check('create').allowed()"
      message: "requester may not create pods"
"#,
    );
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "p", "namespace": "default"},
    });
    let user_info = UserInfo {
        username: "dev".to_string(),
        groups: vec!["system:authenticated".to_string()],
        ..UserInfo::default()
    };

    let mut allow_table = MockAuthorizer::default();
    allow_table.allow("", "pods", "", "default", "create");
    let result = evaluate_policy(
        &PolicyCase::Validating {
            policy: &policy,
            binding: None,
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            authorizer: Some(&allow_table),
            user_info: Some(&user_info),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();
    assert!(result.allowed);

    let mut deny_table = MockAuthorizer::default();
    deny_table.deny("", "pods", "", "default", "create");
    let result = evaluate_policy(
        &PolicyCase::Validating {
            policy: &policy,
            binding: None,
        },
        &create_request(&object),
        &EvaluationInputs {
            object: Some(&object),
            authorizer: Some(&deny_table),
            user_info: Some(&user_info),
            ..EvaluationInputs::default()
        },
    )
    .unwrap();
    assert!(!result.allowed);
    assert_eq!(result.message, "requester may not create pods");
}
