// kaptest-core/tests/validation.rs
// ============================================================================
// Module: Validation Engine Tests
// Description: Pipeline ordering, message rules, and fatal error cases.
// Purpose: Pin the validating path's observable semantics.
// Dependencies: kaptest-core, serde_json, serde_yaml
// ============================================================================
//! ## Overview
//! Exercises the validating path end to end: strict pipeline order,
//! message and messageExpression precedence, audit annotation filtering,
//! the namespace-selector gate, and non-boolean fatalities.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use kaptest_core::AdmissionRequest;
use kaptest_core::EvalError;
use kaptest_core::EvaluationInputs;
use kaptest_core::EvaluationResult;
use kaptest_core::Operation;
use kaptest_core::PolicyCase;
use kaptest_core::ValidatingAdmissionPolicy;
use kaptest_core::ValidatingAdmissionPolicyBinding;
use kaptest_core::evaluate_policy;
use serde_json::Value;
use serde_json::json;

fn pod() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "p", "namespace": "default"},
    })
}

fn request() -> AdmissionRequest {
    AdmissionRequest {
        uid: "test-uid".to_string(),
        name: "p".to_string(),
        namespace: "default".to_string(),
        operation: Some(Operation::Create),
        ..AdmissionRequest::default()
    }
}

fn policy(yaml: &str) -> ValidatingAdmissionPolicy {
    serde_yaml::from_str(yaml).expect("policy yaml")
}

fn evaluate(
    policy: &ValidatingAdmissionPolicy,
    binding: Option<&ValidatingAdmissionPolicyBinding>,
    object: &Value,
    namespace_object: Option<&Value>,
) -> Result<EvaluationResult, EvalError> {
    evaluate_policy(
        &PolicyCase::Validating {
            policy,
            binding,
        },
        &request(),
        &EvaluationInputs {
            object: Some(object),
            namespace_object,
            ..EvaluationInputs::default()
        },
    )
}

#[test]
fn first_failing_validation_stops_the_pipeline() {
    let policy = policy(
        r#"
metadata:
  name: ordered
spec:
  validations:
    - expression: "false"
      message: "first failure"
    - expression: "this would not even compile ((("
      message: "never reached"
"#,
    );

    let result = evaluate(&policy, None, &pod(), None).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.message, "first failure");
}

#[test]
fn message_expression_wins_when_non_blank() {
    let policy = policy(
        r#"
metadata:
  name: dynamic-message
spec:
  validations:
    - expression: "false"
      message: "static message"
      messageExpression: "'pod ' + object.metadata.name + ' rejected'"
"#,
    );

    let result = evaluate(&policy, None, &pod(), None).unwrap();
    assert_eq!(result.message, "pod p rejected");
}

#[test]
fn blank_message_expression_falls_back_to_static_message() {
    let policy = policy(
        r#"
metadata:
  name: blank-dynamic
spec:
  validations:
    - expression: "false"
      message: "static message"
      messageExpression: "'   '"
"#,
    );

    let result = evaluate(&policy, None, &pod(), None).unwrap();
    assert_eq!(result.message, "static message");
}

#[test]
fn non_string_message_expression_falls_back_to_static_message() {
    let policy = policy(
        r#"
metadata:
  name: non-string-dynamic
spec:
  validations:
    - expression: "false"
      message: "static message"
      messageExpression: "42"
"#,
    );

    let result = evaluate(&policy, None, &pod(), None).unwrap();
    assert_eq!(result.message, "static message");
}

#[test]
fn missing_messages_synthesize_one_from_the_expression() {
    let policy = policy(
        r#"
metadata:
  name: no-message
spec:
  validations:
    - expression: "1 > 2"
"#,
    );

    let result = evaluate(&policy, None, &pod(), None).unwrap();
    assert_eq!(result.message, "validation failed: 1 > 2");
}

#[test]
fn audit_annotations_drop_empty_and_non_string_values() {
    let policy = policy(
        r#"
metadata:
  name: annotations
spec:
  auditAnnotations:
    - key: kept
      valueExpression: "'value'"
    - key: empty
      valueExpression: "''"
    - key: numeric
      valueExpression: "7"
  validations:
    - expression: "true"
"#,
    );

    let result = evaluate(&policy, None, &pod(), None).unwrap();
    assert_eq!(result.audit_annotations.len(), 1);
    assert_eq!(result.audit_annotations.get("kept").map(String::as_str), Some("value"));
}

#[test]
fn audit_routing_keeps_annotations_and_hides_the_message() {
    let policy = policy(
        r#"
metadata:
  name: audited
spec:
  auditAnnotations:
    - key: reason
      valueExpression: "'flagged'"
  validations:
    - expression: "false"
      message: "not surfaced"
"#,
    );
    let binding: ValidatingAdmissionPolicyBinding = serde_yaml::from_str(
        r"
metadata:
  name: audit-binding
spec:
  policyName: audited
  validationActions: [Audit]
",
    )
    .unwrap();

    let result = evaluate(&policy, Some(&binding), &pod(), None).unwrap();
    assert!(result.allowed);
    assert!(result.message.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(result.audit_annotations.get("reason").map(String::as_str), Some("flagged"));
}

#[test]
fn namespace_selector_miss_skips_all_evaluation() {
    let policy = policy(
        r#"
metadata:
  name: selector-gated
spec:
  validations:
    - expression: "broken CEL that would be fatal ((("
      message: "unreachable"
"#,
    );
    let binding: ValidatingAdmissionPolicyBinding = serde_yaml::from_str(
        r"
metadata:
  name: prod-only
spec:
  policyName: selector-gated
  matchResources:
    namespaceSelector:
      matchLabels:
        env: prod
",
    )
    .unwrap();
    let namespace = json!({"metadata": {"name": "default", "labels": {"env": "dev"}}});

    let result = evaluate(&policy, Some(&binding), &pod(), Some(&namespace)).unwrap();
    assert!(result.allowed);
}

#[test]
fn namespace_selector_match_lets_validation_run() {
    let policy = policy(
        r#"
metadata:
  name: selector-gated
spec:
  validations:
    - expression: "false"
      message: "denied in prod"
"#,
    );
    let binding: ValidatingAdmissionPolicyBinding = serde_yaml::from_str(
        r"
metadata:
  name: prod-only
spec:
  policyName: selector-gated
  matchResources:
    namespaceSelector:
      matchLabels:
        env: prod
",
    )
    .unwrap();
    let namespace = json!({"metadata": {"name": "default", "labels": {"env": "prod"}}});

    let result = evaluate(&policy, Some(&binding), &pod(), Some(&namespace)).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.message, "denied in prod");
}

#[test]
fn non_boolean_validation_is_fatal() {
    let policy = policy(
        r#"
metadata:
  name: non-boolean
spec:
  validations:
    - expression: "object.metadata.name"
      message: "unused"
"#,
    );

    let err = evaluate(&policy, None, &pod(), None).unwrap_err();
    assert!(matches!(err, EvalError::NonBoolean { .. }));
    assert!(err.to_string().contains("returned non-boolean string"));
}

#[test]
fn non_boolean_match_condition_is_fatal() {
    let policy = policy(
        r#"
metadata:
  name: non-boolean-gate
spec:
  matchConditions:
    - name: wrong-type
      expression: "'text'"
  validations:
    - expression: "true"
"#,
    );

    let err = evaluate(&policy, None, &pod(), None).unwrap_err();
    assert!(err.to_string().contains("match condition \"wrong-type\""));
}

#[test]
fn compile_error_in_validation_is_fatal() {
    let policy = policy(
        r#"
metadata:
  name: broken
spec:
  validations:
    - expression: "((("
      message: "unused"
"#,
    );

    let err = evaluate(&policy, None, &pod(), None).unwrap_err();
    assert!(matches!(err, EvalError::Compile { .. }));
}

#[test]
fn message_expression_error_is_fatal() {
    let policy = policy(
        r#"
metadata:
  name: broken-message
spec:
  validations:
    - expression: "false"
      message: "static"
      messageExpression: "undeclared_variable + ''"
"#,
    );

    let err = evaluate(&policy, None, &pod(), None).unwrap_err();
    assert!(matches!(err, EvalError::Evaluate { .. }));
}
