// kaptest-core/src/runtime/evaluator.rs
// ============================================================================
// Module: Policy Evaluator
// Description: Top-level evaluation of one policy against one request.
// Purpose: Gate on the binding, dispatch to the right engine, and return a result.
// Dependencies: crate::core, crate::runtime, serde_json
// ============================================================================

//! ## Overview
//! The evaluator is the single entry point for the engine: it runs the
//! binding's namespace-selector gate, projects the request, builds the
//! expression environment, and dispatches to the validating or mutating
//! engine. Evaluation is stateless and deterministic: identical inputs
//! produce identical results, and the caller's objects are never
//! modified.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::core::binding::MutatingAdmissionPolicyBinding;
use crate::core::binding::ValidatingAdmissionPolicyBinding;
use crate::core::policy::MutatingAdmissionPolicy;
use crate::core::policy::ValidatingAdmissionPolicy;
use crate::core::request::AdmissionRequest;
use crate::core::request::UserInfo;
use crate::core::selector::LabelSelector;
use crate::runtime::authorizer::MockAuthorizer;
use crate::runtime::cel::EvalError;
use crate::runtime::cel::ExpressionEnv;
use crate::runtime::cel::VariableBag;
use crate::runtime::mutation::apply_mutations;
use crate::runtime::projection::project_request;
use crate::runtime::validation::evaluate_match_conditions;
use crate::runtime::validation::evaluate_validating;

// ============================================================================
// SECTION: Evaluation Result
// ============================================================================

/// Outcome of evaluating one policy against one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    /// Admission decision.
    pub allowed: bool,
    /// Denial message; empty unless a Deny-routed validation failed.
    pub message: String,
    /// Warnings surfaced by Warn-routed validation failures, in order.
    pub warnings: Vec<String>,
    /// Patched object; `None` when no mutation ran.
    pub patched_object: Option<JsonValue>,
    /// Audit annotations keyed by annotation key.
    pub audit_annotations: BTreeMap<String, String>,
}

impl EvaluationResult {
    /// Constructs an allow result with no further detail.
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// SECTION: Policy Case
// ============================================================================

/// Policy and binding under evaluation.
#[derive(Debug, Clone, Copy)]
pub enum PolicyCase<'a> {
    /// A validating policy with its optional binding.
    Validating {
        /// Policy under evaluation.
        policy: &'a ValidatingAdmissionPolicy,
        /// Binding activating the policy.
        binding: Option<&'a ValidatingAdmissionPolicyBinding>,
    },
    /// A mutating policy with its optional binding.
    Mutating {
        /// Policy under evaluation.
        policy: &'a MutatingAdmissionPolicy,
        /// Binding activating the policy.
        binding: Option<&'a MutatingAdmissionPolicyBinding>,
    },
}

/// Context supplied alongside the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationInputs<'a> {
    /// Incoming object; absent for DELETE and CONNECT.
    pub object: Option<&'a JsonValue>,
    /// Prior object state; absent for CREATE and CONNECT.
    pub old_object: Option<&'a JsonValue>,
    /// Policy parameters supplied by the caller.
    pub params: Option<&'a JsonValue>,
    /// Namespace object of the request's namespace.
    pub namespace_object: Option<&'a JsonValue>,
    /// Mock authorization table.
    pub authorizer: Option<&'a MockAuthorizer>,
    /// Requesting user identity.
    pub user_info: Option<&'a UserInfo>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates one policy (with its binding) against one admission request.
///
/// # Errors
///
/// Returns [`EvalError`] for fatal evaluator failures: compile or runtime
/// expression errors, non-boolean guards, malformed patches, or a
/// mutating evaluation without an object. A policy-level deny is a
/// successful result, never an error.
pub fn evaluate_policy(
    case: &PolicyCase<'_>,
    request: &AdmissionRequest,
    inputs: &EvaluationInputs<'_>,
) -> Result<EvaluationResult, EvalError> {
    let selector = match case {
        PolicyCase::Validating {
            binding, ..
        } => binding
            .and_then(|binding| binding.spec.match_resources.as_ref())
            .and_then(|resources| resources.namespace_selector.as_ref()),
        PolicyCase::Mutating {
            binding, ..
        } => binding
            .and_then(|binding| binding.spec.match_resources.as_ref())
            .and_then(|resources| resources.namespace_selector.as_ref()),
    };

    if !namespace_selector_matches(selector, inputs.namespace_object) {
        return Ok(EvaluationResult::allowed());
    }

    let projected = project_request(request);
    let bag = VariableBag {
        object: inputs.object,
        old_object: inputs.old_object,
        request: &projected,
        params: inputs.params,
        namespace_object: inputs.namespace_object,
    };

    match case {
        PolicyCase::Validating {
            policy,
            binding,
        } => {
            let env = build_env(&bag, inputs);
            evaluate_validating(&env, policy, *binding)
        }
        PolicyCase::Mutating {
            policy, ..
        } => {
            let Some(primary) = inputs.object.or(inputs.old_object) else {
                return Err(EvalError::MissingObject);
            };
            let env = build_env(&bag, inputs);

            if !evaluate_match_conditions(&env, &policy.spec.match_conditions)? {
                return Ok(EvaluationResult::allowed());
            }

            if policy.spec.mutations.is_empty() {
                return Ok(EvaluationResult::allowed());
            }

            let patched = apply_mutations(&env, &policy.spec.mutations, primary)?;
            Ok(EvaluationResult {
                allowed: true,
                patched_object: Some(patched),
                ..EvaluationResult::default()
            })
        }
    }
}

/// Builds the expression environment for the evaluation.
fn build_env(bag: &VariableBag<'_>, inputs: &EvaluationInputs<'_>) -> ExpressionEnv {
    let authorizer = inputs.authorizer.map(|authorizer| Arc::new(authorizer.clone()));
    let has_user_info = inputs.user_info.is_some_and(|user_info| !user_info.is_empty());
    ExpressionEnv::new(bag, authorizer, has_user_info)
}

// ============================================================================
// SECTION: Namespace Gate
// ============================================================================

/// Applies the binding's namespace selector to the namespace object.
///
/// A missing binding, missing selector, empty selector, or missing
/// namespace object all pass the gate; otherwise the selector must match
/// the namespace object's labels.
#[must_use]
pub fn namespace_selector_matches(
    selector: Option<&LabelSelector>,
    namespace_object: Option<&JsonValue>,
) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    if selector.is_empty() {
        return true;
    }
    let Some(namespace_object) = namespace_object else {
        return true;
    };

    selector.matches(&namespace_labels(namespace_object))
}

/// Extracts the string-valued labels of a namespace object.
fn namespace_labels(namespace_object: &JsonValue) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    if let Some(JsonValue::Object(fields)) =
        namespace_object.get("metadata").and_then(|metadata| metadata.get("labels")).map(Clone::clone)
    {
        for (key, value) in fields {
            if let JsonValue::String(text) = value {
                labels.insert(key, text);
            }
        }
    }
    labels
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_selector_passes_the_gate() {
        assert!(namespace_selector_matches(None, None));
        assert!(namespace_selector_matches(None, Some(&json!({}))));
    }

    #[test]
    fn empty_selector_passes_the_gate() {
        let selector = LabelSelector::default();
        assert!(namespace_selector_matches(Some(&selector), Some(&json!({}))));
    }

    #[test]
    fn missing_namespace_object_passes_the_gate() {
        let selector: LabelSelector = serde_yaml::from_str("matchLabels: {env: prod}").unwrap();
        assert!(namespace_selector_matches(Some(&selector), None));
    }

    #[test]
    fn selector_matches_namespace_labels() {
        let selector: LabelSelector = serde_yaml::from_str("matchLabels: {env: prod}").unwrap();
        let prod = json!({"metadata": {"name": "ns", "labels": {"env": "prod"}}});
        let staging = json!({"metadata": {"name": "ns", "labels": {"env": "staging"}}});

        assert!(namespace_selector_matches(Some(&selector), Some(&prod)));
        assert!(!namespace_selector_matches(Some(&selector), Some(&staging)));
    }

    #[test]
    fn non_string_labels_are_ignored() {
        let labels = namespace_labels(&json!({"metadata": {"labels": {"a": "x", "b": 3}}}));
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("a").map(String::as_str), Some("x"));
    }
}
