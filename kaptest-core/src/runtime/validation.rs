// kaptest-core/src/runtime/validation.rs
// ============================================================================
// Module: Validation Engine
// Description: Match conditions, audit annotations, and validation rules.
// Purpose: Produce the admission decision for a validating policy.
// Dependencies: crate::core, crate::runtime::cel, cel-interpreter
// ============================================================================

//! ## Overview
//! Validating evaluation runs in strict order: match conditions, audit
//! annotations, then validations. A false match condition short-circuits
//! to an allow; audit annotations are recorded whether or not a
//! validation later fails; the first failing validation routes through
//! the binding's validation actions (Deny, Warn, or Audit).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use cel_interpreter::Value as CelValue;

use crate::core::binding::ValidatingAdmissionPolicyBinding;
use crate::core::binding::ValidationAction;
use crate::core::policy::AuditAnnotation;
use crate::core::policy::MatchCondition;
use crate::core::policy::ValidatingAdmissionPolicy;
use crate::core::policy::Validation;
use crate::runtime::cel::EvalError;
use crate::runtime::cel::ExpressionEnv;
use crate::runtime::evaluator::EvaluationResult;

// ============================================================================
// SECTION: Validating Evaluation
// ============================================================================

/// Evaluates a validating policy against the prepared environment.
///
/// The namespace-selector gate has already run; this covers match
/// conditions, audit annotations, validations, and failure routing.
///
/// # Errors
///
/// Returns [`EvalError`] when any expression fails to compile or
/// evaluate, or when a boolean-typed expression yields another type.
pub fn evaluate_validating(
    env: &ExpressionEnv,
    policy: &ValidatingAdmissionPolicy,
    binding: Option<&ValidatingAdmissionPolicyBinding>,
) -> Result<EvaluationResult, EvalError> {
    if !evaluate_match_conditions(env, &policy.spec.match_conditions)? {
        return Ok(EvaluationResult::allowed());
    }

    let audit_annotations = evaluate_audit_annotations(env, &policy.spec.audit_annotations)?;

    for validation in &policy.spec.validations {
        let context = format!("validation {:?}", validation.expression);
        if !env.evaluate_bool(&validation.expression, &context)? {
            return handle_validation_failure(env, validation, binding, audit_annotations);
        }
    }

    Ok(EvaluationResult {
        audit_annotations,
        ..EvaluationResult::allowed()
    })
}

// ============================================================================
// SECTION: Match Conditions
// ============================================================================

/// Evaluates match conditions in order; returns false on the first miss.
///
/// # Errors
///
/// Returns [`EvalError`] when a condition fails to evaluate or yields a
/// non-boolean.
pub fn evaluate_match_conditions(
    env: &ExpressionEnv,
    conditions: &[MatchCondition],
) -> Result<bool, EvalError> {
    for condition in conditions {
        let context = format!("match condition {:?}", condition.name);
        if !env.evaluate_bool(&condition.expression, &context)? {
            return Ok(false);
        }
    }
    Ok(true)
}

// ============================================================================
// SECTION: Audit Annotations
// ============================================================================

/// Evaluates every audit annotation expression.
///
/// Non-empty string results are recorded under the annotation key; empty
/// strings and non-strings are dropped.
///
/// # Errors
///
/// Returns [`EvalError`] when a value expression fails to evaluate.
fn evaluate_audit_annotations(
    env: &ExpressionEnv,
    annotations: &[AuditAnnotation],
) -> Result<BTreeMap<String, String>, EvalError> {
    let mut out = BTreeMap::new();

    for annotation in annotations {
        let value = env.evaluate(&annotation.value_expression)?;
        if let CelValue::String(text) = value
            && !text.is_empty()
        {
            out.insert(annotation.key.clone(), text.as_str().to_string());
        }
    }

    Ok(out)
}

// ============================================================================
// SECTION: Failure Routing
// ============================================================================

/// Routes a failing validation through the binding's first action.
fn handle_validation_failure(
    env: &ExpressionEnv,
    validation: &Validation,
    binding: Option<&ValidatingAdmissionPolicyBinding>,
    audit_annotations: BTreeMap<String, String>,
) -> Result<EvaluationResult, EvalError> {
    let message = failure_message(env, validation)?;

    let action = binding.and_then(ValidatingAdmissionPolicyBinding::first_action);
    let result = match action {
        Some(ValidationAction::Warn) => EvaluationResult {
            allowed: true,
            warnings: vec![message],
            audit_annotations,
            ..EvaluationResult::default()
        },
        Some(ValidationAction::Audit) => EvaluationResult {
            allowed: true,
            audit_annotations,
            ..EvaluationResult::default()
        },
        Some(ValidationAction::Deny) | None => EvaluationResult {
            allowed: false,
            message,
            audit_annotations,
            ..EvaluationResult::default()
        },
    };

    Ok(result)
}

/// Computes the failure message for a validation.
///
/// A non-blank `messageExpression` result wins over the static message;
/// an empty static message falls back to a synthesized one naming the
/// expression.
fn failure_message(env: &ExpressionEnv, validation: &Validation) -> Result<String, EvalError> {
    let mut message = validation.message.clone();

    if let Some(message_expression) = &validation.message_expression {
        let value = env.evaluate(message_expression)?;
        if let CelValue::String(text) = value
            && !text.trim().is_empty()
        {
            message = text.as_str().to_string();
        }
    }

    if message.is_empty() {
        message = format!("validation failed: {}", validation.expression);
    }

    Ok(message)
}
