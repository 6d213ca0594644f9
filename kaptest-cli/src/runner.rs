// kaptest-cli/src/runner.rs
// ============================================================================
// Module: Test Runner
// Description: Per-test evaluation and verdict production.
// Purpose: Bridge loaded test cases to the core engine and oracle.
// Dependencies: crate::loader, kaptest-core
// ============================================================================

//! ## Overview
//! Each test resolves its policy within the suite (mutating policies are
//! consulted first, then validating), evaluates it through the core
//! engine, and compares the outcome to the expectation. The three
//! failure kinds keep their distinct prefixes: test-loading errors and
//! evaluation errors fail without comparison, while policy verdicts flow
//! through the oracle.

// ============================================================================
// SECTION: Imports
// ============================================================================

use kaptest_core::EvaluationInputs;
use kaptest_core::MockAuthorizer;
use kaptest_core::PolicyCase;
use kaptest_core::TestOutcome;
use kaptest_core::TestVerdict;
use kaptest_core::compare;
use kaptest_core::evaluate_policy;

use crate::loader::PolicySet;
use crate::loader::TestCase;

// ============================================================================
// SECTION: Test Execution
// ============================================================================

/// Runs one test case against its suite's policies.
#[must_use]
pub fn run_test(policies: &PolicySet, test: &TestCase) -> TestVerdict {
    if let Some(error) = &test.error {
        return TestVerdict::failed(format!("test loading error: {error}"));
    }

    let case = if let Some((policy, binding)) = policies.find_mutating(&test.policy_name) {
        PolicyCase::Mutating {
            policy,
            binding,
        }
    } else if let Some((policy, binding)) = policies.find_validating(&test.policy_name) {
        PolicyCase::Validating {
            policy,
            binding,
        }
    } else {
        return TestVerdict::failed(format!("policy {:?} not found", test.policy_name));
    };

    let authorizer = if test.authorizer.is_empty() {
        None
    } else {
        Some(MockAuthorizer::from_records(&test.authorizer))
    };

    let inputs = EvaluationInputs {
        object: test.object.as_ref(),
        old_object: test.old_object.as_ref(),
        params: test.params.as_ref(),
        namespace_object: test.namespace_object.as_ref(),
        authorizer: authorizer.as_ref(),
        user_info: test.user_info.as_ref(),
    };

    let result = match evaluate_policy(&case, &test.request, &inputs) {
        Ok(result) => result,
        Err(err) => return TestVerdict::failed(format!("evaluation error: {err}")),
    };

    let outcome = TestOutcome {
        allowed: result.allowed,
        message: result.message,
        warnings: result.warnings,
        audit_annotations: result.audit_annotations,
        object: result.patched_object.or_else(|| test.object.clone()),
    };

    compare(&test.expectation, &outcome)
}
