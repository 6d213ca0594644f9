// kaptest-core/src/runtime/mod.rs
// ============================================================================
// Module: Evaluation Runtime
// Description: Expression runtime, engines, oracle, and supporting pieces.
// Purpose: Group the evaluation logic applied to the core data model.
// Dependencies: crate::runtime submodules
// ============================================================================

//! ## Overview
//! The runtime evaluates one policy against one admission request:
//! [`projection`] builds the CEL `request` mapping, [`cel`] compiles and
//! runs expressions, [`authorizer`] answers authorization checks,
//! [`mutation`] and [`validation`] implement the two engines,
//! [`evaluator`] dispatches between them, and [`oracle`] compares the
//! result to the test expectation.

pub mod authorizer;
pub mod cel;
pub mod diff;
pub mod evaluator;
pub mod mutation;
pub mod oracle;
pub mod projection;
pub mod validation;

pub use authorizer::AuthorizerRecord;
pub use authorizer::AuthzAttributes;
pub use authorizer::Decision;
pub use authorizer::MockAuthorizer;
pub use authorizer::RecordedDecision;
pub use cel::EvalError;
pub use cel::ExpressionEnv;
pub use cel::VariableBag;
pub use diff::unified_diff;
pub use evaluator::EvaluationInputs;
pub use evaluator::EvaluationResult;
pub use evaluator::PolicyCase;
pub use evaluator::evaluate_policy;
pub use oracle::compare;
pub use projection::project_request;
