// kaptest-core/src/runtime/cel.rs
// ============================================================================
// Module: Expression Runtime
// Description: CEL compilation, evaluation, and value conversion.
// Purpose: Evaluate one expression against an immutable variable bag.
// Dependencies: crate::runtime::authorizer, base64, cel-interpreter, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Expressions run against up to six variables: `object`, `oldObject`,
//! `request`, `params`, `namespaceObject`, and `authorizer`. The
//! environment is built once per evaluation entry and is immutable while
//! in use; every expression compiles to a fresh program, so concurrent
//! evaluations never share mutable state. Dynamic data crosses the CEL
//! boundary as JSON: inputs convert with [`json_to_cel`], results
//! normalize back with [`cel_to_json`].
//!
//! Authorization checks use the chain
//! `authorizer.group(g).resource(r).namespace(ns).check(verb).allowed()`;
//! the chain functions are member functions registered on the evaluation
//! context and backed by the mock decision table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use cel_interpreter::Context;
use cel_interpreter::ExecutionError;
use cel_interpreter::Program;
use cel_interpreter::Value as CelValue;
use cel_interpreter::extractors::This;
use cel_interpreter::objects::Key;
use cel_interpreter::objects::Map as CelMap;
use serde_json::Number;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::runtime::authorizer::AuthzAttributes;
use crate::runtime::authorizer::Decision;
use crate::runtime::authorizer::MockAuthorizer;

// ============================================================================
// SECTION: Variable Bag
// ============================================================================

/// Borrowed inputs bound as CEL variables for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct VariableBag<'a> {
    /// Incoming object; absent for DELETE and CONNECT.
    pub object: Option<&'a JsonValue>,
    /// Prior object state; absent for CREATE and CONNECT.
    pub old_object: Option<&'a JsonValue>,
    /// Projected request mapping.
    pub request: &'a JsonValue,
    /// Policy parameters; bound as null when absent.
    pub params: Option<&'a JsonValue>,
    /// Namespace object of the request's namespace.
    pub namespace_object: Option<&'a JsonValue>,
}

// ============================================================================
// SECTION: Expression Environment
// ============================================================================

/// Immutable CEL environment for one policy evaluation.
pub struct ExpressionEnv {
    /// Pre-converted variable bindings.
    variables: Vec<(String, CelValue)>,
    /// Decision table backing the `authorizer` chain, when bound.
    authorizer: Option<Arc<MockAuthorizer>>,
}

impl ExpressionEnv {
    /// Builds the environment from the variable bag.
    ///
    /// `object` binds to the primary object (the object, or `oldObject`
    /// when only it is present); `oldObject` and `namespaceObject` bind
    /// only when supplied; `params` binds to null when absent. The
    /// `authorizer` variable is bound only when both a mock table and
    /// user info are present.
    #[must_use]
    pub fn new(
        bag: &VariableBag<'_>,
        authorizer: Option<Arc<MockAuthorizer>>,
        has_user_info: bool,
    ) -> Self {
        let mut variables = Vec::new();

        let primary = bag.object.or(bag.old_object);
        variables.push(("object".to_string(), primary.map_or(CelValue::Null, json_to_cel)));

        if let Some(old_object) = bag.old_object {
            variables.push(("oldObject".to_string(), json_to_cel(old_object)));
        }

        variables.push(("request".to_string(), json_to_cel(bag.request)));
        variables.push(("params".to_string(), bag.params.map_or(CelValue::Null, json_to_cel)));

        if let Some(namespace_object) = bag.namespace_object {
            variables.push(("namespaceObject".to_string(), json_to_cel(namespace_object)));
        }

        let authorizer = if has_user_info { authorizer } else { None };
        if authorizer.is_some() {
            variables.push(("authorizer".to_string(), CelValue::Map(empty_map())));
        }

        Self {
            variables,
            authorizer,
        }
    }

    /// Compiles and evaluates one expression.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::Compile`] when parsing fails and
    /// [`EvalError::Evaluate`] when execution fails; both are fatal for
    /// the surrounding test.
    pub fn evaluate(&self, expression: &str) -> Result<CelValue, EvalError> {
        let program = Program::compile(expression).map_err(|err| EvalError::Compile {
            expression: expression.to_string(),
            detail: err.to_string(),
        })?;

        let mut context = Context::default();
        if let Some(authorizer) = &self.authorizer {
            register_authorizer_functions(&mut context, Arc::clone(authorizer));
        }
        for (name, value) in &self.variables {
            context.add_variable_from_value(name.clone(), value.clone());
        }

        program.execute(&context).map_err(|err| EvalError::Evaluate {
            expression: expression.to_string(),
            detail: err.to_string(),
        })
    }

    /// Evaluates an expression that must produce a boolean.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::NonBoolean`] when the expression yields any
    /// other type; `what` names the expression site in the error.
    pub fn evaluate_bool(&self, expression: &str, what: &str) -> Result<bool, EvalError> {
        match self.evaluate(expression)? {
            CelValue::Bool(value) => Ok(value),
            other => Err(EvalError::NonBoolean {
                context: what.to_string(),
                kind: value_kind(&other).to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Authorizer Functions
// ============================================================================

/// Registers the authorization chain as member functions.
fn register_authorizer_functions(context: &mut Context<'_>, authorizer: Arc<MockAuthorizer>) {
    context.add_function(
        "group",
        |This(this): This<CelValue>, group: Arc<String>| -> Result<CelValue, ExecutionError> {
            Ok(set_attribute(&this, "group", &group))
        },
    );
    context.add_function(
        "resource",
        |This(this): This<CelValue>, resource: Arc<String>| -> Result<CelValue, ExecutionError> {
            Ok(set_attribute(&this, "resource", &resource))
        },
    );
    context.add_function(
        "subresource",
        |This(this): This<CelValue>, subresource: Arc<String>| -> Result<CelValue, ExecutionError> {
            Ok(set_attribute(&this, "subresource", &subresource))
        },
    );
    context.add_function(
        "namespace",
        |This(this): This<CelValue>, namespace: Arc<String>| -> Result<CelValue, ExecutionError> {
            Ok(set_attribute(&this, "namespace", &namespace))
        },
    );
    context.add_function(
        "name",
        |This(this): This<CelValue>, name: Arc<String>| -> Result<CelValue, ExecutionError> {
            Ok(set_attribute(&this, "name", &name))
        },
    );

    context.add_function(
        "check",
        move |This(this): This<CelValue>, verb: Arc<String>| -> Result<CelValue, ExecutionError> {
            let attributes = AuthzAttributes {
                group: attribute(&this, "group"),
                resource: attribute(&this, "resource"),
                subresource: attribute(&this, "subresource"),
                namespace: attribute(&this, "namespace"),
                verb: verb.as_str().to_string(),
            };
            let (decision, reason) = authorizer.authorize(&attributes);
            let decision = match decision {
                Decision::Allow => "allow",
                Decision::Deny => "deny",
                Decision::NoOpinion => "noopinion",
            };
            Ok(string_map(&[("decision", decision), ("reason", reason)]))
        },
    );

    context.add_function("allowed", |This(this): This<CelValue>| -> Result<CelValue, ExecutionError> {
        let decision = map_string_field(&this, "decision")
            .ok_or_else(|| ExecutionError::function_error("allowed", "receiver is not a decision"))?;
        Ok(CelValue::Bool(decision == "allow"))
    });

    context.add_function("reason", |This(this): This<CelValue>| -> Result<CelValue, ExecutionError> {
        let reason = map_string_field(&this, "reason")
            .ok_or_else(|| ExecutionError::function_error("reason", "receiver is not a decision"))?;
        Ok(CelValue::String(Arc::new(reason)))
    });
}

/// Returns a copy of the receiver map with one attribute replaced.
fn set_attribute(receiver: &CelValue, key: &str, value: &str) -> CelValue {
    let mut fields: HashMap<Arc<String>, CelValue> = HashMap::new();
    if let CelValue::Map(map) = receiver {
        for (existing_key, existing_value) in map.map.as_ref() {
            if let Key::String(name) = existing_key {
                fields.insert(Arc::clone(name), existing_value.clone());
            }
        }
    }
    fields.insert(Arc::new(key.to_string()), CelValue::String(Arc::new(value.to_string())));
    CelValue::Map(CelMap::from(fields))
}

/// Reads a string attribute from the receiver map, defaulting to empty.
fn attribute(receiver: &CelValue, key: &str) -> String {
    map_string_field(receiver, key).unwrap_or_default()
}

/// Reads a string field from a map value.
fn map_string_field(value: &CelValue, key: &str) -> Option<String> {
    let CelValue::Map(map) = value else {
        return None;
    };
    match map.map.get(&Key::String(Arc::new(key.to_string()))) {
        Some(CelValue::String(text)) => Some(text.as_str().to_string()),
        _ => None,
    }
}

/// Builds a CEL map of string fields.
fn string_map(fields: &[(&str, &str)]) -> CelValue {
    let map: HashMap<Arc<String>, CelValue> = fields
        .iter()
        .map(|(key, value)| (Arc::new((*key).to_string()), CelValue::String(Arc::new((*value).to_string()))))
        .collect();
    CelValue::Map(CelMap::from(map))
}

/// Builds an empty CEL map.
fn empty_map() -> CelMap {
    CelMap::from(HashMap::<Arc<String>, CelValue>::new())
}

// ============================================================================
// SECTION: Value Conversion
// ============================================================================

/// Converts a JSON value into a CEL value.
#[must_use]
pub fn json_to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(boolean) => CelValue::Bool(*boolean),
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                CelValue::Int(int)
            } else if let Some(uint) = number.as_u64() {
                CelValue::UInt(uint)
            } else {
                CelValue::Float(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(text) => CelValue::String(Arc::new(text.clone())),
        JsonValue::Array(items) => CelValue::List(Arc::new(items.iter().map(json_to_cel).collect())),
        JsonValue::Object(fields) => {
            let map: HashMap<Arc<String>, CelValue> =
                fields.iter().map(|(key, item)| (Arc::new(key.clone()), json_to_cel(item))).collect();
            CelValue::Map(CelMap::from(map))
        }
    }
}

/// Normalizes a CEL value back into plain JSON.
///
/// # Errors
///
/// Returns [`EvalError::ValueConversion`] for values with no JSON
/// representation (functions, durations, non-finite floats).
pub fn cel_to_json(value: &CelValue) -> Result<JsonValue, EvalError> {
    match value {
        CelValue::Null => Ok(JsonValue::Null),
        CelValue::Bool(boolean) => Ok(JsonValue::Bool(*boolean)),
        CelValue::Int(int) => Ok(JsonValue::Number(Number::from(*int))),
        CelValue::UInt(uint) => Ok(JsonValue::Number(Number::from(*uint))),
        CelValue::Float(float) => Number::from_f64(*float).map(JsonValue::Number).ok_or_else(|| {
            EvalError::ValueConversion {
                detail: format!("non-finite float {float} has no JSON representation"),
            }
        }),
        CelValue::String(text) => Ok(JsonValue::String(text.as_str().to_string())),
        CelValue::Bytes(bytes) => Ok(JsonValue::String(BASE64.encode(bytes.as_ref()))),
        CelValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(cel_to_json(item)?);
            }
            Ok(JsonValue::Array(out))
        }
        CelValue::Map(map) => {
            let mut out = serde_json::Map::with_capacity(map.map.len());
            for (key, item) in map.map.as_ref() {
                let name = match key {
                    Key::String(text) => text.as_str().to_string(),
                    Key::Int(int) => int.to_string(),
                    Key::Uint(uint) => uint.to_string(),
                    Key::Bool(boolean) => boolean.to_string(),
                };
                out.insert(name, cel_to_json(item)?);
            }
            Ok(JsonValue::Object(out))
        }
        CelValue::Timestamp(timestamp) => Ok(JsonValue::String(timestamp.to_rfc3339())),
        other => Err(EvalError::ValueConversion {
            detail: format!("{} values have no JSON representation", value_kind(other)),
        }),
    }
}

/// Returns a short human-readable name for a CEL value's type.
#[must_use]
pub fn value_kind(value: &CelValue) -> &'static str {
    match value {
        CelValue::List(_) => "list",
        CelValue::Map(_) => "map",
        CelValue::Function(..) => "function",
        CelValue::Int(_) => "int",
        CelValue::UInt(_) => "uint",
        CelValue::Float(_) => "float",
        CelValue::String(_) => "string",
        CelValue::Bytes(_) => "bytes",
        CelValue::Bool(_) => "bool",
        CelValue::Duration(_) => "duration",
        CelValue::Timestamp(_) => "timestamp",
        CelValue::Null => "null",
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal evaluator errors.
///
/// Every variant fails the surrounding test with an "evaluation error"
/// message; none of them produce a policy-level verdict.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Expression failed to parse or type-check.
    #[error("compile expression {expression:?}: {detail}")]
    Compile {
        /// Offending expression source.
        expression: String,
        /// Compiler diagnostic.
        detail: String,
    },
    /// Expression failed at runtime.
    #[error("evaluate expression {expression:?}: {detail}")]
    Evaluate {
        /// Offending expression source.
        expression: String,
        /// Runtime diagnostic.
        detail: String,
    },
    /// Boolean-typed expression produced another type.
    #[error("{context} returned non-boolean {kind}")]
    NonBoolean {
        /// Expression site (match condition or validation).
        context: String,
        /// Observed value type.
        kind: String,
    },
    /// Mutating evaluation without an object or old object.
    #[error("mutating policy requires object or oldObject")]
    MissingObject,
    /// JSONPatch expression did not produce a list.
    #[error("JSONPatch expression must return a list of patch operations, got {kind}")]
    PatchNotList {
        /// Observed value type.
        kind: String,
    },
    /// JSONPatch list element was not a patch operation.
    #[error("JSONPatch element must be a patch operation, got {kind}")]
    PatchElement {
        /// Observed value type.
        kind: String,
    },
    /// RFC-6902 patch application failed.
    #[error("apply patch: {detail}")]
    PatchApply {
        /// Patch library diagnostic.
        detail: String,
    },
    /// ApplyConfiguration expression did not produce an object.
    #[error("apply configuration must return an object, got {kind}")]
    ApplyConfigurationNotObject {
        /// Observed value type.
        kind: String,
    },
    /// CEL value could not be represented as JSON.
    #[error("convert value: {detail}")]
    ValueConversion {
        /// Conversion diagnostic.
        detail: String,
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================
