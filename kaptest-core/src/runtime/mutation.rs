// kaptest-core/src/runtime/mutation.rs
// ============================================================================
// Module: Mutation Engine
// Description: JSONPatch and ApplyConfiguration mutation application.
// Purpose: Produce the patched object for a mutating policy evaluation.
// Dependencies: crate::runtime::cel, cel-interpreter, json-patch, serde_json
// ============================================================================

//! ## Overview
//! Mutations apply in declared order against a deep copy of the input
//! object; the input itself is never modified. A JSONPatch mutation's
//! expression yields a list of patch operations applied as one RFC-6902
//! patch; an ApplyConfiguration mutation's expression yields a partial
//! object merged recursively into the working object (mappings merge,
//! sequences and scalars overwrite).
//!
//! Mutation expressions may use the `JSONPatch{...}` and `Object{...}`
//! construction forms the apiserver accepts. The interpreter has no
//! dynamic type registry, so [`rewrite_construction_syntax`] lowers those
//! forms to equivalent map literals before compilation. The lowering is
//! lexical, string-literal-aware, and applied only to mutation
//! expressions.
//!
//! The variable bag is built once per evaluation: a later mutation's
//! expression observes the original `object`, never the partially patched
//! working state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use cel_interpreter::Value as CelValue;
use serde_json::Value as JsonValue;

use crate::core::policy::Mutation;
use crate::core::policy::PatchType;
use crate::runtime::cel::EvalError;
use crate::runtime::cel::ExpressionEnv;
use crate::runtime::cel::cel_to_json;
use crate::runtime::cel::value_kind;

// ============================================================================
// SECTION: Mutation Application
// ============================================================================

/// Applies every mutation in order and returns the patched object.
///
/// # Errors
///
/// Returns [`EvalError`] when a patch expression fails, yields the wrong
/// shape, or the RFC-6902 patch cannot be applied. The caller never
/// observes a partially mutated input.
pub fn apply_mutations(
    env: &ExpressionEnv,
    mutations: &[Mutation],
    base: &JsonValue,
) -> Result<JsonValue, EvalError> {
    let mut working = base.clone();

    for mutation in mutations {
        match mutation.patch_type {
            PatchType::JsonPatch => {
                let Some(patch) = &mutation.json_patch else {
                    continue;
                };
                let lowered = rewrite_construction_syntax(&patch.expression);
                let value = env.evaluate(&lowered)?;
                working = apply_json_patch(&value, working)?;
            }
            PatchType::ApplyConfiguration => {
                let Some(configuration) = &mutation.apply_configuration else {
                    continue;
                };
                let lowered = rewrite_construction_syntax(&configuration.expression);
                let value = env.evaluate(&lowered)?;
                if !matches!(value, CelValue::Map(_)) {
                    return Err(EvalError::ApplyConfigurationNotObject {
                        kind: value_kind(&value).to_string(),
                    });
                }
                let configuration = cel_to_json(&value)?;
                merge_objects(&mut working, &configuration);
            }
        }
    }

    Ok(working)
}

// ============================================================================
// SECTION: JSONPatch
// ============================================================================

/// Converts a CEL patch list into an RFC-6902 patch and applies it.
fn apply_json_patch(value: &CelValue, working: JsonValue) -> Result<JsonValue, EvalError> {
    let CelValue::List(elements) = value else {
        return Err(EvalError::PatchNotList {
            kind: value_kind(value).to_string(),
        });
    };

    if elements.is_empty() {
        return Ok(working);
    }

    let mut operations = Vec::with_capacity(elements.len());
    for element in elements.iter() {
        operations.push(patch_operation(element)?);
    }

    let patch: json_patch::Patch =
        serde_json::from_value(JsonValue::Array(operations)).map_err(|err| EvalError::PatchApply {
            detail: err.to_string(),
        })?;

    let mut patched = working;
    json_patch::patch(&mut patched, &patch).map_err(|err| EvalError::PatchApply {
        detail: err.to_string(),
    })?;

    Ok(patched)
}

/// Converts one CEL patch element into an RFC-6902 operation object.
fn patch_operation(element: &CelValue) -> Result<JsonValue, EvalError> {
    let CelValue::Map(_) = element else {
        return Err(EvalError::PatchElement {
            kind: value_kind(element).to_string(),
        });
    };

    let fields = cel_to_json(element)?;
    let JsonValue::Object(fields) = fields else {
        return Err(EvalError::PatchElement {
            kind: value_kind(element).to_string(),
        });
    };

    let mut operation = serde_json::Map::new();
    for required in ["op", "path"] {
        match fields.get(required) {
            Some(JsonValue::String(text)) => {
                operation.insert(required.to_string(), JsonValue::String(text.clone()));
            }
            _ => {
                return Err(EvalError::PatchElement {
                    kind: format!("operation without string {required:?}"),
                });
            }
        }
    }
    if let Some(JsonValue::String(from)) = fields.get("from")
        && !from.is_empty()
    {
        operation.insert("from".to_string(), JsonValue::String(from.clone()));
    }
    if let Some(value) = fields.get("value") {
        operation.insert("value".to_string(), value.clone());
    }

    Ok(JsonValue::Object(operation))
}

// ============================================================================
// SECTION: ApplyConfiguration Merge
// ============================================================================

/// Merges a partial object into the destination.
///
/// Mappings merge key-by-key; sequences, scalars, and mismatched types
/// overwrite. This intentionally approximates the apiserver's
/// structured-merge-diff; tests declare the full expected object, so the
/// simplification is observable and documented.
pub fn merge_objects(destination: &mut JsonValue, source: &JsonValue) {
    if let (JsonValue::Object(destination_fields), JsonValue::Object(source_fields)) = (&mut *destination, source) {
        for (key, source_value) in source_fields {
            match destination_fields.get_mut(key) {
                Some(destination_value)
                    if destination_value.is_object() && source_value.is_object() =>
                {
                    merge_objects(destination_value, source_value);
                }
                _ => {
                    destination_fields.insert(key.clone(), source_value.clone());
                }
            }
        }
        return;
    }

    *destination = source.clone();
}

// ============================================================================
// SECTION: Construction Lowering
// ============================================================================

/// Lowers `JSONPatch{...}` and `Object{...}` construction forms to map
/// literals: the type path is dropped and bare field names are quoted.
///
/// String literals are copied verbatim; everything outside a recognized
/// construction is left untouched.
#[must_use]
pub fn rewrite_construction_syntax(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len());
    let mut frames: Vec<Frame> = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let current = chars[index];
        match current {
            '\'' | '"' => index = copy_string_literal(&chars, index, &mut out),
            '(' => {
                frames.push(Frame::Paren);
                out.push(current);
                index += 1;
            }
            '[' => {
                frames.push(Frame::Bracket);
                out.push(current);
                index += 1;
            }
            '{' => {
                frames.push(Frame::Brace);
                out.push(current);
                index += 1;
            }
            ')' | ']' | '}' => {
                frames.pop();
                out.push(current);
                index += 1;
            }
            ',' => {
                out.push(current);
                index += 1;
                if frames.last() == Some(&Frame::Construction) {
                    index = quote_field_name(&chars, index, &mut out);
                }
            }
            _ if is_identifier_start(current) => {
                let path_end = scan_type_path(&chars, index);
                let path: String = chars[index..path_end].iter().collect();
                let brace = next_non_whitespace(&chars, path_end);
                if is_construction_path(&path) && brace.is_some_and(|at| chars[at] == '{') {
                    let brace_at = brace.unwrap_or(path_end);
                    out.push('{');
                    frames.push(Frame::Construction);
                    index = quote_field_name(&chars, brace_at + 1, &mut out);
                } else {
                    out.push_str(&path);
                    index = path_end;
                }
            }
            _ => {
                out.push(current);
                index += 1;
            }
        }
    }

    out
}

/// Brace-like nesting frames tracked during lowering.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A lowered construction; bare keys at this depth are quoted.
    Construction,
    /// A plain map literal; keys are already expressions.
    Brace,
    /// Parenthesized expression.
    Paren,
    /// List literal or index expression.
    Bracket,
}

/// Copies a quoted string literal verbatim, honoring backslash escapes.
fn copy_string_literal(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push(quote);
    let mut index = start + 1;
    while index < chars.len() {
        let current = chars[index];
        out.push(current);
        index += 1;
        if current == '\\' && index < chars.len() {
            out.push(chars[index]);
            index += 1;
        } else if current == quote {
            break;
        }
    }
    index
}

/// Quotes the bare field name at a construction key position.
fn quote_field_name(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut index = start;
    while index < chars.len() && chars[index].is_whitespace() {
        out.push(chars[index]);
        index += 1;
    }

    if index >= chars.len() || !is_identifier_start(chars[index]) {
        return index;
    }

    let mut end = index;
    while end < chars.len() && is_identifier_char(chars[end]) {
        end += 1;
    }

    let colon = next_non_whitespace(chars, end);
    if colon.is_some_and(|at| chars[at] == ':') {
        out.push('"');
        out.extend(&chars[index..end]);
        out.push('"');
        return end;
    }

    out.extend(&chars[index..end]);
    end
}

/// Scans a dotted identifier path starting at `start`.
fn scan_type_path(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && (is_identifier_char(chars[end]) || chars[end] == '.') {
        end += 1;
    }
    end
}

/// Returns the next non-whitespace position at or after `start`.
fn next_non_whitespace(chars: &[char], start: usize) -> Option<usize> {
    (start..chars.len()).find(|&at| !chars[at].is_whitespace())
}

/// Returns true for the type paths the apiserver's mutation types use.
fn is_construction_path(path: &str) -> bool {
    path == "JSONPatch" || path == "Object" || path.starts_with("Object.")
}

const fn is_identifier_start(current: char) -> bool {
    current.is_ascii_alphabetic() || current == '_'
}

const fn is_identifier_char(current: char) -> bool {
    current.is_ascii_alphanumeric() || current == '_'
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowers_jsonpatch_construction_to_map_literal() {
        let lowered = rewrite_construction_syntax(
            r#"[JSONPatch{op: "add", path: "/metadata/labels/matched", value: "true"}]"#,
        );
        assert_eq!(lowered, r#"[{"op": "add", "path": "/metadata/labels/matched", "value": "true"}]"#);
    }

    #[test]
    fn lowers_nested_object_constructions() {
        let lowered = rewrite_construction_syntax(
            "Object{spec: Object.spec{replicas: 3, template: Object.spec.template{metadata: {'a': 'b'}}}}",
        );
        assert_eq!(
            lowered,
            "{\"spec\": {\"replicas\": 3, \"template\": {\"metadata\": {'a': 'b'}}}}",
        );
    }

    #[test]
    fn leaves_plain_map_literals_untouched() {
        let source = "{'op': 'add', 'path': '/x'}";
        assert_eq!(rewrite_construction_syntax(source), source);
    }

    #[test]
    fn leaves_identifiers_and_strings_untouched() {
        let source = r#"object.metadata.name == "JSONPatch{op: 'add'}" && size(items) > 0"#;
        assert_eq!(rewrite_construction_syntax(source), source);
    }

    #[test]
    fn quotes_keys_after_commas_only_at_construction_depth() {
        let lowered = rewrite_construction_syntax(
            "[JSONPatch{op: 'add', path: '/a', value: [1, 2]}, JSONPatch{op: 'remove', path: '/b'}]",
        );
        assert_eq!(
            lowered,
            "[{\"op\": 'add', \"path\": '/a', \"value\": [1, 2]}, {\"op\": 'remove', \"path\": '/b'}]",
        );
    }

    #[test]
    fn empty_construction_lowers_to_empty_map() {
        assert_eq!(rewrite_construction_syntax("Object{}"), "{}");
    }

    #[test]
    fn merge_recurses_into_mappings_and_overwrites_the_rest() {
        let mut destination = serde_json::json!({
            "metadata": {"name": "web", "labels": {"a": "1"}},
            "spec": {"replicas": 2, "ports": [80]},
        });
        let source = serde_json::json!({
            "metadata": {"labels": {"b": "2"}},
            "spec": {"ports": [443]},
        });

        merge_objects(&mut destination, &source);

        assert_eq!(destination["metadata"]["name"], "web");
        assert_eq!(destination["metadata"]["labels"], serde_json::json!({"a": "1", "b": "2"}));
        assert_eq!(destination["spec"]["replicas"], 2);
        assert_eq!(destination["spec"]["ports"], serde_json::json!([443]));
    }
}
