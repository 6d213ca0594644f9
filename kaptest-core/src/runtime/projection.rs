// kaptest-core/src/runtime/projection.rs
// ============================================================================
// Module: Request Projection
// Description: Flatten an admission request into the CEL `request` mapping.
// Purpose: Reproduce the apiserver's request variable field-for-field.
// Dependencies: crate::core::request, serde_json
// ============================================================================

//! ## Overview
//! CEL expressions reference request metadata through the `request`
//! variable. The projection emits the exact JSON names Kubernetes
//! publishes and omits empty scalar fields so `has(request.X)` behaves as
//! it does inside the apiserver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::request::AdmissionRequest;
use crate::core::request::UserInfo;

// ============================================================================
// SECTION: Projection
// ============================================================================

/// Projects an admission request into the nested mapping bound as `request`.
#[must_use]
pub fn project_request(request: &AdmissionRequest) -> Value {
    let mut out = Map::new();

    if !request.uid.is_empty() {
        out.insert("uid".to_string(), Value::String(request.uid.clone()));
    }
    if !request.sub_resource.is_empty() {
        out.insert("subResource".to_string(), Value::String(request.sub_resource.clone()));
    }
    if !request.name.is_empty() {
        out.insert("name".to_string(), Value::String(request.name.clone()));
    }
    if !request.namespace.is_empty() {
        out.insert("namespace".to_string(), Value::String(request.namespace.clone()));
    }
    if let Some(operation) = request.operation {
        out.insert("operation".to_string(), Value::String(operation.to_string()));
    }

    if let Some(kind) = &request.kind
        && !kind.kind.is_empty()
    {
        out.insert(
            "kind".to_string(),
            json!({"group": kind.group, "version": kind.version, "kind": kind.kind}),
        );
    }

    if let Some(resource) = &request.resource
        && !resource.resource.is_empty()
    {
        out.insert(
            "resource".to_string(),
            json!({"group": resource.group, "version": resource.version, "resource": resource.resource}),
        );
    }

    if let Some(user_info) = &request.user_info
        && let Some(projected) = project_user_info(user_info)
    {
        out.insert("userInfo".to_string(), projected);
    }

    if let Some(options) = &request.options {
        out.insert("options".to_string(), options.clone());
    }
    if let Some(dry_run) = request.dry_run {
        out.insert("dryRun".to_string(), Value::Bool(dry_run));
    }

    Value::Object(out)
}

/// Projects user info, returning `None` when no username or group is set.
fn project_user_info(user_info: &UserInfo) -> Option<Value> {
    if user_info.username.is_empty() && user_info.groups.is_empty() {
        return None;
    }

    let mut out = Map::new();
    if !user_info.username.is_empty() {
        out.insert("username".to_string(), Value::String(user_info.username.clone()));
    }
    if !user_info.groups.is_empty() {
        out.insert(
            "groups".to_string(),
            Value::Array(user_info.groups.iter().cloned().map(Value::String).collect()),
        );
    }
    if !user_info.uid.is_empty() {
        out.insert("uid".to_string(), Value::String(user_info.uid.clone()));
    }
    if !user_info.extra.is_empty() {
        let extra: Map<String, Value> = user_info
            .extra
            .iter()
            .map(|(key, values)| {
                (key.clone(), Value::Array(values.iter().cloned().map(Value::String).collect()))
            })
            .collect();
        out.insert("extra".to_string(), Value::Object(extra));
    }

    Some(Value::Object(out))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
