// kaptest-core/src/core/policy.rs
// ============================================================================
// Module: Admission Policy Model
// Description: Validating and mutating admission policy specifications.
// Purpose: Define the policy inputs evaluated against admission requests.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Policy types mirror the Kubernetes `admissionregistration.k8s.io`
//! manifests: a validating policy carries match conditions, validations,
//! and audit annotations; a mutating policy carries match conditions and
//! an ordered list of mutations. Unknown manifest fields are tolerated so
//! real-world policies load without modification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Object Metadata
// ============================================================================

/// Minimal object metadata carried by policies and bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name.
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// SECTION: Shared Expressions
// ============================================================================

/// Named boolean guard on a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCondition {
    /// Identifier reported in error messages.
    #[serde(default)]
    pub name: String,
    /// CEL expression that must evaluate to true for the policy to apply.
    pub expression: String,
}

/// Single validation rule of a validating policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// CEL expression that must evaluate to true for the request to pass.
    pub expression: String,
    /// Static failure message.
    #[serde(default)]
    pub message: String,
    /// CEL expression producing the failure message; wins over `message`
    /// when it yields a non-blank string.
    #[serde(default)]
    pub message_expression: Option<String>,
    /// Machine-readable failure reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Audit annotation produced for every applicable request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditAnnotation {
    /// Annotation key.
    pub key: String,
    /// CEL expression producing the annotation value; non-string or empty
    /// results are dropped.
    pub value_expression: String,
}

// ============================================================================
// SECTION: Validating Policy
// ============================================================================

/// ValidatingAdmissionPolicy manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatingAdmissionPolicy {
    /// Policy metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Policy specification.
    #[serde(default)]
    pub spec: ValidatingAdmissionPolicySpec,
}

impl ValidatingAdmissionPolicy {
    /// Returns the policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Specification of a validating policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatingAdmissionPolicySpec {
    /// Boolean guards evaluated before anything else.
    #[serde(default)]
    pub match_conditions: Vec<MatchCondition>,
    /// Validation rules evaluated in order.
    #[serde(default)]
    pub validations: Vec<Validation>,
    /// Audit annotations evaluated for every applicable request.
    #[serde(default)]
    pub audit_annotations: Vec<AuditAnnotation>,
}

// ============================================================================
// SECTION: Mutating Policy
// ============================================================================

/// MutatingAdmissionPolicy manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutatingAdmissionPolicy {
    /// Policy metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Policy specification.
    #[serde(default)]
    pub spec: MutatingAdmissionPolicySpec,
}

impl MutatingAdmissionPolicy {
    /// Returns the policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Specification of a mutating policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutatingAdmissionPolicySpec {
    /// Boolean guards evaluated before any mutation.
    #[serde(default)]
    pub match_conditions: Vec<MatchCondition>,
    /// Mutations applied in declared order.
    #[serde(default)]
    pub mutations: Vec<Mutation>,
}

/// Single mutation of a mutating policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Patch kind applied by this mutation.
    #[serde(default)]
    pub patch_type: PatchType,
    /// JSONPatch expression; present when `patch_type` is `JSONPatch`.
    #[serde(default)]
    pub json_patch: Option<PatchExpression>,
    /// ApplyConfiguration expression; present when `patch_type` is
    /// `ApplyConfiguration`.
    #[serde(default)]
    pub apply_configuration: Option<PatchExpression>,
}

/// Patch kinds supported by mutating policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchType {
    /// RFC-6902 patch produced by a CEL list expression.
    #[default]
    #[serde(rename = "JSONPatch")]
    JsonPatch,
    /// Partial object merged into the target.
    ApplyConfiguration,
}

/// Wrapper for a single CEL patch expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchExpression {
    /// CEL expression producing the patch value.
    pub expression: String,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validating_policy_parses_kubernetes_manifest() {
        let policy: ValidatingAdmissionPolicy = serde_yaml::from_str(
            r#"
metadata:
  name: require-owner
spec:
  matchConditions:
    - name: exclude-system
      expression: "object.metadata.namespace != 'kube-system'"
  validations:
    - expression: "has(object.metadata.labels)"
      message: labels are required
      messageExpression: "'missing labels on ' + object.metadata.name"
      reason: Invalid
  auditAnnotations:
    - key: checked-by
      valueExpression: "'require-owner'"
"#,
        )
        .unwrap();

        assert_eq!(policy.name(), "require-owner");
        assert_eq!(policy.spec.match_conditions.len(), 1);
        assert_eq!(policy.spec.validations[0].reason.as_deref(), Some("Invalid"));
        assert_eq!(policy.spec.audit_annotations[0].key, "checked-by");
    }

    #[test]
    fn mutating_policy_parses_both_patch_types() {
        let policy: MutatingAdmissionPolicy = serde_yaml::from_str(
            r#"
metadata:
  name: add-labels
spec:
  mutations:
    - patchType: JSONPatch
      jsonPatch:
        expression: "[JSONPatch{op: 'add', path: '/metadata/labels/x', value: 'y'}]"
    - patchType: ApplyConfiguration
      applyConfiguration:
        expression: "Object{metadata: Object.metadata{labels: {'a': 'b'}}}"
"#,
        )
        .unwrap();

        assert_eq!(policy.spec.mutations[0].patch_type, PatchType::JsonPatch);
        assert!(policy.spec.mutations[0].json_patch.is_some());
        assert_eq!(policy.spec.mutations[1].patch_type, PatchType::ApplyConfiguration);
    }

    #[test]
    fn unknown_manifest_fields_are_tolerated() {
        let policy: ValidatingAdmissionPolicy = serde_yaml::from_str(
            r"
metadata:
  name: tolerant
spec:
  failurePolicy: Fail
  validations:
    - expression: 'true'
",
        )
        .unwrap();

        assert_eq!(policy.name(), "tolerant");
        assert_eq!(policy.spec.validations.len(), 1);
    }
}
