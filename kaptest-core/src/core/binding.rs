// kaptest-core/src/core/binding.rs
// ============================================================================
// Module: Policy Binding Model
// Description: Validating and mutating policy binding specifications.
// Purpose: Activate policies against requests and route validation failures.
// Dependencies: crate::core::selector, serde
// ============================================================================

//! ## Overview
//! Bindings reference a policy by name and scope it with a namespace
//! selector. Validating bindings additionally carry the validation actions
//! that route a failing validation to Deny, Warn, or Audit. `paramRef` is
//! parsed for fidelity with the manifests but never resolved; parameters
//! are supplied directly by the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::policy::ObjectMeta;
use crate::core::selector::LabelSelector;

// ============================================================================
// SECTION: Validation Actions
// ============================================================================

/// Routing decision for a failing validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationAction {
    /// Reject the request with the failure message.
    Deny,
    /// Allow the request and surface the message as a warning.
    Warn,
    /// Allow the request; only audit annotations record the failure.
    Audit,
}

// ============================================================================
// SECTION: Match Resources
// ============================================================================

/// Resource scoping carried by a binding.
///
/// Only the namespace selector participates in evaluation; resource rules
/// are a non-goal of this engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResources {
    /// Selector over the labels of the request's namespace object.
    #[serde(default)]
    pub namespace_selector: Option<LabelSelector>,
}

/// Unresolved reference to a parameter resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRef {
    /// Parameter resource name.
    #[serde(default)]
    pub name: String,
    /// Parameter resource namespace.
    #[serde(default)]
    pub namespace: String,
}

// ============================================================================
// SECTION: Validating Binding
// ============================================================================

/// ValidatingAdmissionPolicyBinding manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatingAdmissionPolicyBinding {
    /// Binding metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Binding specification.
    #[serde(default)]
    pub spec: ValidatingAdmissionPolicyBindingSpec,
}

impl ValidatingAdmissionPolicyBinding {
    /// Returns the binding name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the first validation action, or `None` for the Deny default.
    #[must_use]
    pub fn first_action(&self) -> Option<ValidationAction> {
        self.spec.validation_actions.first().copied()
    }
}

/// Specification of a validating binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatingAdmissionPolicyBindingSpec {
    /// Name of the bound policy.
    #[serde(default)]
    pub policy_name: String,
    /// Failure routing actions; the first entry wins.
    #[serde(default)]
    pub validation_actions: Vec<ValidationAction>,
    /// Resource scoping for the binding.
    #[serde(default)]
    pub match_resources: Option<MatchResources>,
    /// Unresolved parameter reference.
    #[serde(default)]
    pub param_ref: Option<ParamRef>,
}

// ============================================================================
// SECTION: Mutating Binding
// ============================================================================

/// MutatingAdmissionPolicyBinding manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutatingAdmissionPolicyBinding {
    /// Binding metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Binding specification.
    #[serde(default)]
    pub spec: MutatingAdmissionPolicyBindingSpec,
}

impl MutatingAdmissionPolicyBinding {
    /// Returns the binding name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Specification of a mutating binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutatingAdmissionPolicyBindingSpec {
    /// Name of the bound policy.
    #[serde(default)]
    pub policy_name: String,
    /// Resource scoping for the binding.
    #[serde(default)]
    pub match_resources: Option<MatchResources>,
    /// Unresolved parameter reference.
    #[serde(default)]
    pub param_ref: Option<ParamRef>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validating_binding_parses_actions_and_selector() {
        let binding: ValidatingAdmissionPolicyBinding = serde_yaml::from_str(
            r"
metadata:
  name: require-owner-binding
spec:
  policyName: require-owner
  validationActions: [Warn, Audit]
  matchResources:
    namespaceSelector:
      matchLabels:
        env: prod
",
        )
        .unwrap();

        assert_eq!(binding.spec.policy_name, "require-owner");
        assert_eq!(binding.first_action(), Some(ValidationAction::Warn));
        let selector = binding.spec.match_resources.unwrap().namespace_selector.unwrap();
        assert!(!selector.is_empty());
    }

    #[test]
    fn missing_actions_default_to_none() {
        let binding = ValidatingAdmissionPolicyBinding::default();
        assert_eq!(binding.first_action(), None);
    }

    #[test]
    fn param_ref_is_parsed_but_inert() {
        let binding: MutatingAdmissionPolicyBinding = serde_yaml::from_str(
            r"
metadata:
  name: with-params
spec:
  policyName: sizing
  paramRef:
    name: limits
    namespace: default
",
        )
        .unwrap();

        let param_ref = binding.spec.param_ref.unwrap();
        assert_eq!(param_ref.name, "limits");
        assert_eq!(param_ref.namespace, "default");
    }
}
