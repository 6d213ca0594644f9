// kaptest-core/src/core/selector.rs
// ============================================================================
// Module: Label Selector
// Description: Kubernetes label selector model and matching.
// Purpose: Gate policy bindings on namespace labels deterministically.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Label selectors combine exact `matchLabels` pairs with set-based
//! `matchExpressions`. A selector matches when every pair and every
//! expression matches; an empty selector matches everything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Label Selector
// ============================================================================

/// Label query over a set of labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact key/value requirements.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    /// Set-based requirements.
    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Returns true when the selector carries no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Returns true when the given labels satisfy every requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        for (key, value) in &self.match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }

        self.match_expressions.iter().all(|requirement| requirement.matches(labels))
    }
}

/// Single set-based selector requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to.
    pub key: String,
    /// Relationship between the key and the values.
    pub operator: LabelSelectorOperator,
    /// Values compared against the label; empty for existence operators.
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelSelectorRequirement {
    /// Returns true when the given labels satisfy this requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            LabelSelectorOperator::In => {
                labels.get(&self.key).is_some_and(|value| self.values.contains(value))
            }
            LabelSelectorOperator::NotIn => {
                labels.get(&self.key).is_none_or(|value| !self.values.contains(value))
            }
            LabelSelectorOperator::Exists => labels.contains_key(&self.key),
            LabelSelectorOperator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

/// Operators usable in a selector requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelSelectorOperator {
    /// Label value must be one of the listed values.
    In,
    /// Label value must not be one of the listed values.
    NotIn,
    /// Label key must be present.
    Exists,
    /// Label key must be absent.
    DoesNotExist,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn match_labels_require_exact_values() {
        let selector = LabelSelector {
            match_labels: labels(&[("env", "prod")]),
            match_expressions: Vec::new(),
        };

        assert!(selector.matches(&labels(&[("env", "prod"), ("app", "web")])));
        assert!(!selector.matches(&labels(&[("env", "staging")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn match_expressions_cover_all_operators() {
        let tagged = labels(&[("env", "prod")]);
        let untagged = labels(&[]);

        let requirement = |operator, values: &[&str]| LabelSelectorRequirement {
            key: "env".to_string(),
            operator,
            values: values.iter().map(|v| (*v).to_string()).collect(),
        };

        assert!(requirement(LabelSelectorOperator::In, &["prod", "staging"]).matches(&tagged));
        assert!(!requirement(LabelSelectorOperator::In, &["dev"]).matches(&tagged));
        assert!(!requirement(LabelSelectorOperator::In, &["prod"]).matches(&untagged));

        assert!(requirement(LabelSelectorOperator::NotIn, &["dev"]).matches(&tagged));
        assert!(requirement(LabelSelectorOperator::NotIn, &["prod"]).matches(&untagged));
        assert!(!requirement(LabelSelectorOperator::NotIn, &["prod"]).matches(&tagged));

        assert!(requirement(LabelSelectorOperator::Exists, &[]).matches(&tagged));
        assert!(!requirement(LabelSelectorOperator::Exists, &[]).matches(&untagged));

        assert!(requirement(LabelSelectorOperator::DoesNotExist, &[]).matches(&untagged));
        assert!(!requirement(LabelSelectorOperator::DoesNotExist, &[]).matches(&tagged));
    }

    #[test]
    fn selector_deserializes_kubernetes_shape() {
        let selector: LabelSelector = serde_yaml::from_str(
            "matchLabels:\n  team: core\nmatchExpressions:\n  - key: env\n    operator: In\n    values: [prod]\n",
        )
        .unwrap();

        assert_eq!(selector.match_labels.get("team").map(String::as_str), Some("core"));
        assert_eq!(selector.match_expressions[0].operator, LabelSelectorOperator::In);
    }
}
