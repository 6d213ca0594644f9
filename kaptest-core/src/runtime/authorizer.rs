// kaptest-core/src/runtime/authorizer.rs
// ============================================================================
// Module: Mock Authorizer
// Description: Table-driven authorization oracle for policy tests.
// Purpose: Answer CEL authorization checks from declared fixture records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tests declare the authorization facts they rely on as a finite list of
//! records, each keying an (apiGroup, resource, subresource, namespace,
//! verb) tuple to an allow or deny decision. Lookups are exact: a miss
//! returns NoOpinion rather than wildcarding, so a fixture that forgets a
//! fact fails loudly instead of silently passing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Authorization decision returned by a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The check is allowed.
    Allow,
    /// The check is denied.
    Deny,
    /// No record matched the check.
    NoOpinion,
}

/// Declared decision for a mock record; fixtures never declare NoOpinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordedDecision {
    /// The tuple is allowed.
    Allow,
    /// The tuple is denied.
    Deny,
}

// ============================================================================
// SECTION: Mock Records
// ============================================================================

/// One declared authorization fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerRecord {
    /// API group; empty for the core group.
    #[serde(default)]
    pub group: String,
    /// Lowercase plural resource name.
    pub resource: String,
    /// Subresource; usually empty.
    #[serde(default)]
    pub subresource: String,
    /// Namespace; empty for cluster-scoped checks.
    #[serde(default)]
    pub namespace: String,
    /// Verb being checked (e.g. `create`, `delete`).
    pub verb: String,
    /// Declared decision for the tuple.
    pub decision: RecordedDecision,
}

impl Default for RecordedDecision {
    fn default() -> Self {
        Self::Deny
    }
}

// ============================================================================
// SECTION: Authorization Attributes
// ============================================================================

/// Attribute tuple assembled by a CEL authorization chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthzAttributes {
    /// API group of the check.
    pub group: String,
    /// Resource of the check.
    pub resource: String,
    /// Subresource of the check.
    pub subresource: String,
    /// Namespace of the check.
    pub namespace: String,
    /// Verb of the check.
    pub verb: String,
}

// ============================================================================
// SECTION: Mock Authorizer
// ============================================================================

/// Table-driven authorizer keyed by exact attribute tuples.
#[derive(Debug, Clone, Default)]
pub struct MockAuthorizer {
    /// Decisions keyed by `group/resource/subresource/namespace/verb`.
    decisions: HashMap<String, Decision>,
}

impl MockAuthorizer {
    /// Builds a mock authorizer from declared records.
    #[must_use]
    pub fn from_records(records: &[AuthorizerRecord]) -> Self {
        let mut authorizer = Self::default();
        for record in records {
            let decision = match record.decision {
                RecordedDecision::Allow => Decision::Allow,
                RecordedDecision::Deny => Decision::Deny,
            };
            authorizer.decisions.insert(
                tuple_key(&record.group, &record.resource, &record.subresource, &record.namespace, &record.verb),
                decision,
            );
        }
        authorizer
    }

    /// Records an allow decision for the tuple.
    pub fn allow(&mut self, group: &str, resource: &str, subresource: &str, namespace: &str, verb: &str) {
        self.decisions.insert(tuple_key(group, resource, subresource, namespace, verb), Decision::Allow);
    }

    /// Records a deny decision for the tuple.
    pub fn deny(&mut self, group: &str, resource: &str, subresource: &str, namespace: &str, verb: &str) {
        self.decisions.insert(tuple_key(group, resource, subresource, namespace, verb), Decision::Deny);
    }

    /// Answers a check: an exact tuple match returns the recorded decision
    /// with reason "mock decision"; a miss returns NoOpinion.
    #[must_use]
    pub fn authorize(&self, attributes: &AuthzAttributes) -> (Decision, &'static str) {
        let key = tuple_key(
            &attributes.group,
            &attributes.resource,
            &attributes.subresource,
            &attributes.namespace,
            &attributes.verb,
        );
        match self.decisions.get(&key) {
            Some(decision) => (*decision, "mock decision"),
            None => (Decision::NoOpinion, "no opinion"),
        }
    }
}

/// Formats the exact-match lookup key for a tuple.
fn tuple_key(group: &str, resource: &str, subresource: &str, namespace: &str, verb: &str) -> String {
    format!("{group}/{resource}/{subresource}/{namespace}/{verb}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(namespace: &str, verb: &str) -> AuthzAttributes {
        AuthzAttributes {
            group: String::new(),
            resource: "pods".to_string(),
            subresource: String::new(),
            namespace: namespace.to_string(),
            verb: verb.to_string(),
        }
    }

    #[test]
    fn exact_match_returns_recorded_decision() {
        let mut authorizer = MockAuthorizer::default();
        authorizer.allow("", "pods", "", "default", "create");

        let (decision, reason) = authorizer.authorize(&attributes("default", "create"));
        assert_eq!(decision, Decision::Allow);
        assert_eq!(reason, "mock decision");
    }

    #[test]
    fn miss_returns_no_opinion_without_wildcarding() {
        let mut authorizer = MockAuthorizer::default();
        authorizer.allow("", "pods", "", "default", "create");

        let (decision, reason) = authorizer.authorize(&attributes("other", "create"));
        assert_eq!(decision, Decision::NoOpinion);
        assert_eq!(reason, "no opinion");

        let (decision, _) = authorizer.authorize(&attributes("default", "delete"));
        assert_eq!(decision, Decision::NoOpinion);
    }

    #[test]
    fn records_deserialize_from_fixture_yaml() {
        let records: Vec<AuthorizerRecord> = serde_yaml::from_str(
            r"
- resource: pods
  namespace: default
  verb: create
  decision: allow
- group: apps
  resource: deployments
  verb: update
  decision: deny
",
        )
        .unwrap();

        let authorizer = MockAuthorizer::from_records(&records);
        let (decision, _) = authorizer.authorize(&attributes("default", "create"));
        assert_eq!(decision, Decision::Allow);

        let (decision, _) = authorizer.authorize(&AuthzAttributes {
            group: "apps".to_string(),
            resource: "deployments".to_string(),
            verb: "update".to_string(),
            ..AuthzAttributes::default()
        });
        assert_eq!(decision, Decision::Deny);
    }

    #[test]
    fn later_records_override_earlier_ones() {
        let records = vec![
            AuthorizerRecord {
                resource: "pods".to_string(),
                namespace: "default".to_string(),
                verb: "create".to_string(),
                decision: RecordedDecision::Allow,
                ..AuthorizerRecord::default()
            },
            AuthorizerRecord {
                resource: "pods".to_string(),
                namespace: "default".to_string(),
                verb: "create".to_string(),
                decision: RecordedDecision::Deny,
                ..AuthorizerRecord::default()
            },
        ];

        let authorizer = MockAuthorizer::from_records(&records);
        let (decision, _) = authorizer.authorize(&attributes("default", "create"));
        assert_eq!(decision, Decision::Deny);
    }
}
