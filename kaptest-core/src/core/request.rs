// kaptest-core/src/core/request.rs
// ============================================================================
// Module: Admission Request Model
// Description: Admission request envelope, operations, and user identity.
// Purpose: Define the typed request inputs consumed by policy evaluation.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The admission request envelope mirrors the field names Kubernetes
//! publishes on `admission.k8s.io/v1` requests. Requests are plain data:
//! the evaluation engine reads them, projects them into the CEL `request`
//! variable, and never mutates them. Operation-specific invariants are
//! checked with [`AdmissionRequest::validate`] before evaluation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Admission operation carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Resource creation.
    #[serde(rename = "CREATE")]
    Create,
    /// Resource update; both `object` and `oldObject` are present.
    #[serde(rename = "UPDATE")]
    Update,
    /// Resource deletion; only `oldObject` is present.
    #[serde(rename = "DELETE")]
    Delete,
    /// Subresource connect; neither object is present.
    #[serde(rename = "CONNECT")]
    Connect,
}

impl Operation {
    /// Returns the uppercase wire name for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Group/Version Coordinates
// ============================================================================

/// Group, version, and kind of the request target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group; empty for the core group.
    #[serde(default)]
    pub group: String,
    /// API version.
    #[serde(default)]
    pub version: String,
    /// Object kind.
    #[serde(default)]
    pub kind: String,
}

/// Group, version, and resource of the request target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// API group; empty for the core group.
    #[serde(default)]
    pub group: String,
    /// API version.
    #[serde(default)]
    pub version: String,
    /// Lowercase plural resource name.
    #[serde(default)]
    pub resource: String,
}

// ============================================================================
// SECTION: User Identity
// ============================================================================

/// Authenticated user information attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Username of the requester.
    #[serde(default)]
    pub username: String,
    /// Unique identifier of the requester.
    #[serde(default)]
    pub uid: String,
    /// Group memberships of the requester.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Additional authentication attributes.
    #[serde(default)]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl UserInfo {
    /// Returns true when no identity fields are populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.uid.is_empty() && self.groups.is_empty() && self.extra.is_empty()
    }
}

// ============================================================================
// SECTION: Admission Request
// ============================================================================

/// Admission request envelope evaluated against a policy.
///
/// `object` and `oldObject` travel separately from the envelope so the
/// engine can clone and patch them without touching request metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Unique request identifier.
    #[serde(default)]
    pub uid: String,
    /// Kind of the request target.
    #[serde(default)]
    pub kind: Option<GroupVersionKind>,
    /// Resource of the request target.
    #[serde(default)]
    pub resource: Option<GroupVersionResource>,
    /// Subresource, when addressed (e.g. `status`, `exec`).
    #[serde(default)]
    pub sub_resource: String,
    /// Object name; may be empty for generated names.
    #[serde(default)]
    pub name: String,
    /// Object namespace; empty for cluster-scoped resources.
    #[serde(default)]
    pub namespace: String,
    /// Admission operation.
    #[serde(default)]
    pub operation: Option<Operation>,
    /// Requesting user identity.
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    /// Operation options (e.g. `DeleteOptions`), decoded to a mapping.
    #[serde(default)]
    pub options: Option<Value>,
    /// Dry-run flag.
    #[serde(default)]
    pub dry_run: Option<bool>,
}

impl AdmissionRequest {
    /// Checks operation-specific invariants against object presence.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the objects present do not match the
    /// operation: CREATE requires `object` only, DELETE requires
    /// `oldObject` only, UPDATE requires both, CONNECT requires neither
    /// plus an explicit subresource.
    pub fn validate(&self, has_object: bool, has_old_object: bool) -> Result<(), RequestError> {
        let Some(operation) = self.operation else {
            return Err(RequestError::MissingOperation);
        };

        match operation {
            Operation::Create => {
                if !has_object {
                    return Err(RequestError::CreateRequiresObject);
                }
                if has_old_object {
                    return Err(RequestError::CreateForbidsOldObject);
                }
            }
            Operation::Delete => {
                if !has_old_object {
                    return Err(RequestError::DeleteRequiresOldObject);
                }
                if has_object {
                    return Err(RequestError::DeleteForbidsObject);
                }
            }
            Operation::Update => {
                if !has_object {
                    return Err(RequestError::UpdateRequiresObject);
                }
                if !has_old_object {
                    return Err(RequestError::UpdateRequiresOldObject);
                }
            }
            Operation::Connect => {
                if has_object || has_old_object {
                    return Err(RequestError::ConnectForbidsObjects);
                }
                if self.sub_resource.is_empty() {
                    return Err(RequestError::ConnectRequiresSubResource);
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Admission request invariant violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// No operation was set or inferred.
    #[error("request has no operation")]
    MissingOperation,
    /// CREATE without an object.
    #[error("CREATE request requires object")]
    CreateRequiresObject,
    /// CREATE with an old object.
    #[error("CREATE request must not carry oldObject")]
    CreateForbidsOldObject,
    /// DELETE without an old object.
    #[error("DELETE request requires oldObject")]
    DeleteRequiresOldObject,
    /// DELETE with an object.
    #[error("DELETE request must not carry object")]
    DeleteForbidsObject,
    /// UPDATE without an object.
    #[error("UPDATE request requires object")]
    UpdateRequiresObject,
    /// UPDATE without an old object.
    #[error("UPDATE request requires oldObject")]
    UpdateRequiresOldObject,
    /// CONNECT with an object or old object.
    #[error("CONNECT request must not carry objects")]
    ConnectForbidsObjects,
    /// CONNECT without a subresource.
    #[error("CONNECT request requires subResource")]
    ConnectRequiresSubResource,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
