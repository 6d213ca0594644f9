// kaptest-cli/src/loader/policy.rs
// ============================================================================
// Module: Policy Set Loader
// Description: Policy and binding loading from multi-document YAML.
// Purpose: Collect every policy and binding declared under a suite directory.
// Dependencies: crate::loader, kaptest-core, serde_yaml
// ============================================================================

//! ## Overview
//! Policy files match `policy.yaml`, `policies.yaml`, `*.policy.yaml`, or
//! `*.policies.yaml` (and `.yml`); binding files match the `binding` /
//! `bindings` spellings. Each file may hold several YAML documents;
//! documents dispatch on their `kind`, unknown kinds are ignored, and
//! v1beta1 validating documents are rejected outright.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use kaptest_core::MutatingAdmissionPolicy;
use kaptest_core::MutatingAdmissionPolicyBinding;
use kaptest_core::ValidatingAdmissionPolicy;
use kaptest_core::ValidatingAdmissionPolicyBinding;
use serde::Deserialize;

use crate::loader::LoadError;

// ============================================================================
// SECTION: Policy Set
// ============================================================================

/// Policies and bindings loaded from one suite directory.
#[derive(Debug, Default)]
pub struct PolicySet {
    /// Validating policies in file order.
    pub validating_policies: Vec<ValidatingAdmissionPolicy>,
    /// Validating bindings in file order.
    pub validating_bindings: Vec<ValidatingAdmissionPolicyBinding>,
    /// Mutating policies in file order.
    pub mutating_policies: Vec<MutatingAdmissionPolicy>,
    /// Mutating bindings in file order.
    pub mutating_bindings: Vec<MutatingAdmissionPolicyBinding>,
}

impl PolicySet {
    /// Returns every policy name, mutating first, in file order.
    #[must_use]
    pub fn policy_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.mutating_policies.iter().map(|policy| policy.name().to_string()).collect();
        names.extend(self.validating_policies.iter().map(|policy| policy.name().to_string()));
        names
    }

    /// Finds a validating policy and its first matching binding.
    #[must_use]
    pub fn find_validating(
        &self,
        name: &str,
    ) -> Option<(&ValidatingAdmissionPolicy, Option<&ValidatingAdmissionPolicyBinding>)> {
        let policy = self.validating_policies.iter().find(|policy| policy.name() == name)?;
        let binding =
            self.validating_bindings.iter().find(|binding| binding.spec.policy_name == name);
        Some((policy, binding))
    }

    /// Finds a mutating policy and its first matching binding.
    #[must_use]
    pub fn find_mutating(
        &self,
        name: &str,
    ) -> Option<(&MutatingAdmissionPolicy, Option<&MutatingAdmissionPolicyBinding>)> {
        let policy = self.mutating_policies.iter().find(|policy| policy.name() == name)?;
        let binding = self.mutating_bindings.iter().find(|binding| binding.spec.policy_name == name);
        Some((policy, binding))
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads every policy and binding file under `directory`, recursing but
/// skipping `tests`, `testdata`, and dot-directories.
///
/// # Errors
///
/// Returns [`LoadError`] on unreadable files, malformed YAML, or
/// unsupported v1beta1 validating documents.
pub fn load_policy_set(directory: &Path) -> Result<PolicySet, LoadError> {
    let mut set = PolicySet::default();
    load_into(&mut set, directory)?;
    Ok(set)
}

/// Walks a directory tree collecting policy and binding documents.
fn load_into(set: &mut PolicySet, directory: &Path) -> Result<(), LoadError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(directory)
        .map_err(|err| LoadError::Io {
            path: directory.to_path_buf(),
            detail: err.to_string(),
        })?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            let skip = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_none_or(|name| name == "tests" || name == "testdata" || name.starts_with('.'));
            if !skip {
                load_into(set, &path)?;
            }
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_policy_file(name) && !is_binding_file(name) {
            continue;
        }

        let text = fs::read_to_string(&path).map_err(|err| LoadError::Io {
            path: path.clone(),
            detail: err.to_string(),
        })?;
        load_documents(set, &text, &path)?;
    }

    Ok(())
}

/// Splits a file into YAML documents and dispatches each on its kind.
fn load_documents(set: &mut PolicySet, text: &str, path: &Path) -> Result<(), LoadError> {
    for (offset, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let index = offset + 1;
        let value = serde_yaml::Value::deserialize(document).map_err(|err| LoadError::Yaml {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;

        let kind = value.get("kind").and_then(serde_yaml::Value::as_str).unwrap_or_default();
        let api_version =
            value.get("apiVersion").and_then(serde_yaml::Value::as_str).unwrap_or_default();

        match kind {
            "ValidatingAdmissionPolicy" | "ValidatingAdmissionPolicyBinding" => {
                if api_version.ends_with("/v1beta1") {
                    return Err(LoadError::UnsupportedV1Beta1 {
                        kind: kind.to_string(),
                        index,
                        path: path.to_path_buf(),
                    });
                }
                if kind == "ValidatingAdmissionPolicy" {
                    set.validating_policies.push(decode(value, path, index)?);
                } else {
                    set.validating_bindings.push(decode(value, path, index)?);
                }
            }
            "MutatingAdmissionPolicy" => {
                set.mutating_policies.push(decode(value, path, index)?);
            }
            "MutatingAdmissionPolicyBinding" => {
                set.mutating_bindings.push(decode(value, path, index)?);
            }
            _ => {}
        }
    }

    Ok(())
}

/// Decodes a YAML document into its typed manifest.
fn decode<T: serde::de::DeserializeOwned>(
    value: serde_yaml::Value,
    path: &Path,
    index: usize,
) -> Result<T, LoadError> {
    serde_yaml::from_value(value).map_err(|err| LoadError::Document {
        path: path.to_path_buf(),
        index,
        detail: err.to_string(),
    })
}

// ============================================================================
// SECTION: Filename Conventions
// ============================================================================

/// Matches policy.yaml, policies.yaml, *.policy.yaml, *.policies.yaml.
#[must_use]
pub fn is_policy_file(name: &str) -> bool {
    matches_convention(name, "policy") || matches_convention(name, "policies")
}

/// Matches binding.yaml, bindings.yaml, *.binding.yaml, *.bindings.yaml.
#[must_use]
pub fn is_binding_file(name: &str) -> bool {
    matches_convention(name, "binding") || matches_convention(name, "bindings")
}

/// Checks the `<stem>.yaml` / `*.<stem>.yaml` spellings for one stem.
fn matches_convention(name: &str, stem: &str) -> bool {
    for extension in ["yaml", "yml"] {
        if name == format!("{stem}.{extension}") || name.ends_with(&format!(".{stem}.{extension}")) {
            return true;
        }
    }
    false
}

// ============================================================================
// SECTION: Tests
// ============================================================================
