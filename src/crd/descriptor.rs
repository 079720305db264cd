//! Resource type descriptors and CRD rewriting.

use crate::config::GroupVersion;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::GroupVersionKind;

/// Annotation kubectl leaves on applied objects; stale once copied elsewhere.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

const NAMESPACED_SCOPE: &str = "Namespaced";

/// Identifies one mirrorable resource type within one group/version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceTypeDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub list_kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceTypeDescriptor {
    /// Describe `definition` as served under `version`.
    ///
    /// Returns `None` when the definition has no version entry named
    /// `version`.
    pub fn from_definition(definition: &CustomResourceDefinition, version: &str) -> Option<Self> {
        let spec = &definition.spec;
        if !spec.versions.iter().any(|v| v.name == version) {
            return None;
        }
        let kind = spec.names.kind.clone();
        let list_kind = spec
            .names
            .list_kind
            .clone()
            .unwrap_or_else(|| format!("{}List", kind));
        Some(Self {
            group: spec.group.clone(),
            version: version.to_string(),
            kind,
            list_kind,
            plural: spec.names.plural.clone(),
            namespaced: spec.scope == NAMESPACED_SCOPE,
        })
    }

    /// Human readable `group/version/plural` used in logs.
    pub fn friendly_name(&self) -> String {
        format!("{}/{}/{}", self.group, self.version, self.plural)
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }
}

/// Whether `definition` declares `group_version`.
pub fn serves(definition: &CustomResourceDefinition, group_version: &GroupVersion) -> bool {
    definition.spec.group == group_version.group
        && definition
            .spec
            .versions
            .iter()
            .any(|v| v.name == group_version.version)
}

/// Describe every definition in `definitions` under `group_version`.
pub fn descriptors(
    definitions: &[CustomResourceDefinition],
    group_version: &GroupVersion,
) -> Vec<ResourceTypeDescriptor> {
    definitions
        .iter()
        .filter(|d| d.spec.group == group_version.group)
        .filter_map(|d| ResourceTypeDescriptor::from_definition(d, &group_version.version))
        .collect()
}

/// Rewrite a definition served under `from` so it can be created under `to`.
///
/// Only the `from` version entry survives, renamed to `to.version` and made
/// the served storage version. The name becomes `<plural>.<group>` and every
/// server-assigned field is cleared so the copy is accepted as a new object.
pub fn rewrite_definition(
    original: &CustomResourceDefinition,
    from: &GroupVersion,
    to: &GroupVersion,
) -> CustomResourceDefinition {
    let mut definition = original.clone();

    definition.spec.group = to.group.clone();
    definition.spec.versions.retain(|v| v.name == from.version);
    for version in definition.spec.versions.iter_mut() {
        version.name = to.version.clone();
        version.served = true;
        version.storage = true;
    }
    // A single version needs no conversion.
    definition.spec.conversion = None;

    let meta = &mut definition.metadata;
    meta.name = Some(format!(
        "{}.{}",
        definition.spec.names.plural, definition.spec.group
    ));
    meta.resource_version = None;
    meta.uid = None;
    meta.creation_timestamp = None;
    meta.generation = None;
    meta.managed_fields = None;
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(LAST_APPLIED_ANNOTATION);
    }
    definition.status = None;

    definition
}
