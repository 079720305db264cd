//! Group/version configuration for the mirror.
//!
//! The mirror copies everything served under the public group/version into
//! the internal group/version. Both default to the config API surface the
//! mirror was built for, and either can be overridden from the command line.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PUBLIC_GROUP: &str = "config.istio.io";
pub const DEFAULT_INTERNAL_GROUP: &str = "internal.istio.io";
pub const DEFAULT_API_VERSION: &str = "v1alpha2";

/// An API group paired with one of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// The `apiVersion` string objects of this group/version carry.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.api_version())
    }
}

fn default_public() -> GroupVersion {
    GroupVersion::new(DEFAULT_PUBLIC_GROUP, DEFAULT_API_VERSION)
}

fn default_internal() -> GroupVersion {
    GroupVersion::new(DEFAULT_INTERNAL_GROUP, DEFAULT_API_VERSION)
}

/// Source and destination of the mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default = "default_public")]
    pub public: GroupVersion,

    #[serde(default = "default_internal")]
    pub internal: GroupVersion,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            public: default_public(),
            internal: default_internal(),
        }
    }
}

impl MirrorConfig {
    /// Config sharing one version across both groups, as the CLI builds it.
    pub fn from_groups(public_group: &str, internal_group: &str, version: &str) -> Self {
        Self {
            public: GroupVersion::new(public_group, version),
            internal: GroupVersion::new(internal_group, version),
        }
    }
}
