//! REST mapping from `apiVersion`/`kind` to resource paths.

use crate::object::TypeMeta;
use serde::Deserialize;

/// A served resource type and where to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResource {
    pub group: String,
    pub version: String,
    /// Plural resource name used in URLs, e.g. `manifestworks`.
    pub plural: String,
    pub namespaced: bool,
}

impl ApiResource {
    /// Discovery path listing the resources of a group version.
    pub fn discovery_path(type_meta: &TypeMeta) -> String {
        match type_meta.group_version() {
            ("", version) => format!("/api/{version}"),
            (group, version) => format!("/apis/{group}/{version}"),
        }
    }

    fn base_path(&self) -> String {
        if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        }
    }

    /// Path that objects are POSTed to.
    pub fn collection_path(&self, namespace: Option<&str>) -> String {
        match namespace.filter(|_| self.namespaced) {
            Some(namespace) => format!(
                "{}/namespaces/{}/{}",
                self.base_path(),
                namespace,
                self.plural
            ),
            None => format!("{}/{}", self.base_path(), self.plural),
        }
    }

    /// Path of a single named object.
    pub fn object_path(&self, namespace: Option<&str>, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }
}

/// Body of `GET /api/v1` and `GET /apis/<group>/<version>`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResourceList {
    #[serde(default)]
    resources: Vec<ApiResourceEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiResourceEntry {
    name: String,
    #[serde(default)]
    namespaced: bool,
    kind: String,
}

impl ApiResourceList {
    /// The top-level resource serving `type_meta.kind`. Subresources such as
    /// `pods/status` share the kind of their parent and are skipped.
    pub(crate) fn find(&self, type_meta: &TypeMeta) -> Option<ApiResource> {
        let (group, version) = type_meta.group_version();
        self.resources
            .iter()
            .find(|entry| entry.kind == type_meta.kind && !entry.name.contains('/'))
            .map(|entry| ApiResource {
                group: group.to_string(),
                version: version.to_string(),
                plural: entry.name.clone(),
                namespaced: entry.namespaced,
            })
    }
}
