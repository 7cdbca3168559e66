//! Shared resource template and per-worker instantiation.

use crate::error::TemplateError;
use loadtest_kube_client::DynamicObject;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Index of a runner in the pool, `0..N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerIdentity(usize);

impl WorkerIdentity {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    /// `"<base>-<index>"`, unique per worker for a given base.
    pub fn derive_name(&self, base: &str) -> String {
        format!("{base}-{}", self.0)
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable resource document loaded once and shared by every runner.
#[derive(Debug, Clone)]
pub struct Template {
    object: Arc<DynamicObject>,
}

impl Template {
    /// Read and validate a YAML template from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, TemplateError> {
        let value: serde_json::Value = serde_yaml::from_str(content)?;
        let object =
            DynamicObject::from_value(value).map_err(|e| TemplateError::Invalid(e.to_string()))?;
        Self::from_object(object)
    }

    pub fn from_object(object: DynamicObject) -> Result<Self, TemplateError> {
        object
            .type_meta()
            .map_err(|e| TemplateError::Invalid(e.to_string()))?;
        Ok(Self {
            object: Arc::new(object),
        })
    }

    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    /// Name the template carries, if any.
    pub fn base_name(&self) -> Option<&str> {
        self.object.name()
    }

    /// Deep copy specialised for `identity`.
    ///
    /// A named template yields an object named `"<name>-<identity>"` living in
    /// a namespace of the same name; any namespace in the template is
    /// replaced. A nameless template (an access review, say) is copied as is
    /// and the copy has no namespace.
    pub fn instantiate(&self, identity: WorkerIdentity) -> DynamicObject {
        let mut object = DynamicObject::clone(&self.object);
        if let Some(base) = self.base_name() {
            let name = identity.derive_name(base);
            object.set_name(&name);
            object.set_namespace(&name);
        }
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    const SAMPLE: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: sample
data:
  key: value
"#;

    #[test]
    fn test_instantiate_named_template() {
        let template = Template::from_yaml(SAMPLE).unwrap();
        let object = template.instantiate(WorkerIdentity::new(3));

        assert_eq!(object.name(), Some("sample-3"));
        assert_eq!(object.namespace(), Some("sample-3"));
        assert_eq!(object.as_value()["data"]["key"], "value");
        // The shared template is untouched.
        assert_eq!(template.object().name(), Some("sample"));
        assert_eq!(template.object().namespace(), None);
    }

    #[test]
    fn test_template_namespace_is_replaced() {
        let template = Template::from_yaml(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: sample\n  namespace: default\n",
        )
        .unwrap();
        let object = template.instantiate(WorkerIdentity::new(0));
        assert_eq!(object.namespace(), Some("sample-0"));
    }

    #[test]
    fn test_nameless_template_passes_through() {
        let template = Template::from_yaml(
            r#"
apiVersion: authorization.k8s.io/v1
kind: SelfSubjectAccessReview
spec:
  resourceAttributes:
    verb: get
    resource: pods
"#,
        )
        .unwrap();
        let object = template.instantiate(WorkerIdentity::new(7));

        assert_eq!(object.name(), None);
        assert_eq!(object.namespace(), None);
        assert_eq!(object.as_value(), template.object().as_value());
    }

    #[test]
    fn test_names_are_distinct() {
        let template = Template::from_yaml(SAMPLE).unwrap();
        let names: HashSet<String> = (0..100)
            .map(|i| {
                template
                    .instantiate(WorkerIdentity::new(i))
                    .name()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(names.len(), 100);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(
            Template::from_yaml("kind: ConfigMap\nmetadata:\n  name: x\n"),
            Err(TemplateError::Invalid(_))
        ));
        assert!(matches!(
            Template::from_yaml("- a\n- b\n"),
            Err(TemplateError::Invalid(_))
        ));
        assert!(matches!(
            Template::from_yaml("apiVersion: [unclosed"),
            Err(TemplateError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let template = Template::from_file(file.path()).unwrap();
        assert_eq!(template.base_name(), Some("sample"));

        let missing = Template::from_file("/nonexistent/template.yaml");
        assert!(matches!(missing, Err(TemplateError::Io { .. })));
    }
}
