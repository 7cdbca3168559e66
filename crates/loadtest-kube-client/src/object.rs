//! Untyped resource documents.

use crate::error::ApiError;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// `apiVersion` + `kind` of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    /// The core `v1/Namespace` type.
    pub fn namespace() -> Self {
        Self::new("v1", "Namespace")
    }

    /// Split `apiVersion` into `(group, version)`. The core group is `""`.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }
}

impl fmt::Display for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Namespace and name of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An arbitrary resource document.
///
/// The document is always a JSON object; everything beyond `apiVersion`,
/// `kind` and the handful of `metadata` fields used by the runners is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct DynamicObject(Value);

impl TryFrom<Value> for DynamicObject {
    type Error = ApiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(ApiError::InvalidObject(format!(
                "expected a mapping, got {}",
                kind_of(&value)
            )))
        }
    }
}

impl Serialize for DynamicObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl DynamicObject {
    /// An empty document of the given type.
    pub fn new(type_meta: &TypeMeta) -> Self {
        let mut root = Map::new();
        root.insert(
            "apiVersion".to_string(),
            Value::String(type_meta.api_version.clone()),
        );
        root.insert("kind".to_string(), Value::String(type_meta.kind.clone()));
        root.insert("metadata".to_string(), Value::Object(Map::new()));
        Self(Value::Object(root))
    }

    /// A `v1/Namespace` document with the given name.
    pub fn namespace_object(name: &str) -> Self {
        let mut namespace = Self::new(&TypeMeta::namespace());
        namespace.set_name(name);
        namespace
    }

    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        Self::try_from(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    /// The document's type; fails when `apiVersion` or `kind` is missing.
    pub fn type_meta(&self) -> Result<TypeMeta, ApiError> {
        match (self.api_version(), self.kind()) {
            (Some(api_version), Some(kind)) if !api_version.is_empty() && !kind.is_empty() => {
                Ok(TypeMeta::new(api_version, kind))
            }
            _ => Err(ApiError::InvalidObject(
                "document must set both apiVersion and kind".to_string(),
            )),
        }
    }

    /// `metadata.name`, treating an empty string as absent.
    pub fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    /// `metadata.namespace`, treating an empty string as absent.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    pub fn set_name(&mut self, name: &str) {
        self.metadata_mut()
            .insert("name".to_string(), Value::String(name.to_string()));
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut().insert(
            "namespace".to_string(),
            Value::String(namespace.to_string()),
        );
    }

    /// Key of the object, if it has a name.
    pub fn key(&self) -> Option<ObjectKey> {
        self.name()
            .map(|name| ObjectKey::new(self.namespace(), name))
    }

    /// `metadata.labels`; non-string values are skipped.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.0
            .get("metadata")
            .and_then(|metadata| metadata.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn label(&self, key: &str) -> Option<String> {
        self.labels().remove(key)
    }

    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        let labels = labels
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>();
        self.metadata_mut()
            .insert("labels".to_string(), Value::Object(labels));
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_str("resourceVersion")
    }

    pub(crate) fn set_resource_version(&mut self, version: u64) {
        self.metadata_mut().insert(
            "resourceVersion".to_string(),
            Value::String(version.to_string()),
        );
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.0
            .get("metadata")
            .and_then(|metadata| metadata.get(field))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let root = match &mut self.0 {
            Value::Object(root) => root,
            other => {
                *other = Value::Object(Map::new());
                match other {
                    Value::Object(root) => root,
                    _ => unreachable!("value was just replaced with an object"),
                }
            }
        };
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        match metadata {
            Value::Object(metadata) => metadata,
            _ => unreachable!("metadata was just replaced with an object"),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
