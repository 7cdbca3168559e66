//! In-process API server.
//!
//! Mirrors the semantics the runners depend on: namespaced objects need an
//! existing namespace, duplicate creates report `AlreadyExists`, missing
//! objects report `NotFound`, patches are JSON merge patches, and deleting a
//! namespace removes everything in it. Objects without a name behave like
//! access reviews: the create is answered and nothing is stored.

use crate::error::{ApiError, ConnectError};
use crate::object::{DynamicObject, ObjectKey, TypeMeta};
use crate::patch::{apply_merge_patch, merge_patch};
use crate::session::{ApiSession, Connector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Patch,
    Delete,
}

/// Number of calls seen per operation, failed ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: u64,
    pub creates: u64,
    pub gets: u64,
    pub patches: u64,
    pub deletes: u64,
}

type StoreKey = (TypeMeta, Option<String>, String);

#[derive(Debug, Default)]
struct ClusterState {
    objects: HashMap<StoreKey, DynamicObject>,
    resource_version: u64,
    connect_failures: u32,
    injected: HashMap<Operation, u32>,
    stats: MemoryStats,
}

impl ClusterState {
    fn take_injected(&mut self, op: Operation) -> Result<(), ApiError> {
        match self.injected.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ApiError::Status {
                    code: 500,
                    reason: "InternalError".to_string(),
                    message: format!("injected {op:?} failure"),
                })
            }
            _ => Ok(()),
        }
    }

    fn namespace_exists(&self, namespace: &str) -> bool {
        self.objects
            .contains_key(&(TypeMeta::namespace(), None, namespace.to_string()))
    }

    fn next_version(&mut self) -> u64 {
        self.resource_version += 1;
        self.resource_version
    }
}

/// Shared in-memory object store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        // Poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` connects fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    /// Make the next `count` calls of `op` fail with an internal error.
    pub fn inject_failures(&self, op: Operation, count: u32) {
        self.lock().injected.insert(op, count);
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }

    /// Number of stored objects, namespaces included.
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.lock().namespace_exists(namespace)
    }

    /// Read an object without going through a session (and without counting).
    pub fn object(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Option<DynamicObject> {
        self.lock()
            .objects
            .get(&store_key(type_meta, key))
            .cloned()
    }

    fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ApiError> {
        let mut state = self.lock();
        state.stats.creates += 1;
        state.take_injected(Operation::Create)?;

        let type_meta = obj.type_meta()?;
        let Some(key) = scoped_key(&type_meta, obj) else {
            return Ok(obj.clone());
        };
        if let Some(namespace) = &key.namespace {
            if !state.namespace_exists(namespace) {
                return Err(ApiError::NotFound(format!("namespace {namespace}")));
            }
        }

        let store_key = store_key(&type_meta, &key);
        if state.objects.contains_key(&store_key) {
            return Err(ApiError::AlreadyExists(format!("{} {}", type_meta.kind, key)));
        }

        let mut stored = obj.clone();
        stored.set_resource_version(state.next_version());
        state.objects.insert(store_key, stored.clone());
        Ok(stored)
    }

    fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<DynamicObject, ApiError> {
        let mut state = self.lock();
        state.stats.gets += 1;
        state.take_injected(Operation::Get)?;

        state
            .objects
            .get(&store_key(type_meta, key))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", type_meta.kind, key)))
    }

    fn patch(
        &self,
        obj: &DynamicObject,
        baseline: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let mut state = self.lock();
        state.stats.patches += 1;
        state.take_injected(Operation::Patch)?;

        let type_meta = obj.type_meta()?;
        let key = scoped_key(&type_meta, obj)
            .ok_or_else(|| ApiError::InvalidObject("object has no name".to_string()))?;
        let version = state.next_version();
        let stored = state
            .objects
            .get_mut(&store_key(&type_meta, &key))
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", type_meta.kind, key)))?;

        let patch = merge_patch(baseline.as_value(), obj.as_value());
        let mut value = stored.as_value().clone();
        apply_merge_patch(&mut value, &patch);
        let mut patched = DynamicObject::from_value(value)?;
        patched.set_resource_version(version);
        *stored = patched.clone();
        Ok(patched)
    }

    fn delete(&self, obj: &DynamicObject) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.stats.deletes += 1;
        state.take_injected(Operation::Delete)?;

        let type_meta = obj.type_meta()?;
        let key = scoped_key(&type_meta, obj)
            .ok_or_else(|| ApiError::InvalidObject("object has no name".to_string()))?;
        if state
            .objects
            .remove(&store_key(&type_meta, &key))
            .is_none()
        {
            return Err(ApiError::NotFound(format!("{} {}", type_meta.kind, key)));
        }

        if type_meta == TypeMeta::namespace() {
            state
                .objects
                .retain(|(_, namespace, _), _| namespace.as_deref() != Some(key.name.as_str()));
        }
        Ok(())
    }
}

fn store_key(type_meta: &TypeMeta, key: &ObjectKey) -> StoreKey {
    (type_meta.clone(), key.namespace.clone(), key.name.clone())
}

/// Key of `obj`, with the namespace dropped for cluster-scoped namespaces.
fn scoped_key(type_meta: &TypeMeta, obj: &DynamicObject) -> Option<ObjectKey> {
    let name = obj.name()?;
    if *type_meta == TypeMeta::namespace() {
        return Some(ObjectKey::new(None, name));
    }
    Some(ObjectKey::new(obj.namespace(), name))
}

/// Hands out sessions on a [`MemoryCluster`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    cluster: MemoryCluster,
}

impl MemoryConnector {
    pub fn new(cluster: MemoryCluster) -> Self {
        Self { cluster }
    }

    pub fn cluster(&self) -> &MemoryCluster {
        &self.cluster
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession, ConnectError> {
        let mut state = self.cluster.lock();
        state.stats.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ConnectError::Unavailable(
                "in-memory cluster refused the connection".to_string(),
            ));
        }
        Ok(MemorySession {
            cluster: self.cluster.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemorySession {
    cluster: MemoryCluster,
}

#[async_trait::async_trait]
impl ApiSession for MemorySession {
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ApiError> {
        self.cluster.create(obj)
    }

    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<DynamicObject, ApiError> {
        self.cluster.get(type_meta, key)
    }

    async fn patch(
        &self,
        obj: &DynamicObject,
        baseline: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        self.cluster.patch(obj, baseline)
    }

    async fn delete(&self, obj: &DynamicObject) -> Result<(), ApiError> {
        self.cluster.delete(obj)
    }
}
