//! Session traits.
//!
//! These traits are the boundary between the runners and the target API.
//! Runners are generic over a [`Connector`], so the HTTP and in-memory
//! backends are statically dispatched once the CLI has picked one.

use crate::error::{ApiError, ConnectError};
use crate::object::{DynamicObject, ObjectKey, TypeMeta};

/// An established, authenticated session against the target API.
#[async_trait::async_trait]
pub trait ApiSession: Send + Sync {
    /// Create `obj`, returning the stored object.
    ///
    /// Fails with [`ApiError::AlreadyExists`] if an object with the same key
    /// exists.
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ApiError>;

    /// Read the object of the given type stored under `key`.
    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<DynamicObject, ApiError>;

    /// Send the merge patch that turns `baseline` into `obj`.
    ///
    /// Only the fields that differ between the two documents are sent.
    async fn patch(
        &self,
        obj: &DynamicObject,
        baseline: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;

    /// Delete `obj`. Fails with [`ApiError::NotFound`] if it does not exist.
    async fn delete(&self, obj: &DynamicObject) -> Result<(), ApiError>;

    async fn create_namespace(&self, name: &str) -> Result<(), ApiError> {
        self.create(&DynamicObject::namespace_object(name))
            .await
            .map(|_| ())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ApiError> {
        self.delete(&DynamicObject::namespace_object(name)).await
    }
}

/// Produces sessions. A connect may fail transiently; callers retry.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Session: ApiSession + 'static;

    async fn connect(&self) -> Result<Self::Session, ConnectError>;
}
