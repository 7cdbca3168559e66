//! Kubernetes API sessions for load simulation.
//!
//! This crate provides the connection side of the load simulator: it turns
//! connection parameters (a kubeconfig path or the in-cluster service account)
//! into a ready-to-use session against the target API server, and exposes the
//! handful of operations the runners need on untyped resource documents.
//!
//! # Sessions
//!
//! - [`HttpConnector`] / [`HttpSession`] talk to a real API server over HTTPS,
//!   resolving resource paths through API discovery.
//! - [`MemoryConnector`] / [`MemorySession`] implement the same contract in
//!   process, for dry runs and tests.
//!
//! Both implement [`Connector`] and [`ApiSession`], so callers are written once
//! and monomorphized for whichever backend the CLI picks.
//!
//! # Idempotency
//!
//! Every operation reports "already exists" and "not found" as distinct
//! [`ApiError`] variants so that callers can treat them as success where the
//! operation is meant to be idempotent.

mod client;
mod discovery;
mod error;
mod kubeconfig;
mod memory;
mod object;
mod patch;
mod rate_limit;
mod session;

pub use client::{HttpConnector, HttpSession};
pub use discovery::ApiResource;
pub use error::{ApiError, ConnectError};
pub use kubeconfig::{
    Auth, ClusterConfig, ConnectParams, Kubeconfig, DEFAULT_BURST, DEFAULT_MAX_CONNS_PER_HOST,
    DEFAULT_MAX_IDLE_PER_HOST, DEFAULT_QPS,
};
pub use memory::{MemoryCluster, MemoryConnector, MemorySession, MemoryStats, Operation};
pub use object::{DynamicObject, ObjectKey, TypeMeta};
pub use patch::{apply_merge_patch, merge_patch};
pub use rate_limit::RateLimiter;
pub use session::{ApiSession, Connector};
