//! Runner pool for Kubernetes API load simulation.
//!
//! A [`RunnerPool`] starts a configurable number of [`Runner`]s. Each runner
//! specialises the shared [`Template`] for its [`WorkerIdentity`], obtains
//! its own session, creates its namespace and object, and then on every tick
//! patches a counter label and re-issues the create. When the pool's stop
//! signal fires, every runner deletes what it created before the pool's
//! completion barrier drains.
//!
//! ```no_run
//! use loadtest_kube_client::{MemoryCluster, MemoryConnector};
//! use loadtest_runner::{PoolConfig, RunnerPool, Template};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let template = Template::from_file("testdata/manifestwork-template.yaml")?;
//! let config = PoolConfig::new()
//!     .with_workers(4)
//!     .with_duration(Duration::from_secs(30));
//! let pool = RunnerPool::new(config, template, MemoryConnector::new(MemoryCluster::new()));
//!
//! pool.run(std::future::pending()).await;
//! pool.wait().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod phase;
mod pool;
mod retry;
mod runner;
mod template;

pub use config::{PoolConfig, DEFAULT_DURATION, DEFAULT_INTERVAL, DEFAULT_WORKERS};
pub use error::TemplateError;
pub use phase::{PhaseBoard, PhaseEntry, RunnerPhase};
pub use pool::{RunnerPool, StopReason};
pub use retry::RetryPolicy;
pub use runner::{Runner, LABEL_KEY, LABEL_VALUE_PREFIX};
pub use template::{Template, WorkerIdentity};
