//! Lifecycle of a single worker: connect, create, tick, tear down.

use crate::config::PoolConfig;
use crate::phase::{PhaseBoard, RunnerPhase};
use crate::retry::RetryPolicy;
use crate::template::{Template, WorkerIdentity};
use loadtest_kube_client::{ApiSession, Connector, DynamicObject};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Label patched on every tick.
pub const LABEL_KEY: &str = "hello";
/// Prefix of the label value; the tick counter is appended.
pub const LABEL_VALUE_PREFIX: &str = "world-";

/// Drives one resource through create, periodic update and delete.
///
/// The runner owns its specialised copy of the template and its session;
/// the only state it shares with other runners is the stop token and its
/// slot on the phase board.
pub struct Runner<C: Connector> {
    identity: WorkerIdentity,
    desired: DynamicObject,
    connector: Arc<C>,
    interval: Duration,
    update: bool,
    clean_only: bool,
    connect_retry: RetryPolicy,
    stop: CancellationToken,
    phases: PhaseBoard,
    patches_attempted: u64,
}

impl<C: Connector + 'static> Runner<C> {
    pub fn new(
        identity: WorkerIdentity,
        template: &Template,
        connector: Arc<C>,
        config: &PoolConfig,
        stop: CancellationToken,
        phases: PhaseBoard,
    ) -> Self {
        phases.set(identity.index(), RunnerPhase::Initializing);
        Self {
            identity,
            desired: template.instantiate(identity),
            connector,
            interval: config.interval.max(Duration::from_millis(1)),
            update: config.update,
            clean_only: config.clean_only,
            connect_retry: config.connect_retry,
            stop,
            phases,
            patches_attempted: 0,
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    /// The object this runner creates.
    pub fn desired(&self) -> &DynamicObject {
        &self.desired
    }

    /// Run to completion. Never fails: every error is logged and ends at
    /// most this runner.
    pub async fn run(mut self) {
        if self.clean_only {
            self.clean().await;
        } else {
            self.apply().await;
        }
        self.set_phase(RunnerPhase::Done);
        tracing::debug!("Runner {} done", self.identity);
    }

    async fn apply(&mut self) {
        let Some(session) = self.connect().await else {
            return;
        };

        if self.create(&session).await {
            self.run_loop(&session).await;
        }
        self.teardown(&session).await;
    }

    async fn clean(&mut self) {
        if self.desired.namespace().is_none() {
            tracing::debug!("Runner {} has nothing to clean", self.identity);
            return;
        }
        let Some(session) = self.connect().await else {
            return;
        };
        self.teardown(&session).await;
    }

    async fn connect(&self) -> Option<C::Session> {
        self.set_phase(RunnerPhase::Connecting);
        let connector = Arc::clone(&self.connector);
        let what = format!("Runner {} connect", self.identity);

        match self
            .connect_retry
            .retry(&what, move || {
                let connector = Arc::clone(&connector);
                async move { connector.connect().await }
            })
            .await
        {
            Ok(session) => Some(session),
            Err(_) => {
                tracing::error!(
                    "Runner {} giving up after {} connection attempts",
                    self.identity,
                    self.connect_retry.max_attempts
                );
                None
            }
        }
    }

    /// Create the namespace, then the object. Returns false when the loop
    /// should be skipped.
    async fn create(&self, session: &C::Session) -> bool {
        self.set_phase(RunnerPhase::Creating);

        match self.ensure_created(session).await {
            Ok(()) => {
                tracing::info!("Runner {} created {}", self.identity, self.describe());
                true
            }
            Err(e) => {
                tracing::error!("Runner {} {}", self.identity, e);
                false
            }
        }
    }

    /// Namespace first, then the object. AlreadyExists counts as created.
    async fn ensure_created(&self, session: &C::Session) -> Result<(), String> {
        if let Some(namespace) = self.desired.namespace() {
            match session.create_namespace(namespace).await {
                Ok(()) => tracing::debug!("Runner {} created namespace {}", self.identity, namespace),
                Err(e) if e.is_already_exists() => {
                    tracing::debug!("Runner {} namespace {} already exists", self.identity, namespace)
                }
                Err(e) => return Err(format!("failed to create namespace {namespace}: {e}")),
            }
        }

        match session.create(&self.desired).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                tracing::debug!("Runner {} {} already exists", self.identity, self.describe());
                Ok(())
            }
            Err(e) => Err(format!("failed to create {}: {}", self.describe(), e)),
        }
    }

    async fn run_loop(&mut self, session: &C::Session) {
        self.set_phase(RunnerPhase::Looping);
        let stop = self.stop.clone();
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    tracing::debug!("Runner {} stopping", self.identity);
                    break;
                }
                _ = ticker.tick() => self.tick(session).await,
            }
        }
    }

    /// One iteration: optional label patch, then an unconditional re-create
    /// of the namespace and the object.
    /// Neither step's failure affects the other.
    async fn tick(&mut self, session: &C::Session) {
        if self.update {
            self.update_labels(session).await;
        }

        if let Err(e) = self.ensure_created(session).await {
            tracing::error!("Runner {} re-create: {}", self.identity, e);
        }
    }

    async fn update_labels(&mut self, session: &C::Session) {
        let Some(key) = self.desired.key() else {
            return;
        };
        let type_meta = match self.desired.type_meta() {
            Ok(type_meta) => type_meta,
            Err(e) => {
                tracing::error!("Runner {} cannot patch: {}", self.identity, e);
                return;
            }
        };

        let baseline = match session.get(&type_meta, &key).await {
            Ok(current) => current,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::error!("Runner {} failed to get {}: {}", self.identity, key, e);
                }
                return;
            }
        };

        self.patches_attempted += 1;
        let mut modified = baseline.clone();
        let mut labels = modified.labels();
        labels.insert(
            LABEL_KEY.to_string(),
            format!("{LABEL_VALUE_PREFIX}{}", self.patches_attempted),
        );
        modified.set_labels(labels);

        if let Err(e) = session.patch(&modified, &baseline).await {
            tracing::error!("Runner {} failed to patch {}: {}", self.identity, key, e);
        }
    }

    /// Delete the object, then its namespace. Both are attempted; failures
    /// are logged and not retried.
    async fn teardown(&self, session: &C::Session) {
        let Some(namespace) = self.desired.namespace() else {
            return;
        };
        self.set_phase(RunnerPhase::Deleting);

        match session.delete(&self.desired).await {
            Ok(()) => tracing::info!("Runner {} deleted {}", self.identity, self.describe()),
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::error!(
                "Runner {} failed to delete {}: {}",
                self.identity,
                self.describe(),
                e
            ),
        }

        match session.delete_namespace(namespace).await {
            Ok(()) => tracing::debug!("Runner {} deleted namespace {}", self.identity, namespace),
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::error!(
                "Runner {} failed to delete namespace {}: {}",
                self.identity,
                namespace,
                e
            ),
        }
    }

    fn set_phase(&self, phase: RunnerPhase) {
        self.phases.set(self.identity.index(), phase);
    }

    fn describe(&self) -> String {
        let kind = self.desired.kind().unwrap_or("object");
        match self.desired.key() {
            Some(key) => format!("{kind} {key}"),
            None => kind.to_string(),
        }
    }
}
