//! Runner pool coordinator.

use crate::config::PoolConfig;
use crate::phase::PhaseBoard;
use crate::runner::Runner;
use crate::template::{Template, WorkerIdentity};
use loadtest_kube_client::Connector;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Why [`RunnerPool::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured duration elapsed.
    Deadline(Duration),
    /// The interrupt future completed first.
    Interrupted,
    /// Clean-only run; runners stop on their own after deleting.
    CleanOnly,
    /// `run` had already been called; nothing was dispatched.
    AlreadyStarted,
}

/// Starts N runners and coordinates their shutdown.
///
/// Runners are dispatched once, by the first call to [`run`](Self::run),
/// which is also the only place the stop token is cancelled. The
/// task tracker is the completion barrier: it drains only when every runner
/// future, teardown included, has returned.
pub struct RunnerPool<C: Connector> {
    config: PoolConfig,
    template: Template,
    connector: Arc<C>,
    stop: CancellationToken,
    tracker: TaskTracker,
    phases: PhaseBoard,
    started: AtomicBool,
}

impl<C: Connector + 'static> RunnerPool<C> {
    pub fn new(config: PoolConfig, template: Template, connector: C) -> Self {
        let phases = PhaseBoard::new(config.workers);
        Self {
            config,
            template,
            connector: Arc::new(connector),
            stop: CancellationToken::new(),
            tracker: TaskTracker::new(),
            phases,
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn phases(&self) -> PhaseBoard {
        self.phases.clone()
    }

    fn dispatch(&self) {
        for index in 0..self.config.workers {
            let runner = Runner::new(
                WorkerIdentity::new(index),
                &self.template,
                Arc::clone(&self.connector),
                &self.config,
                self.stop.clone(),
                self.phases.clone(),
            );
            self.tracker.spawn(runner.run());
        }
        self.tracker.close();

        tracing::info!(
            "Started {} runners (interval {:?}, update {}, clean-only {})",
            self.config.workers,
            self.config.interval,
            self.config.update,
            self.config.clean_only
        );
    }

    /// Start every runner, then wait for the deadline or `interrupt`,
    /// whichever comes first, and fire the stop signal.
    ///
    /// In clean-only mode this returns right after dispatch. Call
    /// [`wait`](Self::wait) afterwards to block until all runners are done.
    pub async fn run<F>(&self, interrupt: F) -> StopReason
    where
        F: Future<Output = ()>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Runner pool already started, ignoring repeated run");
            return StopReason::AlreadyStarted;
        }
        self.dispatch();

        if self.config.clean_only {
            return StopReason::CleanOnly;
        }

        let reason = tokio::select! {
            _ = tokio::time::sleep(self.config.duration) => StopReason::Deadline(self.config.duration),
            _ = interrupt => StopReason::Interrupted,
        };

        match reason {
            StopReason::Interrupted => tracing::info!("Interrupted, stopping runners"),
            _ => tracing::info!("Run duration elapsed, stopping runners"),
        }
        self.stop.cancel();
        reason
    }

    /// Block until every dispatched runner has finished its teardown.
    pub async fn wait(&self) {
        self.tracker.wait().await;
        tracing::info!("All {} runners finished", self.config.workers);
    }
}
