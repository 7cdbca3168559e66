//! Pool and runner behaviour against the in-memory cluster.

use loadtest_kube_client::{
    ApiSession, Connector, MemoryCluster, MemoryConnector, ObjectKey, Operation, TypeMeta,
};
use loadtest_runner::{
    PhaseBoard, PoolConfig, RetryPolicy, Runner, RunnerPhase, RunnerPool, StopReason, Template,
    WorkerIdentity,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready, task};
use tokio_util::sync::CancellationToken;

const SAMPLE: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: sample
  labels:
    app: sample
data:
  key: value
"#;

const ACCESS_REVIEW: &str = r#"
apiVersion: authorization.k8s.io/v1
kind: SelfSubjectAccessReview
spec:
  resourceAttributes:
    verb: get
    resource: pods
"#;

fn sample() -> Template {
    Template::from_yaml(SAMPLE).unwrap()
}

fn config_map() -> TypeMeta {
    TypeMeta::new("v1", "ConfigMap")
}

fn sample_key(worker: usize) -> ObjectKey {
    let name = format!("sample-{worker}");
    ObjectKey::new(Some(name.as_str()), name.as_str())
}

fn single_runner(
    template: &Template,
    cluster: &MemoryCluster,
    config: &PoolConfig,
) -> (Runner<MemoryConnector>, CancellationToken, PhaseBoard) {
    let stop = CancellationToken::new();
    let phases = PhaseBoard::new(1);
    let runner = Runner::new(
        WorkerIdentity::new(0),
        template,
        Arc::new(MemoryConnector::new(cluster.clone())),
        config,
        stop.clone(),
        phases.clone(),
    );
    (runner, stop, phases)
}

#[tokio::test(start_paused = true)]
async fn test_label_matches_tick_count() {
    let cluster = MemoryCluster::new();
    let config = PoolConfig::new().with_interval(Duration::from_millis(10));
    let (runner, stop, phases) = single_runner(&sample(), &cluster, &config);

    let handle = tokio::spawn(runner.run());

    // Ticks fire at 10, 20 and 30 ms.
    tokio::time::sleep(Duration::from_millis(35)).await;
    let object = cluster.object(&config_map(), &sample_key(0)).unwrap();
    assert_eq!(object.label("hello").as_deref(), Some("world-3"));
    assert_eq!(object.label("app").as_deref(), Some("sample"));
    assert_eq!(phases.get(0), Some(RunnerPhase::Looping));

    stop.cancel();
    handle.await.unwrap();
    assert_eq!(phases.get(0), Some(RunnerPhase::Done));
    assert_eq!(cluster.object_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_tick_recreates_even_without_update() {
    let cluster = MemoryCluster::new();
    let config = PoolConfig::new()
        .with_interval(Duration::from_millis(10))
        .with_update(false);
    let (runner, stop, _) = single_runner(&sample(), &cluster, &config);

    let handle = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(45)).await;
    stop.cancel();
    handle.await.unwrap();

    let stats = cluster.stats();
    // Namespace and object up front, then both again on each of four ticks.
    assert_eq!(stats.creates, 2 + 2 * 4);
    assert_eq!(stats.gets, 0);
    assert_eq!(stats.patches, 0);
}

#[tokio::test(start_paused = true)]
async fn test_tick_restores_deleted_namespace() {
    let cluster = MemoryCluster::new();
    let config = PoolConfig::new()
        .with_interval(Duration::from_millis(10))
        .with_update(false);
    let (runner, stop, _) = single_runner(&sample(), &cluster, &config);

    let handle = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(cluster.namespace_exists("sample-0"));

    // Someone else removes the namespace, and the object with it, between ticks.
    let session = MemoryConnector::new(cluster.clone()).connect().await.unwrap();
    session.delete_namespace("sample-0").await.unwrap();
    assert!(!cluster.namespace_exists("sample-0"));
    assert!(cluster.object(&config_map(), &sample_key(0)).is_none());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cluster.namespace_exists("sample-0"));
    assert!(cluster.object(&config_map(), &sample_key(0)).is_some());

    stop.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_clean_only_nameless_template_skips_connect() {
    let cluster = MemoryCluster::new();
    let template = Template::from_yaml(ACCESS_REVIEW).unwrap();
    let config = PoolConfig::new().with_workers(3).with_clean_only(true);
    let pool = RunnerPool::new(config, template, MemoryConnector::new(cluster.clone()));

    let reason = pool.run(std::future::pending()).await;
    assert_eq!(reason, StopReason::CleanOnly);
    pool.wait().await;

    assert!(pool.phases().all_done());
    assert_eq!(cluster.stats().connects, 0);
    assert_eq!(cluster.stats().deletes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_thirty_attempts() {
    let cluster = MemoryCluster::new();
    cluster.fail_next_connects(u32::MAX);
    let config = PoolConfig::new();
    let (runner, _stop, phases) = single_runner(&sample(), &cluster, &config);

    let start = Instant::now();
    runner.run().await;
    let elapsed = start.elapsed();

    let stats = cluster.stats();
    assert_eq!(stats.connects, 30);
    assert_eq!(stats.creates, 0);
    assert_eq!(stats.deletes, 0);
    assert!(elapsed >= Duration::from_millis(290), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
    assert_eq!(phases.get(0), Some(RunnerPhase::Done));
}

#[tokio::test(start_paused = true)]
async fn test_connect_recovers_within_budget() {
    let cluster = MemoryCluster::new();
    cluster.fail_next_connects(5);
    let config = PoolConfig::new()
        .with_interval(Duration::from_millis(10))
        .with_connect_retry(RetryPolicy::new(10, Duration::from_millis(10)));
    let (runner, stop, _) = single_runner(&sample(), &cluster, &config);

    let handle = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cluster.namespace_exists("sample-0"));

    stop.cancel();
    handle.await.unwrap();
    assert_eq!(cluster.stats().connects, 6);
    assert!(!cluster.namespace_exists("sample-0"));
}

#[tokio::test(start_paused = true)]
async fn test_leftovers_do_not_block_a_new_run() {
    let cluster = MemoryCluster::new();
    let session = MemoryConnector::new(cluster.clone()).connect().await.unwrap();
    let leftover = sample().instantiate(WorkerIdentity::new(0));
    session.create_namespace("sample-0").await.unwrap();
    session.create(&leftover).await.unwrap();

    let config = PoolConfig::new()
        .with_workers(2)
        .with_interval(Duration::from_millis(10))
        .with_duration(Duration::from_millis(55));
    let pool = RunnerPool::new(config, sample(), MemoryConnector::new(cluster.clone()));

    let reason = pool.run(std::future::pending()).await;
    assert_eq!(reason, StopReason::Deadline(Duration::from_millis(55)));
    pool.wait().await;

    // Both runners reached the loop and patched.
    assert!(cluster.stats().patches >= 2 * 5);
    assert_eq!(cluster.object_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clean_only_removes_leftovers() {
    let cluster = MemoryCluster::new();
    let session = MemoryConnector::new(cluster.clone()).connect().await.unwrap();
    for worker in 0..2 {
        let leftover = sample().instantiate(WorkerIdentity::new(worker));
        session
            .create_namespace(leftover.namespace().unwrap())
            .await
            .unwrap();
        session.create(&leftover).await.unwrap();
    }
    assert_eq!(cluster.object_count(), 4);

    // Three workers: the third finds nothing and still finishes cleanly.
    let config = PoolConfig::new().with_workers(3).with_clean_only(true);
    let pool = RunnerPool::new(config, sample(), MemoryConnector::new(cluster.clone()));
    assert_eq!(pool.run(std::future::pending()).await, StopReason::CleanOnly);
    pool.wait().await;

    assert_eq!(cluster.object_count(), 0);
    assert_eq!(cluster.stats().creates, 4);
    assert!(pool.phases().all_done());
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_observed_within_one_interval() {
    let cluster = MemoryCluster::new();
    let interval = Duration::from_millis(10);
    let config = PoolConfig::new().with_interval(interval);
    let (runner, stop, phases) = single_runner(&sample(), &cluster, &config);

    let handle = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(25)).await;
    stop.cancel();

    tokio::time::timeout(interval, handle)
        .await
        .expect("runner did not stop within one interval")
        .unwrap();
    assert_eq!(phases.get(0), Some(RunnerPhase::Done));
}

#[tokio::test(start_paused = true)]
async fn test_barrier_drains_after_every_teardown() {
    let cluster = MemoryCluster::new();
    let workers = 8;
    let config = PoolConfig::new()
        .with_workers(workers)
        .with_interval(Duration::from_millis(5))
        .with_duration(Duration::from_millis(50));
    let pool = RunnerPool::new(config, sample(), MemoryConnector::new(cluster.clone()));

    pool.run(std::future::pending()).await;
    pool.wait().await;

    assert!(pool.phases().all_done());
    assert_eq!(cluster.object_count(), 0);
    let stats = cluster.stats();
    assert_eq!(stats.connects, workers as u64);
    // Object and namespace per worker.
    assert_eq!(stats.deletes, 2 * workers as u64);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_stops_the_pool() {
    let cluster = MemoryCluster::new();
    let config = PoolConfig::new()
        .with_workers(2)
        .with_duration(Duration::from_secs(3600));
    let pool = RunnerPool::new(config, sample(), MemoryConnector::new(cluster.clone()));
    let token = pool.stop_token();
    let mut stopped = task::spawn(token.cancelled());
    assert_pending!(stopped.poll());

    let start = Instant::now();
    let reason = pool
        .run(tokio::time::sleep(Duration::from_millis(20)))
        .await;
    assert_eq!(reason, StopReason::Interrupted);
    assert!(stopped.is_woken());
    assert_ready!(stopped.poll());

    pool.wait().await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(pool.phases().all_done());
    assert_eq!(cluster.object_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_skips_loop_but_tears_down() {
    let cluster = MemoryCluster::new();
    cluster.inject_failures(Operation::Create, 2);
    let config = PoolConfig::new().with_interval(Duration::from_millis(10));
    let (runner, stop, phases) = single_runner(&sample(), &cluster, &config);

    // The runner returns on its own: no loop to stop.
    stop.cancel();
    runner.run().await;

    let stats = cluster.stats();
    assert_eq!(stats.creates, 1);
    assert_eq!(stats.patches, 0);
    assert_eq!(stats.deletes, 2);
    assert_eq!(phases.get(0), Some(RunnerPhase::Done));
}

#[tokio::test(start_paused = true)]
async fn test_patch_failures_do_not_stop_the_loop() {
    let cluster = MemoryCluster::new();
    cluster.inject_failures(Operation::Patch, 2);
    let config = PoolConfig::new().with_interval(Duration::from_millis(10));
    let (runner, stop, _) = single_runner(&sample(), &cluster, &config);

    let handle = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(55)).await;

    // Ticks 1 and 2 failed; the counter still advanced.
    let object = cluster.object(&config_map(), &sample_key(0)).unwrap();
    assert_eq!(object.label("hello").as_deref(), Some("world-5"));
    assert_eq!(cluster.stats().patches, 5);

    stop.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_nameless_template_keeps_creating() {
    let cluster = MemoryCluster::new();
    let template = Template::from_yaml(ACCESS_REVIEW).unwrap();
    let config = PoolConfig::new()
        .with_workers(2)
        .with_interval(Duration::from_millis(10))
        .with_duration(Duration::from_millis(35));
    let pool = RunnerPool::new(config, template, MemoryConnector::new(cluster.clone()));

    pool.run(std::future::pending()).await;
    pool.wait().await;

    let stats = cluster.stats();
    // Initial create plus three ticks, per worker. No namespaces involved.
    assert_eq!(stats.creates, 2 * 4);
    assert_eq!(stats.patches, 0);
    assert_eq!(stats.deletes, 0);
    assert_eq!(cluster.object_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_run_does_not_dispatch_again() {
    let cluster = MemoryCluster::new();
    let config = PoolConfig::new()
        .with_workers(3)
        .with_interval(Duration::from_millis(10))
        .with_duration(Duration::from_millis(50));
    let pool = RunnerPool::new(config, sample(), MemoryConnector::new(cluster.clone()));

    let first = pool.run(std::future::pending()).await;
    assert_eq!(first, StopReason::Deadline(Duration::from_millis(50)));
    let second = pool.run(std::future::pending()).await;
    assert_eq!(second, StopReason::AlreadyStarted);
    pool.wait().await;

    let stats = cluster.stats();
    assert_eq!(stats.connects, 3);
    assert_eq!(stats.deletes, 2 * 3);
    assert_eq!(cluster.object_count(), 0);
    assert!(pool.phases().all_done());
}
