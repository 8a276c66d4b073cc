//! Listener container integration tests
//!
//! Each test runs real containers against in-memory queues and checks what
//! the broker saw: commits, redeliveries and lease extensions.

mod common;

use common::{build_container, fast_options, wait_until, Invocation, TimingListener};
use queue_listener::acknowledgement::AcknowledgementOrdering;
use queue_listener::backpressure::BackPressureMode;
use queue_listener::listener::api::FifoBatchGroupingStrategy;
use queue_listener::listener::{ContainerState, ListenerContainerRegistry};
use queue_listener::queue::InMemoryQueue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn by_group(invocations: Vec<Invocation>) -> HashMap<String, Vec<Invocation>> {
    let mut groups: HashMap<String, Vec<Invocation>> = HashMap::new();
    for invocation in invocations {
        groups
            .entry(invocation.group.clone().unwrap_or_default())
            .or_default()
            .push(invocation);
    }
    groups
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_standard_queue_commits_every_message_once() {
    let queue = Arc::new(InMemoryQueue::new("orders"));
    for i in 0..50 {
        queue.send((i % 5).to_string(), None).unwrap();
    }
    let listener = TimingListener::new();
    let container = build_container("orders", &queue, listener.clone(), fast_options());

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()).await);
    assert!(container.stop().await);

    let stats = queue.stats();
    assert_eq!(stats.committed, 50);
    assert_eq!(stats.redelivered, 0);
    assert_eq!(listener.handled_ids().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_groups_of_seven_two_and_one() {
    let queue = Arc::new(InMemoryQueue::fifo("ledger"));
    let layout = [("g1", 7), ("g2", 2), ("g3", 1)];
    for round in 0..7 {
        for (group, count) in layout {
            if round < count {
                queue.send("20", Some(group)).unwrap();
            }
        }
    }
    let listener = TimingListener::new();
    let container = build_container(
        "ledger",
        &queue,
        listener.clone(),
        fast_options().with_fifo(true),
    );

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()).await);
    assert!(container.stop().await);

    let invocations = listener.invocations();
    let mut ids = listener.handled_ids();
    ids.dedup();
    assert_eq!(ids.len(), 10, "every message handled exactly once");
    assert_eq!(invocations.len(), 10);

    let groups = by_group(invocations);
    assert_eq!(groups["g1"].len(), 7);
    assert_eq!(groups["g2"].len(), 2);
    assert_eq!(groups["g3"].len(), 1);
    for (group, mut invocations) in groups {
        invocations.sort_by_key(|i| i.start);
        for pair in invocations.windows(2) {
            assert!(
                pair[0].sequence < pair[1].sequence,
                "group {} out of order",
                group
            );
            assert!(pair[1].start >= pair[0].end, "group {} overlapped", group);
        }
    }
    assert_eq!(queue.stats().committed, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_groups_share_one_ordered_batch() {
    let queue = Arc::new(InMemoryQueue::fifo("audit"));
    for i in 0..9 {
        queue.send("5", Some(["x", "y", "z"][i % 3])).unwrap();
    }
    let listener = TimingListener::new();
    let container = build_container(
        "audit",
        &queue,
        listener.clone(),
        fast_options()
            .with_fifo(true)
            .with_fifo_batch_grouping_strategy(
                FifoBatchGroupingStrategy::ProcessMultipleGroupsInSameBatch,
            ),
    );

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()).await);
    assert!(container.stop().await);

    let groups = by_group(listener.invocations());
    assert_eq!(groups.len(), 3);
    for (group, mut invocations) in groups {
        assert_eq!(invocations.len(), 3);
        invocations.sort_by_key(|i| i.start);
        for pair in invocations.windows(2) {
            assert!(
                pair[0].sequence < pair[1].sequence,
                "group {} out of order",
                group
            );
        }
    }
    assert_eq!(queue.stats().committed, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_batched_acknowledgement_by_group() {
    let queue = Arc::new(InMemoryQueue::fifo("payments"));
    for i in 0..12 {
        queue
            .send("5", Some(if i % 3 == 0 { "a" } else { "b" }))
            .unwrap();
    }
    let listener = TimingListener::new();
    let container = build_container(
        "payments",
        &queue,
        listener.clone(),
        fast_options()
            .with_fifo(true)
            .with_ack_threshold(3)
            .with_acknowledgement_ordering(AcknowledgementOrdering::OrderedByGroup),
    );

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()).await);
    assert!(container.stop().await);
    assert_eq!(queue.stats().committed, 12);
    assert_eq!(queue.stats().redelivered, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_message_is_redelivered_and_then_committed() {
    let queue = Arc::new(
        InMemoryQueue::new("retries").with_visibility_timeout(Duration::from_millis(200)),
    );
    queue.send("fail0", None).unwrap();
    queue.send("0", None).unwrap();
    let listener = TimingListener::new();
    let container = build_container("retries", &queue, listener.clone(), fast_options());

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || queue.stats().committed == 1).await);
    assert!(wait_until(Duration::from_secs(2), || queue.stats().redelivered >= 1).await);
    assert!(container.stop().await);

    // The rejected message keeps coming back; it is never committed
    assert_eq!(queue.size(), 1);
    assert!(listener.invocations().len() >= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leases_extended_for_slow_messages() {
    let visibility = Duration::from_millis(200);
    let queue = Arc::new(InMemoryQueue::new("slow").with_visibility_timeout(visibility));
    queue.send("700", None).unwrap();
    let listener = TimingListener::new();
    let container = build_container(
        "slow",
        &queue,
        listener.clone(),
        fast_options().with_message_visibility(visibility),
    );

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(3), || queue.is_empty()).await);
    assert!(container.stop().await);

    let stats = queue.stats();
    assert_eq!(stats.redelivered, 0);
    assert!(stats.lease_extensions >= 3, "{:?}", stats);
    assert_eq!(listener.invocations().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_always_poll_max_messages_still_processes_everything() {
    let queue = Arc::new(InMemoryQueue::new("bulk"));
    for _ in 0..30 {
        queue.send("5", None).unwrap();
    }
    let listener = TimingListener::new();
    let container = build_container(
        "bulk",
        &queue,
        listener.clone(),
        fast_options()
            .with_batch_size(5)
            .with_total_permits(10)
            .with_back_pressure_mode(BackPressureMode::AlwaysPollMaxMessages),
    );

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()).await);
    assert!(container.stop().await);
    assert_eq!(listener.handled_ids().len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_gives_up_after_timeout_and_commits_late_work() {
    let queue = Arc::new(InMemoryQueue::new("drain"));
    queue.send("2000", None).unwrap();
    let listener = TimingListener::new();
    let container = build_container("drain", &queue, listener.clone(), fast_options());

    container.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || queue.in_flight_count() == 1).await);

    let stopping = Instant::now();
    let clean = container.stop_with_timeout(Duration::from_secs(1)).await;
    let waited = stopping.elapsed();

    assert!(!clean);
    assert!(waited >= Duration::from_millis(900), "{:?}", waited);
    assert!(waited < Duration::from_millis(1500), "{:?}", waited);
    assert_eq!(container.state(), ContainerState::Stopped);

    assert!(wait_until(Duration::from_secs(3), || queue.is_empty()).await);
    assert_eq!(queue.stats().committed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registry_runs_standard_and_fifo_containers() {
    let standard = Arc::new(InMemoryQueue::new("events"));
    let fifo = Arc::new(InMemoryQueue::fifo("commands"));
    for i in 0..20 {
        standard.send("1", None).unwrap();
        fifo.send("1", Some(&format!("g{}", i % 4))).unwrap();
    }

    let registry = ListenerContainerRegistry::new();
    registry
        .register(build_container(
            "events",
            &standard,
            TimingListener::new(),
            fast_options(),
        ))
        .unwrap();
    registry
        .register(build_container(
            "commands",
            &fifo,
            TimingListener::new(),
            fast_options().with_fifo(true),
        ))
        .unwrap();

    registry.start_all().unwrap();
    assert!(registry.is_running());
    assert!(
        wait_until(Duration::from_secs(10), || standard.is_empty() && fifo.is_empty()).await
    );
    assert!(registry.stop_all().await);
    assert!(!registry.is_running());

    assert_eq!(standard.stats().committed, 20);
    assert_eq!(fifo.stats().committed, 20);
}
