//! Send strategies: Standard rendezvous, ForgetOnSend queues and sterility

mod common;

use std::time::{Duration, Instant};

use activeobj::{ActiveError, BarrierScope, Runtime, RuntimeConfig, SendStrategy, Value};
use common::*;

fn slow_consumer_runtime(scope: BarrierScope) -> Runtime {
    Runtime::new(
        RuntimeConfig::builder()
            .mailbox_capacity(1)
            .forget_on_send_capacity(2)
            .barrier_scope(scope)
            .build(),
    )
}

#[tokio::test]
async fn test_forget_on_send_queue_stays_bounded() {
    init_logging();

    let runtime = slow_consumer_runtime(BarrierScope::AllQueues);
    runtime.register_strategy("record", SendStrategy::ForgetOnSend);
    let (journal, log) = Journal::new(Duration::from_millis(20));
    let proxy = runtime.activate(journal).unwrap();

    let mut max_seen = 0;
    for seq in 0..10i64 {
        proxy.submit("record", vec!["fos".into(), seq.into()]).await.unwrap();
        max_seen = max_seen.max(runtime.dispatcher().queue_len(proxy.id()));
    }
    println!("\n=== ForgetOnSend: max queue length {} ===", max_seen);
    assert!(max_seen <= 2, "queue grew past its capacity: {}", max_seen);

    // Standard call: waits for the queue to drain, then runs after all ten
    let count = proxy.submit("count", vec![]).await.unwrap().value().await.unwrap();
    assert_eq!(count, Value::Int(10));
    assert_eq!(log.sequence_of("fos"), (0..10).collect::<Vec<_>>());
    assert_eq!(runtime.dispatcher().queue_len(proxy.id()), 0);
}

#[tokio::test]
async fn test_standard_never_overtakes_forget_on_send() {
    init_logging();

    let runtime = slow_consumer_runtime(BarrierScope::AllQueues);
    runtime.register_strategy("record", SendStrategy::ForgetOnSend);
    let (journal, log) = Journal::new(Duration::from_millis(10));
    let proxy = runtime.activate(journal).unwrap();

    for seq in 0..5i64 {
        proxy.submit("record", vec!["mixed".into(), seq.into()]).await.unwrap();
    }
    // record_sync keeps the Standard strategy
    proxy.submit("record_sync", vec!["mixed".into(), 5.into()]).await.unwrap();

    assert_eq!(log.sequence_of("mixed"), vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_barrier_scope() {
    init_logging();

    async fn standard_call_latency(scope: BarrierScope) -> Duration {
        let runtime = slow_consumer_runtime(scope);
        runtime.register_strategy("record", SendStrategy::ForgetOnSend);
        let (slow, _) = Journal::new(Duration::from_millis(150));
        let (fast, _) = Journal::new(Duration::ZERO);
        let slow = runtime.activate(slow).unwrap();
        let fast = runtime.activate(fast).unwrap();

        // One served, one in the mailbox, two held in the queue
        for seq in 0..4i64 {
            slow.submit("record", vec!["bulk".into(), seq.into()]).await.unwrap();
        }

        let started = Instant::now();
        fast.submit("count", vec![]).await.unwrap();
        let elapsed = started.elapsed();
        runtime.shutdown().await;
        elapsed
    }

    let all = standard_call_latency(BarrierScope::AllQueues).await;
    let destination = standard_call_latency(BarrierScope::Destination).await;
    println!("\n=== Barrier scope: all queues {:?}, destination only {:?} ===", all, destination);

    assert!(all >= Duration::from_millis(100), "all-queues barrier did not wait: {:?}", all);
    assert!(destination < Duration::from_millis(100), "destination barrier waited: {:?}", destination);
}

#[tokio::test]
async fn test_sterile_request_cannot_reach_third_body() {
    init_logging();

    let runtime = Runtime::default();
    runtime.register_strategy("relay", SendStrategy::ForgetOnSend);
    let mut failures = runtime.subscribe_exceptions();

    let (a, log_a) = Journal::new(Duration::ZERO);
    let (b, log_b) = Journal::new(Duration::ZERO);
    let a = runtime.activate(a).unwrap();
    let b = runtime.activate(b).unwrap();

    // Relaying to another body from a sterile request is refused
    a.submit("relay", vec![b.as_value(), 1.into()]).await.unwrap();
    let failure = tokio::time::timeout(Duration::from_secs(5), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.method, "relay");
    assert_eq!(failure.destination, a.id());
    assert_eq!(
        failure.error,
        ActiveError::SterileViolation {
            source_body: a.id(),
            destination: b.id(),
        }
    );

    // Calling itself is allowed
    a.submit("relay", vec![a.as_value(), 2.into()]).await.unwrap();
    runtime.dispatcher().wait_for_empty().await;
    // The relayed record lands behind the first count
    a.submit("count", vec![]).await.unwrap();
    a.submit("count", vec![]).await.unwrap();
    assert_eq!(log_a.sequence_of("relay"), vec![2]);
    assert!(log_b.entries().is_empty());

    // The same relay sent with the Standard strategy is not sterile
    runtime.register_strategy("relay", SendStrategy::Standard);
    a.submit("relay", vec![b.as_value(), 3.into()]).await.unwrap();
    b.submit("count", vec![]).await.unwrap();
    a.submit("count", vec![]).await.unwrap();
    b.submit("count", vec![]).await.unwrap();
    assert_eq!(log_b.sequence_of("relay"), vec![3]);
}

#[tokio::test]
async fn test_forget_on_send_to_terminated_body_is_reported() {
    init_logging();

    let runtime = Runtime::default();
    runtime.register_strategy("record", SendStrategy::ForgetOnSend);
    let mut failures = runtime.subscribe_exceptions();

    let (journal, _) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();
    runtime.terminate(proxy.id()).await.unwrap();

    // Queued sends return before delivery; the failure arrives out of band
    proxy.submit("record", vec!["late".into(), 0.into()]).await.unwrap();
    let failure = tokio::time::timeout(Duration::from_secs(5), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.destination, proxy.id());
    assert_eq!(failure.method, "record");
    assert!(matches!(
        failure.error,
        ActiveError::BodyNotFound(_) | ActiveError::BodyTerminated(_)
    ));
}

#[tokio::test]
async fn test_standard_one_way_to_terminated_body_fails_at_caller() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, _) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();
    runtime.terminate(proxy.id()).await.unwrap();

    let err = proxy.submit("record", vec!["late".into(), 0.into()]).await.unwrap_err();
    assert_eq!(err, ActiveError::BodyTerminated(proxy.id()));
}

#[tokio::test]
async fn test_envelopes_are_recycled() {
    init_logging();

    let runtime = Runtime::default();
    runtime.register_strategy("record", SendStrategy::ForgetOnSend);
    let (journal, log) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();

    for seq in 0..200i64 {
        proxy.submit("record", vec!["pool".into(), seq.into()]).await.unwrap();
    }
    runtime.dispatcher().wait_for_empty().await;
    proxy.submit("count", vec![]).await.unwrap();

    assert_eq!(log.len(), 200);
    // Shells are reused: never more than a full queue plus the one being filled
    let bound = runtime.config().forget_on_send_capacity as u64 + 1;
    assert!(runtime.envelopes().allocated() <= bound);
}
