//! Execution guarantees of active objects
//!
//! Many callers hammering one body: requests must never overlap, and each
//! caller's requests must run in the order they were sent.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use activeobj::{wait_any, ActiveError, CallKind, Reply, Runtime, Value};
use common::*;
use futures::future::join_all;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_executor_under_contention() {
    init_logging();

    const CALLERS: usize = 16;
    const CALLS_PER_CALLER: usize = 50;

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();
    let stats = Arc::new(ConcurrentStats::new());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|caller| {
            let proxy = proxy.clone();
            let stats = stats.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                let name = format!("caller-{}", caller);
                barrier.wait().await;
                for seq in 0..CALLS_PER_CALLER as i64 {
                    let started = Instant::now();
                    // Alternate one-way and synchronous calls
                    let method = if seq % 2 == 0 { "record" } else { "record_sync" };
                    match proxy.submit(method, vec![name.as_str().into(), seq.into()]).await {
                        Ok(_) => stats.record_success(started.elapsed()),
                        Err(_) => stats.record_failure(),
                    }
                }
            })
        })
        .collect();
    join_all(handles).await;

    // A synchronous call is served after every earlier request of this caller,
    // but the other callers' one-way calls may still be queued.
    let deadline = Instant::now() + Duration::from_secs(10);
    while log.len() < CALLERS * CALLS_PER_CALLER && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    stats.print_report("At-most-one executor");
    println!("  violations:  {}", log.violations());

    assert_eq!(stats.failure_count(), 0);
    assert_eq!(log.len(), CALLERS * CALLS_PER_CALLER);
    assert_eq!(log.violations(), 0, "two requests executed at the same time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_caller_fifo() {
    init_logging();

    const CALLERS: usize = 8;
    const CALLS_PER_CALLER: i64 = 100;

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|caller| {
            let proxy = proxy.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                let name = format!("caller-{}", caller);
                barrier.wait().await;
                for seq in 0..CALLS_PER_CALLER {
                    proxy
                        .submit("record", vec![name.as_str().into(), seq.into()])
                        .await
                        .unwrap();
                }
                // Flush this caller's one-way calls
                proxy.submit("count", vec![]).await.unwrap();
            })
        })
        .collect();
    join_all(handles).await;

    let expected: Vec<i64> = (0..CALLS_PER_CALLER).collect();
    for caller in 0..CALLERS {
        let name = format!("caller-{}", caller);
        assert_eq!(log.sequence_of(&name), expected, "{} saw its calls reordered", name);
    }
    println!("\n=== Per-caller FIFO: {} callers x {} calls in order ===", CALLERS, CALLS_PER_CALLER);
}

#[tokio::test]
async fn test_mixed_call_kinds_keep_order() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::from_millis(5));
    let proxy = runtime.activate(journal).unwrap();

    assert_eq!(proxy.call("record", vec!["x".into(), 0.into()]).unwrap().kind(), CallKind::OneWay);
    assert_eq!(
        proxy.call("record_async", vec!["x".into(), 0.into()]).unwrap().kind(),
        CallKind::Asynchronous
    );
    assert_eq!(
        proxy.call("record_sync", vec!["x".into(), 0.into()]).unwrap().kind(),
        CallKind::Synchronous
    );

    proxy.submit("record", vec!["main".into(), 0.into()]).await.unwrap();
    let pending = proxy
        .submit("record_async", vec!["main".into(), 1.into()])
        .await
        .unwrap()
        .into_future()
        .unwrap();
    proxy.submit("record", vec!["main".into(), 2.into()]).await.unwrap();
    let reply = proxy.submit("record_sync", vec!["main".into(), 3.into()]).await.unwrap();

    // The sync result comes back after the three earlier calls ran
    assert!(matches!(reply, Reply::Value(Value::Int(4))));
    assert!(pending.is_resolved());
    assert_eq!(pending.wait().await.unwrap(), Value::List(vec![Value::Int(1)]));
    assert_eq!(log.sequence_of("main"), vec![0, 1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_future_shared_by_many_waiters() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, _log) = Journal::new(Duration::from_millis(50));
    let proxy = runtime.activate(journal).unwrap();

    let future = proxy
        .submit("record_async", vec!["shared".into(), 42.into()])
        .await
        .unwrap()
        .into_future()
        .unwrap();

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let future = future.clone();
            tokio::spawn(async move { future.wait().await })
        })
        .collect();

    for outcome in join_all(waiters).await {
        assert_eq!(outcome.unwrap().unwrap(), Value::List(vec![Value::Int(42)]));
    }
    assert_eq!(runtime.futures().pending_count(), 0);
}

#[tokio::test]
async fn test_wait_any_picks_first_resolved_body() {
    init_logging();

    let runtime = Runtime::default();
    let delays = [300u64, 10, 200];
    let mut futures = Vec::new();
    for (i, delay) in delays.iter().enumerate() {
        let (journal, _log) = Journal::new(Duration::from_millis(*delay));
        let proxy = runtime.activate(journal).unwrap();
        let future = proxy
            .submit("record_async", vec!["racer".into(), (i as i64).into()])
            .await
            .unwrap()
            .into_future()
            .unwrap();
        futures.push(future);
    }

    let winner = wait_any(&futures, Duration::from_secs(5)).await.unwrap();
    assert_eq!(winner, 1);
    assert_eq!(futures[1].try_outcome(), Some(Ok(Value::List(vec![Value::Int(1)]))));
}

#[tokio::test]
async fn test_sync_caller_blocks_until_served() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::from_millis(100));
    let proxy = runtime.activate(journal).unwrap();

    let started = Instant::now();
    proxy.submit("record", vec!["t".into(), 0.into()]).await.unwrap();
    let one_way = started.elapsed();

    let value = proxy
        .submit("record_sync", vec!["t".into(), 1.into()])
        .await
        .unwrap()
        .value()
        .await
        .unwrap();
    let sync = started.elapsed();

    println!("\n=== one-way returned after {:?}, sync after {:?} ===", one_way, sync);
    assert!(one_way < Duration::from_millis(100));
    assert!(sync >= Duration::from_millis(200));
    assert_eq!(value, Value::Int(2));
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn test_terminate_during_slow_backlog() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::from_millis(30));
    let proxy = runtime.activate(journal).unwrap();

    let mut futures = Vec::new();
    for seq in 0..5i64 {
        let reply = proxy.submit("record_async", vec!["backlog".into(), seq.into()]).await.unwrap();
        futures.push(reply.into_future().unwrap());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    runtime.terminate(proxy.id()).await.unwrap();

    let mut terminated = 0;
    for future in &futures {
        match future.wait_for(Duration::from_secs(5)).await.unwrap() {
            Ok(_) => {}
            Err(error) => {
                assert_eq!(error, ActiveError::BodyTerminated(proxy.id()));
                terminated += 1;
            }
        }
    }
    assert_eq!(log.len(), 1);
    assert_eq!(terminated, 4);
}
