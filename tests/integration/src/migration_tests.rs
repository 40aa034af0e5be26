//! Relocating bodies while they are being called

mod common;

use std::sync::Arc;
use std::time::Duration;

use activeobj::{ActiveError, BodyState, Reply, Runtime, Value};
use common::*;
use futures::future::join_all;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_preserved_across_migrations() {
    init_logging();

    const CALLS: i64 = 300;

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();
    let id = proxy.id();
    let barrier = Arc::new(Barrier::new(2));

    let sender = {
        let proxy = proxy.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            for seq in 0..CALLS {
                proxy.submit("record", vec!["stream".into(), seq.into()]).await.unwrap();
                if seq % 25 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mover = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(2)).await;
                runtime.migrate(id).await.unwrap();
            }
        })
    };

    sender.await.unwrap();
    mover.await.unwrap();
    proxy.submit("count", vec![]).await.unwrap();

    assert_eq!(log.sequence_of("stream"), (0..CALLS).collect::<Vec<_>>());
    assert_eq!(log.violations(), 0);
    println!("\n=== {} calls in order across 3 migrations ===", CALLS);
}

#[tokio::test]
async fn test_identity_and_state_survive_migration() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();

    for seq in 0..5i64 {
        proxy.submit("record", vec!["before".into(), seq.into()]).await.unwrap();
    }
    let hash_before = proxy.submit("hash_code", vec![]).await.unwrap().value().await.unwrap();

    runtime.migrate(proxy.id()).await.unwrap();
    assert!(runtime.is_alive(proxy.id()));
    assert_ne!(runtime.body_state(proxy.id()), Some(BodyState::Stopped));

    // The object moved with its state
    let count = proxy.submit("count", vec![]).await.unwrap();
    assert!(matches!(count, Reply::Value(Value::Int(5))));
    assert_eq!(log.len(), 5);

    let hash_after = proxy.submit("hash_code", vec![]).await.unwrap().value().await.unwrap();
    assert_eq!(hash_before, hash_after);
    let fresh = runtime.proxy_for(proxy.id()).unwrap();
    assert_eq!(fresh, proxy);
}

#[tokio::test]
async fn test_stale_proxies_follow_the_body() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::ZERO);
    let original = runtime.activate(journal).unwrap();
    let stale: Vec<_> = (0..4).map(|_| runtime.proxy_for(original.id()).unwrap()).collect();

    runtime.migrate(original.id()).await.unwrap();
    runtime.migrate(original.id()).await.unwrap();

    let calls = stale.iter().enumerate().map(|(i, proxy)| async move {
        proxy
            .submit("record_sync", vec![format!("stale-{}", i).into(), 0.into()])
            .await
    });
    for outcome in join_all(calls).await {
        outcome.unwrap();
    }

    assert_eq!(log.len(), 4);
    assert_eq!(runtime.directory().len(), 1);
}

#[tokio::test]
async fn test_pending_futures_resolve_after_migration() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, _) = Journal::new(Duration::from_millis(20));
    let proxy = runtime.activate(journal).unwrap();

    let mut futures = Vec::new();
    for seq in 0..5i64 {
        let reply = proxy.submit("record_async", vec!["f".into(), seq.into()]).await.unwrap();
        futures.push(reply.into_future().unwrap());
    }
    runtime.migrate(proxy.id()).await.unwrap();
    for seq in 5..8i64 {
        let reply = proxy.submit("record_async", vec!["f".into(), seq.into()]).await.unwrap();
        futures.push(reply.into_future().unwrap());
    }

    for (seq, future) in futures.iter().enumerate() {
        let value = future.wait_for(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(seq as i64)]));
    }
}

#[tokio::test]
async fn test_body_calling_itself_while_migrating() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, log) = Journal::new(Duration::from_millis(50));
    let proxy = runtime.activate(journal).unwrap();

    // echo sleeps, then calls its own object while the move is under way
    proxy.submit("echo", vec![7.into()]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    tokio::time::timeout(Duration::from_secs(3), runtime.migrate(proxy.id()))
        .await
        .expect("migration stalled")
        .unwrap();

    // The self-call landed at the successor ahead of this one
    let count = proxy.submit("count", vec![]).await.unwrap();
    assert!(matches!(count, Reply::Value(Value::Int(1))));
    assert_eq!(log.sequence_of("echo"), vec![7]);
    assert_eq!(log.violations(), 0);
}

#[tokio::test]
async fn test_migrating_terminated_body_fails() {
    init_logging();

    let runtime = Runtime::default();
    let (journal, _) = Journal::new(Duration::ZERO);
    let proxy = runtime.activate(journal).unwrap();
    runtime.terminate(proxy.id()).await.unwrap();

    let err = runtime.migrate(proxy.id()).await.unwrap_err();
    assert_eq!(err, ActiveError::BodyNotFound(proxy.id()));
}
