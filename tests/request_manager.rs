use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use panel_client::{BatchItem, RequestError, RequestManager};
use tokio::sync::oneshot;

fn manager<T: Clone + Send + 'static>(max_concurrent: usize) -> RequestManager<T> {
    RequestManager::new(max_concurrent, Duration::from_millis(100))
}

#[tokio::test]
async fn identical_keys_run_once_and_share_the_value() {
    let manager = manager::<String>(4);
    let calls = Arc::new(AtomicUsize::new(0));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let first = {
        let calls = Arc::clone(&calls);
        manager.queue_request(
            "GET:/products",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.await;
                Ok("products".to_string())
            },
            5,
        )
    };
    let second = {
        let calls = Arc::clone(&calls);
        manager.queue_request(
            "GET:/products",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("other".to_string())
            },
            5,
        )
    };

    let first = tokio::spawn(first);
    let second = tokio::spawn(second);
    tokio::time::sleep(Duration::from_millis(20)).await;
    release_tx.send(()).unwrap();

    assert_eq!(first.await.unwrap(), Ok("products".to_string()));
    assert_eq!(second.await.unwrap(), Ok("products".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shared_failure_reaches_every_caller() {
    let manager = manager::<u32>(2);
    let calls = Arc::new(AtomicUsize::new(0));

    let make = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<u32, _>(RequestError::Status {
                status: 503,
                message: "down".to_string(),
            })
        }
    };
    let a = manager.queue_request("GET:/orders", make(Arc::clone(&calls)), 5);
    let b = manager.queue_request("GET:/orders", make(Arc::clone(&calls)), 5);
    let (a, b) = tokio::join!(a, b);

    let expected = Err(RequestError::Status {
        status: 503,
        message: "down".to_string(),
    });
    assert_eq!(a, expected);
    assert_eq!(b, expected);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn settled_keys_are_requested_again() {
    let manager = manager::<usize>(2);
    let calls = Arc::new(AtomicUsize::new(0));

    for expected in 1..=2 {
        let calls = Arc::clone(&calls);
        let value = manager
            .queue_request(
                "GET:/users",
                move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) },
                5,
            )
            .await;
        assert_eq!(value, Ok(expected));
    }
}

#[tokio::test]
async fn running_never_exceeds_the_bound() {
    let manager = manager::<usize>(3);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let pending: Vec<_> = (0..20)
        .map(|i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            manager.queue_request(
                format!("job-{i}"),
                move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                },
                (i % 4) as i32,
            )
        })
        .collect();

    let results = futures::future::join_all(pending).await;
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(Result::is_ok));
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn higher_priority_is_admitted_first() {
    let manager = manager::<i32>(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let pending: Vec<_> = [3, 9, 5]
        .into_iter()
        .map(|priority| {
            let order = Arc::clone(&order);
            manager.queue_request(
                format!("p-{priority}"),
                move || async move {
                    order.lock().unwrap().push(priority);
                    Ok(priority)
                },
                priority,
            )
        })
        .collect();
    futures::future::join_all(pending).await;

    assert_eq!(*order.lock().unwrap(), vec![9, 5, 3]);
}

#[tokio::test(flavor = "current_thread")]
async fn priority_order_is_stable_across_repeated_submissions() {
    for round in 0..300 {
        let manager = manager::<i32>(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let pending: Vec<_> = [3, 9, 5]
            .into_iter()
            .map(|priority| {
                let order = Arc::clone(&order);
                manager.queue_request(
                    format!("round-{round}-{priority}"),
                    move || async move {
                        order.lock().unwrap().push(priority);
                        Ok(priority)
                    },
                    priority,
                )
            })
            .collect();
        futures::future::join_all(pending).await;

        assert_eq!(*order.lock().unwrap(), vec![9, 5, 3], "round {round}");
    }
}

#[tokio::test]
async fn equal_priority_keeps_arrival_order() {
    let manager = manager::<&'static str>(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let pending: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let order = Arc::clone(&order);
            manager.queue_request(
                name,
                move || async move {
                    order.lock().unwrap().push(name);
                    Ok(name)
                },
                5,
            )
        })
        .collect();
    futures::future::join_all(pending).await;

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn batch_results_follow_input_order() {
    let manager = manager::<&'static str>(4);
    let items = vec![
        BatchItem::new(
            "slow",
            || async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok("slow-result")
            },
            5,
        ),
        BatchItem::new("fast", || async { Ok("fast-result") }, 5),
    ];

    let results = manager.batch_requests(items, None).await.unwrap();
    assert_eq!(results, vec!["slow-result", "fast-result"]);
}

#[tokio::test]
async fn batch_concurrency_override_caps_the_batch() {
    let manager = manager::<usize>(8);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let items = (0..6)
        .map(|i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            BatchItem::new(
                format!("batch-{i}"),
                move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                },
                5,
            )
        })
        .collect();

    let results = manager.batch_requests(items, Some(2)).await.unwrap();
    assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn batch_fails_with_the_first_error() {
    let manager = manager::<u8>(2);
    let items = vec![
        BatchItem::new("ok", || async { Ok(1) }, 5),
        BatchItem::new(
            "bad",
            || async { Err(RequestError::Api("nope".to_string())) },
            5,
        ),
    ];

    assert_eq!(
        manager.batch_requests(items, None).await,
        Err(RequestError::Api("nope".to_string()))
    );
}

#[tokio::test]
async fn request_after_clear_cache_is_independent() {
    let manager = manager::<&'static str>(4);
    let calls = Arc::new(AtomicUsize::new(0));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let before = {
        let calls = Arc::clone(&calls);
        manager.queue_request(
            "GET:/settings",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.await;
                Ok("stale")
            },
            5,
        )
    };
    let before = tokio::spawn(before);
    tokio::time::sleep(Duration::from_millis(10)).await;

    manager.clear_cache(None);
    let after = {
        let calls = Arc::clone(&calls);
        manager.queue_request(
            "GET:/settings",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh")
            },
            5,
        )
    };

    assert_eq!(after.await, Ok("fresh"));
    release_tx.send(()).unwrap();
    assert_eq!(before.await.unwrap(), Ok("stale"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clear_cache_prefix_only_touches_matching_keys() {
    let manager = manager::<&'static str>(4);
    let calls = Arc::new(AtomicUsize::new(0));
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

    let slow = |value: &'static str| {
        let calls = Arc::clone(&calls);
        let release_rx = Arc::clone(&release_rx);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(rx) = release_rx.lock().await.take() {
                let _ = rx.await;
            }
            Ok(value)
        }
    };

    let users = tokio::spawn(manager.queue_request("GET:/users", slow("users"), 5));
    tokio::time::sleep(Duration::from_millis(10)).await;

    manager.clear_cache(Some("GET:/orders"));
    let users_again = manager.queue_request("GET:/users", slow("users-2"), 5);

    release_tx.send(()).unwrap();
    assert_eq!(users.await.unwrap(), Ok("users"));
    assert_eq!(users_again.await, Ok("users"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn explode() -> Result<u8, RequestError> {
    panic!("thunk exploded")
}

#[tokio::test]
async fn panicking_thunk_settles_as_aborted() {
    let manager = manager::<u8>(1);
    let outcome = manager.queue_request("boom", explode, 5).await;
    assert!(matches!(outcome, Err(RequestError::Aborted(_))));

    // the slot was released
    let next = manager.queue_request("next", || async { Ok(7) }, 5).await;
    assert_eq!(next, Ok(7));
}

#[tokio::test]
async fn queue_status_reports_running_and_queued() {
    let manager = manager::<u8>(1);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let running = tokio::spawn(manager.queue_request(
        "a",
        move || async move {
            let _ = release_rx.await;
            Ok(1)
        },
        5,
    ));
    let queued = tokio::spawn(manager.queue_request("b", || async { Ok(2) }, 5));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = manager.queue_status();
    assert_eq!(status.running, 1);
    assert_eq!(status.queued, 1);
    assert_eq!(status.max_concurrent, 1);
    assert_eq!(status.pending_keys, 2);

    release_tx.send(()).unwrap();
    assert_eq!(running.await.unwrap(), Ok(1));
    assert_eq!(queued.await.unwrap(), Ok(2));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = manager.queue_status();
    assert_eq!((status.running, status.queued, status.pending_keys), (0, 0, 0));
}
