//! Admission queue behavior: window admission, pacing, backoff, and clearing.
//!
//! Every timing test runs on a paused tokio clock, so sleeps auto-advance and
//! the asserted offsets are deterministic.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use quota_sync::config::AdmissionConfig;
use quota_sync::core::{AdmissionError, AdmissionQueue, ApiError, ApiResponse, RateLimitHeaders};
use quota_sync::runtime::TokioSpawner;

fn admission(max_requests: u32, window_ms: u64, delay_ms: u64) -> AdmissionConfig {
    AdmissionConfig {
        max_requests_per_window: max_requests,
        window_duration_ms: window_ms,
        request_delay_ms: delay_ms,
        max_retries: 3,
        base_backoff_ms: 1000,
        max_backoff_ms: 60_000,
        low_quota_ratio: 0.15,
    }
}

type CallLog = Arc<Mutex<Vec<(usize, Instant)>>>;

fn offsets(log: &CallLog, start: Instant) -> Vec<(usize, Duration)> {
    log.lock()
        .unwrap()
        .iter()
        .map(|(i, at)| (*i, *at - start))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_window_defers_overflow_to_next_window() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(3, 1000, 10), TokioSpawner::current());
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let log = Arc::clone(&log);
            queue.enqueue(move || {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push((i, Instant::now()));
                    Ok::<_, ApiError>(ApiResponse::new(i))
                }
            })
        })
        .collect();

    let results: Vec<usize> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(results, vec![0, 1, 2, 3, 4]);

    let calls = offsets(&log, start);
    assert_eq!(calls.len(), 5);
    for (i, offset) in &calls[..3] {
        assert!(*offset < Duration::from_millis(1000), "item {i} at {offset:?}");
    }
    for (i, offset) in &calls[3..] {
        assert!(*offset >= Duration::from_millis(1000), "item {i} at {offset:?}");
    }

    let status = queue.status();
    assert_eq!(status.request_count, 2);
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.stats.dispatched, 5);
    assert_eq!(status.stats.succeeded, 5);
}

#[tokio::test(start_paused = true)]
async fn test_requests_dispatch_in_fifo_order_one_at_a_time() {
    let queue = AdmissionQueue::new(admission(1000, 60_000, 0), TokioSpawner::current());
    let order = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let order = Arc::clone(&order);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            queue.enqueue(move || {
                let order = Arc::clone(&order);
                let in_flight = Arc::clone(&in_flight);
                let max_in_flight = Arc::clone(&max_in_flight);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    order.lock().unwrap().push(i);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(ApiResponse::new(()))
                }
            })
        })
        .collect();

    for result in join_all(handles).await {
        assert!(result.is_ok());
    }
    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_delay_spaces_dispatches() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(100, 60_000, 250), TokioSpawner::current());
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let log = Arc::clone(&log);
            queue.enqueue(move || {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push((i, Instant::now()));
                    Ok::<_, ApiError>(ApiResponse::new(()))
                }
            })
        })
        .collect();
    join_all(handles).await;

    let calls = offsets(&log, start);
    assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(250));
    assert!(calls[2].1 - calls[1].1 >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_throttled_call_is_retried_after_backoff() {
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());
    let attempts = Arc::new(AtomicU32::new(0));
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let handle = {
        let attempts = Arc::clone(&attempts);
        let log = Arc::clone(&log);
        queue.enqueue(move || {
            let attempts = Arc::clone(&attempts);
            let log = Arc::clone(&log);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                log.lock().unwrap().push((n as usize, Instant::now()));
                if n == 0 {
                    Err(ApiError::from_status(429, "too many requests", None))
                } else {
                    Ok(ApiResponse::new("payload".to_string()))
                }
            }
        })
    };

    assert_eq!(handle.await.unwrap(), "payload");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let calls = offsets(&log, start);
    assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(1000));

    let stats = queue.status().stats;
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_a_floor() {
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let handle = {
        let attempts = Arc::clone(&attempts);
        queue.enqueue(move || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::from_status(429, "slow down", None).with_retry_after(Some(5)))
                } else {
                    Ok(ApiResponse::new(()))
                }
            }
        })
    };

    handle.await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_retry_budget() {
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let handle = {
        let attempts = Arc::clone(&attempts);
        queue.enqueue(move || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<ApiResponse<()>, _>(ApiError::from_status(503, "unavailable", None))
            }
        })
    };

    let err = handle.await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Api {
            attempts: 4,
            source: ApiError::Transient {
                status: Some(503),
                ..
            }
        }
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    // 1s + 2s + 4s of backoff
    assert!(start.elapsed() >= Duration::from_secs(7));

    let stats = queue.status().stats;
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());
    let attempts = Arc::new(AtomicU32::new(0));

    let handle = {
        let attempts = Arc::clone(&attempts);
        queue.enqueue(move || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<ApiResponse<()>, _>(ApiError::from_status(403, "forbidden", None))
            }
        })
    };

    let err = handle.await.unwrap_err();
    assert!(matches!(err, AdmissionError::Api { attempts: 1, .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(queue.status().stats.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_consume_window_slots() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(2, 60_000, 0), TokioSpawner::current());
    let attempts = Arc::new(AtomicU32::new(0));
    let second_at = Arc::new(Mutex::new(None));

    let flaky = {
        let attempts = Arc::clone(&attempts);
        queue.enqueue(move || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::transient("connection reset"))
                } else {
                    Ok(ApiResponse::new(()))
                }
            }
        })
    };
    let next = {
        let second_at = Arc::clone(&second_at);
        queue.enqueue(move || {
            let second_at = Arc::clone(&second_at);
            async move {
                *second_at.lock().unwrap() = Some(Instant::now());
                Ok::<_, ApiError>(ApiResponse::new(()))
            }
        })
    };

    flaky.await.unwrap();
    next.await.unwrap();

    let dispatched_at = second_at.lock().unwrap().unwrap();
    assert!(dispatched_at - start >= Duration::from_millis(60_000));
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_triples_next_delay() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(100, 60_000, 100), TokioSpawner::current());
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let log = Arc::clone(&log);
            queue.enqueue(move || {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push((i, Instant::now()));
                    let remaining = if i == 0 { 5 } else { 90 };
                    Ok::<_, ApiError>(ApiResponse::new(()).with_rate_limit(RateLimitHeaders {
                        limit: 100,
                        remaining,
                        reset_at_unix_secs: 0,
                    }))
                }
            })
        })
        .collect();
    join_all(handles).await;

    let calls = offsets(&log, start);
    assert_eq!(calls[0].1, Duration::ZERO);
    assert!(calls[1].1 >= Duration::from_millis(300));
    let gap = calls[2].1 - calls[1].1;
    assert!(gap >= Duration::from_millis(100) && gap < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_clear_queue_cancels_pending_and_queue_recovers() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(1, 60_000, 0), TokioSpawner::current());
    let ok = || async { Ok::<_, ApiError>(ApiResponse::new(())) };

    let first = queue.enqueue(ok);
    let second = queue.enqueue(ok);
    let third = queue.enqueue(ok);

    // let the drain loop dispatch the first request and block on the window
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(queue.status().queue_length, 2);

    assert_eq!(queue.clear_queue(), 2);
    let status = queue.status();
    assert_eq!(status.queue_length, 0);
    assert!(!status.is_processing);
    assert_eq!(status.stats.cancelled, 2);

    assert!(first.await.is_ok());
    assert!(matches!(second.await, Err(AdmissionError::Cancelled)));
    assert!(matches!(third.await, Err(AdmissionError::Cancelled)));

    let after = queue.enqueue(ok);
    assert!(after.await.is_ok());
    assert!(start.elapsed() >= Duration::from_millis(59_000));
    assert_eq!(queue.status().stats.succeeded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_in_flight_call_keeps_one_dispatcher() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let call = |i: usize, latency: Duration| {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let log = Arc::clone(&log);
        move || {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push((i, Instant::now()));
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(latency).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ApiError>(ApiResponse::new(i))
            }
        }
    };

    let slow = queue.enqueue(call(0, Duration::from_secs(5)));
    tokio::time::sleep(Duration::from_millis(1)).await;

    // nothing pending, the slow call is already in flight
    assert_eq!(queue.clear_queue(), 0);
    assert!(!queue.status().is_processing);

    let fast = queue.enqueue(call(1, Duration::from_millis(10)));
    assert!(queue.status().is_processing);

    assert_eq!(slow.await.unwrap(), 0);
    assert_eq!(fast.await.unwrap(), 1);

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    let calls = offsets(&log, start);
    assert_eq!(calls.len(), 2);
    assert!(calls[1].1 >= Duration::from_secs(5));
    assert_eq!(queue.status().stats.dispatched, 2);
    assert_eq!(queue.status().request_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_on_error_response_slows_next_dispatch() {
    let start = Instant::now();
    let queue = AdmissionQueue::new(admission(100, 60_000, 100), TokioSpawner::current());
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let log = Arc::clone(&log);
            queue.enqueue(move || {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push((i, Instant::now()));
                    if i == 0 {
                        let headers = RateLimitHeaders {
                            limit: 100,
                            remaining: 10,
                            reset_at_unix_secs: 0,
                        };
                        return Err(ApiError::from_status(400, "bad cursor", Some(headers)));
                    }
                    Ok(ApiResponse::new(()))
                }
            })
        })
        .collect();
    let results = join_all(handles).await;

    assert!(matches!(
        &results[0],
        Err(AdmissionError::Api { attempts: 1, .. })
    ));
    assert!(results[1].is_ok());
    assert_eq!(queue.status().stats.retries, 0);

    let calls = offsets(&log, start);
    assert_eq!(calls[0].1, Duration::ZERO);
    assert!(calls[1].1 >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_mixed_result_types_share_one_queue() {
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());

    let text = queue.enqueue(|| async { Ok::<_, ApiError>(ApiResponse::new("profile".to_string())) });
    let count = queue.enqueue(|| async { Ok::<_, ApiError>(ApiResponse::new(42_u32)) });
    assert_ne!(text.id(), count.id());

    assert_eq!(text.await.unwrap(), "profile");
    assert_eq!(count.await.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_still_runs_work() {
    let queue = AdmissionQueue::new(admission(100, 60_000, 0), TokioSpawner::current());
    let ran = Arc::new(AtomicU32::new(0));

    {
        let ran = Arc::clone(&ran);
        drop(queue.enqueue(move || {
            let ran = Arc::clone(&ran);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(ApiResponse::new(()))
            }
        }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(queue.status().stats.succeeded, 1);
}

#[tokio::test]
async fn test_status_of_idle_queue() {
    let queue = AdmissionQueue::new(admission(180, 900_000, 1000), TokioSpawner::current());
    let status = queue.status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.request_count, 0);
    assert_eq!(status.max_requests, 180);
    assert!(!status.is_processing);
    assert_eq!(status.stats, Default::default());
    assert_eq!(queue.status().window_start, status.window_start);
}
