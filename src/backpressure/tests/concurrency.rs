//! Tests for the concurrency limiter

#[cfg(test)]
mod tests {
    use crate::backpressure::{
        BackPressureHandler, BatchAwareBackPressureHandler, ConcurrencyLimiterHandler,
        ReleaseReason,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinSet;

    fn limiter(total: usize, timeout_ms: u64) -> ConcurrencyLimiterHandler {
        ConcurrencyLimiterHandler::new(total, 5, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_grants_up_to_available_permits() {
        let handler = limiter(10, 50);

        assert_eq!(handler.request(4).await, 4);
        assert_eq!(handler.request(10).await, 6);
        assert_eq!(handler.in_flight(), 10);
        assert_eq!(handler.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_request_never_exceeds_total_permits() {
        let handler = limiter(3, 50);
        assert_eq!(handler.request(100).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_with_zero() {
        let handler = limiter(2, 100);
        assert_eq!(handler.request(2).await, 2);

        let started = tokio::time::Instant::now();
        assert_eq!(handler.request(1).await, 0);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_release_wakes_waiting_request() {
        let handler = Arc::new(limiter(2, 2_000));
        assert_eq!(handler.request(2).await, 2);

        let waiter = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.request(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handler.release(1, ReleaseReason::Processed);

        let granted = waiter.await.unwrap();
        assert_eq!(granted, 1);
        assert_eq!(handler.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_over_release_is_clamped() {
        let handler = limiter(4, 50);
        assert_eq!(handler.request(2).await, 2);

        handler.release(5, ReleaseReason::Processed);
        handler.release(0, ReleaseReason::NoneFetched);

        assert_eq!(handler.in_flight(), 0);
        assert_eq!(handler.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_request_batch_uses_batch_size() {
        let handler = limiter(10, 50);
        assert_eq!(handler.batch_size(), 5);
        assert_eq!(handler.request_batch().await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_total_under_contention() {
        let total = 7;
        let handler = Arc::new(limiter(total, 20));
        let held = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = JoinSet::new();
        for worker in 0..12usize {
            let handler = handler.clone();
            let held = held.clone();
            let peak = peak.clone();
            tasks.spawn(async move {
                for round in 0..25usize {
                    let wanted = (worker + round) % 5 + 1;
                    let granted = handler.request(wanted).await;
                    assert!(granted <= wanted);
                    let now_held = held.fetch_add(granted, Ordering::SeqCst) + granted;
                    peak.fetch_max(now_held, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_micros(200)).await;
                    held.fetch_sub(granted, Ordering::SeqCst);
                    handler.release(granted, ReleaseReason::Processed);
                }
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= total,
            "peak {} exceeded {} permits",
            peak.load(Ordering::SeqCst),
            total
        );
        assert_eq!(handler.in_flight(), 0);
        assert_eq!(handler.available_permits(), total);
    }

    #[tokio::test]
    async fn test_drain_completes_when_all_permits_returned() {
        let handler = Arc::new(limiter(3, 50));
        assert_eq!(handler.request(3).await, 3);

        let releaser = {
            let handler = handler.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                handler.release(3, ReleaseReason::Processed);
            })
        };

        assert!(handler.drain(Duration::from_secs(1)).await);
        releaser.await.unwrap();
        assert_eq!(handler.request(1).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out_with_permits_outstanding() {
        let handler = limiter(3, 50);
        assert_eq!(handler.request(1).await, 1);

        assert!(!handler.drain(Duration::from_secs(1)).await);
        assert_eq!(handler.request(1).await, 0);

        // A late release is still accepted after a failed drain
        handler.release(1, ReleaseReason::Processed);
        assert_eq!(handler.in_flight(), 0);
    }
}
