use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use truthseeker::ratelimit::RateLimiter;

#[tokio::test(start_paused = true)]
async fn dispatches_are_spaced_and_served_in_submission_order() {
    let interval = Duration::from_millis(1100);
    let limiter = RateLimiter::new(interval);
    let start = Instant::now();

    let done = join_all((0..4).map(|i| {
        let limiter = &limiter;
        async move { limiter.schedule(|| async move { (i, start.elapsed()) }).await }
    }))
    .await;

    let order: Vec<i32> = done.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    for (k, (_, at)) in done.iter().enumerate() {
        assert!(
            *at >= interval * k as u32,
            "dispatch {k} at {at:?}, expected >= {:?}",
            interval * k as u32
        );
    }
}

#[tokio::test(start_paused = true)]
async fn distinct_limiters_do_not_wait_for_each_other() {
    let a = Arc::new(RateLimiter::new(Duration::from_secs(1)));
    let b = Arc::new(RateLimiter::new(Duration::from_secs(1)));
    let start = Instant::now();

    let run = |limiter: Arc<RateLimiter>| async move {
        limiter.schedule(|| async {}).await;
        limiter.schedule(|| async {}).await;
    };
    tokio::join!(run(a), run(b));

    // Each limiter spaced its own two calls; they overlapped with each other.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2), "limiters serialized: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn failing_task_returns_to_its_caller_and_queue_continues() {
    let limiter = RateLimiter::new(Duration::from_millis(500));
    let start = Instant::now();

    let (first, second) = tokio::join!(
        limiter.schedule(|| async { Err::<u32, String>("backend down".into()) }),
        limiter.schedule(|| async { Ok::<u32, String>(42) }),
    );

    assert_eq!(first, Err("backend down".to_string()));
    assert_eq!(second, Ok(42));
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn abandoned_caller_does_not_block_later_tasks() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500)));
    let start = Instant::now();

    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let slow = {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter
                .schedule(|| async move {
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_secs(1)).await;
                })
                .await
        })
    };
    started_rx.await.unwrap();

    // Gives up while queued behind the slow task.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        limiter.schedule(|| async { "never" }),
    )
    .await;
    assert!(abandoned.is_err());

    let later = limiter.schedule(|| async { start.elapsed() }).await;
    slow.await.unwrap();

    // Slow task finished at 1s; the next dispatch waits one interval after it.
    assert!(later >= Duration::from_millis(1500), "later ran at {later:?}");
    assert!(later < Duration::from_millis(1600), "later ran at {later:?}");
}
