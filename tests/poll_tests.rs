use shamah_client::poll::{start_polling, PollMode, PollingFetcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{self, Instant};

#[tokio::test(start_paused = true)]
async fn cancel_at_six_seconds_stops_the_ten_second_tick() {
    let origin = Instant::now();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();

    let handle = start_polling(
        move || {
            recorded
                .lock()
                .unwrap()
                .push(origin.elapsed().as_millis() as u64);
            async { Ok::<_, String>(()) }
        },
        Duration::from_millis(5000),
        |_| {},
    );

    time::sleep(Duration::from_millis(6000)).await;
    handle.cancel();
    time::sleep(Duration::from_millis(60_000)).await;

    assert_eq!(*calls.lock().unwrap(), vec![0, 5000]);
}

#[tokio::test(start_paused = true)]
async fn pollers_are_independent() {
    let fast = Arc::new(AtomicUsize::new(0));
    let slow = Arc::new(AtomicUsize::new(0));
    let (f, s) = (fast.clone(), slow.clone());

    let fast_handle = start_polling(
        || async { Ok::<_, String>(1) },
        Duration::from_millis(1000),
        move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        },
    );
    let _slow_handle = PollingFetcher::new(Duration::from_millis(3000))
        .with_mode(PollMode::FixedDelay)
        .start(
            || async { Ok::<_, String>(1) },
            move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            },
        );

    time::sleep(Duration::from_millis(3500)).await;
    fast_handle.cancel();
    assert_eq!(fast.load(Ordering::SeqCst), 4);
    assert_eq!(slow.load(Ordering::SeqCst), 2);

    time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(fast.load(Ordering::SeqCst), 4);
    assert_eq!(slow.load(Ordering::SeqCst), 3);
}
