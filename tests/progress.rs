//! Progress reporting and cancellation tests.

use std::future::ready;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchscale::{
    BatchScaleError, BatchScheduler, CancellationToken, Frame, OperationType, ProgressAction,
    ProgressCallback, ProgressInfo,
};

fn frames(count: usize) -> Vec<Frame> {
    (0..count)
        .map(|index| Frame {
            index,
            source: PathBuf::from(format!("in/{index}.png")),
            destination: PathBuf::from(format!("out/{index}.png")),
            delay: None,
        })
        .collect()
}

// ── CancellationToken ────────────────────────────────────────────

#[test]
fn cancellation_token_default() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
}

#[test]
fn cancellation_token_is_shared_between_clones() {
    let token = CancellationToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn cancellation_token_crosses_threads() {
    let token = CancellationToken::new();
    let remote = token.clone();
    std::thread::spawn(move || remote.cancel()).join().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn cancelled_resolves_immediately_when_already_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), token.cancelled())
        .await
        .expect("cancelled() should resolve at once");
}

#[tokio::test]
async fn cancelled_wakes_every_waiter() {
    let token = CancellationToken::new();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        })
        .collect();

    tokio::task::yield_now().await;
    token.cancel();
    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}

// ── ProgressCallback ─────────────────────────────────────────────

#[tokio::test]
async fn closure_sees_percentages_and_items() {
    let seen: Arc<Mutex<Vec<ProgressInfo>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: Arc<dyn ProgressCallback> = Arc::new(move |info: &ProgressInfo| {
        sink.lock().unwrap().push(info.clone());
        ProgressAction::Continue
    });

    let frames = frames(4);
    BatchScheduler::new(1)
        .run(
            &frames,
            |frame: &Frame| ready(Ok(frame.destination.clone())),
            callback,
            OperationType::GifUpscale,
            &CancellationToken::new(),
        )
        .await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|info| info.operation == OperationType::GifUpscale));
    assert_eq!(seen[0].current, 0);
    assert_eq!(seen[0].percentage, Some(0.0));
    assert_eq!(seen[0].current_item, None);
    assert_eq!(seen[0].estimated_remaining, None);

    assert_eq!(seen[2].current, 2);
    assert_eq!(seen[2].percentage, Some(50.0));
    assert_eq!(seen[2].current_item, Some(1));
    assert!(seen[2].estimated_remaining.is_some());

    assert_eq!(seen[4].percentage, Some(100.0));
    assert_eq!(seen[4].estimated_remaining, Some(Duration::ZERO));
}

#[tokio::test]
async fn stop_is_honoured_between_groups() {
    let callback: Arc<dyn ProgressCallback> = Arc::new(|info: &ProgressInfo| {
        if info.current == 4 {
            ProgressAction::Stop
        } else {
            ProgressAction::Continue
        }
    });

    let frames = frames(12);
    let report = BatchScheduler::new(4)
        .run(
            &frames,
            |frame: &Frame| ready(Ok(frame.destination.clone())),
            callback,
            OperationType::VideoUpscale,
            &CancellationToken::new(),
        )
        .await;

    assert!(report.stopped);
    assert_eq!(report.groups_dispatched, 1);
    assert_eq!(report.completed_indices(), vec![0, 1, 2, 3]);
}

// ── Cancellation during a run ────────────────────────────────────

#[tokio::test]
async fn cancelling_mid_group_lets_the_group_finish() {
    let token = CancellationToken::new();
    let frames = frames(9);

    let work_token = token.clone();
    let report = BatchScheduler::new(3)
        .run(
            &frames,
            move |frame: &Frame| {
                // Cancel while the second group is in flight.
                if frame.index == 4 {
                    work_token.cancel();
                }
                let output = frame.destination.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    Ok::<_, BatchScaleError>(output)
                }
            },
            Arc::new(|_: &ProgressInfo| ProgressAction::Continue),
            OperationType::GifUpscale,
            &token,
        )
        .await;

    assert!(report.stopped);
    assert_eq!(report.groups_dispatched, 2);
    assert_eq!(report.completed_indices(), vec![0, 1, 2, 3, 4, 5]);
    assert!(report.failures.is_empty());
}
