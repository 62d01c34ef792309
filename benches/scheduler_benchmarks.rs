//! Benchmarks for frame scheduling and timing transforms.
//!
//! Run with: cargo bench
//!
//! The work function completes immediately so the numbers measure the
//! scheduler's own overhead rather than any upscaler.

use std::future::ready;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batchscale::{
    AnimationTiming, BatchScaleError, BatchScheduler, CancellationToken, Frame, OperationType,
    ProgressAction, ProgressCallback, ProgressInfo,
};
use criterion::Criterion;
use tokio::runtime::Runtime;

fn frames(count: usize) -> Vec<Frame> {
    (0..count)
        .map(|index| Frame {
            index,
            source: PathBuf::from(format!("frames/frame{index:08}.png")),
            destination: PathBuf::from(format!("upscaled/frame{index:08}.png")),
            delay: Some(4),
        })
        .collect()
}

fn silent() -> Arc<dyn ProgressCallback> {
    Arc::new(|_: &ProgressInfo| ProgressAction::Continue)
}

fn benchmark_scheduler(criterion: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let frames = frames(1_000);
    let token = CancellationToken::new();

    let mut group = criterion.benchmark_group("scheduler");
    group.sample_size(50);

    for parallelism in [1, 4, 16] {
        let scheduler = BatchScheduler::new(parallelism);
        group.bench_function(format!("1000 frames, {parallelism} wide"), |bencher| {
            bencher.iter(|| {
                rt.block_on(async {
                    let report = scheduler
                        .run(
                            &frames,
                            |frame: &Frame| ready(Ok(frame.destination.clone())),
                            silent(),
                            OperationType::GifUpscale,
                            &token,
                        )
                        .await;
                    assert_eq!(report.completed.len(), 1_000);
                });
            });
        });
    }

    let scheduler = BatchScheduler::new(8);
    group.bench_function("64 frames, 8 wide, sleeping work", |bencher| {
        bencher.iter(|| {
            rt.block_on(async {
                scheduler
                    .run(
                        &frames[..64],
                        |frame: &Frame| {
                            let output = frame.destination.clone();
                            async move {
                                tokio::time::sleep(Duration::from_micros(50)).await;
                                Ok::<_, BatchScaleError>(output)
                            }
                        },
                        silent(),
                        OperationType::VideoUpscale,
                        &token,
                    )
                    .await
            });
        });
    });

    group.finish();
}

fn benchmark_timing(criterion: &mut Criterion) {
    let paths: Vec<PathBuf> = frames(1_000).into_iter().map(|frame| frame.destination).collect();
    let delays = vec![4u16; paths.len()];

    criterion.bench_function("slow down and reverse 1000 delays", |bencher| {
        bencher.iter(|| {
            let mut timing = AnimationTiming::new(paths.clone(), delays.clone()).unwrap();
            timing.slow_down(0.5);
            timing.reverse();
            timing.into_parts()
        });
    });
}

criterion::criterion_group!(benches, benchmark_scheduler, benchmark_timing);
criterion::criterion_main!(benches);
