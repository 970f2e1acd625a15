use flowline::error::{Error, Result};
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::source::ArraySource;
use flowline::transform::{ErrorMode, LimitPipe, MapPipe};

mod common;
use common::DrainSink;

const N: u32 = 10;
const K: u64 = 4;

fn failing_at_k(mode: ErrorMode) -> MapPipe<u32, u32> {
    MapPipe::new("fail_at_k", |x: u32, index| async move {
        if index == K {
            Err(Error::custom(format!("bad item {x}")))
        } else {
            Ok(x)
        }
    })
    .error_mode(mode)
}

async fn run(mode: ErrorMode) -> (Result<()>, Vec<u32>) {
    let (sink, out) = DrainSink::new();
    let pipe = ArraySource::new((0..N).collect())
        .pipe(failing_at_k(mode))
        .pipe(sink);
    let res = Pipeline::new().buffer(4).run(pipe).await;
    let out = out.lock().unwrap().clone();
    (res, out)
}

#[tokio::test]
async fn throw_immediately_emits_k_items_then_fails() {
    let (res, out) = run(ErrorMode::ThrowImmediately).await;

    assert_eq!(out, vec![0, 1, 2, 3]);
    match res {
        Err(Error::Item { stage, index, source }) => {
            assert_eq!(stage, "fail_at_k");
            assert_eq!(index, K);
            assert_eq!(source.to_string(), "bad item 4");
        }
        other => panic!("expected item error, got {other:?}"),
    }
}

#[tokio::test]
async fn suppress_drops_the_item_and_resolves() {
    let (res, out) = run(ErrorMode::Suppress).await;

    assert!(res.is_ok(), "got {res:?}");
    assert_eq!(out.len(), N as usize - 1);
    assert!(!out.contains(&4));
}

#[tokio::test]
async fn throw_aggregated_finishes_then_fails_with_every_failure() {
    let (res, out) = run(ErrorMode::ThrowAggregated).await;

    assert_eq!(out.len(), N as usize - 1);
    let Err(Error::Aggregate(agg)) = res else {
        panic!("expected aggregate error, got {res:?}");
    };
    assert_eq!(agg.len(), 1);
    assert_eq!(agg.stage(), "fail_at_k");
    assert_eq!(agg.succeeded(), u64::from(N) - 1);
    assert_eq!(agg.failures()[0].index, K);
    assert!(agg.to_string().contains("1 item(s) failed"), "got {agg}");
}

#[tokio::test]
async fn aggregated_with_concurrency_collects_all_failures() {
    let pipe = ArraySource::new((0..20u32).collect()).pipe(
        MapPipe::new("odd_fails", |x: u32, _index| async move {
            if x % 2 == 1 {
                Err(Error::custom("odd"))
            } else {
                Ok(x)
            }
        })
        .concurrency(4)
        .error_mode(ErrorMode::ThrowAggregated),
    );

    let err = Pipeline::new().collect(pipe).await.unwrap_err();
    let Error::Aggregate(agg) = err else {
        panic!("expected aggregate error, got {err:?}");
    };
    let mut indexes: Vec<u64> = agg.failures().iter().map(|f| f.index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..20).filter(|i| i % 2 == 1).collect::<Vec<u64>>());
    assert_eq!(agg.succeeded(), 10);
}

#[tokio::test]
async fn fatal_error_before_any_item_is_not_an_aggregate() {
    let pipe = ArraySource::new(vec![1u32, 2, 3]).pipe(
        MapPipe::new("always_fails", |_x: u32, _index| async move {
            Err::<u32, _>(Error::custom("boom"))
        }),
    );
    let err = Pipeline::new().collect(pipe).await.unwrap_err();
    assert!(matches!(err, Error::Item { index: 0, .. }), "got {err:?}");
}

#[tokio::test]
async fn aggregated_failures_survive_a_downstream_close() {
    let pipe = ArraySource::new((0..100u32).collect())
        .pipe(
            MapPipe::new("fail_second", |x: u32, index| async move {
                if index == 1 {
                    Err(Error::custom("second item"))
                } else {
                    Ok(x)
                }
            })
            .error_mode(ErrorMode::ThrowAggregated),
        )
        .pipe(LimitPipe::new(5).close_source());

    let err = Pipeline::new()
        .buffer(2)
        .allow_graceful_close(true)
        .collect(pipe)
        .await
        .unwrap_err();

    let Error::Aggregate(agg) = err else {
        panic!("expected aggregate error, got {err:?}");
    };
    assert_eq!(agg.len(), 1);
    assert_eq!(agg.failures()[0].index, 1);
}
