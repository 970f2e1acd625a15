use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flowline::error::Result;
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::source::ArraySource;
use flowline::transform::{MapPipe, ToArrayPipe};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Doc {
    id: String,
}

fn doc(id: &str) -> Doc {
    Doc { id: id.to_string() }
}

#[tokio::test]
async fn filter_keeps_even_numbers_in_order() -> Result<()> {
    let pipe = ArraySource::new(vec![1, 2, 3, 4, 5]).filter(|n| n % 2 == 0);
    assert_eq!(Pipeline::new().collect(pipe).await?, vec![2, 4]);
    Ok(())
}

#[tokio::test]
async fn async_filter_keeps_even_numbers_in_order() -> Result<()> {
    let pipe = ArraySource::new(vec![1, 2, 3, 4, 5]).pipe(MapPipe::filter("even", |n: &i32, _index| {
        let keep = n % 2 == 0;
        async move { Ok(keep) }
    }));
    assert_eq!(Pipeline::new().collect(pipe).await?, vec![2, 4]);
    Ok(())
}

#[tokio::test]
async fn chunk_flushes_the_partial_last_chunk() -> Result<()> {
    let docs: Vec<Doc> = ["1", "2", "3", "4", "5"].into_iter().map(doc).collect();
    let pipe = ArraySource::new(docs).chunk(2);

    let out = Pipeline::new().collect(pipe).await?;
    assert_eq!(
        out,
        vec![
            vec![doc("1"), doc("2")],
            vec![doc("3"), doc("4")],
            vec![doc("5")],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn map_tap_and_to_array_compose() -> Result<()> {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let pipe = ArraySource::new((1..=4u32).collect())
        .map(|x| x * 10)
        .tap(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .map_async("plus_one", |x, _index| async move { Ok(x + 1) })
        .pipe(ToArrayPipe);

    let out = Pipeline::new().collect(pipe).await?;
    assert_eq!(out, vec![vec![11, 21, 31, 41]]);
    assert_eq!(seen.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn flat_map_and_predicate() -> Result<()> {
    let pipe = ArraySource::new(vec![1u32, 2, 3]).pipe(
        MapPipe::flat("repeat", |x: u32, _index| async move { Ok(vec![x; x as usize]) })
            .predicate(|v, _index| *v != 2),
    );
    assert_eq!(Pipeline::new().collect(pipe).await?, vec![1, 3, 3, 3]);
    Ok(())
}

#[tokio::test]
async fn concurrent_map_keeps_every_item() -> Result<()> {
    let pipe = ArraySource::new((0..100u64).collect()).pipe(
        MapPipe::new("jitter", |x: u64, _index| async move {
            tokio::time::sleep(std::time::Duration::from_micros((x * 37) % 500)).await;
            Ok(x)
        })
        .concurrency(8),
    );

    let mut out = Pipeline::new().collect(pipe).await?;
    out.sort_unstable();
    assert_eq!(out, (0..100).collect::<Vec<u64>>());
    Ok(())
}

#[tokio::test]
async fn array_source_is_reusable() -> Result<()> {
    let source = ArraySource::new(vec!["a", "b"]);
    let pipeline = Pipeline::new();
    assert_eq!(pipeline.collect(source.clone()).await?, vec!["a", "b"]);
    assert_eq!(pipeline.collect(source).await?, vec!["a", "b"]);
    Ok(())
}
