#![cfg(feature = "ndjson")]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use flowline::error::{Error, Result};
use flowline::ndjson::{from_ndjson, ndjson_for_each, ndjson_map, to_ndjson, JsonParsePipe, NdjsonMapOptions};
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::source::ArraySource;
use flowline::transform::{ErrorMode, SplitPipe};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    id: u64,
    name: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Out {
    id: u64,
    upper: String,
}

fn write_rows(path: &std::path::Path, n: u64) {
    let mut text = String::new();
    for id in 0..n {
        text.push_str(&serde_json::to_string(&Row { id, name: format!("row{id}") }).unwrap());
        text.push('\n');
    }
    std::fs::write(path, text).unwrap();
}

fn read_out(path: &std::path::Path) -> Vec<Out> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn parse_handles_records_split_across_chunks() -> Result<()> {
    let chunks = vec![
        Bytes::from_static(b"{\"id\":1,\"na"),
        Bytes::from_static(b"me\":\"a\"}\r\n\n{\"id\":2,"),
        Bytes::from_static(b"\"name\":\"b\"}"),
    ];
    let pipe = ArraySource::new(chunks).pipe(from_ndjson::<Row>());

    let out = Pipeline::new().collect(pipe).await?;
    assert_eq!(
        out,
        vec![
            Row { id: 1, name: "a".into() },
            Row { id: 2, name: "b".into() },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn strict_parse_fails_on_a_bad_record() {
    let pipe = ArraySource::new(vec![Bytes::from_static(b"{\"id\":1,\"name\":\"a\"}\nnot json\n")])
        .pipe(from_ndjson::<Row>());

    let err = Pipeline::new().collect(pipe).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("json_parse") && msg.contains("not json"), "got {msg}");
}

#[tokio::test]
async fn lenient_parse_drops_bad_records() -> Result<()> {
    let pipe = ArraySource::new(vec![Bytes::from_static(b"{\"id\":1,\"name\":\"a\"}\n{oops\n{\"id\":2,\"name\":\"b\"}\n")])
        .pipe(SplitPipe::new())
        .pipe(JsonParsePipe::<Row>::new().strict(false));

    let out = Pipeline::new().collect(pipe).await?;
    assert_eq!(out.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn stringify_writes_one_line_per_item() -> Result<()> {
    let rows = vec![Row { id: 7, name: "x".into() }];
    let pipe = ArraySource::new(rows).pipe(to_ndjson::<Row>());

    let out = Pipeline::new().collect(pipe).await?;
    assert_eq!(out, vec![Bytes::from_static(b"{\"id\":7,\"name\":\"x\"}\n")]);
    Ok(())
}

#[tokio::test]
async fn ndjson_map_transforms_a_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.ndjson");
    let output = dir.path().join("nested/out.ndjson");
    write_rows(&input, 50);

    let stats = ndjson_map(
        &input,
        &output,
        |row: Row, _index| async move {
            // Odd ids are dropped.
            Ok((row.id % 2 == 0).then(|| Out {
                id: row.id,
                upper: row.name.to_uppercase(),
            }))
        },
        NdjsonMapOptions {
            concurrency: 4,
            log_every: 10,
            ..Default::default()
        },
    )
    .await?;

    let mut out = read_out(&output);
    out.sort_by_key(|o| o.id);
    assert_eq!(out.len(), 25);
    assert_eq!(out[1], Out { id: 2, upper: "ROW2".into() });
    assert_eq!(stats.processed, 25);
    Ok(())
}

#[tokio::test]
async fn ndjson_map_limits_end_the_run_successfully() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.ndjson");
    let output = dir.path().join("out.ndjson");
    write_rows(&input, 1000);

    ndjson_map(
        &input,
        &output,
        |row: Row, _index| async move {
            Ok(Some(Out {
                id: row.id,
                upper: row.name,
            }))
        },
        NdjsonMapOptions {
            limit_input: Some(30),
            limit_output: Some(10),
            ..Default::default()
        },
    )
    .await?;

    let out = read_out(&output);
    assert_eq!(out.iter().map(|o| o.id).collect::<Vec<_>>(), (0..10).collect::<Vec<u64>>());
    Ok(())
}

#[tokio::test]
async fn ndjson_for_each_visits_every_record() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.ndjson");
    write_rows(&input, 40);

    let sum = Arc::new(AtomicU64::new(0));
    let acc = sum.clone();
    let stats = ndjson_for_each(
        &input,
        move |row: Row, _index| {
            let acc = acc.clone();
            async move {
                acc.fetch_add(row.id, Ordering::SeqCst);
                Ok(())
            }
        },
        NdjsonMapOptions {
            limit_input: Some(20),
            concurrency: 3,
            ..Default::default()
        },
    )
    .await?;

    assert_eq!(sum.load(Ordering::SeqCst), (0..20).sum::<u64>());
    assert_eq!(stats.processed, 20);
    Ok(())
}

#[tokio::test]
async fn ndjson_map_aggregates_mapper_errors() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.ndjson");
    let output = dir.path().join("out.ndjson");
    write_rows(&input, 10);

    let err = ndjson_map(
        &input,
        &output,
        |row: Row, _index| async move {
            if row.id == 3 || row.id == 8 {
                return Err(Error::custom("bad row"));
            }
            Ok(Some(Out { id: row.id, upper: row.name }))
        },
        NdjsonMapOptions {
            error_mode: ErrorMode::ThrowAggregated,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    let Error::Aggregate(agg) = err else {
        panic!("expected aggregate error, got {err:?}");
    };
    assert_eq!(agg.len(), 2);
    assert_eq!(agg.succeeded(), 8);
    assert_eq!(read_out(&output).len(), 8);
}

#[tokio::test]
async fn missing_input_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let res = ndjson_for_each(
        dir.path().join("nope.ndjson"),
        |_row: Row, _index| async move { Ok(()) },
        NdjsonMapOptions::default(),
    )
    .await;
    assert!(res.is_err());
}
