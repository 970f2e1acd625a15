//! Transform an NDJSON file record by record.
//!
//! Run with:
//!   cargo run --example ndjson_map -- <input.ndjson> <output.ndjson>
//!
//! Without arguments a small input file is generated in a temp directory.

use std::path::PathBuf;
use std::time::Duration;

use flowline::error::Result;
use flowline::ndjson::{ndjson_map, NdjsonMapOptions};
use flowline::transform::ErrorMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct Event {
    id: u64,
    kind: String,
}

#[derive(Debug, Serialize)]
struct Enriched {
    id: u64,
    kind: String,
    score: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter("flowline=info")
        .init();

    let mut args = std::env::args().skip(1);
    let (input, output) = match (args.next(), args.next()) {
        (Some(i), Some(o)) => (PathBuf::from(i), PathBuf::from(o)),
        _ => {
            let dir = std::env::temp_dir().join("flowline-ndjson-demo");
            std::fs::create_dir_all(&dir)?;
            let input = dir.join("events.ndjson");
            let mut text = String::new();
            for id in 0..500u64 {
                let kind = if id % 7 == 0 { "noise" } else { "click" };
                text.push_str(&format!("{{\"id\":{id},\"kind\":\"{kind}\"}}\n"));
            }
            std::fs::write(&input, text)?;
            (input, dir.join("enriched.ndjson"))
        }
    };

    let stats = ndjson_map(
        &input,
        &output,
        |event: Event, _index| async move {
            if event.kind == "noise" {
                return Ok(None);
            }
            // Stand-in for a remote lookup.
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(Some(Enriched {
                id: event.id,
                score: (event.id % 100) as f64 / 100.0,
                kind: event.kind,
            }))
        },
        NdjsonMapOptions {
            concurrency: 16,
            error_mode: ErrorMode::ThrowAggregated,
            log_every: 100,
            ..Default::default()
        },
    )
    .await?;

    println!(
        "wrote {} records to {} ({:.0}/s)",
        stats.processed,
        output.display(),
        stats.per_second
    );
    Ok(())
}
