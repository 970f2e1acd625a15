//! One-call helpers for "read NDJSON file, do something per record".

use std::future::Future;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ndjson::parse::{from_ndjson, to_ndjson};
use crate::pipeline::chain::PipeExt;
use crate::pipeline::runtime::Pipeline;
use crate::sink::{ForEachSink, FsSink};
use crate::source::FsSource;
use crate::transform::{Emit, ErrorMode, LimitPipe, MapPipe, ProgressPipe, ProgressStats};

/// Options shared by [`ndjson_map`] and [`ndjson_for_each`].
#[derive(Debug, Clone)]
pub struct NdjsonMapOptions {
    /// Stop reading after this many parsed records.
    pub limit_input: Option<usize>,
    /// Stop once this many records were written. Ignored by
    /// [`ndjson_for_each`].
    pub limit_output: Option<usize>,
    pub concurrency: usize,
    pub error_mode: ErrorMode,
    /// Progress line every N processed records, `0` for none.
    pub log_every: u64,
}

impl Default for NdjsonMapOptions {
    fn default() -> Self {
        Self {
            limit_input: None,
            limit_output: None,
            concurrency: 1,
            error_mode: ErrorMode::default(),
            log_every: 1000,
        }
    }
}

/// Read `input` as NDJSON, run `mapper` on every record and write the
/// results to `output` as NDJSON. `Ok(None)` from the mapper drops the
/// record. Limits end the run early and successfully.
pub async fn ndjson_map<I, O, F, Fut>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    mapper: F,
    options: NdjsonMapOptions,
) -> Result<ProgressStats>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(I, u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<O>>> + Send + 'static,
{
    let progress = ProgressPipe::new("ndjson_map").log_every(options.log_every);
    let stats = progress.handle();

    let map = MapPipe::emit("ndjson_map", move |item: I, index| {
        let fut = mapper(item, index);
        async move {
            Ok::<_, Error>(match fut.await? {
                Some(out) => Emit::One(out),
                None => Emit::Skip,
            })
        }
    })
    .concurrency(options.concurrency)
    .error_mode(options.error_mode);

    let pipe = FsSource::new(input.as_ref())
        .pipe(from_ndjson::<I>())
        .pipe(LimitPipe::from(options.limit_input).named("limit_input").close_source())
        .pipe(map)
        .pipe(LimitPipe::from(options.limit_output).named("limit_output").close_source())
        .pipe(progress)
        .pipe(to_ndjson::<O>())
        .pipe(FsSink::new(output.as_ref()));

    Pipeline::new().allow_graceful_close(true).run(pipe).await?;
    Ok(stats.snapshot())
}

/// Read `input` as NDJSON and run `f` on every record.
pub async fn ndjson_for_each<I, F, Fut>(
    input: impl AsRef<Path>,
    f: F,
    options: NdjsonMapOptions,
) -> Result<ProgressStats>
where
    I: DeserializeOwned + Send + 'static,
    F: Fn(I, u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let progress = ProgressPipe::new("ndjson_for_each").log_every(options.log_every);
    let stats = progress.handle();

    let pipe = FsSource::new(input.as_ref())
        .pipe(from_ndjson::<I>())
        .pipe(LimitPipe::from(options.limit_input).named("limit_input").close_source())
        .pipe(progress)
        .pipe(
            ForEachSink::new("ndjson_for_each", f)
                .concurrency(options.concurrency)
                .error_mode(options.error_mode),
        );

    Pipeline::new().allow_graceful_close(true).run(pipe).await?;
    Ok(stats.snapshot())
}
