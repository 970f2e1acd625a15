//! NDJSON support: record parsing and serialization stages plus file
//! helpers. Enabled by the `ndjson` feature.

pub mod file;
pub mod parse;

pub use file::{ndjson_for_each, ndjson_map, NdjsonMapOptions};
pub use parse::{from_ndjson, to_ndjson, JsonParsePipe, JsonStringifyPipe};
