//! Terminal stages. Sinks consume items and emit nothing.

pub mod collect;
pub mod for_each;
pub mod fs;

pub use collect::{CollectSink, VoidSink};
pub use for_each::ForEachSink;
pub use fs::FsSink;
