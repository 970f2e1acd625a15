//! Single-stage transforms.

pub mod chunk;
pub mod limit;
pub mod map;
pub mod progress;
pub mod simple;
pub mod split;
pub mod tee;
pub mod throttle;
pub mod to_array;

pub use chunk::ChunkPipe;
pub use limit::{LimitPipe, OffsetPipe};
pub use map::{Emit, ErrorMode, MapPipe};
pub use progress::{ProgressHandle, ProgressPipe, ProgressStats};
pub use split::SplitPipe;
pub use tee::TeePipe;
pub use throttle::ThrottlePipe;
pub use to_array::ToArrayPipe;
