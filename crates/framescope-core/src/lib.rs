#![doc = "Block-timing and cycle-aggregation engine for framescope."]

mod block;
pub mod clock;
pub mod metric;
pub mod profiler;

pub use clock::*;
pub use metric::*;
pub use profiler::*;
