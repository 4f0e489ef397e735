//! Metric selectors for block timing queries.

/// The eight ways to read timing data out of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMetric {
    /// Total time spent in the block (in seconds) since the profiler was
    /// initialized.
    TotalSeconds,

    /// Total time spent in the block (in ms) since the profiler was
    /// initialized.
    TotalMillis,

    /// Total time spent in the block (in us) since the profiler was
    /// initialized.
    TotalMicros,

    /// Total time spent in the block, as a % of the total elapsed time
    /// since the profiler was initialized.
    TotalPercent,

    /// Time spent in the block (in seconds) in the most recent profiling
    /// cycle.
    LastCycleSeconds,

    /// Time spent in the block (in ms) in the most recent profiling cycle.
    LastCycleMillis,

    /// Time spent in the block (in us) in the most recent profiling cycle.
    LastCycleMicros,

    /// Time spent in the block in the most recent profiling cycle, as a %
    /// of that cycle's wall-clock duration.
    LastCyclePercent,
}
