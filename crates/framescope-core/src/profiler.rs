//! Block registry and cycle aggregation.
//!
//! The registry owns every named block, tracks open/closed timing state,
//! advances the profiling-cycle boundary on demand, and computes the
//! derived timing metrics.

use crate::block::ProfileBlock;
use crate::clock::{clock_for, BoxedClock, InstantClock, MonotonicClock};
use crate::metric::BlockMetric;
use framescope_common::config::ProfilerConfig;
use framescope_common::diag::{DiagnosticSink, TracingSink};
use framescope_common::error::{ProfError, ProfResult};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Block-timing profiler: a caller-owned registry of named blocks with
/// cycle-boundary aggregation.
///
/// Single-threaded by design - no internal locking, so per-call overhead
/// stays near zero. Confine one instance per thread (preferred), or wrap
/// `begin_block` / `end_block` / `start_cycle` in external mutual
/// exclusion.
///
/// Nested timing of the same name is not supported: a begin on an
/// already-open block restarts the open timestamp and is reported through
/// the diagnostic sink.
pub struct Profiler<C: MonotonicClock = InstantClock> {
    /// Clock used to time blocks; its reference point is reset at
    /// construction and on [`Profiler::reset`].
    clock: C,
    /// Whether instrumentation is active.
    enabled: bool,
    /// Named block registry; entries are created lazily on first begin.
    blocks: HashMap<String, ProfileBlock>,
    /// Clock reading when the current cycle began; `None` before the first
    /// `start_cycle`.
    cycle_start_us: Option<u64>,
    /// Wall-clock span of the most recently completed cycle.
    last_cycle_duration_us: u64,
    /// Destination for misuse reports.
    sink: Box<dyn DiagnosticSink>,
}

impl Profiler<InstantClock> {
    /// Create an enabled profiler on the default `Instant` clock.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(InstantClock::new(), &ProfilerConfig::default())
    }

    /// Create a disabled profiler; every operation is a cheap no-op.
    #[must_use]
    pub fn disabled() -> Self {
        let config = ProfilerConfig {
            enabled: false,
            ..ProfilerConfig::default()
        };
        Self::new(InstantClock::new(), &config)
    }
}

impl Profiler<BoxedClock> {
    /// Create a profiler with the clock backend selected by `config`.
    #[must_use]
    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self::new(clock_for(config), config)
    }
}

impl<C: MonotonicClock> Profiler<C> {
    /// Create a profiler on the given clock. The clock's reference point is
    /// reset, so elapsed time is measured from construction.
    pub fn new(mut clock: C, config: &ProfilerConfig) -> Self {
        clock.reset();
        Self {
            clock,
            enabled: config.enabled,
            blocks: HashMap::new(),
            cycle_start_us: None,
            last_cycle_duration_us: 0,
            sink: Box::new(TracingSink),
        }
    }

    /// Re-initialize: clears every block, clears cycle state, and resets
    /// the clock reference point. A full reset, not additive.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.cycle_start_us = None;
        self.last_cycle_duration_us = 0;
        self.clock.reset();
        debug!("profiler reset");
    }

    /// Begin timing the named block, creating it on first use.
    ///
    /// Issue this call as late as possible relative to the work being
    /// measured; the timestamp is taken after the registry lookup so that
    /// lookup cost stays out of the reading.
    pub fn begin_block(&mut self, name: &str) {
        if !self.enabled {
            return;
        }
        if name.is_empty() {
            self.sink.report(&ProfError::EmptyBlockName);
            return;
        }

        if !self.blocks.contains_key(name) {
            trace!(block = name, "created profile block");
            self.blocks.insert(name.to_owned(), ProfileBlock::default());
        }

        // Timestamp last.
        let now = self.clock.elapsed_micros();
        if let Some(block) = self.blocks.get_mut(name) {
            if !block.open(now) {
                self.sink.report(&ProfError::ReentrantBegin {
                    name: name.to_owned(),
                });
            }
        }
    }

    /// Stop timing the named block, folding the elapsed delta into its
    /// current-cycle and all-time accumulators.
    ///
    /// An end with no matching begin is reported and leaves the registry
    /// unchanged.
    pub fn end_block(&mut self, name: &str) {
        if !self.enabled {
            return;
        }

        // Timestamp first, before the lookup.
        let now = self.clock.elapsed_micros();

        match self.blocks.get_mut(name) {
            None => self.sink.report(&ProfError::UnknownBlock {
                name: name.to_owned(),
            }),
            Some(block) => {
                if block.close(now).is_none() {
                    self.sink.report(&ProfError::BlockNotOpen {
                        name: name.to_owned(),
                    });
                }
            }
        }
    }

    /// Advance the profiling-cycle boundary.
    ///
    /// The just-finished cycle's wall-clock span becomes the denominator
    /// for last-cycle percentages, and every block's current-cycle total
    /// moves into last-cycle storage. The very first cycle has no
    /// predecessor, so its recorded duration is zero.
    ///
    /// Must not be called while any block is open; a measurement spanning a
    /// cycle boundary lands entirely in the cycle where its end falls.
    pub fn start_cycle(&mut self) {
        if !self.enabled {
            return;
        }

        let now = self.clock.elapsed_micros();
        self.last_cycle_duration_us = match self.cycle_start_us {
            None => 0,
            Some(start) => now.saturating_sub(start),
        };

        for block in self.blocks.values_mut() {
            block.roll_cycle();
        }

        self.cycle_start_us = Some(now);
        trace!(
            cycle_duration_us = self.last_cycle_duration_us,
            blocks = self.blocks.len(),
            "cycle boundary"
        );
    }

    /// Read timing data for the named block.
    ///
    /// Returns `0.0` silently when the profiler is disabled; an unknown
    /// name is reported through the diagnostic sink and also yields `0.0`.
    pub fn block_time(&mut self, name: &str, metric: BlockMetric) -> f64 {
        match self.try_block_time(name, metric) {
            Ok(value) => value,
            Err(err) => {
                self.sink.report(&err);
                0.0
            }
        }
    }

    /// Structured-result variant of [`Profiler::block_time`]. Returns
    /// `Ok(0.0)` when the profiler is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ProfError::UnknownBlock`] if the name was never begun.
    pub fn try_block_time(&mut self, name: &str, metric: BlockMetric) -> ProfResult<f64> {
        if !self.enabled {
            return Ok(0.0);
        }

        let block = self.blocks.get(name).ok_or_else(|| ProfError::UnknownBlock {
            name: name.to_owned(),
        })?;
        let total_us = block.total_us();
        let last_cycle_us = block.last_cycle_us();

        let value = match metric {
            BlockMetric::TotalSeconds => total_us as f64 / 1e6,
            BlockMetric::TotalMillis => total_us as f64 / 1e3,
            BlockMetric::TotalMicros => total_us as f64,
            BlockMetric::TotalPercent => percent(total_us, self.clock.elapsed_micros()),
            BlockMetric::LastCycleSeconds => last_cycle_us as f64 / 1e6,
            BlockMetric::LastCycleMillis => last_cycle_us as f64 / 1e3,
            BlockMetric::LastCycleMicros => last_cycle_us as f64,
            BlockMetric::LastCyclePercent => percent(last_cycle_us, self.last_cycle_duration_us),
        };
        Ok(value)
    }

    /// Capture a point-in-time view of every block, name-sorted for
    /// deterministic output. Formatting and destinations are the caller's
    /// concern.
    #[must_use]
    pub fn snapshot(&mut self) -> ProfilerSnapshot {
        let elapsed_us = if self.enabled {
            self.clock.elapsed_micros()
        } else {
            0
        };
        let mut blocks: Vec<BlockStats> = self
            .blocks
            .iter()
            .map(|(name, block)| BlockStats {
                name: name.clone(),
                total_us: block.total_us(),
                last_cycle_us: block.last_cycle_us(),
            })
            .collect();
        blocks.sort_by(|a, b| a.name.cmp(&b.name));

        ProfilerSnapshot {
            elapsed_us,
            last_cycle_duration_us: self.last_cycle_duration_us,
            blocks,
        }
    }

    /// Whether instrumentation is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of blocks created so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether a block with this name has been created.
    #[must_use]
    pub fn contains_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    /// Microseconds elapsed since the profiler was initialized or last
    /// reset.
    pub fn elapsed_micros(&mut self) -> u64 {
        self.clock.elapsed_micros()
    }

    /// Mutable access to the underlying clock. Intended for injected test
    /// clocks; resetting a live clock invalidates percentage denominators.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

/// `100 * part / whole`, with a zero denominator defined as zero rather
/// than NaN.
fn percent(part_us: u64, whole_us: u64) -> f64 {
    if whole_us == 0 {
        0.0
    } else {
        100.0 * part_us as f64 / whole_us as f64
    }
}

/// Point-in-time view of every block's accumulators.
#[derive(Debug, Clone, Serialize)]
pub struct ProfilerSnapshot {
    /// Microseconds elapsed since the profiler was initialized.
    pub elapsed_us: u64,
    /// Wall-clock span of the most recently completed cycle.
    pub last_cycle_duration_us: u64,
    /// Per-block statistics, sorted by name.
    pub blocks: Vec<BlockStats>,
}

/// Accumulated statistics for one block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockStats {
    /// Block name.
    pub name: String,
    /// All-time accumulated microseconds.
    pub total_us: u64,
    /// Microseconds accumulated during the most recently completed cycle.
    pub last_cycle_us: u64,
}

/// Builder for configuring a profiler.
pub struct ProfilerBuilder<C: MonotonicClock = InstantClock> {
    clock: C,
    config: ProfilerConfig,
    sink: Option<Box<dyn DiagnosticSink>>,
}

impl ProfilerBuilder<InstantClock> {
    /// Start from the default `Instant` clock and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: InstantClock::new(),
            config: ProfilerConfig::default(),
            sink: None,
        }
    }
}

impl Default for ProfilerBuilder<InstantClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: MonotonicClock> ProfilerBuilder<C> {
    /// Use a specific clock backend.
    pub fn clock<D: MonotonicClock>(self, clock: D) -> ProfilerBuilder<D> {
        ProfilerBuilder {
            clock,
            config: self.config,
            sink: self.sink,
        }
    }

    /// Enable or disable instrumentation.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Use the full configuration.
    pub fn config(mut self, config: ProfilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Route misuse reports to this sink instead of `tracing`.
    pub fn sink<S: DiagnosticSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Build the profiler.
    #[must_use]
    pub fn build(self) -> Profiler<C> {
        let mut profiler = Profiler::new(self.clock, &self.config);
        if let Some(sink) = self.sink {
            profiler.sink = sink;
        }
        profiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use framescope_common::diag::CollectingSink;
    use std::sync::Arc;

    fn manual_profiler() -> (Profiler<ManualClock>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let profiler = ProfilerBuilder::new()
            .clock(ManualClock::new())
            .sink(Arc::clone(&sink))
            .build();
        (profiler, sink)
    }

    #[test]
    fn test_deltas_accumulate_exactly() {
        let (mut prof, sink) = manual_profiler();

        for delta in [5_000, 1_250, 750] {
            prof.begin_block("physics");
            prof.clock_mut().advance_micros(delta);
            prof.end_block("physics");
        }

        assert_eq!(prof.block_time("physics", BlockMetric::TotalMicros), 7_000.0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_blocks_created_lazily() {
        let (mut prof, _sink) = manual_profiler();
        assert_eq!(prof.block_count(), 0);

        prof.begin_block("render");
        assert_eq!(prof.block_count(), 1);
        assert!(prof.contains_block("render"));

        prof.end_block("render");
        prof.begin_block("render");
        prof.end_block("render");
        assert_eq!(prof.block_count(), 1);
    }

    #[test]
    fn test_empty_name_creates_nothing() {
        let (mut prof, sink) = manual_profiler();
        prof.begin_block("");
        assert_eq!(prof.block_count(), 0);
        assert_eq!(sink.take(), vec![ProfError::EmptyBlockName]);
    }

    #[test]
    fn test_end_without_begin_leaves_state_unchanged() {
        let (mut prof, sink) = manual_profiler();
        prof.end_block("ghost");
        assert_eq!(prof.block_count(), 0);
        assert_eq!(
            sink.take(),
            vec![ProfError::UnknownBlock {
                name: "ghost".into()
            }]
        );
    }

    #[test]
    fn test_double_end_reported() {
        let (mut prof, sink) = manual_profiler();
        prof.begin_block("ai");
        prof.clock_mut().advance_micros(100);
        prof.end_block("ai");
        prof.end_block("ai");

        assert_eq!(
            sink.take(),
            vec![ProfError::BlockNotOpen { name: "ai".into() }]
        );
        assert_eq!(prof.block_time("ai", BlockMetric::TotalMicros), 100.0);
    }

    #[test]
    fn test_reentrant_begin_restarts_timestamp() {
        let (mut prof, sink) = manual_profiler();
        prof.begin_block("audio");
        prof.clock_mut().advance_micros(1_000);
        prof.begin_block("audio");
        prof.clock_mut().advance_micros(10);
        prof.end_block("audio");

        assert_eq!(
            sink.take(),
            vec![ProfError::ReentrantBegin {
                name: "audio".into()
            }]
        );
        assert_eq!(prof.block_time("audio", BlockMetric::TotalMicros), 10.0);
    }

    #[test]
    fn test_unknown_query_reports_and_returns_zero() {
        let (mut prof, sink) = manual_profiler();
        assert_eq!(prof.block_time("nope", BlockMetric::TotalSeconds), 0.0);
        assert_eq!(
            sink.take(),
            vec![ProfError::UnknownBlock {
                name: "nope".into()
            }]
        );
        assert_eq!(
            prof.try_block_time("nope", BlockMetric::TotalSeconds),
            Err(ProfError::UnknownBlock {
                name: "nope".into()
            })
        );
    }

    #[test]
    fn test_scaled_total_views() {
        let (mut prof, _sink) = manual_profiler();
        prof.begin_block("load");
        prof.clock_mut().advance_micros(1_500_000);
        prof.end_block("load");

        assert_eq!(prof.block_time("load", BlockMetric::TotalSeconds), 1.5);
        assert_eq!(prof.block_time("load", BlockMetric::TotalMillis), 1_500.0);
        assert_eq!(prof.block_time("load", BlockMetric::TotalMicros), 1_500_000.0);
    }

    #[test]
    fn test_total_percent() {
        let (mut prof, _sink) = manual_profiler();
        prof.begin_block("sim");
        prof.clock_mut().advance_micros(5_000);
        prof.end_block("sim");
        prof.clock_mut().advance_micros(5_000);

        assert_eq!(prof.block_time("sim", BlockMetric::TotalPercent), 50.0);
    }

    #[test]
    fn test_percent_zero_before_any_elapsed_time() {
        let (mut prof, _sink) = manual_profiler();
        prof.begin_block("sim");
        prof.end_block("sim");

        // Degenerate denominators are defined as zero, not NaN.
        assert_eq!(prof.block_time("sim", BlockMetric::TotalPercent), 0.0);
        assert_eq!(prof.block_time("sim", BlockMetric::LastCyclePercent), 0.0);
    }

    #[test]
    fn test_first_cycle_has_zero_duration() {
        let (mut prof, _sink) = manual_profiler();
        prof.begin_block("a");
        prof.clock_mut().advance_micros(5_000);
        prof.end_block("a");
        prof.start_cycle();

        assert_eq!(prof.block_time("a", BlockMetric::LastCycleMicros), 5_000.0);
        // No predecessor cycle, so the percent denominator is still zero.
        assert_eq!(prof.block_time("a", BlockMetric::LastCyclePercent), 0.0);
    }

    #[test]
    fn test_last_cycle_percent_against_cycle_span() {
        let (mut prof, _sink) = manual_profiler();
        prof.start_cycle();
        prof.begin_block("a");
        prof.clock_mut().advance_micros(5_000);
        prof.end_block("a");
        prof.clock_mut().advance_micros(5_000);
        prof.start_cycle();

        assert_eq!(prof.block_time("a", BlockMetric::LastCycleMicros), 5_000.0);
        assert_eq!(prof.block_time("a", BlockMetric::LastCyclePercent), 50.0);
        assert_eq!(prof.block_time("a", BlockMetric::LastCycleMillis), 5.0);
        assert_eq!(prof.block_time("a", BlockMetric::LastCycleSeconds), 0.005);
    }

    #[test]
    fn test_idle_cycle_reports_zero() {
        let (mut prof, _sink) = manual_profiler();
        prof.start_cycle();
        prof.begin_block("a");
        prof.clock_mut().advance_micros(5_000);
        prof.end_block("a");
        prof.start_cycle();

        // A full cycle with no activity in "a".
        prof.clock_mut().advance_micros(2_000);
        prof.start_cycle();

        assert_eq!(prof.block_time("a", BlockMetric::LastCycleMicros), 0.0);
        assert_eq!(prof.block_time("a", BlockMetric::LastCyclePercent), 0.0);
        assert_eq!(prof.block_time("a", BlockMetric::TotalMicros), 5_000.0);
    }

    #[test]
    fn test_repeated_idle_cycles_stay_zero() {
        let (mut prof, _sink) = manual_profiler();
        prof.begin_block("a");
        prof.clock_mut().advance_micros(1_000);
        prof.end_block("a");

        prof.start_cycle();
        prof.start_cycle();
        prof.start_cycle();

        assert_eq!(prof.block_time("a", BlockMetric::LastCycleMicros), 0.0);
        assert_eq!(prof.block_time("a", BlockMetric::TotalMicros), 1_000.0);
    }

    #[test]
    fn test_percent_metrics_stay_in_range() {
        let (mut prof, _sink) = manual_profiler();
        prof.start_cycle();
        for _ in 0..10 {
            prof.begin_block("work");
            prof.clock_mut().advance_micros(300);
            prof.end_block("work");
            prof.clock_mut().advance_micros(700);
            prof.start_cycle();

            for metric in [BlockMetric::TotalPercent, BlockMetric::LastCyclePercent] {
                let value = prof.block_time("work", metric);
                assert!((0.0..=100.0).contains(&value), "{metric:?} = {value}");
            }
        }
    }

    #[test]
    fn test_disabled_profiler_is_inert() {
        let sink = Arc::new(CollectingSink::new());
        let mut prof = ProfilerBuilder::new()
            .clock(ManualClock::new())
            .enabled(false)
            .sink(Arc::clone(&sink))
            .build();

        prof.begin_block("x");
        prof.clock_mut().advance_micros(1_000);
        prof.end_block("x");
        prof.start_cycle();

        assert!(!prof.is_enabled());
        assert_eq!(prof.block_count(), 0);
        assert_eq!(prof.block_time("x", BlockMetric::TotalMicros), 0.0);
        assert_eq!(prof.try_block_time("x", BlockMetric::TotalPercent), Ok(0.0));
        // Disabled no-ops are not misuse.
        assert!(sink.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut prof, sink) = manual_profiler();
        prof.start_cycle();
        prof.begin_block("a");
        prof.clock_mut().advance_micros(2_000);
        prof.end_block("a");
        prof.start_cycle();

        prof.reset();

        assert_eq!(prof.block_count(), 0);
        assert_eq!(prof.elapsed_micros(), 0);
        assert_eq!(prof.block_time("a", BlockMetric::TotalMicros), 0.0);
        assert_eq!(
            sink.take(),
            vec![ProfError::UnknownBlock { name: "a".into() }]
        );
    }

    #[test]
    fn test_from_config_boxed_clock() {
        let mut prof = Profiler::from_config(&ProfilerConfig::default());
        prof.begin_block("boot");
        prof.end_block("boot");
        assert!(prof.contains_block("boot"));
        assert!(prof.block_time("boot", BlockMetric::TotalMicros) >= 0.0);
    }

    #[test]
    fn test_snapshot_sorted_and_serializable() {
        let (mut prof, _sink) = manual_profiler();
        for name in ["render", "ai", "physics"] {
            prof.begin_block(name);
            prof.clock_mut().advance_micros(100);
            prof.end_block(name);
        }
        prof.start_cycle();

        let snapshot = prof.snapshot();
        let names: Vec<&str> = snapshot.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["ai", "physics", "render"]);
        assert_eq!(snapshot.blocks[0].last_cycle_us, 100);
        assert_eq!(snapshot.elapsed_us, 300);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"physics\""));
    }
}
