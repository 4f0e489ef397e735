//! Monotonic clock backends.
//!
//! Downstream code depends only on the [`MonotonicClock`] contract:
//! microseconds since the last reset, never decreasing between resets.
//! Two production backends are provided:
//!
//! - [`InstantClock`], built on `std::time::Instant`. The OS primitive is
//!   guaranteed monotonic, so no correction is needed. This is the default.
//! - [`RawCounterClock`] (Linux), which reads `CLOCK_MONOTONIC_RAW` for
//!   resolution and resynchronizes it against `CLOCK_MONOTONIC_COARSE`
//!   when the two diverge. The raw counter is not slewed by NTP and can
//!   drift relative to the kernel tick on some hardware.
//!
//! Clock reads never fail from the caller's point of view: if the platform
//! API errors, the raw backend falls back to the always-available `Instant`
//! source. Profiling must never crash the host application.

use framescope_common::config::{ClockSource, ProfilerConfig};
use std::time::{Duration, Instant};

/// Microsecond-resolution monotonic time source.
pub trait MonotonicClock: Send {
    /// Establish a new zero-reference instant.
    fn reset(&mut self);

    /// Microseconds elapsed since the last reset. Never decreases between
    /// resets, within the precision of the underlying timer.
    fn elapsed_micros(&mut self) -> u64;

    /// Milliseconds elapsed since the last reset. Derived from the
    /// microsecond reading, so the two views always agree.
    fn elapsed_millis(&mut self) -> u64 {
        self.elapsed_micros() / 1_000
    }
}

impl<C: MonotonicClock + ?Sized> MonotonicClock for Box<C> {
    fn reset(&mut self) {
        (**self).reset();
    }

    fn elapsed_micros(&mut self) -> u64 {
        (**self).elapsed_micros()
    }

    fn elapsed_millis(&mut self) -> u64 {
        (**self).elapsed_millis()
    }
}

/// Clock with the backend chosen at startup.
pub type BoxedClock = Box<dyn MonotonicClock>;

/// Build the clock backend selected by `config`.
#[must_use]
pub fn clock_for(config: &ProfilerConfig) -> BoxedClock {
    match config.clock {
        ClockSource::Std => Box::new(InstantClock::new()),
        ClockSource::RawCounter => Box::new(RawCounterClock::new(config.drift_threshold)),
    }
}

/// Divergence threshold used by [`RawCounterClock::default`].
pub const DEFAULT_DRIFT_THRESHOLD: Duration = Duration::from_millis(100);

/// Clock backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct InstantClock {
    start: Instant,
}

impl InstantClock {
    /// Create a clock with the reference instant set to now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for InstantClock {
    fn reset(&mut self) {
        self.start = Instant::now();
    }

    fn elapsed_micros(&mut self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now_us: u64,
}

impl ManualClock {
    /// Create a clock reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `us` microseconds.
    pub fn advance_micros(&mut self, us: u64) {
        self.now_us += us;
    }

    /// Advance the clock by a duration.
    pub fn advance(&mut self, d: Duration) {
        self.now_us += d.as_micros() as u64;
    }
}

impl MonotonicClock for ManualClock {
    fn reset(&mut self) {
        self.now_us = 0;
    }

    fn elapsed_micros(&mut self) -> u64 {
        self.now_us
    }
}

/// Resynchronization arithmetic for the raw-counter backend.
///
/// `elapsed_ns` is the raw-counter delta since reset, `tick_elapsed_ms` the
/// coarse-tick delta, and `prev_elapsed_ns` the value reported by the
/// previous call. Returns the corrected elapsed time and the adjustment to
/// fold into the stored reference point. The adjustment is clamped to
/// `elapsed_ns - prev_elapsed_ns`, so the corrected value never falls below
/// the previous reading and time never appears to run backward.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn resync(elapsed_ns: i64, tick_elapsed_ms: i64, prev_elapsed_ns: i64, threshold_ms: i64) -> (i64, i64) {
    let off_ms = elapsed_ns / 1_000_000 - tick_elapsed_ms;
    if off_ms < -threshold_ms || off_ms > threshold_ms {
        let adjustment_ns = (off_ms * 1_000_000).min(elapsed_ns - prev_elapsed_ns);
        (elapsed_ns - adjustment_ns, adjustment_ns)
    } else {
        (elapsed_ns, 0)
    }
}

/// High-resolution raw-counter clock with coarse-tick drift correction.
///
/// Each reading of `CLOCK_MONOTONIC_RAW` is checked against
/// `CLOCK_MONOTONIC_COARSE`; when the two diverge beyond the configured
/// threshold the reference point is moved forward by the divergence,
/// clamped so the reported elapsed time never decreases.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct RawCounterClock {
    /// Raw-counter reading at the last reset, in nanoseconds.
    start_raw_ns: i64,
    /// Coarse-tick reading at the last reset, in milliseconds.
    start_tick_ms: i64,
    /// Elapsed nanoseconds reported by the previous call; bounds the
    /// backward reach of a resync.
    prev_elapsed_ns: i64,
    /// Divergence threshold in milliseconds.
    threshold_ms: i64,
    /// Whether the platform clocks were readable at reset.
    raw_ok: bool,
    /// Always-available fallback source.
    fallback: Instant,
}

#[cfg(target_os = "linux")]
fn read_clock_ns(clock_id: libc::clockid_t) -> Option<i64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: clock_gettime only writes into the timespec we provide.
    let rc = unsafe { libc::clock_gettime(clock_id, &mut ts) };
    if rc == 0 {
        Some(ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64)
    } else {
        None
    }
}

#[cfg(target_os = "linux")]
impl RawCounterClock {
    /// Create a clock with the given divergence threshold, reading zero now.
    #[must_use]
    pub fn new(drift_threshold: Duration) -> Self {
        let mut clock = Self {
            start_raw_ns: 0,
            start_tick_ms: 0,
            prev_elapsed_ns: 0,
            threshold_ms: drift_threshold.as_millis() as i64,
            raw_ok: false,
            fallback: Instant::now(),
        };
        clock.reset();
        clock
    }

    fn fallback_micros(&mut self) -> u64 {
        // Keep the non-decreasing contract even when switching sources.
        let us = self.fallback.elapsed().as_micros() as u64;
        let us = us.max(self.prev_elapsed_ns as u64 / 1_000);
        self.prev_elapsed_ns = (us * 1_000) as i64;
        us
    }
}

#[cfg(target_os = "linux")]
impl Default for RawCounterClock {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD)
    }
}

#[cfg(target_os = "linux")]
impl MonotonicClock for RawCounterClock {
    fn reset(&mut self) {
        self.fallback = Instant::now();
        self.prev_elapsed_ns = 0;
        match (
            read_clock_ns(libc::CLOCK_MONOTONIC_RAW),
            read_clock_ns(libc::CLOCK_MONOTONIC_COARSE),
        ) {
            (Some(raw_ns), Some(tick_ns)) => {
                self.start_raw_ns = raw_ns;
                self.start_tick_ms = tick_ns / 1_000_000;
                self.raw_ok = true;
            }
            _ => self.raw_ok = false,
        }
    }

    fn elapsed_micros(&mut self) -> u64 {
        if !self.raw_ok {
            return self.fallback_micros();
        }

        let Some(raw_ns) = read_clock_ns(libc::CLOCK_MONOTONIC_RAW) else {
            return self.fallback_micros();
        };
        let mut elapsed_ns = raw_ns - self.start_raw_ns;

        if let Some(tick_ns) = read_clock_ns(libc::CLOCK_MONOTONIC_COARSE) {
            let tick_elapsed_ms = tick_ns / 1_000_000 - self.start_tick_ms;
            let (corrected_ns, adjustment_ns) = resync(
                elapsed_ns,
                tick_elapsed_ms,
                self.prev_elapsed_ns,
                self.threshold_ms,
            );
            self.start_raw_ns += adjustment_ns;
            elapsed_ns = corrected_ns;
        }

        self.prev_elapsed_ns = elapsed_ns.max(0);
        self.prev_elapsed_ns as u64 / 1_000
    }
}

/// Raw-counter clock placeholder for platforms without the raw/coarse clock
/// pair; behaves as the `Instant` backend.
#[cfg(not(target_os = "linux"))]
#[derive(Debug)]
pub struct RawCounterClock {
    fallback: Instant,
}

#[cfg(not(target_os = "linux"))]
impl RawCounterClock {
    /// Create a clock reading zero now. The threshold is unused on this
    /// platform.
    #[must_use]
    pub fn new(_drift_threshold: Duration) -> Self {
        Self {
            fallback: Instant::now(),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Default for RawCounterClock {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD)
    }
}

#[cfg(not(target_os = "linux"))]
impl MonotonicClock for RawCounterClock {
    fn reset(&mut self) {
        self.fallback = Instant::now();
    }

    fn elapsed_micros(&mut self) -> u64 {
        self.fallback.elapsed().as_micros() as u64
    }
}
