//! Accounting state for a single timed block.

/// Timing accumulators for one named block. Owned exclusively by the
/// registry; external access goes through the name-keyed query interface.
#[derive(Debug, Default, Clone)]
pub(crate) struct ProfileBlock {
    /// Clock reading at the most recent unmatched begin; `None` while the
    /// block is closed.
    open_at_us: Option<u64>,
    /// Accumulated time within the cycle currently in progress.
    current_cycle_us: u64,
    /// Accumulated time during the most recently completed cycle.
    last_cycle_us: u64,
    /// Accumulated time since the registry was initialized.
    total_us: u64,
}

impl ProfileBlock {
    /// Record an unmatched begin at `now_us`. Returns `false` if the block
    /// was already open; the timestamp is restarted either way.
    pub(crate) fn open(&mut self, now_us: u64) -> bool {
        let was_closed = self.open_at_us.is_none();
        self.open_at_us = Some(now_us);
        was_closed
    }

    /// Close the block at `now_us`, folding the delta into the current-cycle
    /// and all-time accumulators. Returns `None` if no begin was
    /// outstanding.
    pub(crate) fn close(&mut self, now_us: u64) -> Option<u64> {
        let open_at = self.open_at_us.take()?;
        // A non-monotonic injected clock must not panic the host.
        let delta = now_us.saturating_sub(open_at);
        self.current_cycle_us += delta;
        self.total_us += delta;
        Some(delta)
    }

    /// Roll the cycle boundary: the current cycle's total becomes the last
    /// cycle's total.
    pub(crate) fn roll_cycle(&mut self) {
        self.last_cycle_us = self.current_cycle_us;
        self.current_cycle_us = 0;
    }

    pub(crate) fn current_cycle_us(&self) -> u64 {
        self.current_cycle_us
    }

    pub(crate) fn last_cycle_us(&self) -> u64 {
        self.last_cycle_us
    }

    pub(crate) fn total_us(&self) -> u64 {
        self.total_us
    }
}
