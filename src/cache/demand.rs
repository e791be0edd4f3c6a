//! Demand tracking
//!
//! Remembers how much data readers actually ask of an item, by count and
//! by duration. A larger figure commits immediately; smaller figures
//! accumulate provisionally and replace the committed figure once the
//! renewal interval passes, so demand decays toward recently observed need
//! instead of growing forever.

use crate::types::Timestamp;

/// Committed and provisional demand for one item
#[derive(Debug, Clone)]
pub struct DemandTracker {
    count: usize,
    duration: u32,
    provisional_count: usize,
    provisional_duration: u32,
    count_renewed_at: Timestamp,
    duration_renewed_at: Timestamp,
}

impl DemandTracker {
    /// Start tracking with zero demand
    pub fn new(now: Timestamp) -> Self {
        Self {
            count: 0,
            duration: 0,
            provisional_count: 0,
            provisional_duration: 0,
            count_renewed_at: now,
            duration_renewed_at: now,
        }
    }

    /// Committed count demand
    pub fn count(&self) -> usize {
        self.count
    }

    /// Committed duration demand in seconds
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Feed an observed request into the tracker
    ///
    /// `renewal_interval` is how long a committed figure stays authoritative
    /// before the provisional figure replaces it.
    pub fn update(
        &mut self,
        new_count: usize,
        new_duration: u32,
        now: Timestamp,
        renewal_interval: u32,
    ) {
        if self.count < new_count {
            self.count = new_count;
            self.provisional_count = 0;
            self.count_renewed_at = now;
        } else if self.provisional_count < new_count {
            self.provisional_count = new_count;
        }

        if now.saturating_sub(self.count_renewed_at) > renewal_interval {
            self.count = self.provisional_count;
            self.provisional_count = 0;
            self.count_renewed_at = now;
        }

        if self.duration < new_duration {
            self.duration = new_duration;
            self.provisional_duration = 0;
            self.duration_renewed_at = now;
        } else if self.provisional_duration < new_duration {
            self.provisional_duration = new_duration;
        }

        if now.saturating_sub(self.duration_renewed_at) > renewal_interval {
            self.duration = self.provisional_duration;
            self.provisional_duration = 0;
            self.duration_renewed_at = now;
        }
    }

    /// True when `available` points satisfy the committed count demand,
    /// i.e. the oldest point may be evicted without breaking it
    pub fn count_met_by(&self, available: usize) -> bool {
        self.count <= available
    }

    /// True when a point timestamped `ts` already lies outside the
    /// committed duration window ending at `now`
    pub fn duration_met_at(&self, ts: Timestamp, now: Timestamp) -> bool {
        self.duration <= now.saturating_sub(ts)
    }
}
