//! Per-item cache entry
//!
//! Holds one item's typed ring buffer, demand figures, backing-store
//! low-water marks and metadata. All methods run under the owning
//! element's lock; backing-store round trips block only this item.

use tracing::{debug, warn};

use crate::backing::{FetchRange, FetchRequest};
use crate::config::MAX_TIMESTAMP_AHEAD;
use crate::error::{CacheError, Result};
use crate::ringbuf::TimeSeriesRingBuffer;
use crate::types::{
    ItemId, ItemMetadata, MetaUpdate, TimeSeriesPoint, Timestamp, Value, ValueType, FAR_FUTURE,
};

use super::demand::DemandTracker;
use super::CacheContext;

/// Bytes one buffer slot occupies, charged against the memory budget
const SLOT_BYTES: usize = std::mem::size_of::<Option<TimeSeriesPoint>>();

/// Extra window requested from the store so a near-miss retry is unlikely
fn time_fetch_overhead(fetch_seconds: u32) -> u32 {
    if fetch_seconds < 300 {
        fetch_seconds + 300
    } else {
        fetch_seconds / 5 * 6
    }
}

/// One item's cached state
#[derive(Debug)]
pub struct ItemEntry {
    value_type: ValueType,
    buffer: TimeSeriesRingBuffer,
    demand: DemandTracker,
    /// Oldest time already requested from the backing store
    db_fetched_time: Timestamp,
    /// Largest count already requested from the backing store
    db_fetched_count: usize,
    last_accessed: Timestamp,
    meta: ItemMetadata,
}

impl ItemEntry {
    /// Create an empty untyped entry, charging its buffer slots
    pub fn new(ctx: &CacheContext, now: Timestamp) -> Result<Self> {
        let capacity = ctx.config.initial_capacity;
        ctx.budget.charge(capacity * SLOT_BYTES)?;
        Ok(Self {
            value_type: ValueType::None,
            buffer: TimeSeriesRingBuffer::new(capacity)?,
            demand: DemandTracker::new(now),
            db_fetched_time: FAR_FUTURE,
            db_fetched_count: 0,
            last_accessed: now,
            meta: ItemMetadata::default(),
        })
    }

    /// The type this entry currently caches
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Number of cached points
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no points are cached
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Time of the last access, for housekeeping
    pub fn last_accessed(&self) -> Timestamp {
        self.last_accessed
    }

    /// True when the entry has sat unaccessed longer than `max_idle`
    pub fn is_idle(&self, now: Timestamp, max_idle: u32) -> bool {
        now.saturating_sub(self.last_accessed) > max_idle
    }

    /// Release every owned payload and all buffer slots back to the budget
    ///
    /// Called before the entry is dropped by housekeeping or a type change.
    pub fn release_all(&mut self, ctx: &CacheContext) {
        while let Some(point) = self.buffer.free_tail() {
            ctx.budget.release(point.value.payload_size());
        }
        ctx.budget.release(self.buffer.capacity() * SLOT_BYTES);
    }

    /// Flush everything and reinitialize for a new value type
    ///
    /// Destructive by design: demand, low-water marks and metadata all
    /// restart from scratch. Last writer wins on type conflicts.
    fn retype(&mut self, ctx: &CacheContext, new_type: ValueType, now: Timestamp) -> Result<()> {
        debug!(
            old = %self.value_type,
            new = %new_type,
            "resetting cache entry value type"
        );
        self.release_all(ctx);
        *self = Self::new(ctx, now)?;
        self.value_type = new_type;
        Ok(())
    }

    /// Make room for one more point in a full buffer
    ///
    /// Evicts the oldest point when the committed demand no longer needs
    /// it, otherwise grows the buffer.
    fn ensure_space(&mut self, ctx: &CacheContext, now: Timestamp) -> Result<()> {
        if !self.buffer.is_full() {
            return Ok(());
        }

        let next_tail_ts = self.buffer.time_after_tail();
        let can_evict = self.demand.count_met_by(self.buffer.len() - 1)
            && next_tail_ts.is_some_and(|ts| self.demand.duration_met_at(ts, now));

        let grow_target = ctx.config.grow_target(self.buffer.capacity());
        if can_evict || grow_target <= self.buffer.capacity() {
            if let Some(evicted) = self.buffer.free_tail() {
                ctx.budget.release(evicted.value.payload_size());
            }
            return Ok(());
        }

        let added_slots = grow_target - self.buffer.capacity();
        ctx.budget.charge(added_slots * SLOT_BYTES)?;
        if let Err(e) = self.buffer.resize(grow_target, None) {
            ctx.budget.release(added_slots * SLOT_BYTES);
            return Err(e);
        }
        debug!(capacity = grow_target, "grew item buffer under demand");
        Ok(())
    }

    /// Append one incoming sample
    pub fn add_value(
        &mut self,
        ctx: &CacheContext,
        itemid: ItemId,
        ts: Timestamp,
        value: Value,
        now: Timestamp,
    ) -> Result<()> {
        let incoming = value.value_type();
        if self.value_type == ValueType::None {
            self.value_type = incoming;
        } else if self.value_type != incoming {
            self.retype(ctx, incoming, now)?;
        } else {
            self.ensure_space(ctx, now)?;
        }

        if ts > now + MAX_TIMESTAMP_AHEAD {
            warn!(itemid, ts, now, "sample timestamp too far ahead, rejected");
            return Err(CacheError::TimestampAhead { ts, now });
        }

        let bytes = value.payload_size();
        ctx.budget.charge(bytes)?;
        match self.buffer.add_to_head(TimeSeriesPoint { ts, value }) {
            Ok(evicted) => {
                if let Some(old) = evicted {
                    ctx.budget.release(old.value.payload_size());
                }
            }
            Err(e) => {
                ctx.budget.release(bytes);
                warn!(itemid, ts, "cannot add sample to the cache: {}", e);
                return Err(e);
            }
        }
        self.last_accessed = now;
        Ok(())
    }

    /// Merge one fetched point at the tail, charging its payload
    ///
    /// Points that cannot be placed (buffer full on the count path, or out
    /// of order against existing data) are skipped with a warning; the
    /// sufficiency re-check after the merge decides whether that matters.
    fn merge_point(
        &mut self,
        ctx: &CacheContext,
        itemid: ItemId,
        point: TimeSeriesPoint,
    ) -> Result<()> {
        let got = point.value.value_type();
        if got != self.value_type {
            return Err(CacheError::InvalidValueType {
                expected: self.value_type,
                got,
            });
        }
        let bytes = point.value.payload_size();
        ctx.budget.charge(bytes)?;
        if let Err(e) = self.buffer.add_to_tail(point) {
            ctx.budget.release(bytes);
            warn!(itemid, "skipping unmergeable history point: {}", e);
        }
        Ok(())
    }

    /// Fetch `[head_time - seconds, head_time]` from the backing store and
    /// merge it, unless the low-water mark shows it was already requested
    fn fetch_from_store_by_time(
        &mut self,
        ctx: &CacheContext,
        itemid: ItemId,
        seconds: u32,
        head_time: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        let start = head_time.saturating_sub(seconds);
        if self.db_fetched_time <= start {
            debug!(
                itemid,
                start,
                fetched_from = self.db_fetched_time,
                "history range already requested, skipping store fetch"
            );
            return Ok(());
        }
        if self.db_fetched_time > now {
            self.db_fetched_time = now;
        }

        ctx.stats.record_db_request();
        let req = FetchRequest {
            itemid,
            value_type: self.value_type,
            range: FetchRange::ByTime {
                start,
                end: self.db_fetched_time,
            },
        };
        let mut points = ctx.store.fetch(&req).inspect_err(|_| {
            ctx.stats.record_db_fail();
        })?;
        debug!(itemid, count = points.len(), "history fetch by time done");

        points.sort_by(|a, b| b.ts.cmp(&a.ts));
        for point in points {
            self.ensure_space(ctx, now)?;
            self.merge_point(ctx, itemid, point)?;
        }

        // remember the range as covered even when it came back empty
        self.db_fetched_time = start;
        Ok(())
    }

    /// Fetch the newest `count` points older than the low-water mark and
    /// merge them, unless an equal count was already requested
    fn fetch_from_store_by_count(
        &mut self,
        ctx: &CacheContext,
        itemid: ItemId,
        count: usize,
        head_time: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        if self.db_fetched_time > now {
            self.db_fetched_time = now;
        }
        if self.db_fetched_time < head_time && self.db_fetched_count >= count {
            debug!(
                itemid,
                count,
                fetched = self.db_fetched_count,
                "history count already requested, skipping store fetch"
            );
            return Ok(());
        }

        ctx.stats.record_db_request();
        let req = FetchRequest {
            itemid,
            value_type: self.value_type,
            range: FetchRange::ByCount {
                count,
                end: self.db_fetched_time.saturating_sub(1),
            },
        };
        let mut points = ctx.store.fetch(&req).inspect_err(|_| {
            ctx.stats.record_db_fail();
        })?;
        debug!(itemid, count = points.len(), "history fetch by count done");

        self.db_fetched_count = self.db_fetched_count.max(count);
        if points.is_empty() {
            // the store holds nothing older; step the mark past the anchor
            // so an identical request does not hit the store again
            self.db_fetched_time = self.db_fetched_time.min(head_time).saturating_sub(1);
            return Ok(());
        }

        if let Some(oldest) = points.iter().map(|p| p.ts).min() {
            self.db_fetched_time = self.db_fetched_time.min(oldest);
        }
        points.sort_by(|a, b| b.ts.cmp(&a.ts));
        for point in points {
            self.ensure_space(ctx, now)?;
            self.merge_point(ctx, itemid, point)?;
        }
        Ok(())
    }

    fn lower_fetch_mark(&mut self, ts: Timestamp) {
        if self.db_fetched_time > ts {
            self.db_fetched_time = ts;
        }
    }

    /// Slot of the newest point at or before `ts_head`
    ///
    /// An anchor newer than everything cached resolves to the buffer head;
    /// an anchor older than everything cached resolves to nothing.
    fn anchor_idx(&self, ts_head: Timestamp) -> Option<usize> {
        match self.buffer.time_head() {
            Some(head_ts) if ts_head >= head_ts => self.buffer.head_idx(),
            Some(_) => self.buffer.find_time_idx(ts_head),
            None => None,
        }
    }

    /// Slot that opens a window starting at `ts_start`, if the window is
    /// known to be fully covered
    ///
    /// Either a cached point sits at or before the start, or the low-water
    /// mark proves the store has already been drained past it, in which
    /// case the oldest cached point opens the window.
    fn window_tail_idx(&self, ts_start: Timestamp) -> Option<usize> {
        if let Some(idx) = self.buffer.find_time_idx(ts_start) {
            return Some(idx);
        }
        if self.db_fetched_time <= ts_start {
            if let Some(tail_ts) = self.buffer.time_tail() {
                if tail_ts > ts_start {
                    return self.buffer.tail_idx();
                }
            }
        }
        None
    }

    /// Answer "last `count` values at or before `ts_head`"
    ///
    /// Hits fill straight from the buffer; misses fall back to the backing
    /// store, merge, and re-check. Never returns a short result.
    pub fn get_by_count(
        &mut self,
        ctx: &CacheContext,
        itemid: ItemId,
        want: ValueType,
        count: usize,
        ts_head: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<TimeSeriesPoint>> {
        if self.value_type != want {
            self.retype(ctx, want, now)?;
        }
        self.last_accessed = now;
        self.demand
            .update(count, 0, now, ctx.config.demand_update_interval);

        let head_idx = self.anchor_idx(ts_head);

        if let Some(idx) = head_idx {
            if self.buffer.has_enough_from_idx(count, idx) {
                ctx.stats.record_hit();
                return Ok(self.buffer.collect_count(idx, count));
            }
        }
        ctx.stats.record_miss();

        if head_idx.is_none() {
            // nothing cached at or before the anchor: cover the window up
            // to it first so the count fetch continues from known ground
            let seconds = now.saturating_sub(ts_head);
            self.fetch_from_store_by_time(ctx, itemid, seconds, now, now)
                .inspect_err(|_| ctx.stats.record_fail())?;
            self.lower_fetch_mark(ts_head);
        }

        let need = match self.anchor_idx(ts_head) {
            Some(idx) => count.saturating_sub(self.buffer.count_through(idx)),
            None => count,
        };
        if need > 0 {
            self.fetch_from_store_by_count(ctx, itemid, need, ts_head, now)
                .inspect_err(|_| ctx.stats.record_fail())?;
            self.lower_fetch_mark(ts_head);
        }

        let idx = match self.anchor_idx(ts_head) {
            Some(idx) => idx,
            None => {
                ctx.stats.record_fail();
                debug!(itemid, count, ts_head, "store fetch returned no usable data");
                return Err(CacheError::InsufficientData {
                    available: 0,
                    needed: count,
                });
            }
        };
        if !self.buffer.has_enough_from_idx(count, idx) {
            ctx.stats.record_fail();
            debug!(itemid, count, ts_head, "store fetch returned too little data");
            return Err(CacheError::InsufficientData {
                available: self.buffer.count_through(idx),
                needed: count,
            });
        }

        let values = self.buffer.collect_count(idx, count);
        if let Some(first) = values.first() {
            self.lower_fetch_mark(first.ts);
        }
        Ok(values)
    }

    /// Answer "all values in `[ts_head - seconds, ts_head]`"
    pub fn get_by_time(
        &mut self,
        ctx: &CacheContext,
        itemid: ItemId,
        want: ValueType,
        seconds: u32,
        ts_head: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<TimeSeriesPoint>> {
        if self.value_type != want {
            self.retype(ctx, want, now)?;
        }
        self.last_accessed = now;
        self.demand
            .update(0, seconds, now, ctx.config.demand_update_interval);

        let ts_start = ts_head.saturating_sub(seconds);
        let head_idx = self.anchor_idx(ts_head);
        let tail_idx = self.window_tail_idx(ts_start);

        if let (Some(tail), Some(head)) = (tail_idx, head_idx) {
            ctx.stats.record_hit();
            return Ok(self.buffer.collect_between(tail, head));
        }
        ctx.stats.record_miss();

        // fetch only the sub-range the buffer does not cover, padded so a
        // near-miss does not trigger a second round trip
        let (fetch_head, fetch_seconds) = match self.buffer.time_tail() {
            Some(tail_ts) if ts_head >= tail_ts => {
                let missing = seconds.saturating_sub(ts_head.saturating_sub(tail_ts + 1));
                (tail_ts + 1, time_fetch_overhead(missing))
            }
            _ => (ts_head, seconds),
        };

        self.fetch_from_store_by_time(ctx, itemid, fetch_seconds, fetch_head, now)
            .inspect_err(|_| ctx.stats.record_fail())?;
        self.lower_fetch_mark(ts_head);

        let head_idx = self.anchor_idx(ts_head);
        let tail_idx = self.window_tail_idx(ts_start);

        match (tail_idx, head_idx) {
            (Some(tail), Some(head)) => Ok(self.buffer.collect_between(tail, head)),
            _ => {
                ctx.stats.record_fail();
                let covered = match (self.buffer.time_tail(), self.buffer.time_head()) {
                    (Some(t), _) => ts_head.saturating_sub(t) as usize,
                    _ => 0,
                };
                debug!(
                    itemid,
                    seconds, ts_head, "store fetch left the window uncovered"
                );
                Err(CacheError::InsufficientData {
                    available: covered,
                    needed: seconds as usize,
                })
            }
        }
    }

    /// Newest `count` cached points, newest first, without store fallback
    pub fn last_values(&self, count: usize) -> Vec<TimeSeriesPoint> {
        let all: Vec<&TimeSeriesPoint> = self.buffer.iter().collect();
        all.iter()
            .rev()
            .take(count)
            .map(|p| (*p).clone())
            .collect()
    }

    /// Apply a partial metadata update
    pub fn update_meta(&mut self, ctx: &CacheContext, update: &MetaUpdate) {
        if let Some(lastdata) = update.lastdata {
            if self.meta.lastdata < lastdata {
                self.meta.lastdata = lastdata;
            }
        }
        if let Some(nextcheck) = update.nextcheck {
            self.meta.nextcheck = nextcheck;
        }
        if let Some(state) = update.state {
            self.meta.state = state;
        }
        if let Some(error) = &update.error {
            self.meta.error = Some(ctx.strpool.acquire(error));
        }
    }

    /// Current metadata
    pub fn meta(&self) -> ItemMetadata {
        self.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_fetch_overhead_margins() {
        // short windows get a flat 5 minute pad
        assert_eq!(time_fetch_overhead(60), 360);
        assert_eq!(time_fetch_overhead(299), 599);
        // long windows get 20 percent
        assert_eq!(time_fetch_overhead(300), 360);
        assert_eq!(time_fetch_overhead(3600), 4320);
    }
}
