//! Fixed-capacity time-ordered ring buffer
//!
//! Holds the cached samples of one item, oldest at the tail, newest at the
//! head. Timestamps are non-decreasing walking from tail to head around the
//! circle; both append operations enforce the ordering and fail without
//! mutating state when it would break.
//!
//! Indices handed out by [`TimeSeriesRingBuffer::find_time_idx`] are opaque
//! slot positions. They stay valid across tail churn and are only meaningful
//! when passed back into this type; no caller performs wrap arithmetic.

use crate::config::MAX_BUFFER_CAPACITY;
use crate::error::{CacheError, Result};
use crate::types::{TimeSeriesPoint, Timestamp};

/// Circular buffer of timestamped samples
#[derive(Debug)]
pub struct TimeSeriesRingBuffer {
    slots: Vec<Option<TimeSeriesPoint>>,
    /// Slot of the newest point, None when empty
    head: Option<usize>,
    /// Slot of the oldest point, None when empty
    tail: Option<usize>,
    count: usize,
}

impl TimeSeriesRingBuffer {
    /// Create an empty buffer with the given slot capacity
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_BUFFER_CAPACITY {
            return Err(CacheError::RingBuffer(format!(
                "capacity {} outside 1..={}",
                capacity, MAX_BUFFER_CAPACITY
            )));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            head: None,
            tail: None,
            count: 0,
        })
    }

    /// Number of points currently stored
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when no points are stored
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True when every slot is occupied
    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Slot capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Timestamp of the newest point
    pub fn time_head(&self) -> Option<Timestamp> {
        self.head.and_then(|i| self.slots[i].as_ref()).map(|p| p.ts)
    }

    /// Timestamp of the oldest point
    pub fn time_tail(&self) -> Option<Timestamp> {
        self.tail.and_then(|i| self.slots[i].as_ref()).map(|p| p.ts)
    }

    /// Timestamp of the point that becomes the tail after one `free_tail`
    pub fn time_after_tail(&self) -> Option<Timestamp> {
        if self.count < 2 {
            return None;
        }
        let tail = self.tail?;
        self.slots[self.wrap(tail + 1)].as_ref().map(|p| p.ts)
    }

    /// Opaque slot index of the newest point
    pub fn head_idx(&self) -> Option<usize> {
        self.head
    }

    /// Opaque slot index of the oldest point
    pub fn tail_idx(&self) -> Option<usize> {
        self.tail
    }

    /// Borrow the point at an opaque slot index
    pub fn get(&self, idx: usize) -> Option<&TimeSeriesPoint> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    fn wrap(&self, idx: usize) -> usize {
        idx % self.slots.len()
    }

    /// Number of points from the tail through `idx`, inclusive
    pub fn count_through(&self, idx: usize) -> usize {
        match self.tail {
            Some(tail) => self.wrap(idx + self.slots.len() - tail) + 1,
            None => 0,
        }
    }

    /// Append a newest point
    ///
    /// Fails without mutation when the buffer is non-empty and `point.ts`
    /// is older than the head timestamp. When the buffer is full the oldest
    /// point is evicted to make room and returned to the caller, which owns
    /// releasing whatever the payload was charged against.
    pub fn add_to_head(&mut self, point: TimeSeriesPoint) -> Result<Option<TimeSeriesPoint>> {
        if let Some(head_ts) = self.time_head() {
            if point.ts < head_ts {
                return Err(CacheError::RingBuffer(format!(
                    "timestamp {} is older than head {}",
                    point.ts, head_ts
                )));
            }
        }

        let evicted = if self.is_full() { self.free_tail() } else { None };

        let new_head = match self.head {
            Some(head) => self.wrap(head + 1),
            None => 0,
        };
        self.slots[new_head] = Some(point);
        self.head = Some(new_head);
        if self.tail.is_none() {
            self.tail = Some(new_head);
        }
        self.count += 1;
        Ok(evicted)
    }

    /// Prepend an oldest point
    ///
    /// Used when merging backing-store results into the cache. Fails without
    /// mutation when the buffer is full or `point.ts` is newer than the tail
    /// timestamp.
    pub fn add_to_tail(&mut self, point: TimeSeriesPoint) -> Result<()> {
        if self.is_full() {
            return Err(CacheError::RingBuffer(
                "no free slot at the tail".to_string(),
            ));
        }
        if let Some(tail_ts) = self.time_tail() {
            if point.ts > tail_ts {
                return Err(CacheError::RingBuffer(format!(
                    "timestamp {} is newer than tail {}",
                    point.ts, tail_ts
                )));
            }
        }

        let new_tail = match self.tail {
            Some(tail) => self.wrap(tail + self.slots.len() - 1),
            None => 0,
        };
        self.slots[new_tail] = Some(point);
        self.tail = Some(new_tail);
        if self.head.is_none() {
            self.head = Some(new_tail);
        }
        self.count += 1;
        Ok(())
    }

    /// Remove and return the oldest point
    pub fn free_tail(&mut self) -> Option<TimeSeriesPoint> {
        let tail = self.tail?;
        let point = self.slots[tail].take();
        self.count -= 1;
        if self.count == 0 {
            self.head = None;
            self.tail = None;
        } else {
            self.tail = Some(self.wrap(tail + 1));
        }
        point
    }

    /// Slot index of the point with the greatest timestamp at or before `ts`
    ///
    /// `None` when the buffer is empty or `ts` falls outside the stored
    /// `[tail, head]` time range. Binary search over the circular range.
    pub fn find_time_idx(&self, ts: Timestamp) -> Option<usize> {
        let (head, tail) = (self.head?, self.tail?);
        let head_ts = self.slots[head].as_ref()?.ts;
        let tail_ts = self.slots[tail].as_ref()?.ts;

        if ts < tail_ts || ts > head_ts {
            return None;
        }

        // search over logical offsets from the tail, map back to a slot
        let mut lo = 0usize;
        let mut hi = self.count - 1;
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let slot = self.wrap(tail + mid);
            match self.slots[slot].as_ref() {
                Some(p) if p.ts <= ts => lo = mid,
                _ => hi = mid - 1,
            }
        }
        Some(self.wrap(tail + lo))
    }

    /// True when at least `need` points exist at or before slot `idx`
    pub fn has_enough_from_idx(&self, need: usize, idx: usize) -> bool {
        need > 0 && self.count_through(idx) >= need
    }

    /// True when at least `need` points exist at or before time `ts`
    pub fn has_enough_at_time(&self, need: usize, ts: Timestamp) -> bool {
        match self.find_time_idx(ts) {
            Some(idx) => self.has_enough_from_idx(need, idx),
            None => false,
        }
    }

    /// Clone the `count` points ending at slot `head_idx`, oldest first
    pub fn collect_count(&self, head_idx: usize, count: usize) -> Vec<TimeSeriesPoint> {
        let take = count.min(self.count_through(head_idx));
        let mut out = Vec::with_capacity(take);
        for step in (0..take).rev() {
            let slot = self.wrap(head_idx + self.slots.len() - step);
            if let Some(p) = self.slots[slot].as_ref() {
                out.push(p.clone());
            }
        }
        out
    }

    /// Clone the points from slot `tail_idx` through slot `head_idx`, oldest first
    pub fn collect_between(&self, tail_idx: usize, head_idx: usize) -> Vec<TimeSeriesPoint> {
        let span = self.wrap(head_idx + self.slots.len() - tail_idx) + 1;
        let mut out = Vec::with_capacity(span);
        for step in 0..span {
            let slot = self.wrap(tail_idx + step);
            if let Some(p) = self.slots[slot].as_ref() {
                out.push(p.clone());
            }
        }
        out
    }

    /// Iterate stored points oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesPoint> {
        let tail = self.tail.unwrap_or(0);
        let cap = self.slots.len();
        (0..self.count).filter_map(move |step| self.slots[(tail + step) % cap].as_ref())
    }

    /// Change the slot capacity
    ///
    /// Growing preserves every point; shrinking drops the oldest points to
    /// fit, invoking `on_evict` once per dropped point. Either way the
    /// buffer is renumbered so the tail lands at slot 0. Fails without
    /// mutation when `new_capacity` is out of range.
    pub fn resize(
        &mut self,
        new_capacity: usize,
        mut on_evict: Option<&mut dyn FnMut(TimeSeriesPoint)>,
    ) -> Result<()> {
        if new_capacity == 0 || new_capacity > MAX_BUFFER_CAPACITY {
            return Err(CacheError::RingBuffer(format!(
                "capacity {} outside 1..={}",
                new_capacity, MAX_BUFFER_CAPACITY
            )));
        }

        while self.count > new_capacity {
            if let Some(dropped) = self.free_tail() {
                if let Some(cb) = on_evict.as_mut() {
                    cb(dropped);
                }
            }
        }

        let mut new_slots = Vec::with_capacity(new_capacity);
        new_slots.resize_with(new_capacity, || None);
        let count = self.count;
        if let Some(tail) = self.tail {
            let cap = self.slots.len();
            for (logical, slot) in new_slots.iter_mut().enumerate().take(count) {
                *slot = self.slots[(tail + logical) % cap].take();
            }
        }
        self.slots = new_slots;
        if count > 0 {
            self.tail = Some(0);
            self.head = Some(count - 1);
        } else {
            self.tail = None;
            self.head = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn point(ts: Timestamp) -> TimeSeriesPoint {
        TimeSeriesPoint {
            ts,
            value: Value::Uint(u64::from(ts)),
        }
    }

    fn filled_100_to_500() -> TimeSeriesRingBuffer {
        let mut buf = TimeSeriesRingBuffer::new(5).unwrap();
        for ts in [100, 200, 300, 400, 500] {
            buf.add_to_head(point(ts)).unwrap();
        }
        buf
    }

    #[test]
    fn test_monotonic_append_tracks_head() {
        let mut buf = TimeSeriesRingBuffer::new(5).unwrap();
        for ts in [100, 200, 300] {
            buf.add_to_head(point(ts)).unwrap();
            let idx = buf.find_time_idx(ts).unwrap();
            assert_eq!(buf.get(idx).unwrap().ts, ts);
            assert_eq!(buf.time_head(), Some(ts));
        }
    }

    #[test]
    fn test_out_of_order_append_fails_without_mutation() {
        let mut buf = filled_100_to_500();
        assert!(buf.add_to_head(point(499)).is_err());
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.time_head(), Some(500));
    }

    #[test]
    fn test_boundary_search() {
        let buf = filled_100_to_500();
        assert_eq!(buf.find_time_idx(250), Some(1));
        assert_eq!(buf.find_time_idx(500), Some(4));
        assert_eq!(buf.find_time_idx(501), None);
        assert_eq!(buf.find_time_idx(99), None);
        assert_eq!(buf.find_time_idx(100), Some(0));
    }

    #[test]
    fn test_wraparound_indices() {
        let mut buf = filled_100_to_500();
        assert_eq!(buf.free_tail().unwrap().ts, 100);
        assert_eq!(buf.free_tail().unwrap().ts, 200);
        buf.add_to_head(point(501)).unwrap();
        buf.add_to_head(point(502)).unwrap();

        assert_eq!(buf.find_time_idx(501), Some(0));
        assert_eq!(buf.find_time_idx(502), Some(1));
        assert_eq!(buf.find_time_idx(503), None);
        assert_eq!(buf.find_time_idx(300), Some(2));
        assert_eq!(buf.time_tail(), Some(300));
        assert_eq!(buf.time_head(), Some(502));
    }

    #[test]
    fn test_full_head_append_evicts_tail() {
        let mut buf = filled_100_to_500();
        let evicted = buf.add_to_head(point(600)).unwrap();
        assert_eq!(evicted.unwrap().ts, 100);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.time_tail(), Some(200));
        assert_eq!(buf.time_head(), Some(600));
    }

    #[test]
    fn test_grow_preserves_data_and_renumbers() {
        let mut buf = filled_100_to_500();
        buf.free_tail();
        buf.free_tail();
        buf.add_to_head(point(501)).unwrap();
        buf.add_to_head(point(502)).unwrap();

        buf.resize(10, None).unwrap();
        assert_eq!(buf.capacity(), 10);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.find_time_idx(300), Some(0));
        assert_eq!(buf.find_time_idx(502), Some(4));
        assert_eq!(buf.time_tail(), Some(300));
        assert_eq!(buf.time_head(), Some(502));
    }

    #[test]
    fn test_resize_beyond_max_fails() {
        let mut buf = filled_100_to_500();
        assert!(buf.resize(MAX_BUFFER_CAPACITY + 1, None).is_err());
        assert_eq!(buf.capacity(), 5);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_shrink_drops_oldest_with_callback() {
        let mut buf = filled_100_to_500();
        let mut dropped = Vec::new();
        let mut cb = |p: TimeSeriesPoint| dropped.push(p.ts);
        buf.resize(3, Some(&mut cb)).unwrap();

        assert_eq!(dropped, vec![100, 200]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.time_tail(), Some(300));
        assert_eq!(buf.time_head(), Some(500));
    }

    #[test]
    fn test_shrink_without_callback_keeps_newest() {
        let mut buf = filled_100_to_500();
        buf.resize(4, None).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.time_tail(), Some(200));
    }

    #[test]
    fn test_add_to_tail_merges_older_points() {
        let mut buf = TimeSeriesRingBuffer::new(5).unwrap();
        buf.add_to_head(point(300)).unwrap();
        buf.add_to_tail(point(200)).unwrap();
        buf.add_to_tail(point(100)).unwrap();

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.time_tail(), Some(100));
        assert!(buf.add_to_tail(point(150)).is_err());

        buf.add_to_tail(point(50)).unwrap();
        buf.add_to_tail(point(25)).unwrap();
        // full now
        assert!(buf.add_to_tail(point(10)).is_err());
    }

    #[test]
    fn test_has_enough_count_data() {
        let buf = filled_100_to_500();
        // zero demand is never satisfiable
        assert!(!buf.has_enough_at_time(0, 500));
        assert!(buf.has_enough_at_time(5, 500));
        assert!(!buf.has_enough_at_time(6, 500));
        assert!(buf.has_enough_at_time(2, 250));
        assert!(!buf.has_enough_at_time(3, 250));
        // outside the stored range
        assert!(!buf.has_enough_at_time(1, 99));
    }

    #[test]
    fn test_has_enough_after_wraparound() {
        let mut buf = filled_100_to_500();
        buf.free_tail();
        buf.free_tail();
        buf.add_to_head(point(501)).unwrap();
        buf.add_to_head(point(502)).unwrap();

        assert!(buf.has_enough_at_time(5, 502));
        assert!(!buf.has_enough_at_time(6, 502));
        assert!(buf.has_enough_at_time(1, 300));
    }

    #[test]
    fn test_collect_count_oldest_first() {
        let buf = filled_100_to_500();
        let head_idx = buf.find_time_idx(500).unwrap();
        let got = buf.collect_count(head_idx, 3);
        let times: Vec<_> = got.iter().map(|p| p.ts).collect();
        assert_eq!(times, vec![300, 400, 500]);
    }

    #[test]
    fn test_collect_between_spans_wrap() {
        let mut buf = filled_100_to_500();
        buf.free_tail();
        buf.free_tail();
        buf.add_to_head(point(501)).unwrap();
        buf.add_to_head(point(502)).unwrap();

        let tail_idx = buf.find_time_idx(300).unwrap();
        let head_idx = buf.find_time_idx(502).unwrap();
        let times: Vec<_> = buf
            .collect_between(tail_idx, head_idx)
            .iter()
            .map(|p| p.ts)
            .collect();
        assert_eq!(times, vec![300, 400, 500, 501, 502]);
    }

    #[test]
    fn test_free_tail_to_empty_resets_sentinels() {
        let mut buf = TimeSeriesRingBuffer::new(3).unwrap();
        buf.add_to_head(point(10)).unwrap();
        assert_eq!(buf.free_tail().unwrap().ts, 10);
        assert!(buf.is_empty());
        assert_eq!(buf.time_head(), None);
        assert_eq!(buf.find_time_idx(10), None);

        // reusable after drain
        buf.add_to_head(point(20)).unwrap();
        assert_eq!(buf.time_head(), Some(20));
    }
}
