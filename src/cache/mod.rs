//! The value cache
//!
//! Public entry points for the monitoring server: batched sample writes,
//! the two read shapes (last N values, time window), metadata updates and
//! the periodic housekeeping pass. One [`ValueCache`] instance is shared
//! by reference between server threads; there is no global singleton.

pub mod demand;
pub mod entry;
pub mod report;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::backing::BackingStore;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::memory::MemoryBudget;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::strpool::StringPool;
use crate::table::CacheTable;
use crate::types::{ItemId, ItemMetadata, ItemState, MetaUpdate, TimeSeriesPoint, Timestamp, ValueRecord, ValueType};

use entry::ItemEntry;
use report::{ItemLastValues, ItemReport, PointReport};

/// Shared collaborators handed to entry logic
pub(crate) struct CacheContext {
    pub config: CacheConfig,
    pub budget: Arc<MemoryBudget>,
    pub store: Arc<dyn BackingStore>,
    pub strpool: Arc<StringPool>,
    pub stats: Arc<CacheStats>,
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("config", &self.config)
            .finish()
    }
}

/// How a read bounds the data it wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueQuery {
    /// The newest `count` values at or before the anchor
    ByCount(usize),
    /// All values within `seconds` before the anchor
    ByTime(u32),
}

/// In-memory value cache in front of a slower history store
pub struct ValueCache {
    ctx: Arc<CacheContext>,
    table: CacheTable<ItemEntry>,
}

impl ValueCache {
    /// Create a cache over the given backing store with default configuration
    pub fn with_defaults(store: Arc<dyn BackingStore>) -> Result<Self> {
        Self::new(CacheConfig::default(), store)
    }

    /// Create a cache over the given backing store
    pub fn new(config: CacheConfig, store: Arc<dyn BackingStore>) -> Result<Self> {
        config.validate()?;
        let budget = Arc::new(MemoryBudget::new(config.mem_limit_bytes));
        let ctx = Arc::new(CacheContext {
            config,
            budget,
            store,
            strpool: Arc::new(StringPool::new()),
            stats: Arc::new(CacheStats::new()),
        });

        let factory_ctx = Arc::clone(&ctx);
        let table = CacheTable::new(Box::new(move |_id| {
            ItemEntry::new(&factory_ctx, wall_clock())
        }));
        Ok(Self { ctx, table })
    }

    /// Number of items currently cached
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when no items are cached
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Bytes currently charged against the memory budget
    pub fn mem_used(&self) -> usize {
        self.ctx.budget.used()
    }

    /// Operation counters
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Write a batch of samples
    ///
    /// Entries are created implicitly. Every record is attempted; the first
    /// failure is reported after the whole batch has been processed.
    pub fn add_item_values(&self, records: &[ValueRecord]) -> Result<()> {
        let now = wall_clock();
        let mut first_error = None;
        let mut accepted = 0u64;

        for record in records {
            let result = self.table.process_or_create(record.itemid, |entry| {
                entry.add_value(&self.ctx, record.itemid, record.ts, record.value.clone(), now)
            });
            match result.and_then(|inner| inner) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    warn!(itemid = record.itemid, ts = record.ts, "sample rejected: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.ctx.stats.record_values_written(accepted);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read the newest `count` values of an item at or before `ts_head`
    ///
    /// Falls back to the backing store on a miss. Returns points oldest
    /// first. Never returns a short result: if cache and store together
    /// cannot supply `count` points the call fails.
    pub fn get_item_values_by_count(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        count: usize,
        ts_head: Timestamp,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let now = wall_clock();
        self.table
            .process(itemid, |entry| {
                entry.get_by_count(&self.ctx, itemid, value_type, count, ts_head, now)
            })
            .and_then(|inner| inner)
    }

    /// Read all values of an item within `[ts_head - seconds, ts_head]`
    pub fn get_item_values_by_time(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        seconds: u32,
        ts_head: Timestamp,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let now = wall_clock();
        self.table
            .process(itemid, |entry| {
                entry.get_by_time(&self.ctx, itemid, value_type, seconds, ts_head, now)
            })
            .and_then(|inner| inner)
    }

    /// Dispatch a read by its query shape
    pub fn get_values(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        query: ValueQuery,
        ts_head: Timestamp,
    ) -> Result<Vec<TimeSeriesPoint>> {
        match query {
            ValueQuery::ByCount(count) => {
                self.get_item_values_by_count(itemid, value_type, count, ts_head)
            }
            ValueQuery::ByTime(seconds) => {
                self.get_item_values_by_time(itemid, value_type, seconds, ts_head)
            }
        }
    }

    /// Apply a partial metadata update, creating the entry when absent
    pub fn update_item_meta(&self, itemid: ItemId, update: &MetaUpdate) -> Result<()> {
        self.table.process_or_create(itemid, |entry| {
            entry.update_meta(&self.ctx, update);
        })
    }

    /// Current metadata of an item
    pub fn item_meta(&self, itemid: ItemId) -> Result<ItemMetadata> {
        self.table.process(itemid, |entry| entry.meta())
    }

    /// Polling state of an item
    pub fn item_state(&self, itemid: ItemId) -> Result<ItemState> {
        self.table.process(itemid, |entry| entry.meta().state)
    }

    /// Next scheduled poll of an item
    pub fn item_nextcheck(&self, itemid: ItemId) -> Result<Timestamp> {
        self.table.process(itemid, |entry| entry.meta().nextcheck)
    }

    /// Metadata plus the newest `count` cached points of one item
    pub fn item_report(&self, itemid: ItemId, count: usize) -> Result<ItemReport> {
        self.table.process(itemid, |entry| {
            let meta = entry.meta();
            ItemReport {
                itemid,
                lastdata: meta.lastdata,
                nextcheck: meta.nextcheck,
                state: meta.state,
                error: meta.error.as_deref().map(str::to_string),
                data: entry
                    .last_values(count)
                    .into_iter()
                    .map(PointReport::from)
                    .collect(),
            }
        })
    }

    /// Newest cached values for a set of items, best effort
    ///
    /// Items that were never written are skipped; no store fallback.
    pub fn last_values(&self, ids: &[ItemId], count: usize) -> Vec<ItemLastValues> {
        ids.iter()
            .filter_map(|&itemid| {
                self.table
                    .process(itemid, |entry| ItemLastValues {
                        itemid,
                        values: entry
                            .last_values(count)
                            .into_iter()
                            .map(PointReport::from)
                            .collect(),
                    })
                    .ok()
            })
            .collect()
    }

    /// Evict items unaccessed for longer than the configured idle limit
    ///
    /// Runs against the wall clock; call [`ValueCache::housekeep_at`] to
    /// drive the clock explicitly. Scheduling is the caller's concern.
    pub fn housekeep(&self) -> usize {
        self.housekeep_at(wall_clock())
    }

    /// Housekeeping pass with an explicit notion of "now"
    ///
    /// Busy items are skipped, hot items survive, evicted payloads and
    /// their budget charges are released, and the string pool is swept.
    pub fn housekeep_at(&self, now: Timestamp) -> usize {
        let max_idle = self.ctx.config.max_idle;
        let removed = self.table.evict_where(|_, entry| {
            if entry.is_idle(now, max_idle) {
                entry.release_all(&self.ctx);
                true
            } else {
                false
            }
        });
        let purged = self.ctx.strpool.purge_unused();
        if removed > 0 || purged > 0 {
            debug!(removed, purged, "housekeeping pass done");
        }
        removed
    }
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCache")
            .field("items", &self.table.len())
            .field("mem_used", &self.ctx.budget.used())
            .finish()
    }
}

fn wall_clock() -> Timestamp {
    Utc::now().timestamp().max(0) as Timestamp
}
