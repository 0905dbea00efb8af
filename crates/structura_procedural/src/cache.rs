//! # Bounded Value Cache
//!
//! Memory-capped map from `RecordKey` to computed field records, one per
//! worker. When an insert pushes usage over capacity, records are evicted by
//! sampling a handful of random entries and dropping the one with the highest
//! cost score. Large and stale records score highest, which approximates a
//! size-aware LRU without keeping a global ordering.
//!
//! The eviction RNG only decides what gets recomputed later. It never changes
//! generated output.

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use structura_core::{Dimensionality, FieldId};

use crate::record::{DataRecord, RecordKey};

/// Fixed seed of the eviction sampler.
const EVICTION_RNG_SEED: u64 = 0x5354_5255_4354_5552;

/// Misses of one key beyond which a diagnostic is logged.
const MISS_REPORT_THRESHOLD: u32 = 2;

/// Miss counters kept before the table is reset.
const MISS_TABLE_MIN: usize = 4096;

/// Eviction tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionPolicy {
    /// Random candidates examined per eviction.
    pub sample_count: usize,
    /// Weight of record age in the score `size * (1 + weight * age)`.
    pub staleness_weight: f32,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            sample_count: 32,
            staleness_weight: 0.01,
        }
    }
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
    /// Records dropped to stay under capacity.
    pub evictions: u64,
    /// Bytes currently charged.
    pub used_memory: usize,
    /// Records currently held.
    pub records: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    key: RecordKey,
    record: Arc<DataRecord>,
    memory_size: usize,
    last_access: u64,
}

/// Memory-capped record cache.
#[derive(Debug)]
pub struct ValueCache {
    index: HashMap<RecordKey, usize>,
    entries: Vec<CacheEntry>,
    miss_counts: HashMap<RecordKey, u32>,
    /// Context-free dimensionality per field; bounded by the grammar's field count.
    dimensionality: HashMap<FieldId, Dimensionality>,
    used_memory: usize,
    capacity: usize,
    access_counter: u64,
    policy: EvictionPolicy,
    rng: ChaCha8Rng,
    stats: CacheStats,
}

impl ValueCache {
    /// Creates a cache holding at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, EvictionPolicy::default())
    }

    /// Creates a cache with explicit eviction tuning.
    #[must_use]
    pub fn with_policy(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
            miss_counts: HashMap::new(),
            dimensionality: HashMap::new(),
            used_memory: 0,
            capacity,
            access_counter: 0,
            policy,
            rng: ChaCha8Rng::seed_from_u64(EVICTION_RNG_SEED),
            stats: CacheStats::default(),
        }
    }

    /// Looks up a record, refreshing its last access.
    pub fn get(&mut self, key: &RecordKey) -> Option<Arc<DataRecord>> {
        let Some(&slot) = self.index.get(key) else {
            self.stats.misses += 1;
            // Bounded diagnostics table
            if self.miss_counts.len() >= (self.entries.len() * 4).max(MISS_TABLE_MIN) {
                self.miss_counts.clear();
            }
            let count = self.miss_counts.entry(*key).or_insert(0);
            *count += 1;
            if *count > MISS_REPORT_THRESHOLD {
                tracing::debug!(field = key.field.0, misses = *count, "repeated value cache miss");
            }
            return None;
        };

        self.stats.hits += 1;
        let entry = &mut self.entries[slot];
        entry.last_access = self.access_counter;
        self.access_counter += 1;
        Some(Arc::clone(&entry.record))
    }

    /// True if `key` is cached. Does not count as an access.
    #[must_use]
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts or replaces a record, then evicts until within capacity.
    ///
    /// A record larger than the whole capacity is evicted again right away.
    pub fn insert(&mut self, key: RecordKey, record: Arc<DataRecord>, memory_size: usize) {
        let last_access = self.access_counter;
        self.access_counter += 1;

        if let Some(&slot) = self.index.get(&key) {
            let entry = &mut self.entries[slot];
            self.used_memory -= entry.memory_size;
            entry.record = record;
            entry.memory_size = memory_size;
            entry.last_access = last_access;
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push(CacheEntry {
                key,
                record,
                memory_size,
                last_access,
            });
        }
        self.used_memory += memory_size;

        while self.used_memory > self.capacity && !self.entries.is_empty() {
            let victim = self.select_victim();
            self.remove_slot(victim);
            self.stats.evictions += 1;
        }
    }

    /// Picks the highest-scoring entry among a random sample.
    fn select_victim(&mut self) -> usize {
        let len = self.entries.len();
        let candidates: Vec<usize> = if len <= self.policy.sample_count {
            (0..len).collect()
        } else {
            (0..self.policy.sample_count.max(1))
                .map(|_| self.rng.gen_range(0..len))
                .collect()
        };

        let mut best = candidates[0];
        let mut best_score = f32::NEG_INFINITY;
        for slot in candidates {
            let score = self.score(&self.entries[slot]);
            if score > best_score {
                best_score = score;
                best = slot;
            }
        }
        best
    }

    fn score(&self, entry: &CacheEntry) -> f32 {
        let age = self.access_counter.saturating_sub(entry.last_access) as f32;
        entry.memory_size as f32 * (1.0 + self.policy.staleness_weight * age)
    }

    fn remove_slot(&mut self, slot: usize) {
        let entry = self.entries.swap_remove(slot);
        self.index.remove(&entry.key);
        self.used_memory -= entry.memory_size;
        if let Some(moved) = self.entries.get(slot) {
            self.index.insert(moved.key, slot);
        }
    }

    /// Drops every record. Statistics are kept.
    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.miss_counts.clear();
        self.dimensionality.clear();
        self.used_memory = 0;
    }

    /// Remembered dimensionality of a field that reads no context.
    #[must_use]
    pub fn dimensionality(&self, field: FieldId) -> Option<Dimensionality> {
        self.dimensionality.get(&field).copied()
    }

    /// Remembers the dimensionality of a field that reads no context.
    pub fn remember_dimensionality(&mut self, field: FieldId, d: Dimensionality) {
        self.dimensionality.insert(field, d);
    }

    /// Bytes currently charged.
    #[must_use]
    pub const fn used_memory(&self) -> usize {
        self.used_memory
    }

    /// Capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            used_memory: self.used_memory,
            records: self.entries.len(),
            ..self.stats
        }
    }

    /// Recomputes usage from the entries; equals `used_memory()` when the
    /// accounting is intact.
    #[must_use]
    pub fn accounted_memory(&self) -> usize {
        self.entries.iter().map(|e| e.memory_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structura_core::{BlockPos, FieldId, Sample};

    fn key(i: i32) -> RecordKey {
        RecordKey::point(FieldId(0), BlockPos::new(i, 0, 0))
    }

    fn record() -> Arc<DataRecord> {
        Arc::new(DataRecord::uniform(Sample::Float(1.0)))
    }

    #[test]
    fn test_get_after_insert() {
        let mut cache = ValueCache::new(1 << 20);
        assert!(cache.get(&key(1)).is_none());
        cache.insert(key(1), record(), 100);

        assert!(cache.get(&key(1)).is_some());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_accounting_under_pressure() {
        let mut cache = ValueCache::new(10_000);
        for i in 0..2_000 {
            cache.insert(key(i % 700), record(), 50 + (i as usize * 37) % 400);
            assert_eq!(cache.used_memory(), cache.accounted_memory());
            assert!(cache.used_memory() <= cache.capacity());
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_replace_adjusts_memory() {
        let mut cache = ValueCache::new(1_000);
        cache.insert(key(1), record(), 300);
        cache.insert(key(1), record(), 100);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_memory(), 100);
    }

    #[test]
    fn test_oversized_record_evicted_immediately() {
        let mut cache = ValueCache::new(100);
        cache.insert(key(1), record(), 500);

        assert!(cache.is_empty());
        assert_eq!(cache.used_memory(), 0);
    }

    #[test]
    fn test_stale_records_evicted_first() {
        let mut cache = ValueCache::with_policy(
            1_000,
            EvictionPolicy {
                sample_count: 32,
                staleness_weight: 1.0,
            },
        );
        cache.insert(key(1), record(), 400);
        cache.insert(key(2), record(), 400);
        for _ in 0..10 {
            let _ = cache.get(&key(2));
        }
        cache.insert(key(3), record(), 400);

        assert!(!cache.contains(&key(1)), "oldest record should go");
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn test_miss_table_stays_bounded() {
        let mut cache = ValueCache::new(4096);
        for i in 0..100_000 {
            assert!(cache.get(&key(i)).is_none());
            cache.insert(key(i), record(), 64);
        }

        assert_eq!(cache.len(), 64);
        assert!(cache.miss_counts.len() <= MISS_TABLE_MIN);
        assert_eq!(cache.stats().misses, 100_000);
    }
}
