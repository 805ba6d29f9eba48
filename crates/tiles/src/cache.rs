//! Process-wide tile cache with LRU eviction to swap
//!
//! Tracks every resident tile across all managers built on the same cache.
//! When resident memory exceeds the configured limit, the least recently used
//! unreferenced tiles are written to the [`SwapStore`] and their buffers
//! freed. The limit is soft: if nothing can be evicted the cache stays over
//! budget rather than failing the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Weak};

use crate::config::TileCacheConfig;
use crate::error::TileError;
use crate::swap::SwapStore;
use crate::tile::{self, Eviction, ManagerId, Tile, TileKey, WriteBack};

/// Memory pressure level of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    /// Memory usage is low (< 50% utilization)
    Low,
    /// Memory usage is moderate (50-75% utilization)
    Moderate,
    /// Memory usage is high (75-90% utilization)
    High,
    /// Memory usage is critical (>= 90% utilization)
    Critical,
}

impl MemoryPressure {
    /// Get the memory pressure level from a utilization ratio
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            MemoryPressure::Low
        } else if utilization < 0.75 {
            MemoryPressure::Moderate
        } else if utilization < 0.90 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of resident tiles tracked by the cache
    pub tile_count: usize,

    /// Bytes held by resident tiles
    pub resident_bytes: usize,

    /// Soft limit on resident bytes
    pub limit: usize,

    /// References to tiles that were already resident
    pub hits: u64,

    /// References that had to validate or swap in a tile
    pub misses: u64,

    /// Tiles evicted to make room
    pub evictions: u64,

    /// Tiles read back from swap
    pub swap_ins: u64,

    /// Tiles written to swap
    pub swap_outs: u64,

    /// Swap writes that failed and left the tile resident
    pub swap_write_failures: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Resident bytes as a fraction of the limit; may exceed 1.0
    pub fn utilization(&self) -> f64 {
        if self.limit == 0 {
            if self.resident_bytes == 0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            self.resident_bytes as f64 / self.limit as f64
        }
    }

    pub fn pressure(&self) -> MemoryPressure {
        MemoryPressure::from_utilization(self.utilization())
    }
}

struct CacheEntry {
    tick: u64,
    size: usize,
    tile: Weak<Tile>,
}

/// Internal cache state
struct CacheState {
    entries: HashMap<TileKey, CacheEntry>,

    /// Access tick to key, oldest first. Ticks are unique, so ties between
    /// tiles touched in the same instant fall back to insertion order.
    lru: BTreeMap<u64, TileKey>,

    tick: u64,
    resident_bytes: usize,
    limit: usize,
    stats: CacheStats,
    swap_errors: Vec<TileError>,
}

impl CacheState {
    fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: BTreeMap::new(),
            tick: 0,
            resident_bytes: 0,
            limit,
            stats: CacheStats::default(),
            swap_errors: Vec::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Move a key to the most recently used end
    fn touch(&mut self, key: TileKey) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(&key) {
            self.lru.remove(&entry.tick);
            entry.tick = tick;
            self.lru.insert(tick, key);
        }
    }

    fn remove(&mut self, key: TileKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(&key)?;
        self.lru.remove(&entry.tick);
        self.resident_bytes = self.resident_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    fn record_swap_error(&mut self, key: TileKey, err: TileError) {
        log::warn!(
            "swap-out of tile {}:{} failed, keeping it resident: {}",
            key.manager.get(),
            key.serial,
            err
        );
        self.stats.swap_write_failures += 1;
        self.swap_errors.push(err);
    }

    /// Try to evict one tile. Returns true if its buffer was freed.
    fn evict(&mut self, key: TileKey) -> bool {
        let Some(tile) = self.entries.get(&key).and_then(|entry| entry.tile.upgrade()) else {
            // Owner is gone; drop the stale entry.
            self.remove(key);
            return false;
        };

        match tile.try_evict() {
            Eviction::Evicted { wrote } => {
                self.remove(key);
                self.stats.evictions += 1;
                if wrote {
                    self.stats.swap_outs += 1;
                }
                log::trace!(
                    "evicted tile {}:{} ({} bytes, wrote: {})",
                    key.manager.get(),
                    key.serial,
                    tile.size(),
                    wrote
                );
                true
            }
            Eviction::Busy => false,
            Eviction::Failed(err) => {
                self.record_swap_error(key, err);
                false
            }
        }
    }

    fn insert(&mut self, tile: &Tile) {
        let key = tile.key();
        let tick = self.next_tick();
        self.entries.insert(
            key,
            CacheEntry {
                tick,
                size: tile.size(),
                tile: tile.weak(),
            },
        );
        self.lru.insert(tick, key);
        self.resident_bytes += tile.size();
    }

    /// Evict least recently used tiles until resident memory fits the limit
    fn evict_to_fit(&mut self) {
        // Ticks of busy tiles stay in the map, so resume past the last one
        // visited instead of rescanning from the oldest.
        let mut cursor = 0;
        while self.resident_bytes > self.limit {
            let Some((&tick, &key)) = self.lru.range(cursor..).next() else {
                break;
            };
            cursor = tick + 1;
            self.evict(key);
        }
    }

    fn keys_of(&self, manager: ManagerId) -> Vec<TileKey> {
        self.lru
            .values()
            .filter(|key| key.manager == manager)
            .copied()
            .collect()
    }
}

/// Bounds resident tile memory across every manager that shares it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tessera_tiles::{Access, PixelFormat, Plane, TileCache, TileCacheConfig, TileManager};
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = TileCacheConfig::default()
///     .with_cache_mb(1)
///     .with_swap_dir(dir.path());
/// let cache = Arc::new(TileCache::new(config));
///
/// let manager = TileManager::new(cache.clone(), 256, 256, PixelFormat::RgbAlpha);
/// let tile = manager.get_tile_at(200, 200, Plane::Main).unwrap();
/// let guard = tile.reference(Access::Read).unwrap();
/// assert_eq!(guard.pixels().len(), 64 * 64 * 4);
/// drop(guard);
///
/// println!("resident: {} bytes", cache.total_resident_bytes());
/// ```
pub struct TileCache {
    config: TileCacheConfig,
    swap: SwapStore,
    state: Mutex<CacheState>,
    next_manager: AtomicU64,
    next_serial: AtomicU64,
}

impl TileCache {
    /// Create a cache with a swap file in `config.swap_dir`.
    pub fn new(config: TileCacheConfig) -> Self {
        let swap = SwapStore::new(&config.swap_dir);
        Self::with_swap_store(config, swap)
    }

    /// Create a cache on top of an existing swap store.
    pub fn with_swap_store(config: TileCacheConfig, swap: SwapStore) -> Self {
        Self {
            state: Mutex::new(CacheState::new(config.cache_size)),
            config,
            swap,
            next_manager: AtomicU64::new(1),
            next_serial: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        tile::lock(&self.state)
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    /// Tile edge length used by managers built on this cache
    pub fn tile_size(&self) -> u32 {
        self.config.tile_size.max(1)
    }

    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    /// Bytes held by resident tiles
    pub fn total_resident_bytes(&self) -> usize {
        self.lock().resident_bytes
    }

    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    /// Number of resident tiles tracked
    pub fn tile_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            tile_count: state.entries.len(),
            resident_bytes: state.resident_bytes,
            limit: state.limit,
            ..state.stats
        }
    }

    /// Drain the swap-out failures recorded since the last call.
    pub fn take_swap_errors(&self) -> Vec<TileError> {
        std::mem::take(&mut self.lock().swap_errors)
    }

    /// Change the soft limit, evicting down to it immediately.
    pub fn set_limit(&self, bytes: usize) {
        let mut state = self.lock();
        state.limit = bytes;
        state.evict_to_fit();
    }

    /// Mark a resident tile as most recently used.
    ///
    /// A resident tile the cache no longer tracks is tracked again, so its
    /// buffer counts against the limit.
    pub fn note_access(&self, tile: &Tile) {
        let mut state = self.lock();
        state.stats.hits += 1;
        let key = tile.key();
        if state.entries.contains_key(&key) {
            state.touch(key);
        } else {
            state.insert(tile);
            state.evict_to_fit();
        }
    }

    /// Start tracking a tile that just became resident, evicting older
    /// unreferenced tiles if that pushes the cache over its limit.
    pub fn admit(&self, tile: &Tile) {
        let mut state = self.lock();
        let key = tile.key();
        state.stats.misses += 1;

        if state.entries.contains_key(&key) {
            state.touch(key);
        } else {
            state.insert(tile);
        }

        state.evict_to_fit();
    }

    /// Drop every entry belonging to `manager` without writing anything back.
    /// Only for a manager that is going away.
    pub(crate) fn flush_manager(&self, manager: ManagerId) {
        let mut state = self.lock();
        for key in state.keys_of(manager) {
            state.remove(key);
        }
    }

    /// Stop tracking one tile.
    pub(crate) fn forget(&self, key: TileKey) {
        self.lock().remove(key);
    }

    /// Evict every unreferenced tile of `manager`. Returns how many were
    /// evicted.
    pub fn evict_manager(&self, manager: ManagerId) -> usize {
        let mut state = self.lock();
        let mut evicted = 0;
        for key in state.keys_of(manager) {
            if state.evict(key) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Write up to `max_tiles` dirty unreferenced tiles to swap, oldest
    /// first, without freeing them. Returns how many were written.
    pub fn swap_out_idle(&self, max_tiles: usize) -> usize {
        let mut state = self.lock();
        let candidates: Vec<(TileKey, Weak<Tile>)> = state
            .lru
            .values()
            .filter_map(|key| state.entries.get(key).map(|entry| (*key, entry.tile.clone())))
            .collect();

        let mut written = 0;
        for (key, weak) in candidates {
            if written >= max_tiles {
                break;
            }
            let Some(tile) = weak.upgrade() else {
                continue;
            };
            match tile.try_write_back_idle() {
                Ok(WriteBack::Written) => {
                    written += 1;
                    state.stats.swap_outs += 1;
                }
                Ok(WriteBack::Clean | WriteBack::Busy) => {}
                Err(err) => state.record_swap_error(key, err),
            }
        }
        written
    }

    pub(crate) fn next_manager_id(&self) -> ManagerId {
        ManagerId(self.next_manager.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_serial(&self) -> u64 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn record_swap_in(&self) {
        self.lock().stats.swap_ins += 1;
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
