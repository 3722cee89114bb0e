//! # Geocode Cache
//!
//! Fixed-capacity least-recently-used cache of resolved places.
//!
//! Keys are coordinates rounded to three decimal places (~111 m cells), which
//! trades precision for hit rate: nearby clicks share a result. `get` refreshes
//! recency, `set` evicts the least recently used cell when full. The cache is
//! shared across sessions behind an `Arc` and synchronizes internally.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::Place;
use crate::error::{Result, TripDataError};
use crate::geo_utils::round_coordinate;

/// Default number of cached cells.
pub const DEFAULT_CAPACITY: usize = 100;

/// Decimal places kept in cache keys.
pub const KEY_DECIMALS: u32 = 3;

const KEY_SCALE: f64 = 1_000.0;

/// Coordinates rounded to the cache resolution, stored as integer
/// thousandths of a degree so they hash exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    lat_milli: i32,
    lon_milli: i32,
}

impl CellKey {
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_milli: (latitude * KEY_SCALE).round() as i32,
            lon_milli: (longitude * KEY_SCALE).round() as i32,
        }
    }

    pub fn rounded_latitude(&self) -> f64 {
        self.lat_milli as f64 / KEY_SCALE
    }

    pub fn rounded_longitude(&self) -> f64 {
        self.lon_milli as f64 / KEY_SCALE
    }
}

/// One cached cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    pub rounded_latitude: f64,
    pub rounded_longitude: f64,
    pub place: Place,
}

/// Operational counters. Not used for any business decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Broken internal bookkeeping. Repaired in place and never returned.
#[derive(Debug)]
enum CacheInvariantViolation {
    OverCapacity { size: usize, capacity: usize },
}

impl fmt::Display for CacheInvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheInvariantViolation::OverCapacity { size, capacity } => {
                write!(f, "size {} exceeds capacity {}", size, capacity)
            }
        }
    }
}

/// The shared geocode cache.
#[derive(Debug)]
pub struct GeocodeCache {
    entries: Mutex<LruCache<CellKey, GeocodeCacheEntry>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl GeocodeCache {
    /// Create a cache holding at most `capacity` cells.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| TripDataError::config("geocode cache capacity must be at least 1"))?;
        Ok(Self::with_capacity(capacity))
    }

    fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Look up the cell containing the coordinates, marking it most recently used.
    pub fn get(&self, latitude: f64, longitude: f64) -> Option<Place> {
        let key = CellKey::from_coordinates(latitude, longitude);
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.place.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Like [`GeocodeCache::get`], for a cell whose miss was already counted.
    /// An absent cell is not counted again.
    pub fn get_if_present(&self, latitude: f64, longitude: f64) -> Option<Place> {
        let key = CellKey::from_coordinates(latitude, longitude);
        let mut entries = self.lock();
        let place = entries.get(&key).map(|entry| entry.place.clone());
        if place.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        place
    }

    /// Insert or replace the cell containing the coordinates.
    pub fn set(&self, latitude: f64, longitude: f64, place: Place) {
        let key = CellKey::from_coordinates(latitude, longitude);
        let entry = GeocodeCacheEntry {
            rounded_latitude: round_coordinate(latitude, KEY_DECIMALS),
            rounded_longitude: round_coordinate(longitude, KEY_DECIMALS),
            place,
        };

        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(key, entry) {
            // push also hands back the old value when replacing the same key
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[GeocodeCache] Evicted ({:.3}, {:.3})",
                    evicted.rounded_latitude(),
                    evicted.rounded_longitude()
                );
            }
        }

        if let Err(violation) = self.check_invariants(&entries) {
            error!("[GeocodeCache] Invariant violated ({}), trimming", violation);
            while entries.len() > self.capacity.get() {
                entries.pop_lru();
            }
        }
    }

    /// Whether the cell is cached, without touching recency or counters.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.lock()
            .contains(&CellKey::from_coordinates(latitude, longitude))
    }

    /// The cached entry for a cell, without touching recency or counters.
    pub fn peek_entry(&self, latitude: f64, longitude: f64) -> Option<GeocodeCacheEntry> {
        self.lock()
            .peek(&CellKey::from_coordinates(latitude, longitude))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity.get(),
        }
    }

    fn check_invariants(
        &self,
        entries: &LruCache<CellKey, GeocodeCacheEntry>,
    ) -> std::result::Result<(), CacheInvariantViolation> {
        if entries.len() > self.capacity.get() {
            return Err(CacheInvariantViolation::OverCapacity {
                size: entries.len(),
                capacity: self.capacity.get(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CellKey, GeocodeCacheEntry>> {
        // Entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GeocodeCache {
    fn default() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}
