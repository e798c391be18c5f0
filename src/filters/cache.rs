use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::filters::model::ChainId;
use crate::foundation::core::{PixelSize, Rect};
use crate::render::bitmap::Bitmap;
use crate::scene::model::NodeId;

/// Cache key of one filtered image.
///
/// Entries belong to the node that drew them: two nodes sharing a chain identity never see
/// each other's pixels. Any change of chain identity, source region or target size yields a
/// different key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterCacheKey {
    /// Node the image was computed for.
    pub node: NodeId,
    /// Chain identity.
    pub chain: ChainId,
    /// Bit patterns of the source region, all zero for the whole source.
    pub source_rect: [u64; 4],
    /// Target size in device pixels.
    pub target: PixelSize,
}

impl FilterCacheKey {
    /// Key for filtering `source_rect` of `node`'s sources through `chain` into `target`.
    pub fn new(node: NodeId, chain: ChainId, source_rect: Option<Rect>, target: PixelSize) -> Self {
        let source_rect = source_rect
            .map(|r| [r.x0, r.y0, r.x1, r.y1].map(f64::to_bits))
            .unwrap_or([0; 4]);
        Self {
            node,
            chain,
            source_rect,
            target,
        }
    }
}

/// A cached filter output.
#[derive(Clone, Debug)]
pub struct CachedBitmap {
    /// The filtered image.
    pub bitmap: Bitmap,
    /// Chain that produced it.
    pub chain: ChainId,
}

/// Bounded LRU of filtered images shared between the draw pass and completion callbacks.
pub struct BitmapCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<FilterCacheKey, CachedBitmap>,
    lru: VecDeque<FilterCacheKey>,
    hits: u64,
    misses: u64,
}

impl BitmapCache {
    /// Cache holding up to `capacity` entries. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Look up `key`, refreshing its recency.
    pub fn get(&self, key: &FilterCacheKey) -> Option<CachedBitmap> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).cloned() {
            Some(hit) => {
                inner.hits += 1;
                touch(&mut inner.lru, *key);
                Some(hit)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace an entry, evicting the least recently used beyond capacity.
    pub fn insert(&self, key: FilterCacheKey, value: CachedBitmap) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        inner.entries.insert(key, value);
        touch(&mut inner.lru, key);
        while inner.lru.len() > self.capacity {
            if let Some(old) = inner.lru.pop_front() {
                inner.entries.remove(&old);
            }
        }
    }

    /// Drop an entry.
    pub fn remove(&self, key: &FilterCacheKey) -> Option<CachedBitmap> {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.lru.iter().position(|k| k == key) {
            inner.lru.remove(pos);
        }
        inner.entries.remove(key)
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation.
    pub fn hit_counts(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.hits, inner.misses)
    }
}

fn touch(lru: &mut VecDeque<FilterCacheKey>, key: FilterCacheKey) {
    if let Some(pos) = lru.iter().position(|k| *k == key) {
        lru.remove(pos);
    }
    lru.push_back(key);
}

#[cfg(test)]
#[path = "../../tests/unit/filters/cache.rs"]
mod tests;
