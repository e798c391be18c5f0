use std::collections::HashMap;

use parking_lot::Mutex;

use crate::foundation::core::{Color, PixelSize};
use crate::foundation::error::RenderResult;
use crate::render::bitmap::Bitmap;

/// Pool configuration for recycled bitmap buffers.
#[derive(Debug, Clone, Copy)]
pub struct BitmapPoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained buffers per size bucket.
    pub max_bitmaps_per_bucket: usize,
}

impl Default for BitmapPoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 64 * 1024 * 1024,
            max_bitmaps_per_bucket: 8,
        }
    }
}

/// Counters describing pool behavior.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BitmapPoolStats {
    /// Buffers currently held by the pool.
    pub retained_bitmaps: usize,
    /// Bytes currently held by the pool.
    pub retained_bytes: usize,
    /// Fresh allocations made because no buffer was available.
    pub alloc_bitmaps: u64,
    /// Requests served from a retained buffer.
    pub reused_bitmaps: u64,
    /// Released buffers that were dropped instead of retained.
    pub dropped_on_release: u64,
}

#[derive(Default)]
struct PoolInner {
    stats: BitmapPoolStats,
    buckets: HashMap<PixelSize, Vec<Vec<u8>>>,
}

/// Bounded recycler for premultiplied RGBA8 buffers, keyed by pixel size.
///
/// Filter stages and offscreen passes acquire buffers at stage granularity. A released bitmap
/// returns its buffer only when no other handle still shares it.
pub struct BitmapPool {
    opts: BitmapPoolOpts,
    inner: Mutex<PoolInner>,
}

impl BitmapPool {
    /// Create an empty pool.
    pub fn new(opts: BitmapPoolOpts) -> Self {
        Self {
            opts,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> BitmapPoolStats {
        self.inner.lock().stats.clone()
    }

    /// Obtain a zeroed buffer of `size`.
    pub fn acquire(&self, size: PixelSize) -> Vec<u8> {
        let mut inner = self.inner.lock();
        if let Some(mut buf) = inner.buckets.get_mut(&size).and_then(Vec::pop) {
            inner.stats.retained_bitmaps = inner.stats.retained_bitmaps.saturating_sub(1);
            inner.stats.retained_bytes = inner.stats.retained_bytes.saturating_sub(buf.len());
            inner.stats.reused_bitmaps = inner.stats.reused_bitmaps.saturating_add(1);
            drop(inner);
            buf.fill(0);
            return buf;
        }
        inner.stats.alloc_bitmaps = inner.stats.alloc_bitmaps.saturating_add(1);
        drop(inner);
        vec![0u8; size.byte_len()]
    }

    /// Transparent bitmap backed by a pooled buffer.
    pub fn transparent(&self, size: PixelSize) -> RenderResult<Bitmap> {
        Bitmap::from_premul(size, self.acquire(size))
    }

    /// Solid bitmap backed by a pooled buffer.
    pub fn filled(&self, size: PixelSize, color: Color) -> RenderResult<Bitmap> {
        let mut buf = self.acquire(size);
        let px = color.to_premul();
        if px != [0; 4] {
            for chunk in buf.chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
        Bitmap::from_premul(size, buf)
    }

    /// Hand a bitmap back. Its buffer is retained if this was the last handle and caps allow it.
    pub fn recycle(&self, bitmap: Bitmap) {
        let size = bitmap.size();
        match bitmap.try_into_pixels() {
            Ok(buf) => self.release(size, buf),
            Err(_shared) => {}
        }
    }

    fn release(&self, size: PixelSize, buf: Vec<u8>) {
        let mut inner = self.inner.lock();
        if self.opts.max_pool_bytes == 0 || self.opts.max_bitmaps_per_bucket == 0 {
            inner.stats.dropped_on_release = inner.stats.dropped_on_release.saturating_add(1);
            return;
        }
        let bytes = buf.len();
        if inner.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
            inner.stats.dropped_on_release = inner.stats.dropped_on_release.saturating_add(1);
            return;
        }
        let cap = self.opts.max_bitmaps_per_bucket;
        let bucket = inner.buckets.entry(size).or_default();
        if bucket.len() >= cap {
            inner.stats.dropped_on_release = inner.stats.dropped_on_release.saturating_add(1);
            return;
        }
        bucket.push(buf);
        inner.stats.retained_bitmaps = inner.stats.retained_bitmaps.saturating_add(1);
        inner.stats.retained_bytes = inner.stats.retained_bytes.saturating_add(bytes);
    }
}

impl Default for BitmapPool {
    fn default() -> Self {
        Self::new(BitmapPoolOpts::default())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/bitmap_pool.rs"]
mod tests;
