//! Options constructed once by the view host and passed down.

use crate::foundation::error::{RenderError, RenderResult};
use crate::render::bitmap_pool::BitmapPoolOpts;

/// Options of the filter worker pool and its cache.
#[derive(Clone, Copy, Debug)]
pub struct FilterPipelineOpts {
    /// Worker threads; `None` lets rayon pick.
    pub threads: Option<usize>,
    /// Chains allowed in flight before submissions are rejected.
    pub max_in_flight: usize,
    /// Filtered bitmaps kept by the cache.
    pub cache_capacity: usize,
    /// Caps of the intermediate buffer pool.
    pub bitmap_pool: BitmapPoolOpts,
}

impl Default for FilterPipelineOpts {
    fn default() -> Self {
        Self {
            threads: None,
            max_in_flight: 64,
            cache_capacity: 32,
            bitmap_pool: BitmapPoolOpts::default(),
        }
    }
}

impl FilterPipelineOpts {
    /// Defaults overridden by `APL_FILTER_THREADS` and `APL_FILTER_CACHE_CAPACITY`.
    ///
    /// Unparsable values are ignored. An explicit thread count of zero is rejected.
    pub fn from_env() -> RenderResult<Self> {
        let mut opts = Self::default();
        if let Some(n) = env_usize("APL_FILTER_THREADS") {
            opts = opts.with_threads(n)?;
        }
        if let Some(n) = env_usize("APL_FILTER_CACHE_CAPACITY").filter(|&n| n > 0) {
            opts.cache_capacity = n;
        }
        Ok(opts)
    }

    /// Fixed worker count.
    pub fn with_threads(mut self, threads: usize) -> RenderResult<Self> {
        if threads == 0 {
            return Err(RenderError::validation(
                "filter pipeline 'threads' must be >= 1 when set",
            ));
        }
        self.threads = Some(threads);
        Ok(self)
    }

    /// In-flight chain limit.
    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n;
        self
    }

    /// Cache capacity in entries.
    pub fn with_cache_capacity(mut self, n: usize) -> Self {
        self.cache_capacity = n;
        self
    }

    /// Buffer pool caps.
    pub fn with_bitmap_pool(mut self, pool: BitmapPoolOpts) -> Self {
        self.bitmap_pool = pool;
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<usize>().ok())
}

/// Options of the scene renderer.
#[derive(Clone, Copy, Debug)]
pub struct RenderOpts {
    /// Largest offscreen raster, in pixels, for shadows and pattern tiles.
    pub max_offscreen_px: u64,
    /// Accuracy of arc-length measurement for dash scaling.
    pub path_accuracy: f64,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            max_offscreen_px: 4096 * 4096,
            path_accuracy: 1e-3,
        }
    }
}

impl RenderOpts {
    /// Offscreen pixel limit.
    pub fn with_max_offscreen_px(mut self, px: u64) -> Self {
        self.max_offscreen_px = px;
        self
    }

    /// Arc-length accuracy.
    pub fn with_path_accuracy(mut self, accuracy: f64) -> Self {
        self.path_accuracy = accuracy;
        self
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
