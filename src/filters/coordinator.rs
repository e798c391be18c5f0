use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::filters::cache::{BitmapCache, CachedBitmap, FilterCacheKey};
use crate::filters::model::FilterChain;
use crate::filters::pipeline::FilterPipeline;
use crate::filters::result::FilterResult;
use crate::foundation::core::{PixelSize, Rect};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::bitmap::Bitmap;
use crate::render::bitmap_pool::BitmapPool;
use crate::scene::model::NodeId;

/// Something that can be asked to draw again, typically a layer.
pub trait RedrawTarget: Send + Sync {
    /// Schedule a redraw. Called from worker threads.
    fn request_redraw(&self);
}

/// What the draw pass should do for a filtered image this frame.
#[derive(Clone, Debug)]
pub enum FilterState {
    /// Filtered image available now.
    Ready(Bitmap),
    /// Computation in flight; a redraw follows completion.
    Pending,
    /// Nothing to draw this frame.
    Skipped,
}

/// One image-filter request from the draw pass.
#[derive(Clone, Copy, Debug)]
pub struct FilterRequest<'a> {
    /// Node the result belongs to.
    pub node: NodeId,
    /// Chain to run.
    pub chain: &'a Arc<FilterChain>,
    /// Uncropped source bitmaps.
    pub sources: &'a [Bitmap],
    /// Region of the sources to filter, in source pixels.
    pub source_rect: Option<Rect>,
    /// Target size in device pixels.
    pub target: PixelSize,
}

/// Connects the draw pass to the filter pipeline.
///
/// Owns the shared bitmap cache and a side table of nodes with a computation in flight, so a
/// node is never resubmitted while its result is pending. Both are keyed by [`NodeId`], which
/// must be unique among the nodes drawn through one coordinator; decoding a
/// [`Scene`](crate::Scene) guarantees that within the scene.
pub struct FilterCoordinator {
    pipeline: Arc<FilterPipeline>,
    cache: Arc<BitmapCache>,
    pending: Arc<DashMap<NodeId, FilterCacheKey>>,
    usage_errors: Arc<DashMap<NodeId, String>>,
    waiters: Arc<Waiters>,
}

#[derive(Default)]
struct Waiters {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Waiters {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

impl FilterCoordinator {
    /// Coordinator over `pipeline` with a cache of `cache_capacity` entries.
    pub fn new(pipeline: FilterPipeline, cache_capacity: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            cache: Arc::new(BitmapCache::new(cache_capacity)),
            pending: Arc::new(DashMap::new()),
            usage_errors: Arc::new(DashMap::new()),
            waiters: Arc::new(Waiters::default()),
        }
    }

    /// The underlying pipeline.
    pub fn pipeline(&self) -> &Arc<FilterPipeline> {
        &self.pipeline
    }

    /// The shared result cache.
    pub fn cache(&self) -> &Arc<BitmapCache> {
        &self.cache
    }

    /// `true` while `node` has a computation in flight.
    pub fn is_pending(&self, node: NodeId) -> bool {
        self.pending.contains_key(&node)
    }

    /// Number of nodes with a computation in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Block until no completion callback is outstanding, or `timeout` elapses.
    ///
    /// Returns `true` when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.waiters.count.lock();
        while *count > 0 {
            if self.waiters.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Resolve the filtered image for one node.
    ///
    /// The cache is consulted per node, so another node's result for the same chain is never
    /// drawn. Cache hits and synchronously completed chains are `Ready`. Otherwise the chain is
    /// submitted once, and a worker waits for it, fills the cache, clears the pending entry and
    /// asks `redraw` to draw again. A usage error found by an earlier computation for this node
    /// is returned here.
    pub fn request(
        &self,
        req: FilterRequest<'_>,
        redraw: Option<Weak<dyn RedrawTarget>>,
    ) -> RenderResult<FilterState> {
        if let Some((_, msg)) = self.usage_errors.remove(&req.node) {
            return Err(RenderError::usage(msg));
        }
        let key = FilterCacheKey::new(req.node, req.chain.id, req.source_rect, req.target);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(FilterState::Ready(hit.bitmap));
        }
        if self.pending.get(&req.node).is_some_and(|k| *k == key) {
            return Ok(FilterState::Pending);
        }

        let sources = match req.source_rect {
            Some(r) => req
                .sources
                .iter()
                .map(|b| b.crop(r))
                .collect::<RenderResult<Vec<_>>>(),
            None => Ok(req.sources.to_vec()),
        };
        let sources = match sources {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(node = req.node.0, error = %e, "filter source region unusable");
                return Ok(FilterState::Skipped);
            }
        };
        let size = sources.first().map(Bitmap::size).unwrap_or(req.target);

        let run = match self.pipeline.submit(req.chain, sources) {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(node = req.node.0, error = %e, "filter chain not submitted");
                return Ok(FilterState::Skipped);
            }
        };

        if let Some(done) = run.peek() {
            let bitmap = finalize(done?, size, self.pipeline.bitmaps())?;
            self.cache.insert(
                key,
                CachedBitmap {
                    bitmap: bitmap.clone(),
                    chain: req.chain.id,
                },
            );
            return Ok(FilterState::Ready(bitmap));
        }

        self.pending.insert(req.node, key);
        self.waiters.enter();
        let node = req.node;
        let chain = req.chain.id;
        let cache = self.cache.clone();
        let pending = self.pending.clone();
        let usage_errors = self.usage_errors.clone();
        let waiters = self.waiters.clone();
        let bitmaps = self.pipeline.bitmaps().clone();
        let spawned = self.pipeline.spawn(move || {
            match run.wait().and_then(|r| finalize(r, size, &bitmaps)) {
                Ok(bitmap) => cache.insert(key, CachedBitmap { bitmap, chain }),
                Err(e) if e.is_usage() => {
                    tracing::error!(node = node.0, error = %e, "misconfigured filter chain");
                    usage_errors.insert(node, e.to_string());
                }
                Err(e) => tracing::warn!(node = node.0, error = %e, "filtered image unavailable"),
            }
            pending.remove_if(&node, |_, k| *k == key);
            match redraw.and_then(|w| w.upgrade()) {
                Some(target) => target.request_redraw(),
                None => tracing::debug!(node = node.0, "redraw target gone"),
            }
            waiters.leave();
        });
        if let Err(e) = spawned {
            tracing::warn!(node = node.0, error = %e, "filter completion not scheduled");
            self.pending.remove_if(&node, |_, k| *k == key);
            self.waiters.leave();
            return Ok(FilterState::Skipped);
        }
        Ok(FilterState::Pending)
    }
}

/// Concrete bitmap for a final result. Lazy results take `size`.
fn finalize(result: FilterResult, size: PixelSize, pool: &BitmapPool) -> RenderResult<Bitmap> {
    match result {
        FilterResult::Bitmap(b) => Ok(b),
        lazy => lazy.materialize(size, pool),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/coordinator.rs"]
mod tests;
