use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::config::FilterPipelineOpts;
use crate::filters::extension::ExtensionRegistry;
use crate::filters::future::{FilterFailure, FilterFuture, FilterOutcome, FilterPromise};
use crate::filters::kernels::{blur_params, grayscale_matrix, noise_in_place, saturate_matrix};
use crate::filters::model::{BlendMode, FilterChain, FilterDesc, FilterKind, NoiseKind};
use crate::filters::result::FilterResult;
use crate::filters::script::{CpuScripts, ScriptBackend, ScriptKind, ScriptScope};
use crate::foundation::core::PixelSize;
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::bitmap::Bitmap;
use crate::render::bitmap_pool::BitmapPool;

/// Runs filter chains on a bounded worker pool.
///
/// Stages are submitted in chain order. Each stage blocks only on its own inputs, so
/// independent branches of a chain run concurrently.
pub struct FilterPipeline {
    pool: rayon::ThreadPool,
    env: Arc<StageEnv>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
    shutdown: AtomicBool,
}

struct StageEnv {
    bitmaps: Arc<BitmapPool>,
    scripts: Arc<dyn ScriptBackend>,
    extensions: ExtensionRegistry,
}

impl FilterPipeline {
    /// Pipeline running accelerated stages on `scripts`.
    pub fn new(
        opts: &FilterPipelineOpts,
        scripts: Arc<dyn ScriptBackend>,
        extensions: ExtensionRegistry,
    ) -> RenderResult<Self> {
        Ok(Self {
            pool: build_thread_pool(opts.threads)?,
            env: Arc::new(StageEnv {
                bitmaps: Arc::new(BitmapPool::new(opts.bitmap_pool)),
                scripts,
                extensions,
            }),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: opts.max_in_flight,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Pipeline on a [`CpuScripts`] backend.
    pub fn with_cpu_scripts(
        opts: &FilterPipelineOpts,
        extensions: ExtensionRegistry,
    ) -> RenderResult<Self> {
        Self::new(opts, Arc::new(CpuScripts::new()), extensions)
    }

    /// Buffer pool intermediates are drawn from and disposed into.
    pub fn bitmaps(&self) -> &Arc<BitmapPool> {
        &self.env.bitmaps
    }

    /// Chains submitted and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop accepting work. Running stages finish normally.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// `true` after [`FilterPipeline::shutdown`].
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Run an auxiliary job on the worker pool.
    pub fn spawn<F>(&self, job: F) -> RenderResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(RenderError::rejected("filter pipeline is shut down"));
        }
        self.pool.spawn_fifo(job);
        Ok(())
    }

    /// Schedule every stage of `chain` over `sources`.
    ///
    /// Returns as soon as the stages are queued. Fails with [`RenderError::Rejected`] when the
    /// pipeline is shut down or already has the maximum number of chains in flight.
    #[tracing::instrument(
        level = "debug",
        skip(self, chain, sources),
        fields(chain = chain.id.0, stages = chain.len(), sources = sources.len())
    )]
    pub fn submit(&self, chain: &FilterChain, sources: Vec<Bitmap>) -> RenderResult<FilterRun> {
        if self.is_shut_down() {
            return Err(RenderError::rejected("filter pipeline is shut down"));
        }
        let m = sources.len();
        let n = chain.len();
        let total = m + n;
        let final_index = total.checked_sub(1);
        let origin = sources.first().map(Bitmap::size);

        let mut uses = vec![0usize; total];
        let inputs: Vec<[Option<Input>; 2]> = chain
            .filters
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                let len = m + i;
                let mut wire = |idx: Option<i32>, role: &str| {
                    idx.map(|idx| match resolve_index(idx, len) {
                        Some(j) => {
                            uses[j] += 1;
                            Input::Slot(j)
                        }
                        None => {
                            tracing::warn!(
                                stage = i,
                                index = idx,
                                results = len,
                                "filter {role} index out of range, using transparent"
                            );
                            Input::Missing
                        }
                    })
                };
                [
                    wire(desc.source_index(), "source"),
                    wire(desc.destination_index(), "destination"),
                ]
            })
            .collect();

        if n > 0 {
            let prev = self.in_flight.fetch_add(1, Ordering::AcqRel);
            if prev >= self.max_in_flight {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                return Err(RenderError::rejected(format!(
                    "{prev} filter chains already in flight"
                )));
            }
        }

        let mut slots: Vec<Option<FilterFuture>> = sources
            .into_iter()
            .map(|b| Some(FilterFuture::ready(Ok(FilterResult::Bitmap(b)))))
            .collect();
        let mut promises: Vec<FilterPromise> = Vec::with_capacity(n);
        for _ in 0..n {
            let (promise, future) = FilterFuture::channel();
            promises.push(promise);
            slots.push(Some(future));
        }
        let result = final_index
            .and_then(|f| slots[f].clone())
            .unwrap_or_else(|| FilterFuture::ready(Ok(FilterResult::transparent())));
        let input_futures: Vec<[Option<FilterFuture>; 2]> = inputs
            .iter()
            .map(|pair| {
                pair.clone().map(|input| {
                    input.map(|input| match input {
                        Input::Slot(j) => slots[j].clone().unwrap_or_else(transparent_future),
                        Input::Missing => transparent_future(),
                    })
                })
            })
            .collect();

        let ledger = Arc::new(ChainLedger::new(
            uses,
            slots,
            final_index,
            n,
            self.env.bitmaps.clone(),
            (n > 0).then(|| self.in_flight.clone()),
        ));
        for j in 0..m {
            if ledger.uses(j) == 0 {
                ledger.dispose(j);
            }
        }

        for (i, ((promise, futures), deps)) in promises
            .into_iter()
            .zip(input_futures)
            .zip(inputs)
            .enumerate()
        {
            let env = self.env.clone();
            let ledger = ledger.clone();
            let desc = chain.filters[i].clone();
            let own = m + i;
            self.pool.spawn_fifo(move || {
                let [src, dst] = futures;
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    run_stage(&env, &desc, src, dst, origin)
                }))
                .unwrap_or_else(|_| {
                    tracing::error!(stage = i, filter = desc.kind.name(), "filter stage panicked");
                    Err(FilterFailure::Failed("filter stage panicked".into()))
                });
                for dep in deps.into_iter().flatten() {
                    if let Input::Slot(j) = dep {
                        ledger.release(j);
                    }
                }
                promise.complete(outcome);
                ledger.finish_stage(own);
            });
        }

        Ok(FilterRun { result, ledger })
    }

    /// Turn a final outcome into a result for the caller.
    ///
    /// Runtime failures degrade to a transparent color; usage errors are returned.
    pub fn resolve(outcome: FilterOutcome) -> RenderResult<FilterResult> {
        match outcome {
            Ok(r) => Ok(r),
            Err(f) if f.is_usage() => Err(f.into()),
            Err(f) => {
                tracing::warn!(error = %f, "filter chain failed, using transparent");
                Ok(FilterResult::transparent())
            }
        }
    }
}

fn build_thread_pool(threads: Option<usize>) -> RenderResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(RenderError::validation(
            "filter pipeline 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("apl-filter-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| RenderError::filter(format!("failed to build filter thread pool: {e}")))
}

#[derive(Clone, Copy, Debug)]
enum Input {
    Slot(usize),
    Missing,
}

fn transparent_future() -> FilterFuture {
    FilterFuture::ready(Ok(FilterResult::transparent()))
}

/// Map a chain index onto the results list of `len` entries.
///
/// Non-negative indices are absolute; negative indices count back from the end.
pub fn resolve_index(idx: i32, len: usize) -> Option<usize> {
    if idx >= 0 {
        let i = idx as usize;
        (i < len).then_some(i)
    } else {
        len.checked_sub(idx.unsigned_abs() as usize)
    }
}

/// Handle to a submitted chain.
pub struct FilterRun {
    result: FilterFuture,
    ledger: Arc<ChainLedger>,
}

impl FilterRun {
    /// Future of the chain's final result. Its disposal is the caller's responsibility.
    pub fn future(&self) -> &FilterFuture {
        &self.result
    }

    /// Disposal bookkeeping of the chain.
    pub fn ledger(&self) -> &Arc<ChainLedger> {
        &self.ledger
    }

    /// Final result if already available.
    pub fn peek(&self) -> Option<RenderResult<FilterResult>> {
        self.result.peek().map(FilterPipeline::resolve)
    }

    /// Block until the final result is available.
    pub fn wait(&self) -> RenderResult<FilterResult> {
        FilterPipeline::resolve(self.result.wait())
    }

    /// Block until every stage has finished, including disposal.
    pub fn settle(&self) {
        self.ledger.wait_settled();
    }
}

/// Per-chain record of result consumers and disposals.
///
/// Every result except the final one is disposed exactly once: after its last consumer has
/// finished, or as soon as it exists when nothing consumes it.
pub struct ChainLedger {
    uses: Vec<AtomicUsize>,
    slots: Mutex<Vec<Option<FilterFuture>>>,
    disposed: Vec<AtomicBool>,
    disposals: AtomicUsize,
    final_index: Option<usize>,
    remaining: Mutex<usize>,
    settled: Condvar,
    bitmaps: Arc<BitmapPool>,
    in_flight: Option<Arc<AtomicUsize>>,
}

impl ChainLedger {
    fn new(
        uses: Vec<usize>,
        slots: Vec<Option<FilterFuture>>,
        final_index: Option<usize>,
        stages: usize,
        bitmaps: Arc<BitmapPool>,
        in_flight: Option<Arc<AtomicUsize>>,
    ) -> Self {
        Self {
            disposed: uses.iter().map(|_| AtomicBool::new(false)).collect(),
            uses: uses.into_iter().map(AtomicUsize::new).collect(),
            slots: Mutex::new(slots),
            disposals: AtomicUsize::new(0),
            final_index,
            remaining: Mutex::new(stages),
            settled: Condvar::new(),
            bitmaps,
            in_flight,
        }
    }

    /// Number of results: sources plus stage outputs.
    pub fn result_count(&self) -> usize {
        self.uses.len()
    }

    /// Index of the final result, never disposed by the pipeline.
    pub fn final_index(&self) -> Option<usize> {
        self.final_index
    }

    /// Results disposed so far.
    pub fn disposal_count(&self) -> usize {
        self.disposals.load(Ordering::Acquire)
    }

    /// `true` once result `idx` was disposed.
    pub fn is_disposed(&self, idx: usize) -> bool {
        self.disposed
            .get(idx)
            .is_some_and(|d| d.load(Ordering::Acquire))
    }

    /// `true` once every stage has finished.
    pub fn is_settled(&self) -> bool {
        *self.remaining.lock() == 0
    }

    /// Block until every stage has finished.
    pub fn wait_settled(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.settled.wait(&mut remaining);
        }
    }

    fn uses(&self, idx: usize) -> usize {
        self.uses[idx].load(Ordering::Acquire)
    }

    fn release(&self, idx: usize) {
        if self.uses[idx].fetch_sub(1, Ordering::AcqRel) == 1 {
            self.dispose(idx);
        }
    }

    fn finish_stage(&self, own: usize) {
        if self.uses(own) == 0 {
            self.dispose(own);
        }
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            if let Some(c) = &self.in_flight {
                c.fetch_sub(1, Ordering::AcqRel);
            }
            self.settled.notify_all();
        }
    }

    fn dispose(&self, idx: usize) {
        if Some(idx) == self.final_index || self.disposed[idx].swap(true, Ordering::AcqRel) {
            return;
        }
        self.disposals.fetch_add(1, Ordering::AcqRel);
        let future = self.slots.lock()[idx].take();
        let Some(future) = future else {
            return;
        };
        // Drop the shared future first so the bitmap can be the last handle to its buffer.
        let value = future.peek();
        drop(future);
        if let Some(Ok(FilterResult::Bitmap(b))) = value {
            tracing::trace!(result = idx, width = b.width(), height = b.height(), "disposing intermediate");
            self.bitmaps.recycle(b);
        }
    }
}

fn run_stage(
    env: &StageEnv,
    desc: &FilterDesc,
    src: Option<FilterFuture>,
    dst: Option<FilterFuture>,
    origin: Option<PixelSize>,
) -> FilterOutcome {
    let src = src.map(|f| degrade(f.wait(), "source")).transpose()?;
    let dst = dst.map(|f| degrade(f.wait(), "destination")).transpose()?;
    compute(env, &desc.kind, src, dst, origin).map_err(|e| {
        if !e.is_usage() {
            tracing::warn!(filter = desc.kind.name(), error = %e, "filter stage failed");
        }
        FilterFailure::from(e)
    })
}

fn degrade(outcome: FilterOutcome, role: &str) -> Result<FilterResult, FilterFailure> {
    match outcome {
        Ok(r) => Ok(r),
        Err(f) if f.is_usage() => Err(f),
        Err(f) => {
            tracing::warn!(error = %f, "filter {role} failed, using transparent");
            Ok(FilterResult::transparent())
        }
    }
}

fn compute(
    env: &StageEnv,
    kind: &FilterKind,
    src: Option<FilterResult>,
    dst: Option<FilterResult>,
    origin: Option<PixelSize>,
) -> RenderResult<FilterResult> {
    let clear = |r: Option<FilterResult>| r.unwrap_or_else(FilterResult::transparent);
    match kind {
        FilterKind::Color { color } => Ok(FilterResult::Color(*color)),
        FilterKind::Gradient { gradient } => Ok(FilterResult::Gradient(Arc::new(gradient.clone()))),
        FilterKind::Unknown => {
            tracing::warn!("unknown filter type, passing source through");
            Ok(clear(src))
        }
        FilterKind::Blur { radius } => blur(env, clear(src), *radius, origin),
        FilterKind::Grayscale { amount } => {
            color_matrix(env, clear(src), grayscale_matrix(*amount), origin)
        }
        FilterKind::Saturate { amount } => {
            color_matrix(env, clear(src), saturate_matrix(*amount), origin)
        }
        FilterKind::Noise {
            kind,
            sigma,
            use_color,
        } => noise(env, clear(src), *kind, *sigma, *use_color, origin),
        FilterKind::Blend { mode } => blend(env, clear(src), clear(dst), *mode, origin),
        FilterKind::Extension { uri, name, params } => {
            let (s, d) = extension_operands(src, dst, origin, &env.bitmaps)?;
            let filter = env.extensions.get(uri, name).ok_or_else(|| {
                RenderError::filter(format!("no extension filter '{name}' registered for '{uri}'"))
            })?;
            Ok(FilterResult::Bitmap(filter.process_image(
                s.as_ref(),
                d.as_ref(),
                params,
            )?))
        }
    }
}

fn input_bitmap(
    env: &StageEnv,
    input: &FilterResult,
    origin: Option<PixelSize>,
) -> RenderResult<Bitmap> {
    match (input, origin) {
        (FilterResult::Bitmap(b), _) => Ok(b.clone()),
        (lazy, Some(size)) => lazy.materialize(size, &env.bitmaps),
        (_, None) => Err(RenderError::filter(
            "filter input has no size and the chain has no sources",
        )),
    }
}

fn blur(
    env: &StageEnv,
    src: FilterResult,
    radius: f32,
    origin: Option<PixelSize>,
) -> RenderResult<FilterResult> {
    if matches!(src, FilterResult::Color(_)) {
        return Ok(src);
    }
    let bitmap = input_bitmap(env, &src, origin)?;
    if blur_params(radius).0 == 0 {
        return Ok(FilterResult::Bitmap(bitmap));
    }
    let mut scope = ScriptScope::new(env.scripts.as_ref());
    let input = scope.allocation_from_bitmap(&bitmap)?;
    let output = scope.allocation(bitmap.size())?;
    let script = scope.script(ScriptKind::Blur)?;
    scope.backend().blur(script, radius, input, output)?;
    Ok(FilterResult::Bitmap(
        scope.backend().copy_to_bitmap(output, &env.bitmaps)?,
    ))
}

fn color_matrix(
    env: &StageEnv,
    src: FilterResult,
    matrix: [f32; 20],
    origin: Option<PixelSize>,
) -> RenderResult<FilterResult> {
    let bitmap = input_bitmap(env, &src, origin)?;
    let mut scope = ScriptScope::new(env.scripts.as_ref());
    let input = scope.allocation_from_bitmap(&bitmap)?;
    let output = scope.allocation(bitmap.size())?;
    let script = scope.script(ScriptKind::ColorMatrix)?;
    scope.backend().color_matrix(script, matrix, input, output)?;
    Ok(FilterResult::Bitmap(
        scope.backend().copy_to_bitmap(output, &env.bitmaps)?,
    ))
}

fn noise(
    env: &StageEnv,
    src: FilterResult,
    kind: NoiseKind,
    sigma: f32,
    use_color: bool,
    origin: Option<PixelSize>,
) -> RenderResult<FilterResult> {
    let bitmap = input_bitmap(env, &src, origin)?;
    let mut buf = env.bitmaps.acquire(bitmap.size());
    buf.copy_from_slice(bitmap.pixels());
    noise_in_place(&mut buf, kind, sigma, use_color);
    Ok(FilterResult::Bitmap(Bitmap::from_premul(bitmap.size(), buf)?))
}

fn blend(
    env: &StageEnv,
    src: FilterResult,
    dst: FilterResult,
    mode: BlendMode,
    origin: Option<PixelSize>,
) -> RenderResult<FilterResult> {
    let size = dst
        .size()
        .or_else(|| src.size())
        .or(origin)
        .ok_or_else(|| RenderError::filter("blend has no sized operand"))?;
    let src = src.materialize(size, &env.bitmaps)?;
    let dst = dst.materialize(size, &env.bitmaps)?;

    let mut scope = ScriptScope::new(env.scripts.as_ref());
    let a_src = scope.allocation_from_bitmap(&src)?;
    let a_dst = scope.allocation_from_bitmap(&dst)?;
    let script = scope.script(ScriptKind::Blend)?;
    scope.backend().blend(script, mode, a_src, a_dst)?;
    Ok(FilterResult::Bitmap(
        scope.backend().copy_to_bitmap(a_dst, &env.bitmaps)?,
    ))
}

/// Bitmaps handed to an extension filter.
///
/// A lazy operand takes the size of the other operand's bitmap, or the size of the chain's
/// first source when it is alone. Two lazy operands are a usage error.
pub fn extension_operands(
    src: Option<FilterResult>,
    dst: Option<FilterResult>,
    origin: Option<PixelSize>,
    pool: &BitmapPool,
) -> RenderResult<(Option<Bitmap>, Option<Bitmap>)> {
    let lone = |r: FilterResult| -> RenderResult<Bitmap> {
        match (r, origin) {
            (FilterResult::Bitmap(b), _) => Ok(b),
            (lazy, Some(size)) => lazy.materialize(size, pool),
            (_, None) => Err(RenderError::usage(
                "extension filter operand has no bitmap to take a size from",
            )),
        }
    };
    match (src, dst) {
        (Some(s), Some(d)) => match (s.as_bitmap(), d.as_bitmap()) {
            (Some(sb), Some(db)) => Ok((Some(sb.clone()), Some(db.clone()))),
            (Some(sb), None) => Ok((Some(sb.clone()), Some(d.materialize(sb.size(), pool)?))),
            (None, Some(db)) => Ok((Some(s.materialize(db.size(), pool)?), Some(db.clone()))),
            (None, None) => Err(RenderError::usage(
                "extension filter source and destination are both non-bitmap results",
            )),
        },
        (Some(s), None) => Ok((Some(lone(s)?), None)),
        (None, Some(d)) => Ok((None, Some(lone(d)?))),
        (None, None) => Ok((None, None)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/pipeline.rs"]
mod tests;
