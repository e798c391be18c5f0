//! Accelerated-script collaborator used by the heavier filter stages.
//!
//! Handles are finite resources: every allocation and script created for one filter stage is
//! destroyed before the stage returns. [`ScriptScope`] enforces that on every exit path.

use std::collections::HashMap;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::filters::kernels::{blend_in_place, blur_params, blur_rgba8_premul, color_matrix_rgba8_premul};
use crate::filters::model::BlendMode;
use crate::foundation::core::PixelSize;
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::bitmap::Bitmap;
use crate::render::bitmap_pool::BitmapPool;

/// Handle to a pixel allocation owned by a [`ScriptBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AllocationId(pub u64);

/// Handle to an intrinsic script owned by a [`ScriptBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScriptId(pub u64);

/// Intrinsic script types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Gaussian blur.
    Blur,
    /// Two-input blend.
    Blend,
    /// 4x5 color matrix.
    ColorMatrix,
}

/// Provider of pixel allocations and intrinsic scripts.
pub trait ScriptBackend: Send + Sync {
    /// Allocation holding a copy of `bitmap`.
    fn create_allocation_from_bitmap(&self, bitmap: &Bitmap) -> RenderResult<AllocationId>;
    /// Transparent allocation of `size`.
    fn create_allocation(&self, size: PixelSize) -> RenderResult<AllocationId>;
    /// Intrinsic script of `kind`.
    fn create_script(&self, kind: ScriptKind) -> RenderResult<ScriptId>;

    /// Blur `input` into `output` with a radius in pixels.
    fn blur(
        &self,
        script: ScriptId,
        radius: f32,
        input: AllocationId,
        output: AllocationId,
    ) -> RenderResult<()>;
    /// Apply a row-major 4x5 color matrix from `input` into `output`.
    fn color_matrix(
        &self,
        script: ScriptId,
        matrix: [f32; 20],
        input: AllocationId,
        output: AllocationId,
    ) -> RenderResult<()>;
    /// Composite `src` over `dst` in place.
    fn blend(
        &self,
        script: ScriptId,
        mode: BlendMode,
        src: AllocationId,
        dst: AllocationId,
    ) -> RenderResult<()>;

    /// Copy an allocation out into a new bitmap.
    fn copy_to_bitmap(&self, alloc: AllocationId, pool: &BitmapPool) -> RenderResult<Bitmap>;

    /// Release an allocation. Unknown handles are ignored.
    fn destroy_allocation(&self, alloc: AllocationId);
    /// Release a script. Unknown handles are ignored.
    fn destroy_script(&self, script: ScriptId);
}

/// Destroys every handle it created when dropped.
pub struct ScriptScope<'a> {
    backend: &'a dyn ScriptBackend,
    allocations: SmallVec<[AllocationId; 4]>,
    scripts: SmallVec<[ScriptId; 2]>,
}

impl<'a> ScriptScope<'a> {
    /// Empty scope over `backend`.
    pub fn new(backend: &'a dyn ScriptBackend) -> Self {
        Self {
            backend,
            allocations: SmallVec::new(),
            scripts: SmallVec::new(),
        }
    }

    /// The backend operations run against.
    pub fn backend(&self) -> &'a dyn ScriptBackend {
        self.backend
    }

    /// Scoped [`ScriptBackend::create_allocation_from_bitmap`].
    pub fn allocation_from_bitmap(&mut self, bitmap: &Bitmap) -> RenderResult<AllocationId> {
        let id = self.backend.create_allocation_from_bitmap(bitmap)?;
        self.allocations.push(id);
        Ok(id)
    }

    /// Scoped [`ScriptBackend::create_allocation`].
    pub fn allocation(&mut self, size: PixelSize) -> RenderResult<AllocationId> {
        let id = self.backend.create_allocation(size)?;
        self.allocations.push(id);
        Ok(id)
    }

    /// Scoped [`ScriptBackend::create_script`].
    pub fn script(&mut self, kind: ScriptKind) -> RenderResult<ScriptId> {
        let id = self.backend.create_script(kind)?;
        self.scripts.push(id);
        Ok(id)
    }
}

impl Drop for ScriptScope<'_> {
    fn drop(&mut self) {
        for s in self.scripts.drain(..) {
            self.backend.destroy_script(s);
        }
        for a in self.allocations.drain(..) {
            self.backend.destroy_allocation(a);
        }
    }
}

/// Handle counters of a [`CpuScripts`] backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScriptStats {
    /// Allocations not yet destroyed.
    pub live_allocations: usize,
    /// Scripts not yet destroyed.
    pub live_scripts: usize,
    /// Allocations ever created.
    pub created_allocations: usize,
    /// Scripts ever created.
    pub created_scripts: usize,
}

struct Allocation {
    size: PixelSize,
    pixels: Vec<u8>,
}

#[derive(Default)]
struct CpuState {
    next_id: u64,
    allocations: HashMap<u64, Allocation>,
    scripts: HashMap<u64, ScriptKind>,
    created_allocations: usize,
    created_scripts: usize,
}

impl CpuState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn pixels(&self, id: AllocationId) -> RenderResult<(PixelSize, Vec<u8>)> {
        self.allocations
            .get(&id.0)
            .map(|a| (a.size, a.pixels.clone()))
            .ok_or_else(|| RenderError::filter(format!("unknown allocation {}", id.0)))
    }

    fn store(&mut self, id: AllocationId, size: PixelSize, pixels: Vec<u8>) -> RenderResult<()> {
        let a = self
            .allocations
            .get_mut(&id.0)
            .ok_or_else(|| RenderError::filter(format!("unknown allocation {}", id.0)))?;
        if a.size != size {
            return Err(RenderError::filter(format!(
                "allocation {} is {}x{}, result is {}x{}",
                id.0, a.size.width, a.size.height, size.width, size.height
            )));
        }
        a.pixels = pixels;
        Ok(())
    }

    fn expect_script(&self, id: ScriptId, kind: ScriptKind) -> RenderResult<()> {
        match self.scripts.get(&id.0) {
            Some(k) if *k == kind => Ok(()),
            Some(k) => Err(RenderError::filter(format!(
                "script {} is {k:?}, expected {kind:?}",
                id.0
            ))),
            None => Err(RenderError::filter(format!("unknown script {}", id.0))),
        }
    }
}

/// [`ScriptBackend`] running the intrinsics on the CPU.
///
/// Keeps live-handle counters so callers can verify that nothing leaks. Pixel work runs outside
/// the state lock.
#[derive(Default)]
pub struct CpuScripts {
    state: Mutex<CpuState>,
    fail_on: Option<ScriptKind>,
}

impl CpuScripts {
    /// Backend with no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every run of `kind` fail after its handles were created.
    pub fn failing_on(mut self, kind: ScriptKind) -> Self {
        self.fail_on = Some(kind);
        self
    }

    /// Current handle counters.
    pub fn stats(&self) -> ScriptStats {
        let st = self.state.lock();
        ScriptStats {
            live_allocations: st.allocations.len(),
            live_scripts: st.scripts.len(),
            created_allocations: st.created_allocations,
            created_scripts: st.created_scripts,
        }
    }

    fn check_failure(&self, kind: ScriptKind) -> RenderResult<()> {
        if self.fail_on == Some(kind) {
            return Err(RenderError::filter(format!("{kind:?} script failed")));
        }
        Ok(())
    }

    fn insert_allocation(&self, size: PixelSize, pixels: Vec<u8>) -> AllocationId {
        let mut st = self.state.lock();
        let id = st.next();
        st.allocations.insert(id, Allocation { size, pixels });
        st.created_allocations += 1;
        AllocationId(id)
    }
}

impl ScriptBackend for CpuScripts {
    fn create_allocation_from_bitmap(&self, bitmap: &Bitmap) -> RenderResult<AllocationId> {
        Ok(self.insert_allocation(bitmap.size(), bitmap.pixels().to_vec()))
    }

    fn create_allocation(&self, size: PixelSize) -> RenderResult<AllocationId> {
        if size.is_empty() {
            return Err(RenderError::allocation("script allocation size is empty"));
        }
        Ok(self.insert_allocation(size, vec![0u8; size.byte_len()]))
    }

    fn create_script(&self, kind: ScriptKind) -> RenderResult<ScriptId> {
        let mut st = self.state.lock();
        let id = st.next();
        st.scripts.insert(id, kind);
        st.created_scripts += 1;
        Ok(ScriptId(id))
    }

    fn blur(
        &self,
        script: ScriptId,
        radius: f32,
        input: AllocationId,
        output: AllocationId,
    ) -> RenderResult<()> {
        let (size, px) = {
            let st = self.state.lock();
            st.expect_script(script, ScriptKind::Blur)?;
            st.pixels(input)?
        };
        self.check_failure(ScriptKind::Blur)?;
        let (r, sigma) = blur_params(radius);
        let out = blur_rgba8_premul(&px, size.width, size.height, r, sigma)?;
        self.state.lock().store(output, size, out)
    }

    fn color_matrix(
        &self,
        script: ScriptId,
        matrix: [f32; 20],
        input: AllocationId,
        output: AllocationId,
    ) -> RenderResult<()> {
        let (size, px) = {
            let st = self.state.lock();
            st.expect_script(script, ScriptKind::ColorMatrix)?;
            st.pixels(input)?
        };
        self.check_failure(ScriptKind::ColorMatrix)?;
        let mut out = vec![0u8; px.len()];
        color_matrix_rgba8_premul(&px, &mut out, matrix)?;
        self.state.lock().store(output, size, out)
    }

    fn blend(
        &self,
        script: ScriptId,
        mode: BlendMode,
        src: AllocationId,
        dst: AllocationId,
    ) -> RenderResult<()> {
        let (src_px, (size, mut dst_px)) = {
            let st = self.state.lock();
            st.expect_script(script, ScriptKind::Blend)?;
            (st.pixels(src)?.1, st.pixels(dst)?)
        };
        self.check_failure(ScriptKind::Blend)?;
        blend_in_place(&mut dst_px, &src_px, mode)?;
        self.state.lock().store(dst, size, dst_px)
    }

    fn copy_to_bitmap(&self, alloc: AllocationId, pool: &BitmapPool) -> RenderResult<Bitmap> {
        let st = self.state.lock();
        let a = st
            .allocations
            .get(&alloc.0)
            .ok_or_else(|| RenderError::filter(format!("unknown allocation {}", alloc.0)))?;
        let mut buf = pool.acquire(a.size);
        buf.copy_from_slice(&a.pixels);
        Bitmap::from_premul(a.size, buf)
    }

    fn destroy_allocation(&self, alloc: AllocationId) {
        self.state.lock().allocations.remove(&alloc.0);
    }

    fn destroy_script(&self, script: ScriptId) {
        self.state.lock().scripts.remove(&script.0);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/script.rs"]
mod tests;
