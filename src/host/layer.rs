use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::filters::coordinator::RedrawTarget;
use crate::foundation::error::RenderResult;
use crate::render::scene_renderer::{LayerContext, SceneRenderer};
use crate::render::surface::Surface;
use crate::scene::model::Scene;

/// One visible layer: the scene the upstream engine produced for it and its redraw state.
///
/// The scene is replaced wholesale on re-layout and read-only while drawing. Asynchronous
/// filter completions reach the layer through a weak [`RedrawTarget`] handle, so a layer
/// that has been dropped simply ignores them.
pub struct Layer {
    scene: RwLock<Arc<Scene>>,
    needs_redraw: AtomicBool,
    redraw_requests: AtomicU64,
}

impl Layer {
    /// Layer showing `scene`, initially marked for drawing.
    pub fn new(scene: Scene) -> Arc<Self> {
        Arc::new(Self {
            scene: RwLock::new(Arc::new(scene)),
            needs_redraw: AtomicBool::new(true),
            redraw_requests: AtomicU64::new(0),
        })
    }

    /// Current scene.
    pub fn scene(&self) -> Arc<Scene> {
        self.scene.read().clone()
    }

    /// Swap in a re-laid-out scene and schedule a redraw.
    pub fn replace_scene(&self, scene: Scene) {
        *self.scene.write() = Arc::new(scene);
        self.needs_redraw.store(true, Ordering::Release);
    }

    /// Mark the layer for redrawing.
    pub fn force_update(&self) {
        self.redraw_requests.fetch_add(1, Ordering::AcqRel);
        self.needs_redraw.store(true, Ordering::Release);
    }

    /// `true` when a redraw is scheduled.
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw.load(Ordering::Acquire)
    }

    /// Clear the redraw flag, returning whether it was set.
    pub fn take_redraw(&self) -> bool {
        self.needs_redraw.swap(false, Ordering::AcqRel)
    }

    /// Redraws requested through [`Layer::force_update`] since creation.
    pub fn redraw_requests(&self) -> u64 {
        self.redraw_requests.load(Ordering::Acquire)
    }

    /// Draw the layer's scene onto `surface`, clearing the redraw flag first.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn draw(
        self: &Arc<Self>,
        renderer: &SceneRenderer<'_>,
        surface: &mut dyn Surface,
    ) -> RenderResult<()> {
        self.take_redraw();
        let scene = self.scene();
        let target: Arc<dyn RedrawTarget> = self.clone();
        let layer = LayerContext::new(&scene.resources).with_redraw(Arc::downgrade(&target));
        renderer.draw_node(&layer, &scene.root, 1.0, surface)
    }
}

impl RedrawTarget for Layer {
    fn request_redraw(&self) {
        tracing::trace!("layer redraw requested");
        self.force_update();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/layer.rs"]
mod tests;
