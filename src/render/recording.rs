use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::foundation::core::{Affine, BezPath, PixelSize, Point, Rect};
use crate::foundation::error::RenderResult;
use crate::paint::resolve::{ResolvedPaint, StrokeStyle};
use crate::render::bitmap::Bitmap;
use crate::render::surface::{RasterSurface, Surface, SurfaceProvider, check_offscreen_size};
use crate::render::text::ShapedText;
use crate::scene::model::FillRule;

/// One recorded drawing call, with the device transform in effect when it was issued.
#[derive(Clone, Debug)]
pub enum DrawOp {
    /// `save()`.
    Save,
    /// `restore()`.
    Restore,
    /// `clip_path()`.
    Clip {
        /// Clip geometry in user space.
        path: BezPath,
        /// Device transform.
        transform: Affine,
        /// Winding rule.
        rule: FillRule,
    },
    /// `fill_path()`.
    Fill {
        /// Geometry in user space.
        path: BezPath,
        /// Device transform.
        transform: Affine,
        /// Paint.
        paint: ResolvedPaint,
        /// Winding rule.
        rule: FillRule,
    },
    /// `stroke_path()`.
    Stroke {
        /// Geometry in user space.
        path: BezPath,
        /// Device transform.
        transform: Affine,
        /// Paint.
        paint: ResolvedPaint,
        /// Decoration.
        style: StrokeStyle,
    },
    /// `draw_bitmap()`.
    Bitmap {
        /// Drawn raster.
        bitmap: Bitmap,
        /// Source region.
        src: Option<Rect>,
        /// Destination in user space.
        dst: Rect,
        /// Device transform.
        transform: Affine,
        /// Alpha in `0..=255`.
        alpha: u8,
    },
    /// `draw_text()`.
    Text {
        /// Block origin in user space.
        origin: Point,
        /// Laid-out glyphs.
        text: ShapedText,
        /// Device transform.
        transform: Affine,
        /// Paint.
        paint: ResolvedPaint,
        /// Stroke decoration for stroked text.
        stroke: Option<StrokeStyle>,
    },
}

/// Surface that records a display list instead of rasterizing.
///
/// [`RasterSurface::to_bitmap`] yields a transparent raster of the surface size.
#[derive(Debug)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    transform: Affine,
    stack: Vec<Affine>,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    /// Empty recording of `width` x `height` device pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            transform: Affine::IDENTITY,
            stack: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Recorded calls in issue order.
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Drain the recorded calls.
    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    /// Recorded fills and strokes, in order.
    pub fn paints(&self) -> impl Iterator<Item = &ResolvedPaint> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Fill { paint, .. }
            | DrawOp::Stroke { paint, .. }
            | DrawOp::Text { paint, .. } => Some(paint),
            _ => None,
        })
    }

    /// Depth of the save stack.
    pub fn save_depth(&self) -> usize {
        self.stack.len()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
        self.ops.push(DrawOp::Save);
    }

    fn restore(&mut self) {
        if let Some(t) = self.stack.pop() {
            self.transform = t;
            self.ops.push(DrawOp::Restore);
        }
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn concat(&mut self, m: Affine) {
        self.transform *= m;
    }

    fn clip_path(&mut self, path: &BezPath, rule: FillRule) {
        self.ops.push(DrawOp::Clip {
            path: path.clone(),
            transform: self.transform,
            rule,
        });
    }

    fn fill_path(&mut self, path: &BezPath, paint: &ResolvedPaint, rule: FillRule) {
        self.ops.push(DrawOp::Fill {
            path: path.clone(),
            transform: self.transform,
            paint: paint.clone(),
            rule,
        });
    }

    fn stroke_path(&mut self, path: &BezPath, paint: &ResolvedPaint, style: &StrokeStyle) {
        self.ops.push(DrawOp::Stroke {
            path: path.clone(),
            transform: self.transform,
            paint: paint.clone(),
            style: style.clone(),
        });
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, src: Option<Rect>, dst: Rect, alpha: u8) {
        self.ops.push(DrawOp::Bitmap {
            bitmap: bitmap.clone(),
            src,
            dst,
            transform: self.transform,
            alpha,
        });
    }

    fn draw_text(
        &mut self,
        origin: Point,
        text: &ShapedText,
        paint: &ResolvedPaint,
        stroke: Option<&StrokeStyle>,
    ) {
        self.ops.push(DrawOp::Text {
            origin,
            text: text.clone(),
            transform: self.transform,
            paint: paint.clone(),
            stroke: stroke.cloned(),
        });
    }
}

impl RasterSurface for RecordingSurface {
    fn to_bitmap(&mut self) -> RenderResult<Bitmap> {
        Bitmap::transparent(PixelSize::new(self.width, self.height))
    }

    fn as_surface_mut(&mut self) -> &mut dyn Surface {
        self
    }
}

/// Provider of [`RecordingSurface`] offscreens that counts allocations.
#[derive(Debug)]
pub struct RecordingProvider {
    max_px: u64,
    allocations: AtomicUsize,
    sizes: Mutex<Vec<PixelSize>>,
}

impl RecordingProvider {
    /// Provider refusing offscreens larger than `max_px` pixels.
    pub fn new(max_px: u64) -> Self {
        Self {
            max_px,
            allocations: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
        }
    }

    /// Number of successful allocations.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Acquire)
    }

    /// Sizes of every successful allocation, in order.
    pub fn sizes(&self) -> Vec<PixelSize> {
        self.sizes.lock().clone()
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new(u64::from(u16::MAX) * u64::from(u16::MAX))
    }
}

impl SurfaceProvider for RecordingProvider {
    fn create_surface(&self, size: PixelSize) -> RenderResult<Box<dyn RasterSurface>> {
        check_offscreen_size(size, self.max_px)?;
        self.allocations.fetch_add(1, Ordering::AcqRel);
        self.sizes.lock().push(size);
        Ok(Box::new(RecordingSurface::new(size.width, size.height)))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/recording.rs"]
mod tests;
