use crate::foundation::core::{Affine, BezPath, PixelSize, Point, Rect};
use crate::foundation::error::{RenderError, RenderResult};
use crate::paint::resolve::{ResolvedPaint, StrokeStyle};
use crate::render::bitmap::Bitmap;
use crate::render::text::ShapedText;
use crate::scene::model::FillRule;

/// Canvas-like 2D drawing target handed to the renderer by the view host.
///
/// Coordinates passed to drawing calls are in the user space established by [`Surface::concat`].
/// `save`/`restore` bracket both the transform and the clip.
pub trait Surface {
    /// Width in device pixels.
    fn width(&self) -> u32;
    /// Height in device pixels.
    fn height(&self) -> u32;

    /// Push the current transform and clip.
    fn save(&mut self);
    /// Pop to the last saved transform and clip. Unbalanced calls are ignored.
    fn restore(&mut self);

    /// Current user-to-device transform.
    fn transform(&self) -> Affine;
    /// Post-multiply the current transform.
    fn concat(&mut self, m: Affine);

    /// Intersect the clip with `path`.
    fn clip_path(&mut self, path: &BezPath, rule: FillRule);
    /// Fill `path` with `paint`.
    fn fill_path(&mut self, path: &BezPath, paint: &ResolvedPaint, rule: FillRule);
    /// Stroke `path` with `paint`.
    fn stroke_path(&mut self, path: &BezPath, paint: &ResolvedPaint, style: &StrokeStyle);
    /// Draw the `src` region of `bitmap` (whole bitmap when `None`) scaled into `dst`.
    fn draw_bitmap(&mut self, bitmap: &Bitmap, src: Option<Rect>, dst: Rect, alpha: u8);
    /// Draw laid-out glyphs with their block's top-left at `origin`.
    fn draw_text(
        &mut self,
        origin: Point,
        text: &ShapedText,
        paint: &ResolvedPaint,
        stroke: Option<&StrokeStyle>,
    );
}

/// An offscreen surface whose pixels can be read back.
pub trait RasterSurface: Surface {
    /// Snapshot of the current pixels as premultiplied RGBA8.
    fn to_bitmap(&mut self) -> RenderResult<Bitmap>;
    /// Upcast for passing to drawing code.
    fn as_surface_mut(&mut self) -> &mut dyn Surface;
}

/// Creates offscreen rasters.
pub trait SurfaceProvider {
    /// Allocate a transparent offscreen of `size`.
    fn create_surface(&self, size: PixelSize) -> RenderResult<Box<dyn RasterSurface>>;
}

/// Reject sizes that are empty or larger than `max_px` pixels.
pub fn check_offscreen_size(size: PixelSize, max_px: u64) -> RenderResult<()> {
    if size.is_empty() {
        return Err(RenderError::allocation(format!(
            "offscreen {}x{} is empty",
            size.width, size.height
        )));
    }
    if size.area() > max_px {
        return Err(RenderError::allocation(format!(
            "offscreen {}x{} exceeds the {max_px} pixel limit",
            size.width, size.height
        )));
    }
    Ok(())
}

/// Pixel rectangle covering the device-space bounds of `rect` under `transform`,
/// clamped to a `width` x `height` target. `None` when nothing remains.
pub(crate) fn device_bounds(
    rect: Rect,
    transform: Affine,
    width: u32,
    height: u32,
) -> Option<(i64, i64, PixelSize)> {
    let b = transform.transform_rect_bbox(rect);
    if !(b.x0.is_finite() && b.y0.is_finite() && b.x1.is_finite() && b.y1.is_finite()) {
        return None;
    }
    let x0 = (b.x0.floor() as i64).max(0);
    let y0 = (b.y0.floor() as i64).max(0);
    let x1 = (b.x1.ceil() as i64).min(i64::from(width));
    let y1 = (b.y1.ceil() as i64).min(i64::from(height));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, PixelSize::new((x1 - x0) as u32, (y1 - y0) as u32)))
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
