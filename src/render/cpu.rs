use std::sync::Arc;

use crate::foundation::core::{Affine, BezPath, PixelSize, Point, Rect};
use crate::foundation::error::{RenderError, RenderResult};
use crate::foundation::math::canvas_scale;
use crate::paint::resolve::{ResolvedPaint, StrokeStyle};
use crate::paint::shader::{Shader, rasterize_shader};
use crate::render::bitmap::Bitmap;
use crate::render::surface::{
    RasterSurface, Surface, SurfaceProvider, check_offscreen_size, device_bounds,
};
use crate::render::text::ShapedText;
use crate::scene::model::FillRule;

/// Device-pixel flattening tolerance for stroke expansion.
const STROKE_TOLERANCE_PX: f64 = 0.1;

#[derive(Clone, Copy, Debug)]
struct SavedState {
    transform: Affine,
    clip_depth: usize,
}

/// Surface rasterizing through `vello_cpu`.
pub struct CpuSurface {
    ctx: vello_cpu::RenderContext,
    width: u16,
    height: u16,
    transform: Affine,
    clip_depth: usize,
    stack: Vec<SavedState>,
}

impl CpuSurface {
    /// Transparent surface of `size` device pixels.
    pub fn new(size: PixelSize) -> RenderResult<Self> {
        if size.is_empty() {
            return Err(RenderError::allocation("cpu surface size is empty"));
        }
        let width: u16 = size
            .width
            .try_into()
            .map_err(|_| RenderError::allocation("cpu surface width exceeds u16"))?;
        let height: u16 = size
            .height
            .try_into()
            .map_err(|_| RenderError::allocation("cpu surface height exceeds u16"))?;
        Ok(Self {
            ctx: vello_cpu::RenderContext::new(width, height),
            width,
            height,
            transform: Affine::IDENTITY,
            clip_depth: 0,
            stack: Vec::new(),
        })
    }

    /// Set up the context paint for `paint` over `user_bounds` drawn under `transform`.
    ///
    /// Non-solid shaders are evaluated on the CPU over the covered device pixels and bound as
    /// an image paint. Returns `false` when nothing would be visible.
    fn apply_paint(&mut self, paint: &ResolvedPaint, user_bounds: Rect, transform: Affine) -> bool {
        if paint.alpha == 0 {
            return false;
        }
        if let Shader::Solid(c) = &paint.shader {
            let c = c.modulate(paint.alpha);
            if c.is_transparent() {
                return false;
            }
            self.ctx
                .set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a));
            self.ctx
                .set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            return true;
        }

        let det = transform.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return false;
        }
        let Some((x0, y0, size)) = device_bounds(
            user_bounds,
            transform,
            u32::from(self.width),
            u32::from(self.height),
        ) else {
            return false;
        };
        let pixel_to_user = transform.inverse() * Affine::translate((x0 as f64, y0 as f64));
        let raster = match rasterize_shader(&paint.shader, paint.alpha, size, pixel_to_user) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "shader raster unavailable, skipping draw");
                return false;
            }
        };
        match image_paint(&raster) {
            Ok(img) => {
                self.ctx.set_paint(img);
                self.ctx.set_paint_transform(affine_to_cpu(pixel_to_user));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "shader image unavailable, skipping draw");
                false
            }
        }
    }
}

impl Surface for CpuSurface {
    fn width(&self) -> u32 {
        u32::from(self.width)
    }

    fn height(&self) -> u32 {
        u32::from(self.height)
    }

    fn save(&mut self) {
        self.stack.push(SavedState {
            transform: self.transform,
            clip_depth: self.clip_depth,
        });
    }

    fn restore(&mut self) {
        let Some(saved) = self.stack.pop() else {
            return;
        };
        while self.clip_depth > saved.clip_depth {
            self.ctx.pop_layer();
            self.clip_depth -= 1;
        }
        self.transform = saved.transform;
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn concat(&mut self, m: Affine) {
        self.transform *= m;
    }

    fn clip_path(&mut self, path: &BezPath, rule: FillRule) {
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_fill_rule(fill_to_cpu(rule));
        self.ctx.push_clip_layer(&bezpath_to_cpu(path));
        self.clip_depth += 1;
    }

    fn fill_path(&mut self, path: &BezPath, paint: &ResolvedPaint, rule: FillRule) {
        let Some(bounds) = crate::geometry::path::path_bounds(path) else {
            return;
        };
        let transform = self.transform;
        if !self.apply_paint(paint, bounds, transform) {
            return;
        }
        self.ctx.set_transform(affine_to_cpu(transform));
        self.ctx.set_fill_rule(fill_to_cpu(rule));
        self.ctx.fill_path(&bezpath_to_cpu(path));
    }

    fn stroke_path(&mut self, path: &BezPath, paint: &ResolvedPaint, style: &StrokeStyle) {
        if style.width <= 0.0 {
            return;
        }
        let tolerance = STROKE_TOLERANCE_PX / canvas_scale(self.transform);
        let outline = kurbo::stroke(
            path.iter(),
            &style.to_kurbo(),
            &kurbo::StrokeOpts::default(),
            tolerance,
        );
        self.fill_path(&outline, paint, FillRule::NonZero);
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, src: Option<Rect>, dst: Rect, alpha: u8) {
        if alpha == 0 || dst.width() <= 0.0 || dst.height() <= 0.0 {
            return;
        }
        let src = src.unwrap_or_else(|| {
            Rect::new(0.0, 0.0, f64::from(bitmap.width()), f64::from(bitmap.height()))
        });
        if src.width() <= 0.0 || src.height() <= 0.0 {
            return;
        }
        let img = match image_paint(bitmap) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(error = %e, "bitmap unavailable, skipping draw");
                return;
            }
        };
        let image_to_user = Affine::translate((dst.x0, dst.y0))
            * Affine::scale_non_uniform(dst.width() / src.width(), dst.height() / src.height())
            * Affine::translate((-src.x0, -src.y0));

        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_paint(img);
        self.ctx.set_paint_transform(affine_to_cpu(image_to_user));
        if alpha < 255 {
            self.ctx.push_opacity_layer(f32::from(alpha) / 255.0);
        }
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            dst.x0, dst.y0, dst.x1, dst.y1,
        ));
        if alpha < 255 {
            self.ctx.pop_layer();
        }
    }

    fn draw_text(
        &mut self,
        origin: Point,
        text: &ShapedText,
        paint: &ResolvedPaint,
        stroke: Option<&StrokeStyle>,
    ) {
        let Some(font_bytes) = text.font.as_ref() else {
            tracing::debug!("metric-only text layout has no outlines to draw");
            return;
        };
        let transform = self.transform * Affine::translate(origin.to_vec2());
        let bounds = Rect::new(
            0.0,
            0.0,
            f64::from(text.width).max(1.0),
            f64::from(text.height).max(1.0),
        );
        if !self.apply_paint(paint, bounds, transform) {
            return;
        }
        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(font_bytes.as_ref().clone()),
            0,
        );
        let glyphs = text.glyphs.iter().map(|g| vello_cpu::Glyph {
            id: g.id,
            x: g.x,
            y: g.y,
        });
        self.ctx.set_transform(affine_to_cpu(transform));
        match stroke {
            Some(style) => {
                self.ctx
                    .set_stroke(vello_cpu::kurbo::Stroke::new(style.width));
                self.ctx
                    .glyph_run(&font)
                    .font_size(text.font_size)
                    .stroke_glyphs(glyphs);
            }
            None => self
                .ctx
                .glyph_run(&font)
                .font_size(text.font_size)
                .fill_glyphs(glyphs),
        }
    }
}

impl RasterSurface for CpuSurface {
    fn to_bitmap(&mut self) -> RenderResult<Bitmap> {
        let mut pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);
        Bitmap::from_premul(
            PixelSize::new(u32::from(self.width), u32::from(self.height)),
            pixmap.data_as_u8_slice().to_vec(),
        )
    }

    fn as_surface_mut(&mut self) -> &mut dyn Surface {
        self
    }
}

/// Provider of [`CpuSurface`] offscreens.
#[derive(Clone, Copy, Debug)]
pub struct CpuSurfaceProvider {
    max_px: u64,
}

impl CpuSurfaceProvider {
    /// Provider refusing offscreens larger than `max_px` pixels.
    pub fn new(max_px: u64) -> Self {
        Self { max_px }
    }
}

impl SurfaceProvider for CpuSurfaceProvider {
    fn create_surface(&self, size: PixelSize) -> RenderResult<Box<dyn RasterSurface>> {
        check_offscreen_size(size, self.max_px)?;
        Ok(Box::new(CpuSurface::new(size)?))
    }
}

fn fill_to_cpu(rule: FillRule) -> vello_cpu::peniko::Fill {
    match rule {
        FillRule::EvenOdd => vello_cpu::peniko::Fill::EvenOdd,
        FillRule::NonZero => vello_cpu::peniko::Fill::NonZero,
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let pt = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn pixmap_from_bitmap(bitmap: &Bitmap) -> RenderResult<vello_cpu::Pixmap> {
    let w: u16 = bitmap
        .width()
        .try_into()
        .map_err(|_| RenderError::allocation("pixmap width exceeds u16"))?;
    let h: u16 = bitmap
        .height()
        .try_into()
        .map_err(|_| RenderError::allocation("pixmap height exceeds u16"))?;
    let pixels = bitmap
        .pixels()
        .chunks_exact(4)
        .map(|px| vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
        .collect::<Vec<_>>();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn image_paint(bitmap: &Bitmap) -> RenderResult<vello_cpu::Image> {
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap_from_bitmap(bitmap)?)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
