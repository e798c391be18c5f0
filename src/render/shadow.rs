use crate::filters::kernels::{blur_params, blur_rgba8_premul};
use crate::foundation::core::{Affine, Color, PixelSize, Point, Rect, Vec2};
use crate::foundation::error::RenderResult;
use crate::foundation::math::{canvas_scale, mul_div255_u8};
use crate::render::bitmap::Bitmap;

/// A drop shadow in logical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowStyle {
    /// Blur radius. Negative disables the shadow.
    pub radius: f64,
    /// Offset of the shadow from its content.
    pub offset: Vec2,
    /// Shadow color.
    pub color: Color,
}

/// Device-space layout of one drop shadow.
///
/// The shadow content is rendered into an offscreen covering the device bounds of the content
/// plus a blur margin, trimmed to what can land on the target surface once offset. The content
/// is drawn under the live device transform shifted to the offscreen origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowPlan {
    /// Offscreen size in device pixels.
    pub size: PixelSize,
    /// Margin around the content, in device pixels.
    pub pad: u32,
    /// Integer blur radius in device pixels.
    pub blur_radius: u32,
    /// Gaussian sigma matching `blur_radius`.
    pub sigma: f32,
    /// Transform the shadow content is drawn with into the offscreen.
    pub content_transform: Affine,
    /// Where the tinted offscreen lands, in device pixels.
    pub dst: Rect,
}

/// Lay out a shadow of `radius` logical units cast by content covering `content` device pixels,
/// drawn under `transform` onto a `width` x `height` surface.
///
/// `None` for a negative radius, where the shadow is disabled, and for a shadow that misses
/// the surface entirely. Nothing is allocated in either case.
pub fn plan_shadow(
    radius: f64,
    offset: Vec2,
    transform: Affine,
    content: Rect,
    width: u32,
    height: u32,
) -> Option<ShadowPlan> {
    if radius < 0.0 || !radius.is_finite() {
        return None;
    }
    let scale = canvas_scale(transform);
    let (blur_radius, sigma) = blur_params((radius * scale) as f32);
    let pad = blur_radius;
    let pad_f = f64::from(pad);
    let shift = transform * Point::new(offset.x, offset.y) - transform * Point::ORIGIN;

    let padded = content.inflate(pad_f, pad_f);
    let surface = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
    let visible = nonempty((padded + shift).intersect(surface))?;
    let src = nonempty((visible - shift).inflate(pad_f, pad_f).intersect(padded))?.expand();
    if !(src.x0.is_finite() && src.y0.is_finite() && src.x1.is_finite() && src.y1.is_finite()) {
        return None;
    }
    let size = PixelSize::new(src.width() as u32, src.height() as u32);
    if size.is_empty() {
        return None;
    }
    Some(ShadowPlan {
        size,
        pad,
        blur_radius,
        sigma,
        content_transform: Affine::translate((-src.x0, -src.y0)) * transform,
        dst: src + shift,
    })
}

/// Device-space area covered by content at `content` together with the shadow it casts.
pub fn shadow_footprint(radius: f64, offset: Vec2, transform: Affine, content: Rect) -> Rect {
    if radius < 0.0 || !radius.is_finite() {
        return content;
    }
    let (pad, _) = blur_params((radius * canvas_scale(transform)) as f32);
    let pad = f64::from(pad);
    let shift = transform * Point::new(offset.x, offset.y) - transform * Point::ORIGIN;
    content.union(content.inflate(pad, pad) + shift)
}

fn nonempty(r: Rect) -> Option<Rect> {
    (r.width() > 0.0 && r.height() > 0.0).then_some(r)
}

/// Turn rendered shadow content into the tinted shadow raster.
///
/// Only the coverage of `content` is used: it is blurred, then every pixel takes the color of
/// `color` with `alpha` applied, scaled by the blurred coverage.
pub fn tint_shadow(
    content: &Bitmap,
    plan: &ShadowPlan,
    color: Color,
    alpha: u8,
) -> RenderResult<Bitmap> {
    let mask = content.alpha_mask()?;
    let blurred = if plan.blur_radius == 0 {
        mask.pixels().to_vec()
    } else {
        blur_rgba8_premul(
            mask.pixels(),
            mask.width(),
            mask.height(),
            plan.blur_radius,
            plan.sigma,
        )?
    };
    drop(mask);

    let tint = color.modulate(alpha).to_premul();
    let mut out = blurred;
    for px in out.chunks_exact_mut(4) {
        let coverage = u16::from(px[3]);
        for (d, t) in px.iter_mut().zip(tint) {
            *d = mul_div255_u8(u16::from(t), coverage);
        }
    }
    Bitmap::from_premul(content.size(), out)
}

#[cfg(test)]
#[path = "../../tests/unit/render/shadow.rs"]
mod tests;
