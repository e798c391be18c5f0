use std::sync::Arc;

use crate::foundation::core::{Affine, Color, PixelSize, Point};
use crate::foundation::error::RenderResult;
use crate::foundation::math::mul_div255_u8;
use crate::render::bitmap::Bitmap;
use crate::scene::model::GradientStop;

/// How a shader extends past its defined range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TileMode {
    /// Repeat the edge value.
    #[default]
    Clamp,
    /// Alternate forward and reversed copies.
    Mirror,
    /// Repeat forward copies.
    Repeat,
}

impl TileMode {
    /// Fold a ramp parameter into `0..=1`.
    pub fn apply(self, t: f64) -> f64 {
        if !t.is_finite() {
            return 0.0;
        }
        match self {
            Self::Clamp => t.clamp(0.0, 1.0),
            Self::Repeat => t.rem_euclid(1.0),
            Self::Mirror => {
                let m = t.rem_euclid(2.0);
                if m > 1.0 { 2.0 - m } else { m }
            }
        }
    }
}

/// Concrete shader, in the user space of the draw call it is used with.
#[derive(Clone, Debug)]
pub enum Shader {
    /// Flat color.
    Solid(Color),
    /// Linear ramp from `start` to `end`.
    Linear {
        /// Ramp start.
        start: Point,
        /// Ramp end.
        end: Point,
        /// Color stops.
        stops: Arc<[GradientStop]>,
        /// Extension past the ramp.
        tile: TileMode,
        /// Shader-to-user matrix.
        transform: Affine,
    },
    /// Radial ramp from `center` out to `radius`.
    Radial {
        /// Circle center.
        center: Point,
        /// Circle radius.
        radius: f64,
        /// Color stops.
        stops: Arc<[GradientStop]>,
        /// Extension past the ramp.
        tile: TileMode,
        /// Shader-to-user matrix.
        transform: Affine,
    },
    /// Raster tile repeated in both directions.
    Pattern {
        /// Tile raster, one pixel per tile-space unit.
        tile: Bitmap,
        /// Tile-to-user matrix.
        transform: Affine,
    },
}

impl Shader {
    /// Premultiplied color at a user-space point.
    pub fn sample(&self, p: Point) -> [u8; 4] {
        match self {
            Self::Solid(c) => c.to_premul(),
            Self::Linear {
                start,
                end,
                stops,
                tile,
                transform,
            } => {
                let Some(q) = invert(*transform).map(|inv| inv * p) else {
                    return [0; 4];
                };
                let d = *end - *start;
                let len2 = d.hypot2();
                let t = if len2 > 0.0 {
                    (q - *start).dot(d) / len2
                } else {
                    0.0
                };
                ramp(stops, tile.apply(t))
            }
            Self::Radial {
                center,
                radius,
                stops,
                tile,
                transform,
            } => {
                let Some(q) = invert(*transform).map(|inv| inv * p) else {
                    return [0; 4];
                };
                let t = if *radius > 0.0 {
                    (q - *center).hypot() / radius
                } else {
                    1.0
                };
                ramp(stops, tile.apply(t))
            }
            Self::Pattern { tile, transform } => {
                let Some(q) = invert(*transform).map(|inv| inv * p) else {
                    return [0; 4];
                };
                let w = i64::from(tile.width());
                let h = i64::from(tile.height());
                let x = (q.x.floor() as i64).rem_euclid(w.max(1));
                let y = (q.y.floor() as i64).rem_euclid(h.max(1));
                tile.pixel(x as u32, y as u32)
            }
        }
    }

    /// `true` for flat colors, which need no bounds context.
    pub fn is_solid(&self) -> bool {
        matches!(self, Self::Solid(_))
    }
}

fn invert(a: Affine) -> Option<Affine> {
    let det = a.determinant();
    if det.abs() < 1e-12 || !det.is_finite() {
        None
    } else {
        Some(a.inverse())
    }
}

/// Premultiplied ramp color at `t` in `0..=1`.
pub fn ramp(stops: &[GradientStop], t: f64) -> [u8; 4] {
    let t = t as f32;
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return [0; 4];
    };
    if t <= first.offset {
        return first.color.to_premul();
    }
    if t >= last.offset {
        return last.color.to_premul();
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t >= a.offset && t <= b.offset {
            let span = b.offset - a.offset;
            let f = if span > 0.0 { (t - a.offset) / span } else { 1.0 };
            let lerp =
                |x: u8, y: u8| (f32::from(x) + (f32::from(y) - f32::from(x)) * f).round() as u8;
            return Color::from_rgba8(
                lerp(a.color.r, b.color.r),
                lerp(a.color.g, b.color.g),
                lerp(a.color.b, b.color.b),
                lerp(a.color.a, b.color.a),
            )
            .to_premul();
        }
    }
    last.color.to_premul()
}

/// Scale a premultiplied pixel by an alpha in `0..=255`.
pub fn scale_premul(px: [u8; 4], alpha: u8) -> [u8; 4] {
    if alpha == 255 {
        return px;
    }
    px.map(|c| mul_div255_u8(u16::from(c), u16::from(alpha)))
}

/// Evaluate `shader` over a raster of `size`, sampling pixel centers.
///
/// `pixel_to_user` maps raster pixel coordinates into the shader's user space.
pub fn rasterize_shader(
    shader: &Shader,
    alpha: u8,
    size: PixelSize,
    pixel_to_user: Affine,
) -> RenderResult<Bitmap> {
    let mut px = vec![0u8; size.byte_len()];
    let w = size.width as usize;
    for (i, out) in px.chunks_exact_mut(4).enumerate() {
        let x = (i % w) as f64 + 0.5;
        let y = (i / w) as f64 + 0.5;
        let c = scale_premul(shader.sample(pixel_to_user * Point::new(x, y)), alpha);
        out.copy_from_slice(&c);
    }
    Bitmap::from_premul(size, px)
}

#[cfg(test)]
#[path = "../../tests/unit/paint/shader.rs"]
mod tests;
