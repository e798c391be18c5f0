use std::sync::Arc;

use crate::filters::model::GradientDesc;
use crate::foundation::core::{Affine, Color, PixelSize, Point};
use crate::foundation::error::{RenderError, RenderResult};
use crate::paint::resolve::tile_mode;
use crate::paint::shader::{Shader, rasterize_shader};
use crate::render::bitmap::Bitmap;
use crate::render::bitmap_pool::BitmapPool;

/// Value produced by one filter stage.
///
/// Color and gradient results are lazy: they carry no pixels until a consumer materializes
/// them at the size it needs.
#[derive(Clone, Debug)]
pub enum FilterResult {
    /// Concrete raster.
    Bitmap(Bitmap),
    /// Flat color of any size.
    Color(Color),
    /// Gradient of any size.
    Gradient(Arc<GradientDesc>),
}

impl FilterResult {
    /// Fully transparent placeholder used for failed or missing inputs.
    pub fn transparent() -> Self {
        Self::Color(Color::TRANSPARENT)
    }

    /// The raster, when this result has one.
    pub fn as_bitmap(&self) -> Option<&Bitmap> {
        match self {
            Self::Bitmap(b) => Some(b),
            _ => None,
        }
    }

    /// The raster, or a filter error for lazy results.
    pub fn bitmap(&self) -> RenderResult<&Bitmap> {
        self.as_bitmap()
            .ok_or_else(|| RenderError::filter("filter result is not a bitmap"))
    }

    /// Intrinsic size. Lazy results have none.
    pub fn size(&self) -> Option<PixelSize> {
        self.as_bitmap().map(Bitmap::size)
    }

    /// `true` for the transparent placeholder.
    pub fn is_transparent_color(&self) -> bool {
        matches!(self, Self::Color(c) if c.is_transparent())
    }

    /// Concrete raster of exactly `size`.
    ///
    /// Bitmaps are cropped or padded from the top-left corner, sharing the buffer when the
    /// size already matches.
    pub fn materialize(&self, size: PixelSize, pool: &BitmapPool) -> RenderResult<Bitmap> {
        match self {
            Self::Bitmap(b) => b.fit_to(size),
            Self::Color(c) => pool.filled(size, *c),
            Self::Gradient(g) => rasterize_shader(&gradient_shader(g, size), 255, size, Affine::IDENTITY),
        }
    }
}

/// Shader for a gradient result stretched over a `size` raster.
pub fn gradient_shader(desc: &GradientDesc, size: PixelSize) -> Shader {
    let w = f64::from(size.width);
    let h = f64::from(size.height);
    let at = |p: Point| Point::new(p.x * w, p.y * h);
    match desc {
        GradientDesc::Linear {
            start,
            end,
            stops,
            spread,
        } => Shader::Linear {
            start: at(*start),
            end: at(*end),
            stops: stops.as_slice().into(),
            tile: tile_mode(*spread),
            transform: Affine::IDENTITY,
        },
        GradientDesc::Radial {
            center,
            radius,
            stops,
            spread,
        } => Shader::Radial {
            center: at(*center),
            radius: radius * w.max(h),
            stops: stops.as_slice().into(),
            tile: tile_mode(*spread),
            transform: Affine::IDENTITY,
        },
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/result.rs"]
mod tests;
