use smallvec::SmallVec;

use crate::foundation::core::{Affine, BezPath, Color, PixelSize, Point, Rect, Size};
use crate::foundation::error::RenderResult;
use crate::geometry::path::path_length;
use crate::paint::shader::{Shader, TileMode};
use crate::render::bitmap::Bitmap;
use crate::scene::model::{LineCap, LineJoin, Paint, PaintSource, Resources, SceneNode, Spread, StrokeOp};

/// A paint ready to be handed to a surface.
#[derive(Clone, Debug)]
pub struct ResolvedPaint {
    /// What is painted.
    pub shader: Shader,
    /// Effective alpha in `0..=255`, applied on top of the shader's own alpha.
    pub alpha: u8,
}

impl ResolvedPaint {
    /// Solid color paint at full alpha.
    pub fn solid(color: Color) -> Self {
        Self {
            shader: Shader::Solid(color),
            alpha: 255,
        }
    }

    /// Flat color with the paint alpha folded in, `None` for non-solid shaders.
    pub fn effective_color(&self) -> Option<Color> {
        match &self.shader {
            Shader::Solid(c) => Some(c.modulate(self.alpha)),
            _ => None,
        }
    }
}

/// Effective alpha of a paint under an ancestor opacity.
///
/// Both factors are applied in order and truncated independently:
/// `floor(floor(255 * paint_opacity) * cumulative_opacity)`.
pub fn resolve_alpha(paint_opacity: f32, cumulative_opacity: f32) -> u8 {
    let local = (255.0 * paint_opacity.clamp(0.0, 1.0)).floor();
    (local * cumulative_opacity.clamp(0.0, 1.0)).floor() as u8
}

/// Shader tile mode for a gradient spread.
pub fn tile_mode(spread: Spread) -> TileMode {
    match spread {
        Spread::Pad => TileMode::Clamp,
        Spread::Reflect => TileMode::Mirror,
        Spread::Repeat => TileMode::Repeat,
        Spread::Unknown => {
            tracing::warn!("unknown gradient spread, using pad");
            TileMode::Clamp
        }
    }
}

/// Renders pattern content into an offscreen tile.
pub trait PatternRasterizer {
    /// Draw `content` into a transparent raster of `size`, scaled by `scale`.
    fn rasterize_pattern(
        &mut self,
        content: &[SceneNode],
        size: PixelSize,
        scale: f64,
    ) -> RenderResult<Bitmap>;
}

/// Inputs shared by every paint resolved in one draw call.
#[derive(Clone, Copy, Debug)]
pub struct PaintContext<'a> {
    /// Named resources for `@Name` references.
    pub resources: &'a Resources,
    /// Bounds of the painted geometry, needed by bounding-box-relative gradients.
    pub bounds: Option<Rect>,
    /// Device scale of the current transform.
    pub canvas_scale: f64,
    /// Cumulative ancestor opacity.
    pub opacity: f32,
}

/// Turn an abstract paint into a concrete one.
///
/// Returns `None` when the paint cannot be drawn: unknown reference, failed pattern tile,
/// empty tile. Every such case is logged.
pub fn resolve_paint(
    paint: &Paint,
    ctx: PaintContext<'_>,
    patterns: &mut dyn PatternRasterizer,
) -> Option<ResolvedPaint> {
    let alpha = resolve_alpha(paint.opacity, ctx.opacity);
    let source = ctx.resources.resolve(&paint.source)?;
    let shader = match source {
        PaintSource::Color { color } => Shader::Solid(*color),
        PaintSource::LinearGradient {
            start,
            end,
            stops,
            spread,
            bounding_box,
            transform,
        } => {
            let (start, end) = match (bounding_box, ctx.bounds) {
                (true, Some(b)) => (bbox_point(b, *start), bbox_point(b, *end)),
                _ => (*start, *end),
            };
            Shader::Linear {
                start,
                end,
                stops: stops.as_slice().into(),
                tile: tile_mode(*spread),
                transform: *transform,
            }
        }
        PaintSource::RadialGradient {
            center,
            radius,
            stops,
            spread,
            bounding_box,
            transform,
        } => {
            let (center, radius) = match (bounding_box, ctx.bounds) {
                (true, Some(b)) => (bbox_point(b, *center), radius * b.width().max(b.height())),
                _ => (*center, *radius),
            };
            Shader::Radial {
                center,
                radius,
                stops: stops.as_slice().into(),
                tile: tile_mode(*spread),
                transform: *transform,
            }
        }
        PaintSource::Pattern {
            width,
            height,
            content,
            transform,
        } => {
            let scale = ctx.canvas_scale;
            let size = PixelSize::from_scaled(Size::new(*width, *height), scale);
            if size.is_empty() {
                tracing::debug!("empty pattern tile, skipping paint");
                return None;
            }
            let tile = match patterns.rasterize_pattern(content, size, scale) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "pattern tile unavailable, skipping paint");
                    return None;
                }
            };
            Shader::Pattern {
                tile,
                transform: *transform * Affine::scale(1.0 / scale),
            }
        }
        PaintSource::Reference { .. } => return None,
    };
    Some(ResolvedPaint { shader, alpha })
}

fn bbox_point(b: Rect, f: Point) -> Point {
    Point::new(b.x0 + f.x * b.width(), b.y0 + f.y * b.height())
}

/// Dash pattern in user units.
#[derive(Clone, Debug, PartialEq)]
pub struct Dash {
    /// On/off lengths, even count.
    pub array: SmallVec<[f64; 4]>,
    /// Phase.
    pub offset: f64,
}

/// Stroke decoration ready to be handed to a surface.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeStyle {
    /// Stroke width.
    pub width: f64,
    /// Miter limit ratio.
    pub miter_limit: f64,
    /// Line cap.
    pub cap: kurbo::Cap,
    /// Line join.
    pub join: kurbo::Join,
    /// Dash pattern, `None` for solid strokes.
    pub dash: Option<Dash>,
}

impl StrokeStyle {
    /// Solid stroke with butt caps and miter joins.
    pub fn solid(width: f64) -> Self {
        Self {
            width,
            miter_limit: 4.0,
            cap: kurbo::Cap::Butt,
            join: kurbo::Join::Miter,
            dash: None,
        }
    }

    /// Equivalent `kurbo` stroke.
    pub fn to_kurbo(&self) -> kurbo::Stroke {
        let mut s = kurbo::Stroke::new(self.width)
            .with_caps(self.cap)
            .with_join(self.join)
            .with_miter_limit(self.miter_limit);
        if let Some(d) = &self.dash {
            s = s.with_dashes(d.offset, d.array.iter().copied());
        }
        s
    }
}

/// Map a cap, defaulting unknown values to butt.
pub fn line_cap(cap: LineCap) -> kurbo::Cap {
    match cap {
        LineCap::Butt => kurbo::Cap::Butt,
        LineCap::Square => kurbo::Cap::Square,
        LineCap::Round => kurbo::Cap::Round,
        LineCap::Unknown => {
            tracing::warn!("unknown line cap, using butt");
            kurbo::Cap::Butt
        }
    }
}

/// Map a join, defaulting unknown values to bevel.
pub fn line_join(join: LineJoin) -> kurbo::Join {
    match join {
        LineJoin::Bevel => kurbo::Join::Bevel,
        LineJoin::Miter => kurbo::Join::Miter,
        LineJoin::Round => kurbo::Join::Round,
        LineJoin::Unknown => {
            tracing::warn!("unknown line join, using bevel");
            kurbo::Join::Bevel
        }
    }
}

/// Resolve the stroke decoration of `op`.
///
/// Dashes need the concrete `path`: with a declared `path_length`, every dash entry and the
/// offset are scaled by `rendered_length / path_length`. Without a path the dash is dropped.
pub fn resolve_stroke(op: &StrokeOp, path: Option<&BezPath>, accuracy: f64) -> StrokeStyle {
    StrokeStyle {
        width: op.width.max(0.0),
        miter_limit: op.miter_limit,
        cap: line_cap(op.cap),
        join: line_join(op.join),
        dash: resolve_dash(op, path, accuracy),
    }
}

fn resolve_dash(op: &StrokeOp, path: Option<&BezPath>, accuracy: f64) -> Option<Dash> {
    if op.dash_array.is_empty() {
        return None;
    }
    let Some(path) = path else {
        tracing::warn!("dash pattern without a path, drawing solid");
        return None;
    };
    if op.dash_array.iter().any(|v| !v.is_finite() || *v < 0.0)
        || op.dash_array.iter().sum::<f64>() <= 0.0
    {
        tracing::warn!("invalid dash array, drawing solid");
        return None;
    }

    let mut array: SmallVec<[f64; 4]> = op.dash_array.iter().copied().collect();
    if array.len() % 2 == 1 {
        array.extend_from_slice(&op.dash_array);
    }
    let mut offset = op.dash_offset;

    if op.path_length > 0.0 && op.path_length.is_finite() {
        let k = path_length(path, accuracy) / op.path_length;
        for v in &mut array {
            *v *= k;
        }
        offset *= k;
    }
    Some(Dash { array, offset })
}

#[cfg(test)]
#[path = "../../tests/unit/paint/resolve.rs"]
mod tests;
