use std::sync::{Arc, Weak};

use crate::config::RenderOpts;
use crate::filters::coordinator::{FilterCoordinator, FilterRequest, FilterState, RedrawTarget};
use crate::filters::model::FilterChain;
use crate::foundation::core::{Affine, Color, PixelSize, Point, Rect};
use crate::foundation::error::RenderResult;
use crate::foundation::math::canvas_scale;
use crate::geometry::path::{path_bounds, to_bezpath};
use crate::paint::resolve::{
    PaintContext, PatternRasterizer, ResolvedPaint, resolve_alpha, resolve_paint, resolve_stroke,
};
use crate::render::bitmap::Bitmap;
use crate::render::shadow::{
    ShadowPlan, ShadowStyle, plan_shadow, shadow_footprint, tint_shadow,
};
use crate::render::surface::{Surface, SurfaceProvider, check_offscreen_size};
use crate::render::text::{ShapedText, TextRequest, TextShaper, anchor_origin_x, lines_for_height};
use crate::scene::model::{
    FillRule, LineJoin, NodeId, NodeKind, Paint, PaintSource, PathDesc, PathOp, Resources,
    SceneNode, StrokeOp, TextBlock,
};

/// Per-layer inputs of a draw pass.
#[derive(Clone)]
pub struct LayerContext<'a> {
    /// Named paints of the layer's scene.
    pub resources: &'a Resources,
    /// Target asked to redraw when an asynchronous filter result lands.
    pub redraw: Option<Weak<dyn RedrawTarget>>,
}

impl<'a> LayerContext<'a> {
    /// Context without a redraw target.
    pub fn new(resources: &'a Resources) -> Self {
        Self {
            resources,
            redraw: None,
        }
    }

    /// Attach the redraw target.
    pub fn with_redraw(mut self, redraw: Weak<dyn RedrawTarget>) -> Self {
        self.redraw = Some(redraw);
        self
    }
}

/// Draws scene nodes onto a [`Surface`].
///
/// Stateless between calls apart from its collaborators: the offscreen provider used for
/// shadows and pattern tiles, the text shaper, and the optional filter coordinator.
pub struct SceneRenderer<'a> {
    opts: RenderOpts,
    provider: &'a dyn SurfaceProvider,
    shaper: &'a dyn TextShaper,
    filters: Option<&'a FilterCoordinator>,
}

impl<'a> SceneRenderer<'a> {
    /// Renderer without image filtering.
    pub fn new(
        opts: RenderOpts,
        provider: &'a dyn SurfaceProvider,
        shaper: &'a dyn TextShaper,
    ) -> Self {
        Self {
            opts,
            provider,
            shaper,
            filters: None,
        }
    }

    /// Route filtered images through `filters`.
    pub fn with_filters(mut self, filters: &'a FilterCoordinator) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Options in effect.
    pub fn opts(&self) -> &RenderOpts {
        &self.opts
    }

    /// Draw `node` and its subtree under the cumulative `opacity`.
    ///
    /// Every per-node failure is logged and contained. The only error returned is a
    /// [`RenderError::Usage`](crate::RenderError::Usage) from a misconfigured filter chain.
    pub fn draw_node(
        &self,
        layer: &LayerContext<'_>,
        node: &SceneNode,
        opacity: f32,
        surface: &mut dyn Surface,
    ) -> RenderResult<()> {
        if !node.visible {
            return Ok(());
        }
        match &node.kind {
            NodeKind::Draw { path, ops } => {
                self.draw_path(layer, path, ops, opacity, surface);
                self.draw_children(layer, &node.children, opacity, surface)
            }
            NodeKind::Opacity { opacity: local } => {
                let next = if *local == 1.0 {
                    opacity
                } else {
                    opacity * local
                };
                if next.is_nan() || next <= 0.0 {
                    return Ok(());
                }
                self.draw_children(layer, &node.children, next, surface)
            }
            NodeKind::Transform { transform } => {
                surface.save();
                surface.concat(*transform);
                let out = self.draw_children(layer, &node.children, opacity, surface);
                surface.restore();
                out
            }
            NodeKind::Clip { path } => {
                surface.save();
                surface.clip_path(&to_bezpath(path), FillRule::NonZero);
                let out = self.draw_children(layer, &node.children, opacity, surface);
                surface.restore();
                out
            }
            NodeKind::Shadow {
                radius,
                offset,
                color,
            } => {
                let style = ShadowStyle {
                    radius: *radius,
                    offset: *offset,
                    color: *color,
                };
                self.draw_shadow(layer, &style, &node.children, opacity, surface)?;
                self.draw_children(layer, &node.children, opacity, surface)
            }
            NodeKind::Text { text, ops } => {
                self.draw_text(layer, text, ops, opacity, surface);
                self.draw_children(layer, &node.children, opacity, surface)
            }
            NodeKind::Image {
                sources,
                filters,
                source_rect,
                target,
            } => {
                let image = ImageNode {
                    id: node.id,
                    sources,
                    filters: filters.as_ref(),
                    source_rect: *source_rect,
                    target: *target,
                };
                self.draw_image(layer, &image, opacity, surface)?;
                self.draw_children(layer, &node.children, opacity, surface)
            }
            NodeKind::Group | NodeKind::Unknown => {
                self.draw_children(layer, &node.children, opacity, surface)
            }
        }
    }

    fn draw_children(
        &self,
        layer: &LayerContext<'_>,
        children: &[SceneNode],
        opacity: f32,
        surface: &mut dyn Surface,
    ) -> RenderResult<()> {
        for child in children {
            self.draw_node(layer, child, opacity, surface)?;
        }
        Ok(())
    }

    fn paint_context<'r>(
        &self,
        layer: &LayerContext<'r>,
        paint: &Paint,
        bounds: impl FnOnce() -> Option<Rect>,
        opacity: f32,
        surface: &dyn Surface,
    ) -> PaintContext<'r> {
        let flat = matches!(
            layer.resources.resolve(&paint.source),
            Some(PaintSource::Color { .. }) | None
        );
        PaintContext {
            resources: layer.resources,
            bounds: if flat { None } else { bounds() },
            canvas_scale: canvas_scale(surface.transform()),
            opacity,
        }
    }

    fn resolve(
        &self,
        layer: &LayerContext<'_>,
        paint: &Paint,
        bounds: impl FnOnce() -> Option<Rect>,
        opacity: f32,
        surface: &dyn Surface,
    ) -> Option<ResolvedPaint> {
        let ctx = self.paint_context(layer, paint, bounds, opacity, surface);
        let mut tiles = PatternTiles {
            renderer: self,
            layer,
        };
        resolve_paint(paint, ctx, &mut tiles).filter(|p| p.alpha > 0)
    }

    fn draw_path(
        &self,
        layer: &LayerContext<'_>,
        path: &PathDesc,
        ops: &[PathOp],
        opacity: f32,
        surface: &mut dyn Surface,
    ) {
        if ops.is_empty() {
            return;
        }
        let bez = to_bezpath(path);
        for op in ops {
            match op {
                PathOp::Fill { paint, fill_rule } => {
                    if let Some(p) =
                        self.resolve(layer, paint, || path_bounds(&bez), opacity, surface)
                    {
                        surface.fill_path(&bez, &p, *fill_rule);
                    }
                }
                PathOp::Stroke(stroke) => {
                    let style = resolve_stroke(stroke, Some(&bez), self.opts.path_accuracy);
                    if style.width <= 0.0 {
                        continue;
                    }
                    if let Some(p) =
                        self.resolve(layer, &stroke.paint, || path_bounds(&bez), opacity, surface)
                    {
                        surface.stroke_path(&bez, &p, &style);
                    }
                }
            }
        }
    }

    fn shape_block(&self, block: &TextBlock) -> RenderResult<ShapedText> {
        let mut req = TextRequest {
            text: &block.content,
            font_size: block.font_size,
            max_width: block.width,
            max_lines: block.max_lines,
        };
        let shaped = self.shaper.shape(&req)?;
        match block.height {
            Some(h) if block.max_lines.is_none() && shaped.height > h => {
                req.max_lines = Some(lines_for_height(h, &shaped));
                self.shaper.shape(&req)
            }
            _ => Ok(shaped),
        }
    }

    fn draw_text(
        &self,
        layer: &LayerContext<'_>,
        block: &TextBlock,
        ops: &[PathOp],
        opacity: f32,
        surface: &mut dyn Surface,
    ) {
        if ops.is_empty() {
            return;
        }
        let shaped = match self.shape_block(block) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "text block not shaped, skipping");
                return;
            }
        };
        let origin = text_origin(block, &shaped);
        let bounds = || Some(text_box(origin, &shaped));
        for op in ops {
            match op {
                PathOp::Fill { paint, .. } => {
                    if let Some(p) = self.resolve(layer, paint, bounds, opacity, surface) {
                        surface.draw_text(origin, &shaped, &p, None);
                    }
                }
                PathOp::Stroke(stroke) => {
                    let style = resolve_stroke(stroke, None, self.opts.path_accuracy);
                    if style.width <= 0.0 {
                        continue;
                    }
                    if let Some(p) = self.resolve(layer, &stroke.paint, bounds, opacity, surface) {
                        surface.draw_text(origin, &shaped, &p, Some(&style));
                    }
                }
            }
        }
    }

    /// Draw only the drop shadow `style` casts from `content`, without the content itself.
    ///
    /// A negative radius draws nothing and allocates nothing. Allocation failures are logged
    /// and the shadow is skipped.
    pub fn draw_shadow(
        &self,
        layer: &LayerContext<'_>,
        style: &ShadowStyle,
        content: &[SceneNode],
        opacity: f32,
        surface: &mut dyn Surface,
    ) -> RenderResult<()> {
        if style.radius < 0.0 || content.is_empty() || style.color.is_transparent() {
            return Ok(());
        }
        let transform = surface.transform();
        let Some(bounds) = self.content_bounds(content, transform) else {
            return Ok(());
        };
        let Some(plan) = plan_shadow(
            style.radius,
            style.offset,
            transform,
            bounds,
            surface.width(),
            surface.height(),
        ) else {
            tracing::trace!("shadow misses the surface");
            return Ok(());
        };
        let shadow = match self.render_shadow(layer, content, &plan, style.color, opacity) {
            Ok(b) => b,
            Err(e) if e.is_usage() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "shadow unavailable, skipping");
                return Ok(());
            }
        };
        let Some(to_device) = invert(transform) else {
            tracing::debug!("degenerate transform, shadow skipped");
            return Ok(());
        };
        surface.save();
        surface.concat(to_device);
        surface.draw_bitmap(&shadow, None, plan.dst, 255);
        surface.restore();
        Ok(())
    }

    /// Device-space bounds of what `nodes` draw under `transform`, `None` when nothing is drawn.
    fn content_bounds(&self, nodes: &[SceneNode], transform: Affine) -> Option<Rect> {
        nodes
            .iter()
            .filter_map(|node| self.node_bounds(node, transform))
            .reduce(|a, b| a.union(b))
    }

    fn node_bounds(&self, node: &SceneNode, transform: Affine) -> Option<Rect> {
        if !node.visible {
            return None;
        }
        let own = match &node.kind {
            NodeKind::Draw { path, ops } if !ops.is_empty() => {
                path_bounds(&to_bezpath(path)).map(|b| {
                    let out = stroke_outset(ops);
                    transform.transform_rect_bbox(b.inflate(out, out))
                })
            }
            NodeKind::Text { text, ops } if !ops.is_empty() => match self.shape_block(text) {
                Ok(shaped) => {
                    let out = stroke_outset(ops);
                    let b = text_box(text_origin(text, &shaped), &shaped);
                    Some(transform.transform_rect_bbox(b.inflate(out, out)))
                }
                Err(_) => None,
            },
            NodeKind::Image { target, .. } => Some(transform.transform_rect_bbox(*target)),
            NodeKind::Opacity { opacity } if opacity.is_nan() || *opacity <= 0.0 => return None,
            NodeKind::Transform { transform: local } => {
                return self.content_bounds(&node.children, transform * *local);
            }
            NodeKind::Clip { path } => {
                let clip = transform.transform_rect_bbox(path_bounds(&to_bezpath(path))?);
                let inner = self.content_bounds(&node.children, transform)?.intersect(clip);
                return (inner.width() > 0.0 && inner.height() > 0.0).then_some(inner);
            }
            NodeKind::Shadow { radius, offset, .. } => {
                let inner = self.content_bounds(&node.children, transform)?;
                return Some(shadow_footprint(*radius, *offset, transform, inner));
            }
            _ => None,
        };
        match (own, self.content_bounds(&node.children, transform)) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        }
    }

    fn render_shadow(
        &self,
        layer: &LayerContext<'_>,
        content: &[SceneNode],
        plan: &ShadowPlan,
        color: Color,
        opacity: f32,
    ) -> RenderResult<Bitmap> {
        check_offscreen_size(plan.size, self.opts.max_offscreen_px)?;
        let mut off = self.provider.create_surface(plan.size)?;
        off.concat(plan.content_transform);
        self.draw_children(layer, content, 1.0, off.as_surface_mut())?;
        let content = off.to_bitmap()?;
        drop(off);
        tint_shadow(&content, plan, color, resolve_alpha(1.0, opacity))
    }

    fn draw_image(
        &self,
        layer: &LayerContext<'_>,
        image: &ImageNode<'_>,
        opacity: f32,
        surface: &mut dyn Surface,
    ) -> RenderResult<()> {
        let alpha = resolve_alpha(1.0, opacity);
        let target_px = PixelSize::from_scaled(image.target.size(), canvas_scale(surface.transform()));
        if alpha == 0 || target_px.is_empty() {
            return Ok(());
        }

        let (Some(chain), Some(filters)) = (image.filters, self.filters) else {
            if image.filters.is_some() {
                tracing::debug!(node = image.id.0, "no filter pipeline, drawing unfiltered");
            }
            if let Some(src) = image.sources.first() {
                surface.draw_bitmap(src, image.source_rect, image.target, alpha);
            }
            return Ok(());
        };

        let req = FilterRequest {
            node: image.id,
            chain,
            sources: image.sources,
            source_rect: image.source_rect,
            target: target_px,
        };
        match filters.request(req, layer.redraw.clone())? {
            FilterState::Ready(bitmap) => surface.draw_bitmap(&bitmap, None, image.target, alpha),
            FilterState::Pending => {
                tracing::trace!(node = image.id.0, "filtered image pending");
            }
            FilterState::Skipped => {}
        }
        Ok(())
    }
}

struct ImageNode<'n> {
    id: NodeId,
    sources: &'n [Bitmap],
    filters: Option<&'n Arc<FilterChain>>,
    source_rect: Option<Rect>,
    target: Rect,
}

fn text_origin(block: &TextBlock, shaped: &ShapedText) -> Point {
    Point::new(
        anchor_origin_x(block.x, f64::from(shaped.width), block.anchor, block.direction),
        block.y - f64::from(shaped.baseline),
    )
}

fn text_box(origin: Point, shaped: &ShapedText) -> Rect {
    Rect::new(
        origin.x,
        origin.y,
        origin.x + f64::from(shaped.width),
        origin.y + f64::from(shaped.height),
    )
}

/// How far the widest stroke of `ops` reaches past the geometry, miters and square caps included.
fn stroke_outset(ops: &[PathOp]) -> f64 {
    ops.iter()
        .filter_map(|op| match op {
            PathOp::Stroke(stroke) => Some(stroke_reach(stroke)),
            PathOp::Fill { .. } => None,
        })
        .fold(0.0, f64::max)
}

fn stroke_reach(stroke: &StrokeOp) -> f64 {
    let half = stroke.width.max(0.0) / 2.0;
    let corner = match stroke.join {
        LineJoin::Miter => stroke.miter_limit.max(std::f64::consts::SQRT_2),
        _ => std::f64::consts::SQRT_2,
    };
    let reach = half * corner;
    if reach.is_finite() { reach } else { 0.0 }
}

fn invert(m: Affine) -> Option<Affine> {
    let det = m.determinant();
    (det.is_finite() && det != 0.0).then(|| m.inverse())
}

/// Rasterizes pattern tiles by drawing their content with the same renderer and layer.
struct PatternTiles<'r, 'l> {
    renderer: &'r SceneRenderer<'r>,
    layer: &'l LayerContext<'l>,
}

impl PatternRasterizer for PatternTiles<'_, '_> {
    fn rasterize_pattern(
        &mut self,
        content: &[SceneNode],
        size: PixelSize,
        scale: f64,
    ) -> RenderResult<Bitmap> {
        check_offscreen_size(size, self.renderer.opts.max_offscreen_px)?;
        let mut tile = self.renderer.provider.create_surface(size)?;
        tile.concat(Affine::scale(scale));
        self.renderer
            .draw_children(self.layer, content, 1.0, tile.as_surface_mut())?;
        tile.to_bitmap()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/scene_renderer.rs"]
mod tests;
