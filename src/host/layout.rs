use std::sync::Arc;

use crate::foundation::core::{Affine, Color, Rect, Vec2};
use crate::foundation::error::RenderResult;
use crate::geometry::path::to_bezpath;
use crate::host::layer::Layer;
use crate::render::scene_renderer::{LayerContext, SceneRenderer};
use crate::render::shadow::ShadowStyle;
use crate::render::surface::Surface;
use crate::scene::model::{FillRule, NodeKind, Paint, PathDesc, PathOp, Resources, SceneNode};

/// Rounded-rectangle outline of a child, in the child's own coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outline {
    /// Corner radii: top-left, top-right, bottom-right, bottom-left.
    pub radii: [f64; 4],
    /// Clip the child's content to the outline.
    pub clip: bool,
}

/// What an absolutely positioned child shows.
pub enum ChildContent {
    /// A layer with its own scene.
    Layer(Arc<Layer>),
    /// A nested layout.
    Layout(AbsoluteLayout),
}

/// A child positioned at engine-computed pixel coordinates.
pub struct LayoutChild {
    /// Bounds in the parent's coordinates.
    pub bounds: Rect,
    /// Static transform applied about the child's origin.
    pub transform: Affine,
    /// Outline used for clipping and for the outline shadow.
    pub outline: Option<Outline>,
    /// Shadow cast by the outline, drawn before the content.
    pub shadow: Option<ShadowStyle>,
    /// Scroll offset subtracted from the content position.
    pub scroll: Vec2,
    /// Hidden children draw nothing.
    pub visible: bool,
    /// The child's content.
    pub content: ChildContent,
}

impl LayoutChild {
    /// Visible child at `bounds` with no decoration.
    pub fn new(bounds: Rect, content: ChildContent) -> Self {
        Self {
            bounds,
            transform: Affine::IDENTITY,
            outline: None,
            shadow: None,
            scroll: Vec2::ZERO,
            visible: true,
            content,
        }
    }

    /// Static transform about the child's origin.
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    /// Outline shape.
    pub fn with_outline(mut self, outline: Outline) -> Self {
        self.outline = Some(outline);
        self
    }

    /// Outline shadow.
    pub fn with_shadow(mut self, shadow: ShadowStyle) -> Self {
        self.shadow = Some(shadow);
        self
    }

    /// Scroll offset.
    pub fn with_scroll(mut self, scroll: Vec2) -> Self {
        self.scroll = scroll;
        self
    }

    fn local_rect(&self) -> Rect {
        Rect::from_origin_size((0.0, 0.0), self.bounds.size())
    }

    fn outline_path(&self) -> PathDesc {
        let rect = self.local_rect();
        match self.outline {
            Some(o) => PathDesc::RRect {
                rect,
                radii: o.radii,
            },
            None => PathDesc::Rect { rect },
        }
    }
}

/// Container placing pre-measured children at absolute positions.
///
/// Each child is drawn in order: move to its origin, apply its static transform, draw its
/// outline shadow, clip to its outline, shift by its scroll offset, draw its content.
#[derive(Default)]
pub struct AbsoluteLayout {
    children: Vec<LayoutChild>,
}

impl AbsoluteLayout {
    /// Empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child.
    pub fn push(&mut self, child: LayoutChild) {
        self.children.push(child);
    }

    /// Builder form of [`AbsoluteLayout::push`].
    pub fn with_child(mut self, child: LayoutChild) -> Self {
        self.push(child);
        self
    }

    /// Children in draw order.
    pub fn children(&self) -> &[LayoutChild] {
        &self.children
    }

    /// Mutable access for scroll and transform updates.
    pub fn children_mut(&mut self) -> &mut [LayoutChild] {
        &mut self.children
    }

    /// Draw every visible child onto `surface`.
    pub fn draw(&self, renderer: &SceneRenderer<'_>, surface: &mut dyn Surface) -> RenderResult<()> {
        for child in self.children.iter().filter(|c| c.visible) {
            surface.save();
            let out = draw_child(child, renderer, surface);
            surface.restore();
            out?;
        }
        Ok(())
    }
}

fn draw_child(
    child: &LayoutChild,
    renderer: &SceneRenderer<'_>,
    surface: &mut dyn Surface,
) -> RenderResult<()> {
    surface.concat(Affine::translate(child.bounds.origin().to_vec2()) * child.transform);

    if let Some(style) = &child.shadow {
        let caster = SceneNode::new(
            0,
            NodeKind::Draw {
                path: child.outline_path(),
                ops: vec![PathOp::Fill {
                    paint: Paint::color(Color::BLACK),
                    fill_rule: FillRule::NonZero,
                }],
            },
        );
        let resources = Resources::new();
        renderer.draw_shadow(&LayerContext::new(&resources), style, &[caster], 1.0, surface)?;
    }

    if let Some(outline) = child.outline.filter(|o| o.clip) {
        let path = to_bezpath(&PathDesc::RRect {
            rect: child.local_rect(),
            radii: outline.radii,
        });
        surface.clip_path(&path, FillRule::NonZero);
    }
    if child.scroll != Vec2::ZERO {
        surface.concat(Affine::translate(-child.scroll));
    }

    match &child.content {
        ChildContent::Layer(layer) => layer.draw(renderer, surface),
        ChildContent::Layout(layout) => layout.draw(renderer, surface),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/layout.rs"]
mod tests;
