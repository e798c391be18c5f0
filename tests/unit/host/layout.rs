use super::*;
use crate::config::RenderOpts;
use crate::render::recording::{DrawOp, RecordingProvider, RecordingSurface};
use crate::render::text::FallbackShaper;
use crate::scene::model::Scene;

fn layer() -> Arc<Layer> {
    Layer::new(Scene {
        width: 4.0,
        height: 4.0,
        resources: Resources::new(),
        root: SceneNode::new(
            1,
            NodeKind::Draw {
                path: PathDesc::Rect {
                    rect: Rect::new(0.0, 0.0, 4.0, 4.0),
                },
                ops: vec![PathOp::Fill {
                    paint: Paint::color(Color::WHITE),
                    fill_rule: FillRule::NonZero,
                }],
            },
        ),
    })
}

fn draw(layout: &AbsoluteLayout, provider: &RecordingProvider) -> RecordingSurface {
    let shaper = FallbackShaper;
    let renderer = SceneRenderer::new(RenderOpts::default(), provider, &shaper);
    let mut s = RecordingSurface::new(40, 40);
    layout.draw(&renderer, &mut s).unwrap();
    assert_eq!(s.save_depth(), 0);
    s
}

fn fill_transform(s: &RecordingSurface) -> Affine {
    s.ops()
        .iter()
        .find_map(|op| match op {
            DrawOp::Fill { transform, .. } => Some(*transform),
            _ => None,
        })
        .unwrap()
}

#[test]
fn children_are_drawn_at_their_offsets_minus_scroll() {
    let layout = AbsoluteLayout::new()
        .with_child(LayoutChild::new(
            Rect::new(10.0, 20.0, 14.0, 24.0),
            ChildContent::Layer(layer()),
        ))
        .with_child(
            LayoutChild::new(Rect::new(0.0, 0.0, 4.0, 4.0), ChildContent::Layer(layer()))
                .with_scroll(Vec2::new(3.0, 4.0)),
        );
    let s = draw(&layout, &RecordingProvider::default());
    let fills: Vec<Affine> = s
        .ops()
        .iter()
        .filter_map(|op| match op {
            DrawOp::Fill { transform, .. } => Some(*transform),
            _ => None,
        })
        .collect();
    assert_eq!(
        fills,
        vec![
            Affine::translate((10.0, 20.0)),
            Affine::translate((-3.0, -4.0))
        ]
    );
}

#[test]
fn nested_layouts_compose_offsets() {
    let inner = AbsoluteLayout::new().with_child(LayoutChild::new(
        Rect::new(1.0, 2.0, 5.0, 6.0),
        ChildContent::Layer(layer()),
    ));
    let outer = AbsoluteLayout::new().with_child(LayoutChild::new(
        Rect::new(10.0, 10.0, 30.0, 30.0),
        ChildContent::Layout(inner),
    ));
    let s = draw(&outer, &RecordingProvider::default());
    assert_eq!(fill_transform(&s), Affine::translate((11.0, 12.0)));
}

#[test]
fn outline_clip_precedes_content() {
    let layout = AbsoluteLayout::new().with_child(
        LayoutChild::new(Rect::new(0.0, 0.0, 4.0, 4.0), ChildContent::Layer(layer())).with_outline(
            Outline {
                radii: [1.0; 4],
                clip: true,
            },
        ),
    );
    let s = draw(&layout, &RecordingProvider::default());
    assert!(matches!(s.ops()[1], DrawOp::Clip { .. }));
    assert!(matches!(s.ops()[2], DrawOp::Fill { .. }));
}

#[test]
fn hidden_children_are_skipped() {
    let mut layout = AbsoluteLayout::new().with_child(LayoutChild::new(
        Rect::new(0.0, 0.0, 4.0, 4.0),
        ChildContent::Layer(layer()),
    ));
    layout.children_mut()[0].visible = false;
    assert!(draw(&layout, &RecordingProvider::default()).ops().is_empty());
}

#[test]
fn outline_shadow_is_drawn_before_content() {
    let layout = AbsoluteLayout::new().with_child(
        LayoutChild::new(Rect::new(5.0, 5.0, 9.0, 9.0), ChildContent::Layer(layer()))
            .with_transform(Affine::scale(2.0))
            .with_shadow(ShadowStyle {
                radius: 1.0,
                offset: Vec2::new(1.0, 1.0),
                color: Color::BLACK,
            }),
    );
    let provider = RecordingProvider::default();
    let s = draw(&layout, &provider);
    assert_eq!(provider.allocations(), 1);
    let bitmap_at = s
        .ops()
        .iter()
        .position(|op| matches!(op, DrawOp::Bitmap { .. }))
        .unwrap();
    let fill_at = s
        .ops()
        .iter()
        .position(|op| matches!(op, DrawOp::Fill { .. }))
        .unwrap();
    assert!(bitmap_at < fill_at);
    assert_eq!(s.paints().count(), 1);
}
