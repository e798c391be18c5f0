use super::*;
use crate::foundation::core::Vec2;
use crate::paint::shader::Shader;
use crate::render::recording::{DrawOp, RecordingProvider, RecordingSurface};
use crate::render::text::{ELLIPSIS, FallbackShaper};
use crate::scene::model::{GradientStop, LayoutDirection, TextAnchor};

const RED: Color = Color::from_rgba8(255, 0, 0, 255);

fn fill(id: u64, rect: Rect, paint: Paint) -> SceneNode {
    SceneNode::new(
        id,
        NodeKind::Draw {
            path: PathDesc::Rect { rect },
            ops: vec![PathOp::Fill {
                paint,
                fill_rule: FillRule::NonZero,
            }],
        },
    )
}

fn unit_fill(id: u64) -> SceneNode {
    fill(id, Rect::new(0.0, 0.0, 4.0, 4.0), Paint::color(RED))
}

fn render_with(
    provider: &RecordingProvider,
    resources: &Resources,
    node: &SceneNode,
) -> RecordingSurface {
    let shaper = FallbackShaper;
    let renderer = SceneRenderer::new(RenderOpts::default(), provider, &shaper);
    let mut surface = RecordingSurface::new(10, 10);
    renderer
        .draw_node(&LayerContext::new(resources), node, 1.0, &mut surface)
        .unwrap();
    surface
}

fn render(node: &SceneNode) -> RecordingSurface {
    render_with(&RecordingProvider::default(), &Resources::new(), node)
}

#[test]
fn invisible_subtree_draws_nothing() {
    let node = SceneNode::group(1, vec![unit_fill(2)]).hidden();
    let provider = RecordingProvider::default();
    let s = render_with(&provider, &Resources::new(), &node);
    assert!(s.ops().is_empty());
    assert_eq!(provider.allocations(), 0);
}

#[test]
fn nested_opacity_truncates_in_two_steps() {
    let node = SceneNode::new(2, NodeKind::Opacity { opacity: 0.8 }).with_children(vec![
        fill(3, Rect::new(0.0, 0.0, 1.0, 1.0), Paint::color(RED).with_opacity(0.3)),
        unit_fill(4),
    ]);
    let s = render(&node);
    let alphas: Vec<u8> = s.paints().map(|p| p.alpha).collect();
    assert_eq!(alphas, vec![60, 204]);
}

#[test]
fn zero_opacity_skips_the_subtree() {
    let node = SceneNode::new(1, NodeKind::Opacity { opacity: 0.0 })
        .with_children(vec![unit_fill(2)]);
    assert!(render(&node).ops().is_empty());
}

#[test]
fn transform_and_clip_are_scoped_to_children() {
    let node = SceneNode::new(
        1,
        NodeKind::Transform {
            transform: Affine::translate((5.0, 0.0)),
        },
    )
    .with_children(vec![
        SceneNode::new(
            2,
            NodeKind::Clip {
                path: PathDesc::Rect {
                    rect: Rect::new(0.0, 0.0, 2.0, 2.0),
                },
            },
        )
        .with_children(vec![unit_fill(3)]),
    ]);
    let s = render(&node);
    let ops = s.ops();
    assert_eq!(ops.len(), 6);
    assert!(matches!(ops[0], DrawOp::Save));
    assert!(matches!(ops[1], DrawOp::Save));
    assert!(matches!(ops[2], DrawOp::Clip { .. }));
    assert!(matches!(
        &ops[3],
        DrawOp::Fill { transform, .. } if *transform == Affine::translate((5.0, 0.0))
    ));
    assert!(matches!(ops[4], DrawOp::Restore));
    assert!(matches!(ops[5], DrawOp::Restore));
    assert_eq!(s.transform(), Affine::IDENTITY);
}

#[test]
fn unknown_nodes_still_draw_children() {
    let node = SceneNode::new(1, NodeKind::Unknown).with_children(vec![unit_fill(2)]);
    assert_eq!(render(&node).paints().count(), 1);
}

#[test]
fn negative_shadow_radius_is_a_pass_through() {
    let node = SceneNode::new(
        1,
        NodeKind::Shadow {
            radius: -1.0,
            offset: Vec2::new(2.0, 2.0),
            color: Color::BLACK,
        },
    )
    .with_children(vec![unit_fill(2)]);
    let provider = RecordingProvider::default();
    let s = render_with(&provider, &Resources::new(), &node);
    assert_eq!(provider.allocations(), 0);
    assert_eq!(s.ops().len(), 1);
    assert!(matches!(s.ops()[0], DrawOp::Fill { .. }));
}

#[test]
fn shadow_is_composited_behind_children() {
    let node = SceneNode::new(
        1,
        NodeKind::Shadow {
            radius: 2.0,
            offset: Vec2::new(1.0, 1.0),
            color: Color::BLACK,
        },
    )
    .with_children(vec![unit_fill(2)]);
    let provider = RecordingProvider::default();
    let s = render_with(&provider, &Resources::new(), &node);
    assert_eq!(provider.sizes(), vec![PixelSize::new(8, 8)]);
    let ops = s.ops();
    assert_eq!(ops.len(), 4);
    assert!(matches!(
        &ops[1],
        DrawOp::Bitmap { dst, transform, alpha: 255, .. }
            if *dst == Rect::new(-1.0, -1.0, 7.0, 7.0) && *transform == Affine::IDENTITY
    ));
    assert!(matches!(ops[3], DrawOp::Fill { .. }));
}

#[test]
fn shadow_offscreen_follows_the_caster_on_a_large_surface() {
    let node = SceneNode::new(1, NodeKind::Transform {
        transform: Affine::translate((100.0, 100.0)),
    })
    .with_children(vec![
        SceneNode::new(
            2,
            NodeKind::Shadow {
                radius: 2.0,
                offset: Vec2::new(1.0, 1.0),
                color: Color::BLACK,
            },
        )
        .with_children(vec![unit_fill(3)]),
    ]);
    let provider = RecordingProvider::default();
    let shaper = FallbackShaper;
    let renderer = SceneRenderer::new(RenderOpts::default(), &provider, &shaper);
    let mut s = RecordingSurface::new(4200, 4200);
    renderer
        .draw_node(&LayerContext::new(&Resources::new()), &node, 1.0, &mut s)
        .unwrap();

    assert_eq!(provider.sizes(), vec![PixelSize::new(8, 8)]);
    let shadows: Vec<_> = s
        .ops()
        .iter()
        .filter_map(|op| match op {
            DrawOp::Bitmap { dst, .. } => Some(*dst),
            _ => None,
        })
        .collect();
    assert_eq!(shadows, vec![Rect::new(99.0, 99.0, 107.0, 107.0)]);
}

#[test]
fn shadow_covers_stroked_and_nested_content() {
    let stroked = SceneNode::new(
        3,
        NodeKind::Draw {
            path: PathDesc::Rect {
                rect: Rect::new(2.0, 2.0, 6.0, 6.0),
            },
            ops: vec![PathOp::Stroke(StrokeOp::new(Paint::color(RED), 2.0))],
        },
    );
    let node = SceneNode::new(
        1,
        NodeKind::Shadow {
            radius: 0.0,
            offset: Vec2::ZERO,
            color: Color::BLACK,
        },
    )
    .with_children(vec![
        SceneNode::new(2, NodeKind::Transform {
            transform: Affine::translate((10.0, 0.0)),
        })
        .with_children(vec![stroked]),
    ]);
    let provider = RecordingProvider::default();
    let shaper = FallbackShaper;
    let renderer = SceneRenderer::new(RenderOpts::default(), &provider, &shaper);
    let mut s = RecordingSurface::new(100, 100);
    renderer
        .draw_node(&LayerContext::new(&Resources::new()), &node, 1.0, &mut s)
        .unwrap();

    let reach = std::f64::consts::SQRT_2;
    let expected = Rect::new(12.0 - reach, 2.0 - reach, 16.0 + reach, 6.0 + reach).expand();
    assert_eq!(
        provider.sizes(),
        vec![PixelSize::new(expected.width() as u32, expected.height() as u32)]
    );
}

#[test]
fn shadow_allocation_failure_keeps_children() {
    let node = SceneNode::new(
        1,
        NodeKind::Shadow {
            radius: 1.0,
            offset: Vec2::ZERO,
            color: Color::BLACK,
        },
    )
    .with_children(vec![unit_fill(2)]);
    let provider = RecordingProvider::new(16);
    let s = render_with(&provider, &Resources::new(), &node);
    assert_eq!(provider.allocations(), 0);
    assert_eq!(s.ops().len(), 1);
}

#[test]
fn pattern_paint_renders_a_tile_offscreen() {
    let resources = Resources::new().with(
        "Dots",
        PaintSource::Pattern {
            width: 4.0,
            height: 2.0,
            content: vec![unit_fill(10)],
            transform: Affine::IDENTITY,
        },
    );
    let node = fill(1, Rect::new(0.0, 0.0, 8.0, 8.0), Paint::reference("@Dots"));
    let provider = RecordingProvider::default();
    let s = render_with(&provider, &resources, &node);
    assert_eq!(provider.sizes(), vec![PixelSize::new(4, 2)]);
    let paint = s.paints().next().unwrap();
    assert!(matches!(&paint.shader, Shader::Pattern { tile, .. } if tile.size() == PixelSize::new(4, 2)));
}

#[test]
fn bounding_box_gradient_uses_path_bounds() {
    let paint = Paint {
        source: PaintSource::LinearGradient {
            start: Point::new(0.0, 0.0),
            end: Point::new(1.0, 0.0),
            stops: vec![
                GradientStop {
                    offset: 0.0,
                    color: Color::BLACK,
                },
                GradientStop {
                    offset: 1.0,
                    color: Color::WHITE,
                },
            ],
            spread: Default::default(),
            bounding_box: true,
            transform: Affine::IDENTITY,
        },
        opacity: 1.0,
    };
    let s = render(&fill(1, Rect::new(2.0, 2.0, 6.0, 4.0), paint));
    let p = s.paints().next().unwrap();
    assert!(matches!(
        &p.shader,
        Shader::Linear { start, end, .. }
            if *start == Point::new(2.0, 2.0) && *end == Point::new(6.0, 2.0)
    ));
}

fn text_node(anchor: TextAnchor, direction: LayoutDirection) -> SceneNode {
    let mut block = TextBlock::new("message", 50.0, 50.0);
    block.anchor = anchor;
    block.direction = direction;
    SceneNode::new(
        1,
        NodeKind::Text {
            text: block,
            ops: vec![PathOp::Fill {
                paint: Paint::color(Color::BLACK),
                fill_rule: FillRule::NonZero,
            }],
        },
    )
}

fn text_origin(node: &SceneNode) -> Point {
    match &render(node).ops()[0] {
        DrawOp::Text { origin, .. } => *origin,
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn text_anchor_follows_layout_direction() {
    let ltr_start = text_origin(&text_node(TextAnchor::Start, LayoutDirection::Ltr));
    let ltr_end = text_origin(&text_node(TextAnchor::End, LayoutDirection::Ltr));
    let rtl_start = text_origin(&text_node(TextAnchor::Start, LayoutDirection::Rtl));
    let rtl_end = text_origin(&text_node(TextAnchor::End, LayoutDirection::Rtl));
    assert_eq!(ltr_start.x, 50.0);
    assert!(ltr_end.x < ltr_start.x);
    assert!(rtl_end.x > rtl_start.x);
    assert_eq!(ltr_start.y, 50.0 - f64::from(0.9f32 * 16.0));
}

#[test]
fn overflowing_text_is_truncated_to_the_box() {
    let mut block = TextBlock::new("abcdefghij", 0.0, 10.0);
    block.font_size = 10.0;
    block.width = Some(31.0);
    block.height = Some(12.0);
    let node = SceneNode::new(
        1,
        NodeKind::Text {
            text: block,
            ops: vec![PathOp::Fill {
                paint: Paint::color(Color::BLACK),
                fill_rule: FillRule::NonZero,
            }],
        },
    );
    match &render(&node).ops()[0] {
        DrawOp::Text { text, .. } => {
            assert!(text.truncated);
            assert_eq!(text.line_count, 1);
            assert!(text.text.ends_with(ELLIPSIS));
        }
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn unfiltered_image_draws_first_source_region() {
    let src = Bitmap::filled(PixelSize::new(4, 4), RED).unwrap();
    let node = SceneNode::new(
        1,
        NodeKind::Image {
            sources: vec![src.clone()],
            filters: None,
            source_rect: Some(Rect::new(0.0, 0.0, 2.0, 2.0)),
            target: Rect::new(0.0, 0.0, 8.0, 8.0),
        },
    );
    match &render(&node).ops()[0] {
        DrawOp::Bitmap {
            bitmap, src: region, ..
        } => {
            assert!(bitmap.same_buffer(&src));
            assert_eq!(*region, Some(Rect::new(0.0, 0.0, 2.0, 2.0)));
        }
        other => panic!("expected bitmap, got {other:?}"),
    }
}

#[test]
fn empty_image_target_draws_nothing() {
    let node = SceneNode::new(
        1,
        NodeKind::Image {
            sources: vec![Bitmap::filled(PixelSize::new(1, 1), RED).unwrap()],
            filters: None,
            source_rect: None,
            target: Rect::new(0.0, 0.0, 0.0, 5.0),
        },
    );
    assert!(render(&node).ops().is_empty());
}
