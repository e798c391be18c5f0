use super::*;
use crate::foundation::core::Color;

#[test]
fn records_transform_with_each_call() {
    let mut s = RecordingSurface::new(10, 10);
    s.save();
    s.concat(Affine::translate((3.0, 4.0)));
    s.fill_path(
        &BezPath::new(),
        &ResolvedPaint::solid(Color::BLACK),
        FillRule::NonZero,
    );
    s.restore();
    assert_eq!(s.transform(), Affine::IDENTITY);
    assert_eq!(s.save_depth(), 0);
    assert!(matches!(
        &s.ops()[1],
        DrawOp::Fill { transform, .. } if *transform == Affine::translate((3.0, 4.0))
    ));
    assert!(matches!(s.ops()[2], DrawOp::Restore));
}

#[test]
fn unbalanced_restore_is_ignored() {
    let mut s = RecordingSurface::new(1, 1);
    s.restore();
    assert!(s.ops().is_empty());
}

#[test]
fn provider_counts_and_limits_allocations() {
    let p = RecordingProvider::new(100);
    assert!(p.create_surface(PixelSize::new(5, 5)).is_ok());
    assert!(p.create_surface(PixelSize::new(50, 50)).is_err());
    assert!(p.create_surface(PixelSize::new(0, 5)).is_err());
    assert_eq!(p.allocations(), 1);
    assert_eq!(p.sizes(), vec![PixelSize::new(5, 5)]);
}
