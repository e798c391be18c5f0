use super::*;
use kurbo::PathEl;

#[test]
fn general_path_consumes_fixed_coordinate_counts() {
    let p = general_path("MLQCZ", &[0., 0., 10., 0., 15., 5., 10., 10., 8., 12., 4., 12., 0., 10.]);
    let els = p.elements();
    assert_eq!(els.len(), 5);
    assert_eq!(els[0], PathEl::MoveTo(Point::new(0.0, 0.0)));
    assert_eq!(els[1], PathEl::LineTo(Point::new(10.0, 0.0)));
    assert_eq!(
        els[2],
        PathEl::QuadTo(Point::new(15.0, 5.0), Point::new(10.0, 10.0))
    );
    assert!(matches!(els[3], PathEl::CurveTo(_, _, p) if p == Point::new(0.0, 10.0)));
    assert_eq!(els[4], PathEl::ClosePath);
}

#[test]
fn unknown_opcodes_are_skipped_not_fatal() {
    let p = general_path("MX?L", &[1., 2., 3., 4.]);
    assert_eq!(
        p.elements(),
        &[
            PathEl::MoveTo(Point::new(1.0, 2.0)),
            PathEl::LineTo(Point::new(3.0, 4.0))
        ]
    );
}

#[test]
fn exhausted_coordinates_keep_the_readable_prefix() {
    let p = general_path("MLL", &[0., 0., 5., 5., 9.]);
    assert_eq!(p.elements().len(), 2);
}

#[test]
fn rect_contour_is_closed_and_clockwise() {
    let p = to_bezpath(&PathDesc::Rect {
        rect: Rect::new(0.0, 0.0, 10.0, 4.0),
    });
    assert_eq!(p.elements().last(), Some(&PathEl::ClosePath));
    assert!((p.area() - 40.0).abs() < 1e-9);
}

#[test]
fn rrect_area_matches_rounded_corners() {
    let p = to_bezpath(&PathDesc::RRect {
        rect: Rect::new(0.0, 0.0, 20.0, 20.0),
        radii: [5.0, 5.0, 5.0, 5.0],
    });
    let expected = 400.0 - (4.0 - std::f64::consts::PI) * 25.0;
    assert!(p.area() > 0.0);
    assert!((p.area() - expected).abs() < 0.5, "area {}", p.area());
}

#[test]
fn oversized_radii_are_fitted() {
    let p = to_bezpath(&PathDesc::RRect {
        rect: Rect::new(0.0, 0.0, 10.0, 10.0),
        radii: [50.0, 50.0, 50.0, 50.0],
    });
    let b = p.bounding_box();
    assert!((b.width() - 10.0).abs() < 1e-9);
    assert!((b.height() - 10.0).abs() < 1e-9);
}

#[test]
fn frame_is_a_ring_with_opposite_windings() {
    let p = to_bezpath(&PathDesc::Frame {
        rect: Rect::new(0.0, 0.0, 10.0, 10.0),
        radii: [0.0; 4],
        inset: 2.0,
    });
    let closes = p
        .elements()
        .iter()
        .filter(|e| matches!(e, PathEl::ClosePath))
        .count();
    assert_eq!(closes, 2);
    assert!((p.area() - 64.0).abs() < 1e-9);
}

#[test]
fn frame_wider_than_rect_keeps_only_outer_contour() {
    let p = frame_path(Rect::new(0.0, 0.0, 4.0, 4.0), [1.0; 4], 3.0);
    let closes = p
        .elements()
        .iter()
        .filter(|e| matches!(e, PathEl::ClosePath))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn path_length_sums_every_contour() {
    let mut p = to_bezpath(&PathDesc::Rect {
        rect: Rect::new(0.0, 0.0, 10.0, 10.0),
    });
    p.extend(general_path("ML", &[20., 0., 23., 4.]));
    assert!((path_length(&p, 1e-6) - 45.0).abs() < 1e-6);
}

#[test]
fn empty_path_has_no_bounds() {
    assert!(path_bounds(&BezPath::new()).is_none());
    let p = general_path("ML", &[1., 1., 3., 5.]);
    assert_eq!(path_bounds(&p), Some(Rect::new(1.0, 1.0, 3.0, 5.0)));
}
