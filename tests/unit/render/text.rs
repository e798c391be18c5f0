use super::*;

fn req(text: &str) -> TextRequest<'_> {
    TextRequest {
        text,
        font_size: 10.0,
        max_width: None,
        max_lines: None,
    }
}

#[test]
fn anchor_resolves_against_direction() {
    let x = 50.0;
    let w = 42.0;
    let ltr_start = anchor_origin_x(x, w, TextAnchor::Start, LayoutDirection::Ltr);
    let ltr_end = anchor_origin_x(x, w, TextAnchor::End, LayoutDirection::Ltr);
    let rtl_start = anchor_origin_x(x, w, TextAnchor::Start, LayoutDirection::Rtl);
    let rtl_end = anchor_origin_x(x, w, TextAnchor::End, LayoutDirection::Rtl);
    assert!(ltr_end < ltr_start);
    assert!(rtl_end > rtl_start);
    assert_eq!(
        anchor_origin_x(x, w, TextAnchor::Middle, LayoutDirection::Rtl),
        29.0
    );
}

#[test]
fn fallback_metrics_are_fixed() {
    let s = FallbackShaper.shape(&req("message")).unwrap();
    assert_eq!(s.line_count, 1);
    assert!((s.width - 42.0).abs() < 1e-4);
    assert!((s.height - 12.0).abs() < 1e-4);
    assert!((s.baseline - 9.0).abs() < 1e-4);
    assert_eq!(s.glyphs.len(), 7);
    assert_eq!(s.glyphs[0].id, u32::from('m'));
    assert!((s.glyphs[1].x - 6.0).abs() < 1e-4);
    assert!(s.font.is_none());
}

#[test]
fn fallback_wraps_on_width() {
    let mut r = req("abcdefghij");
    r.max_width = Some(24.0);
    let s = FallbackShaper.shape(&r).unwrap();
    assert_eq!(s.line_count, 3);
    assert!((s.glyphs[4].y - (9.0 + 12.0)).abs() < 1e-4);
    assert!(!s.truncated);
}

#[test]
fn fallback_line_limit_appends_ellipsis() {
    let mut r = req("abcdefghij");
    r.max_width = Some(24.0);
    r.max_lines = Some(2);
    let s = FallbackShaper.shape(&r).unwrap();
    assert_eq!(s.line_count, 2);
    assert!(s.truncated);
    assert_eq!(s.text, "abcd\nefg\u{2026}");
}

#[test]
fn lines_for_height_floors_and_keeps_one() {
    let s = FallbackShaper.shape(&req("x\ny\nz")).unwrap();
    assert_eq!(lines_for_height(30.0, &s), 2);
    assert_eq!(lines_for_height(3.0, &s), 1);
}

#[test]
fn invalid_font_size_is_rejected() {
    let mut r = req("x");
    r.font_size = 0.0;
    assert!(FallbackShaper.shape(&r).is_err());
}

#[test]
fn parley_rejects_bytes_without_fonts() {
    assert!(ParleyShaper::new(vec![1, 2, 3, 4]).is_err());
}
