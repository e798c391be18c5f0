use kurbo::{ParamCurveArclen, Shape};

use crate::foundation::core::{BezPath, Point, Rect};
use crate::scene::model::PathDesc;

/// Bezier handle length for a quarter circle.
const KAPPA: f64 = 0.552_284_749_8;

/// Build a concrete path from an abstract description.
///
/// Never fails: malformed opcode streams are logged and the readable part is kept.
pub fn to_bezpath(desc: &PathDesc) -> BezPath {
    match desc {
        PathDesc::General { ops, points } => general_path(ops, points),
        PathDesc::Rect { rect } => {
            let mut p = BezPath::new();
            push_rect(&mut p, *rect);
            p
        }
        PathDesc::RRect { rect, radii } => {
            let mut p = BezPath::new();
            push_rrect(&mut p, *rect, *radii, Winding::Clockwise);
            p
        }
        PathDesc::Frame { rect, radii, inset } => frame_path(*rect, *radii, *inset),
    }
}

/// Interpret an opcode string against a flat coordinate buffer.
///
/// `M` and `L` consume 2 coordinates, `Q` 4, `C` 6, `Z` none. Unknown opcodes are skipped.
/// A command whose coordinates run past the buffer ends the path there.
pub fn general_path(ops: &str, points: &[f32]) -> BezPath {
    let mut out = BezPath::new();
    let mut cursor = 0usize;
    let mut open = false;

    for op in ops.chars() {
        let need = match op {
            'M' | 'L' => 2,
            'Q' => 4,
            'C' => 6,
            'Z' => 0,
            other => {
                tracing::warn!(opcode = %other, "skipping unknown path opcode");
                continue;
            }
        };
        let Some(c) = points.get(cursor..cursor + need) else {
            tracing::warn!(opcode = %op, "path coordinates exhausted");
            break;
        };
        cursor += need;
        match op {
            'M' => {
                out.move_to(pt(c, 0));
                open = true;
            }
            'Z' => {
                if open {
                    out.close_path();
                }
            }
            _ => {
                // Drawing commands before any move start at the origin.
                if !open {
                    out.move_to(Point::ZERO);
                    open = true;
                }
                match op {
                    'L' => out.line_to(pt(c, 0)),
                    'Q' => out.quad_to(pt(c, 0), pt(c, 2)),
                    _ => out.curve_to(pt(c, 0), pt(c, 2), pt(c, 4)),
                }
            }
        }
    }
    out
}

fn pt(c: &[f32], i: usize) -> Point {
    Point::new(f64::from(c[i]), f64::from(c[i + 1]))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Winding {
    Clockwise,
    CounterClockwise,
}

/// Closed clockwise rectangle contour.
fn push_rect(p: &mut BezPath, r: Rect) {
    p.move_to((r.x0, r.y0));
    p.line_to((r.x1, r.y0));
    p.line_to((r.x1, r.y1));
    p.line_to((r.x0, r.y1));
    p.close_path();
}

/// Shrink radii proportionally so adjacent corners never overlap.
fn fit_radii(r: Rect, radii: [f64; 4]) -> [f64; 4] {
    let mut radii = radii.map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
    let w = r.width().abs();
    let h = r.height().abs();
    let sums = [
        (radii[0] + radii[1], w),
        (radii[2] + radii[3], w),
        (radii[1] + radii[2], h),
        (radii[3] + radii[0], h),
    ];
    let scale = sums
        .iter()
        .filter(|(sum, _)| *sum > 0.0)
        .map(|(sum, side)| side / sum)
        .fold(1.0f64, f64::min);
    if scale < 1.0 {
        for v in &mut radii {
            *v *= scale;
        }
    }
    radii
}

/// Rounded rectangle contour with radii ordered top-left, top-right, bottom-right, bottom-left.
fn push_rrect(p: &mut BezPath, r: Rect, radii: [f64; 4], winding: Winding) {
    let r = r.abs();
    let [tl, tr, br, bl] = fit_radii(r, radii);
    if tl == 0.0 && tr == 0.0 && br == 0.0 && bl == 0.0 {
        match winding {
            Winding::Clockwise => push_rect(p, r),
            Winding::CounterClockwise => {
                p.move_to((r.x0, r.y0));
                p.line_to((r.x0, r.y1));
                p.line_to((r.x1, r.y1));
                p.line_to((r.x1, r.y0));
                p.close_path();
            }
        }
        return;
    }

    let k = 1.0 - KAPPA;
    match winding {
        Winding::Clockwise => {
            p.move_to((r.x0 + tl, r.y0));
            p.line_to((r.x1 - tr, r.y0));
            if tr > 0.0 {
                p.curve_to(
                    (r.x1 - tr * k, r.y0),
                    (r.x1, r.y0 + tr * k),
                    (r.x1, r.y0 + tr),
                );
            }
            p.line_to((r.x1, r.y1 - br));
            if br > 0.0 {
                p.curve_to(
                    (r.x1, r.y1 - br * k),
                    (r.x1 - br * k, r.y1),
                    (r.x1 - br, r.y1),
                );
            }
            p.line_to((r.x0 + bl, r.y1));
            if bl > 0.0 {
                p.curve_to(
                    (r.x0 + bl * k, r.y1),
                    (r.x0, r.y1 - bl * k),
                    (r.x0, r.y1 - bl),
                );
            }
            p.line_to((r.x0, r.y0 + tl));
            if tl > 0.0 {
                p.curve_to(
                    (r.x0, r.y0 + tl * k),
                    (r.x0 + tl * k, r.y0),
                    (r.x0 + tl, r.y0),
                );
            }
        }
        Winding::CounterClockwise => {
            p.move_to((r.x0 + tl, r.y0));
            if tl > 0.0 {
                p.curve_to(
                    (r.x0 + tl * k, r.y0),
                    (r.x0, r.y0 + tl * k),
                    (r.x0, r.y0 + tl),
                );
            }
            p.line_to((r.x0, r.y1 - bl));
            if bl > 0.0 {
                p.curve_to(
                    (r.x0, r.y1 - bl * k),
                    (r.x0 + bl * k, r.y1),
                    (r.x0 + bl, r.y1),
                );
            }
            p.line_to((r.x1 - br, r.y1));
            if br > 0.0 {
                p.curve_to(
                    (r.x1 - br * k, r.y1),
                    (r.x1, r.y1 - br * k),
                    (r.x1, r.y1 - br),
                );
            }
            p.line_to((r.x1, r.y0 + tr));
            if tr > 0.0 {
                p.curve_to(
                    (r.x1, r.y0 + tr * k),
                    (r.x1 - tr * k, r.y0),
                    (r.x1 - tr, r.y0),
                );
            }
        }
    }
    p.close_path();
}

/// Outer rounded contour plus an inner contour of opposite winding, inset by `inset`.
///
/// Filling with either rule yields the ring between the two contours.
pub fn frame_path(rect: Rect, radii: [f64; 4], inset: f64) -> BezPath {
    let mut p = BezPath::new();
    let outer = rect.abs();
    push_rrect(&mut p, outer, radii, Winding::Clockwise);

    let inset = inset.max(0.0);
    let inner = outer.inset(-inset);
    if inner.width() > 0.0 && inner.height() > 0.0 {
        let inner_radii = fit_radii(outer, radii).map(|r| (r - inset).max(0.0));
        push_rrect(&mut p, inner, inner_radii, Winding::CounterClockwise);
    }
    p
}

/// Total arc length of every contour of `path`.
pub fn path_length(path: &BezPath, accuracy: f64) -> f64 {
    path.segments().map(|seg| seg.arclen(accuracy)).sum()
}

/// Bounds of a path, `None` for empty paths.
pub fn path_bounds(path: &BezPath) -> Option<Rect> {
    if path.elements().is_empty() {
        None
    } else {
        Some(path.bounding_box())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/path.rs"]
mod tests;
