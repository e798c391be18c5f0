use std::sync::Arc;

use parking_lot::Mutex;

use crate::foundation::error::{RenderError, RenderResult};
use crate::scene::model::{LayoutDirection, TextAnchor};

/// Truncation indicator appended to the last visible line.
pub const ELLIPSIS: char = '\u{2026}';

/// One glyph positioned relative to the top-left of the laid-out block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionedGlyph {
    /// Glyph id in the font, or the code point for metric-only layouts.
    pub id: u32,
    /// Pen x.
    pub x: f32,
    /// Baseline y.
    pub y: f32,
}

/// Result of shaping and line breaking a text block.
///
/// Layouts are shared read-only between draw calls; paints are supplied at draw time.
#[derive(Clone, Debug, Default)]
pub struct ShapedText {
    /// Text actually laid out, including an appended ellipsis.
    pub text: String,
    /// Positioned glyphs of every line.
    pub glyphs: Vec<PositionedGlyph>,
    /// Width of the widest line.
    pub width: f32,
    /// Total height of all lines.
    pub height: f32,
    /// Average line height.
    pub line_height: f32,
    /// Number of lines.
    pub line_count: usize,
    /// Baseline of the first line, from the top of the block.
    pub baseline: f32,
    /// `true` when content was cut to honor a line limit.
    pub truncated: bool,
    /// Font size the glyphs were shaped at.
    pub font_size: f32,
    /// Font the glyph ids refer to. `None` for metric-only layouts.
    pub font: Option<Arc<Vec<u8>>>,
}

/// Parameters of one shaping request.
#[derive(Clone, Copy, Debug)]
pub struct TextRequest<'a> {
    /// Text to lay out.
    pub text: &'a str,
    /// Font size.
    pub font_size: f32,
    /// Wrapping width, unbounded when `None`.
    pub max_width: Option<f32>,
    /// Line limit; overflowing content ends in [`ELLIPSIS`].
    pub max_lines: Option<u32>,
}

/// Typeface lookup and shaping collaborator.
pub trait TextShaper {
    /// Shape and break `req` into lines.
    fn shape(&self, req: &TextRequest<'_>) -> RenderResult<ShapedText>;
}

/// Horizontal origin of a block of `width` anchored at `x`.
///
/// `start` is the leading edge for the layout direction: left for LTR, right for RTL.
pub fn anchor_origin_x(x: f64, width: f64, anchor: TextAnchor, direction: LayoutDirection) -> f64 {
    match (anchor, direction) {
        (TextAnchor::Start, LayoutDirection::Ltr) | (TextAnchor::End, LayoutDirection::Rtl) => x,
        (TextAnchor::Middle, _) => x - width / 2.0,
        (TextAnchor::End, LayoutDirection::Ltr) | (TextAnchor::Start, LayoutDirection::Rtl) => {
            x - width
        }
    }
}

/// Line cap used when content overflows an allotted height.
pub fn lines_for_height(box_height: f32, shaped: &ShapedText) -> u32 {
    if shaped.line_height <= 0.0 || !box_height.is_finite() {
        return 1;
    }
    ((box_height / shaped.line_height).floor() as u32).max(1)
}

fn validate_size(size: f32) -> RenderResult<()> {
    if !size.is_finite() || size <= 0.0 {
        return Err(RenderError::validation(
            "text font_size must be finite and > 0",
        ));
    }
    Ok(())
}

/// Deterministic shaper with fixed advance metrics.
///
/// Each character advances `0.6 * size`, lines are `1.2 * size` tall and wrap on character
/// boundaries. Useful when no font is available, and as a stable reference in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackShaper;

impl FallbackShaper {
    const ADVANCE: f32 = 0.6;
    const LINE_HEIGHT: f32 = 1.2;
    const ASCENT: f32 = 0.9;
}

impl TextShaper for FallbackShaper {
    fn shape(&self, req: &TextRequest<'_>) -> RenderResult<ShapedText> {
        validate_size(req.font_size)?;
        let advance = Self::ADVANCE * req.font_size;
        let line_h = Self::LINE_HEIGHT * req.font_size;
        let per_line = req
            .max_width
            .map(|w| ((w / advance).floor() as usize).max(1))
            .unwrap_or(usize::MAX);

        let mut lines: Vec<Vec<char>> = Vec::new();
        for para in req.text.split('\n') {
            let chars: Vec<char> = para.chars().collect();
            if chars.is_empty() {
                lines.push(Vec::new());
                continue;
            }
            lines.extend(chars.chunks(per_line).map(<[char]>::to_vec));
        }

        let mut truncated = false;
        if let Some(max) = req.max_lines.map(|m| m.max(1) as usize)
            && lines.len() > max
        {
            lines.truncate(max);
            if let Some(last) = lines.last_mut() {
                if last.len() >= per_line {
                    last.truncate(per_line.saturating_sub(1));
                }
                last.push(ELLIPSIS);
            }
            truncated = true;
        }

        let baseline = Self::ASCENT * req.font_size;
        let mut glyphs = Vec::new();
        let mut width = 0.0f32;
        for (li, line) in lines.iter().enumerate() {
            let y = baseline + li as f32 * line_h;
            for (ci, c) in line.iter().enumerate() {
                glyphs.push(PositionedGlyph {
                    id: u32::from(*c),
                    x: ci as f32 * advance,
                    y,
                });
            }
            width = width.max(line.len() as f32 * advance);
        }

        let text = lines
            .iter()
            .map(|l| l.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ShapedText {
            text,
            glyphs,
            width,
            height: lines.len() as f32 * line_h,
            line_height: line_h,
            line_count: lines.len(),
            baseline,
            truncated,
            font_size: req.font_size,
            font: None,
        })
    }
}

struct ParleyContexts {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<()>,
}

/// Shaper backed by `parley`, using one registered font.
pub struct ParleyShaper {
    font: Arc<Vec<u8>>,
    family: String,
    contexts: Mutex<ParleyContexts>,
}

impl ParleyShaper {
    /// Register `font_bytes` and shape with its first family.
    pub fn new(font_bytes: Vec<u8>) -> RenderResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            RenderError::validation("no font families registered from font bytes")
        })?;
        let family = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| RenderError::validation("registered font family has no name"))?
            .to_string();
        Ok(Self {
            font: Arc::new(font_bytes),
            family,
            contexts: Mutex::new(ParleyContexts {
                font_ctx,
                layout_ctx: parley::LayoutContext::new(),
            }),
        })
    }

    /// Family name the font registered under.
    pub fn family(&self) -> &str {
        &self.family
    }

    fn layout(
        &self,
        cx: &mut ParleyContexts,
        text: &str,
        size: f32,
        max_width: Option<f32>,
    ) -> parley::Layout<()> {
        let ParleyContexts {
            font_ctx,
            layout_ctx,
        } = cx;
        let mut builder = layout_ctx.ranged_builder(font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size));
        let mut layout: parley::Layout<()> = builder.build(text);
        layout.break_all_lines(max_width);
        layout.align(
            max_width,
            parley::Alignment::Start,
            parley::AlignmentOptions::default(),
        );
        layout
    }

    fn collect(&self, layout: &parley::Layout<()>, text: String, truncated: bool, size: f32) -> ShapedText {
        let mut glyphs = Vec::new();
        let mut baseline = None;
        for line in layout.lines() {
            baseline.get_or_insert(line.metrics().baseline);
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                glyphs.extend(run.positioned_glyphs().map(|g| PositionedGlyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                }));
            }
        }
        let line_count = layout.len();
        let height = layout.height();
        ShapedText {
            text,
            glyphs,
            width: layout.width(),
            height,
            line_height: if line_count > 0 {
                height / line_count as f32
            } else {
                0.0
            },
            line_count,
            baseline: baseline.unwrap_or(0.0),
            truncated,
            font_size: size,
            font: Some(self.font.clone()),
        }
    }
}

impl TextShaper for ParleyShaper {
    fn shape(&self, req: &TextRequest<'_>) -> RenderResult<ShapedText> {
        validate_size(req.font_size)?;
        let mut cx = self.contexts.lock();
        let layout = self.layout(&mut cx, req.text, req.font_size, req.max_width);

        let Some(max) = req.max_lines.map(|m| m.max(1) as usize) else {
            return Ok(self.collect(&layout, req.text.to_owned(), false, req.font_size));
        };
        if layout.len() <= max {
            return Ok(self.collect(&layout, req.text.to_owned(), false, req.font_size));
        }

        // Cut after the last allowed line, then shorten until text plus ellipsis fits.
        let cut = layout
            .get(max - 1)
            .map(|line| line.text_range().end)
            .unwrap_or(req.text.len());
        let mut kept = req.text[..cut].trim_end().to_owned();
        loop {
            let candidate = format!("{kept}{ELLIPSIS}");
            let layout = self.layout(&mut cx, &candidate, req.font_size, req.max_width);
            if layout.len() <= max || kept.is_empty() {
                return Ok(self.collect(&layout, candidate, true, req.font_size));
            }
            kept.pop();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/text.rs"]
mod tests;
