use crate::foundation::error::{RenderError, RenderResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Size, Vec2};

/// Straight-alpha RGBA8 color as authored in documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::from_rgba8(0, 0, 0, 0);
    /// Opaque black.
    pub const BLACK: Self = Self::from_rgba8(0, 0, 0, 255);
    /// Opaque white.
    pub const WHITE: Self = Self::from_rgba8(255, 255, 255, 255);

    /// Build a color from straight RGBA8 channels.
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse(s: &str) -> RenderResult<Self> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| RenderError::validation(format!("color '{s}' must start with '#'")))?;
        let nibble = |c: u8| -> RenderResult<u8> {
            (c as char)
                .to_digit(16)
                .map(|v| v as u8)
                .ok_or_else(|| RenderError::validation(format!("invalid hex digit in '{s}'")))
        };
        let bytes = hex.as_bytes();
        match bytes.len() {
            3 => {
                let r = nibble(bytes[0])?;
                let g = nibble(bytes[1])?;
                let b = nibble(bytes[2])?;
                Ok(Self::from_rgba8(r * 17, g * 17, b * 17, 255))
            }
            6 | 8 => {
                let mut ch = [255u8; 4];
                for (i, pair) in bytes.chunks_exact(2).enumerate() {
                    ch[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
                }
                Ok(Self::from_rgba8(ch[0], ch[1], ch[2], ch[3]))
            }
            _ => Err(RenderError::validation(format!(
                "color '{s}' must have 3, 6 or 8 hex digits"
            ))),
        }
    }

    /// Scale the color's own alpha by a paint alpha (`0..=255`).
    pub fn modulate(self, alpha: u8) -> Self {
        Self {
            a: crate::foundation::math::mul_div255_u8(u16::from(self.a), u16::from(alpha)),
            ..self
        }
    }

    /// Premultiplied RGBA8 bytes.
    pub fn to_premul(self) -> [u8; 4] {
        let a = u16::from(self.a);
        let premul = |c: u8| crate::foundation::math::mul_div255_u8(u16::from(c), a);
        [premul(self.r), premul(self.g), premul(self.b), self.a]
    }

    /// `true` when the color has zero alpha.
    pub fn is_transparent(self) -> bool {
        self.a == 0
    }
}

impl TryFrom<String> for Color {
    type Error = RenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Integer pixel dimensions of a raster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Build a pixel size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when either side is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Byte length of a tightly packed RGBA8 buffer of this size.
    pub fn byte_len(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }

    /// Round a logical size up to whole pixels after scaling.
    pub fn from_scaled(size: Size, scale: f64) -> Self {
        let side = |v: f64| -> u32 {
            let px = (v * scale).ceil();
            if px.is_finite() && px > 0.0 {
                px.min(f64::from(u32::MAX)) as u32
            } else {
                0
            }
        };
        Self::new(side(size.width), side(size.height))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
