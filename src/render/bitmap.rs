use std::fmt;
use std::sync::Arc;

use crate::foundation::core::{Color, PixelSize, Rect};
use crate::foundation::error::{RenderError, RenderResult};

struct BitmapData {
    size: PixelSize,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pixels: Vec<u8>,
}

/// Shared, immutable premultiplied RGBA8 raster.
///
/// Cloning is cheap and shares pixels. Processing steps always produce a new bitmap, so a
/// bitmap handed to a collaborator is never mutated underneath other holders.
#[derive(Clone)]
pub struct Bitmap {
    inner: Arc<BitmapData>,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.inner.size.width)
            .field("height", &self.inner.size.height)
            .finish()
    }
}

impl Bitmap {
    /// Wrap premultiplied RGBA8 pixels.
    pub fn from_premul(size: PixelSize, pixels: Vec<u8>) -> RenderResult<Self> {
        if size.is_empty() {
            return Err(RenderError::allocation(format!(
                "bitmap size {}x{} is empty",
                size.width, size.height
            )));
        }
        if pixels.len() != size.byte_len() {
            return Err(RenderError::validation(format!(
                "bitmap byte length {} does not match {}x{}",
                pixels.len(),
                size.width,
                size.height
            )));
        }
        Ok(Self {
            inner: Arc::new(BitmapData { size, pixels }),
        })
    }

    /// Allocate a fully transparent bitmap.
    pub fn transparent(size: PixelSize) -> RenderResult<Self> {
        Self::from_premul(size, vec![0u8; size.byte_len()])
    }

    /// Allocate a bitmap filled with one straight-alpha color.
    pub fn filled(size: PixelSize, color: Color) -> RenderResult<Self> {
        let px = color.to_premul();
        let mut pixels = vec![0u8; size.byte_len()];
        for chunk in pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        Self::from_premul(size, pixels)
    }

    /// Pixel dimensions.
    pub fn size(&self) -> PixelSize {
        self.inner.size
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.inner.size.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.inner.size.height
    }

    /// Premultiplied RGBA8 bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.inner.pixels
    }

    /// Premultiplied RGBA8 value at `(x, y)`, transparent outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width() || y >= self.height() {
            return [0; 4];
        }
        let i = ((y as usize) * (self.width() as usize) + (x as usize)) * 4;
        let p = &self.inner.pixels[i..i + 4];
        [p[0], p[1], p[2], p[3]]
    }

    /// `true` when both handles share the same pixel buffer.
    pub fn same_buffer(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Take the pixel buffer when this is the last handle.
    pub(crate) fn try_into_pixels(self) -> Result<Vec<u8>, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(data) => Ok(data.pixels),
            Err(inner) => Err(Self { inner }),
        }
    }

    /// Produce a bitmap of exactly `size`.
    ///
    /// The overlapping top-left region is copied: a smaller target crops, a larger target is
    /// padded with transparent pixels. Same-size requests share the buffer.
    pub fn fit_to(&self, size: PixelSize) -> RenderResult<Bitmap> {
        if size == self.size() {
            return Ok(self.clone());
        }
        let mut out = vec![0u8; size.byte_len()];
        let copy_w = size.width.min(self.width()) as usize;
        let copy_h = size.height.min(self.height()) as usize;
        let src_stride = self.width() as usize * 4;
        let dst_stride = size.width as usize * 4;
        for y in 0..copy_h {
            let s = y * src_stride;
            let d = y * dst_stride;
            out[d..d + copy_w * 4].copy_from_slice(&self.inner.pixels[s..s + copy_w * 4]);
        }
        Bitmap::from_premul(size, out)
    }

    /// Copy the region inside `rect`, rounded out to whole pixels and clamped to the raster.
    pub fn crop(&self, rect: Rect) -> RenderResult<Bitmap> {
        let x0 = rect.x0.floor().clamp(0.0, f64::from(self.width())) as u32;
        let y0 = rect.y0.floor().clamp(0.0, f64::from(self.height())) as u32;
        let x1 = rect.x1.ceil().clamp(0.0, f64::from(self.width())) as u32;
        let y1 = rect.y1.ceil().clamp(0.0, f64::from(self.height())) as u32;
        if x0 == 0 && y0 == 0 && x1 == self.width() && y1 == self.height() {
            return Ok(self.clone());
        }
        let size = PixelSize::new(x1.saturating_sub(x0), y1.saturating_sub(y0));
        let mut out = Vec::with_capacity(size.byte_len());
        let stride = self.width() as usize * 4;
        for y in y0..y1 {
            let row = y as usize * stride;
            out.extend_from_slice(&self.inner.pixels[row + x0 as usize * 4..row + x1 as usize * 4]);
        }
        Bitmap::from_premul(size, out)
    }

    /// Keep only the alpha channel, as premultiplied black.
    pub fn alpha_mask(&self) -> RenderResult<Bitmap> {
        let mut out = vec![0u8; self.size().byte_len()];
        for (d, s) in out
            .chunks_exact_mut(4)
            .zip(self.inner.pixels.chunks_exact(4))
        {
            d[3] = s[3];
        }
        Bitmap::from_premul(self.size(), out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/bitmap.rs"]
mod tests;
