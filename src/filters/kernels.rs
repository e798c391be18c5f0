//! CPU pixel kernels over premultiplied RGBA8 buffers.

use crate::filters::model::{BlendMode, NoiseKind};
use crate::foundation::error::{RenderError, RenderResult};
use crate::foundation::math::{SplitMix64, mul_div255_u8};

/// Largest accepted blur radius, in pixels.
pub const MAX_BLUR_RADIUS: f32 = 25.0;

/// Seed of the noise generator; fixed so output is reproducible.
pub const NOISE_SEED: u64 = 42;

/// Luminance weights of the grayscale conversion.
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Kernel radius and sigma for a blur radius in pixels.
///
/// The radius is clamped to `0..=MAX_BLUR_RADIUS`; sigma follows `0.4 * r + 0.6`.
pub fn blur_params(radius: f32) -> (u32, f32) {
    let r = if radius.is_finite() {
        radius.clamp(0.0, MAX_BLUR_RADIUS)
    } else {
        0.0
    };
    (r.ceil() as u32, 0.4 * r + 0.6)
}

/// Separable gaussian blur with edge clamping.
pub fn blur_rgba8_premul(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> RenderResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| RenderError::filter("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(RenderError::filter(
            "blur expects a buffer of width*height*4 bytes",
        ));
    }
    if radius == 0 || expected_len == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    horizontal_pass(src, &mut tmp, width, height, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> RenderResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(RenderError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(RenderError::filter("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Rounding drift goes to the center tap so the kernel sums to exactly 1.0.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                let idx = ((y * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                let idx = ((sy * w + x) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

/// Row-major 4x5 matrix interpolating between identity and full grayscale.
///
/// `amount` is clamped to `0..=1`; `0` is identity.
pub fn grayscale_matrix(amount: f32) -> [f32; 20] {
    let a = if amount.is_finite() {
        amount.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut m = [0.0f32; 20];
    for row in 0..3 {
        for col in 0..3 {
            let identity = if row == col { 1.0 } else { 0.0 };
            m[row * 5 + col] = (1.0 - a) * identity + a * LUMA[col];
        }
    }
    m[18] = 1.0;
    m
}

/// Saturation matrix; `1` is identity and `0` is full grayscale.
pub fn saturate_matrix(amount: f32) -> [f32; 20] {
    let s = if amount.is_finite() {
        amount.clamp(0.0, 1.0)
    } else {
        1.0
    };
    grayscale_matrix(1.0 - s)
}

/// Apply a row-major 4x5 matrix to straight-alpha colors in `0..=1`.
pub fn color_matrix_rgba8_premul(src: &[u8], dst: &mut [u8], m: [f32; 20]) -> RenderResult<()> {
    if src.len() != dst.len() || !src.len().is_multiple_of(4) {
        return Err(RenderError::filter(
            "color matrix expects equal-length rgba8 buffers",
        ));
    }
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let pa = f32::from(s[3]) / 255.0;
        let inv_a = if pa > 0.0 { 1.0 / pa } else { 0.0 };
        let r = f32::from(s[0]) / 255.0 * inv_a;
        let g = f32::from(s[1]) / 255.0 * inv_a;
        let b = f32::from(s[2]) / 255.0 * inv_a;
        let a = pa;

        let row = |i: usize| {
            (m[i] * r + m[i + 1] * g + m[i + 2] * b + m[i + 3] * a + m[i + 4]).clamp(0.0, 1.0)
        };
        let (out_r, out_g, out_b, out_a) = (row(0), row(5), row(10), row(15));

        d[0] = unit_to_u8(out_r * out_a);
        d[1] = unit_to_u8(out_g * out_a);
        d[2] = unit_to_u8(out_b * out_a);
        d[3] = unit_to_u8(out_a);
    }
    Ok(())
}

fn unit_to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

/// Composite `src` over `dst` in place with a separable blend mode.
pub fn blend_in_place(dst: &mut [u8], src: &[u8], mode: BlendMode) -> RenderResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(RenderError::filter(
            "blend expects equal-length rgba8 buffers",
        ));
    }
    // Dispatch once per call; each arm monomorphizes its own pixel loop.
    match mode {
        BlendMode::Normal => {
            premul_over_in_place(dst, src);
            Ok(())
        }
        BlendMode::Unknown => {
            tracing::warn!("unknown blend mode, using normal");
            premul_over_in_place(dst, src);
            Ok(())
        }
        BlendMode::Multiply => blend_with(dst, src, |s, d| s * d),
        BlendMode::Screen => blend_with(dst, src, |s, d| s + d - s * d),
        BlendMode::Overlay => blend_with(dst, src, |s, d| hard_light(d, s)),
        BlendMode::Darken => blend_with(dst, src, |s, d| s.min(d)),
        BlendMode::Lighten => blend_with(dst, src, |s, d| s.max(d)),
        BlendMode::ColorDodge => blend_with(dst, src, |s, d| {
            if s >= 1.0 { 1.0 } else { (d / (1.0 - s)).min(1.0) }
        }),
        BlendMode::ColorBurn => blend_with(dst, src, |s, d| {
            if s <= 0.0 { 0.0 } else { 1.0 - ((1.0 - d) / s).min(1.0) }
        }),
        BlendMode::HardLight => blend_with(dst, src, hard_light),
        BlendMode::SoftLight => blend_with(dst, src, |s, d| {
            if s <= 0.5 {
                d - (1.0 - 2.0 * s) * d * (1.0 - d)
            } else {
                let g = if d <= 0.25 {
                    ((16.0 * d - 12.0) * d + 4.0) * d
                } else {
                    d.sqrt()
                };
                d + (2.0 * s - 1.0) * (g - d)
            }
        }),
        BlendMode::Difference => blend_with(dst, src, |s, d| (d - s).abs()),
        BlendMode::Exclusion => blend_with(dst, src, |s, d| d + s - 2.0 * d * s),
    }
}

fn hard_light(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        2.0 * s * d
    } else {
        1.0 - 2.0 * (1.0 - s) * (1.0 - d)
    }
}

fn premul_over_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = s[3];
        if sa == 0 {
            continue;
        }
        let inv = 255u16 - u16::from(sa);
        for c in 0..4 {
            d[c] = add_sat_u8(s[c], mul_div255_u8(u16::from(d[c]), inv));
        }
    }
}

#[inline(always)]
fn blend_with<F>(dst: &mut [u8], src: &[u8], blend_fn: F) -> RenderResult<()>
where
    F: Fn(f32, f32) -> f32,
{
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        // Source-over with the blend applied to straight channels:
        // out_a = sa + da * (1 - sa)
        // out_p = sp * (1 - da) + dp * (1 - sa) + B(sc, dc) * sa * da
        let sp = [s[0], s[1], s[2]].map(|c| f32::from(c) / 255.0);
        let dp = [d[0], d[1], d[2]].map(|c| f32::from(c) / 255.0);
        let sa = f32::from(s[3]) / 255.0;
        let da = f32::from(d[3]) / 255.0;

        let straight = |p: f32, a: f32| if a > 0.0 { (p / a).clamp(0.0, 1.0) } else { 0.0 };
        for c in 0..3 {
            let b = blend_fn(straight(sp[c], sa), straight(dp[c], da)).clamp(0.0, 1.0);
            let out = sp[c] * (1.0 - da) + dp[c] * (1.0 - sa) + b * sa * da;
            d[c] = unit_to_u8(out.clamp(0.0, 1.0));
        }
        d[3] = unit_to_u8((sa + da * (1.0 - sa)).clamp(0.0, 1.0));
    }
    Ok(())
}

/// Add deterministic noise in place.
///
/// Pixels are visited in row-major order from a generator seeded with [`NOISE_SEED`]. With
/// `use_color` every color channel draws its own sample; otherwise one sample offsets all
/// three. Channels stay premultiplied: results are clamped to `0..=alpha`.
pub fn noise_in_place(px: &mut [u8], kind: NoiseKind, sigma: f32, use_color: bool) {
    let sigma = if sigma.is_finite() { sigma.max(0.0) } else { 0.0 };
    let mut rng = SplitMix64::new(NOISE_SEED);
    let mut sample = || match kind {
        NoiseKind::Uniform => (2.0 * rng.next_f32() - 1.0) * sigma,
        NoiseKind::Gaussian => rng.next_gaussian() * sigma,
    };
    for p in px.chunks_exact_mut(4) {
        let a = f32::from(p[3]);
        let shared = if use_color { 0.0 } else { sample() };
        for c in p.iter_mut().take(3) {
            let n = if use_color { sample() } else { shared };
            *c = (f32::from(*c) + n).round().clamp(0.0, a) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/kernels.rs"]
mod tests;
