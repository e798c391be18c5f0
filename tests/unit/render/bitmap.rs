use super::*;

fn gradient_bitmap(w: u32, h: u32) -> Bitmap {
    let mut px = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            px.extend_from_slice(&[x as u8, y as u8, 0, 255]);
        }
    }
    Bitmap::from_premul(PixelSize::new(w, h), px).unwrap()
}

#[test]
fn rejects_empty_and_mismatched_buffers() {
    assert!(matches!(
        Bitmap::transparent(PixelSize::new(0, 4)),
        Err(RenderError::Allocation(_))
    ));
    assert!(Bitmap::from_premul(PixelSize::new(2, 2), vec![0; 3]).is_err());
}

#[test]
fn filled_stores_premultiplied_pixels() {
    let b = Bitmap::filled(PixelSize::new(2, 1), Color::from_rgba8(255, 0, 0, 128)).unwrap();
    assert_eq!(b.pixel(0, 0), [128, 0, 0, 128]);
    assert_eq!(b.pixel(1, 0), [128, 0, 0, 128]);
    assert_eq!(b.pixel(5, 0), [0, 0, 0, 0]);
}

#[test]
fn fit_to_smaller_crops_top_left() {
    let b = gradient_bitmap(4, 4);
    let c = b.fit_to(PixelSize::new(2, 3)).unwrap();
    assert_eq!(c.size(), PixelSize::new(2, 3));
    assert_eq!(c.pixel(1, 2), [1, 2, 0, 255]);
}

#[test]
fn fit_to_larger_pads_with_transparent() {
    let b = gradient_bitmap(2, 2);
    let c = b.fit_to(PixelSize::new(3, 3)).unwrap();
    assert_eq!(c.size(), PixelSize::new(3, 3));
    assert_eq!(c.pixel(1, 1), [1, 1, 0, 255]);
    assert_eq!(c.pixel(2, 2), [0, 0, 0, 0]);
}

#[test]
fn fit_to_same_size_shares_buffer() {
    let b = gradient_bitmap(2, 2);
    let c = b.fit_to(PixelSize::new(2, 2)).unwrap();
    assert!(b.same_buffer(&c));
}

#[test]
fn alpha_mask_drops_color() {
    let b = Bitmap::filled(PixelSize::new(1, 1), Color::from_rgba8(200, 10, 10, 255)).unwrap();
    assert_eq!(b.alpha_mask().unwrap().pixel(0, 0), [0, 0, 0, 255]);
}

#[test]
fn last_handle_releases_pixels() {
    let b = gradient_bitmap(1, 1);
    let c = b.clone();
    let b = b.try_into_pixels().unwrap_err();
    drop(c);
    assert_eq!(b.try_into_pixels().unwrap().len(), 4);
}

#[test]
fn crop_rounds_out_and_clamps() {
    let b = gradient_bitmap(4, 4);
    let c = b.crop(Rect::new(1.5, 1.0, 9.0, 3.0)).unwrap();
    assert_eq!(c.size(), PixelSize::new(3, 2));
    assert_eq!(c.pixel(0, 0), [1, 1, 0, 255]);
    assert!(b.crop(Rect::new(-1.0, -1.0, 10.0, 10.0)).unwrap().same_buffer(&b));
    assert!(b.crop(Rect::new(5.0, 5.0, 6.0, 6.0)).is_err());
}
