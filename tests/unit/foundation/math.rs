use super::*;

#[test]
fn canvas_scale_of_identity_is_one() {
    assert_eq!(canvas_scale(Affine::IDENTITY), 1.0);
}

#[test]
fn canvas_scale_takes_larger_axis() {
    assert_eq!(canvas_scale(Affine::scale_non_uniform(2.0, 3.0)), 3.0);
    assert_eq!(canvas_scale(Affine::translate((40.0, -7.0))), 1.0);
}

#[test]
fn canvas_scale_of_rotation_covers_bounding_box() {
    let s = canvas_scale(Affine::rotate(std::f64::consts::FRAC_PI_4));
    assert!((s - std::f64::consts::SQRT_2).abs() < 1e-9);
}

#[test]
fn degenerate_transform_falls_back_to_unit_scale() {
    assert_eq!(canvas_scale(Affine::scale(0.0)), 1.0);
}

#[test]
fn splitmix_is_deterministic() {
    let mut a = SplitMix64::new(42);
    let mut b = SplitMix64::new(42);
    for _ in 0..16 {
        assert_eq!(a.next_u64(), b.next_u64());
    }
    let mut c = SplitMix64::new(43);
    assert_ne!(SplitMix64::new(42).next_u64(), c.next_u64());
}

#[test]
fn uniform_samples_stay_in_unit_interval() {
    let mut rng = SplitMix64::new(7);
    for _ in 0..1000 {
        let v = rng.next_f32();
        assert!((0.0..1.0).contains(&v));
        assert!(rng.next_gaussian().is_finite());
    }
}

#[test]
fn fnv_treats_signed_zero_alike() {
    let mut a = Fnv1a64::new_default();
    a.write_f64(0.0);
    let mut b = Fnv1a64::new_default();
    b.write_f64(-0.0);
    assert_eq!(a.finish(), b.finish());
}

#[test]
fn mul_div255_rounds() {
    assert_eq!(mul_div255_u8(255, 255), 255);
    assert_eq!(mul_div255_u8(128, 255), 128);
    assert_eq!(mul_div255_u8(0, 200), 0);
}
