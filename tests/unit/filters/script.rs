use super::*;
use crate::foundation::core::Color;

#[test]
fn scope_destroys_handles_on_drop() {
    let cpu = CpuScripts::new();
    let src = Bitmap::filled(PixelSize::new(2, 2), Color::WHITE).unwrap();
    {
        let mut scope = ScriptScope::new(&cpu);
        scope.allocation_from_bitmap(&src).unwrap();
        scope.allocation(PixelSize::new(2, 2)).unwrap();
        scope.script(ScriptKind::Blur).unwrap();
        let s = cpu.stats();
        assert_eq!(s.live_allocations, 2);
        assert_eq!(s.live_scripts, 1);
    }
    let s = cpu.stats();
    assert_eq!(s.live_allocations, 0);
    assert_eq!(s.live_scripts, 0);
    assert_eq!(s.created_allocations, 2);
    assert_eq!(s.created_scripts, 1);
}

#[test]
fn scope_releases_on_error_path() {
    let cpu = CpuScripts::new().failing_on(ScriptKind::Blend);
    let a = Bitmap::filled(PixelSize::new(1, 1), Color::WHITE).unwrap();
    let run = || -> RenderResult<Bitmap> {
        let mut scope = ScriptScope::new(&cpu);
        let s = scope.allocation_from_bitmap(&a)?;
        let d = scope.allocation_from_bitmap(&a)?;
        let script = scope.script(ScriptKind::Blend)?;
        scope.backend().blend(script, BlendMode::Normal, s, d)?;
        scope.backend().copy_to_bitmap(d, &BitmapPool::default())
    };
    assert!(matches!(run(), Err(RenderError::Filter(_))));
    assert_eq!(cpu.stats().live_allocations, 0);
    assert_eq!(cpu.stats().live_scripts, 0);
}

#[test]
fn blend_runs_in_place_on_destination() {
    let cpu = CpuScripts::new();
    let pool = BitmapPool::default();
    let src = Bitmap::filled(PixelSize::new(1, 1), Color::from_rgba8(0, 255, 255, 255)).unwrap();
    let dst = Bitmap::filled(PixelSize::new(1, 1), Color::from_rgba8(255, 255, 0, 255)).unwrap();
    let mut scope = ScriptScope::new(&cpu);
    let s = scope.allocation_from_bitmap(&src).unwrap();
    let d = scope.allocation_from_bitmap(&dst).unwrap();
    let script = scope.script(ScriptKind::Blend).unwrap();
    cpu.blend(script, BlendMode::Multiply, s, d).unwrap();
    let out = cpu.copy_to_bitmap(d, &pool).unwrap();
    assert_eq!(out.pixel(0, 0), [0, 255, 0, 255]);
    assert_eq!(dst.pixel(0, 0), [255, 255, 0, 255]);
}

#[test]
fn script_kind_must_match_operation() {
    let cpu = CpuScripts::new();
    let mut scope = ScriptScope::new(&cpu);
    let a = scope.allocation(PixelSize::new(1, 1)).unwrap();
    let b = scope.allocation(PixelSize::new(1, 1)).unwrap();
    let script = scope.script(ScriptKind::ColorMatrix).unwrap();
    assert!(cpu.blur(script, 2.0, a, b).is_err());
    assert!(cpu.color_matrix(script, [0.0; 20], a, b).is_ok());
}

#[test]
fn blur_output_must_match_input_size() {
    let cpu = CpuScripts::new();
    let mut scope = ScriptScope::new(&cpu);
    let a = scope.allocation(PixelSize::new(2, 2)).unwrap();
    let b = scope.allocation(PixelSize::new(3, 3)).unwrap();
    let script = scope.script(ScriptKind::Blur).unwrap();
    assert!(cpu.blur(script, 2.0, a, b).is_err());
}

#[test]
fn empty_allocation_is_an_allocation_error() {
    let cpu = CpuScripts::new();
    assert!(matches!(
        cpu.create_allocation(PixelSize::new(0, 3)),
        Err(RenderError::Allocation(_))
    ));
}
