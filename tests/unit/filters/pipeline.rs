use std::sync::mpsc;
use std::time::Duration;

use super::*;
use crate::filters::script::ScriptStats;
use crate::foundation::core::Color;

const RED: Color = Color::from_rgba8(255, 0, 0, 255);
const BLUE: Color = Color::from_rgba8(0, 0, 255, 255);

fn opts(threads: usize) -> FilterPipelineOpts {
    FilterPipelineOpts::default().with_threads(threads).unwrap()
}

fn pipeline() -> FilterPipeline {
    FilterPipeline::with_cpu_scripts(&opts(2), ExtensionRegistry::new()).unwrap()
}

fn solid(w: u32, h: u32, c: Color) -> Bitmap {
    Bitmap::filled(PixelSize::new(w, h), c).unwrap()
}

fn stage(kind: FilterKind) -> FilterDesc {
    FilterDesc::new(kind)
}

fn ext(name: &str) -> FilterKind {
    FilterKind::Extension {
        uri: "test:ext".into(),
        name: name.into(),
        params: serde_json::Value::Null,
    }
}

#[test]
fn resolves_absolute_and_relative_indices() {
    assert_eq!(resolve_index(0, 3), Some(0));
    assert_eq!(resolve_index(3, 3), None);
    assert_eq!(resolve_index(-1, 3), Some(2));
    assert_eq!(resolve_index(-3, 3), Some(0));
    assert_eq!(resolve_index(-4, 3), None);
    assert_eq!(resolve_index(-1, 0), None);
}

#[test]
fn disposes_every_intermediate_exactly_once() {
    let p = pipeline();
    let chain = FilterChain::new(vec![
        stage(FilterKind::Grayscale { amount: 1.0 }).with_source(0),
        stage(FilterKind::Blur { radius: 2.0 }).with_source(1),
        stage(FilterKind::Blend {
            mode: BlendMode::Multiply,
        }),
    ]);
    let run = p
        .submit(&chain, vec![solid(4, 4, RED), solid(4, 4, BLUE)])
        .unwrap();
    let out = run.wait().unwrap();
    run.settle();

    let ledger = run.ledger();
    assert_eq!(ledger.result_count(), 5);
    assert_eq!(ledger.final_index(), Some(4));
    assert_eq!(ledger.disposal_count(), 3 + 2 - 1);
    assert!((0..4).all(|i| ledger.is_disposed(i)));
    assert!(!ledger.is_disposed(4));
    assert_eq!(out.size(), Some(PixelSize::new(4, 4)));
    assert_eq!(p.in_flight(), 0);
}

#[test]
fn unused_results_are_disposed_too() {
    let p = pipeline();
    let chain = FilterChain::new(vec![stage(FilterKind::Color { color: RED })]);
    let run = p
        .submit(&chain, vec![solid(1, 1, RED), solid(1, 1, BLUE)])
        .unwrap();
    assert!(matches!(run.wait().unwrap(), FilterResult::Color(c) if c == RED));
    run.settle();
    assert_eq!(run.ledger().disposal_count(), 2);
}

#[test]
fn consumed_intermediates_return_to_the_pool() {
    let p = pipeline();
    let chain = FilterChain::new(vec![
        stage(FilterKind::Grayscale { amount: 1.0 }),
        stage(FilterKind::Blur { radius: 1.0 }),
    ]);
    let run = p.submit(&chain, vec![solid(8, 8, RED)]).unwrap();
    run.wait().unwrap();
    run.settle();
    assert!(p.bitmaps().stats().retained_bitmaps >= 1);
}

#[test]
fn failed_dependency_degrades_to_transparent() {
    let scripts = Arc::new(CpuScripts::new().failing_on(ScriptKind::Blur));
    let p = FilterPipeline::new(&opts(2), scripts.clone(), ExtensionRegistry::new()).unwrap();
    let chain = FilterChain::new(vec![
        stage(FilterKind::Blur { radius: 3.0 }),
        stage(FilterKind::Saturate { amount: 0.5 }),
    ]);
    let run = p.submit(&chain, vec![solid(3, 2, RED)]).unwrap();
    let out = run.wait().unwrap();
    run.settle();

    let b = out.bitmap().unwrap();
    assert_eq!(b.size(), PixelSize::new(3, 2));
    assert!(b.pixels().iter().all(|&c| c == 0));
    let ScriptStats {
        live_allocations,
        live_scripts,
        ..
    } = scripts.stats();
    assert_eq!((live_allocations, live_scripts), (0, 0));
}

#[test]
fn failed_final_stage_resolves_to_transparent() {
    let p = FilterPipeline::new(
        &opts(1),
        Arc::new(CpuScripts::new().failing_on(ScriptKind::Blur)),
        ExtensionRegistry::new(),
    )
    .unwrap();
    let chain = FilterChain::new(vec![stage(FilterKind::Blur { radius: 3.0 })]);
    let run = p.submit(&chain, vec![solid(2, 2, RED)]).unwrap();
    assert!(run.wait().unwrap().is_transparent_color());
    assert!(matches!(run.future().wait(), Err(FilterFailure::Failed(_))));
}

#[test]
fn blend_defaults_read_newest_over_previous() {
    let p = pipeline();
    let chain = FilterChain::new(vec![
        stage(FilterKind::Color { color: RED }),
        stage(FilterKind::Blend {
            mode: BlendMode::Normal,
        }),
    ]);
    let run = p.submit(&chain, vec![solid(2, 2, BLUE)]).unwrap();
    let b = run.wait().unwrap().bitmap().unwrap().clone();
    assert_eq!(b.size(), PixelSize::new(2, 2));
    assert_eq!(b.pixel(1, 1), [255, 0, 0, 255]);
}

#[test]
fn out_of_range_index_reads_transparent() {
    let p = pipeline();
    let chain = FilterChain::new(vec![stage(FilterKind::Blur { radius: 2.0 }).with_source(5)]);
    let run = p.submit(&chain, vec![solid(2, 2, RED)]).unwrap();
    assert!(run.wait().unwrap().is_transparent_color());
}

#[test]
fn empty_chain_returns_last_source() {
    let p = pipeline();
    let src = solid(2, 2, RED);
    let run = p
        .submit(&FilterChain::new(Vec::new()), vec![solid(1, 1, BLUE), src.clone()])
        .unwrap();
    assert!(run.wait().unwrap().bitmap().unwrap().same_buffer(&src));
    assert_eq!(run.ledger().disposal_count(), 1);
    assert!(run.ledger().is_settled());
}

#[test]
fn two_lazy_extension_operands_are_a_usage_error() {
    let registry = ExtensionRegistry::new().with(
        "test:ext",
        "copy",
        |s: Option<&Bitmap>, _d: Option<&Bitmap>, _p: &serde_json::Value| {
            s.cloned()
                .ok_or_else(|| RenderError::filter("no source"))
        },
    );
    let p = FilterPipeline::with_cpu_scripts(&opts(1), registry).unwrap();
    let chain = FilterChain::new(vec![
        stage(FilterKind::Color { color: RED }),
        stage(FilterKind::Color { color: BLUE }),
        stage(ext("copy")).with_destination(-2),
    ]);
    let run = p.submit(&chain, Vec::new()).unwrap();
    assert!(matches!(run.wait(), Err(RenderError::Usage(_))));
}

#[test]
fn extension_materializes_lazy_operand_to_other_size() {
    let registry = ExtensionRegistry::new().with(
        "test:ext",
        "take-dst",
        |s: Option<&Bitmap>, d: Option<&Bitmap>, _p: &serde_json::Value| {
            let (s, d) = (s.cloned(), d.cloned());
            match (s, d) {
                (Some(s), Some(d)) if s.size() == d.size() => Ok(d),
                _ => Err(RenderError::filter("operands differ")),
            }
        },
    );
    let p = FilterPipeline::with_cpu_scripts(&opts(1), registry).unwrap();
    let chain = FilterChain::new(vec![
        stage(FilterKind::Color { color: RED }),
        stage(ext("take-dst")).with_source(0).with_destination(-1),
    ]);
    let run = p.submit(&chain, vec![solid(3, 2, BLUE)]).unwrap();
    let b = run.wait().unwrap().bitmap().unwrap().clone();
    assert_eq!(b.size(), PixelSize::new(3, 2));
    assert_eq!(b.pixel(2, 1), [255, 0, 0, 255]);
}

#[test]
fn missing_extension_degrades() {
    let p = pipeline();
    let chain = FilterChain::new(vec![stage(ext("absent"))]);
    let run = p.submit(&chain, vec![solid(1, 1, RED)]).unwrap();
    assert!(run.wait().unwrap().is_transparent_color());
}

#[test]
fn lone_lazy_operand_takes_source_size() {
    let pool = BitmapPool::default();
    let (s, d) = extension_operands(
        Some(FilterResult::Color(RED)),
        None,
        Some(PixelSize::new(4, 4)),
        &pool,
    )
    .unwrap();
    assert_eq!(s.unwrap().size(), PixelSize::new(4, 4));
    assert!(d.is_none());

    let err = extension_operands(Some(FilterResult::Color(RED)), None, None, &pool).unwrap_err();
    assert!(err.is_usage());
}

#[test]
fn independent_stages_run_concurrently() {
    let (tx, rx) = mpsc::channel::<()>();
    let tx = parking_lot::Mutex::new(tx);
    let rx = parking_lot::Mutex::new(rx);
    let registry = ExtensionRegistry::new()
        .with(
            "test:ext",
            "wait",
            move |_s: Option<&Bitmap>, _d: Option<&Bitmap>, _p: &serde_json::Value| {
                rx.lock()
                    .recv_timeout(Duration::from_secs(10))
                    .map_err(|_| RenderError::filter("sibling stage never ran"))?;
                Bitmap::filled(PixelSize::new(1, 1), RED)
            },
        )
        .with(
            "test:ext",
            "signal",
            move |s: Option<&Bitmap>, _d: Option<&Bitmap>, _p: &serde_json::Value| {
                let _ = tx.lock().send(());
                s.cloned().ok_or_else(|| RenderError::filter("no source"))
            },
        );
    let p = FilterPipeline::with_cpu_scripts(&opts(2), registry).unwrap();
    let chain = FilterChain::new(vec![
        stage(ext("wait")).with_source(0),
        stage(ext("signal")).with_source(0),
        stage(FilterKind::Blend {
            mode: BlendMode::Normal,
        })
        .with_source(-2)
        .with_destination(-1),
    ]);
    let run = p.submit(&chain, vec![solid(1, 1, Color::WHITE)]).unwrap();
    let b = run.wait().unwrap().bitmap().unwrap().clone();
    assert_eq!(b.pixel(0, 0), [255, 0, 0, 255]);
}

#[test]
fn rejects_when_saturated_or_shut_down() {
    let p = FilterPipeline::with_cpu_scripts(
        &opts(1).with_max_in_flight(0),
        ExtensionRegistry::new(),
    )
    .unwrap();
    let chain = FilterChain::new(vec![stage(FilterKind::Color { color: RED })]);
    assert!(matches!(
        p.submit(&chain, Vec::new()),
        Err(RenderError::Rejected(_))
    ));
    assert_eq!(p.in_flight(), 0);

    let p = pipeline();
    p.shutdown();
    assert!(matches!(
        p.submit(&chain, Vec::new()),
        Err(RenderError::Rejected(_))
    ));
    assert!(p.spawn(|| {}).is_err());
}

#[test]
fn noise_stage_is_reproducible() {
    let p = pipeline();
    let chain = FilterChain::new(vec![stage(FilterKind::Noise {
        kind: NoiseKind::Gaussian,
        sigma: 12.0,
        use_color: true,
    })]);
    let a = p.submit(&chain, vec![solid(4, 4, Color::from_rgba8(90, 90, 90, 255))]).unwrap();
    let b = p.submit(&chain, vec![solid(4, 4, Color::from_rgba8(90, 90, 90, 255))]).unwrap();
    let (a, b) = (a.wait().unwrap(), b.wait().unwrap());
    assert_eq!(a.bitmap().unwrap().pixels(), b.bitmap().unwrap().pixels());
}
