use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use apl_render::{
    Affine, CpuSurface, CpuSurfaceProvider, ExtensionRegistry, FallbackShaper, FilterCoordinator,
    FilterPipeline, FilterPipelineOpts, Layer, ParleyShaper, PixelSize, RasterSurface,
    RenderOpts, Scene, SceneRenderer, Size, Surface as _, TextShaper,
};

#[derive(Parser, Debug)]
#[command(name = "apl-render", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterize a scene JSON file into a PNG.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    scene: PathBuf,

    /// Output PNG path.
    #[arg(short, long)]
    out: PathBuf,

    /// Device pixels per logical unit.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// How long to wait for filtered images before writing what is ready.
    #[arg(long, default_value_t = 2000)]
    wait_ms: u64,

    /// Override filter worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Font file used for text. Without one, text is laid out with fixed metrics only.
    #[arg(long)]
    font: Option<PathBuf>,
}

/// Redraw passes attempted while filtered images keep arriving.
const MAX_PASSES: usize = 8;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    if !(args.scale.is_finite() && args.scale > 0.0) {
        anyhow::bail!("--scale must be finite and > 0");
    }
    let file = std::fs::File::open(&args.scene)
        .with_context(|| format!("open scene '{}'", args.scene.display()))?;
    let scene: Scene = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("parse scene '{}'", args.scene.display()))?;
    let size = PixelSize::from_scaled(Size::new(scene.width, scene.height), args.scale);

    let mut filter_opts = FilterPipelineOpts::from_env()?;
    if let Some(n) = args.threads {
        filter_opts = filter_opts.with_threads(n)?;
    }
    let pipeline = FilterPipeline::with_cpu_scripts(&filter_opts, ExtensionRegistry::new())?;
    let filters = FilterCoordinator::new(pipeline, filter_opts.cache_capacity);

    let shaper: Box<dyn TextShaper> = match &args.font {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read font '{}'", path.display()))?;
            Box::new(ParleyShaper::new(bytes)?)
        }
        None => Box::new(FallbackShaper),
    };
    let render_opts = RenderOpts::default();
    let provider = CpuSurfaceProvider::new(render_opts.max_offscreen_px);
    let renderer =
        SceneRenderer::new(render_opts, &provider, shaper.as_ref()).with_filters(&filters);

    let layer = Layer::new(scene);
    let deadline = Instant::now() + Duration::from_millis(args.wait_ms);
    let mut surface = draw_pass(&layer, &renderer, size, args.scale)?;
    for _ in 1..MAX_PASSES {
        if filters.pending_count() > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            if !filters.wait_idle(left) {
                tracing::warn!(
                    pending = filters.pending_count(),
                    "filtered images still pending, writing partial frame"
                );
                break;
            }
        }
        if !layer.needs_redraw() {
            break;
        }
        surface = draw_pass(&layer, &renderer, size, args.scale)?;
    }

    let frame = surface.to_bitmap()?;
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &unpremultiply(frame.pixels()),
        frame.width(),
        frame.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn draw_pass(
    layer: &std::sync::Arc<Layer>,
    renderer: &SceneRenderer<'_>,
    size: PixelSize,
    scale: f64,
) -> anyhow::Result<CpuSurface> {
    let mut surface = CpuSurface::new(size)?;
    surface.concat(Affine::scale(scale));
    layer.draw(renderer, surface.as_surface_mut())?;
    Ok(surface)
}

fn unpremultiply(px: &[u8]) -> Vec<u8> {
    let mut out = px.to_vec();
    for p in out.chunks_exact_mut(4) {
        let a = u16::from(p[3]);
        if a != 0 && a != 255 {
            for c in &mut p[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
    }
    out
}
