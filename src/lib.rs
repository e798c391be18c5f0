//! Scene-graph rendering core and asynchronous image-filter pipeline for APL view hosts.
//!
//! The upstream layout engine hands each visible [`Layer`] a retained [`Scene`]. A
//! [`SceneRenderer`] walks it onto a [`Surface`], resolving paints, strokes, text, shadows and
//! pattern tiles. Image nodes with a [`FilterChain`] go through a [`FilterCoordinator`]: cached
//! results draw immediately, everything else is computed on the filter worker pool and the
//! layer is asked to redraw once the result lands.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod foundation;

/// Options constructed once by the view host.
pub mod config;
/// Asynchronous image-filter pipeline.
pub mod filters;
/// Abstract path descriptions to concrete paths.
pub mod geometry;
/// Layers and absolute layouts.
pub mod host;
/// Paint and stroke resolution.
pub mod paint;
/// Surfaces, offscreens and the scene renderer.
pub mod render;
/// Scene-graph data model.
pub mod scene;

pub use crate::foundation::core::{Affine, BezPath, Color, PixelSize, Point, Rect, Size, Vec2};
pub use crate::foundation::error::{RenderError, RenderResult};
pub use crate::foundation::math::canvas_scale;

pub use crate::config::{FilterPipelineOpts, RenderOpts};
pub use crate::filters::coordinator::{FilterCoordinator, FilterState, RedrawTarget};
pub use crate::filters::extension::{ExtensionFilter, ExtensionRegistry};
pub use crate::filters::model::{FilterChain, FilterDesc, FilterKind};
pub use crate::filters::pipeline::FilterPipeline;
pub use crate::host::layer::Layer;
pub use crate::host::layout::{AbsoluteLayout, LayoutChild};
pub use crate::render::bitmap::Bitmap;
pub use crate::render::cpu::{CpuSurface, CpuSurfaceProvider};
pub use crate::render::recording::{RecordingProvider, RecordingSurface};
pub use crate::render::scene_renderer::{LayerContext, SceneRenderer};
pub use crate::render::surface::{RasterSurface, Surface, SurfaceProvider};
pub use crate::render::text::{FallbackShaper, ParleyShaper, TextShaper};
pub use crate::scene::model::{NodeId, NodeKind, Scene, SceneNode};
