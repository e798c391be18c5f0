//! Drawing of scene nodes onto raster surfaces.

/// Shared premultiplied RGBA8 rasters.
pub mod bitmap;
/// Size-bucketed pool of raster buffers.
pub mod bitmap_pool;
/// `vello_cpu` backed surface.
pub mod cpu;
/// Display-list surface.
pub mod recording;
/// Recursive scene node renderer.
pub mod scene_renderer;
/// Drop shadow layout and compositing.
pub mod shadow;
/// Surface and offscreen provider traits.
pub mod surface;
/// Text shaping collaborators.
pub mod text;
