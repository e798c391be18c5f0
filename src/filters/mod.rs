//! Asynchronous image-filter pipeline.
//!
//! A [`model::FilterChain`] is a list of filter stages whose `source`/`destination` indices
//! refer to earlier results. [`pipeline::FilterPipeline`] runs each stage on a bounded worker
//! pool, disposing intermediates as soon as their last consumer finishes.
//! [`coordinator::FilterCoordinator`] connects the pipeline to the draw pass through a
//! bitmap cache and a pending-computation side table.

pub mod cache;
pub mod coordinator;
pub mod extension;
pub mod future;
pub mod kernels;
pub mod model;
pub mod pipeline;
pub mod result;
pub mod script;
