//! Engine module housing the watcher core.
//!
//! This module exposes the trait-based input and clock seams (`backend`),
//! the frame-driven audio pipeline (`pipeline`) and the `SentinelHandle`
//! orchestration layer (`core`).

pub mod backend;
pub mod core;
pub mod pipeline;

pub use backend::{
    AmplitudeSource, ScriptedSource, SourceLifecycle, SpectrumFeed, SpectrumSource,
    SystemTimeSource, TimeSource,
};
pub use core::SentinelHandle;
pub use pipeline::{PipelineContext, RunningPipeline};
