//! Renderer
//!
//! - [`core`]: the [`RenderDevice`](core::RenderDevice) collaborator and its headless implementation
//! - [`pipeline`]: descriptors, permutations and the shader variant cache
//! - [`settings`]: engine configuration
//! - [`context`]: [`RenderContext`], which owns all of the above plus the features

pub mod context;
pub mod core;
pub mod pipeline;
pub mod settings;

pub use context::{DrawResolution, RenderContext};
pub use settings::{EngineSettings, ShaderCacheSettings};
